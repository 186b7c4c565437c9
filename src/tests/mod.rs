mod classes;
mod host;
mod programs;
mod templates;

use crate::{
    config::EngineConfig,
    runtime::{error::EvalError, Interpreter, PhotonError, Value},
};

pub(crate) fn eval(source: &str) -> Result<Value, PhotonError> {
    Interpreter::new(EngineConfig::default()).eval("test.ph", source)
}

pub(crate) fn eval_ok(source: &str) -> Value {
    match eval(source) {
        Ok(value) => value,
        Err(PhotonError::Eval(error)) => panic!("evaluation failed: {:?}", error.messages()),
        Err(error) => panic!("evaluation failed: {error}"),
    }
}

pub(crate) fn eval_error(source: &str) -> EvalError {
    match eval(source) {
        Ok(value) => panic!("expected an error, got {value}"),
        Err(PhotonError::Eval(error)) => error,
        Err(error) => panic!("expected an evaluation error, got {error}"),
    }
}

pub(crate) fn assert_reports(error: &EvalError, expected: &str) {
    let messages = error.messages();
    assert!(
        messages.iter().any(|message| message.contains(expected)),
        "`{expected}` not found in {messages:?}"
    );
}
