use super::assert_reports;
use crate::{
    config::EngineConfig,
    runtime::{
        error::EvalError,
        interop::{HostBridge, HostError, HostObject, HostType},
        Interpreter, PhotonError, Value,
    },
};

struct Greeter {
    prefix: &'static str,
}

struct GreeterBridge {
    named: bool,
}

impl HostBridge for GreeterBridge {
    fn invoke_member(
        &self,
        target: &HostObject,
        member: &str,
        arguments: &[Value],
    ) -> Result<Value, HostError> {
        let greeter = target
            .downcast_ref::<Greeter>()
            .ok_or_else(|| HostError::new("not a greeter"))?;
        match (member, arguments) {
            ("greet", [Value::String(name)]) => Ok(Value::string(format!("{}, {name}", greeter.prefix))),
            ("greet", _) => Err(HostError::new("greet takes one string")),
            (other, _) => Err(HostError::new(format!("unknown member {other}"))),
        }
    }

    fn static_type(&self, target: &HostObject) -> HostType {
        if self.named {
            HostType::Named(target.name().to_string())
        } else {
            HostType::Dynamic
        }
    }
}

fn interpreter(named: bool) -> Interpreter {
    let mut interpreter =
        Interpreter::new(EngineConfig::default()).with_host(GreeterBridge { named });
    interpreter.define_global(
        "greeter",
        Value::Host(HostObject::new("Greeter", Greeter { prefix: "Hello" })),
    );
    interpreter
}

fn eval_error(interpreter: &Interpreter, source: &str) -> EvalError {
    match interpreter.eval("host.ph", source) {
        Err(PhotonError::Eval(error)) => error,
        other => panic!("expected an evaluation error, got {other:?}"),
    }
}

#[test]
fn dynamic_host_objects_dispatch_at_run_time() {
    let value = interpreter(false)
        .eval("host.ph", "greeter.greet(\"Ann\") + \"!\"")
        .expect("host call succeeds");
    assert_eq!(value, Value::string("Hello, Ann!"));
}

#[test]
fn named_host_types_dispatch_through_the_bridge() {
    let value = interpreter(true)
        .eval("host.ph", "greeter.greet(\"Bo\")")
        .expect("host call succeeds");
    assert_eq!(value, Value::string("Hello, Bo"));
}

#[test]
fn host_failures_become_evaluation_errors() {
    let error = eval_error(&interpreter(true), "greeter.wave()");
    assert!(
        matches!(&error, EvalError::Host { member, .. } if member == "wave"),
        "{error:?}"
    );
    assert_eq!(error.to_string(), "Host call `wave` failed: unknown member wave");
}

#[test]
fn host_objects_are_unavailable_at_compile_time() {
    let error = eval_error(
        &interpreter(false),
        "val greetNow = @(h: Dynamic) h.greet(\"x\")\ngreetNow(greeter)",
    );
    assert_reports(&error, "host objects cannot be used at compile time");
}

#[test]
fn missing_bridge_is_reported() {
    let mut interpreter = Interpreter::new(EngineConfig::default());
    interpreter.define_global("greeter", Value::Host(HostObject::new("Greeter", 0_u8)));

    let error = eval_error(&interpreter, "greeter.greet(\"Ann\")");
    assert_reports(&error, "no host bridge is installed");
}
