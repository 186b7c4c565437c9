use super::{assert_reports, eval, eval_error, eval_ok};
use crate::{
    config::EngineConfig,
    language::{
        ast::Expr, errors::SyntaxError, macro_expander::MacroHandler, parser::Parser,
        span::Location, token::Token,
    },
    runtime::{error::EvalError, function::FunctionState, Interpreter, PhotonError, Value},
};

#[test]
fn arithmetic_on_bindings() {
    assert_eq!(eval_ok("val x = 1\nx + 2"), Value::Int(3));
    assert_eq!(eval_ok("(1 + 2) * 3 - 4 / 2"), Value::Int(7));
    assert_eq!(eval_ok("1 + 2.5"), Value::Float(3.5));
    assert_eq!(eval_ok("\"photo\" + \"n\""), Value::string("photon"));
    assert_eq!(eval_ok("\"abc\".length"), Value::Int(3));
}

#[test]
fn functions_are_called_with_checked_arguments() {
    let source = "val add = (a: Int, b: Int) a + b\nadd(1, 2)";
    assert_eq!(eval_ok(source), Value::Int(3));

    let error = eval_error("val add = (a: Int, b: Int) a + b\nadd(1, \"two\")");
    assert_reports(&error, "Cannot assign type String to Int");
}

#[test]
fn later_bindings_shadow_earlier_ones() {
    assert_eq!(eval_ok("val a = 3; val a = 7; val a = 42; a"), Value::Int(42));
}

#[test]
fn closures_capture_outer_bindings() {
    let source = "val offset = 10\nval shift = (a: Int) a + offset\nshift(5)";
    assert_eq!(eval_ok(source), Value::Int(15));

    let curried = "val add = (a: Int) { (b: Int) a + b }\nadd(1)(2)";
    assert_eq!(eval_ok(curried), Value::Int(3));

    assert_eq!(eval_ok("(a){ (b){ a + b } }(1)(41)"), Value::Int(42));
}

#[test]
fn compile_time_functions_run_while_preparing() {
    assert_eq!(eval_ok("val double = @(x: Int) x * 2\ndouble(21)"), Value::Int(42));
}

#[test]
fn types_are_values() {
    assert_eq!(eval_ok("Int.name"), Value::string("Int"));
    assert_eq!(eval_ok("val myInt = Int\nval x: myInt = 5\nx"), Value::Int(5));

    let error = eval_error("val x: Int = \"five\"\nx");
    assert_reports(&error, "Cannot assign type String to Int");
}

#[test]
fn runtime_errors_are_reported() {
    let error = eval_error("10 / 0");
    assert!(matches!(error, EvalError::Arithmetic { .. }), "{error:?}");
    assert_eq!(error.to_string(), "Division by zero");
}

#[test]
fn lowering_errors_name_the_missing_binding() {
    let error = eval_error("missing + 1");
    assert!(
        matches!(&error, EvalError::UnknownName { name, .. } if name == "missing"),
        "{error:?}"
    );
}

#[test]
fn unknown_methods_are_rejected_before_running() {
    let error = eval_error("true.foo()");
    assert!(
        matches!(&error, EvalError::UnknownMethod { type_name, method, .. }
            if type_name == "Bool" && method == "foo"),
        "{error:?}"
    );
}

#[test]
fn syntax_errors_are_not_evaluation_errors() {
    assert!(matches!(eval("val = 1"), Err(PhotonError::Syntax(_))));
}

#[test]
fn recursion_needs_a_declared_return_type() {
    let error = eval_error("val loop = (n: Int) loop(n + 1)\nloop(0)");
    assert_reports(&error, "declare it explicitly");
}

#[test]
fn unbounded_recursion_hits_the_call_depth_limit() {
    let config = EngineConfig {
        max_call_depth: 64,
        ..EngineConfig::default()
    };
    let result = Interpreter::new(config).eval("test.ph", "val loop = (n: Int): Int loop(n + 1)\nloop(0)");

    match result {
        Err(PhotonError::Eval(EvalError::CallDepthExceeded { limit, .. })) => assert_eq!(limit, 64),
        other => panic!("expected the call depth limit, got {other:?}"),
    }
}

#[test]
fn default_call_depth_limit_is_reported_before_the_stack_runs_out() {
    let error = eval_error("val loop = (n: Int): Int loop(n + 1)\nloop(0)");
    assert!(
        matches!(error, EvalError::CallDepthExceeded { limit: 128, .. }),
        "{error:?}"
    );
}

#[test]
fn loading_evaluates_every_function() {
    let interpreter = Interpreter::new(EngineConfig::default());
    let module = interpreter
        .load(
            "test.ph",
            "val loop = (n: Int): Int loop(n + 1)\nval inc = (n: Int) n + 1\ninc(1)",
        )
        .expect("program loads");

    assert!(module.functions().len() >= 3);
    assert!(module
        .functions()
        .iter()
        .all(|function| function.state == FunctionState::Done));
}

#[test]
fn globals_are_visible_to_programs() {
    let mut interpreter = Interpreter::new(EngineConfig::default());
    interpreter.define_global("answer", Value::Int(42));

    let value = interpreter.eval("test.ph", "answer + 0").expect("global resolves");
    assert_eq!(value, Value::Int(42));
}

#[test]
fn embedders_can_register_macros() {
    struct Twice;

    impl MacroHandler for Twice {
        fn expand(
            &self,
            _keyword: &Token,
            parser: &mut Parser<'_>,
            location: Option<Location>,
        ) -> Result<Option<Expr>, SyntaxError> {
            let value = parser.parse_next(false)?;
            Ok(Some(Expr::call(value.clone(), "+", vec![value], location)))
        }
    }

    let mut interpreter = Interpreter::new(EngineConfig::default());
    interpreter.macros_mut().register("twice", Twice);

    let value = interpreter.eval("test.ph", "twice 21").expect("macro expands");
    assert_eq!(value, Value::Int(42));
}
