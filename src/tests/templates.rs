use super::{assert_reports, eval_error, eval_ok};
use crate::{
    config::EngineConfig,
    runtime::{Interpreter, Value},
};

#[test]
fn untyped_parameters_make_templates() {
    assert_eq!(eval_ok("val id = (x) x\nid(1) + id(2)"), Value::Int(3));
    assert_eq!(eval_ok("val id = (x) x\nid(1)\nid(\"a\")"), Value::string("a"));
}

#[test]
fn specializations_are_memoized_by_argument_types() {
    let interpreter = Interpreter::new(EngineConfig::default());
    let module = interpreter
        .load("test.ph", "val id = (x) x\nid(1) + id(2)\nid(\"a\")\nid(true)")
        .expect("program loads");

    assert_eq!(module.templates().len(), 1);
    assert_eq!(module.templates()[0].specialization_count(), 3);
}

#[test]
fn specialization_limit_is_enforced() {
    let config = EngineConfig {
        max_specializations: 1,
        ..EngineConfig::default()
    };
    let result = Interpreter::new(config).eval("test.ph", "val id = (x) x\nid(1)\nid(\"a\")");

    let error = match result {
        Err(crate::runtime::PhotonError::Eval(error)) => error,
        other => panic!("expected the specialization limit, got {other:?}"),
    };
    assert_reports(&error, "exceeded the limit of 1 specializations");
}

#[test]
fn type_bindings_constrain_later_parameters() {
    assert_eq!(eval_ok("val second = (a: val T, b: T) b\nsecond(1, 2)"), Value::Int(2));

    let error = eval_error("val second = (a: val T, b: T) b\nsecond(1, \"two\")");
    assert_reports(&error, "Cannot assign type String to Int");
}

#[test]
fn compile_time_functions_build_specialized_functions() {
    let source = "val addOfType = @(T: Type) { (a: T, b: T) a + b }\naddOfType(Int)(1, 2)";
    assert_eq!(eval_ok(source), Value::Int(3));
}

#[test]
fn call_patterns_destructure_generated_types() {
    let source = r#"
val Box = @(T: Type) {
    Class.new("Box", @(self: ClassBuilder) { self.define("value", T) })
}
val unbox = (b: Box(val T)): T b.value
unbox(Box(Int).new(5)) + 1
"#;
    assert_eq!(eval_ok(source), Value::Int(6));
}
