use super::{assert_reports, eval_error, eval_ok};
use crate::runtime::Value;

#[test]
fn methods_see_properties_through_self() {
    let source = r#"
class Person {
    def age: Int
    def older(years: Int) age + years
}
Person.new(40).older(2)
"#;
    assert_eq!(eval_ok(source), Value::Int(42));
}

#[test]
fn constructor_arguments_are_checked() {
    let source = r#"
class Person {
    def age: Int
}
Person.new("old")
"#;
    let error = eval_error(source);
    assert_reports(&error, "Cannot assign type String to Int");
}

#[test]
fn static_functions_are_called_on_the_class() {
    let source = r#"
class Point {
    def x: Int
    static {
        def origin() Point.new(0)
    }
}
Point.origin().x
"#;
    assert_eq!(eval_ok(source), Value::Int(0));
}

#[test]
fn mutually_recursive_classes() {
    let source = r#"
class A {
    def b: B
}
class B {
    def a: A
}
A.name + B.name
"#;
    assert_eq!(eval_ok(source), Value::string("AB"));
}

#[test]
fn objects_are_instances_of_anonymous_classes() {
    let source = r#"
val answers = object {
    def answer(): Int 42
}
answers.answer()
"#;
    assert_eq!(eval_ok(source), Value::Int(42));
}

#[test]
fn duplicate_definitions_fail_the_class() {
    let source = r#"
class Twice {
    def x: Int
    def x: Int
}
Twice.new(1)
"#;
    let error = eval_error(source);
    assert_reports(&error, "Could not build class Twice");
    assert_reports(&error, "x is already defined in Twice");
}

#[test]
fn classes_convert_to_interfaces_structurally() {
    let source = r#"
interface Named {
    def name: String
}
class Dog {
    def name: String
}
val greet = (n: Named) n.name + "!"
greet(Dog.new("Rex"))
"#;
    assert_eq!(eval_ok(source), Value::string("Rex!"));
}

#[test]
fn interface_of_wraps_a_value() {
    let source = r#"
interface Named {
    def name: String
}
class Dog {
    def name: String
}
Named.of(Dog.new("Rex")).name
"#;
    assert_eq!(eval_ok(source), Value::string("Rex"));
}

#[test]
fn missing_interface_methods_are_explained() {
    let source = r#"
interface Named {
    def name: String
}
class Cat {
    def lives: Int
}
val greet = (n: Named) n.name
greet(Cat.new(9))
"#;
    let error = eval_error(source);
    assert_reports(&error, "Cannot assign type Cat to Named");
    assert_reports(&error, "Type Cat does not have a method named name");
}

#[test]
fn incompatible_interface_methods_are_named() {
    let source = r#"
interface WithAge {
    def age: String
}
class Person {
    def age: Int
}
val show = (p: WithAge) p.age
show(Person.new(3))
"#;
    let error = eval_error(source);
    let messages = error.messages();
    let incompatible = messages
        .iter()
        .position(|message| message.contains("Incompatible method age"))
        .unwrap_or_else(|| panic!("method not named in {messages:?}"));
    assert!(
        messages[incompatible..]
            .iter()
            .any(|message| message.contains("Cannot assign type Int to String")),
        "{messages:?}"
    );
}
