use crate::language::span::Location;
use crate::runtime::{
    error::{EvalError, EvalResult},
    frame::Frame,
    module::Module,
    node::{Dispatch, Node},
    scope::FunctionLayout,
    signature::Conversion,
    types::TypeId,
    value::{CapturedValue, Closure, FunctionRef, InterfaceInstance, Value},
};
use std::rc::Rc;

impl Node {
    /// Computes the value of a partially evaluated node.
    pub fn execute(&self, frame: &mut Frame, module: &mut Module) -> EvalResult<Value> {
        match self {
            Node::Literal { value, .. } => Ok(value.clone()),
            Node::Call(call) => {
                let target = call.target.execute(frame, module)?;
                let arguments = call
                    .arguments
                    .iter()
                    .map(|argument| argument.execute(frame, module))
                    .collect::<EvalResult<Vec<_>>>()?;
                match &call.dispatch {
                    Some(Dispatch::Static(method)) => {
                        module.invoke(method, target, arguments, call.location.as_ref())
                    }
                    Some(Dispatch::Dynamic) => {
                        module.call_dynamic(target, &call.name, arguments, call.location.as_ref())
                    }
                    None => panic!("call `{}` executed before partial evaluation", call.name),
                }
            }
            Node::Let {
                slot, value, body, ..
            } => {
                let value = value.execute(frame, module)?;
                frame.set(*slot, value);
                body.execute(frame, module)
            }
            Node::Reference {
                name,
                slot,
                location,
                ..
            } => frame.get(*slot, name, location.as_ref()),
            Node::Block { statements, .. } => {
                let mut last = Value::Nothing;
                for statement in statements {
                    last = statement.execute(frame, module)?;
                }
                Ok(last)
            }
            Node::FunctionDefinition(definition) => {
                let Some(id) = definition.function else {
                    panic!("function definition executed before partial evaluation");
                };
                let captures = capture_environment(frame, &definition.layout, definition.compile_time)
                    .map_err(|error| error.with_location(definition.location.as_ref()))?;
                Ok(Value::Closure(Rc::new(Closure {
                    function: FunctionRef::Function(id),
                    captures,
                })))
            }
            Node::TemplateFunctionDefinition(definition) => {
                let Some(id) = definition.template else {
                    panic!("template definition executed before partial evaluation");
                };
                let captures = capture_environment(frame, &definition.layout, false)?;
                Ok(Value::Closure(Rc::new(Closure {
                    function: FunctionRef::Template(id),
                    captures,
                })))
            }
            Node::FunctionTypeDefinition { .. } | Node::TypeAssert { .. } => {
                unreachable!("`{self}` is replaced during partial evaluation")
            }
            Node::Convert {
                value, conversion, ..
            } => {
                let value = value.execute(frame, module)?;
                module.convert(value, conversion, self.location())
            }
        }
    }
}

fn capture_environment(
    frame: &Frame,
    layout: &FunctionLayout,
    compile_time: bool,
) -> EvalResult<Vec<CapturedValue>> {
    layout
        .captures
        .iter()
        .enumerate()
        .map(|(index, capture)| {
            if layout.self_capture == Some(index) {
                Ok(CapturedValue::Recursive)
            } else {
                frame.capture(capture.from, &capture.name, compile_time)
            }
        })
        .collect()
}

impl Module {
    pub fn convert(
        &mut self,
        value: Value,
        conversion: &Conversion,
        location: Option<&Location>,
    ) -> EvalResult<Value> {
        match conversion {
            Conversion::Identity => Ok(value),
            Conversion::IntToFloat => match value {
                Value::Int(value) => Ok(Value::Float(value as f64)),
                other => Ok(other),
            },
            Conversion::Checked(expected) => {
                let actual = self.type_of(&value);
                match value {
                    Value::Int(value) if *expected == TypeId::FLOAT => Ok(Value::Float(value as f64)),
                    value if actual == *expected => Ok(value),
                    value => Err(EvalError::invalid(
                        format!(
                            "Expected a value of type {}, got {}",
                            self.type_name(*expected),
                            self.describe(&value)
                        ),
                        location.cloned(),
                    )),
                }
            }
            Conversion::ToInterface(concrete) => match value {
                Value::Interface(instance) if instance.concrete == *concrete => {
                    Ok(Value::Interface(instance))
                }
                value => Ok(Value::Interface(Rc::new(InterfaceInstance {
                    concrete: *concrete,
                    value,
                }))),
            },
        }
    }
}
