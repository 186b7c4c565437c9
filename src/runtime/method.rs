use crate::language::span::Location;
use crate::runtime::{
    builtins::{self, Intrinsic},
    class::{BuilderOp, ClassId, ClassKind},
    error::{EvalError, EvalResult},
    function::{FunctionId, FunctionKind},
    module::Module,
    signature::{CallConversion, Signature},
    types::{TypeId, TypeKind},
    value::{Closure, FunctionRef, Object, Value},
};
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodKind {
    Default,
    /// Executed while partially evaluating the call; the call becomes a literal.
    Partial,
    /// Only valid while the module is being prepared.
    CompileTimeOnly,
}

#[derive(Clone, Debug)]
pub enum MethodCall {
    Intrinsic(Intrinsic),
    /// The target is a closure running this function.
    Closure(FunctionId),
    CompileTimeCall(FunctionId),
    Getter(usize),
    New(ClassId),
    /// A class function; the receiver is passed first when `pass_receiver`.
    Bound {
        closure: Rc<Closure>,
        function: FunctionId,
        pass_receiver: bool,
    },
    /// Looked up in the method table of the run-time interface value.
    Virtual(String),
    Converted {
        inner: Rc<Method>,
        conversion: CallConversion,
    },
    /// Returns its argument. Conversions inserted by the call node do the work.
    Identity,
    Builder(BuilderOp),
    DefineClass(ClassKind),
    TypeName,
}

#[derive(Clone, Debug)]
pub struct Method {
    pub kind: MethodKind,
    pub signature: Signature,
    pub call: MethodCall,
}

impl Method {
    pub fn new(signature: Signature, call: MethodCall) -> Self {
        Self {
            kind: MethodKind::Default,
            signature,
            call,
        }
    }

    pub fn with_kind(mut self, kind: MethodKind) -> Self {
        self.kind = kind;
        self
    }
}

impl Module {
    /// Resolves `name` on values of type `ty`. Argument types, when known,
    /// select templates and overloads.
    pub fn get_method(
        &mut self,
        ty: TypeId,
        name: &str,
        arguments: Option<&[TypeId]>,
    ) -> EvalResult<Option<Rc<Method>>> {
        let method = match self.types.kind(ty).clone() {
            TypeKind::Bool | TypeKind::Int | TypeKind::Float | TypeKind::String | TypeKind::Nothing => {
                builtins::lookup(ty, name, arguments)
            }
            TypeKind::Type if name == "name" => Some(type_name_method()),
            TypeKind::Function(id) if name == "call" => {
                Some(Method::new(self.signature(id)?, MethodCall::Closure(id)))
            }
            TypeKind::CompileTimeFunction(id) if name == "call" => {
                let parameters = self.parameter_types(id)?;
                Some(
                    Method::new(
                        Signature::Concrete {
                            parameters,
                            ret: TypeId::ANY,
                        },
                        MethodCall::CompileTimeCall(id),
                    )
                    .with_kind(MethodKind::Partial),
                )
            }
            TypeKind::Template(id) if name == "call" => match arguments {
                Some(arguments) => {
                    let function = self.specialize(id, arguments)?;
                    Some(Method::new(self.signature(function)?, MethodCall::Closure(function)))
                }
                None => None,
            },
            TypeKind::Class(class) => self.instance_method(class, ty, name, arguments)?,
            TypeKind::Interface(class) => self.interface_method(class, ty, name, arguments)?,
            TypeKind::Static(class) => match self.static_method(class, name, arguments)? {
                Some(method) => Some(method),
                None if name == "name" => Some(type_name_method()),
                None => None,
            },
            TypeKind::FunctionalInterface { parameters, ret } if name == "call" => Some(Method::new(
                Signature::Concrete { parameters, ret },
                MethodCall::Virtual("call".into()),
            )),
            TypeKind::Host => Some(Method::new(
                Signature::Any { ret: TypeId::DYNAMIC },
                MethodCall::Virtual(name.to_string()),
            )),
            TypeKind::ClassBuilder => self.builder_method(name),
            TypeKind::ClassFactory if name == "new" => Some(define_class_method(ClassKind::Class)),
            TypeKind::InterfaceFactory if name == "new" => {
                Some(define_class_method(ClassKind::Interface))
            }
            _ => None,
        };
        Ok(method.map(Rc::new))
    }

    pub fn invoke(
        &mut self,
        method: &Method,
        target: Value,
        arguments: Vec<Value>,
        location: Option<&Location>,
    ) -> EvalResult<Value> {
        if method.kind == MethodKind::CompileTimeOnly && !self.is_compile_time() {
            return Err(EvalError::invalid(
                "This method can only be called while the program is being compiled",
                location.cloned(),
            ));
        }
        match &method.call {
            MethodCall::Intrinsic(intrinsic) => builtins::apply(*intrinsic, &target, &arguments)
                .map_err(|error| error.with_location(location)),
            MethodCall::Closure(function) => {
                let closure = expect_closure(&target);
                self.call_function(*function, &closure, arguments, location)
            }
            MethodCall::CompileTimeCall(function) => {
                let closure = expect_closure(&target);
                self.call_compile_time(*function, &closure, arguments, location)
            }
            MethodCall::Getter(index) => match &target {
                Value::Object(object) => Ok(object.fields[*index].clone()),
                other => panic!("property getter called on {other:?}"),
            },
            MethodCall::New(class) => Ok(Value::Object(Rc::new(Object {
                class: *class,
                ty: self.classes[class.0].instance,
                fields: arguments,
            }))),
            MethodCall::Bound {
                closure,
                function,
                pass_receiver,
            } => {
                let mut arguments = arguments;
                if *pass_receiver {
                    arguments.insert(0, target);
                }
                self.call_function(*function, closure, arguments, location)
            }
            MethodCall::Virtual(name) => self.call_virtual(target, name, arguments, location),
            MethodCall::Converted { inner, conversion } => {
                let mut converted = Vec::with_capacity(arguments.len());
                for (index, argument) in arguments.into_iter().enumerate() {
                    converted.push(match conversion.arguments.get(index) {
                        Some(argument_conversion) => self.convert(argument, argument_conversion, location)?,
                        None => argument,
                    });
                }
                let result = self.invoke(inner, target, converted, location)?;
                self.convert(result, &conversion.ret, location)
            }
            MethodCall::Identity => Ok(arguments.into_iter().next().unwrap_or(target)),
            MethodCall::Builder(op) => self.builder_call(*op, target, arguments, location),
            MethodCall::DefineClass(kind) => self.define_class(*kind, arguments, location),
            MethodCall::TypeName => match target {
                Value::Type(ty) => Ok(Value::string(self.type_name(ty))),
                other => panic!("type name requested for {other:?}"),
            },
        }
    }

    pub fn call_virtual(
        &mut self,
        target: Value,
        name: &str,
        arguments: Vec<Value>,
        location: Option<&Location>,
    ) -> EvalResult<Value> {
        match &target {
            Value::Interface(instance) => {
                let method = match self.types.kind(instance.concrete) {
                    TypeKind::ConcreteInterface { methods, .. } => methods.get(name).cloned(),
                    other => panic!("interface value with non-concrete type {other:?}"),
                };
                let Some(method) = method else {
                    return Err(EvalError::UnknownMethod {
                        type_name: self.type_name(instance.concrete),
                        method: name.to_string(),
                        location: location.cloned(),
                    });
                };
                let value = instance.value.clone();
                self.invoke(&method, value, arguments, location)
            }
            Value::Host(_) => self.call_host(&target, name, arguments, location),
            Value::Closure(closure) if name == "call" => {
                let closure = closure.clone();
                self.call_closure(&closure, arguments, location)
            }
            other => Err(EvalError::invalid(
                format!("Cannot call `{name}` on {}", self.describe(other)),
                location.cloned(),
            )),
        }
    }

    /// Dispatch for targets whose static type is `Dynamic`.
    pub fn call_dynamic(
        &mut self,
        target: Value,
        name: &str,
        arguments: Vec<Value>,
        location: Option<&Location>,
    ) -> EvalResult<Value> {
        match &target {
            Value::Host(_) => self.call_host(&target, name, arguments, location),
            Value::Interface(_) => self.call_virtual(target, name, arguments, location),
            Value::Nothing | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::String(_) => {
                let ty = self.type_of(&target);
                let types = arguments.iter().map(|argument| self.type_of(argument)).collect::<Vec<_>>();
                let Some(method) = builtins::lookup(ty, name, Some(&types)) else {
                    return Err(EvalError::UnknownMethod {
                        type_name: self.type_name(ty),
                        method: name.to_string(),
                        location: location.cloned(),
                    });
                };
                let (_, conversions) = method
                    .signature
                    .instantiate(self, &types)
                    .map_err(|error| error.with_location(location))?;
                let mut converted = Vec::with_capacity(arguments.len());
                for (argument, conversion) in arguments.into_iter().zip(&conversions) {
                    converted.push(self.convert(argument, conversion, location)?);
                }
                self.invoke(&method, target, converted, location)
            }
            other => Err(EvalError::invalid(
                format!("Cannot call `{name}` dynamically on {}", self.describe(other)),
                location.cloned(),
            )),
        }
    }

    /// Calls a closure value with arguments checked against its parameters.
    pub fn call_closure(
        &mut self,
        closure: &Rc<Closure>,
        arguments: Vec<Value>,
        location: Option<&Location>,
    ) -> EvalResult<Value> {
        let types = arguments.iter().map(|argument| self.type_of(argument)).collect::<Vec<_>>();
        let function = match closure.function {
            FunctionRef::Function(function) => function,
            FunctionRef::Template(template) => self.specialize(template, &types)?,
        };
        let parameters = self.parameter_types(function)?;
        let (_, conversions) = Signature::Concrete {
            parameters,
            ret: TypeId::ANY,
        }
        .instantiate(self, &types)
        .map_err(|error| error.with_location(location))?;

        let mut converted = Vec::with_capacity(arguments.len());
        for (argument, conversion) in arguments.into_iter().zip(&conversions) {
            converted.push(self.convert(argument, conversion, location)?);
        }
        match self.function(function).kind {
            FunctionKind::Runtime => self.call_function(function, closure, converted, location),
            FunctionKind::CompileTime => self.call_compile_time(function, closure, converted, location),
        }
    }
}

fn expect_closure(target: &Value) -> Rc<Closure> {
    match target {
        Value::Closure(closure) => closure.clone(),
        other => panic!("function call on non-closure {other:?}"),
    }
}

fn type_name_method() -> Method {
    Method::new(Signature::concrete(Vec::new(), TypeId::STRING), MethodCall::TypeName)
}

fn define_class_method(kind: ClassKind) -> Method {
    Method::new(
        Signature::concrete(vec![("name", TypeId::STRING), ("builder", TypeId::ANY)], TypeId::ANY),
        MethodCall::DefineClass(kind),
    )
    .with_kind(MethodKind::Partial)
}
