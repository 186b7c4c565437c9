use crate::language::span::Location;
use crate::runtime::{
    error::{EvalError, EvalResult},
    function::FunctionId,
    method::{Method, MethodCall, MethodKind},
    module::Module,
    signature::Signature,
    types::{TypeId, TypeKind},
    value::{Closure, FunctionRef, Value},
};
use std::cell::RefCell;
use std::mem;
use std::rc::Rc;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClassId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Interface,
}

/// Operations of the `ClassBuilder` passed to class bodies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuilderOp {
    Define,
    SelfType,
    Static,
}

/// What a class body has declared so far.
#[derive(Debug)]
pub struct Definitions {
    pub class: ClassId,
    pub properties: Vec<(String, TypeId)>,
    pub functions: Vec<(String, Rc<Closure>)>,
    pub statics: Vec<(String, Rc<Closure>)>,
    pub is_static: bool,
}

impl Definitions {
    fn new(class: ClassId, is_static: bool) -> Self {
        Self {
            class,
            properties: Vec::new(),
            functions: Vec::new(),
            statics: Vec::new(),
            is_static,
        }
    }

    fn is_defined(&self, name: &str) -> bool {
        self.properties.iter().any(|(defined, _)| defined == name)
            || self.functions.iter().any(|(defined, _)| defined == name)
    }
}

#[derive(Debug)]
pub struct ClassShape {
    pub properties: Vec<(String, TypeId)>,
    pub functions: Vec<(String, Rc<Closure>)>,
    pub statics: Vec<(String, Rc<Closure>)>,
}

impl ClassShape {
    pub fn property(&self, name: &str) -> Option<(usize, TypeId)> {
        self.properties
            .iter()
            .position(|(property, _)| property == name)
            .map(|index| (index, self.properties[index].1))
    }

    fn function(&self, name: &str) -> Option<Rc<Closure>> {
        find_closure(&self.functions, name)
    }

    fn static_function(&self, name: &str) -> Option<Rc<Closure>> {
        find_closure(&self.statics, name)
    }
}

#[derive(Debug)]
enum ShapeState {
    Declared,
    Building,
    Built(Rc<ClassShape>),
}

#[derive(Debug)]
pub struct ClassDef {
    pub name: String,
    pub kind: ClassKind,
    pub instance: TypeId,
    pub static_type: TypeId,
    builder: Rc<Closure>,
    state: ShapeState,
}

impl Module {
    /// `Class.new(name, builder)` and `Interface.new(name, builder)`. The
    /// builder runs when the shape is first needed.
    pub fn define_class(
        &mut self,
        kind: ClassKind,
        arguments: Vec<Value>,
        location: Option<&Location>,
    ) -> EvalResult<Value> {
        let mut arguments = arguments.into_iter();
        let (Some(Value::String(name)), Some(builder)) = (arguments.next(), arguments.next()) else {
            return Err(EvalError::invalid(
                "Expected a class name and a builder function",
                location.cloned(),
            ));
        };
        let Value::Closure(builder) = builder else {
            return Err(EvalError::invalid(
                format!("Builder of {name} must be a function, got {}", self.describe(&builder)),
                location.cloned(),
            ));
        };

        let id = ClassId(self.classes.len());
        let instance_kind = match kind {
            ClassKind::Class => TypeKind::Class(id),
            ClassKind::Interface => TypeKind::Interface(id),
        };
        let instance = self.types.add(name.to_string(), instance_kind);
        let static_type = self.types.add(format!("{name}.type"), TypeKind::Static(id));
        self.types.set_meta(instance, static_type);
        self.classes.push(ClassDef {
            name: name.to_string(),
            kind,
            instance,
            static_type,
            builder,
            state: ShapeState::Declared,
        });
        debug!(class = %name, ?kind, "declared class");
        Ok(Value::Type(instance))
    }

    /// Runs the builder of a class once and caches the result.
    pub fn shape(&mut self, id: ClassId) -> EvalResult<Rc<ClassShape>> {
        let class = &mut self.classes[id.0];
        match &class.state {
            ShapeState::Built(shape) => return Ok(shape.clone()),
            ShapeState::Building => {
                return Err(EvalError::invalid(
                    format!("Class {} is used while it is being defined", class.name),
                    None,
                ))
            }
            ShapeState::Declared => class.state = ShapeState::Building,
        }
        let name = class.name.clone();
        let builder = class.builder.clone();
        debug!(class = %name, "building class shape");

        let definitions = Rc::new(RefCell::new(Definitions::new(id, false)));
        let built = self.call_closure(&builder, vec![Value::Builder(definitions.clone())], None);
        if let Err(error) = built {
            self.classes[id.0].state = ShapeState::Declared;
            return Err(error.wrap(format!("Could not build class {name}"), None));
        }

        let mut definitions = definitions.borrow_mut();
        let shape = Rc::new(ClassShape {
            properties: mem::take(&mut definitions.properties),
            functions: mem::take(&mut definitions.functions),
            statics: mem::take(&mut definitions.statics),
        });
        debug!(
            class = %name,
            properties = shape.properties.len(),
            functions = shape.functions.len(),
            statics = shape.statics.len(),
            "built class shape"
        );
        self.classes[id.0].state = ShapeState::Built(shape.clone());
        Ok(shape)
    }

    pub(crate) fn instance_method(
        &mut self,
        class: ClassId,
        ty: TypeId,
        name: &str,
        arguments: Option<&[TypeId]>,
    ) -> EvalResult<Option<Method>> {
        let shape = self.shape(class)?;
        if let Some((index, property)) = shape.property(name) {
            return Ok(Some(Method::new(
                Signature::concrete(Vec::new(), property),
                MethodCall::Getter(index),
            )));
        }
        match shape.function(name) {
            Some(closure) => self.bound_method(closure, ty, arguments),
            None => Ok(None),
        }
    }

    pub(crate) fn interface_method(
        &mut self,
        class: ClassId,
        ty: TypeId,
        name: &str,
        arguments: Option<&[TypeId]>,
    ) -> EvalResult<Option<Method>> {
        let shape = self.shape(class)?;
        if let Some((_, property)) = shape.property(name) {
            let signature = match self.types.kind(property) {
                TypeKind::FunctionalInterface { parameters, ret } => Signature::Concrete {
                    parameters: parameters.clone(),
                    ret: *ret,
                },
                _ => Signature::concrete(Vec::new(), property),
            };
            return Ok(Some(Method::new(signature, MethodCall::Virtual(name.to_string()))));
        }
        match shape.function(name) {
            Some(closure) => self.bound_method(closure, ty, arguments),
            None => Ok(None),
        }
    }

    pub(crate) fn static_method(
        &mut self,
        class: ClassId,
        name: &str,
        arguments: Option<&[TypeId]>,
    ) -> EvalResult<Option<Method>> {
        let shape = self.shape(class)?;
        let definition = &self.classes[class.0];
        let (kind, instance, static_type) = (definition.kind, definition.instance, definition.static_type);
        match (kind, name) {
            (ClassKind::Class, "new") => {
                let parameters = shape.properties.clone();
                return Ok(Some(Method::new(
                    Signature::Concrete {
                        parameters,
                        ret: instance,
                    },
                    MethodCall::New(class),
                )));
            }
            (ClassKind::Interface, "of") => {
                return Ok(Some(Method::new(
                    Signature::concrete(vec![("value", instance)], instance),
                    MethodCall::Identity,
                )));
            }
            _ => {}
        }
        match shape.static_function(name) {
            Some(closure) => self.bound_method(closure, static_type, arguments),
            None => Ok(None),
        }
    }

    /// A class function called with the receiver as its first argument.
    fn bound_method(
        &mut self,
        closure: Rc<Closure>,
        receiver: TypeId,
        arguments: Option<&[TypeId]>,
    ) -> EvalResult<Option<Method>> {
        let function: FunctionId = match closure.function {
            FunctionRef::Function(function) => function,
            FunctionRef::Template(template) => {
                let Some(arguments) = arguments else {
                    return Ok(None);
                };
                let mut types = Vec::with_capacity(arguments.len() + 1);
                types.push(receiver);
                types.extend_from_slice(arguments);
                self.specialize(template, &types)?
            }
        };
        let signature = self.signature(function)?.without_self();
        Ok(Some(Method::new(
            signature,
            MethodCall::Bound {
                closure,
                function,
                pass_receiver: true,
            },
        )))
    }

    pub(crate) fn builder_method(&self, name: &str) -> Option<Method> {
        let method = match name {
            "define" => Method::new(
                Signature::concrete(vec![("name", TypeId::STRING), ("value", TypeId::ANY)], TypeId::NOTHING),
                MethodCall::Builder(BuilderOp::Define),
            )
            .with_kind(MethodKind::CompileTimeOnly),
            "selfType" => Method::new(
                Signature::concrete(Vec::new(), TypeId::TYPE),
                MethodCall::Builder(BuilderOp::SelfType),
            )
            .with_kind(MethodKind::Partial),
            "static" => Method::new(
                Signature::concrete(vec![("builder", TypeId::ANY)], TypeId::NOTHING),
                MethodCall::Builder(BuilderOp::Static),
            )
            .with_kind(MethodKind::CompileTimeOnly),
            _ => return None,
        };
        Some(method)
    }

    pub(crate) fn builder_call(
        &mut self,
        op: BuilderOp,
        target: Value,
        arguments: Vec<Value>,
        location: Option<&Location>,
    ) -> EvalResult<Value> {
        let Value::Builder(definitions) = target else {
            panic!("class builder operation on {target:?}");
        };
        let class = definitions.borrow().class;
        let class_name = self.classes[class.0].name.clone();

        match op {
            BuilderOp::Define => {
                let mut arguments = arguments.into_iter();
                let (Some(Value::String(name)), Some(value)) = (arguments.next(), arguments.next()) else {
                    return Err(EvalError::invalid(
                        "define expects a name and a value",
                        location.cloned(),
                    ));
                };
                let mut definitions = definitions.borrow_mut();
                if definitions.is_defined(&name) {
                    return Err(EvalError::invalid(
                        format!("{name} is already defined in {class_name}"),
                        location.cloned(),
                    ));
                }
                match value {
                    Value::Type(_) if definitions.is_static => Err(EvalError::invalid(
                        format!("Static properties are not supported ({class_name}.{name})"),
                        location.cloned(),
                    )),
                    Value::Type(ty) => {
                        definitions.properties.push((name.to_string(), ty));
                        Ok(Value::Nothing)
                    }
                    Value::Closure(closure) => {
                        definitions.functions.push((name.to_string(), closure));
                        Ok(Value::Nothing)
                    }
                    other => Err(EvalError::invalid(
                        format!(
                            "Cannot define {name} in {class_name}: expected a type or a function, got {}",
                            self.describe(&other)
                        ),
                        location.cloned(),
                    )),
                }
            }
            BuilderOp::SelfType => {
                let definition = &self.classes[class.0];
                let ty = if definitions.borrow().is_static {
                    definition.static_type
                } else {
                    definition.instance
                };
                Ok(Value::Type(ty))
            }
            BuilderOp::Static => {
                let Some(Value::Closure(builder)) = arguments.into_iter().next() else {
                    return Err(EvalError::invalid(
                        "static expects a builder function",
                        location.cloned(),
                    ));
                };
                let statics = Rc::new(RefCell::new(Definitions::new(class, true)));
                self.call_closure(&builder, vec![Value::Builder(statics.clone())], location)?;
                let functions = mem::take(&mut statics.borrow_mut().functions);
                definitions.borrow_mut().statics.extend(functions);
                Ok(Value::Nothing)
            }
        }
    }
}

fn find_closure(closures: &[(String, Rc<Closure>)], name: &str) -> Option<Rc<Closure>> {
    closures
        .iter()
        .find(|(defined, _)| defined == name)
        .map(|(_, closure)| closure.clone())
}
