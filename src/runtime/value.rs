use crate::runtime::{
    class::{ClassId, Definitions},
    frame::StagingFrameRef,
    function::{FunctionId, TemplateId},
    interop::HostObject,
    types::TypeId,
};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Clone, Debug)]
pub enum Value {
    Nothing,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Rc<str>),
    Type(TypeId),
    Closure(Rc<Closure>),
    Object(Rc<Object>),
    Interface(Rc<InterfaceInstance>),
    Builder(Rc<RefCell<Definitions>>),
    Native(NativeValue),
    Host(HostObject),
}

/// Builtin global objects that are values but not types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NativeValue {
    ClassFactory,
    InterfaceFactory,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionRef {
    Function(FunctionId),
    Template(TemplateId),
}

pub struct Closure {
    pub function: FunctionRef,
    pub captures: Vec<CapturedValue>,
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("function", &self.function)
            .field("captures", &self.captures.len())
            .finish()
    }
}

/// One entry of a closure environment, in the order of the function's capture list.
#[derive(Clone)]
pub enum CapturedValue {
    Ready(Value),
    /// The slot was still pending when the closure was created; read it on call.
    Deferred {
        frame: StagingFrameRef,
        slot: usize,
        name: String,
    },
    /// The slot had no value when the closure was created.
    Missing(String),
    /// The closure refers to itself.
    Recursive,
}

impl fmt::Debug for CapturedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapturedValue::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            CapturedValue::Deferred { slot, name, .. } => f
                .debug_struct("Deferred")
                .field("slot", slot)
                .field("name", name)
                .finish(),
            CapturedValue::Missing(name) => f.debug_tuple("Missing").field(name).finish(),
            CapturedValue::Recursive => write!(f, "Recursive"),
        }
    }
}

#[derive(Debug)]
pub struct Object {
    pub class: ClassId,
    pub ty: TypeId,
    pub fields: Vec<Value>,
}

/// A value wrapped together with the method table of its interface conversion.
#[derive(Debug)]
pub struct InterfaceInstance {
    pub concrete: TypeId,
    pub value: Value,
}

impl Value {
    pub fn string(value: impl AsRef<str>) -> Self {
        Value::String(Rc::from(value.as_ref()))
    }

    /// Constants that partial evaluation may copy into a literal node.
    pub fn is_inlinable(&self) -> bool {
        matches!(
            self,
            Value::Nothing
                | Value::Bool(_)
                | Value::Int(_)
                | Value::Float(_)
                | Value::String(_)
                | Value::Type(_)
        )
    }

    pub fn as_type(&self) -> Option<TypeId> {
        match self {
            Value::Type(ty) => Some(*ty),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Nothing => "nothing",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Type(_) => "type",
            Value::Closure(_) => "function",
            Value::Object(_) => "object",
            Value::Interface(_) => "interface",
            Value::Builder(_) => "class builder",
            Value::Native(_) => "native",
            Value::Host(_) => "host object",
        }
    }
}

/// Structural for primitives and types, identity for everything else.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nothing, Value::Nothing) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Interface(a), Value::Interface(b)) => Rc::ptr_eq(a, b),
            (Value::Builder(a), Value::Builder(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => a == b,
            (Value::Host(a), Value::Host(b)) => a.same_object(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nothing => write!(f, "nothing"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::String(value) => write!(f, "{value}"),
            Value::Type(ty) => write!(f, "<type #{}>", ty.index()),
            Value::Closure(closure) => match closure.function {
                FunctionRef::Function(id) => write!(f, "<function #{}>", id.0),
                FunctionRef::Template(id) => write!(f, "<template #{}>", id.0),
            },
            Value::Object(object) => write!(f, "<object #{}>", object.class.0),
            Value::Interface(instance) => write!(f, "{}", instance.value),
            Value::Builder(_) => write!(f, "<class builder>"),
            Value::Native(NativeValue::ClassFactory) => write!(f, "Class"),
            Value::Native(NativeValue::InterfaceFactory) => write!(f, "Interface"),
            Value::Host(object) => write!(f, "<host {}>", object.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_compare_structurally() {
        assert_eq!(Value::string("a"), Value::string("a"));
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_eq!(Value::Type(TypeId::INT), Value::Type(TypeId::INT));
    }

    #[test]
    fn closures_compare_by_identity() {
        let closure = Rc::new(Closure {
            function: FunctionRef::Function(FunctionId(0)),
            captures: Vec::new(),
        });
        let same = Value::Closure(closure.clone());
        let other = Value::Closure(Rc::new(Closure {
            function: FunctionRef::Function(FunctionId(0)),
            captures: Vec::new(),
        }));

        assert_eq!(Value::Closure(closure), same);
        assert_ne!(same, other);
    }
}
