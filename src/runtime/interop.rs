use crate::language::span::Location;
use crate::runtime::{
    error::{EvalError, EvalResult},
    module::Module,
    value::Value,
};
use std::any::Any;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;
use tracing::trace;

/// Static type a bridge reports for one of its objects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostType {
    Dynamic,
    /// An opaque type shown under this name. Calls still go through the bridge.
    Named(String),
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct HostError {
    pub message: String,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Opaque handle to an object owned by the embedding program.
#[derive(Clone)]
pub struct HostObject {
    name: Rc<str>,
    handle: Rc<dyn Any>,
}

impl HostObject {
    pub fn new<T: Any>(name: impl AsRef<str>, value: T) -> Self {
        Self {
            name: Rc::from(name.as_ref()),
            handle: Rc::new(value),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.handle.downcast_ref()
    }

    pub fn same_object(&self, other: &HostObject) -> bool {
        Rc::ptr_eq(&self.handle, &other.handle)
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostObject").field("name", &self.name).finish()
    }
}

/// Member access on host objects.
pub trait HostBridge {
    fn invoke_member(
        &self,
        target: &HostObject,
        member: &str,
        arguments: &[Value],
    ) -> Result<Value, HostError>;

    fn static_type(&self, _target: &HostObject) -> HostType {
        HostType::Dynamic
    }
}

impl Module {
    pub(crate) fn call_host(
        &mut self,
        target: &Value,
        member: &str,
        arguments: Vec<Value>,
        location: Option<&Location>,
    ) -> EvalResult<Value> {
        let Value::Host(object) = target else {
            panic!("host call on {target:?}");
        };
        let failure = |message: &str| EvalError::Host {
            member: member.to_string(),
            message: message.to_string(),
            location: location.cloned(),
        };
        if self.is_compile_time() {
            return Err(failure("host objects cannot be used at compile time"));
        }
        let Some(host) = self.host.clone() else {
            return Err(failure("no host bridge is installed"));
        };
        trace!(object = %object.name(), member, arguments = arguments.len(), "host call");
        host.invoke_member(object, member, &arguments)
            .map_err(|error| failure(&error.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_objects_compare_by_identity() {
        let a = HostObject::new("Counter", 1_u32);
        let b = a.clone();
        let c = HostObject::new("Counter", 1_u32);

        assert!(a.same_object(&b));
        assert!(!a.same_object(&c));
        assert_eq!(a.downcast_ref::<u32>(), Some(&1));
        assert_eq!(a.downcast_ref::<String>(), None);
    }
}
