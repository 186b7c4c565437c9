use crate::runtime::{
    error::{EvalResult, TypeError},
    method::{Method, MethodCall, MethodKind},
    module::Module,
    signature::{Conversion, Signature},
    types::{TypeId, TypeKind},
};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

impl Module {
    /// Checks that a value of type `from` can be used where `to` is expected
    /// and returns the conversion to apply.
    pub fn is_type_assignable(&mut self, from: TypeId, to: TypeId) -> EvalResult<Conversion> {
        if to == TypeId::ANY || from == to {
            return Ok(Conversion::Identity);
        }
        if to == TypeId::TYPE && self.types.is_metatype(from) {
            return Ok(Conversion::Identity);
        }
        if from == TypeId::INT && to == TypeId::FLOAT {
            return Ok(Conversion::IntToFloat);
        }
        if self.types.is_dynamic(from) {
            if self.types.is_primitive(to) {
                return Ok(Conversion::Checked(to));
            }
            if self.types.is_interface(to) {
                return Ok(Conversion::Identity);
            }
        }
        let cannot_assign = format!(
            "Cannot assign type {} to {}",
            self.type_name(from),
            self.type_name(to)
        );
        if self.types.is_interface(to) {
            return self
                .interface_conversion(from, to)
                .map(Conversion::ToInterface)
                .map_err(|error| error.wrap(cannot_assign, None));
        }
        Err(TypeError::new(cannot_assign, None).into())
    }

    /// Builds the method table that lets values of `from` act as `interface`.
    /// Tables are cached per pair of types.
    fn interface_conversion(&mut self, from: TypeId, interface: TypeId) -> EvalResult<TypeId> {
        if let Some(concrete) = self.types.cached_conversion(interface, from) {
            debug!(
                from = %self.type_name(from),
                interface = %self.type_name(interface),
                "interface conversion served from cache"
            );
            return Ok(concrete);
        }

        let required = self.required_methods(interface)?;
        let mut methods = HashMap::with_capacity(required.len());
        for (name, signature) in required {
            let argument_types = match &signature {
                Signature::Concrete { parameters, .. } => {
                    parameters.iter().map(|(_, ty)| *ty).collect::<Vec<_>>()
                }
                Signature::Any { .. } => Vec::new(),
            };
            let Some(method) = self.get_method(from, &name, Some(&argument_types))? else {
                return Err(TypeError::new(
                    format!(
                        "Type {} does not have a method named {name}",
                        self.type_name(from)
                    ),
                    None,
                )
                .into());
            };
            if method.kind != MethodKind::Default {
                return Err(TypeError::new(
                    format!(
                        "Method {name} of type {} can only run at compile time",
                        self.type_name(from)
                    ),
                    None,
                )
                .into());
            }
            let conversion = signature
                .assignable_from(self, &method.signature)
                .map_err(|error| error.wrap(format!("Incompatible method {name}"), None))?;
            let method = if conversion.is_identity() {
                method
            } else {
                Rc::new(Method::new(
                    signature,
                    MethodCall::Converted {
                        inner: method,
                        conversion,
                    },
                ))
            };
            methods.insert(name, method);
        }

        let concrete = self.types.add_concrete_interface(interface, from, methods);
        debug!(
            from = %self.type_name(from),
            interface = %self.type_name(interface),
            "built interface conversion"
        );
        Ok(concrete)
    }

    /// Virtual methods an implementation of `interface` has to provide.
    fn required_methods(&mut self, interface: TypeId) -> EvalResult<Vec<(String, Signature)>> {
        match self.types.kind(interface).clone() {
            TypeKind::FunctionalInterface { parameters, ret } => {
                Ok(vec![("call".to_string(), Signature::Concrete { parameters, ret })])
            }
            TypeKind::Interface(class) => {
                let shape = self.shape(class)?;
                let required = shape
                    .properties
                    .iter()
                    .map(|(name, ty)| {
                        let signature = match self.types.kind(*ty) {
                            TypeKind::FunctionalInterface { parameters, ret } => Signature::Concrete {
                                parameters: parameters.clone(),
                                ret: *ret,
                            },
                            _ => Signature::concrete(Vec::new(), *ty),
                        };
                        (name.clone(), signature)
                    })
                    .collect();
                Ok(required)
            }
            other => panic!("interface conversion to non-interface {other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::runtime::error::EvalError;

    fn module() -> Module {
        Module::new(EngineConfig::default(), None)
    }

    #[test]
    fn primitive_rules() {
        let mut module = module();

        assert_eq!(
            module.is_type_assignable(TypeId::INT, TypeId::ANY).expect("any"),
            Conversion::Identity
        );
        assert_eq!(
            module.is_type_assignable(TypeId::INT, TypeId::FLOAT).expect("widening"),
            Conversion::IntToFloat
        );
        assert_eq!(
            module
                .is_type_assignable(TypeId::DYNAMIC, TypeId::STRING)
                .expect("checked"),
            Conversion::Checked(TypeId::STRING)
        );

        let error = module
            .is_type_assignable(TypeId::FLOAT, TypeId::INT)
            .expect_err("no narrowing");
        assert!(matches!(error, EvalError::Type(_)));
        assert_eq!(error.to_string(), "Cannot assign type Float to Int");
    }

    #[test]
    fn metatypes_are_types() {
        let mut module = module();
        let interface = module
            .types
            .functional_interface(vec![("x".into(), TypeId::INT)], TypeId::INT);
        let meta = module.types.meta(interface);

        assert_eq!(
            module.is_type_assignable(meta, TypeId::TYPE).expect("metatype"),
            Conversion::Identity
        );
        assert!(module.is_type_assignable(TypeId::INT, TypeId::TYPE).is_err());
    }

    #[test]
    fn missing_call_method_is_reported() {
        let mut module = module();
        let interface = module.types.functional_interface(Vec::new(), TypeId::INT);

        let error = module
            .is_type_assignable(TypeId::STRING, interface)
            .expect_err("strings are not callable");
        assert_eq!(
            error.messages(),
            vec![
                "Cannot assign type String to (): Int".to_string(),
                "Type String does not have a method named call".to_string(),
            ]
        );
    }
}
