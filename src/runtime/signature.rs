use crate::runtime::{
    error::{EvalResult, TypeError},
    module::Module,
    types::TypeId,
};

/// Runtime coercion inserted where a value flows into a wider type.
#[derive(Clone, Debug, PartialEq)]
pub enum Conversion {
    Identity,
    IntToFloat,
    /// A dynamic value checked against a primitive type at run time.
    Checked(TypeId),
    /// Wraps the value with the method table of a concrete interface type.
    ToInterface(TypeId),
}

impl Conversion {
    pub fn is_identity(&self) -> bool {
        matches!(self, Conversion::Identity)
    }
}

/// Coercions applied around a call whose signature was accepted by another one.
#[derive(Clone, Debug, PartialEq)]
pub struct CallConversion {
    pub arguments: Vec<Conversion>,
    pub ret: Conversion,
}

impl CallConversion {
    pub fn is_identity(&self) -> bool {
        self.ret.is_identity() && self.arguments.iter().all(Conversion::is_identity)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Signature {
    /// Accepts any arguments.
    Any { ret: TypeId },
    Concrete {
        parameters: Vec<(String, TypeId)>,
        ret: TypeId,
    },
}

impl Signature {
    pub fn concrete(parameters: Vec<(&str, TypeId)>, ret: TypeId) -> Self {
        Signature::Concrete {
            parameters: parameters
                .into_iter()
                .map(|(name, ty)| (name.to_string(), ty))
                .collect(),
            ret,
        }
    }

    pub fn ret(&self) -> TypeId {
        match self {
            Signature::Any { ret } | Signature::Concrete { ret, .. } => *ret,
        }
    }

    pub fn arity(&self) -> Option<usize> {
        match self {
            Signature::Any { .. } => None,
            Signature::Concrete { parameters, .. } => Some(parameters.len()),
        }
    }

    /// The signature seen by callers that pass the receiver implicitly.
    pub fn without_self(self) -> Self {
        match self {
            Signature::Concrete {
                mut parameters,
                ret,
            } if !parameters.is_empty() => {
                parameters.remove(0);
                Signature::Concrete { parameters, ret }
            }
            other => other,
        }
    }

    /// Checks the given argument types and returns the concrete signature
    /// plus the conversion for each argument.
    pub fn instantiate(
        &self,
        module: &mut Module,
        given: &[TypeId],
    ) -> EvalResult<(Signature, Vec<Conversion>)> {
        match self {
            Signature::Any { ret } => {
                let parameters = given
                    .iter()
                    .enumerate()
                    .map(|(index, ty)| (format!("arg{index}"), *ty))
                    .collect();
                let conversions = vec![Conversion::Identity; given.len()];
                Ok((
                    Signature::Concrete {
                        parameters,
                        ret: *ret,
                    },
                    conversions,
                ))
            }
            Signature::Concrete { parameters, .. } => {
                if parameters.len() != given.len() {
                    return Err(TypeError::new(
                        format!(
                            "Different number of arguments: expected {}, got {}",
                            parameters.len(),
                            given.len()
                        ),
                        None,
                    )
                    .into());
                }

                let mut conversions = Vec::with_capacity(given.len());
                for ((name, expected), actual) in parameters.iter().zip(given) {
                    let conversion = module
                        .is_type_assignable(*actual, *expected)
                        .map_err(|error| {
                            error.wrap(format!("Incompatible types for parameter {name}"), None)
                        })?;
                    conversions.push(conversion);
                }
                Ok((self.clone(), conversions))
            }
        }
    }

    /// Whether a callable with signature `other` can stand in for one with
    /// this signature. Parameters are contravariant, the return covariant.
    pub fn assignable_from(&self, module: &mut Module, other: &Signature) -> EvalResult<CallConversion> {
        let ret = module.is_type_assignable(other.ret(), self.ret()).map_err(|error| {
            error.wrap(
                format!(
                    "Incompatible return type: {} is not assignable to {}",
                    module.type_name(other.ret()),
                    module.type_name(self.ret())
                ),
                None,
            )
        })?;

        let Signature::Concrete { parameters, .. } = self else {
            return Ok(CallConversion {
                arguments: Vec::new(),
                ret,
            });
        };
        let Signature::Concrete {
            parameters: other_parameters,
            ..
        } = other
        else {
            return Ok(CallConversion {
                arguments: vec![Conversion::Identity; parameters.len()],
                ret,
            });
        };

        if parameters.len() != other_parameters.len() {
            return Err(TypeError::new(
                format!(
                    "Different argument counts: expected {}, got {}",
                    parameters.len(),
                    other_parameters.len()
                ),
                None,
            )
            .into());
        }

        let mut arguments = Vec::with_capacity(parameters.len());
        for ((name, expected), (_, accepted)) in parameters.iter().zip(other_parameters) {
            let conversion = module
                .is_type_assignable(*expected, *accepted)
                .map_err(|error| error.wrap(format!("Incompatible parameter {name}"), None))?;
            arguments.push(conversion);
        }
        Ok(CallConversion { arguments, ret })
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
    fn arity_mismatch_is_a_type_error() {
        let mut module = module();
        let signature = Signature::concrete(vec![("a", TypeId::INT)], TypeId::INT);

        let error = signature
            .instantiate(&mut module, &[])
            .expect_err("arity differs");
        assert!(matches!(error, EvalError::Type(_)));
        assert_eq!(
            error.to_string(),
            "Different number of arguments: expected 1, got 0"
        );
    }

    #[test]
    fn int_arguments_widen_to_float() {
        let mut module = module();
        let signature = Signature::concrete(vec![("x", TypeId::FLOAT)], TypeId::FLOAT);

        let (_, conversions) = signature
            .instantiate(&mut module, &[TypeId::INT])
            .expect("assignable");
        assert_eq!(conversions, vec![Conversion::IntToFloat]);
    }

    #[test]
    fn incompatible_parameters_are_named() {
        let mut module = module();
        let signature = Signature::concrete(vec![("name", TypeId::STRING)], TypeId::INT);

        let error = signature
            .instantiate(&mut module, &[TypeId::BOOL])
            .expect_err("not assignable");
        assert_eq!(
            error.messages(),
            vec![
                "Incompatible types for parameter name".to_string(),
                "Cannot assign type Bool to String".to_string(),
            ]
        );
    }

    #[test]
    fn any_signatures_accept_everything() {
        let mut module = module();
        let (signature, conversions) = Signature::Any { ret: TypeId::ANY }
            .instantiate(&mut module, &[TypeId::INT, TypeId::STRING])
            .expect("any");

        assert_eq!(signature.arity(), Some(2));
        assert!(conversions.iter().all(Conversion::is_identity));
    }

    #[test]
    fn parameters_are_contravariant_and_returns_covariant() {
        let mut module = module();
        let required = Signature::concrete(vec![("x", TypeId::INT)], TypeId::FLOAT);
        let accepting = Signature::concrete(vec![("x", TypeId::FLOAT)], TypeId::INT);

        let conversion = required
            .assignable_from(&mut module, &accepting)
            .expect("wider parameter, narrower return");
        assert_eq!(conversion.arguments, vec![Conversion::IntToFloat]);
        assert_eq!(conversion.ret, Conversion::IntToFloat);

        assert!(accepting.assignable_from(&mut module, &required).is_err());
    }

    #[test]
    fn argument_counts_must_match() {
        let mut module = module();
        let required = Signature::concrete(vec![("x", TypeId::INT)], TypeId::INT);
        let other = Signature::concrete(Vec::new(), TypeId::INT);

        let error = required
            .assignable_from(&mut module, &other)
            .expect_err("counts differ");
        assert_eq!(error.to_string(), "Different argument counts: expected 1, got 0");
    }
}
