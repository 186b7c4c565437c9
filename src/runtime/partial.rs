use crate::runtime::{
    error::{EvalError, EvalResult, TypeError},
    frame::{Frame, Staged, StagingFrameRef},
    function::{FunctionKind, FunctionSource, TemplateSource},
    method::{MethodCall, MethodKind},
    module::Module,
    node::{CallNode, Dispatch, Node},
    signature::{Conversion, Signature},
    types::{TypeId, TypeOrigin},
    value::Value,
};

/// The module being prepared plus the staging frame of the function whose
/// body is being evaluated.
pub struct PartialContext<'m> {
    pub module: &'m mut Module,
    pub frame: StagingFrameRef,
}

impl<'m> PartialContext<'m> {
    pub fn new(module: &'m mut Module, frame: StagingFrameRef) -> Self {
        Self { module, frame }
    }

    fn compile_time_frame(&self) -> Frame {
        Frame::from_staging(self.frame.clone())
    }
}

impl Node {
    /// Resolves static types, registers functions and folds compile-time
    /// calls. Evaluating an already evaluated node returns it unchanged.
    pub fn evaluate_partial(self, cx: &mut PartialContext<'_>) -> EvalResult<Node> {
        match self {
            Node::Literal { .. } | Node::Convert { .. } => Ok(self),
            Node::Call(call) => evaluate_call(*call, cx),
            Node::Let {
                name,
                slot,
                value,
                body,
                ty: None,
            } => {
                cx.frame.borrow_mut().stage(slot, Staged::Pending);
                let value = value.evaluate_partial(cx)?;
                let constant = let_constant(&value, cx)?;
                cx.frame
                    .borrow_mut()
                    .stage_known(slot, value.ty(), constant);

                let body = body.evaluate_partial(cx)?;
                let ty = Some(body.ty());
                Ok(Node::Let {
                    name,
                    slot,
                    value: Box::new(value),
                    body: Box::new(body),
                    ty,
                })
            }
            Node::Reference {
                name,
                slot,
                ty: None,
                location,
            } => {
                let entry = cx.frame.borrow().entry(slot).cloned();
                match entry {
                    None => panic!("no staging entry for `{name}` in slot {slot}"),
                    Some(Staged::Pending) => Err(EvalError::UsedBeforeDefinition { name, location }),
                    Some(Staged::Known {
                        ty,
                        value: Some(value),
                    }) if value.is_inlinable() => Ok(Node::literal(value, ty, location)),
                    Some(Staged::Known { ty, .. }) => Ok(Node::Reference {
                        name,
                        slot,
                        ty: Some(ty),
                        location,
                    }),
                }
            }
            Node::Block {
                statements,
                ty: None,
            } => {
                let statements = statements
                    .into_iter()
                    .map(|statement| statement.evaluate_partial(cx))
                    .collect::<EvalResult<Vec<_>>>()?;
                let ty = statements.last().map(Node::ty).unwrap_or(TypeId::NOTHING);
                Ok(Node::Block {
                    statements,
                    ty: Some(ty),
                })
            }
            Node::FunctionDefinition(mut definition) if definition.function.is_none() => {
                let Some(parts) = definition.parts.take() else {
                    panic!("function definition without parts");
                };
                let kind = if definition.compile_time {
                    FunctionKind::CompileTime
                } else {
                    FunctionKind::Runtime
                };
                let id = cx.module.add_function(FunctionSource {
                    name: definition.name.clone(),
                    kind,
                    parameters: parts.parameters,
                    return_type: parts.return_type,
                    body: parts.body,
                    layout: definition.layout.clone(),
                    defining_frame: cx.frame.clone(),
                    location: definition.location.clone(),
                });
                definition.function = Some(id);
                definition.ty = Some(cx.module.function(id).type_id);
                Ok(Node::FunctionDefinition(definition))
            }
            Node::TemplateFunctionDefinition(mut definition) if definition.template.is_none() => {
                let Some(parts) = definition.parts.take() else {
                    panic!("template definition without parts");
                };
                let id = cx.module.add_template(TemplateSource {
                    name: definition.name.clone(),
                    parameters: parts.parameters,
                    return_type: parts.return_type,
                    body: parts.body,
                    layout: definition.layout.clone(),
                    defining_frame: cx.frame.clone(),
                    location: definition.location.clone(),
                });
                definition.template = Some(id);
                definition.ty = Some(cx.module.template(id).type_id);
                Ok(Node::TemplateFunctionDefinition(definition))
            }
            Node::FunctionTypeDefinition {
                parameters,
                return_type,
                location,
            } => {
                let mut resolved = Vec::with_capacity(parameters.len());
                for (name, node) in parameters {
                    let frame = cx.frame.clone();
                    resolved.push((name, cx.module.evaluate_type(node, &frame)?));
                }
                let frame = cx.frame.clone();
                let ret = cx.module.evaluate_type(*return_type, &frame)?;
                let ty = cx.module.types.functional_interface(resolved, ret);
                let meta = cx.module.types.meta(ty);
                Ok(Node::literal(Value::Type(ty), meta, location))
            }
            Node::TypeAssert {
                value,
                expected,
                location,
            } => {
                let value = value.evaluate_partial(cx)?;
                let frame = cx.frame.clone();
                let expected = cx.module.evaluate_type(*expected, &frame)?;
                if expected == TypeId::ANY {
                    return Ok(value);
                }
                let from = value.ty();
                let conversion = cx.module.is_type_assignable(from, expected).map_err(|error| {
                    error.wrap("Incompatible type in type assertion", location.clone())
                })?;
                Ok(Node::Convert {
                    value: Box::new(value),
                    conversion,
                    ty: expected,
                })
            }
            evaluated => Ok(evaluated),
        }
    }
}

fn evaluate_call(mut call: CallNode, cx: &mut PartialContext<'_>) -> EvalResult<Node> {
    if call.ty.is_some() {
        return Ok(Node::Call(Box::new(call)));
    }
    let location = call.location.clone();

    let target = call.target.evaluate_partial(cx)?;
    let arguments = call
        .arguments
        .into_iter()
        .map(|argument| argument.evaluate_partial(cx))
        .collect::<EvalResult<Vec<_>>>()?;
    let target_type = target.ty();

    if target_type == TypeId::DYNAMIC {
        call.target = target;
        call.arguments = arguments;
        call.dispatch = Some(Dispatch::Dynamic);
        call.ty = Some(TypeId::DYNAMIC);
        return Ok(Node::Call(Box::new(call)));
    }

    let argument_types = arguments.iter().map(Node::ty).collect::<Vec<_>>();
    let method = cx
        .module
        .get_method(target_type, &call.name, Some(&argument_types))
        .map_err(|error| error.with_location(location.as_ref()))?
        .ok_or_else(|| EvalError::UnknownMethod {
            type_name: cx.module.type_name(target_type),
            method: call.name.clone(),
            location: location.clone(),
        })?;

    let (signature, conversions) = method
        .signature
        .instantiate(cx.module, &argument_types)
        .map_err(|error| {
            error.wrap(
                format!("Cannot call `{}` on {}", call.name, cx.module.type_name(target_type)),
                location.clone(),
            )
        })?;
    let parameter_types = match &signature {
        Signature::Concrete { parameters, .. } => {
            parameters.iter().map(|(_, ty)| *ty).collect::<Vec<_>>()
        }
        Signature::Any { .. } => argument_types.clone(),
    };
    let arguments = arguments
        .into_iter()
        .zip(conversions)
        .zip(parameter_types)
        .map(|((argument, conversion), ty)| match conversion {
            Conversion::Identity if argument.ty() == ty || ty == TypeId::ANY => argument,
            conversion => Node::Convert {
                value: Box::new(argument),
                conversion,
                ty,
            },
        })
        .collect::<Vec<_>>();

    if method.kind == MethodKind::Partial {
        let mut frame = cx.compile_time_frame();
        let target_value = target.execute(&mut frame, cx.module)?;
        let argument_values = arguments
            .iter()
            .map(|argument| argument.execute(&mut frame, cx.module))
            .collect::<EvalResult<Vec<_>>>()?;
        let value = cx
            .module
            .invoke(&method, target_value.clone(), argument_values.clone(), location.as_ref())?;
        let produces_type = matches!(
            method.call,
            MethodCall::CompileTimeCall(_) | MethodCall::DefineClass(_)
        );
        if let (Value::Type(ty), true) = (&value, produces_type) {
            cx.module.types.record_origin(
                *ty,
                TypeOrigin {
                    target: target_value,
                    method: call.name.clone(),
                    arguments: argument_values,
                },
            );
        }
        let ty = cx.module.type_of(&value);
        return Ok(Node::literal(value, ty, location));
    }

    call.target = target;
    call.arguments = arguments;
    call.ty = Some(signature.ret());
    call.dispatch = Some(Dispatch::Static(method));
    Ok(Node::Call(Box::new(call)))
}

/// Constant a `let` stages for its slot. Closures are created now so that
/// compile-time code can call them.
fn let_constant(value: &Node, cx: &mut PartialContext<'_>) -> EvalResult<Option<Value>> {
    match value {
        Node::Literal { value, .. } => Ok(Some(value.clone())),
        Node::FunctionDefinition(definition) => {
            let function = definition
                .function
                .map(|id| cx.module.function(id).kind)
                .unwrap_or(FunctionKind::Runtime);
            let mut frame = cx.compile_time_frame();
            match function {
                FunctionKind::CompileTime => value.execute(&mut frame, cx.module).map(Some),
                FunctionKind::Runtime => Ok(value.execute(&mut frame, cx.module).ok()),
            }
        }
        Node::TemplateFunctionDefinition(_) => {
            let mut frame = cx.compile_time_frame();
            Ok(value.execute(&mut frame, cx.module).ok())
        }
        _ => Ok(None),
    }
}

impl Module {
    /// Evaluates a node that must produce a type.
    pub fn evaluate_type(&mut self, node: Node, frame: &StagingFrameRef) -> EvalResult<TypeId> {
        let location = node.location().cloned();
        let value = self.evaluate_value(node, frame)?;
        match value {
            Value::Type(ty) => Ok(ty),
            other => Err(TypeError::new(
                format!("Expected a type, got {}", self.describe(&other)),
                location,
            )
            .into()),
        }
    }

    /// Partially evaluates and then executes a node against a staging frame.
    pub fn evaluate_value(&mut self, node: Node, frame: &StagingFrameRef) -> EvalResult<Value> {
        let node = node.evaluate_partial(&mut PartialContext::new(self, frame.clone()))?;
        node.execute(&mut Frame::from_staging(frame.clone()), self)
    }

    /// Wraps `node` so that its static type becomes `to`.
    pub fn coerce(&mut self, node: Node, to: TypeId, context: &str) -> EvalResult<Node> {
        let from = node.ty();
        if from == to {
            return Ok(node);
        }
        let location = node.location().cloned();
        let conversion = self
            .is_type_assignable(from, to)
            .map_err(|error| error.wrap(context, location))?;
        Ok(Node::Convert {
            value: Box::new(node),
            conversion,
            ty: to,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::language::{macro_expander::MacroRegistry, parser::parse_source};
    use crate::runtime::{frame::StagingFrame, lower::lower_program};

    fn lowered(source: &str) -> (Module, Node, StagingFrameRef) {
        let program = parse_source("partial.ph", source, &MacroRegistry::empty())
            .unwrap_or_else(|err| panic!("failed to parse {source:?}: {err}"));
        let lowered = lower_program(&program, &[("Int".into(), Value::Type(TypeId::INT))])
            .expect("lowered");
        let staging = StagingFrame::new(lowered.layout.slot_count);
        for (slot, value) in &lowered.globals {
            staging
                .borrow_mut()
                .stage_known(*slot, TypeId::TYPE, Some(value.clone()));
        }
        (Module::new(EngineConfig::default(), None), lowered.body, staging)
    }

    #[test]
    fn evaluating_twice_changes_nothing() {
        let (mut module, body, staging) = lowered("val add = (a: Int, b: Int) a + b\nadd(1, 2)");

        let once = body
            .evaluate_partial(&mut PartialContext::new(&mut module, staging.clone()))
            .expect("first pass");
        assert_eq!(module.functions().len(), 1);
        assert_eq!(once.ty(), TypeId::INT);

        let twice = once
            .clone()
            .evaluate_partial(&mut PartialContext::new(&mut module, staging))
            .expect("second pass");
        assert_eq!(module.functions().len(), 1);
        assert_eq!(format!("{twice:?}"), format!("{once:?}"));
    }

    #[test]
    fn staged_constants_are_folded() {
        let (mut module, body, staging) = lowered("val x = 20\nx + 22");

        let evaluated = body
            .evaluate_partial(&mut PartialContext::new(&mut module, staging))
            .expect("evaluated");
        let Node::Let { body, .. } = evaluated else {
            panic!("expected a let, got {evaluated:?}");
        };
        let Node::Call(call) = *body else {
            panic!("expected a call");
        };
        assert!(matches!(call.target, Node::Literal { value: Value::Int(20), .. }));
    }
}
