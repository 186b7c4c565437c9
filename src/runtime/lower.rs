use crate::language::{
    ast::{Arguments, Expr, ExprKind, FunctionExpr, Parameter, Pattern},
    span::Location,
};
use crate::runtime::{
    error::{EvalError, EvalResult},
    node::{
        CallNode, FunctionDefinition, FunctionParts, Node, PatternNode, TemplateDefinition,
        TemplateParts,
    },
    scope::{FunctionLayout, ScopeId, Scopes, Slot},
    types::TypeId,
    value::Value,
};
use std::rc::Rc;

/// The main function of a program, ready to be registered with a module.
#[derive(Debug)]
pub struct LoweredProgram {
    pub body: Node,
    pub layout: FunctionLayout,
    pub globals: Vec<(Slot, Value)>,
}

/// Resolves every name of `program` to a slot and builds the node tree.
pub fn lower_program(program: &Expr, globals: &[(String, Value)]) -> EvalResult<LoweredProgram> {
    let mut lowering = Lowering {
        scopes: Scopes::new(),
    };
    let root = lowering.scopes.new_function(None, Vec::new());
    let globals = globals
        .iter()
        .map(|(name, value)| (lowering.scopes.define(root, name, false), value.clone()))
        .collect();

    let body = lowering.lower(program, root)?;
    Ok(LoweredProgram {
        body,
        layout: lowering.scopes.layout(root),
        globals,
    })
}

struct Lowering {
    scopes: Scopes,
}

impl Lowering {
    fn lower(&mut self, expr: &Expr, scope: ScopeId) -> EvalResult<Node> {
        let location = expr.location.clone();
        match &expr.kind {
            ExprKind::Bool(value) => Ok(Node::literal(Value::Bool(*value), TypeId::BOOL, location)),
            ExprKind::Int(value) => Ok(Node::literal(Value::Int(*value), TypeId::INT, location)),
            ExprKind::Float(value) => {
                Ok(Node::literal(Value::Float(*value), TypeId::FLOAT, location))
            }
            ExprKind::String(value) => {
                Ok(Node::literal(Value::string(value), TypeId::STRING, location))
            }
            ExprKind::NameReference(name) => self.lower_name(name, scope, location),
            ExprKind::Call {
                target,
                name,
                arguments,
                may_be_var_call,
            } => self.lower_call(target, name, arguments, *may_be_var_call, scope, location),
            ExprKind::Block(statements) => match statements.as_slice() {
                [] => Err(EvalError::invalid(
                    "Cannot have a block with no statements",
                    location,
                )),
                [single] => self.lower(single, scope),
                statements => Ok(Node::Block {
                    statements: statements
                        .iter()
                        .map(|statement| self.lower(statement, scope))
                        .collect::<EvalResult<_>>()?,
                    ty: None,
                }),
            },
            ExprKind::Function(function) => self.lower_function(function, None, scope, location),
            ExprKind::Let { recursive: true, .. } => self.lower_recursive_lets(expr, scope),
            ExprKind::Let {
                name, value, body, ..
            } => {
                let scope = self.scopes.new_block(scope);
                let slot = self.scopes.define(scope, name, true);
                let value = self.lower_let_value(name, slot, value, scope)?;
                self.scopes.undefer(scope, name);
                let body = self.lower(body, scope)?;
                Ok(Node::Let {
                    name: name.clone(),
                    slot,
                    value: Box::new(value),
                    body: Box::new(body),
                    ty: None,
                })
            }
            ExprKind::FunctionType {
                parameters,
                return_type,
            } => Ok(Node::FunctionTypeDefinition {
                parameters: parameters
                    .iter()
                    .map(|(name, ty)| Ok((name.clone(), self.lower(ty, scope)?)))
                    .collect::<EvalResult<_>>()?,
                return_type: Box::new(self.lower(return_type, scope)?),
                location,
            }),
            ExprKind::TypeAssert { value, expected } => Ok(Node::TypeAssert {
                value: Box::new(self.lower(value, scope)?),
                expected: Box::new(self.lower(expected, scope)?),
                location,
            }),
        }
    }

    /// Unknown names fall back to a method of `self` when there is one.
    fn lower_name(&mut self, name: &str, scope: ScopeId, location: Option<Location>) -> EvalResult<Node> {
        if let Some(slot) = self.scopes.access(scope, name) {
            return Ok(Node::Reference {
                name: name.to_string(),
                slot,
                ty: None,
                location,
            });
        }
        match self.self_reference(scope, location.clone()) {
            Some(receiver) => Ok(call_node(receiver, name, Vec::new(), location)),
            None => Err(EvalError::UnknownName {
                name: name.to_string(),
                location,
            }),
        }
    }

    fn self_reference(&mut self, scope: ScopeId, location: Option<Location>) -> Option<Node> {
        let slot = self.scopes.access(scope, "self")?;
        Some(Node::Reference {
            name: "self".into(),
            slot,
            ty: None,
            location,
        })
    }

    fn lower_call(
        &mut self,
        target: &Expr,
        name: &str,
        arguments: &Arguments,
        may_be_var_call: bool,
        scope: ScopeId,
        location: Option<Location>,
    ) -> EvalResult<Node> {
        if let Some((argument, _)) = arguments.named.first() {
            return Err(EvalError::invalid(
                format!("Named arguments are not supported (`{argument}`)"),
                location,
            ));
        }
        if may_be_var_call {
            let lowered_arguments = self.lower_arguments(arguments, scope)?;
            if let Some(slot) = self.scopes.access(scope, name) {
                let variable = Node::Reference {
                    name: name.to_string(),
                    slot,
                    ty: None,
                    location: location.clone(),
                };
                return Ok(call_node(variable, "call", lowered_arguments, location));
            }
            return match self.self_reference(scope, target.location.clone()) {
                Some(receiver) => Ok(call_node(receiver, name, lowered_arguments, location)),
                None => Err(EvalError::UnknownName {
                    name: name.to_string(),
                    location,
                }),
            };
        }

        let target = self.lower(target, scope)?;
        let lowered_arguments = self.lower_arguments(arguments, scope)?;
        Ok(call_node(target, name, lowered_arguments, location))
    }

    fn lower_arguments(&mut self, arguments: &Arguments, scope: ScopeId) -> EvalResult<Vec<Node>> {
        arguments
            .positional
            .iter()
            .map(|argument| self.lower(argument, scope))
            .collect()
    }

    fn lower_let_value(&mut self, name: &str, slot: Slot, value: &Expr, scope: ScopeId) -> EvalResult<Node> {
        let mut value = self.lower(value, scope)?;
        match &mut value {
            Node::FunctionDefinition(definition) => {
                definition.name = Some(name.to_string());
                mark_self_capture(&mut definition.layout, slot);
            }
            Node::TemplateFunctionDefinition(definition) => {
                definition.name = Some(name.to_string());
                mark_self_capture(&mut definition.layout, slot);
            }
            _ => {}
        }
        Ok(value)
    }

    /// A recursive let and the recursive lets directly following it are
    /// defined together before any of their values is lowered.
    fn lower_recursive_lets(&mut self, expr: &Expr, scope: ScopeId) -> EvalResult<Node> {
        let scope = self.scopes.new_block(scope);

        let mut group = Vec::new();
        let mut current = expr;
        while let ExprKind::Let {
            name,
            value,
            body,
            recursive: true,
        } = &current.kind
        {
            let slot = self.scopes.define(scope, name, true);
            group.push((name.clone(), slot, value));
            current = body;
        }

        let mut values = Vec::with_capacity(group.len());
        for (name, slot, value) in &group {
            let value = self.lower_let_value(name, *slot, value, scope)?;
            self.scopes.undefer(scope, name);
            values.push(value);
        }

        let mut node = self.lower(current, scope)?;
        for ((name, slot, _), value) in group.into_iter().zip(values).rev() {
            node = Node::Let {
                name,
                slot,
                value: Box::new(value),
                body: Box::new(node),
                ty: None,
            };
        }
        Ok(node)
    }

    fn lower_function(
        &mut self,
        function: &FunctionExpr,
        name: Option<String>,
        scope: ScopeId,
        location: Option<Location>,
    ) -> EvalResult<Node> {
        let is_template = !function.compile_time
            && function.parameters.iter().any(|parameter| match &parameter.pattern {
                None => true,
                Some(pattern) => pattern.has_bindings(),
            });
        if is_template {
            return self.lower_template(function, name, scope, location);
        }

        let mut parameters = Vec::with_capacity(function.parameters.len());
        for parameter in &function.parameters {
            let ty = match &parameter.pattern {
                None => Node::literal(
                    Value::Type(TypeId::ANY),
                    TypeId::TYPE,
                    parameter.location.clone(),
                ),
                Some(pattern) if pattern.has_bindings() => {
                    return Err(EvalError::invalid(
                        "Compile-time functions cannot use pattern parameters",
                        parameter.location.clone(),
                    ))
                }
                Some(pattern) => match pattern.clone().into_expr() {
                    Some(expr) => self.lower(&expr, scope)?,
                    None => unreachable!("binding-free pattern without an expression"),
                },
            };
            parameters.push((parameter.name.clone(), ty));
        }
        let return_type = function
            .return_type
            .as_ref()
            .map(|ty| self.lower(ty, scope))
            .transpose()?;

        let (body, layout) = self.lower_body(&function.parameters, &function.body, scope)?;
        Ok(Node::FunctionDefinition(Box::new(FunctionDefinition {
            name,
            parts: Some(FunctionParts {
                parameters,
                return_type,
                body,
            }),
            layout: Rc::new(layout),
            compile_time: function.compile_time,
            function: None,
            ty: None,
            location,
        })))
    }

    /// Patterns and the return type live in a block of the enclosing function
    /// so their bindings can be staged while specializing.
    fn lower_template(
        &mut self,
        function: &FunctionExpr,
        name: Option<String>,
        scope: ScopeId,
        location: Option<Location>,
    ) -> EvalResult<Node> {
        let pattern_scope = self.scopes.new_block(scope);

        let mut parameters = Vec::with_capacity(function.parameters.len());
        for parameter in &function.parameters {
            let pattern = match &parameter.pattern {
                None => PatternNode::Binding {
                    name: format!("type of {}", parameter.name),
                    slot: self.scopes.allocate(pattern_scope),
                },
                Some(pattern) => self.lower_pattern(pattern, pattern_scope)?,
            };
            parameters.push((parameter.name.clone(), pattern));
        }
        let return_type = function
            .return_type
            .as_ref()
            .map(|ty| self.lower(ty, pattern_scope))
            .transpose()?;

        let (body, layout) = self.lower_body(&function.parameters, &function.body, pattern_scope)?;
        Ok(Node::TemplateFunctionDefinition(Box::new(TemplateDefinition {
            name,
            parts: Some(TemplateParts {
                parameters,
                return_type,
                body,
            }),
            layout: Rc::new(layout),
            template: None,
            ty: None,
            location,
        })))
    }

    fn lower_body(
        &mut self,
        parameters: &[Parameter],
        body: &Expr,
        scope: ScopeId,
    ) -> EvalResult<(Node, FunctionLayout)> {
        let arguments = parameters
            .iter()
            .map(|parameter| parameter.name.clone())
            .collect();
        let body_scope = self.scopes.new_function(Some(scope), arguments);
        let body = self.lower(body, body_scope)?;
        Ok((body, self.scopes.layout(body_scope)))
    }

    fn lower_pattern(&mut self, pattern: &Pattern, scope: ScopeId) -> EvalResult<PatternNode> {
        match pattern {
            Pattern::SpecificValue(expr) => Ok(PatternNode::SpecificValue(self.lower(expr, scope)?)),
            Pattern::Binding { name, location } => {
                if self.scopes.defines(scope, name) {
                    return Err(EvalError::invalid(
                        format!("`{name}` is bound more than once in the same parameter list"),
                        location.clone(),
                    ));
                }
                Ok(PatternNode::Binding {
                    name: name.clone(),
                    slot: self.scopes.define(scope, name, false),
                })
            }
            Pattern::Call {
                target,
                name,
                arguments,
                may_be_var_call,
                location,
            } => {
                let (target, name) = match self.scopes.access(scope, name) {
                    Some(slot) if *may_be_var_call => (
                        Node::Reference {
                            name: name.clone(),
                            slot,
                            ty: None,
                            location: location.clone(),
                        },
                        "call".to_string(),
                    ),
                    _ => (self.lower(target, scope)?, name.clone()),
                };
                let arguments = arguments
                    .iter()
                    .map(|argument| self.lower_pattern(argument, scope))
                    .collect::<EvalResult<_>>()?;
                Ok(PatternNode::Call {
                    target,
                    name,
                    arguments,
                    location: location.clone(),
                })
            }
            Pattern::FunctionType {
                parameters,
                return_type,
                location,
            } => {
                let parameters = parameters
                    .iter()
                    .map(|(name, pattern)| Ok((name.clone(), self.lower_pattern(pattern, scope)?)))
                    .collect::<EvalResult<_>>()?;
                Ok(PatternNode::FunctionType {
                    parameters,
                    return_type: Box::new(self.lower_pattern(return_type, scope)?),
                    location: location.clone(),
                })
            }
        }
    }
}

fn call_node(target: Node, name: &str, arguments: Vec<Node>, location: Option<Location>) -> Node {
    Node::Call(Box::new(CallNode {
        target,
        name: name.to_string(),
        arguments,
        dispatch: None,
        ty: None,
        location,
    }))
}

fn mark_self_capture(layout: &mut Rc<FunctionLayout>, slot: Slot) {
    let index = layout.captures.iter().position(|capture| capture.from == slot);
    if index.is_some() {
        Rc::make_mut(layout).self_capture = index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::{macro_expander::MacroRegistry, parser::parse_source};

    fn lower(source: &str) -> EvalResult<LoweredProgram> {
        let program = parse_source("lower.ph", source, &MacroRegistry::with_defaults())
            .unwrap_or_else(|err| panic!("failed to parse {source:?}: {err}"));
        lower_program(&program, &[("Int".into(), Value::Type(TypeId::INT))])
    }

    #[test]
    fn globals_take_the_first_slots() {
        let program = lower("Int").expect("lowered");
        assert_eq!(program.globals[0].0, 0);
        assert_eq!(program.body.to_string(), "Int@0");
    }

    #[test]
    fn shadowed_vals_get_fresh_slots() {
        let program = lower("val a = 1\nval a = a + 1\na").expect("lowered");
        assert_eq!(
            program.body.to_string(),
            "(let a 1 (let a (+ a@1 1) a@2))"
        );
        assert_eq!(program.layout.slot_count, 3);
    }

    #[test]
    fn calling_a_variable_becomes_call() {
        let program = lower("val f = (a: Int) a\nf 1").expect("lowered");
        assert_eq!(program.body.to_string(), "(let f (lambda f) (call f@1 1))");
    }

    #[test]
    fn functions_capture_what_they_use() {
        let program = lower("val one = 1\n(a: Int) a + one").expect("lowered");
        let Node::Let { body, .. } = program.body else {
            panic!("expected a let");
        };
        let Node::FunctionDefinition(definition) = *body else {
            panic!("expected a function");
        };
        assert_eq!(definition.layout.captures.len(), 1);
        assert_eq!(definition.layout.captures[0].from, 1);
        assert_eq!(definition.layout.argument_captures.len(), 1);
    }

    #[test]
    fn self_references_are_marked() {
        let program = lower("val f = (n: Int): Int f(n)\nf").expect("lowered");
        let Node::Let { value, .. } = program.body else {
            panic!("expected a let");
        };
        let Node::FunctionDefinition(definition) = *value else {
            panic!("expected a function");
        };
        assert_eq!(definition.layout.self_capture, Some(0));
    }

    #[test]
    fn untyped_parameters_make_templates() {
        let program = lower("(a) a").expect("lowered");
        assert!(matches!(program.body, Node::TemplateFunctionDefinition(_)));
    }

    #[test]
    fn compile_time_functions_reject_bindings() {
        let error = lower("@(a: val T) a").expect_err("rejected");
        assert_eq!(
            error.to_string(),
            "Compile-time functions cannot use pattern parameters"
        );
    }

    #[test]
    fn unknown_names_are_reported() {
        let error = lower("missing + 1").expect_err("unknown");
        assert!(matches!(error, EvalError::UnknownName { ref name, .. } if name == "missing"));
    }

    #[test]
    fn bare_calls_fall_back_to_self() {
        let program = lower("(self: Int) { answer 1 }").expect("lowered");
        let Node::FunctionDefinition(definition) = program.body else {
            panic!("expected a function");
        };
        let parts = definition.parts.expect("parts");
        assert_eq!(parts.body.to_string(), "(answer self@0 1)");
    }

    #[test]
    fn empty_blocks_are_rejected() {
        let error = lower("(a: Int) {}").expect_err("empty");
        assert_eq!(error.to_string(), "Cannot have a block with no statements");
    }

    #[test]
    fn recursive_lets_see_each_other_through_functions() {
        let program = lower("class A { def b: B }\nclass B { def a: A }\n1").expect("lowered");
        assert!(program.body.to_string().starts_with("(let A"));
    }

    #[test]
    fn a_binding_name_is_bound_once_per_parameter_list() {
        let error = lower("(a: val T, b: val T) a").expect_err("duplicate binding");
        assert_eq!(
            error.to_string(),
            "`T` is bound more than once in the same parameter list"
        );

        lower("(a: val T, b: T) b").expect("a binding can be reused as a type");
    }
}
