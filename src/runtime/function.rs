use crate::language::span::Location;
use crate::runtime::{
    error::{EvalError, EvalResult, TypeError},
    frame::{Frame, Staged, StagingFrame, StagingFrameRef},
    module::Module,
    node::{Node, PatternNode},
    partial::PartialContext,
    scope::{FunctionLayout, Slot},
    signature::Signature,
    types::{TypeId, TypeKind},
    value::{CapturedValue, Closure, Value},
};
use std::collections::HashMap;
use std::mem;
use std::rc::Rc;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FunctionId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TemplateId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionKind {
    Runtime,
    /// Re-evaluated on every call and folded into the caller.
    CompileTime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionState {
    Pending,
    Evaluating,
    Done,
}

#[derive(Debug)]
enum Resolution<P, T> {
    Pending(P),
    Resolving,
    Resolved(T),
}

#[derive(Debug)]
enum Body {
    Pending(Node),
    Evaluating,
    Ready(Rc<Node>),
    /// Compile-time functions keep the unevaluated body and copy it per call.
    Source(Rc<Node>),
}

#[derive(Debug)]
pub struct Function {
    pub name: Option<String>,
    pub kind: FunctionKind,
    pub state: FunctionState,
    pub layout: Rc<FunctionLayout>,
    pub type_id: TypeId,
    pub location: Option<Location>,
    parameters: Resolution<Vec<(String, Node)>, Vec<(String, TypeId)>>,
    declared_return: Resolution<Option<Node>, Option<TypeId>>,
    inferred_return: Option<TypeId>,
    body: Body,
    defining_frame: StagingFrameRef,
    globals: Vec<(Slot, Value)>,
}

/// Everything needed to register a function with a module.
pub struct FunctionSource {
    pub name: Option<String>,
    pub kind: FunctionKind,
    pub parameters: Vec<(String, Node)>,
    pub return_type: Option<Node>,
    pub body: Node,
    pub layout: Rc<FunctionLayout>,
    pub defining_frame: StagingFrameRef,
    pub location: Option<Location>,
}

#[derive(Debug)]
pub struct Template {
    pub name: Option<String>,
    pub type_id: TypeId,
    pub layout: Rc<FunctionLayout>,
    pub location: Option<Location>,
    parameters: Vec<(String, PatternNode)>,
    return_type: Option<Node>,
    body: Node,
    defining_frame: StagingFrameRef,
    specializations: HashMap<Vec<TypeId>, FunctionId>,
}

pub struct TemplateSource {
    pub name: Option<String>,
    pub parameters: Vec<(String, PatternNode)>,
    pub return_type: Option<Node>,
    pub body: Node,
    pub layout: Rc<FunctionLayout>,
    pub defining_frame: StagingFrameRef,
    pub location: Option<Location>,
}

impl Function {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }
}

impl Template {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }

    pub fn specialization_count(&self) -> usize {
        self.specializations.len()
    }
}

impl Module {
    pub fn add_function(&mut self, source: FunctionSource) -> FunctionId {
        self.assert_registration_open();
        let id = FunctionId(self.functions.len());
        let kind = match source.kind {
            FunctionKind::Runtime => TypeKind::Function(id),
            FunctionKind::CompileTime => TypeKind::CompileTimeFunction(id),
        };
        let type_name = format!("function {}", source.name.as_deref().unwrap_or("<anonymous>"));
        let type_id = self.types.add(type_name, kind);
        let (state, body) = match source.kind {
            FunctionKind::Runtime => (FunctionState::Pending, Body::Pending(source.body)),
            FunctionKind::CompileTime => (FunctionState::Done, Body::Source(Rc::new(source.body))),
        };
        self.functions.push(Function {
            name: source.name,
            kind: source.kind,
            state,
            layout: source.layout,
            type_id,
            location: source.location,
            parameters: Resolution::Pending(source.parameters),
            declared_return: Resolution::Pending(source.return_type),
            inferred_return: None,
            body,
            defining_frame: source.defining_frame,
            globals: Vec::new(),
        });
        id
    }

    /// Registers the program entry point with the globals it sees as constants.
    pub fn add_main(&mut self, body: Node, layout: FunctionLayout, globals: Vec<(Slot, Value)>) -> FunctionId {
        let id = self.add_function(FunctionSource {
            name: Some("main".into()),
            kind: FunctionKind::Runtime,
            parameters: Vec::new(),
            return_type: None,
            body,
            layout: Rc::new(layout),
            defining_frame: StagingFrame::new(0),
            location: None,
        });
        self.functions[id.0].globals = globals;
        self.main = Some(id);
        id
    }

    pub fn add_template(&mut self, source: TemplateSource) -> TemplateId {
        self.assert_registration_open();
        let id = TemplateId(self.templates.len());
        let type_name = format!("template {}", source.name.as_deref().unwrap_or("<anonymous>"));
        let type_id = self.types.add(type_name, TypeKind::Template(id));
        self.templates.push(Template {
            name: source.name,
            type_id,
            layout: source.layout,
            location: source.location,
            parameters: source.parameters,
            return_type: source.return_type,
            body: source.body,
            defining_frame: source.defining_frame,
            specializations: HashMap::new(),
        });
        id
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.0]
    }

    pub fn template(&self, id: TemplateId) -> &Template {
        &self.templates[id.0]
    }

    pub fn parameter_types(&mut self, id: FunctionId) -> EvalResult<Vec<(String, TypeId)>> {
        let function = &mut self.functions[id.0];
        let parameters = match mem::replace(&mut function.parameters, Resolution::Resolving) {
            Resolution::Resolved(parameters) => {
                function.parameters = Resolution::Resolved(parameters.clone());
                return Ok(parameters);
            }
            Resolution::Resolving => {
                return Err(EvalError::invalid(
                    format!(
                        "Parameter types of {} depend on the function itself",
                        function.display_name()
                    ),
                    function.location.clone(),
                ))
            }
            Resolution::Pending(parameters) => parameters,
        };
        let frame = function.defining_frame.clone();

        let mut resolved = Vec::with_capacity(parameters.len());
        for (name, node) in parameters {
            let ty = self
                .evaluate_type(node, &frame)
                .map_err(|error| error.wrap(format!("Invalid type for parameter {name}"), None))?;
            resolved.push((name, ty));
        }
        self.functions[id.0].parameters = Resolution::Resolved(resolved.clone());
        Ok(resolved)
    }

    pub fn declared_return_type(&mut self, id: FunctionId) -> EvalResult<Option<TypeId>> {
        let function = &mut self.functions[id.0];
        let node = match mem::replace(&mut function.declared_return, Resolution::Resolving) {
            Resolution::Resolved(ty) => {
                function.declared_return = Resolution::Resolved(ty);
                return Ok(ty);
            }
            Resolution::Resolving => {
                return Err(EvalError::invalid(
                    format!(
                        "Return type of {} depends on the function itself",
                        function.display_name()
                    ),
                    function.location.clone(),
                ))
            }
            Resolution::Pending(None) => {
                function.declared_return = Resolution::Resolved(None);
                return Ok(None);
            }
            Resolution::Pending(Some(node)) => node,
        };
        let frame = function.defining_frame.clone();

        let ty = self
            .evaluate_type(node, &frame)
            .map_err(|error| error.wrap("Invalid return type", None))?;
        self.functions[id.0].declared_return = Resolution::Resolved(Some(ty));
        Ok(Some(ty))
    }

    pub fn return_type(&mut self, id: FunctionId) -> EvalResult<TypeId> {
        if let Some(ty) = self.declared_return_type(id)? {
            return Ok(ty);
        }
        let function = &self.functions[id.0];
        if function.kind == FunctionKind::CompileTime {
            return Ok(TypeId::ANY);
        }
        match function.state {
            FunctionState::Done => {}
            FunctionState::Evaluating => {
                return Err(EvalError::invalid(
                    format!(
                        "Cannot infer the return type of {} while it is being evaluated; declare it explicitly",
                        function.display_name()
                    ),
                    function.location.clone(),
                ))
            }
            FunctionState::Pending => self.ensure_partially_evaluated(id)?,
        }
        match self.functions[id.0].inferred_return {
            Some(ty) => Ok(ty),
            None => panic!("function #{} is done without a return type", id.0),
        }
    }

    pub fn signature(&mut self, id: FunctionId) -> EvalResult<Signature> {
        let parameters = self.parameter_types(id)?;
        let ret = self.return_type(id)?;
        Ok(Signature::Concrete { parameters, ret })
    }

    /// Partially evaluates the body of a runtime function once.
    pub fn ensure_partially_evaluated(&mut self, id: FunctionId) -> EvalResult<()> {
        let function = &mut self.functions[id.0];
        if function.kind == FunctionKind::CompileTime || function.state != FunctionState::Pending {
            return Ok(());
        }
        function.state = FunctionState::Evaluating;
        let body = match mem::replace(&mut function.body, Body::Evaluating) {
            Body::Pending(body) => body,
            other => panic!("pending function #{} has body {other:?}", id.0),
        };
        debug!(function = %function.display_name(), id = id.0, "partially evaluating function");

        let parameters = self.parameter_types(id)?;
        let declared = self.declared_return_type(id)?;

        let function = &self.functions[id.0];
        let layout = function.layout.clone();
        let defining = function.defining_frame.clone();
        let own_type = function.type_id;
        let globals = function
            .globals
            .iter()
            .map(|(slot, value)| (*slot, self.type_of(value), value.clone()))
            .collect::<Vec<_>>();

        let staging = StagingFrame::new(layout.slot_count);
        {
            let mut staged = staging.borrow_mut();
            for (slot, ty, value) in globals {
                staged.stage_known(slot, ty, Some(value));
            }
            for capture in &layout.argument_captures {
                staged.stage_known(capture.to, parameters[capture.argument_index].1, None);
            }
            let defining = defining.borrow();
            for (index, capture) in layout.captures.iter().enumerate() {
                let entry = match defining.entry(capture.from) {
                    Some(entry) => entry.clone(),
                    None if layout.self_capture == Some(index) => Staged::Known {
                        ty: own_type,
                        value: None,
                    },
                    None => Staged::Pending,
                };
                staged.stage(capture.to, entry);
            }
        }

        let body = body.evaluate_partial(&mut PartialContext::new(self, staging))?;
        let body = match declared {
            Some(ret) => self.coerce(body, ret, "Incompatible return type")?,
            None => body,
        };

        let function = &mut self.functions[id.0];
        function.inferred_return = Some(body.ty());
        function.body = Body::Ready(Rc::new(body));
        function.state = FunctionState::Done;
        Ok(())
    }

    /// Executes a runtime function with a fresh frame.
    pub fn call_function(
        &mut self,
        id: FunctionId,
        closure: &Rc<Closure>,
        arguments: Vec<Value>,
        location: Option<&Location>,
    ) -> EvalResult<Value> {
        self.enter_call(location)?;
        let result = self.call_function_inner(id, closure, arguments);
        self.exit_call();
        result.map_err(|error| error.with_location(location))
    }

    fn call_function_inner(
        &mut self,
        id: FunctionId,
        closure: &Rc<Closure>,
        arguments: Vec<Value>,
    ) -> EvalResult<Value> {
        if self.functions[id.0].state == FunctionState::Pending && self.is_compile_time() {
            self.ensure_partially_evaluated(id)?;
        }
        let function = &self.functions[id.0];
        let body = match &function.body {
            Body::Ready(body) => body.clone(),
            _ => {
                return Err(EvalError::invalid(
                    format!(
                        "{} cannot be called while it is being compiled",
                        function.display_name()
                    ),
                    function.location.clone(),
                ))
            }
        };
        tracing::trace!(function = %function.display_name(), arguments = arguments.len(), "call");

        let layout = function.layout.clone();
        let mut frame = Frame::new(layout.slot_count);
        for (slot, value) in &function.globals {
            frame.set(*slot, value.clone());
        }
        bind_captures(&mut frame, &layout, closure, |_, _| {});
        bind_arguments(&mut frame, &layout, &arguments, function.display_name())?;

        body.execute(&mut frame, self)
    }

    /// Runs a compile-time function: a copy of its body is partially evaluated
    /// with the arguments as constants and then executed.
    pub fn call_compile_time(
        &mut self,
        id: FunctionId,
        closure: &Rc<Closure>,
        arguments: Vec<Value>,
        location: Option<&Location>,
    ) -> EvalResult<Value> {
        self.enter_call(location)?;
        let result = self.call_compile_time_inner(id, closure, arguments);
        self.exit_call();
        result.map_err(|error| error.with_location(location))
    }

    fn call_compile_time_inner(
        &mut self,
        id: FunctionId,
        closure: &Rc<Closure>,
        arguments: Vec<Value>,
    ) -> EvalResult<Value> {
        let declared = self.declared_return_type(id)?;
        let function = &self.functions[id.0];
        let source = match &function.body {
            Body::Source(source) => Node::clone(source),
            other => panic!("compile-time function #{} has body {other:?}", id.0),
        };
        let name = function.display_name().to_string();
        let layout = function.layout.clone();
        debug!(function = %name, "instantiating compile-time function");

        let staging = StagingFrame::new(layout.slot_count);
        let mut frame = Frame::from_staging(staging.clone());
        let mut captured = Vec::new();
        bind_captures(&mut frame, &layout, closure, |slot, value| {
            captured.push((slot, value.clone()))
        });
        bind_arguments(&mut frame, &layout, &arguments, &name)?;
        {
            let mut staged = staging.borrow_mut();
            for capture in &layout.captures {
                staged.stage(capture.to, Staged::Pending);
            }
            let arguments = layout
                .argument_captures
                .iter()
                .map(|capture| (capture.to, arguments[capture.argument_index].clone()));
            for (slot, value) in captured.into_iter().chain(arguments) {
                staged.stage_known(slot, self.type_of(&value), Some(value));
            }
        }

        let body = source.evaluate_partial(&mut PartialContext::new(self, staging))?;
        let body = match declared {
            Some(ret) => self.coerce(body, ret, "Incompatible return type")?,
            None => body,
        };
        body.execute(&mut frame, self)
    }

    /// Returns the specialization of a template for the given argument types,
    /// creating it on first use.
    pub fn specialize(&mut self, id: TemplateId, arguments: &[TypeId]) -> EvalResult<FunctionId> {
        let template = &self.templates[id.0];
        if let Some(function) = template.specializations.get(arguments) {
            return Ok(*function);
        }
        let name = template.display_name().to_string();
        if !self.is_compile_time() {
            return Err(EvalError::invalid(
                format!("Template {name} has no specialization for these argument types"),
                template.location.clone(),
            ));
        }
        if template.specializations.len() >= self.config.max_specializations {
            return Err(EvalError::invalid(
                format!(
                    "Template {name} exceeded the limit of {} specializations",
                    self.config.max_specializations
                ),
                template.location.clone(),
            ));
        }
        if template.parameters.len() != arguments.len() {
            return Err(TypeError::new(
                format!(
                    "Different number of arguments: expected {}, got {}",
                    template.parameters.len(),
                    arguments.len()
                ),
                template.location.clone(),
            )
            .into());
        }

        let parameters = template.parameters.clone();
        let return_type = template.return_type.clone();
        let body = template.body.clone();
        let layout = template.layout.clone();
        let location = template.location.clone();
        let frame = template.defining_frame.borrow().fork();
        debug!(
            template = %name,
            arguments = ?arguments.iter().map(|ty| self.type_name(*ty)).collect::<Vec<_>>(),
            "specializing template"
        );

        let mut resolved = Vec::with_capacity(parameters.len());
        for ((parameter, pattern), actual) in parameters.into_iter().zip(arguments) {
            let ty = self
                .match_parameter(&pattern, *actual, &frame)
                .map_err(|error| {
                    error.wrap(
                        format!("Cannot specialize {name}: parameter {parameter} does not match"),
                        location.clone(),
                    )
                })?;
            resolved.push((parameter, ty));
        }

        let function = self.add_function(FunctionSource {
            name: Some(name),
            kind: FunctionKind::Runtime,
            parameters: Vec::new(),
            return_type,
            body,
            layout,
            defining_frame: frame,
            location,
        });
        self.functions[function.0].parameters = Resolution::Resolved(resolved);
        self.templates[id.0]
            .specializations
            .insert(arguments.to_vec(), function);
        Ok(function)
    }

    fn match_parameter(
        &mut self,
        pattern: &PatternNode,
        actual: TypeId,
        frame: &StagingFrameRef,
    ) -> EvalResult<TypeId> {
        match pattern {
            PatternNode::SpecificValue(node) => self.evaluate_type(node.clone(), frame),
            _ => {
                self.match_value(pattern, &Value::Type(actual), frame)?;
                Ok(actual)
            }
        }
    }

    fn match_value(&mut self, pattern: &PatternNode, value: &Value, frame: &StagingFrameRef) -> EvalResult<()> {
        match pattern {
            PatternNode::SpecificValue(node) => {
                let expected = self.evaluate_value(node.clone(), frame)?;
                if expected == *value {
                    Ok(())
                } else {
                    Err(TypeError::new(
                        format!(
                            "Expected {}, got {}",
                            self.describe(&expected),
                            self.describe(value)
                        ),
                        node.location().cloned(),
                    )
                    .into())
                }
            }
            PatternNode::Binding { slot, .. } => {
                let ty = self.type_of(value);
                frame.borrow_mut().stage_known(*slot, ty, Some(value.clone()));
                Ok(())
            }
            PatternNode::Call {
                target,
                name,
                arguments,
                location,
            } => {
                let ty = self.expect_type(value, location)?;
                let Some(origin) = self.types.origin(ty).cloned() else {
                    return Err(TypeError::new(
                        format!(
                            "Type {} was not produced by a compile-time call and cannot match `{name}`",
                            self.type_name(ty)
                        ),
                        location.clone(),
                    )
                    .into());
                };
                let target = self.evaluate_value(target.clone(), frame)?;
                if origin.method != *name
                    || origin.target != target
                    || origin.arguments.len() != arguments.len()
                {
                    return Err(TypeError::new(
                        format!(
                            "Type {} does not match the pattern `{name}` of {}",
                            self.type_name(ty),
                            self.describe(&target)
                        ),
                        location.clone(),
                    )
                    .into());
                }
                for (pattern, argument) in arguments.iter().zip(&origin.arguments) {
                    self.match_value(pattern, argument, frame)?;
                }
                Ok(())
            }
            PatternNode::FunctionType {
                parameters,
                return_type,
                location,
            } => {
                let ty = self.expect_type(value, location)?;
                let signature = match self.get_method(ty, "call", None)? {
                    Some(method) => method.signature.clone(),
                    None => {
                        return Err(TypeError::new(
                            format!("Type {} is not callable", self.type_name(ty)),
                            location.clone(),
                        )
                        .into())
                    }
                };
                let Signature::Concrete {
                    parameters: actual,
                    ret,
                } = signature
                else {
                    return Err(TypeError::new(
                        format!("Type {} has no fixed call signature", self.type_name(ty)),
                        location.clone(),
                    )
                    .into());
                };
                if actual.len() != parameters.len() {
                    return Err(TypeError::new(
                        format!(
                            "Expected a function with {} parameters, got {}",
                            parameters.len(),
                            actual.len()
                        ),
                        location.clone(),
                    )
                    .into());
                }
                for ((name, pattern), (_, actual)) in parameters.iter().zip(actual) {
                    self.match_value(pattern, &Value::Type(actual), frame)
                        .map_err(|error| error.wrap(format!("Parameter {name} does not match"), None))?;
                }
                self.match_value(return_type, &Value::Type(ret), frame)
                    .map_err(|error| error.wrap("Return type does not match", None))
            }
        }
    }

    fn expect_type(&self, value: &Value, location: &Option<Location>) -> EvalResult<TypeId> {
        value.as_type().ok_or_else(|| {
            TypeError::new(
                format!("Expected a type, got {}", self.describe(value)),
                location.clone(),
            )
            .into()
        })
    }
}

/// Copies a closure environment into a callee frame. `on_value` sees every
/// capture that has a value.
fn bind_captures(
    frame: &mut Frame,
    layout: &FunctionLayout,
    closure: &Rc<Closure>,
    mut on_value: impl FnMut(Slot, &Value),
) {
    for (capture, captured) in layout.captures.iter().zip(&closure.captures) {
        let value = match captured {
            CapturedValue::Recursive => Some(Value::Closure(closure.clone())),
            other => other.resolve(),
        };
        if let Some(value) = value {
            on_value(capture.to, &value);
            frame.set(capture.to, value);
        }
    }
}

fn bind_arguments(frame: &mut Frame, layout: &FunctionLayout, arguments: &[Value], name: &str) -> EvalResult<()> {
    for capture in &layout.argument_captures {
        let Some(value) = arguments.get(capture.argument_index) else {
            return Err(EvalError::invalid(
                format!(
                    "{name} expected at least {} arguments, got {}",
                    capture.argument_index + 1,
                    arguments.len()
                ),
                None,
            ));
        };
        frame.set(capture.to, value.clone());
    }
    Ok(())
}
