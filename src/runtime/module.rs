use crate::config::EngineConfig;
use crate::language::span::Location;
use crate::runtime::{
    class::ClassDef,
    error::{EvalError, EvalResult},
    function::{Function, FunctionId, Template},
    interop::{HostBridge, HostType},
    types::{TypeId, TypeKind, TypeRegistry},
    value::{Closure, FunctionRef, NativeValue, Value},
};
use std::rc::Rc;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Partial evaluation is running; compile-time code may execute.
    Preparing,
    Running,
}

/// One compilation unit: every function, template, class and type the
/// program registers, plus the state of the preparation fixpoint.
pub struct Module {
    pub(crate) config: EngineConfig,
    pub(crate) types: TypeRegistry,
    pub(crate) functions: Vec<Function>,
    pub(crate) templates: Vec<Template>,
    pub(crate) classes: Vec<ClassDef>,
    pub(crate) host: Option<Rc<dyn HostBridge>>,
    pub(crate) main: Option<FunctionId>,
    phase: Phase,
    depth: usize,
}

impl Module {
    pub fn new(config: EngineConfig, host: Option<Rc<dyn HostBridge>>) -> Self {
        Self {
            config,
            types: TypeRegistry::new(),
            functions: Vec::new(),
            templates: Vec::new(),
            classes: Vec::new(),
            host,
            main: None,
            phase: Phase::Preparing,
            depth: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_compile_time(&self) -> bool {
        self.phase == Phase::Preparing
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Every registered function in registration order, main first.
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    pub(crate) fn assert_registration_open(&self) {
        if self.phase != Phase::Preparing {
            panic!(
                "function registered after preparation finished ({} functions)",
                self.functions.len()
            );
        }
    }

    /// Partially evaluates every function, including the ones registered
    /// while the sweep runs. Calling it again does nothing.
    pub fn prepare(&mut self) -> EvalResult<()> {
        if self.phase == Phase::Running {
            return Ok(());
        }
        debug!(functions = self.functions.len(), "preparing module");
        let mut index = 0;
        while index < self.functions.len() {
            self.ensure_partially_evaluated(FunctionId(index))?;
            index += 1;
        }
        self.phase = Phase::Running;
        debug!(
            functions = self.functions.len(),
            templates = self.templates.len(),
            classes = self.classes.len(),
            "module prepared"
        );
        Ok(())
    }

    /// Prepares the module if needed and executes main.
    pub fn run(&mut self) -> EvalResult<Value> {
        self.prepare()?;
        let Some(main) = self.main else {
            panic!("module has no main function");
        };
        let closure = Rc::new(Closure {
            function: FunctionRef::Function(main),
            captures: Vec::new(),
        });
        self.call_function(main, &closure, Vec::new(), None)
    }

    pub(crate) fn enter_call(&mut self, location: Option<&Location>) -> EvalResult<()> {
        if self.depth >= self.config.max_call_depth {
            return Err(EvalError::CallDepthExceeded {
                limit: self.config.max_call_depth,
                location: location.cloned(),
            });
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn exit_call(&mut self) {
        self.depth -= 1;
    }

    /// Makes the named static type of a host object known to the module.
    pub fn register_host_value(&mut self, value: &Value) {
        if let (Value::Host(object), Some(host)) = (value, &self.host) {
            if let HostType::Named(name) = host.static_type(object) {
                self.types.host_type(&name);
            }
        }
    }

    pub fn type_of(&self, value: &Value) -> TypeId {
        match value {
            Value::Nothing => TypeId::NOTHING,
            Value::Bool(_) => TypeId::BOOL,
            Value::Int(_) => TypeId::INT,
            Value::Float(_) => TypeId::FLOAT,
            Value::String(_) => TypeId::STRING,
            Value::Type(ty) => self.types.meta(*ty),
            Value::Closure(closure) => match closure.function {
                FunctionRef::Function(id) => self.functions[id.0].type_id,
                FunctionRef::Template(id) => self.templates[id.0].type_id,
            },
            Value::Object(object) => object.ty,
            Value::Interface(instance) => match self.types.kind(instance.concrete) {
                TypeKind::ConcreteInterface { interface, .. } => *interface,
                other => panic!("interface value with non-concrete type {other:?}"),
            },
            Value::Builder(_) => TypeId::CLASS_BUILDER,
            Value::Native(NativeValue::ClassFactory) => TypeId::CLASS_FACTORY,
            Value::Native(NativeValue::InterfaceFactory) => TypeId::INTERFACE_FACTORY,
            Value::Host(object) => match self.host.as_ref().map(|host| host.static_type(object)) {
                Some(HostType::Named(name)) => self.types.find_host(&name).unwrap_or(TypeId::DYNAMIC),
                Some(HostType::Dynamic) | None => TypeId::DYNAMIC,
            },
        }
    }

    pub fn type_name(&self, ty: TypeId) -> String {
        self.types.name(ty).to_string()
    }

    /// Short description of a value for error messages.
    pub fn describe(&self, value: &Value) -> String {
        match value {
            Value::Type(ty) => format!("type {}", self.type_name(*ty)),
            Value::String(string) => format!("\"{string}\""),
            other => format!("{other} of type {}", self.type_name(self.type_of(other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{function::FunctionState, Interpreter};

    #[test]
    fn call_depth_is_limited() {
        let mut module = Module::new(
            EngineConfig {
                max_call_depth: 2,
                ..EngineConfig::default()
            },
            None,
        );

        module.enter_call(None).expect("first");
        module.enter_call(None).expect("second");
        assert!(matches!(
            module.enter_call(None),
            Err(EvalError::CallDepthExceeded { limit: 2, .. })
        ));
        module.exit_call();
        module.enter_call(None).expect("room again");
    }

    #[test]
    fn values_know_their_types() {
        let module = Module::new(EngineConfig::default(), None);

        assert_eq!(module.type_of(&Value::Int(1)), TypeId::INT);
        assert_eq!(module.type_of(&Value::Type(TypeId::INT)), TypeId::TYPE);
        assert_eq!(
            module.type_of(&Value::Native(NativeValue::ClassFactory)),
            TypeId::CLASS_FACTORY
        );
        assert_eq!(module.describe(&Value::Int(3)), "3 of type Int");
        assert_eq!(module.describe(&Value::Type(TypeId::FLOAT)), "type Float");
    }

    fn load(source: &str) -> Module {
        Interpreter::new(EngineConfig::default())
            .load("module.ph", source)
            .unwrap_or_else(|err| panic!("failed to load {source:?}: {err}"))
    }

    #[test]
    fn preparing_again_registers_nothing() {
        let mut module = load("val add = (a: Int, b: Int) a + b\nval id = (x) x\nadd(id(1), 2)");
        let functions = module.functions().len();
        let specializations = module.templates()[0].specialization_count();

        module.prepare().expect("second prepare");

        assert_eq!(module.functions().len(), functions);
        assert_eq!(module.templates()[0].specialization_count(), specializations);
    }

    #[test]
    fn every_function_is_evaluated_exactly_once() {
        let mut module = load("val id = (x) x\nval twice = (n: Int) id(n) + id(n)\ntwice(id(2))");

        // main, twice and the single Int specialization of id
        assert_eq!(module.functions().len(), 3);
        assert_eq!(module.templates()[0].specialization_count(), 1);
        assert!(module
            .functions()
            .iter()
            .all(|function| function.state == FunctionState::Done));

        for index in 0..module.functions().len() {
            module
                .ensure_partially_evaluated(FunctionId(index))
                .expect("already evaluated");
        }
        assert_eq!(module.functions().len(), 3);
    }
}
