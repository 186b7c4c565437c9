use crate::config::EngineConfig;
use crate::language::{
    ast::Expr, errors::SyntaxErrors, macro_expander::MacroRegistry, parser::parse_source,
};
use crate::runtime::{
    error::EvalError,
    interop::HostBridge,
    lower::lower_program,
    module::Module,
    types::TypeId,
    value::{NativeValue, Value},
};
use std::rc::Rc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PhotonError {
    #[error(transparent)]
    Syntax(#[from] SyntaxErrors),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// Parses, prepares and runs programs. Each load gets a fresh module.
pub struct Interpreter {
    config: EngineConfig,
    macros: MacroRegistry,
    host: Option<Rc<dyn HostBridge>>,
    globals: Vec<(String, Value)>,
}

impl Interpreter {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            macros: MacroRegistry::with_defaults(),
            host: None,
            globals: Vec::new(),
        }
    }

    pub fn with_host(mut self, host: impl HostBridge + 'static) -> Self {
        self.host = Some(Rc::new(host));
        self
    }

    pub fn macros_mut(&mut self) -> &mut MacroRegistry {
        &mut self.macros
    }

    /// Makes `value` visible to programs under `name`. Later definitions
    /// shadow builtins and earlier globals.
    pub fn define_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.push((name.into(), value));
    }

    pub fn parse(&self, file: &str, source: &str) -> Result<Expr, PhotonError> {
        Ok(parse_source(file, source, &self.macros)?)
    }

    /// Parses and lowers a program and runs partial evaluation to a fixpoint.
    pub fn load(&self, file: &str, source: &str) -> Result<Module, PhotonError> {
        let program = self.parse(file, source)?;
        let mut globals = builtin_globals();
        globals.extend(self.globals.iter().cloned());
        let lowered = lower_program(&program, &globals)?;

        let mut module = Module::new(self.config.clone(), self.host.clone());
        for (_, value) in &globals {
            module.register_host_value(value);
        }
        module.add_main(lowered.body, lowered.layout, lowered.globals);
        module.prepare()?;
        debug!(file, functions = module.functions().len(), "loaded program");
        Ok(module)
    }

    pub fn eval(&self, file: &str, source: &str) -> Result<Value, PhotonError> {
        let mut module = self.load(file, source)?;
        Ok(module.run()?)
    }
}

fn builtin_globals() -> Vec<(String, Value)> {
    let types = [
        ("Int", TypeId::INT),
        ("Float", TypeId::FLOAT),
        ("Bool", TypeId::BOOL),
        ("String", TypeId::STRING),
        ("Any", TypeId::ANY),
        ("Type", TypeId::TYPE),
        ("Dynamic", TypeId::DYNAMIC),
        ("Nothing", TypeId::NOTHING),
        ("ClassBuilder", TypeId::CLASS_BUILDER),
    ];
    let mut globals = types
        .into_iter()
        .map(|(name, ty)| (name.to_string(), Value::Type(ty)))
        .collect::<Vec<_>>();
    globals.push(("Class".into(), Value::Native(NativeValue::ClassFactory)));
    globals.push(("Interface".into(), Value::Native(NativeValue::InterfaceFactory)));
    globals
}
