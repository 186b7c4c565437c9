pub mod config;
pub mod diagnostics;
pub mod language;
pub mod runtime;

pub use config::EngineConfig;
pub use runtime::{error::EvalError, Interpreter, PhotonError, Value};

#[cfg(test)]
mod tests;
