pub mod builtins;
pub mod class;
pub mod error;
pub mod execute;
pub mod frame;
pub mod function;
pub mod interface;
pub mod interop;
pub mod interpreter;
pub mod lower;
pub mod method;
pub mod module;
pub mod node;
pub mod partial;
pub mod scope;
pub mod signature;
pub mod types;
pub mod value;

pub use interpreter::{Interpreter, PhotonError};
pub use module::Module;
pub use value::Value;
