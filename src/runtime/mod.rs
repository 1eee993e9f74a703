pub mod builtins;
pub mod call;
pub mod environment;
pub mod error;
pub mod interpreter;
pub mod stream;
pub mod tail;
pub mod value;

pub use error::{RuntimeError, RuntimeResult};
pub use interpreter::{Interpreter, Options, Outputs};
pub use value::Value;

#[cfg(test)]
mod tests;
