use crate::runtime::value::Value;
use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuntimeError {
    #[error("{name}/{arity} is not defined")]
    UndefinedFunction { name: String, arity: usize },
    #[error("Function `{name}` expected {expected} arguments but received {received}")]
    ArityMismatch {
        name: String,
        expected: usize,
        received: usize,
    },
    #[error("${name} is not defined")]
    UndefinedVariable { name: String },
    #[error("{message}")]
    TypeMismatch { message: String },
    #[error("{message}")]
    Index { message: String },
    #[error("{}", user_message(.value))]
    User { value: Value },
    #[error("Call depth exceeded the limit of {limit} nested calls")]
    DepthExceeded { limit: usize },
}

impl RuntimeError {
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        RuntimeError::TypeMismatch {
            message: message.into(),
        }
    }

    pub fn index(message: impl Into<String>) -> Self {
        RuntimeError::Index {
            message: message.into(),
        }
    }
}

fn user_message(value: &Value) -> String {
    match value {
        Value::String(text) => text.to_string(),
        other => format!("{} (not a string)", other),
    }
}
