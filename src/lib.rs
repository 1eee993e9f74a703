pub mod diagnostics;
pub mod language;
pub mod lint;
pub mod runtime;

pub use language::{ast::Program, errors::SyntaxErrors, parser::parse_program};
pub use runtime::{Interpreter, Options, RuntimeError, Value};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("syntax error: {0}")]
    Syntax(#[from] SyntaxErrors),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Parses `source` and collects every output for `input` with default options.
pub fn run(source: &str, input: Value) -> Result<Vec<Value>, EvalError> {
    let program = parse_program(source)?;
    let interpreter = Interpreter::default();
    let outputs = interpreter
        .evaluate(&program, input)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn run_collects_outputs() {
        let outputs = run(".[] | . * 2", Value::from(json!([1, 2]))).expect("run");
        assert_eq!(outputs, vec![Value::from(2.0), Value::from(4.0)]);
    }

    #[test]
    fn run_separates_syntax_and_runtime_failures() {
        assert!(matches!(run("1 +", Value::Null), Err(EvalError::Syntax(_))));
        assert!(matches!(
            run("undefined_thing", Value::Null),
            Err(EvalError::Runtime(RuntimeError::UndefinedFunction { .. }))
        ));
    }
}
