//! Error types shared across the interpreter.

use std::fmt::{self, Display};

use crate::reader::parser::ParseError;
use crate::value::Value;

/// Union of all the types of errors in the program.
///
/// An `Eval` error is an ordinary result as far as the driver loops are
/// concerned: it propagates out of the evaluator untouched and its message
/// is printed where a value would be.
#[derive(Debug, Clone, PartialEq)]
pub enum LispError {
    Parse(ParseError),
    Eval(String),
}

pub type LispResult<T = Value> = Result<T, LispError>;

impl Display for LispError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LispError::Parse(err) => write!(f, "{err}"),
            LispError::Eval(msg) => f.write_str(msg),
        }
    }
}

pub fn new_eval_error<T>(msg: String) -> Result<T, LispError> {
    Err(LispError::Eval(msg))
}

pub fn eval_error<T>(msg: &str) -> Result<T, LispError> {
    Err(LispError::Eval(msg.to_string()))
}
