//! Sandboxed arithmetic expressions.
//!
//! An expression sees numeric literals, the constant `pi`, the functions
//! `sin cos tan abs pow max min`, and the variables it was compiled against.
//! Nothing else resolves: unknown names, wrong arities and foreign syntax are
//! rejected by [`Expr::compile`], so evaluation can only fail numerically.
//!
//! ```
//! use psd_driver_core::expr::Expr;
//!
//! let e = Expr::compile("max(a, b) * 0.5", &["a".into(), "b".into()]).unwrap();
//! assert_eq!(e.eval(&[0.2, 0.8]).unwrap(), 0.4);
//! ```

mod eval;
mod lexer;
mod parser;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use parser::{Node, Parser};

pub use parser::MAX_DEPTH;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("expression is empty")]
    Empty,
    #[error("unexpected character {ch:?} at {pos}")]
    UnexpectedChar { ch: char, pos: usize },
    #[error("invalid number {text:?} at {pos}")]
    InvalidNumber { text: String, pos: usize },
    #[error("unexpected '{found}' at {pos}")]
    UnexpectedToken { found: String, pos: usize },
    #[error("unexpected end of expression at {pos}")]
    UnexpectedEnd { pos: usize },
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("'{0}' is not callable")]
    NotCallable(String),
    #[error("function '{0}' used as a value")]
    NotAValue(String),
    #[error("expression nests deeper than {} levels at {pos}", MAX_DEPTH)]
    TooDeep { pos: usize },
    #[error("{function}() takes {expected} argument(s), got {found}")]
    Arity {
        function: &'static str,
        expected: &'static str,
        found: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("math domain error: {0}")]
    Domain(&'static str),
    #[error("result is not finite ({0})")]
    NonFinite(f64),
    #[error("no value supplied for variable slot {0}")]
    MissingVariable(usize),
}

/// The fixed function set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Abs,
    Pow,
    Max,
    Min,
}

impl Function {
    pub const ALL: [Function; 7] = [
        Function::Sin,
        Function::Cos,
        Function::Tan,
        Function::Abs,
        Function::Pow,
        Function::Max,
        Function::Min,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
            Function::Abs => "abs",
            Function::Pow => "pow",
            Function::Max => "max",
            Function::Min => "min",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    fn check_arity(self, found: usize) -> Result<(), ExprError> {
        let (ok, expected) = match self {
            Function::Sin | Function::Cos | Function::Tan | Function::Abs => (found == 1, "1"),
            Function::Pow => (found == 2, "2"),
            Function::Max | Function::Min => (found >= 2, "at least 2"),
        };
        if ok {
            Ok(())
        } else {
            Err(ExprError::Arity {
                function: self.name(),
                expected,
                found,
            })
        }
    }
}

/// A compiled expression bound to an ordered list of variable names.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    source: String,
    variables: Vec<String>,
    root: Node,
}

impl Expr {
    pub fn compile(source: &str, variables: &[String]) -> Result<Self, ExprError> {
        let tokens = lexer::tokenize(source)?;
        if tokens.is_empty() {
            return Err(ExprError::Empty);
        }
        let root = Parser::new(&tokens, variables, source.len()).parse()?;
        Ok(Self {
            source: source.to_string(),
            variables: variables.to_vec(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Evaluate with `values[i]` bound to `variables()[i]`.
    pub fn eval(&self, values: &[f64]) -> Result<f64, EvalError> {
        let v = eval::eval(&self.root, values)?;
        if v.is_finite() {
            Ok(v)
        } else {
            Err(EvalError::NonFinite(v))
        }
    }
}
