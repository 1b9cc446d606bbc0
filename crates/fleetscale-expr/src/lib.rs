//! fleetscale-expr — sandboxed scaling expressions.
//!
//! Operators write scaling rules such as
//!
//! ```text
//! 3 if (tasknodes.running and tasknodes.active and tasknodes.count.nodes < 15
//!       and (tasknodes.average.cpu > 0.7 or tasknodes.average.mem > 0.95)) else 0
//! ```
//!
//! The language only reads a flat [`Scope`] of named values: there are no
//! calls, no assignment and no attribute access beyond dotted variable
//! names. Input size and nesting depth are bounded.
//!
//! ```
//! use fleetscale_expr::{evaluate, Scope, Value};
//!
//! let mut scope = Scope::new();
//! scope.insert("tasknodes.count.nodes", Value::Int(4));
//! assert_eq!(evaluate("2 if tasknodes.count.nodes > 3 else 0", &scope), Ok(Value::Int(2)));
//! ```

pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;

pub use error::{ExprError, ExprResult};
pub use eval::{Scope, Value};
pub use parser::{Expr, parse};

/// Parse and evaluate an expression against a scope.
pub fn evaluate(source: &str, scope: &Scope) -> ExprResult<Value> {
    let expr = parse(source)?;
    eval::eval(&expr, scope)
}
