//! Expression evaluation and variable resolution.
//!
//! Every node kind resolves its configured values through this crate:
//! expressions (conditions, filter values, write data) are evaluated by
//! [`Evaluator`], and variable references go through the two-tier
//! alias-vs-canonical-id lookup in [`resolve_var`].

mod eval;
mod resolve;

pub use eval::{Evaluator, ExpressionError};
pub use resolve::{resolve_var, scope_with_aliases};
