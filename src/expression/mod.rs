//! Update and condition expressions.
//!
//! - `update`: clause assembly and parsing (SET, REMOVE, ADD)
//! - `eval`: resolving placeholders and applying an update to an item
//! - `condition`: typed conditions evaluated against the stored item
//! - `audit`: last-update decoration shared by every mutating request

pub mod audit;
mod condition;
mod eval;
mod update;

pub use audit::{decorate, AuditStamp};
pub use condition::{values_equal, Condition};
pub use eval::{CompiledUpdate, ExpressionError, ExpressionResult, UpdateAction};
pub use update::{ClauseKind, UpdateExpressionBuilder};
