//! Audit decoration applied to every mutating request.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::update::{ClauseKind, UpdateExpressionBuilder};
use crate::params;

/// Formats a timestamp the way audit fields store it
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(params::DEFAULT_DATE_FORMAT).to_string()
}

/// Who and what a mutation records
#[derive(Debug, Clone)]
pub struct AuditStamp<'a> {
    pub caller: &'a str,
    pub action: &'a str,
    pub at: DateTime<Utc>,
}

impl<'a> AuditStamp<'a> {
    pub fn now(caller: &'a str, action: &'a str) -> Self {
        Self {
            caller,
            action,
            at: Utc::now(),
        }
    }
}

/// Appends `LastUpdateDate`, `LastUpdatedBy` and `LastUpdateAction` to the SET
/// clause, and `ADD ItemVersion 1` when `auto_increment` is set.
pub fn decorate(builder: &mut UpdateExpressionBuilder, stamp: &AuditStamp<'_>, auto_increment: bool) {
    builder
        .bind_name("#lud", params::LAST_UPDATE_DATE)
        .bind_name("#lub", params::LAST_UPDATED_BY)
        .bind_name("#lua", params::LAST_UPDATE_ACTION)
        .bind_value(":lud", Value::from(format_timestamp(stamp.at)))
        .bind_value(":lub", Value::from(stamp.caller))
        .bind_value(":lua", Value::from(stamp.action))
        .add_clause(ClauseKind::Set, "#lud = :lud, #lub = :lub, #lua = :lua");

    if auto_increment {
        builder
            .bind_name("#ItemVersion", params::ITEM_VERSION)
            .bind_value(":incr", Value::from(1))
            .add_clause(ClauseKind::Add, "#ItemVersion :incr");
    }
}
