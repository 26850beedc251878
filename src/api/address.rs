//! Structured item addresses.
//!
//! An item is addressable either by its bare primary key or by
//! `arn:aws:dapi:<region>:<account>:<table>:<id>[:<version>]`. An address
//! naming another region, account or table resolves to ResourceNotFound.

use std::fmt;

use crate::error::{DataApiError, DataApiResult};
use crate::params;

/// A parsed structured address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemAddress {
    pub region: String,
    pub account: String,
    pub table: String,
    pub id: String,
    pub version: Option<String>,
}

impl ItemAddress {
    /// Parses a structured address. Returns `None` when `value` is not one.
    pub fn parse(value: &str) -> Option<Self> {
        let rest = value.strip_prefix(params::ARN_BASE)?.strip_prefix(':')?;
        let mut parts = rest.splitn(5, ':');
        let region = parts.next()?;
        let account = parts.next()?;
        let table = parts.next()?;
        let id = parts.next()?;
        let version = parts.next();
        if [region, account, table, id].iter().any(|p| p.is_empty()) {
            return None;
        }
        if version.map_or(false, str::is_empty) {
            return None;
        }
        Some(Self {
            region: region.to_string(),
            account: account.to_string(),
            table: table.to_string(),
            id: id.to_string(),
            version: version.map(str::to_string),
        })
    }
}

impl fmt::Display for ItemAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            params::ARN_BASE,
            self.region,
            self.account,
            self.table,
            self.id
        )?;
        if let Some(version) = &self.version {
            write!(f, ":{}", version)?;
        }
        Ok(())
    }
}

/// Address space of one namespace's Resource table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Addressing {
    region: String,
    account: String,
    table: String,
}

impl Addressing {
    pub fn new(region: impl Into<String>, account: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            account: account.into(),
            table: table.into(),
        }
    }

    /// Address of `id` in this namespace
    pub fn address(&self, id: &str) -> ItemAddress {
        ItemAddress {
            region: self.region.clone(),
            account: self.account.clone(),
            table: self.table.clone(),
            id: id.to_string(),
            version: None,
        }
    }

    /// Primary key named by a bare key or a structured address
    pub fn resolve(&self, identifier: &str) -> DataApiResult<String> {
        if !identifier.starts_with(params::ARN_BASE) {
            if identifier.trim().is_empty() {
                return Err(DataApiError::invalid("An item identifier is required"));
            }
            return Ok(identifier.to_string());
        }

        let address = ItemAddress::parse(identifier)
            .ok_or_else(|| DataApiError::not_found(format!("Invalid ARN format {}", identifier)))?;
        if address.account != self.account {
            return Err(DataApiError::not_found(
                "Requested resource not available from Data API Account",
            ));
        }
        if address.table != self.table {
            return Err(DataApiError::not_found(format!(
                "Requested resource {} not available from Data API {}",
                address.table, self.table
            )));
        }
        if address.region != self.region {
            return Err(DataApiError::not_found(format!(
                "Requested resource region {} not available from Data API in {}",
                address.region, self.region
            )));
        }
        Ok(address.id)
    }
}
