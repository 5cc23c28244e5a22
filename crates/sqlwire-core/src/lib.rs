//! Core types for sqlwire.
//!
//! This crate provides the driver-independent pieces shared by the
//! protocol engine and its callers:
//!
//! - `Error` taxonomy for transport, server, unsupported-feature and decode failures
//! - `Value`, the closed set of decoded cell values
//! - `Row`, an ordered column-alias to value mapping

pub mod error;
pub mod row;
pub mod value;

pub use error::{Error, Result};
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;
