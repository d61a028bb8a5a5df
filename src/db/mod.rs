//! Database layer: repositories, error mapping and the per-request
//! transaction wrapper.
//!
//! Data access goes through the repository pattern ([`handlers`]); each
//! repository borrows a `PgConnection`, so the same code runs against a
//! pooled connection or the request transaction. [`transaction`] holds the
//! middleware that opens one transaction per inbound request.

pub mod errors;
pub mod handlers;
pub mod models;
pub mod transaction;
