//! Gateway handler modules
//!
//! - CRUD operations (create, modify, delete) and membership fan-out
//! - Query operations (get, list)
//! - Replace (PUT reconciliation)
//! - Token issuance
//! - Discovery documents

pub mod crud;
pub mod discovery;
pub mod query;
pub mod replace;
pub mod token;
