//! Adapters for external systems: the operational API and PostgreSQL

pub mod database;
pub mod http;
pub mod postgresql;
pub mod sources;
