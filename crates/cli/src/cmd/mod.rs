//! CLI command implementations

pub mod config;
pub mod finalize;
pub mod forget;
pub mod status;
pub mod upload;
