//! # plughost-core
//!
//! Core crate for the plughost plugin runtime. Contains configuration
//! schemas, runtime events, and the unified error system.
//!
//! This crate has **no** internal dependencies on other plughost crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;

pub use error::AppError;
pub use result::AppResult;
