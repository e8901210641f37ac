#![forbid(unsafe_code)]

//! Core library for the `stack-warden` local service supervisor.

pub mod config;
pub mod errors;
pub mod models;
pub mod probe;
pub mod session;
pub mod supervisor;

pub use config::StackConfig;
pub use errors::{AppError, LaunchError, Result};
