//! Domain model module declarations.

pub mod phase;
pub mod plan;
pub mod service;
