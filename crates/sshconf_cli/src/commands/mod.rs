//! CLI command implementations.

pub mod inspect;
pub mod remote;
pub mod service;
