//! nestcap library crate.
//!
//! This module exposes the internal components for integration testing.

pub mod archive;
pub mod config;
pub mod nest;
pub mod scheduler;
