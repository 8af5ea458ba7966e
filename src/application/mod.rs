//! Application layer
//!
//! Use cases that orchestrate domain services for the HTTP adapter.

pub mod auth;
