//! Authentication session security core
//!
//! Refresh-token rotation with family-wide reuse detection, failed-login
//! lockout and per-key token-bucket admission control, wired into an
//! actix-web service.

pub mod adapters;
pub mod application;
pub mod domain;
pub mod infrastructure;
