//! Infrastructure layer: configuration and the concrete adapters behind the
//! domain ports

pub mod cache;
pub mod config;
pub mod persistence;
pub mod security;
