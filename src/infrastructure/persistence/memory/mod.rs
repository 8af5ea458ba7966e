//! Process-local persistence for single-instance deployments and tests

mod token_store;
mod user_repository;

pub use token_store::{InMemoryRotationUnit, InMemoryTokenStore};
pub use user_repository::InMemoryUserRepository;
