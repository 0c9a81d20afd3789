//! Domain layer types and invariants.

pub mod documents;
pub mod error;
pub mod repository;
pub mod scraps;
pub mod site_config;
pub mod slug;
pub mod works;
