//! Application services layer: the read path, the write pipeline and the
//! gate in front of it.

pub mod admin;
pub mod auth;
pub mod content;
pub mod error;
pub mod store;
pub mod writer;
