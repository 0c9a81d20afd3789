pub mod error;
pub mod github;
pub mod http;
pub mod identity;
pub mod local;
pub mod telemetry;
