//! Gitfolio content cache.
//!
//! A single time-boxed key/value store fronting every content read, so page
//! loads do not fan out into GitHub API calls. Writers drop the keys derived
//! from a document after a successful write (see [`dependents_of`]).
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! default_ttl_seconds = 1800
//! max_entries = 256
//! ```

mod clock;
mod config;
mod keys;
mod lock;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, DEFAULT_TTL};
pub use keys::{ContentKey, dependents_of};
pub use store::ContentCache;
