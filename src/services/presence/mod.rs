//! Instance presence registry
//!
//! Answers "which instances of this service currently exist":
//! - `discovery`: service list from a discovery directory behind a TTL cache
//! - `nacos`: Nacos open API client for the discovery directory
//! - `lease`: point lookup of heartbeat leases in a shared store
//! - `cache`: single-flight TTL cache used by the discovery source

pub mod cache;
pub mod discovery;
pub mod lease;
pub mod nacos;
pub mod types;

pub use cache::PresenceCache;
pub use discovery::{DiscoveryDirectory, DiscoveryPresence};
pub use lease::{LEASE_KEY_SEPARATOR, LeasePresence, lease_key};
pub use nacos::NacosDirectory;
pub use types::{PresenceError, PresenceSource};
