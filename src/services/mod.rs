pub mod client_manager;
pub mod heartbeat;
pub mod identity;
pub mod lease_store;
pub mod policy;
pub mod presence;
pub mod router;

pub use client_manager::{ClientError, IsolatedChannelManager};
pub use heartbeat::{HeartbeatConfig, HeartbeatError, HeartbeatPublisher};
pub use identity::{IdentityProvider, LocalInstanceIdentity};
pub use lease_store::{LeaseStore, LeaseStoreError, MemoryLeaseStore, RedisLeaseStore};
pub use policy::IsolationPolicy;
pub use presence::{DiscoveryPresence, LeasePresence, NacosDirectory, PresenceError, PresenceSource};
pub use router::{IsolationLayer, RouteResolver, RouterError};
