//! Storage backends for the tool registry, server registry, OAuth tokens and
//! OAuth flow state.
//!
//! Two families implement the `toolgate-core` storage ports:
//!
//! - [`local`]: process-local bounded caches (moka), not shared across
//!   instances.
//! - [`distributed`]: JSON records in a shared key-value store with explicit
//!   TTLs. Tool and server reads slide the TTL; token records keep a fixed
//!   TTL; flow state is deleted on read.
//!
//! [`StoreFactory`] picks the family from [`Settings`](toolgate_core::Settings).

pub mod distributed;
mod factory;
pub mod local;

pub use distributed::{
    DistributedFlowRepository, DistributedServerStorage, DistributedTokenRepository,
    DistributedToolStorage, FLOW_STATE_TTL, InMemoryKeyValueStore, KeyValueStore,
    RedisKeyValueStore, TOKEN_TTL,
};
pub use factory::{StoreFactory, Stores};
pub use local::{LocalFlowRepository, LocalServerStorage, LocalTokenRepository, LocalToolStorage};
