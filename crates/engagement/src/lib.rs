//! Per-post engagement for the blog: visitor identity, the engagement record
//! client, and the controller that drives view counting and like/unlike votes.

pub mod controller;
pub mod error;
pub mod http_store;
pub mod identity;
pub mod store;

pub use controller::{
    EngagementController, EngagementCounts, EngagementState, EngagementView,
    ReconciliationPolicy, ToggleOutcome,
};
pub use error::EngagementError;
pub use http_store::HttpDocumentStore;
pub use identity::{
    hash_address, AddressLookup, HttpAddressLookup, IdentityResolver, StaticAddressLookup,
};
pub use store::{DocumentStore, EngagementStore, StoreConfig};
