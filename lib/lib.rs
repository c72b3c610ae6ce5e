//! remotefs: a chained, tiered filesystem exposed as a POSIX mount.
//!
//! A chain of storage tiers (typically a budgeted local cache in front of an
//! authoritative backend) answers path-addressed filesystem operations. The
//! daemon serves the chain over an HTTP facade and mounts it locally through
//! FUSE; other nodes can mount the same tree by pointing the FUSE adapter at
//! the facade.

/// LRU cache accounting for cache-role tiers.
pub mod cache;
/// The chain-of-responsibility engine.
pub mod chain;
pub mod error;
/// FUSE adapter: maps [`fuser::Filesystem`] callbacks to [`remote::RemoteFs`].
pub mod fuse;
/// Advisory lock table for lock-capable tiers.
pub mod lock;
pub mod model;
/// Client seam between the FUSE adapter and a server node.
pub mod remote;
/// HTTP facade over the engine.
pub mod server;
/// Storage tier contract and the local-directory tier.
pub mod tier;
