//! # Shardis
//!
//! A Redis-compatible in-memory data store that can run as a single node or
//! as a sharded cluster.
//!
//! Shardis speaks the RESP2 protocol and implements strings, hashes, lists,
//! sets and sorted sets with lazy key expiration and an append-only log. In
//! cluster mode each node owns a slice of the keyspace chosen by a
//! consistent-hash ring and relays commands for foreign keys to their owner.

pub mod cluster;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod glob;
pub mod persistence;
pub mod resp;
pub mod server;
pub mod store;
pub mod types;
