//! Shared primitives: errors, time, configuration, record stores, wire
//! envelopes, the tool catalogue and the dispatch server.

pub mod config;
pub mod error;
pub mod external_action;
pub mod fingerprint;
pub mod rpc;
pub mod server;
pub mod store;
pub mod time;
pub mod tools;
