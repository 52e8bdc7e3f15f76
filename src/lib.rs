//! Ratelimit Provisioner - Cloudflare rate limiting rollout
//!
//! This crate enumerates the zones of a Cloudflare account, makes sure each
//! zone has an `http_ratelimit` ruleset, and submits a catalogue of rate
//! limiting rules to it. Zones are processed sequentially, each in its own
//! failure boundary.

pub mod api;
pub mod config;
pub mod error;
pub mod reconcile;
