//! Shared types for Campfire: wire records stored in the realtime tree,
//! path addressing, gateway events and HTTP API payloads.

pub mod api;
pub mod events;
pub mod models;
pub mod paths;
