//! Client library for Campfire: named shared sessions holding a live
//! activity list and an image gallery.
//!
//! Everything hangs off [`Campfire`], which is built from a [`Backend`]
//! (realtime tree, object store and auth) and a device-local
//! [`IdentityCache`]. Two backends exist: [`LocalBackend`] runs the tree in
//! process, [`RemoteBackend`] talks to `campfire-server`.

pub mod activities;
pub mod backend;
pub mod client;
pub mod config;
pub mod directory;
pub mod error;
pub mod gallery;
pub mod identity;
pub mod local;
pub mod membership;
mod records;
pub mod remote;
pub mod view;

pub use backend::{AuthProvider, AuthSession, Backend, ObjectStore, RealtimeDb, Subscription};
pub use client::Campfire;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use identity::IdentityCache;
pub use local::{LocalBackend, LocalServer};
pub use remote::RemoteBackend;

pub use campfire_types::models::{ActivityEntry, ActivityTime, ImageEntry};
pub use campfire_types::paths::SessionId;
