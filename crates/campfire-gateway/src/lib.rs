//! Change dispatch and the WebSocket gateway for live subscriptions.

pub mod connection;
pub mod dispatcher;
