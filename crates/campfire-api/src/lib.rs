pub mod auth;
pub mod error;
pub mod gateway;
pub mod middleware;
pub mod objects;
pub mod routes;
pub mod tree;
