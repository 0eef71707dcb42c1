//! Bounded image store with oldest-first eviction and a messaging relay.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
