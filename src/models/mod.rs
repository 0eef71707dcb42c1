//! Core data models for the bounded image store.
//!
//! Objects and listing pages come from the storage adapters; snapshots,
//! plans and decisions are produced by the quota core and never persisted.

pub mod inventory;
pub mod object;
pub mod quota;
