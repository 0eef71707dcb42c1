//! Storage adapters, the quota core and the request-level collaborators.

pub mod accountant;
pub mod admission;
pub mod memory_store;
pub mod messaging;
pub mod object_store;
pub mod planner;
pub mod rate_limit;
pub mod sqlite_store;
pub mod upload;
