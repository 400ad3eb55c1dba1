//! Shared data types for the `ChatBridge` backend and front-end boundaries.

pub mod backend;
pub mod message;
