//! `ChatBridge`: ordered delivery between an asynchronous chat backend and a
//! conversation front end.
//!
//! The [`delivery::Engine`] is the core. [`runtime`] hosts it in a tokio
//! task, and [`replay`] with [`config`] back the `chatbridge` binary.

pub mod backend;
pub mod config;
pub mod delivery;
pub mod frontend;
pub mod replay;
pub mod runtime;
pub mod transfer;
