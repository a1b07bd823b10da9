//! HTTP API for status and runtime configuration.

pub mod server;
mod v0;

pub use server::{SharedState, router, serve};
