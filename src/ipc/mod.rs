//! IPC module for status indicator communication
//!
//! Serves the menu bar indicator over a Unix domain socket.

pub mod protocol;
mod server;

pub use server::Server;
