//! TCP front end for the cqrpc engine.
//!
//! * [`TcpTransport`]: framed TCP transport over the engine's acceptor.
//! * [`service`]: the demo `TestService` methods.
//! * [`Client`]: sequential async client.
//! * [`App`]: config-driven assembly used by the `cqrpc` binary.

#![warn(missing_docs)]

pub mod app;
pub mod client;
pub mod config;
pub mod service;
pub mod tcp;

pub use app::{App, StartError};
pub use client::{Client, ClientError};
pub use config::{ConfigError, ServerConfig};
pub use tcp::TcpTransport;
