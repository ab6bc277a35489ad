//! Async client for the Kea DHCP control channel.
//!
//! Speaks the JSON command protocol exposed by the Kea Control Agent:
//!
//! - **Commands** (`{command, service, arguments}`) built with [`KeaCommand`]
//! - **Responses** (`{result, text, arguments}`) decoded into [`KeaResponse`]
//! - **Transport** settings (TLS, timeout, basic auth) in [`TransportConfig`]
//!
//! Higher layers (`keafly-core`) decide which commands to send and how to
//! interpret the results; this crate only moves them over the wire.

pub mod client;
pub mod command;
pub mod error;
pub mod transport;

pub use client::KeaClient;
pub use command::{KeaCommand, KeaResponse, ResponseCode};
pub use error::Error;
pub use transport::{BasicAuth, TlsMode, TransportConfig};
