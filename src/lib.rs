//! Signer relay
//!
//! Hands a document from a browser workflow to a local signing application and
//! the signed result back. The browser registers a session and polls; the
//! signer fetches the unsigned PDF and posts its result through whichever wire
//! convention its version speaks.
//!
//! - [`session`] - session lifecycle metadata
//! - [`store`] - document bytes, in memory or on disk
//! - [`protocol`] - signer wire conventions and the [`protocol::SigningRelay`] service
//! - [`retention`] - expiry and post-download cleanup
//! - [`server`], [`routes`] - HTTP surface

pub mod clock;
pub mod config;
pub mod protocol;
pub mod retention;
pub mod routes;
pub mod server;
pub mod session;
pub mod store;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{RelayError, Result};
