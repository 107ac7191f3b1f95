//! Transport layer of the admission server
//!
//! Transports implement the [`Transport`] trait and share one [`Turnstile`],
//! which is cheap to clone and safe to use from many tasks at once.
//!
//! # Available Transports
//!
//! - [`http`]: REST API with JSON, usable as a forward-auth endpoint

pub mod http;


use anyhow::Result;
use async_trait::async_trait;
use turnstile::Turnstile;

/// Common interface for all transport implementations
///
/// Each transport is responsible for:
/// - Accepting client connections
/// - Mapping protocol requests onto admission, ban and statistics calls
/// - Sending responses back to clients
#[async_trait]
pub trait Transport {
    /// Start the transport server
    ///
    /// Runs until an error occurs or the server shuts down.
    async fn start(self, turnstile: Turnstile) -> Result<()>;
}
