//! Conduit Server — location-transparent RPC over a pub/sub event bus:
//! service-side dispatch, caller-side proxies, sessions, and protocol
//! gateway adapters.

pub mod config;
pub mod error;
pub mod gateway;
pub mod rpc;
pub mod security;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{GatewayConfig, RpcConfig, ServerConfig, SessionConfig};
pub use error::RpcError;

/// Installs a process-wide tracing subscriber honoring `RUST_LOG`.
///
/// Intended for binaries and examples; libraries embedding this crate
/// usually install their own.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
