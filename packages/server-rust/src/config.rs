//! Configuration types for the Conduit server.

use std::time::Duration;

/// Top-level configuration aggregating all server concerns.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub rpc: RpcConfig,
    pub session: SessionConfig,
    pub gateway: GatewayConfig,
}

/// Settings for the dispatch and call cores.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// When true, error replies include the stack trace of the failure.
    pub debug: bool,
    /// Timeout applied to proxy calls that do not specify one.
    pub default_call_timeout: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            debug: false,
            default_call_timeout: Duration::from_secs(30),
        }
    }
}

/// Settings for the session core.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Idle duration after which a collaborator-owned sweep may expire a
    /// session. The sweep itself is scheduled elsewhere; this core only
    /// exposes the data it needs.
    pub session_timeout: Duration,
    /// CRI patterns every session is permanently allowed to send to.
    pub send_patterns: Vec<String>,
    /// CRI patterns every session is permanently allowed to subscribe to.
    pub subscribe_patterns: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(30 * 60),
            send_patterns: vec!["srv://**".to_string()],
            subscribe_patterns: Vec::new(),
        }
    }
}

/// Settings for the protocol gateway adapters.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Root path prefix stripped from inbound REST request paths before the
    /// remainder is rewritten into a CRI.
    pub rest_root_path: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            rest_root_path: "/api".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_config_defaults() {
        let config = RpcConfig::default();
        assert!(!config.debug);
        assert_eq!(config.default_call_timeout, Duration::from_secs(30));
    }

    #[test]
    fn session_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.session_timeout, Duration::from_secs(1800));
        assert_eq!(config.send_patterns, vec!["srv://**".to_string()]);
        assert!(config.subscribe_patterns.is_empty());
    }

    #[test]
    fn gateway_config_defaults() {
        assert_eq!(GatewayConfig::default().rest_root_path, "/api");
    }
}
