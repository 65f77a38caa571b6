//! Server configuration module
//!
//! Handles loading configuration from environment variables with sensible defaults.

use std::net::SocketAddr;
use std::time::Duration;

use keygate_core::{CoseAlgorithm, KeygateError, RelyingPartyConfig};

/// Users provisioned at startup when `KEYGATE_SEED_USERS` is unset
pub const DEFAULT_SEED_USERS: &str = "1234:Test,2345:Test2";

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 10001)
    pub port: u16,
    /// Server host (default: 127.0.0.1)
    pub host: [u8; 4],
    /// Allowed CORS origins, comma-separated (default: allow all in dev)
    pub allowed_origins: Option<Vec<String>>,
    /// Request body limit in KB (default: 64)
    pub body_limit_kb: usize,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
    /// Enable rate limiting (default: false for tests, true when loaded from env)
    pub rate_limit_enabled: bool,
    /// Rate limit: requests per second (default: 10)
    pub rate_limit_per_sec: u64,
    /// Rate limit: burst size (default: 20)
    pub rate_limit_burst: u32,
    /// PostgreSQL connection string; in-memory storage when unset
    pub database_url: Option<String>,
    /// Database connection pool maximum connections (default: 20)
    pub database_max_connections: u32,
    /// Relying Party display name (default: "Keygate")
    pub rp_name: String,
    /// Relying Party ID (default: "localhost")
    pub rp_id: String,
    /// Expected client origin (default: "http://localhost:10001")
    pub rp_origin: String,
    /// Accepted credential algorithms (default: ES256, EdDSA)
    pub allowed_algorithms: Vec<CoseAlgorithm>,
    /// Require the UV flag on every ceremony (default: false)
    pub require_user_verification: bool,
    /// Return an empty allow list for users without credentials (default: false)
    pub allow_empty_allow_list: bool,
    /// Challenge lifetime in seconds; no expiry when unset
    pub challenge_ttl_secs: Option<u64>,
    /// `(id, username)` pairs provisioned at startup
    pub seed_users: Vec<(String, String)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 10001,
            host: [127, 0, 0, 1],
            allowed_origins: None, // None = allow all (dev mode)
            body_limit_kb: 64,
            timeout_secs: 30,
            rate_limit_enabled: false, // Disabled by default (for tests)
            rate_limit_per_sec: 10,
            rate_limit_burst: 20,
            database_url: None,
            database_max_connections: 20,
            rp_name: "Keygate".to_string(),
            rp_id: "localhost".to_string(),
            rp_origin: "http://localhost:10001".to_string(),
            allowed_algorithms: CoseAlgorithm::ALL.to_vec(),
            require_user_verification: false,
            allow_empty_allow_list: false,
            challenge_ttl_secs: None,
            seed_users: parse_seed_users(DEFAULT_SEED_USERS),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Fails when `KEYGATE_ALLOWED_ALGORITHMS` names an algorithm the engine
    /// cannot verify.
    pub fn from_env() -> Result<Self, KeygateError> {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);

        let host = std::env::var("HOST")
            .ok()
            .map(|h| {
                if h == "0.0.0.0" {
                    [0, 0, 0, 0]
                } else {
                    [127, 0, 0, 1]
                }
            })
            .unwrap_or(defaults.host);

        let allowed_origins = std::env::var("ALLOWED_ORIGINS").ok().map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        let body_limit_kb = std::env::var("BODY_LIMIT_KB")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.body_limit_kb);

        let timeout_secs = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.timeout_secs);

        let rate_limit_per_sec = std::env::var("RATE_LIMIT_PER_SEC")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.rate_limit_per_sec);

        let rate_limit_burst = std::env::var("RATE_LIMIT_BURST")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.rate_limit_burst);

        // Rate limiting enabled by default in production, can be disabled with RATE_LIMIT_ENABLED=false
        let rate_limit_enabled = std::env::var("RATE_LIMIT_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let database_max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.database_max_connections);

        let rp_name = std::env::var("KEYGATE_RP_NAME").unwrap_or(defaults.rp_name);
        let rp_id = std::env::var("KEYGATE_RP_ID").unwrap_or(defaults.rp_id);
        let rp_origin = std::env::var("KEYGATE_RP_ORIGIN").unwrap_or(defaults.rp_origin);

        let allowed_algorithms = match std::env::var("KEYGATE_ALLOWED_ALGORITHMS") {
            Ok(v) => parse_algorithms(&v)?,
            Err(_) => defaults.allowed_algorithms,
        };

        let require_user_verification = std::env::var("KEYGATE_REQUIRE_USER_VERIFICATION")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        let allow_empty_allow_list = std::env::var("KEYGATE_ALLOW_EMPTY_ALLOW_LIST")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        let challenge_ttl_secs = std::env::var("KEYGATE_CHALLENGE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|secs| *secs > 0);

        let seed_users = std::env::var("KEYGATE_SEED_USERS")
            .map(|v| parse_seed_users(&v))
            .unwrap_or(defaults.seed_users);

        Ok(Self {
            port,
            host,
            allowed_origins,
            body_limit_kb,
            timeout_secs,
            rate_limit_enabled,
            rate_limit_per_sec,
            rate_limit_burst,
            database_url,
            database_max_connections,
            rp_name,
            rp_id,
            rp_origin,
            allowed_algorithms,
            require_user_verification,
            allow_empty_allow_list,
            challenge_ttl_secs,
            seed_users,
        })
    }

    /// Get socket address from config
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }

    /// Build the validated relying party configuration
    pub fn relying_party(&self) -> Result<RelyingPartyConfig, KeygateError> {
        Ok(
            RelyingPartyConfig::new(&self.rp_id, &self.rp_name, &self.rp_origin)?
                .with_allowed_algorithms(self.allowed_algorithms.clone())?
                .with_user_verification_required(self.require_user_verification)
                .with_empty_allow_list(self.allow_empty_allow_list)
                .with_challenge_ttl(self.challenge_ttl_secs.map(Duration::from_secs)),
        )
    }
}

/// Parse a comma-separated algorithm list such as `-7,-8` or `ES256,EdDSA`.
///
/// Duplicates collapse. An unknown entry fails the whole list; an empty list
/// is left for [`RelyingPartyConfig`] validation to refuse.
fn parse_algorithms(value: &str) -> Result<Vec<CoseAlgorithm>, KeygateError> {
    let mut algorithms = Vec::new();
    for entry in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let alg = entry
            .parse::<CoseAlgorithm>()
            .map_err(|e| KeygateError::Config(format!("KEYGATE_ALLOWED_ALGORITHMS: {e}")))?;
        if !algorithms.contains(&alg) {
            algorithms.push(alg);
        }
    }
    Ok(algorithms)
}

/// Parse `id:username` pairs separated by commas.
fn parse_seed_users(value: &str) -> Vec<(String, String)> {
    value
        .split(',')
        .filter_map(|pair| {
            let (id, name) = pair.split_once(':')?;
            let (id, name) = (id.trim(), name.trim());
            if id.is_empty() || name.is_empty() {
                None
            } else {
                Some((id.to_string(), name.to_string()))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 10001);
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:10001");
        assert!(!config.rate_limit_enabled);
        assert_eq!(
            config.seed_users,
            vec![
                ("1234".to_string(), "Test".to_string()),
                ("2345".to_string(), "Test2".to_string())
            ]
        );
        let rp = config.relying_party().unwrap();
        assert_eq!(rp.origin, "http://localhost:10001");
        assert!(rp.challenge_ttl.is_none());
    }

    #[test]
    fn test_parse_algorithms() {
        assert_eq!(
            parse_algorithms("-7, EdDSA").unwrap(),
            vec![CoseAlgorithm::Es256, CoseAlgorithm::EdDsa]
        );
        assert_eq!(
            parse_algorithms("-8,-8, ").unwrap(),
            vec![CoseAlgorithm::EdDsa]
        );
    }

    #[test]
    fn test_unknown_algorithm_fails_the_list() {
        for value in ["RS256", "ES265", "-8,-257"] {
            assert!(
                matches!(parse_algorithms(value), Err(KeygateError::Config(_))),
                "{value}"
            );
        }
    }

    #[test]
    fn test_empty_algorithm_list_rejected() {
        let config = Config {
            allowed_algorithms: parse_algorithms(" , ").unwrap(),
            ..Config::default()
        };
        assert!(config.allowed_algorithms.is_empty());
        assert!(matches!(
            config.relying_party(),
            Err(KeygateError::Config(_))
        ));
    }

    #[test]
    fn test_from_env_refuses_unknown_algorithms() {
        std::env::set_var("KEYGATE_ALLOWED_ALGORITHMS", "RS256");
        let result = Config::from_env();
        std::env::remove_var("KEYGATE_ALLOWED_ALGORITHMS");
        assert!(matches!(result, Err(KeygateError::Config(_))));
    }

    #[test]
    fn test_parse_seed_users() {
        assert_eq!(
            parse_seed_users("a:Alice, b : Bob,broken,:x"),
            vec![
                ("a".to_string(), "Alice".to_string()),
                ("b".to_string(), "Bob".to_string())
            ]
        );
    }

    #[test]
    fn test_invalid_origin_rejected() {
        let config = Config {
            rp_origin: "http://evil.test".into(),
            ..Config::default()
        };
        assert!(config.relying_party().is_err());
    }
}
