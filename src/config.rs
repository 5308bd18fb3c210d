use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Global configuration for the gateway
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream partner API configuration
    pub upstream: UpstreamConfig,

    /// Inbound access control configuration
    #[serde(default)]
    pub access: AccessConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Listen port (default: 5000)
    #[serde(default = "default_listen_port")]
    pub port: u16,

    /// Bind address (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Maximum inbound request body size in bytes (default: 102400)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl ServerConfig {
    /// Socket address string the gateway binds to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_listen_port(),
            bind: default_bind_address(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Upstream endpoints and credentials
#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamConfig {
    /// Basic credential sent on the inventory resolve call
    pub api_key: String,

    /// Base URL of the inventory partner API
    pub inventory_base_url: String,

    /// Full URL of the ADF-XML ingestion endpoint
    pub adf_ingest_url: String,

    /// Per-call timeout in seconds for outbound requests (default: none,
    /// client defaults apply)
    pub timeout_secs: Option<u64>,
}

impl UpstreamConfig {
    /// Per-call timeout for outbound requests, when configured
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Who may call the gateway: shared client keys and browser origins
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AccessConfig {
    /// Client keys accepted in the x-client-key header. An empty list
    /// rejects every request.
    #[serde(default)]
    pub client_keys: Vec<String>,

    /// Origins granted cross-origin access. Requests without an Origin
    /// header bypass this check.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

// Default value functions
fn default_listen_port() -> u16 {
    5000
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_max_body_bytes() -> usize {
    102400 // 100 KiB inbound body cap
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from process environment variables. Absent
    /// variables fall back to defaults or empty values; the gateway still
    /// starts but warns about what is missing.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let port = match lookup("PORT") {
            Some(raw) => parse_var("PORT", &raw)?,
            None => default_listen_port(),
        };
        let bind = lookup("BIND").unwrap_or_else(default_bind_address);
        let max_body_bytes = match lookup("MAX_BODY_BYTES") {
            Some(raw) => parse_var("MAX_BODY_BYTES", &raw)?,
            None => default_max_body_bytes(),
        };
        let timeout_secs = match lookup("UPSTREAM_TIMEOUT_SECS") {
            Some(raw) => Some(parse_var("UPSTREAM_TIMEOUT_SECS", &raw)?),
            None => None,
        };

        let config = Config {
            server: ServerConfig {
                port,
                bind,
                max_body_bytes,
            },
            upstream: UpstreamConfig {
                api_key: lookup("API_KEY").unwrap_or_default(),
                inventory_base_url: lookup("GET_API_BASE_URL").unwrap_or_default(),
                adf_ingest_url: lookup("POST_API_BASE_URL").unwrap_or_default(),
                timeout_secs,
            },
            access: AccessConfig {
                client_keys: parse_list(lookup("ALLOWED_CLIENT_KEYS").as_deref()),
                allowed_origins: parse_list(lookup("ALLOWED_ORIGINS").as_deref()),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut errors = Vec::new();

        if self.server.max_body_bytes == 0 {
            errors.push("'max_body_bytes' must be greater than 0".to_string());
        }
        if self.upstream.timeout_secs == Some(0) {
            errors.push("'timeout_secs' must be greater than 0 when set".to_string());
        }

        if !errors.is_empty() {
            anyhow::bail!("Configuration errors:\n  - {}", errors.join("\n  - "));
        }

        Ok(())
    }
}

/// Split a comma-separated value, trimming entries and dropping empty ones
fn parse_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn parse_var<T>(name: &str, raw: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| anyhow::anyhow!("invalid {} value '{}': {}", name, raw, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(entries: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[server]
port = 8080
bind = "127.0.0.1"
max_body_bytes = 4096

[upstream]
api_key = "c2VjcmV0"
inventory_base_url = "https://partner.example.com"
adf_ingest_url = "https://leads.example.com/adf"
timeout_secs = 15

[access]
client_keys = ["key-one", "key-two"]
allowed_origins = ["https://dealer.example.com"]
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.server.max_body_bytes, 4096);
        assert_eq!(config.upstream.api_key, "c2VjcmV0");
        assert_eq!(
            config.upstream.inventory_base_url,
            "https://partner.example.com"
        );
        assert_eq!(config.upstream.timeout(), Some(Duration::from_secs(15)));
        assert_eq!(config.access.client_keys.len(), 2);
        assert_eq!(
            config.access.allowed_origins,
            vec!["https://dealer.example.com"]
        );
    }

    #[test]
    fn test_default_server_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 5000);
        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.max_body_bytes, 102400);
        assert_eq!(config.listen_addr(), "0.0.0.0:5000");
    }

    #[test]
    fn test_minimal_config() {
        let toml = r#"
[upstream]
api_key = "k"
inventory_base_url = "https://partner.example.com"
adf_ingest_url = "https://leads.example.com/adf"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        // Should use defaults for server and access
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert!(config.access.client_keys.is_empty());
        assert!(config.access.allowed_origins.is_empty());
        assert_eq!(config.upstream.timeout(), None);
    }

    #[test]
    fn test_missing_upstream_section_is_an_error() {
        let toml = r#"
[server]
port = 8080
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[server]
port = 4100

[upstream]
api_key = "k"
inventory_base_url = "https://partner.example.com"
adf_ingest_url = "https://leads.example.com/adf"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.port, 4100);
        assert_eq!(config.upstream.api_key, "k");
    }

    #[test]
    fn test_load_missing_file_is_an_error() {
        assert!(Config::load("/nonexistent/lotgate.toml").is_err());
    }

    #[test]
    fn test_from_lookup_full_environment() {
        let config = Config::from_lookup(lookup_from(&[
            ("PORT", "8200"),
            ("BIND", "127.0.0.1"),
            ("MAX_BODY_BYTES", "2048"),
            ("UPSTREAM_TIMEOUT_SECS", "20"),
            ("API_KEY", "c2VjcmV0"),
            ("GET_API_BASE_URL", "https://partner.example.com"),
            ("POST_API_BASE_URL", "https://leads.example.com/adf"),
            ("ALLOWED_CLIENT_KEYS", "alpha, beta"),
            ("ALLOWED_ORIGINS", "https://a.example.com,https://b.example.com"),
        ]))
        .unwrap();

        assert_eq!(config.server.port, 8200);
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.server.max_body_bytes, 2048);
        assert_eq!(config.upstream.timeout(), Some(Duration::from_secs(20)));
        assert_eq!(config.upstream.api_key, "c2VjcmV0");
        assert_eq!(config.access.client_keys, vec!["alpha", "beta"]);
        assert_eq!(config.access.allowed_origins.len(), 2);
    }

    #[test]
    fn test_from_lookup_empty_environment() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();

        // Starts with defaults and empty values rather than failing
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.max_body_bytes, 102400);
        assert!(config.upstream.api_key.is_empty());
        assert!(config.upstream.inventory_base_url.is_empty());
        assert!(config.access.client_keys.is_empty());
        assert_eq!(config.upstream.timeout(), None);
    }

    #[test]
    fn test_from_lookup_invalid_port_is_an_error() {
        let result = Config::from_lookup(lookup_from(&[("PORT", "not-a-port")]));
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("PORT"));
        assert!(err.contains("not-a-port"));
    }

    #[test]
    fn test_list_parsing_trims_and_drops_empties() {
        assert_eq!(
            parse_list(Some(" alpha , beta ,, gamma,")),
            vec!["alpha", "beta", "gamma"]
        );
        assert!(parse_list(Some("")).is_empty());
        assert!(parse_list(Some(" , ,")).is_empty());
        assert!(parse_list(None).is_empty());
    }

    #[test]
    fn test_validate_rejects_zero_body_cap() {
        let toml = r#"
[server]
max_body_bytes = 0

[upstream]
api_key = "k"
inventory_base_url = "https://partner.example.com"
adf_ingest_url = "https://leads.example.com/adf"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let result = config.validate();
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("'max_body_bytes' must be greater than 0"));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let toml = r#"
[upstream]
api_key = "k"
inventory_base_url = "https://partner.example.com"
adf_ingest_url = "https://leads.example.com/adf"
timeout_secs = 0
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let result = config.validate();
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("'timeout_secs' must be greater than 0"));
    }
}
