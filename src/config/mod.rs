use anyhow::Context;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    pub server: ServerConfig,
    pub tracking: TrackingConfig,
    pub admin: Option<AdminCredentials>,
    pub frontend: FrontendConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    pub enabled: bool,
    pub ip_anonymization: bool,
    /// Seconds of inactivity after the last write before a visitor timeline expires
    #[serde(default = "TrackingConfig::default_visitor_ttl_secs")]
    pub visitor_ttl_secs: u64,
    pub geoip_city_db_path: Option<String>,
    /// Path to a uap-core `regexes.yaml`; the keyword classifier is used without it
    pub ua_regexes_path: Option<String>,
    pub trusted_proxy_mode: TrustedProxyMode,
    #[serde(default)]
    pub trusted_proxies: Vec<IpNet>,
    pub num_trusted_proxies: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    /// Only the socket peer address is used
    None,
    /// Forwarded / X-Forwarded-For, validated against the trusted proxy settings
    Standard,
    /// CF-Connecting-IP
    Cloudflare,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontendConfig {
    /// Directory with the public site, served for every unmatched path
    pub public_dir: String,
    /// Directory with the admin dashboard assets, served under /admin
    pub admin_dir: String,
}

impl TrackingConfig {
    pub const fn default_visitor_ttl_secs() -> u64 {
        2_592_000
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ip_anonymization: false,
            visitor_ttl_secs: Self::default_visitor_ttl_secs(),
            geoip_city_db_path: None,
            ua_regexes_path: None,
            trusted_proxy_mode: TrustedProxyMode::Standard,
            trusted_proxies: Vec::new(),
            num_trusted_proxies: None,
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str = std::env::var("STORE_BACKEND").unwrap_or_else(|_| "redis".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "redis" => StoreBackend::Redis,
            "sqlite" => StoreBackend::Sqlite,
            other => {
                tracing::warn!(
                    "Unknown STORE_BACKEND '{other}', falling back to 'redis'. Supported values: redis, sqlite"
                );
                StoreBackend::Redis
            }
        };

        let store_url = match backend {
            StoreBackend::Redis => std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            StoreBackend::Sqlite => std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://./visitrack.db?mode=rwc".to_string()),
        };

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid port number")?;

        let visitor_ttl_secs = match std::env::var("REDIS_VISITOR_TTL") {
            Ok(v) => v
                .parse::<u64>()
                .context("REDIS_VISITOR_TTL must be a number of seconds")?,
            Err(_) => TrackingConfig::default_visitor_ttl_secs(),
        };

        let trusted_proxy_mode = match std::env::var("TRUSTED_PROXY_MODE")
            .unwrap_or_else(|_| "standard".to_string())
            .to_lowercase()
            .as_str()
        {
            "none" => TrustedProxyMode::None,
            "standard" => TrustedProxyMode::Standard,
            "cloudflare" => TrustedProxyMode::Cloudflare,
            other => {
                tracing::warn!(
                    "Unknown TRUSTED_PROXY_MODE '{other}', falling back to 'standard'. Supported values: none, standard, cloudflare"
                );
                TrustedProxyMode::Standard
            }
        };

        let trusted_proxies = std::env::var("TRUSTED_PROXIES")
            .ok()
            .map(|list| parse_cidr_list(&list))
            .transpose()?
            .unwrap_or_default();

        let num_trusted_proxies = std::env::var("NUM_TRUSTED_PROXIES")
            .ok()
            .map(|v| v.parse::<usize>())
            .transpose()
            .context("NUM_TRUSTED_PROXIES must be a non-negative integer")?;

        let admin = match (std::env::var("ADMIN_USER"), std::env::var("ADMIN_PASSWORD")) {
            (Ok(username), Ok(password)) => Some(AdminCredentials { username, password }),
            _ => None,
        };

        Ok(Config {
            store: StoreConfig {
                backend,
                url: store_url,
            },
            server: ServerConfig { host, port },
            tracking: TrackingConfig {
                enabled: env_flag("TRACK_VISITORS"),
                ip_anonymization: env_flag("ANONYMIZE_IPS"),
                visitor_ttl_secs,
                geoip_city_db_path: std::env::var("GEOIP_CITY_DB_PATH").ok(),
                ua_regexes_path: std::env::var("UA_REGEXES_PATH").ok(),
                trusted_proxy_mode,
                trusted_proxies,
                num_trusted_proxies,
            },
            admin,
            frontend: FrontendConfig {
                public_dir: std::env::var("PUBLIC_DIR").unwrap_or_else(|_| "public".to_string()),
                admin_dir: std::env::var("ADMIN_DIR")
                    .unwrap_or_else(|_| "admin-panel".to_string()),
            },
        })
    }
}

fn parse_cidr_list(list: &str) -> anyhow::Result<Vec<IpNet>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<IpNet>()
                .or_else(|_| s.parse::<std::net::IpAddr>().map(IpNet::from))
                .with_context(|| format!("invalid entry '{s}' in TRUSTED_PROXIES"))
        })
        .collect()
}
