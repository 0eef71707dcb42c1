use crate::{models::quota::QuotaPolicy, services::messaging::MessagingConfig};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::{env, str::FromStr};

/// Which object store adapter backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => anyhow::bail!("unknown storage backend `{}`", other),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments; read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: StorageBackend,
    pub storage_dir: String,
    pub database_url: String,
    pub list_page_size: usize,
    pub quota: QuotaPolicy,
    pub max_upload_bytes: usize,
    pub rate_limit_requests: u32,
    pub rate_limit_window_secs: u64,
    pub allowed_origins: Vec<String>,
    /// Public URL prefix used to build media links, e.g. `https://img.example.com`.
    pub public_base_url: String,
    pub messaging: Option<MessagingConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            backend: StorageBackend::Sqlite,
            storage_dir: "./data/objects".into(),
            database_url: "sqlite://./data/meta/pixel_relay.db".into(),
            list_page_size: 100,
            quota: QuotaPolicy::default(),
            max_upload_bytes: 10 * 1024 * 1024, // 10 MiB
            rate_limit_requests: 30,
            rate_limit_window_secs: 60,
            allowed_origins: vec!["*".into()],
            public_base_url: "http://localhost:3000".into(),
            messaging: None,
        }
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Bounded image store with messaging relay")]
pub struct Args {
    /// Host to bind to (overrides PIXEL_RELAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PIXEL_RELAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Object store backend (overrides PIXEL_RELAY_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<StorageBackend>,

    /// Directory where objects are stored (overrides PIXEL_RELAY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides PIXEL_RELAY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Hard size ceiling in bytes (overrides PIXEL_RELAY_HARD_SIZE_LIMIT)
    #[arg(long)]
    pub hard_size_limit: Option<u64>,

    /// Object count that forces cleanup (overrides PIXEL_RELAY_HARD_COUNT_LIMIT)
    #[arg(long)]
    pub hard_count_limit: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

/// Read an environment variable and parse it, falling back to `default`
/// when it is unset.
fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let cfg = Self::from_env_with(&args)?;
        Ok((cfg, args.migrate))
    }

    fn from_env_with(args: &Args) -> Result<Self> {
        let defaults = Self::default();

        // --- Environment fallback ---
        let env_host = env_string("PIXEL_RELAY_HOST", &defaults.host);
        let env_port = env_parse("PIXEL_RELAY_PORT", defaults.port)?;
        let env_backend = env_parse("PIXEL_RELAY_BACKEND", defaults.backend)?;
        let env_storage = env_string("PIXEL_RELAY_STORAGE_DIR", &defaults.storage_dir);
        let env_db = env_string("PIXEL_RELAY_DATABASE_URL", &defaults.database_url);

        let q = defaults.quota;
        let quota = QuotaPolicy {
            hard_size_limit: match args.hard_size_limit {
                Some(v) => v,
                None => env_parse("PIXEL_RELAY_HARD_SIZE_LIMIT", q.hard_size_limit)?,
            },
            hard_count_limit: match args.hard_count_limit {
                Some(v) => v,
                None => env_parse("PIXEL_RELAY_HARD_COUNT_LIMIT", q.hard_count_limit)?,
            },
            soft_size_threshold_fraction: env_parse(
                "PIXEL_RELAY_SOFT_SIZE_FRACTION",
                q.soft_size_threshold_fraction,
            )?,
            soft_count_threshold_fraction: env_parse(
                "PIXEL_RELAY_SOFT_COUNT_FRACTION",
                q.soft_count_threshold_fraction,
            )?,
            cleanup_target_fraction: env_parse(
                "PIXEL_RELAY_CLEANUP_TARGET_FRACTION",
                q.cleanup_target_fraction,
            )?,
        };
        quota.validate().context("invalid quota configuration")?;

        let allowed_origins = env_string("PIXEL_RELAY_ALLOWED_ORIGINS", "*")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        // messaging is optional; all four credentials must be present
        let messaging = match (
            env::var("PIXEL_RELAY_MESSAGING_ACCOUNT_SID"),
            env::var("PIXEL_RELAY_MESSAGING_AUTH_TOKEN"),
            env::var("PIXEL_RELAY_MESSAGING_FROM"),
            env::var("PIXEL_RELAY_ALLOWED_RECIPIENT"),
        ) {
            (Ok(account_sid), Ok(auth_token), Ok(from_number), Ok(allowed_recipient)) => {
                Some(MessagingConfig {
                    api_base: env_string(
                        "PIXEL_RELAY_MESSAGING_API_BASE",
                        "https://api.twilio.com",
                    ),
                    account_sid,
                    auth_token,
                    from_number,
                    allowed_recipient,
                })
            }
            _ => None,
        };

        // --- Merge ---
        let port = args.port.unwrap_or(env_port);
        Ok(Self {
            host: args.host.clone().unwrap_or(env_host),
            port,
            backend: args.backend.unwrap_or(env_backend),
            storage_dir: args.storage_dir.clone().unwrap_or(env_storage),
            database_url: args.database_url.clone().unwrap_or(env_db),
            list_page_size: env_parse("PIXEL_RELAY_LIST_PAGE_SIZE", defaults.list_page_size)?,
            quota,
            max_upload_bytes: env_parse("PIXEL_RELAY_MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            rate_limit_requests: env_parse(
                "PIXEL_RELAY_RATE_LIMIT_REQUESTS",
                defaults.rate_limit_requests,
            )?,
            rate_limit_window_secs: env_parse(
                "PIXEL_RELAY_RATE_LIMIT_WINDOW_SECS",
                defaults.rate_limit_window_secs,
            )?,
            allowed_origins,
            public_base_url: env_string(
                "PIXEL_RELAY_PUBLIC_BASE_URL",
                &format!("http://localhost:{}", port),
            ),
            messaging,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
