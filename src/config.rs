use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, fmt::Display, str::FromStr, time::Duration};

/// Where photo bytes are stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// S3-compatible object storage.
    S3,
    /// Local directory, for development.
    Disk,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(value, true)
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub path_prefix: String,
    pub storage_backend: StorageBackend,
    pub bucket: String,
    pub public_base_url: String,
    pub storage_dir: String,
    pub s3_endpoint: Option<String>,
    pub s3_region: String,
    pub s3_force_path_style: bool,
    pub image_processor_url: String,
    pub upload_timeout: Duration,
    pub processing_timeout: Duration,
    pub max_upload_bytes: usize,
    pub require_price: bool,
    pub strict_cleanup: bool,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Classified ads and photo upload API")]
pub struct Args {
    /// Host to bind to (overrides AD_MANAGER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides AD_MANAGER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides AD_MANAGER_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Prefix all API routes, e.g. /api/v1 (overrides AD_MANAGER_PATH_PREFIX)
    #[arg(long)]
    pub path_prefix: Option<String>,

    /// Photo storage backend (overrides AD_MANAGER_STORAGE_BACKEND)
    #[arg(long, value_enum)]
    pub storage_backend: Option<StorageBackend>,

    /// Bucket photos are written to (overrides AD_MANAGER_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Base of public photo URLs (overrides AD_MANAGER_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Directory for the disk backend (overrides AD_MANAGER_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Custom S3 endpoint, e.g. MinIO (overrides AD_MANAGER_S3_ENDPOINT)
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// S3 region (overrides AD_MANAGER_S3_REGION)
    #[arg(long)]
    pub s3_region: Option<String>,

    /// Use path-style S3 addressing (or AD_MANAGER_S3_FORCE_PATH_STYLE=true)
    #[arg(long)]
    pub s3_force_path_style: bool,

    /// gRPC address of the image processor (overrides IMAGE_PROCESSOR_URL)
    #[arg(long)]
    pub image_processor_url: Option<String>,

    /// Upload timeout in seconds (overrides AD_MANAGER_UPLOAD_TIMEOUT_SECS)
    #[arg(long)]
    pub upload_timeout_secs: Option<u64>,

    /// Image processor timeout in seconds (overrides AD_MANAGER_PROCESSING_TIMEOUT_SECS)
    #[arg(long)]
    pub processing_timeout_secs: Option<u64>,

    /// Largest accepted photo request in bytes (overrides AD_MANAGER_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Reject ads without a price (or AD_MANAGER_REQUIRE_PRICE=true)
    #[arg(long)]
    pub require_price: bool,

    /// Remove objects and rows left by failed photo uploads
    /// (or AD_MANAGER_STRICT_CLEANUP=true)
    #[arg(long)]
    pub strict_cleanup: bool,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::from_sources(args, |name| env::var(name).ok())?;
        Ok((cfg, migrate))
    }

    /// Merge CLI args over values found through `lookup`, then defaults.
    pub fn from_sources(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let text = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.into());

        let cfg = Self {
            host: args
                .host
                .unwrap_or_else(|| text("AD_MANAGER_HOST", "0.0.0.0")),
            port: match args.port {
                Some(port) => port,
                None => parsed(&lookup, "AD_MANAGER_PORT", 8080)?,
            },
            database_url: args.database_url.unwrap_or_else(|| {
                text("AD_MANAGER_DATABASE_URL", "sqlite://./data/ad_manager.db")
            }),
            path_prefix: normalize_prefix(
                &args
                    .path_prefix
                    .unwrap_or_else(|| text("AD_MANAGER_PATH_PREFIX", "")),
            )?,
            storage_backend: match args.storage_backend {
                Some(backend) => backend,
                None => parsed(&lookup, "AD_MANAGER_STORAGE_BACKEND", StorageBackend::S3)?,
            },
            bucket: args
                .bucket
                .unwrap_or_else(|| text("AD_MANAGER_BUCKET", "meshetr-images")),
            public_base_url: args.public_base_url.unwrap_or_else(|| {
                text("AD_MANAGER_PUBLIC_BASE_URL", "https://storage.googleapis.com")
            }),
            storage_dir: args
                .storage_dir
                .unwrap_or_else(|| text("AD_MANAGER_STORAGE_DIR", "./data/objects")),
            s3_endpoint: args
                .s3_endpoint
                .or_else(|| lookup("AD_MANAGER_S3_ENDPOINT"))
                .filter(|endpoint| !endpoint.is_empty()),
            s3_region: args
                .s3_region
                .unwrap_or_else(|| text("AD_MANAGER_S3_REGION", "us-east-1")),
            s3_force_path_style: args.s3_force_path_style
                || parsed(&lookup, "AD_MANAGER_S3_FORCE_PATH_STYLE", false)?,
            image_processor_url: args
                .image_processor_url
                .unwrap_or_else(|| text("IMAGE_PROCESSOR_URL", "http://127.0.0.1:50051")),
            upload_timeout: Duration::from_secs(match args.upload_timeout_secs {
                Some(secs) => secs,
                None => parsed(&lookup, "AD_MANAGER_UPLOAD_TIMEOUT_SECS", 50)?,
            }),
            processing_timeout: Duration::from_secs(match args.processing_timeout_secs {
                Some(secs) => secs,
                None => parsed(&lookup, "AD_MANAGER_PROCESSING_TIMEOUT_SECS", 10)?,
            }),
            max_upload_bytes: match args.max_upload_bytes {
                Some(bytes) => bytes,
                None => parsed(&lookup, "AD_MANAGER_MAX_UPLOAD_BYTES", 32 * 1024 * 1024)?,
            },
            require_price: args.require_price
                || parsed(&lookup, "AD_MANAGER_REQUIRE_PRICE", false)?,
            strict_cleanup: args.strict_cleanup
                || parsed(&lookup, "AD_MANAGER_STRICT_CLEANUP", false)?,
        };

        if cfg.upload_timeout.is_zero() || cfg.processing_timeout.is_zero() {
            bail!("timeouts must be at least one second");
        }

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse `name` from `lookup`, falling back to `default` when unset or empty.
fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(name).filter(|value| !value.trim().is_empty()) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("{}", err))
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        None => Ok(default),
    }
}

/// `api/v1/` -> `/api/v1`; empty stays empty.
fn normalize_prefix(prefix: &str) -> Result<String> {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    if trimmed.contains(['{', '}', '*']) {
        bail!("path prefix `{}` must not contain route parameters", prefix);
    }
    Ok(format!("/{}", trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = AppConfig::from_sources(Args::default(), env_of(&[])).unwrap();

        assert_eq!(cfg.addr(), "0.0.0.0:8080");
        assert_eq!(cfg.path_prefix, "");
        assert_eq!(cfg.storage_backend, StorageBackend::S3);
        assert_eq!(cfg.bucket, "meshetr-images");
        assert_eq!(cfg.upload_timeout, Duration::from_secs(50));
        assert_eq!(cfg.processing_timeout, Duration::from_secs(10));
        assert!(cfg.s3_endpoint.is_none());
        assert!(!cfg.require_price);
        assert!(!cfg.strict_cleanup);
    }

    #[test]
    fn cli_wins_over_environment() {
        let args = Args {
            port: Some(9000),
            bucket: Some("cli-bucket".into()),
            strict_cleanup: true,
            ..Args::default()
        };
        let env = env_of(&[
            ("AD_MANAGER_PORT", "7000"),
            ("AD_MANAGER_BUCKET", "env-bucket"),
            ("AD_MANAGER_STORAGE_BACKEND", "disk"),
            ("AD_MANAGER_PATH_PREFIX", "api/v1/"),
            ("AD_MANAGER_REQUIRE_PRICE", "true"),
        ]);

        let cfg = AppConfig::from_sources(args, env).unwrap();

        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.bucket, "cli-bucket");
        assert_eq!(cfg.storage_backend, StorageBackend::Disk);
        assert_eq!(cfg.path_prefix, "/api/v1");
        assert!(cfg.require_price);
        assert!(cfg.strict_cleanup);
    }

    #[test]
    fn malformed_values_name_the_variable() {
        let err = AppConfig::from_sources(
            Args::default(),
            env_of(&[("AD_MANAGER_UPLOAD_TIMEOUT_SECS", "soon")]),
        )
        .unwrap_err();

        assert!(format!("{:#}", err).contains("AD_MANAGER_UPLOAD_TIMEOUT_SECS"));
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let args = Args {
            processing_timeout_secs: Some(0),
            ..Args::default()
        };
        assert!(AppConfig::from_sources(args, env_of(&[])).is_err());
    }

    #[test]
    fn prefixes_with_parameters_are_rejected() {
        assert!(normalize_prefix("/api/{version}").is_err());
        assert_eq!(normalize_prefix("/").unwrap(), "");
    }
}
