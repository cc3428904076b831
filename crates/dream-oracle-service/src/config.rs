//! Service configuration.

use std::path::Path;

use serde::Deserialize;

use dream_oracle_core::{TierLimits, DEFAULT_TRIAL_DAYS};

use crate::stripe::PriceTierMap;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/dream-oracle").
    pub data_dir: String,

    /// HS256 secret for user bearer tokens.
    pub jwt_secret: Option<String>,

    /// Service API key for the app's metering calls.
    pub service_api_key: Option<String>,

    /// Shared secret for scheduled-job triggers.
    pub cron_secret: Option<String>,

    /// Stripe webhook secret (verification is skipped when unset).
    pub stripe_webhook_secret: Option<String>,

    /// Stripe price IDs mapped to tiers.
    pub stripe_prices: PriceTierMap,

    /// Per-tier quotas.
    pub tier_limits: TierLimits,

    /// Trial length granted at registration, in days.
    pub trial_days: i64,

    /// Usage logs older than this many days are deleted by the cleanup job.
    pub usage_retention_days: i64,

    /// Requests per minute allowed per authenticated user.
    pub rate_limit_per_minute: u32,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

/// Stripe secrets file structure.
#[derive(Debug, Deserialize)]
struct StripeSecrets {
    #[serde(default)]
    webhook_secret: Option<String>,
    #[serde(default)]
    prices: StripePrices,
}

#[derive(Debug, Default, Deserialize)]
struct StripePrices {
    #[serde(default)]
    essential: Vec<String>,
    #[serde(default)]
    premium: Vec<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        // Try to load Stripe secrets from file first, then fall back to env vars
        let (stripe_webhook_secret, stripe_prices) = load_stripe_secrets();

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/dream-oracle".into()),
            jwt_secret: std::env::var("JWT_SECRET").ok(),
            service_api_key: std::env::var("SERVICE_API_KEY").ok(),
            cron_secret: std::env::var("CRON_SECRET").ok(),
            stripe_webhook_secret,
            stripe_prices,
            tier_limits: load_tier_limits(std::env::var("TIER_LIMITS_FILE").ok().as_deref()),
            trial_days: env_parse("TRIAL_DAYS").unwrap_or(DEFAULT_TRIAL_DAYS),
            usage_retention_days: env_parse("USAGE_RETENTION_DAYS").unwrap_or(400),
            rate_limit_per_minute: env_parse("RATE_LIMIT_PER_MINUTE").unwrap_or(60),
            cors_origins: split_list(
                &std::env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".into()),
            ),
            max_body_bytes: env_parse("MAX_BODY_BYTES").unwrap_or(1024 * 1024), // 1MB
            request_timeout_seconds: env_parse("REQUEST_TIMEOUT_SECONDS").unwrap_or(30),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// Split a comma-separated list, dropping empty entries.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Load Stripe secrets from file or environment.
fn load_stripe_secrets() -> (Option<String>, PriceTierMap) {
    let secret_paths = [
        ".secrets/stripe.json",
        "dream-oracle/.secrets/stripe.json",
        "../.secrets/stripe.json",
    ];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<StripeSecrets>(path) {
            tracing::info!(path = %path, "Loaded Stripe secrets from file");
            return (
                secrets.webhook_secret,
                PriceTierMap::new(&secrets.prices.essential, &secrets.prices.premium),
            );
        }
    }

    // Fall back to environment variables
    tracing::debug!("Stripe secrets file not found, using environment variables");
    let essential = split_list(&std::env::var("STRIPE_PRICE_ESSENTIAL").unwrap_or_default());
    let premium = split_list(&std::env::var("STRIPE_PRICE_PREMIUM").unwrap_or_default());
    (
        std::env::var("STRIPE_WEBHOOK_SECRET").ok(),
        PriceTierMap::new(&essential, &premium),
    )
}

/// Load the tier table, applying the operator's overrides file when given.
///
/// A missing or malformed file is logged and the defaults are used.
fn load_tier_limits(path: Option<&str>) -> TierLimits {
    let Some(path) = path else {
        return TierLimits::default();
    };

    match std::fs::read_to_string(path) {
        Ok(contents) => match TierLimits::from_json_overrides(&contents) {
            Ok(limits) => {
                tracing::info!(path = %path, "Loaded tier limit overrides");
                limits
            }
            Err(e) => {
                tracing::error!(path = %path, error = %e, "Invalid tier limits file, using defaults");
                TierLimits::default()
            }
        },
        Err(e) => {
            tracing::error!(path = %path, error = %e, "Cannot read tier limits file, using defaults");
            TierLimits::default()
        }
    }
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/dream-oracle".into(),
            jwt_secret: None,
            service_api_key: None,
            cron_secret: None,
            stripe_webhook_secret: None,
            stripe_prices: PriceTierMap::default(),
            tier_limits: TierLimits::default(),
            trial_days: DEFAULT_TRIAL_DAYS,
            usage_retention_days: 400,
            rate_limit_per_minute: 60,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
        }
    }
}
