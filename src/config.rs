//! Runtime configuration.
//!
//! Values come from the process environment, optionally seeded from a `.env` file.

use crate::errors::{GateError, Result};
use crate::gateway::CRYPTO_PAY_API_URL;
use crate::host::TELEGRAM_API_URL;
use crate::types::{
    PollPolicy, DEFAULT_HTTP_TIMEOUT, DEFAULT_INVITE_TTL, DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL,
};
use std::str::FromStr;
use std::time::Duration;

/// Everything the bot needs to run.
#[derive(Clone, Debug)]
pub struct BotConfig {
    /// Bot API token (env: API_TOKEN)
    pub api_token: String,

    /// Private channel the invites open (env: CHANNEL_ID)
    pub channel_id: i64,

    /// Operator receiving payment notices (env: ADMIN_ID)
    pub admin_id: i64,

    /// Crypto Pay application token (env: CRYPTOPAY_TOKEN)
    pub cryptopay_token: String,

    /// Payment provider token for native invoices (env: PROVIDER_TOKEN, empty for Stars)
    pub provider_token: String,

    /// Crypto Pay API root (env: CRYPTOPAY_API_URL)
    pub cryptopay_api_url: String,

    /// Bot API root (env: TELEGRAM_API_URL)
    pub telegram_api_url: String,

    /// Price in US dollars for crypto payments (env: PRICE_USD, default 1.0)
    pub price_usd: f64,

    /// Price in stars (env: STARS_PRICE, default 100)
    pub stars_price: u32,

    /// Assets offered for crypto payment (env: CRYPTO_ASSETS, default TON,USDT,BTC)
    pub assets: Vec<String>,

    /// Status fetches per invoice (env: POLL_ATTEMPTS, default 30)
    pub poll_attempts: u32,

    /// Delay between fetches (env: POLL_INTERVAL_SECS, default 10)
    pub poll_interval: Duration,

    /// Invite lifetime (env: INVITE_TTL_SECS, default 600)
    pub invite_ttl: Duration,

    /// Tell buyers when polling gives up (env: NOTIFY_ON_TIMEOUT, default true)
    pub notify_on_timeout: bool,

    /// Upper bound on a single API call (env: HTTP_TIMEOUT_SECS, default 15)
    pub http_timeout: Duration,
}

impl BotConfig {
    /// Creates a configuration with the required values and defaults elsewhere.
    ///
    /// # Examples
    ///
    /// ```
    /// use invite_gate::config::BotConfig;
    ///
    /// let config = BotConfig::new("123:abc", -1001234, 42, "5678:xyz")
    ///     .with_price_usd(2.0)
    ///     .with_assets(vec!["TON".to_string()]);
    /// assert_eq!(config.poll_attempts, 30);
    /// assert_eq!(config.assets, vec!["TON"]);
    /// ```
    pub fn new(
        api_token: impl Into<String>,
        channel_id: i64,
        admin_id: i64,
        cryptopay_token: impl Into<String>,
    ) -> Self {
        Self {
            api_token: api_token.into(),
            channel_id,
            admin_id,
            cryptopay_token: cryptopay_token.into(),
            provider_token: String::new(),
            cryptopay_api_url: CRYPTO_PAY_API_URL.to_string(),
            telegram_api_url: TELEGRAM_API_URL.to_string(),
            price_usd: 1.0,
            stars_price: 100,
            assets: vec!["TON".to_string(), "USDT".to_string(), "BTC".to_string()],
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            invite_ttl: DEFAULT_INVITE_TTL,
            notify_on_timeout: true,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Loads `.env` (if present) and reads the environment.
    pub fn from_env() -> Result<Self> {
        // A missing .env file is fine; the variables may already be set.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| GateError::ConfigError(format!("{} is not set", key)))
        };

        let mut config = Self::new(
            required("API_TOKEN")?,
            parse("CHANNEL_ID", &required("CHANNEL_ID")?)?,
            parse("ADMIN_ID", &required("ADMIN_ID")?)?,
            required("CRYPTOPAY_TOKEN")?,
        );

        if let Some(token) = lookup("PROVIDER_TOKEN") {
            config.provider_token = token;
        }
        if let Some(url) = lookup("CRYPTOPAY_API_URL") {
            config.cryptopay_api_url = url;
        }
        if let Some(url) = lookup("TELEGRAM_API_URL") {
            config.telegram_api_url = url;
        }
        if let Some(v) = lookup("PRICE_USD") {
            config.price_usd = parse("PRICE_USD", &v)?;
        }
        if let Some(v) = lookup("STARS_PRICE") {
            config.stars_price = parse("STARS_PRICE", &v)?;
        }
        if let Some(v) = lookup("CRYPTO_ASSETS") {
            config.assets = v
                .split(',')
                .map(|a| a.trim().to_uppercase())
                .filter(|a| !a.is_empty())
                .collect();
        }
        if let Some(v) = lookup("POLL_ATTEMPTS") {
            config.poll_attempts = parse("POLL_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("POLL_INTERVAL_SECS") {
            config.poll_interval = Duration::from_secs(parse("POLL_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = lookup("INVITE_TTL_SECS") {
            config.invite_ttl = Duration::from_secs(parse("INVITE_TTL_SECS", &v)?);
        }
        if let Some(v) = lookup("NOTIFY_ON_TIMEOUT") {
            config.notify_on_timeout = parse("NOTIFY_ON_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("HTTP_TIMEOUT_SECS") {
            config.http_timeout = Duration::from_secs(parse("HTTP_TIMEOUT_SECS", &v)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Sets the dollar price.
    pub fn with_price_usd(mut self, price_usd: f64) -> Self {
        self.price_usd = price_usd;
        self
    }

    /// Sets the offered assets.
    pub fn with_assets(mut self, assets: Vec<String>) -> Self {
        self.assets = assets;
        self
    }

    /// Sets the polling cadence.
    pub fn with_polling(mut self, attempts: u32, interval: Duration) -> Self {
        self.poll_attempts = attempts;
        self.poll_interval = interval;
        self
    }

    /// Points both API clients at custom roots.
    pub fn with_api_urls(
        mut self,
        telegram_api_url: impl Into<String>,
        cryptopay_api_url: impl Into<String>,
    ) -> Self {
        self.telegram_api_url = telegram_api_url.into();
        self.cryptopay_api_url = cryptopay_api_url.into();
        self
    }

    /// Polling policy derived from this configuration.
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(self.poll_attempts, self.poll_interval)
            .with_timeout_notice(self.notify_on_timeout)
    }

    /// Checks values that would make the bot misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.price_usd.is_nan() || self.price_usd <= 0.0 {
            return Err(GateError::ConfigError(
                "PRICE_USD must be positive".to_string(),
            ));
        }
        if self.poll_attempts == 0 {
            return Err(GateError::ConfigError(
                "POLL_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        if self.http_timeout.is_zero() {
            return Err(GateError::ConfigError(
                "HTTP_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }
        if self.assets.is_empty() {
            return Err(GateError::ConfigError(
                "CRYPTO_ASSETS must list at least one asset".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| GateError::ConfigError(format!("{}: {}", key, e)))
}
