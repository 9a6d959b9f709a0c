use std::{env, fmt::Display, io::Write, str::FromStr, time::Duration};

use escrow_common::{parse_boolean_flag, Secret};
use escrow_engine::{
    gateways::{BankTransferConfig, DEFAULT_GATEWAY_TIMEOUT},
    DEFAULT_MAX_CONCURRENT_RELEASES,
    DEFAULT_RELEASE_CLAIM_TIMEOUT_SECS,
};
use log::*;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use tempfile::NamedTempFile;

use crate::errors::ServerError;

const DEFAULT_ESC_HOST: &str = "127.0.0.1";
const DEFAULT_ESC_PORT: u16 = 8370;
const DEFAULT_AUTO_RELEASE_INTERVAL: Duration = Duration::from_secs(60 * 60);
const DEFAULT_BANK_CURRENCY: &str = "NGN";
const JWT_SECRET_LENGTH: usize = 48;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub auth: AuthConfig,
    pub auto_release: AutoReleaseConfig,
    /// The maximum number of releases the auto-release sweep runs at the same time.
    pub max_concurrent_releases: usize,
    /// A release claim older than this is considered abandoned, and another caller may take the order over.
    pub release_claim_timeout: chrono::Duration,
    /// Upper bound for a single call to a payout provider.
    pub gateway_timeout: Duration,
    /// The bank rail is only switched on when a provider secret key has been configured.
    pub bank: Option<BankTransferConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_ESC_HOST.to_string(),
            port: DEFAULT_ESC_PORT,
            database_url: String::default(),
            auth: AuthConfig::default(),
            auto_release: AutoReleaseConfig::default(),
            max_concurrent_releases: DEFAULT_MAX_CONCURRENT_RELEASES,
            release_claim_timeout: chrono::Duration::seconds(DEFAULT_RELEASE_CLAIM_TIMEOUT_SECS),
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
            bank: None,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("ESC_HOST").ok().unwrap_or_else(|| DEFAULT_ESC_HOST.into());
        let port = env_value("ESC_PORT", DEFAULT_ESC_PORT);
        let database_url = env::var("ESC_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ ESC_DATABASE_URL is not set. Please set it to the URL for the escrow database.");
            String::default()
        });
        let auth = AuthConfig::try_from_env().unwrap_or_else(|e| {
            warn!(
                "🪛️ Could not load the authentication configuration from environment variables. {e}. Reverting to the \
                 default configuration."
            );
            AuthConfig::default()
        });
        let auto_release = AutoReleaseConfig::from_env_or_default();
        let max_concurrent_releases = match env_value("ESC_MAX_CONCURRENT_RELEASES", DEFAULT_MAX_CONCURRENT_RELEASES) {
            0 => {
                warn!("🪛️ ESC_MAX_CONCURRENT_RELEASES must be at least 1. Using 1.");
                1
            },
            n => n,
        };
        let claim_secs = env_value("ESC_RELEASE_CLAIM_TIMEOUT", DEFAULT_RELEASE_CLAIM_TIMEOUT_SECS);
        let release_claim_timeout = chrono::Duration::seconds(claim_secs);
        let gateway_timeout = Duration::from_secs(env_value("ESC_GATEWAY_TIMEOUT", DEFAULT_GATEWAY_TIMEOUT.as_secs()));
        let bank = bank_config_from_env(gateway_timeout);
        Self {
            host,
            port,
            database_url,
            auth,
            auto_release,
            max_concurrent_releases,
            release_claim_timeout,
            gateway_timeout,
            bank,
        }
    }
}

/// Reads and parses an environment variable, falling back to `default` when it is missing or malformed.
fn env_value<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    env::var(name)
        .map_err(|_| debug!("🪛️ {name} is not set. Using the default value of {default}."))
        .and_then(|s| {
            s.trim().parse::<T>().map_err(|e| {
                warn!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.")
            })
        })
        .ok()
        .unwrap_or(default)
}

fn bank_config_from_env(timeout: Duration) -> Option<BankTransferConfig> {
    let secret_key = Secret::new(env::var("ESC_BANK_SECRET_KEY").unwrap_or_default());
    if secret_key.is_empty() {
        warn!("🪛️ ESC_BANK_SECRET_KEY is not set. Bank transfers are disabled and sellers will be paid by other means.");
        return None;
    }
    let defaults = BankTransferConfig::default();
    let api_url = env::var("ESC_BANK_API_URL").ok().unwrap_or_else(|| {
        info!("🪛️ ESC_BANK_API_URL is not set. Using {}", defaults.api_url);
        defaults.api_url
    });
    let currency = env::var("ESC_BANK_CURRENCY").ok().unwrap_or_else(|| DEFAULT_BANK_CURRENCY.to_string());
    info!("🪛️ Bank transfers are enabled via {api_url} ({currency})");
    Some(BankTransferConfig { api_url, secret_key, currency, timeout })
}

//-----------------------------------------------  AutoReleaseConfig  --------------------------------------------------
#[derive(Clone, Debug)]
pub struct AutoReleaseConfig {
    pub enabled: bool,
    /// How often the auto-release sweep runs.
    pub interval: Duration,
}

impl Default for AutoReleaseConfig {
    fn default() -> Self {
        Self { enabled: true, interval: DEFAULT_AUTO_RELEASE_INTERVAL }
    }
}

impl AutoReleaseConfig {
    pub fn from_env_or_default() -> Self {
        let enabled = parse_boolean_flag(env::var("ESC_AUTO_RELEASE_ENABLED").ok(), true);
        let secs = env_value("ESC_AUTO_RELEASE_INTERVAL", DEFAULT_AUTO_RELEASE_INTERVAL.as_secs());
        let interval = if secs == 0 {
            warn!("🪛️ ESC_AUTO_RELEASE_INTERVAL cannot be zero. Using the default value.");
            DEFAULT_AUTO_RELEASE_INTERVAL
        } else {
            Duration::from_secs(secs)
        };
        if !enabled {
            warn!("🪛️ Automatic payment release is disabled. Payments will only be released by an admin.");
        }
        Self { enabled, interval }
    }
}

//-------------------------------------------------  AuthConfig  -------------------------------------------------------
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// The HMAC secret used to sign and verify access tokens (HS256).
    pub jwt_secret: Secret<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        warn!(
            "🚨️🚨️🚨️ The JWT secret has not been set. I'm using a random value for this session. DO NOT operate on \
             production like this since every issued token becomes invalid on restart. 🚨️🚨️🚨️"
        );
        let secret = thread_rng().sample_iter(&Alphanumeric).take(JWT_SECRET_LENGTH).map(char::from).collect::<String>();
        match NamedTempFile::new().ok().and_then(|f| f.keep().ok()) {
            Some((mut f, p)) => match writeln!(f, "{secret}") {
                Ok(()) => warn!(
                    "🚨️🚨️🚨️ The JWT secret for this session was written to {}. If this is a production instance, you \
                     are doing it wrong! Set the ESC_JWT_SECRET environment variable instead. 🚨️🚨️🚨️",
                    p.to_str().unwrap_or("???")
                ),
                Err(e) => warn!("🪛️ Could not write the JWT secret to the temporary file. {e}"),
            },
            None => warn!("🪛️ Could not create a temporary file to store the JWT secret."),
        }
        Self { jwt_secret: Secret::new(secret) }
    }
}

impl AuthConfig {
    pub fn new<S: Into<String>>(secret: S) -> Self {
        Self { jwt_secret: Secret::new(secret.into()) }
    }

    pub fn try_from_env() -> Result<Self, ServerError> {
        let secret =
            env::var("ESC_JWT_SECRET").map_err(|e| ServerError::ConfigurationError(format!("{e} [ESC_JWT_SECRET]")))?;
        let secret = Secret::new(secret);
        if secret.is_empty() {
            return Err(ServerError::ConfigurationError("ESC_JWT_SECRET is empty".to_string()));
        }
        Ok(Self { jwt_secret: secret })
    }
}
