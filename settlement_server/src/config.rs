use std::{env, time::Duration};

use log::*;
use mkt_common::{Secret, DEFAULT_CURRENCY_CODE};
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use stripe_tools::StripeConfig;

use crate::errors::ServerError;

const DEFAULT_MKT_HOST: &str = "127.0.0.1";
const DEFAULT_MKT_PORT: u16 = 8370;
const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 25;
const DEFAULT_PAYOUT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub auth: AuthConfig,
    /// ISO currency code that orders and payment intents are raised in.
    pub currency: String,
    /// How often the payout worker looks for paid checkouts that are missing their seller payouts.
    pub payout_sweep_interval: Duration,
    /// Stripe API and webhook configuration
    pub stripe_config: StripeConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_MKT_HOST.to_string(),
            port: DEFAULT_MKT_PORT,
            database_url: String::default(),
            database_max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            auth: AuthConfig::default(),
            currency: DEFAULT_CURRENCY_CODE.to_string(),
            payout_sweep_interval: DEFAULT_PAYOUT_SWEEP_INTERVAL,
            stripe_config: StripeConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("MKT_HOST").ok().unwrap_or_else(|| DEFAULT_MKT_HOST.into());
        let port = env::var("MKT_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for MKT_PORT. {e} Using the default, {DEFAULT_MKT_PORT}, instead."
                    );
                    DEFAULT_MKT_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_MKT_PORT);
        let database_url = env::var("MKT_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ MKT_DATABASE_URL is not set. Please set it to the URL for the marketplace database.");
            String::default()
        });
        let database_max_connections = env::var("MKT_DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| {
                s.parse::<u32>()
                    .map_err(|e| warn!("🪛️ Invalid configuration value for MKT_DATABASE_MAX_CONNECTIONS. {e}"))
                    .ok()
            })
            .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS);
        let auth = AuthConfig::try_from_env().unwrap_or_else(|e| {
            warn!(
                "🪛️ Could not load the authentication configuration from environment variables. {e}. Reverting to the \
                 default configuration."
            );
            AuthConfig::default()
        });
        let currency = env::var("MKT_CURRENCY").map(|s| s.to_uppercase()).unwrap_or_else(|_| {
            info!("🪛️ MKT_CURRENCY is not set. Using {DEFAULT_CURRENCY_CODE}.");
            DEFAULT_CURRENCY_CODE.to_string()
        });
        let payout_sweep_interval = configure_sweep_interval();
        let stripe_config = StripeConfig::new_from_env_or_default();
        Self {
            host,
            port,
            database_url,
            database_max_connections,
            auth,
            currency,
            payout_sweep_interval,
            stripe_config,
        }
    }
}

fn configure_sweep_interval() -> Duration {
    env::var("MKT_PAYOUT_SWEEP_INTERVAL_SECS")
        .map_err(|_| {
            info!(
                "🪛️ MKT_PAYOUT_SWEEP_INTERVAL_SECS is not set. Using the default value of {} s.",
                DEFAULT_PAYOUT_SWEEP_INTERVAL.as_secs()
            )
        })
        .and_then(|s| match s.parse::<u64>() {
            Ok(0) => {
                warn!("🪛️ MKT_PAYOUT_SWEEP_INTERVAL_SECS must be positive");
                Err(())
            },
            Ok(secs) => Ok(Duration::from_secs(secs)),
            Err(e) => {
                warn!("🪛️ Invalid configuration value for MKT_PAYOUT_SWEEP_INTERVAL_SECS. {e}");
                Err(())
            },
        })
        .unwrap_or(DEFAULT_PAYOUT_SWEEP_INTERVAL)
}

//-------------------------------------------------  AuthConfig  -------------------------------------------------------
const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// The HMAC secret used to sign and verify HS256 access tokens.
    pub jwt_secret: Secret<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        warn!(
            "🚨️🚨️🚨️ The JWT secret has not been set. I'm using a random value for this session. Tokens issued now \
             will not survive a restart. DO NOT operate on production like this. 🚨️🚨️🚨️"
        );
        let secret = thread_rng().sample_iter(&Alphanumeric).take(64).map(char::from).collect::<String>();
        Self { jwt_secret: Secret::new(secret) }
    }
}

impl AuthConfig {
    pub fn new<S: Into<String>>(secret: S) -> Self {
        Self { jwt_secret: Secret::new(secret.into()) }
    }

    pub fn try_from_env() -> Result<Self, ServerError> {
        let secret =
            env::var("MKT_JWT_SECRET").map_err(|e| ServerError::ConfigurationError(format!("{e} [MKT_JWT_SECRET]")))?;
        if secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(ServerError::ConfigurationError(format!(
                "MKT_JWT_SECRET must be at least {MIN_JWT_SECRET_LENGTH} characters long"
            )));
        }
        Ok(Self::new(secret))
    }
}
