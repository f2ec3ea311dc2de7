use anyhow::{Context, Result, ensure};
use config::{Config, Environment, File};
use engine::session::MAX_TTL_HOURS;
use engine::{CommissionPolicy, PortfolioLocks, SessionManager};
use sea_orm::{Database, DatabaseConnection};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::schemas::AppState;

const DEV_SESSION_SECRET: &str = "investdesk-development-secret";

/// Session signing settings
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    /// HMAC secret for session tokens
    pub secret: String,
    /// Lifetime of a session token in hours
    pub ttl_hours: u64,
}

/// Settings read from `investdesk.toml` and `INVESTDESK_*` variables
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    pub session: SessionSettings,
}

impl AppSettings {
    /// Load settings. Environment variables override the file, e.g.
    /// `INVESTDESK_SESSION__SECRET` sets `session.secret`.
    pub fn load() -> Result<Self> {
        let settings = Config::builder()
            .set_default("session.secret", DEV_SESSION_SECRET)?
            .set_default("session.ttl_hours", 24)?
            .add_source(File::with_name("investdesk").required(false))
            .add_source(Environment::with_prefix("INVESTDESK").separator("__"))
            .build()
            .context("Failed to read configuration")?;

        let settings: AppSettings = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        settings.validate()?;

        if settings.session.secret == DEV_SESSION_SECRET {
            warn!("Using the built-in development session secret, set INVESTDESK_SESSION__SECRET");
        }
        debug!(ttl_hours = settings.session.ttl_hours, "Configuration loaded");
        Ok(settings)
    }
}

impl AppSettings {
    fn validate(&self) -> Result<()> {
        ensure!(
            (1..=MAX_TTL_HOURS).contains(&self.session.ttl_hours),
            "session.ttl_hours must be between 1 and {MAX_TTL_HOURS}, got {}",
            self.session.ttl_hours
        );
        ensure!(!self.session.secret.is_empty(), "session.secret must not be empty");
        Ok(())
    }
}

/// Assemble the shared state around an open database connection
pub fn build_app_state(db: DatabaseConnection, settings: &AppSettings) -> AppState {
    AppState {
        db,
        sessions: SessionManager::new(&settings.session.secret, settings.session.ttl_hours),
        commission: CommissionPolicy::default(),
        portfolio_locks: PortfolioLocks::default(),
    }
}

/// Initialize application configuration and state for a database URL
pub async fn initialize_app_state_with_url(database_url: &str) -> Result<AppState> {
    let settings = AppSettings::load()?;

    info!("Connecting to database: {}", database_url);
    let db = Database::connect(database_url)
        .await
        .with_context(|| format!("Failed to connect to {database_url}"))?;

    Ok(build_app_state(db, &settings))
}
