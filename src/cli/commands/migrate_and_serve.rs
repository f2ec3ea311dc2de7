use anyhow::Result;
use tracing::{debug, info, trace};

use super::initdb::connect_and_migrate;
use super::serve::run_server;
use crate::config::{AppSettings, build_app_state};

pub async fn migrate_and_serve(database_url: &str, bind_address: &str) -> Result<()> {
    trace!("Entering migrate_and_serve function");
    info!("Applying database migrations and starting server");
    debug!("Database URL: {}", database_url);
    debug!("Bind address: {}", bind_address);

    let db = connect_and_migrate(database_url).await?;
    let settings = AppSettings::load()?;
    let state = build_app_state(db, &settings);
    debug!("Application state initialized successfully");

    run_server(state, bind_address).await
}
