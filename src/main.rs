use keyway::config::DbStrategy;
use keyway::{Config, DatabaseFactory, EmailFactory, SecretManagerClient, SecretStore};
use mimalloc::MiMalloc;
use sqlx::Connection;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = Config::from_env()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        secret_manager = %cfg.secret_manager_url,
        proxy = %cfg.proxy.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
        strategy = ?cfg.db_strategy,
        loglevel = %cfg.loglevel
    );

    let store: Arc<dyn SecretStore> = Arc::new(SecretManagerClient::new(
        cfg.secret_manager_url.clone(),
        cfg.token_source(),
        cfg.proxy.as_ref(),
    )?);

    let db = DatabaseFactory::new(cfg.database(), store.clone());
    match db.loader().source() {
        Ok(source) => {
            info!(source = %source, "probing database connection");
            let conn = match cfg.db_strategy {
                DbStrategy::Address => db.connect_by_address().await?,
                DbStrategy::Socket => db.connect_by_socket().await?,
            };
            conn.close().await?;
        }
        Err(e) => warn!(error = %e, "database credentials not configured; skipping"),
    }

    let mail = EmailFactory::new(
        cfg.email(),
        store,
        cfg.mailgun_api_base.clone(),
        cfg.proxy.as_ref(),
    )?;
    match mail.loader().source() {
        Ok(source) => {
            let client = mail.client().await?;
            info!(source = %source, domain = %client.domain(), "mail client built");
        }
        Err(e) => warn!(error = %e, "mail credentials not configured; skipping"),
    }

    Ok(())
}
