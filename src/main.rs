//! Jobharvest daemon entry point
//!
//! Loads configuration, wires the application context and runs the
//! autonomous pipeline until interrupted.

use anyhow::Result;
use tracing::info;

use jobharvest::application::AppContext;
use jobharvest::infrastructure::config::{default_config_path, AppConfig};
use jobharvest::infrastructure::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = default_config_path();
    let config = AppConfig::load_or_default(&config_path).await?;
    init_logging(&config.logging)?;

    info!("🚀 jobharvest starting (config: {})", config_path.display());
    info!("🗄️ Store: {}", config.database.path.display());

    let context = AppContext::init(config).await?;

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    context.shutdown().await;

    Ok(())
}
