mod composer;
mod config;
mod delivery;
mod grailed;
mod http;
mod llm;
mod metrics;
mod models;
mod monitor;
mod store;

use composer::MessageComposer;
use config::ConfigStore;
use delivery::DeliveryManager;
use eyre::WrapErr;
use grailed::config::{SEARCH_URL, SITE_ROOT};
use grailed::{MessagesClient, SearchClient, SessionManager};
use llm::{LlmClient, LlmConfig};
use monitor::{Monitor, MonitorSettings};
use store::{JsonFileBackend, SeenStore};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "lowball.monitor", "monitor crashed: {err:?}");
    }
}

async fn run() -> eyre::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config_store = ConfigStore::from_env();
    let config = config_store
        .load()
        .wrap_err_with(|| format!("loading {}", config_store.path().display()))?;
    info!(
        target = "lowball.monitor",
        designer = %config.grailed.designer,
        interval_secs = config.grailed.monitoring_interval().as_secs(),
        lowball = config.grailed.lowball_percentage,
        "configuration loaded"
    );

    let http = http::build_client();
    let source = SearchClient::new(
        http.clone(),
        SEARCH_URL.as_str(),
        SITE_ROOT.as_str(),
        &config.algolia,
        config.grailed.designer.clone(),
    );
    let composer = MessageComposer::new(
        LlmClient::new(LlmConfig::from_settings(&config.openai)),
        config.grailed.lowball_percentage,
    );
    let session = SessionManager::new(
        http.clone(),
        SITE_ROOT.as_str(),
        config.auth.clone(),
        config_store.clone(),
    );
    let messenger = MessagesClient::new(http, SITE_ROOT.as_str(), &config.grailed.api_headers);
    let delivery = DeliveryManager::new(session, messenger);
    let backend = JsonFileBackend::from_env();
    info!(
        target = "lowball.monitor",
        path = %backend.path().display(),
        "using seen listings snapshot"
    );
    let store = SeenStore::load(backend);

    let monitor = Monitor::new(
        source,
        composer,
        delivery,
        store,
        MonitorSettings::new(config.grailed.monitoring_interval()),
    );
    monitor.run().await;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
