use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use marian_gateway::config::{process_legacy_vars, Settings};
use marian_gateway::state::AppState;
use marian_gateway::translate::{MarianTranslator, Translator};
use marian_gateway::utils::init_tracing;

fn main() -> Result<()> {
    // A missing .env is fine, the environment alone may be enough
    let dotenv_path = dotenvy::dotenv().ok();

    let settings = Settings::load().context("Failed to load settings")?;
    let _log_guard = init_tracing(&settings.logging, settings.environment)?;

    if let Some(path) = dotenv_path {
        info!("Loaded environment from {}", path.display());
    }
    info!("Environment: {:?}", settings.environment);
    for var in process_legacy_vars() {
        warn!("{} is deprecated, read as {}", var.name, var.key);
    }

    if settings.server.reload {
        warn!("server.reload is set but hot reload is not supported, ignoring");
    }

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if settings.server.workers > 0 {
        builder.worker_threads(settings.server.workers);
    }
    let runtime = builder.build().context("Failed to build tokio runtime")?;

    runtime.block_on(serve(settings))
}

async fn serve(settings: Settings) -> Result<()> {
    let model_settings = settings.model.clone();
    let addr = settings.bind_address();
    let app_state = AppState::new(settings);

    // Load in the background; requests get 503 until the model is ready
    let translation = app_state.translation.clone();
    tokio::spawn(async move {
        let warmup = model_settings.warmup;
        info!("Loading translation model from {}", model_settings.path);
        let result = translation
            .load_with(
                move || {
                    let translator: Arc<dyn Translator> =
                        Arc::new(MarianTranslator::load(&model_settings)?);
                    Ok(translator)
                },
                warmup,
            )
            .await;
        if let Err(e) = result {
            error!("Translation model unavailable: {}", e);
        }
    });

    let app = marian_gateway::build_app(app_state);

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
