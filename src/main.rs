use std::error::Error;
use std::sync::Arc;

use async_graphql::http::GraphiQLSource;
use async_graphql_axum::GraphQL;
use axum::{
    response::{self, IntoResponse},
    routing::get,
    Router,
};
use config::Config;
use graphql::build_schema;
use service::ImportService;
use session::{ManualScheduler, SessionController, StepScheduler, TimerDriver, TimerScheduler};
use settings::Settings;
use sources::SourceStore;
use store::SqliteContentStore;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

mod catalog;
mod config;
mod db;
mod error;
mod graphql;
mod markup;
mod service;
mod session;
mod settings;
mod sources;
mod store;

async fn graphiql() -> impl IntoResponse {
    response::Html(GraphiQLSource::build().endpoint("/").finish())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();
    dotenv::dotenv().ok();

    let config = Config::from_env()?;

    // ensure data dir exists
    std::fs::create_dir_all(&config.data_dir).map_err(|e| {
        format!(
            "Failed to create data directory '{}': {}",
            config.data_dir.display(),
            e
        )
    })?;

    let pool = db::connect(&config.database_url).await?;
    let settings = Settings::new(pool.clone());
    let sources = SourceStore::open(&config.sources_dir()).await?;

    let (scheduler, driver): (Arc<dyn StepScheduler>, Option<TimerDriver>) =
        if config.timer_driver {
            let (scheduler, driver) = TimerScheduler::new();
            (Arc::new(scheduler) as Arc<dyn StepScheduler>, Some(driver))
        } else {
            info!("timer disabled, steps must be triggered with stepOnce");
            (Arc::new(ManualScheduler) as Arc<dyn StepScheduler>, None)
        };

    let controller = SessionController::new(
        settings.clone(),
        Arc::new(SqliteContentStore::new(pool)),
        scheduler,
        config.controller_options(),
    );
    let service = Arc::new(ImportService::new(
        controller,
        settings,
        sources,
        config.scan_cap,
    ));

    if let Some(driver) = driver {
        tokio::spawn(driver.run(service.clone()));
    }
    match service.resume().await {
        Ok(true) => info!("resumed interrupted import"),
        Ok(false) => {}
        Err(err) => warn!("failed to resume import: {}", err),
    }

    let schema = build_schema(service);
    let app = Router::new().route("/", get(graphiql).post_service(GraphQL::new(schema)));

    let listener = TcpListener::bind(config.bind_addr()).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
