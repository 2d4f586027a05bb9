// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Benchlens HTTP server
//!
//! Serves the benchmark report API on top of the query engine and the JSON
//! report store.

pub mod api;
pub mod config;

use anyhow::Result;
use axum::{
    routing::get,
    Router,
};
use benchlens_query::{BenchmarkAggregator, Ga4Provider, ReportProvider};
use benchlens_storage::ReportStore;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::{
    benchmarks::{
        create_benchmark, delete_benchmark, get_benchmark, get_benchmark_summary,
        list_benchmarks, update_benchmark,
    },
    catalog::{get_catalog, list_sources},
    health::health_check,
    AppState,
};
use config::{HttpServerConfig, ServerConfig};

/// Build the API router with its middleware stack.
pub fn build_router(state: AppState, http: &HttpServerConfig) -> Router {
    let api = Router::new()
        .route("/health", get(health_check))
        .route("/catalog", get(get_catalog))
        .route("/sources", get(list_sources))
        .route("/benchmarks", get(list_benchmarks).post(create_benchmark))
        .route(
            "/benchmarks/:uuid",
            get(get_benchmark)
                .put(update_benchmark)
                .delete(delete_benchmark),
        )
        .route("/benchmarks/:uuid/summary", get(get_benchmark_summary));

    Router::new()
        .nest("/api/v1", api)
        .with_state(state)
        .layer(TimeoutLayer::new(Duration::from_secs(http.request_timeout_secs)))
        .layer(if http.enable_cors {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            CorsLayer::new()
        })
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "benchlens_server=info,benchlens_query=info,benchlens_storage=info,tower_http=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Benchlens Server");
    tracing::debug!("Configuration: {:#?}", config);

    config.validate()?;
    let addr = config.socket_addr()?;

    let store = Arc::new(ReportStore::open(&config.storage.data_dir)?);
    tracing::info!("Report store at {}", store.path().display());

    if config.provider.access_token.is_none() {
        tracing::warn!("No provider access token configured; report creation will fail");
    }
    let provider: Arc<dyn ReportProvider> = Arc::new(Ga4Provider::new(config.ga4_config())?);
    let aggregator = BenchmarkAggregator::new(Arc::clone(&provider), config.aggregator_config());

    let state = AppState::new(store, provider, aggregator, config.catalog.clone());
    let app = build_router(state, &config.server);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
