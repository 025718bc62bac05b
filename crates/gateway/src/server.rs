use std::{net::SocketAddr, sync::Arc};

#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use {
    anyhow::Context,
    axum::{
        Router,
        extract::{ConnectInfo, State, WebSocketUpgrade},
        response::{IntoResponse, Json},
        routing::get,
    },
    tokio::net::TcpListener,
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{info, warn},
};

use {
    hotline_config::{AdminConfig, HotlineConfig, ServerConfig},
    hotline_notify::NotificationSink,
    hotline_store::SqliteStore,
};

use crate::{
    http::api_router, notifications::Notifier, relay::ChatRelay, state::RelayStats,
    ws::handle_connection,
};

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<ChatRelay>,
    pub store: Arc<SqliteStore>,
    pub admin: Arc<AdminConfig>,
    pub version: &'static str,
    #[cfg(feature = "prometheus")]
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(relay: Arc<ChatRelay>, store: Arc<SqliteStore>, admin: AdminConfig) -> Self {
        Self {
            relay,
            store,
            admin: Arc::new(admin),
            version: env!("CARGO_PKG_VERSION"),
            #[cfg(feature = "prometheus")]
            prometheus: None,
        }
    }

    #[cfg(feature = "prometheus")]
    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_upgrade_handler))
        .merge(api_router());

    #[cfg(feature = "prometheus")]
    let router = router.route("/metrics", get(metrics_handler));

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Open the store, spawn the notification worker and serve HTTP + WebSocket
/// until ctrl-c.
pub async fn start_gateway(config: HotlineConfig) -> anyhow::Result<()> {
    let db_path = config.database.resolved_path();
    let store = Arc::new(
        SqliteStore::open(&db_path)
            .await
            .with_context(|| format!("open database {}", db_path.display()))?,
    );

    let stats = Arc::new(RelayStats::default());
    let sink: Arc<dyn NotificationSink> =
        Arc::from(hotline_notify::from_config(&config.notifications));
    let sink_id = sink.id().to_string();
    let (notifier, worker) = Notifier::channel(
        store.clone(),
        sink,
        config.notifications.sound.clone(),
        Arc::clone(&stats),
    );
    tokio::spawn(worker.run());

    let relay = Arc::new(ChatRelay::new(
        store.clone(),
        notifier,
        stats,
        config.relay.clone(),
    ));
    let state = AppState::new(relay, Arc::clone(&store), config.admin.clone());

    #[cfg(feature = "prometheus")]
    let state = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => state.with_prometheus(handle),
        Err(e) => {
            warn!(error = %e, "failed to install prometheus recorder");
            state
        },
    };

    let app = build_gateway_app(state);

    let listener = bind_listener(&config.server).await?;
    let addr = listener.local_addr()?;

    // Startup banner.
    let lines = [
        format!("hotline gateway v{}", env!("CARGO_PKG_VERSION")),
        format!(
            "protocol v{}, listening on {}",
            hotline_protocol::PROTOCOL_VERSION,
            addr
        ),
        format!("database: {}", db_path.display()),
        format!("fanout: {:?}, notifications: {}", config.relay.fanout, sink_id),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    // Run the server with ConnectInfo for remote IP extraction.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    store.close().await;
    info!("gateway stopped");
    Ok(())
}

/// Bind the configured host and port. The host may be an IPv4 or IPv6
/// literal, or a name that resolves to one.
pub(crate) async fn bind_listener(server: &ServerConfig) -> anyhow::Result<TcpListener> {
    TcpListener::bind((server.bind.as_str(), server.port))
        .await
        .with_context(|| format!("bind {}:{}", server.bind, server.port))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let count = state.relay.registry().count().await;
    Json(serde_json::json!({
        "status": "ok",
        "version": state.version,
        "protocol": hotline_protocol::PROTOCOL_VERSION,
        "connections": count,
        "relay": state.relay.stats().snapshot(),
    }))
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state.relay, addr))
}

#[cfg(feature = "prometheus")]
async fn metrics_handler(State(state): State<AppState>) -> axum::response::Response {
    use axum::http::StatusCode;

    match state.prometheus {
        Some(handle) => (
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed",
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_hostnames() {
        let listener = bind_listener(&ServerConfig {
            bind: "localhost".into(),
            port: 0,
        })
        .await
        .unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }

    #[tokio::test]
    async fn rejects_unresolvable_hosts() {
        let err = bind_listener(&ServerConfig {
            bind: "not a host".into(),
            port: 0,
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("not a host:0"));
    }
}
