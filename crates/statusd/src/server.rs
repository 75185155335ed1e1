use crate::config::{CollectorConfig, ProbeConfig, TlsConfig};
use crate::status::collect_status;
use anyhow::Context;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

const TLS_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The status route: `/` followed by the access token.
pub(crate) fn route_path(token: &str) -> String {
    format!("/{token}")
}

/// Without a token every path serves the status, as a catch-all `/` would.
pub(crate) fn build_router(token: &str, collectors: Arc<CollectorConfig>) -> Router {
    let router = Router::new().route(&route_path(token), any(status_handler));
    let router = if token.is_empty() {
        router.fallback(status_handler)
    } else {
        router
    };
    router
        .with_state(collectors)
        .layer(middleware::from_fn(log_http_request))
}

pub(crate) async fn serve(config: ProbeConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let app = build_router(&config.token, Arc::new(config.collectors));
    match config.tls {
        None => serve_plain(config.listen_addr, app, shutdown).await,
        Some(tls) => serve_tls(config.listen_addr, &tls, app, shutdown).await,
    }
}

async fn serve_plain(
    addr: SocketAddr,
    app: Router,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, tls = false, "statusd listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("http server failed")?;
    Ok(())
}

async fn serve_tls(
    addr: SocketAddr,
    tls: &TlsConfig,
    app: Router,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let rustls = RustlsConfig::from_pem_file(&tls.cert, &tls.key)
        .await
        .with_context(|| {
            format!(
                "failed to load tls cert {} / key {}",
                tls.cert.display(),
                tls.key.display()
            )
        })?;
    let handle = axum_server::Handle::new();
    tokio::spawn({
        let handle = handle.clone();
        async move {
            shutdown.cancelled().await;
            handle.graceful_shutdown(Some(TLS_SHUTDOWN_GRACE));
        }
    });
    info!(addr = %addr, tls = true, "statusd listening");
    axum_server::bind_rustls(addr, rustls)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .with_context(|| format!("https server on {addr} failed"))?;
    Ok(())
}

async fn status_handler(State(collectors): State<Arc<CollectorConfig>>) -> Response {
    let record = collect_status(&collectors).await;
    let body = match serde_json::to_vec(&record) {
        Ok(body) => body,
        Err(err) => {
            tracing::warn!(error = %err, "failed to serialize status record");
            Vec::new()
        }
    };
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

async fn log_http_request(req: Request<Body>, next: Next) -> Response {
    // The path carries the access token, so it stays out of the log.
    let method = req.method().clone();
    let started_at = Instant::now();
    let response = next.run(req).await;
    tracing::info!(
        method = %method,
        status = %response.status(),
        elapsed_ms = started_at.elapsed().as_millis() as u64,
        "http request"
    );
    response
}
