use std::io;

use rmcp::transport::{
    StreamableHttpServerConfig, StreamableHttpService,
    streamable_http_server::session::local::LocalSessionManager,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::McpServer;

/// Streamable HTTP transport mounted at `/sse`.
pub fn http_router(ct: &CancellationToken) -> axum::Router {
    // A fresh server, and with it a fresh scrape cache, per MCP session.
    let service = StreamableHttpService::new(
        || {
            McpServer::new()
                .map_err(|e| io::Error::other(format!("Failed to init mcp server: {e:?}")))
        },
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig {
            cancellation_token: ct.child_token(),
            ..Default::default()
        },
    );

    axum::Router::new()
        .nest_service("/sse", service)
        .layer(CorsLayer::permissive())
}

/// Serves MCP sessions on `listener` until `ct` is cancelled.
pub async fn serve_http(listener: TcpListener, ct: CancellationToken) -> io::Result<()> {
    let router = http_router(&ct);
    axum::serve(listener, router)
        .with_graceful_shutdown(ct.cancelled_owned())
        .await
        .inspect_err(|e| log::error!("HTTP server error: {e:?}"))
}
