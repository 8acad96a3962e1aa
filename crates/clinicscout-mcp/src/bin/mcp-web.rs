use clinicscout_mcp::serve_http;

const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8056";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
        .target(env_logger::Target::Stderr)
        .write_style(env_logger::WriteStyle::Never)
        .init();

    let ct = tokio_util::sync::CancellationToken::new();

    let address = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.into());
    let tcp_listener = tokio::net::TcpListener::bind(&address).await?;

    log::info!("Starting clinicscout mcp server on address: {}", address);

    let shutdown = ct.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for shutdown signal: {e}");
        }
        shutdown.cancel();
    });

    serve_http(tcp_listener, ct).await?;

    Ok(())
}
