use anyhow::{Context, Result};
use clap::Parser;
use docqa::{api, config::Config, logging, qa::QaSystem};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "docqa", about = "Serve question answering over a PDF document")]
struct Args {
    /// Document to preload (path or http(s) URL). Overrides `DOCQA_SOURCE`.
    #[arg(long)]
    source: Option<String>,
    /// Port to listen on. Overrides `SERVER_PORT`.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    let source = args
        .source
        .or_else(|| config.source.clone())
        .context("no document source; pass --source or set DOCQA_SOURCE")?;

    let system = QaSystem::from_config(&config, &source).context("failed to configure QA system")?;
    let summary = system
        .initialize()
        .await
        .with_context(|| format!("failed to ingest {source}"))?;
    tracing::info!(
        source = %summary.source,
        pages = summary.pages,
        chunks = summary.chunks,
        "Document ready"
    );

    let app = api::create_router(Arc::new(system));
    let (listener, port) = bind_listener(args.port.or(config.server_port))
        .await
        .context("failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

async fn bind_listener(requested: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = requested {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4100..=4199;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4100-4199",
    ))
}
