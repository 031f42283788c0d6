//! Dialtone server entry point
//!
//! Usage:
//!
//! ```text
//! dialtone                # serve inbound calls
//! dialtone +15550001111   # serve, then place an outbound call
//! ```
//!
//! Exit codes: 0 normal, 1 configuration or call-trigger failure.

use std::net::SocketAddr;

use anyhow::Context;

use dialtone_config::load_settings;
use dialtone_server::{create_router, init_metrics, AppState};
use dialtone_telephony::TwilioClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings().context("failed to load configuration")?;

    init_tracing();
    tracing::info!("starting dialtone v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = settings.validate() {
        tracing::error!(error = %e, "configuration invalid");
        anyhow::bail!(e);
    }

    let _metrics = init_metrics();

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    tracing::info!(
        %addr,
        public_url = %settings.server.public_url,
        "server listening"
    );

    let outbound_number = std::env::args().nth(1);
    let state = AppState::new(settings.clone());
    let router = create_router(state);
    let server = tokio::spawn(async move { axum::serve(listener, router).await });

    if let Some(number) = outbound_number {
        let client = TwilioClient::new(&settings.telephony);
        let sid = client
            .create_call(&number, &settings.server.public_url)
            .await
            .context("outbound call trigger failed")?;
        tracing::info!(call_sid = %sid, to = %number, "outbound call initiated, waiting for answer");
    }

    server.await?.context("server error")?;
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt = tracing_subscriber::fmt().with_env_filter(filter);
    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        fmt.json().init();
    } else {
        fmt.init();
    }
}
