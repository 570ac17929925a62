use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use wsreader_core::{StreamSession, TerminationReason};
use wsreader_transport::{TransportConfig, WsTransport};

mod config;
mod render;

use config::Args;
use render::ConsoleReporter;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    init_tracing();

    let args = Args::parse();
    match run(args).await {
        Ok(reason) => ExitCode::from(exit_code(&reason)),
        Err(err) => {
            error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<TerminationReason> {
    let session_cfg = args.session_config();
    let transport_cfg = TransportConfig::from_env();
    info!(
        url = %session_cfg.url,
        output = ?session_cfg.output,
        handshake_timeout = ?transport_cfg.handshake_timeout,
        "starting stream session"
    );

    let mut session = StreamSession::new(session_cfg, ConsoleReporter::new(args.json))
        .context("cannot start session")?;
    let mut transport = WsTransport::new(transport_cfg);

    let reason = session.connect(&mut transport, shutdown_signal()).await;
    info!(?reason, "session finished");
    Ok(reason)
}

fn exit_code(reason: &TerminationReason) -> u8 {
    match reason {
        TerminationReason::Closed { .. } | TerminationReason::UserInterrupt => 0,
        TerminationReason::TransportError { .. } => 2,
        TerminationReason::SinkWriteError { .. } => 3,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,tungstenite=warn,tokio_tungstenite=warn"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
