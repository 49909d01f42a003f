//! `specimen` - decay lifecycle engine

use clap::Parser;

use specimen::cli::args::Cli;
use specimen::cli::commands::{self, Shutdown};
use specimen::error::ExitCode;
use specimen::observability::{LogOptions, StopReason, init_logging};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(&LogOptions::new(cli.verbose, cli.quiet, cli.color));

    let shutdown = Shutdown::new();
    tokio::spawn(handle_signals(shutdown.clone()));

    let result = commands::dispatch(cli, shutdown).await;

    match result {
        Ok(()) => std::process::exit(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

/// First Ctrl+C or SIGTERM requests a graceful stop; a second one exits.
async fn handle_signals(shutdown: Shutdown) {
    let mut sigterm =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => Some(signal),
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                None
            }
        };

    let reason = tokio::select! {
        _ = tokio::signal::ctrl_c() => StopReason::Interrupted,
        Some(()) = recv(sigterm.as_mut()) => StopReason::Terminated,
    };
    shutdown.trigger(reason);

    eprintln!("\nShutting down gracefully... (press Ctrl+C again to force)");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => std::process::exit(ExitCode::INTERRUPTED),
        Some(()) = recv(sigterm.as_mut()) => std::process::exit(ExitCode::TERMINATED),
    }
}

async fn recv(signal: Option<&mut tokio::signal::unix::Signal>) -> Option<()> {
    match signal {
        Some(signal) => signal.recv().await,
        None => std::future::pending().await,
    }
}
