//! CLI command dispatch and handlers.
//!
//! Routes parsed CLI arguments to the appropriate command handler.

pub mod completions;
pub mod render;
pub mod run;
pub mod timeline;
pub mod validate;
pub mod version;

use std::path::Path;
use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

use crate::cli::args::{Cli, Commands};
use crate::config::{ConfigLoader, LoaderOptions, SpecimenConfig};
use crate::error::{ConfigError, SpecimenError};
use crate::observability::StopReason;

/// Dispatch a parsed CLI invocation to the appropriate command handler.
///
/// # Errors
///
/// Returns an error if the dispatched command handler fails.
pub async fn dispatch(cli: Cli, shutdown: Shutdown) -> Result<(), SpecimenError> {
    match cli.command {
        Commands::Run(args) => run::run(&args, shutdown).await,
        Commands::Timeline(args) => timeline::run(&args),
        Commands::Validate(args) => validate::run(&args),
        Commands::Render(args) => render::run(&args),
        Commands::Completions(args) => {
            completions::run(&args);
            Ok(())
        }
        Commands::Version(args) => {
            version::run(&args);
            Ok(())
        }
    }
}

/// Graceful shutdown request shared between the signal handler and the
/// running command.
///
/// The first [`trigger`](Self::trigger) wins; later reasons are ignored.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
    reason: Arc<OnceLock<StopReason>>,
}

impl Shutdown {
    /// Creates an untriggered shutdown.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown for `reason`.
    pub fn trigger(&self, reason: StopReason) {
        let _ = self.reason.set(reason);
        self.token.cancel();
    }

    /// Waits for a shutdown request and returns its reason.
    pub async fn requested(&self) -> StopReason {
        self.token.cancelled().await;
        self.reason()
    }

    /// Reason of the request so far, `Interrupted` if the token was
    /// cancelled directly.
    #[must_use]
    pub fn reason(&self) -> StopReason {
        self.reason.get().copied().unwrap_or(StopReason::Interrupted)
    }

    /// Child token cancelled together with this shutdown.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}

/// Loads `path`, or the built-in defaults, with every duration multiplied
/// by `time_scale`.
///
/// # Errors
///
/// Returns a configuration error for a non-positive scale or a file that
/// fails to load.
pub(crate) fn load_config(
    path: Option<&Path>,
    time_scale: f64,
) -> Result<Arc<SpecimenConfig>, SpecimenError> {
    if !time_scale.is_finite() || time_scale <= 0.0 {
        return Err(ConfigError::InvalidValue {
            field: "time-scale".to_string(),
            value: time_scale.to_string(),
            expected: "a positive number".to_string(),
        }
        .into());
    }
    if let Some(path) = path {
        tracing::info!(config = %path.display(), "loading configuration");
    }
    let loader = ConfigLoader::new(LoaderOptions {
        time_scale,
        ..LoaderOptions::default()
    });
    Ok(loader.load_or_default(path)?.config)
}
