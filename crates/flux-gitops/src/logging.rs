//! Logging setup and the injected [`Logger`] handle.
//!
//! Components never reach for a process-wide logger. Each one receives a
//! [`Logger`] at construction and runs its operations through
//! [`Logger::scope`], which installs the logger's dispatcher for the duration
//! of the future and opens a component span.

use std::fmt;
use std::future::Future;

use tracing::instrument::{Instrument, WithSubscriber};
use tracing::Dispatch;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use crate::error::ConfigError;

/// Highest verbosity level understood by [`LogConfig`].
pub const MAX_VERBOSITY: u8 = 9;

/// Logging configuration.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Verbosity from 0 (informational only) to [`MAX_VERBOSITY`].
    pub verbosity: u8,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

impl LogConfig {
    /// Returns the filter directive used when `RUST_LOG` is not set.
    pub fn default_directive(&self) -> &'static str {
        match self.verbosity.min(MAX_VERBOSITY) {
            0 => "info",
            1..=3 => "debug",
            _ => "trace",
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.default_directive()))
    }
}

/// Builds a dispatcher writing to stderr.
pub fn build_dispatch(config: &LogConfig) -> Dispatch {
    build_dispatch_with_writer(config, std::io::stderr, true)
}

/// Builds a dispatcher writing to an arbitrary writer.
pub fn build_dispatch_with_writer<W>(config: &LogConfig, writer: W, ansi: bool) -> Dispatch
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true);

    if config.json {
        Dispatch::new(builder.json().finish())
    } else {
        Dispatch::new(builder.finish())
    }
}

/// Installs a global dispatcher and bridges `log` records into it.
///
/// Returns a [`Logger`] over the installed dispatcher so callers can hand it
/// to components explicitly.
pub fn init(config: &LogConfig) -> Result<Logger, ConfigError> {
    tracing_log::LogTracer::init().map_err(|e| ConfigError::Logging(e.to_string()))?;

    let dispatch = build_dispatch(config);
    tracing::dispatcher::set_global_default(dispatch.clone())
        .map_err(|e| ConfigError::Logging(e.to_string()))?;

    Ok(Logger::new(dispatch))
}

/// Explicit logging dependency handed to every component.
#[derive(Clone)]
pub struct Logger {
    dispatch: Dispatch,
    component: &'static str,
}

impl Logger {
    /// Creates a logger over the given dispatcher.
    pub fn new(dispatch: Dispatch) -> Self {
        Self {
            dispatch,
            component: "gitops",
        }
    }

    /// A logger that drops every event.
    pub fn discard() -> Self {
        Self::new(Dispatch::none())
    }

    /// A logger over whatever dispatcher is current for this thread.
    pub fn current() -> Self {
        Self::new(tracing::dispatcher::get_default(|d| d.clone()))
    }

    /// Returns a copy of this logger tagged with a component name.
    pub fn named(&self, component: &'static str) -> Self {
        Self {
            dispatch: self.dispatch.clone(),
            component,
        }
    }

    pub fn component(&self) -> &'static str {
        self.component
    }

    /// Runs `fut` with this logger's dispatcher and a span for `operation`.
    pub fn scope<F>(&self, operation: &'static str, fut: F) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        let component = self.component;
        let span = tracing::dispatcher::with_default(&self.dispatch, || {
            tracing::info_span!("gitops", component, operation)
        });
        fut.instrument(span).with_subscriber(self.dispatch.clone())
    }

    /// Runs a synchronous closure with this logger's dispatcher.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::discard()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("component", &self.component)
            .finish()
    }
}
