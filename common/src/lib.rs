//! Shared plumbing for the `hsload` tool
//!
//! This crate holds the pieces of the tool that are not specific to moving containers into a
//! data-service domain:
//!
//! - [`config`]: the credential/config file loader and the immutable [`Credentials`] value
//! - [`version`]: library version parsing and the link-mode prerequisite check
//! - logging setup ([`setup_logging`]) driven by `--loglevel` and `--logfile`
//! - the runtime driver ([`run`]) that executes the async entry point and handles keyboard
//!   interruption
//!
//! # Runtime model
//!
//! Sources are processed strictly one after another, so [`run`] builds a current-thread tokio
//! runtime. Network fetches and loader invocations are awaited in place; nothing runs in the
//! background while a source is being processed.

use anyhow::Context;

pub mod config;
pub mod version;

pub use config::{Config, Credentials};

/// Log verbosity accepted by `--loglevel`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    #[default]
    Error,
}

impl LogLevel {
    /// Filter admitting events at this level and above from every target
    #[must_use]
    pub fn env_filter(self) -> tracing_subscriber::EnvFilter {
        let directive = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        };
        tracing_subscriber::EnvFilter::new(directive)
    }
}

/// Output and logging configuration
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// Maximum level of events that get recorded
    pub level: LogLevel,
    /// Append log lines to this file instead of writing them to stderr
    pub logfile: Option<std::path::PathBuf>,
}

impl LoggingConfig {
    /// True when log lines do not reach the terminal and errors must be echoed to stderr
    #[must_use]
    pub fn logs_to_file(&self) -> bool {
        self.logfile.is_some()
    }
}

/// Install the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened or a subscriber is already installed.
pub fn setup_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.level.env_filter())
        .with_file(true)
        .with_line_number(true)
        .with_target(false);
    let result = match &config.logfile {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {path:?}"))?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    result.map_err(|err| anyhow::anyhow!("failed to initialize logging: {err}"))?;
    tracing::debug!("set log level to {:?}", config.level);
    Ok(())
}

#[cfg(unix)]
async fn wait_for_interrupt() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::interrupt()) {
        Ok(mut sigint) => {
            sigint.recv().await;
        }
        Err(error) => {
            tracing::warn!("could not register SIGINT handler: {error}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_interrupt() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for Ctrl+C: {error}");
        std::future::pending::<()>().await;
    }
}

/// Report a fatal error: logged, and echoed to stderr when the log goes to a file
pub fn report(logging: &LoggingConfig, message: &str) {
    tracing::error!("{message}");
    if logging.logs_to_file() {
        eprintln!("{message}");
    }
}

/// Run `func` to completion on a current-thread runtime.
///
/// A keyboard interruption aborts the run: the in-flight future is dropped (which releases any
/// resources it owns, e.g. staged temporary files) and no partial work is rolled back.
///
/// Returns `None` if the run failed, was interrupted, or the runtime could not be started; the
/// failure has already been reported at that point.
pub fn run<Fut, Summary, Error>(
    logging: &LoggingConfig,
    func: impl FnOnce() -> Fut,
) -> Option<Summary>
where
    Summary: std::fmt::Display,
    Error: std::fmt::Display,
    Fut: std::future::Future<Output = Result<Summary, Error>>,
{
    run_until(logging, func, wait_for_interrupt)
}

/// Like [`run`], with `interrupt` resolving when the run must be aborted
fn run_until<Fut, Int, Summary, Error>(
    logging: &LoggingConfig,
    func: impl FnOnce() -> Fut,
    interrupt: impl FnOnce() -> Int,
) -> Option<Summary>
where
    Summary: std::fmt::Display,
    Error: std::fmt::Display,
    Fut: std::future::Future<Output = Result<Summary, Error>>,
    Int: std::future::Future<Output = ()>,
{
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            report(logging, &format!("failed to start runtime: {error}"));
            return None;
        }
    };
    let res = runtime.block_on(async {
        let work = func();
        tokio::select! {
            res = work => Some(res),
            () = interrupt() => None,
        }
    });
    match res {
        Some(Ok(summary)) => {
            tracing::info!("{summary}");
            Some(summary)
        }
        Some(Err(error)) => {
            report(logging, &format!("{error:#}"));
            None
        }
        None => {
            report(logging, "aborted by user via keyboard interrupt");
            None
        }
    }
}
