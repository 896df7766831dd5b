use std::{
    fmt, io,
    panic::{self, UnwindSafe},
    path::PathBuf,
    process,
};

use color_eyre::{Report, Section, config::HookBuilder, owo_colors::style};
use futures_util::FutureExt;
use tokio::sync::mpsc;

use crate::model::RecordKind;

/// Result type for fallible operations of the application
pub type Result<T, E = AppError> = std::result::Result<T, E>;

/// Initializes error and panics handling
pub async fn init<F>(log_path: Option<PathBuf>, fut: F) -> color_eyre::Result<()>
where
    F: Future<Output = color_eyre::Result<()>> + UnwindSafe,
{
    tracing::trace!("Initializing error handlers");
    let panic_section = if let Some(log_path) = log_path {
        format!("This is a bug, logs can be found at {}", log_path.display())
    } else {
        String::from(
            "This is a bug. Logs were not generated, consider enabling them on the config or running with \
             FLEET_SELECT_LOG=debug.",
        )
    };
    let (panic_hook, eyre_hook) = HookBuilder::default()
        .panic_section(panic_section.clone())
        .display_env_section(false)
        .display_location_section(true)
        .capture_span_trace_by_default(true)
        .into_hooks();

    let (panic_tx, mut panic_rx) = mpsc::channel(1);

    eyre_hook.install()?;
    panic::set_hook(Box::new(move |panic_info| {
        // The terminal might still be in raw mode, the report is printed once the main future is dropped
        let panic_report = panic_hook.panic_report(panic_info).to_string();
        tracing::error!("Error: {}", strip_ansi_escapes::strip_str(&panic_report));
        if panic_tx.try_send(panic_report).is_err() {
            tracing::error!("Error sending panic report");
            process::exit(2);
        }
    }));

    tokio::select! {
        biased;
        panic_report = panic_rx.recv().fuse() => {
            if let Some(report) = panic_report {
                eprintln!("{report}");
            } else {
                eprintln!(
                    "{}\n\n{panic_section}",
                    style().bright_red().style("A panic occurred, but the detailed report could not be captured.")
                );
            }
            process::exit(1);
        }
        res = Box::pin(fut).catch_unwind() => {
            match res {
                Ok(r) => r
                    .with_section(move || panic_section)
                    .inspect_err(|err| tracing::error!("Error: {}", strip_ansi_escapes::strip_str(format!("{err:?}")))),
                Err(err) => {
                    if let Ok(report) = panic_rx.try_recv() {
                        eprintln!("{report}");
                    } else if let Some(err) = err.downcast_ref::<&str>() {
                        print_panic_msg(err, panic_section);
                    } else if let Some(err) = err.downcast_ref::<String>() {
                        print_panic_msg(err, panic_section);
                    } else {
                        eprintln!(
                            "{}\n\n{panic_section}",
                            style().bright_red().style("An unexpected panic happened")
                        );
                    }
                    process::exit(1);
                }
            }
        }
    }
}

fn print_panic_msg(err: impl AsRef<str>, panic_section: String) {
    let err = err.as_ref();
    eprintln!(
        "{}\nMessage: {}\n\n{panic_section}",
        style().bright_red().style("The application panicked (crashed)."),
        style().blue().style(err)
    );
    tracing::error!("Panic: {err}");
}

/// Top-level error of the application
#[derive(Debug)]
pub enum AppError {
    /// An error that must be displayed to the user, the session can't continue
    UserFacing(UserFacingError),
    /// The operation was cancelled, there's nothing to report
    Cancelled,
    /// An internal invariant was violated
    Unexpected(Report),
}

/// Errors with a meaningful message for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserFacingError {
    /// The resource provider couldn't be reached
    ProviderUnavailable { kind: RecordKind, reason: String },
    /// There are no records of the given kind at all
    EmptyFleet(RecordKind),
    /// A single record was requested but it doesn't exist
    RecordNotFound { kind: RecordKind, id: String },
    /// The command entered by the user didn't pass the sanity check
    CommandRejected(String),
    /// The query couldn't be parsed, reserved as the grammar is currently total
    QueryMalformed(String),
}

impl fmt::Display for UserFacingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserFacingError::ProviderUnavailable { kind, reason } => {
                write!(f, "Couldn't list {kind} resources: {reason}. Check your credentials and retry")
            }
            UserFacingError::EmptyFleet(kind) => write!(f, "There are no {kind} resources in this region"),
            UserFacingError::RecordNotFound { kind, id } => write!(f, "The {kind} '{id}' doesn't exist"),
            UserFacingError::CommandRejected(reason) => write!(f, "The command was rejected: {reason}"),
            UserFacingError::QueryMalformed(reason) => write!(f, "Invalid query: {reason}"),
        }
    }
}

impl AppError {
    /// Converts this error into a report
    pub fn into_report(self) -> Report {
        match self {
            AppError::UserFacing(err) => Report::msg(err.to_string()),
            AppError::Cancelled => Report::msg("Operation cancelled"),
            AppError::Unexpected(report) => report,
        }
    }
}

impl From<UserFacingError> for AppError {
    fn from(err: UserFacingError) -> Self {
        AppError::UserFacing(err)
    }
}

/// Error returned by resource providers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The call was cancelled by the caller
    Cancelled,
    /// The call didn't complete in time
    Timeout,
    /// The remote call failed
    Unavailable(String),
    /// The requested resource doesn't exist
    NotFound(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Cancelled => write!(f, "cancelled"),
            ProviderError::Timeout => write!(f, "timed out"),
            ProviderError::Unavailable(reason) => write!(f, "{reason}"),
            ProviderError::NotFound(id) => write!(f, "'{id}' not found"),
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    /// Maps this error into an application error for the given kind
    pub fn into_app_error(self, kind: RecordKind) -> AppError {
        match self {
            ProviderError::Cancelled => AppError::Cancelled,
            ProviderError::NotFound(id) => UserFacingError::RecordNotFound { kind, id }.into(),
            err @ (ProviderError::Timeout | ProviderError::Unavailable(_)) => UserFacingError::ProviderUnavailable {
                kind,
                reason: err.to_string(),
            }
            .into(),
        }
    }
}

/// Error type for cache operations, lookups never surface it
#[derive(Debug)]
pub enum CacheError {
    /// The entry couldn't be parsed
    Corrupt(String),
    /// The entry exceeds the size ceiling
    TooLarge(u64),
    /// The key resolves to a path outside of the cache directory
    OutsideDirectory,
    /// An I/O operation failed
    Io(io::Error),
    /// An unexpected error occurred
    Unexpected(Report),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Corrupt(reason) => write!(f, "corrupt cache entry: {reason}"),
            CacheError::TooLarge(size) => write!(f, "cache entry too large ({size} bytes)"),
            CacheError::OutsideDirectory => write!(f, "cache key escapes the cache directory"),
            CacheError::Io(err) => write!(f, "cache i/o error: {err}"),
            CacheError::Unexpected(report) => write!(f, "{report}"),
        }
    }
}

impl CacheError {
    pub fn into_report(self) -> Report {
        match self {
            CacheError::Unexpected(report) => report,
            other => Report::msg(other.to_string()),
        }
    }
}

impl From<io::Error> for CacheError {
    fn from(err: io::Error) -> Self {
        CacheError::Io(err)
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Corrupt(err.to_string())
    }
}

macro_rules! impl_from_report {
    ($err:ty) => {
        impl<T> From<T> for $err
        where
            T: Into<Report>,
        {
            fn from(err: T) -> Self {
                Self::Unexpected(err.into())
            }
        }
    };
}
impl_from_report!(AppError);
