#![warn(missing_docs)]
//! # Structured logging for the blob holder crates
//!
//! ## Usage
//! Log to the console and filter on what you want with `RUST_LOG`:
//! ```bash
//! RUST_LOG='blob_holder::orchestrator=debug' blob-holders retry
//! ```
//! The [Output] type can be parsed from a command line arg (`--structured Json`)
//! and is passed to [init_fmt] on start up.
//!
//! #### Json
//! With `--structured Json` every event is written as one json object per
//! line, which can be piped into `jq` and friends.
//!
//! #### Tests
//! Call [test_run] at the top of a test. It does nothing unless `RUST_LOG` is set.

use derive_more::Display;
use std::str::FromStr;
use tracing_subscriber::{
    filter::EnvFilter, fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt, Layer,
    Registry,
};

pub use tracing;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
/// Sets the kind of structured logging output you want
pub enum Output {
    /// Regular logging (default)
    #[default]
    Log,
    /// More compact version of above
    Compact,
    /// Outputs everything as json
    Json,
    /// No logging to console
    None,
}

/// ParseError is a String
pub type ParseError = String;

impl FromStr for Output {
    type Err = ParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Log" => Ok(Output::Log),
            "Compact" => Ok(Output::Compact),
            "Json" => Ok(Output::Json),
            "None" => Ok(Output::None),
            _ => Err(format!("Could not parse log output type: {s}")),
        }
    }
}

/// Run logging in a test.
///
/// RUST_LOG must be set or this is a no-op. Calling it more than once is fine.
pub fn test_run() {
    if std::env::var_os("RUST_LOG").is_none() {
        return;
    }
    let _ = init_fmt_with_opts(Output::Log, std::io::stderr);
}

/// Build the canonical filter based on env.
///
/// Falls back to `info` when RUST_LOG is not set.
pub fn standard_filter() -> Result<EnvFilter, errors::TracingError> {
    match std::env::var("RUST_LOG") {
        Ok(directives) => Ok(EnvFilter::try_new(directives)?),
        Err(_) => Ok(EnvFilter::new("info")),
    }
}

/// Install the global subscriber, writing to stderr.
pub fn init_fmt(output: Output) -> Result<(), errors::TracingError> {
    init_fmt_with_opts(output, std::io::stderr)
}

fn init_fmt_with_opts<W>(output: Output, writer: W) -> Result<(), errors::TracingError>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let filter = standard_filter()?;
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_file(true)
        .with_line_number(true)
        .with_target(true);

    match output {
        Output::Log => Registry::default()
            .with(layer.with_filter(filter))
            .try_init()?,
        Output::Compact => Registry::default()
            .with(layer.compact().with_filter(filter))
            .try_init()?,
        Output::Json => Registry::default()
            .with(layer.json().with_filter(filter))
            .try_init()?,
        Output::None => (),
    }
    Ok(())
}

pub mod errors {
    //! Error in the tracing/logging framework

    use thiserror::Error;

    /// Error in the tracing/logging framework
    #[allow(missing_docs)] // should be self-explanatory
    #[derive(Error, Debug)]
    pub enum TracingError {
        #[error(transparent)]
        Init(#[from] tracing_subscriber::util::TryInitError),
        #[error(transparent)]
        BadDirective(#[from] tracing_subscriber::filter::ParseError),
    }
}
