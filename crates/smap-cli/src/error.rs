//! CLI error handling with semantic exit codes.
//!
//! This module provides categorized errors that map to specific exit codes,
//! enabling reliable error handling in shell scripts and CI pipelines.
//!
//! # Exit Code Categories
//!
//! | Code | Category | Description |
//! |------|----------|-------------|
//! | 0 | Success | Command completed successfully |
//! | 1 | `Internal` | Unexpected/internal error |
//! | 2 | `Usage` | Invalid arguments or configuration |
//! | 3 | `InvalidEntries` | No valid entries, malformed input, or `check` found invalid URLs |
//! | 4 | `Io` | Reading input or writing output failed |
//! | 5 | `Network` | Fetch failure |
//! | 6 | `LimitExceeded` | Entry cap, oversize entry, or index limit |
//! | 130 | `Cancelled` | Interrupted with Ctrl-C |
//!
//! # Usage
//!
//! ```bash
//! smap generate --out public --urls urls.txt
//! case $? in
//!     0) echo "Sitemaps written" ;;
//!     3) echo "Nothing valid to write" ;;
//!     *) echo "Other error" ;;
//! esac
//! ```

use std::fmt;

use smap_core::{Error as CoreError, GenerationError};

/// Semantic error category determining the exit code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCategory {
    /// Unexpected or internal error (exit code 1).
    Internal = 1,

    /// Invalid arguments or configuration (exit code 2).
    Usage = 2,

    /// No valid entries to write, malformed input, or invalid URLs found by
    /// `check` (exit code 3).
    InvalidEntries = 3,

    /// Filesystem failure (exit code 4).
    Io = 4,

    /// Network or fetch failure (exit code 5).
    Network = 5,

    /// A protocol or configured limit was exceeded (exit code 6).
    LimitExceeded = 6,

    /// The run was cancelled (exit code 130).
    Cancelled = 130,
}

impl ErrorCategory {
    /// Get the exit code for this category.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        self as u8
    }

    /// Get a short description of this error category.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Internal => "internal error",
            Self::Usage => "usage error",
            Self::InvalidEntries => "invalid entries",
            Self::Io => "i/o error",
            Self::Network => "network error",
            Self::LimitExceeded => "limit exceeded",
            Self::Cancelled => "cancelled",
        }
    }

    /// Category for a crate-level core error.
    #[must_use]
    pub fn from_core(error: &CoreError) -> Self {
        match error {
            CoreError::Generation(inner) => Self::from_generation(inner),
            other => Self::from_core_category(other.category()),
        }
    }

    /// Category for a pipeline error.
    #[must_use]
    pub fn from_generation(error: &GenerationError) -> Self {
        match error {
            GenerationError::Source { source, .. } => Self::from_core(source),
            other => Self::from_core_category(other.category()),
        }
    }

    fn from_core_category(category: &str) -> Self {
        match category {
            "config" | "invalid_url" => Self::Usage,
            "no_valid_entries" | "parse" => Self::InvalidEntries,
            "io" => Self::Io,
            "network" | "timeout" => Self::Network,
            "limit_exceeded" => Self::LimitExceeded,
            "cancelled" => Self::Cancelled,
            _ => Self::Internal,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// A CLI error with a semantic category for exit code mapping.
///
/// Wraps an `anyhow::Error` with an `ErrorCategory` to enable proper
/// exit codes while preserving full error context and chains.
#[derive(Debug)]
pub struct CliError {
    /// The semantic category of this error.
    pub category: ErrorCategory,
    /// The underlying error with full context.
    pub source: anyhow::Error,
}

impl CliError {
    /// Create a new CLI error with explicit category.
    pub fn new(category: ErrorCategory, source: impl Into<anyhow::Error>) -> Self {
        Self {
            category,
            source: source.into(),
        }
    }

    /// Create a usage error.
    pub fn usage(source: impl Into<anyhow::Error>) -> Self {
        Self::new(ErrorCategory::Usage, source)
    }

    /// Wrap a core error, keeping its category.
    pub fn core(error: CoreError) -> Self {
        Self::new(ErrorCategory::from_core(&error), error)
    }

    /// Wrap a pipeline error, keeping its category.
    pub fn generation(error: GenerationError) -> Self {
        Self::new(ErrorCategory::from_generation(&error), error)
    }

    /// Get the exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.category.exit_code()
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Determine the exit code from an `anyhow::Error`.
///
/// Categorized errors keep their category; bare core errors are mapped by
/// their own category; anything else is internal.
#[must_use]
pub fn exit_code_from_error(err: &anyhow::Error) -> u8 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return cli_err.exit_code();
    }
    if let Some(generation) = err.downcast_ref::<GenerationError>() {
        return ErrorCategory::from_generation(generation).exit_code();
    }
    if let Some(core) = err.downcast_ref::<CoreError>() {
        return ErrorCategory::from_core(core).exit_code();
    }
    if err.downcast_ref::<clap::Error>().is_some() {
        return ErrorCategory::Usage.exit_code();
    }
    ErrorCategory::Internal.exit_code()
}
