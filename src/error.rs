use std::time::Duration;
use thiserror::Error;

/// Boxed error produced by a protected upstream operation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "capacity", "adaptive.min_rate")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected range, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "config_validator", "circuit_breaker")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// One fallback strategy that declined to produce a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackFailure {
    pub strategy: String,
    pub reason: String,
}

impl std::fmt::Display for FallbackFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.strategy, self.reason)
    }
}

/// Unified error type for the resilience layer.
///
/// Admission and circuit denials only surface here when fallback is disabled
/// or every fallback strategy declined.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Rate limit exceeded ({algorithm}){}", format_wait(.retry_after))]
    RateLimitExceeded {
        algorithm: &'static str,
        retry_after: Option<Duration>,
    },

    #[error("Circuit breaker open, retry in {}ms", .retry_after.as_millis())]
    CircuitOpen { retry_after: Duration },

    #[error("Upstream call failed: {0}")]
    Upstream(#[source] BoxError),

    #[error("All fallbacks failed: [{}]", format_failures(.failures))]
    AllFallbacksFailed { failures: Vec<FallbackFailure> },

    #[error("Operation cancelled while waiting")]
    Cancelled,

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

fn format_wait(wait: &Option<Duration>) -> String {
    match wait {
        Some(d) => format!(", retry in {}ms", d.as_millis()),
        None => String::new(),
    }
}

fn format_failures(failures: &[FallbackFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Wrap an arbitrary upstream error.
    pub fn upstream(err: impl Into<BoxError>) -> Self {
        Error::Upstream(err.into())
    }

    /// Create a new runtime error with structured context
    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } | Error::Runtime { context, .. } => Some(context),
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimitExceeded { .. })
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Error::CircuitOpen { .. })
    }

    pub fn is_upstream(&self) -> bool {
        matches!(self, Error::Upstream(_))
    }

    /// Per-strategy failures when the whole fallback chain declined.
    pub fn fallback_failures(&self) -> Option<&[FallbackFailure]> {
        match self {
            Error::AllFallbacksFailed { failures } => Some(failures),
            _ => None,
        }
    }
}
