//! Error taxonomy for the WebDistill fetch + extraction core.
//!
//! `ErrorKind` is the closed, routing-relevant enum described in the fetch
//! routing spec: every low-level fetch/decode/extract failure is mapped to
//! exactly one of these variants before it ever reaches the Routing Engine.
//! `WebDistillError` is the ergonomic wrapper used internally for `?`
//! propagation; it carries an `ErrorKind` for anything that should be able
//! to drive a routing decision, plus a small set of structural variants
//! (template/routing validation, I/O, YAML) that never reach request-time
//! callers directly.

use thiserror::Error;

/// Result type alias using [`WebDistillError`].
pub type Result<T> = std::result::Result<T, WebDistillError>;

/// Closed set of error categories that drive routing decisions.
///
/// This is intentionally small and flat: the Error Classifier's only job is
/// collapsing the long tail of network/parser exceptions into one of these
/// so the Routing Engine can match on `error_kind` conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NetworkTimeout,
    DnsFailure,
    TlsFailure,
    ConnectionReset,
    Http4xxBlock,
    Http5xx,
    NotFound404,
    RedirectLoop,
    CaptchaDetected,
    JavascriptRequired,
    DecodeFailure,
    FetcherInternal,
    BudgetExceeded,
    ExtractionInsufficient,
}

impl ErrorKind {
    /// Human-readable, stable name (also the `Display` form) matching the
    /// `SCREAMING_SNAKE_CASE` wire representation used in routing YAML.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NetworkTimeout => "NETWORK_TIMEOUT",
            ErrorKind::DnsFailure => "DNS_FAILURE",
            ErrorKind::TlsFailure => "TLS_FAILURE",
            ErrorKind::ConnectionReset => "CONNECTION_RESET",
            ErrorKind::Http4xxBlock => "HTTP_4XX_BLOCK",
            ErrorKind::Http5xx => "HTTP_5XX",
            ErrorKind::NotFound404 => "NOT_FOUND_404",
            ErrorKind::RedirectLoop => "REDIRECT_LOOP",
            ErrorKind::CaptchaDetected => "CAPTCHA_DETECTED",
            ErrorKind::JavascriptRequired => "JAVASCRIPT_REQUIRED",
            ErrorKind::DecodeFailure => "DECODE_FAILURE",
            ErrorKind::FetcherInternal => "FETCHER_INTERNAL",
            ErrorKind::BudgetExceeded => "BUDGET_EXCEEDED",
            ErrorKind::ExtractionInsufficient => "EXTRACTION_INSUFFICIENT",
        }
    }

    /// Whether escalating to a different fetcher is ever sensible for this
    /// kind. `RedirectLoop` and `BudgetExceeded` are not retryable by
    /// switching fetchers; everything else may be routed around.
    pub fn is_escalatable(&self) -> bool {
        !matches!(self, ErrorKind::RedirectLoop | ErrorKind::BudgetExceeded)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = WebDistillError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "NETWORK_TIMEOUT" => Ok(ErrorKind::NetworkTimeout),
            "DNS_FAILURE" => Ok(ErrorKind::DnsFailure),
            "TLS_FAILURE" => Ok(ErrorKind::TlsFailure),
            "CONNECTION_RESET" => Ok(ErrorKind::ConnectionReset),
            "HTTP_4XX_BLOCK" => Ok(ErrorKind::Http4xxBlock),
            "HTTP_5XX" => Ok(ErrorKind::Http5xx),
            "NOT_FOUND_404" => Ok(ErrorKind::NotFound404),
            "REDIRECT_LOOP" => Ok(ErrorKind::RedirectLoop),
            "CAPTCHA_DETECTED" => Ok(ErrorKind::CaptchaDetected),
            "JAVASCRIPT_REQUIRED" => Ok(ErrorKind::JavascriptRequired),
            "DECODE_FAILURE" => Ok(ErrorKind::DecodeFailure),
            "FETCHER_INTERNAL" => Ok(ErrorKind::FetcherInternal),
            "BUDGET_EXCEEDED" => Ok(ErrorKind::BudgetExceeded),
            "EXTRACTION_INSUFFICIENT" => Ok(ErrorKind::ExtractionInsufficient),
            other => Err(WebDistillError::Validation(format!(
                "unknown error_kind: {other}"
            ))),
        }
    }
}

/// Top-level error type for WebDistill operations.
#[derive(Error, Debug)]
pub enum WebDistillError {
    /// A classified fetch/decode/extract failure, carrying the kind used
    /// for routing plus a diagnostic detail string.
    #[error("{kind}: {detail}")]
    Classified { kind: ErrorKind, detail: String },

    /// A routing or template YAML document failed schema validation.
    /// Callers must not replace the currently-serving snapshot when this
    /// is returned from a reload attempt.
    #[error("validation failed: {0}")]
    Validation(String),

    /// I/O error reading a rule/template file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (orchestrator I/O contract).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing failed.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Generic error with a custom message, used sparingly at call sites
    /// that have no more specific variant.
    #[error("{0}")]
    Custom(String),
}

impl WebDistillError {
    pub fn classified(kind: ErrorKind, detail: impl Into<String>) -> Self {
        WebDistillError::Classified {
            kind,
            detail: detail.into(),
        }
    }

    pub fn custom(msg: impl Into<String>) -> Self {
        WebDistillError::Custom(msg.into())
    }

    /// Extract the routing-relevant `ErrorKind`, if this error carries one.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            WebDistillError::Classified { kind, .. } => Some(*kind),
            WebDistillError::Validation(_) => None,
            _ => Some(ErrorKind::FetcherInternal),
        }
    }
}
