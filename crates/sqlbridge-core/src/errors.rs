use sqlbridge_core_types::RequestId;
use thiserror::Error;

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Every failure that can reach a caller maps to one of these kinds. Each
/// kind has a stable code that prefixes the human-readable error string of a
/// reply, so callers on the far side of the context boundary can recover the
/// kind with [`ExError::from_reply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Bootstrap
    /// The engine module failed to load; permanent for the context's lifetime
    EngineUnavailable,

    // Lifecycle
    /// Operation issued before `init`/`open` or after `close`
    NotInitialized,

    // Protocol
    /// The request named an action outside the enumerated set
    UnknownAction,
    /// The action's params were missing or had the wrong shape
    InvalidParams,

    // Engine
    /// The engine rejected a statement; message is passed through verbatim
    EngineExecution,
    /// A snapshot blob could not be applied to a handle
    RestoreCorrupt,

    // Persistence
    /// The snapshot store failed to read or write
    Storage,
    Io,
    Serialization,

    // Context
    /// The execution context went away before replying
    ContextTerminated,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::EngineUnavailable => "ERR_ENGINE_UNAVAILABLE",
            ExErrorKind::NotInitialized => "ERR_NOT_INITIALIZED",
            ExErrorKind::UnknownAction => "ERR_UNKNOWN_ACTION",
            ExErrorKind::InvalidParams => "ERR_INVALID_PARAMS",
            ExErrorKind::EngineExecution => "ERR_ENGINE_EXECUTION",
            ExErrorKind::RestoreCorrupt => "ERR_RESTORE_CORRUPT",
            ExErrorKind::Storage => "ERR_STORAGE",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::ContextTerminated => "ERR_CONTEXT_TERMINATED",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Look up a kind by its stable code
    pub fn from_code(code: &str) -> Option<Self> {
        ALL_KINDS.iter().copied().find(|kind| kind.code() == code)
    }
}

const ALL_KINDS: [ExErrorKind; 11] = [
    ExErrorKind::EngineUnavailable,
    ExErrorKind::NotInitialized,
    ExErrorKind::UnknownAction,
    ExErrorKind::InvalidParams,
    ExErrorKind::EngineExecution,
    ExErrorKind::RestoreCorrupt,
    ExErrorKind::Storage,
    ExErrorKind::Io,
    ExErrorKind::Serialization,
    ExErrorKind::ContextTerminated,
    ExErrorKind::Internal,
];

/// Canonical structured error type
///
/// Carries a classification for programmatic handling plus context for
/// debugging. Its `Display` form is what travels in an error reply.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    request_id: Option<RequestId>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            request_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add request ID context
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Rebuild an error from the string carried by an error reply.
    ///
    /// Replies produced by this crate start with `[ERR_*]`; anything else
    /// (a foreign peer, a hand-written message) is classified as `Internal`
    /// with the whole string kept as the message.
    pub fn from_reply(reply: &str) -> Self {
        let parsed = reply.strip_prefix('[').and_then(|rest| {
            let (code, tail) = rest.split_once(']')?;
            let kind = ExErrorKind::from_code(code)?;
            Some((kind, tail.trim_start()))
        });

        match parsed {
            Some((kind, tail)) => {
                let (op, message) = match tail.split_once(": ") {
                    Some((op, message)) if !op.contains(' ') => (Some(op), message),
                    _ => (None, tail),
                };
                let mut err = ExError::new(kind).with_message(message);
                if let Some(op) = op {
                    err = err.with_op(op);
                }
                err
            }
            None => ExError::new(ExErrorKind::Internal).with_message(reply),
        }
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the request ID context, if any
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        match (&self.op, self.message.is_empty()) {
            (Some(op), false) => write!(f, " {}: {}", op, self.message)?,
            (Some(op), true) => write!(f, " {}", op)?,
            (None, false) => write!(f, " {}", self.message)?,
            (None, true) => {}
        }
        if let Some(source) = &self.source {
            write!(f, " (caused by {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|s| s as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Errors raised while loading a [`crate::config::BridgeConfig`]
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl From<ConfigError> for ExError {
    fn from(err: ConfigError) -> Self {
        ExError::new(ExErrorKind::InvalidParams)
            .with_op("load_config")
            .with_message(err.to_string())
    }
}
