//! Tagged request/response messages crossing the execution-context boundary
//!
//! Both wire dialects are accepted on input: `{id, action, params:{sql, args}}`
//! and `{id, method, params:{sql, params}}`. Output always uses `action`/`args`.

use crate::errors::{ExError, ExErrorKind, Result};
use serde::{Deserialize, Serialize};
use sqlbridge_core_types::RequestId;

/// The closed set of operations the dispatcher routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Init,
    Open,
    Exec,
    Close,
    Export,
    Import,
}

impl Action {
    /// Parse a wire action name; `None` for anything outside the set
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "init" => Some(Action::Init),
            "open" => Some(Action::Open),
            "exec" => Some(Action::Exec),
            "close" => Some(Action::Close),
            "export" => Some(Action::Export),
            "import" => Some(Action::Import),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Init => "init",
            Action::Open => "open",
            Action::Exec => "exec",
            Action::Close => "close",
            Action::Export => "export",
            Action::Import => "import",
        }
    }

    /// Whether a successful run is followed by a snapshot persist
    pub fn persists(&self) -> bool {
        matches!(self, Action::Exec | Action::Import)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action-specific payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Params {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    /// Bound parameters: a JSON array (positional) or object (named)
    #[serde(default, alias = "params", skip_serializing_if = "Option::is_none")]
    pub args: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
}

impl Params {
    pub fn sql(sql: impl Into<String>) -> Self {
        Self {
            sql: Some(sql.into()),
            ..Self::default()
        }
    }

    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn data(data: Vec<u8>) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }

    pub fn with_args(mut self, args: serde_json::Value) -> Self {
        self.args = Some(args);
        self
    }
}

/// One inbound request
///
/// `action` stays a raw string so an unknown name still yields a reply that
/// echoes `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    #[serde(alias = "method")]
    pub action: String,
    #[serde(default)]
    pub params: Params,
}

impl Request {
    pub fn new(id: impl Into<RequestId>, action: Action, params: Params) -> Self {
        Self {
            id: id.into(),
            action: action.as_str().to_string(),
            params,
        }
    }

    /// Parse a request from its JSON wire form
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            ExError::new(ExErrorKind::Serialization)
                .with_op("decode_request")
                .with_message(e.to_string())
        })
    }

    /// The parsed action, if it is one of the known set
    pub fn action(&self) -> Option<Action> {
        Action::parse(&self.action)
    }
}

/// Acknowledgement payload for `init` and `import`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    /// Non-fatal problem the caller may want to surface (e.g. a snapshot
    /// that could not be restored)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            success: true,
            warning: None,
        }
    }

    pub fn with_warning(warning: impl Into<String>) -> Self {
        Self {
            success: true,
            warning: Some(warning.into()),
        }
    }
}

/// Rows and metadata produced by one `exec`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    /// Rows modified by the statement (0 for read-only statements)
    pub changes: u64,
    pub last_insert_rowid: i64,
}

impl ExecResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Successful payload of a reply; its shape depends on the action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionResult {
    Ack(Ack),
    Rows(ExecResult),
    Blob(Vec<u8>),
    Flag(bool),
}

impl ActionResult {
    pub fn as_ack(&self) -> Option<&Ack> {
        match self {
            ActionResult::Ack(ack) => Some(ack),
            _ => None,
        }
    }

    pub fn as_rows(&self) -> Option<&ExecResult> {
        match self {
            ActionResult::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            ActionResult::Flag(flag) => Some(*flag),
            _ => None,
        }
    }

    pub fn into_blob(self) -> Option<Vec<u8>> {
        match self {
            ActionResult::Blob(blob) => Some(blob),
            _ => None,
        }
    }
}

/// One outbound reply: a result XOR an error, never both
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Success { id: RequestId, result: ActionResult },
    Failure { id: RequestId, error: String },
}

impl Response {
    pub fn from_outcome(id: RequestId, outcome: Result<ActionResult>) -> Self {
        match outcome {
            Ok(result) => Response::Success { id, result },
            Err(err) => Response::Failure {
                id,
                error: err.to_string(),
            },
        }
    }

    pub fn id(&self) -> &RequestId {
        match self {
            Response::Success { id, .. } | Response::Failure { id, .. } => id,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Failure { .. })
    }

    /// Convert into a Rust result, rebuilding the error kind from the reply
    pub fn into_result(self) -> Result<ActionResult> {
        match self {
            Response::Success { result, .. } => Ok(result),
            Response::Failure { id, error } => Err(ExError::from_reply(&error).with_request_id(id)),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            ExError::new(ExErrorKind::Serialization)
                .with_op("encode_response")
                .with_message(e.to_string())
        })
    }
}
