//! Degraded-mode facade
//!
//! Installed instead of the engine adapter when the engine module fails to
//! load. Every operation answers with an already-failed outcome carrying the
//! load failure, except `close`, which answers a plain `false`.

use sqlbridge_core::errors::{ExError, ExErrorKind, Result};
use sqlbridge_core::protocol::{Action, ActionResult, ExecResult};

#[derive(Debug, Clone)]
pub struct DegradedFacade {
    reason: String,
}

impl DegradedFacade {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Why the engine could not be loaded
    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn open(&self, _path: Option<&str>) -> Result<bool> {
        Err(self.unavailable(Action::Open))
    }

    pub fn exec(&self, _sql: &str, _args: Option<&serde_json::Value>) -> Result<ExecResult> {
        Err(self.unavailable(Action::Exec))
    }

    pub fn close(&self) -> bool {
        false
    }

    /// Answer any protocol action
    pub fn handle(&self, action: Action) -> Result<ActionResult> {
        match action {
            Action::Open => self.open(None).map(ActionResult::Flag),
            Action::Exec => self.exec("", None).map(ActionResult::Rows),
            Action::Close => Ok(ActionResult::Flag(self.close())),
            Action::Init | Action::Export | Action::Import => Err(self.unavailable(action)),
        }
    }

    fn unavailable(&self, action: Action) -> ExError {
        ExError::new(ExErrorKind::EngineUnavailable)
            .with_op(action.as_str())
            .with_message(format!("SQLite engine is not available: {}", self.reason))
    }
}
