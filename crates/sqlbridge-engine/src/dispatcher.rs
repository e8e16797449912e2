//! Request dispatcher
//!
//! Routes each request to the backend chosen at bootstrap and turns the
//! outcome into exactly one reply echoing the request id. Handle-touching
//! work goes through a single async mutex; the lock is held across the
//! engine call and the snapshot persist that follows it, so no mutation can
//! interleave with a persist.

use crate::adapter::EngineAdapter;
use crate::degraded::DegradedFacade;
use crate::loader::EngineLoader;
use sqlbridge_core::errors::{ExError, ExErrorKind, Result};
use sqlbridge_core::protocol::{Ack, Action, ActionResult, Params, Request, Response};
use sqlbridge_core::{log_op_end, log_op_error, log_op_start};
use sqlbridge_store::SnapshotStore;
use std::time::Instant;
use tokio::sync::Mutex;

/// What bootstrap produced for this context
pub enum Backend {
    Ready(Mutex<EngineAdapter>),
    Unavailable(DegradedFacade),
}

impl Backend {
    pub fn ready(adapter: EngineAdapter) -> Self {
        Backend::Ready(Mutex::new(adapter))
    }
}

pub struct Dispatcher {
    backend: Backend,
}

impl Dispatcher {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    /// Load the engine once and install the matching backend
    ///
    /// A load failure is not an error here: the context still answers every
    /// request, through the degraded facade.
    pub fn bootstrap(loader: &dyn EngineLoader, store: SnapshotStore, database: &str) -> Self {
        let backend = match loader.load() {
            Ok(module) => {
                tracing::info!(engine = module.version(), database, "engine loaded");
                Backend::ready(EngineAdapter::new(module, store, database))
            }
            Err(err) => {
                tracing::warn!(error = %err, "engine failed to load, running degraded");
                let reason = if err.message().is_empty() {
                    err.to_string()
                } else {
                    err.message().to_string()
                };
                Backend::Unavailable(DegradedFacade::new(reason))
            }
        };
        Self::new(backend)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.backend, Backend::Unavailable(_))
    }

    /// Answer one request
    pub async fn handle(&self, request: Request) -> Response {
        let start = Instant::now();
        let Request { id, action, params } = request;
        log_op_start!("dispatch", request_id = %id, action = %action);

        let outcome = match Action::parse(&action) {
            Some(action) => self.run(action, params).await,
            None => Err(ExError::new(ExErrorKind::UnknownAction)
                .with_op("dispatch")
                .with_message(format!("Unknown action: {}", action))),
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match &outcome {
            Ok(_) => {
                log_op_end!(
                    "dispatch",
                    duration_ms = duration_ms,
                    request_id = %id,
                    action = %action,
                );
            }
            Err(err) => {
                log_op_error!(
                    "dispatch",
                    err,
                    duration_ms = duration_ms,
                    request_id = %id,
                    action = %action,
                );
            }
        }

        Response::from_outcome(id, outcome)
    }

    async fn run(&self, action: Action, params: Params) -> Result<ActionResult> {
        let adapter = match &self.backend {
            Backend::Ready(adapter) => adapter,
            Backend::Unavailable(facade) => return facade.handle(action),
        };
        let mut adapter = adapter.lock().await;

        let result = match action {
            Action::Init => ActionResult::Ack(adapter.init().await?.into()),
            Action::Open => {
                let outcome = adapter.open(params.path.as_deref()).await?;
                if let Some(warning) = outcome.warning {
                    tracing::warn!(database = adapter.database(), "{}", warning);
                }
                ActionResult::Flag(true)
            }
            Action::Exec => {
                let sql = params.sql.as_deref().ok_or_else(|| missing(action, "sql"))?;
                ActionResult::Rows(adapter.exec(sql, params.args.as_ref())?)
            }
            Action::Close => ActionResult::Flag(adapter.close()),
            Action::Export => ActionResult::Blob(adapter.export()?),
            Action::Import => {
                let data = params.data.ok_or_else(|| missing(action, "data"))?;
                adapter.restore(&data)?;
                ActionResult::Ack(Ack::ok())
            }
        };

        if action.persists() {
            if let Err(err) = adapter.persist().await {
                tracing::warn!(
                    action = %action,
                    database = adapter.database(),
                    error = %err,
                    "snapshot persist failed; in-memory state is ahead of storage"
                );
            }
        }

        Ok(result)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("degraded", &self.is_degraded())
            .finish_non_exhaustive()
    }
}

fn missing(action: Action, field: &str) -> ExError {
    ExError::new(ExErrorKind::InvalidParams)
        .with_op(action.as_str())
        .with_message(format!("params.{} is required", field))
}
