//! The execution context
//!
//! A worker is one OS thread running a current-thread tokio runtime with a
//! `LocalSet`: a single logical thread of control that interleaves only at
//! await points. The host talks to it exclusively through two unbounded
//! channels; nothing else is shared.

use crate::dispatcher::Dispatcher;
use crate::loader::{BundledSqlite, EngineLoader};
use futures::FutureExt;
use sqlbridge_core::config::BridgeConfig;
use sqlbridge_core::errors::{ExError, ExErrorKind, Result};
use sqlbridge_core::protocol::{Request, Response};
use sqlbridge_core_types::ContextId;
use sqlbridge_store::{open_backend, KvBackend, SnapshotStore};
use std::panic::AssertUnwindSafe;
use std::rc::Rc;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::LocalSet;

/// Host side of the context's message channels
///
/// Dropping `requests` shuts the context down once in-flight requests have
/// been answered.
#[derive(Debug)]
pub struct WorkerPort {
    pub requests: UnboundedSender<Request>,
    pub responses: UnboundedReceiver<Response>,
}

/// Owns the worker thread
#[derive(Debug)]
pub struct WorkerHandle {
    context_id: ContextId,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn context_id(&self) -> &ContextId {
        &self.context_id
    }

    /// Wait for the worker thread to finish
    ///
    /// Only returns once the request sender has been dropped.
    pub fn join(self) -> Result<()> {
        self.thread.join().map_err(|_| {
            ExError::new(ExErrorKind::Internal)
                .with_op("join_worker")
                .with_message(format!("worker {} panicked", self.context_id))
        })
    }
}

/// Builder for one execution context
pub struct Worker {
    config: BridgeConfig,
    loader: Box<dyn EngineLoader>,
    backend: Option<Arc<dyn KvBackend>>,
}

impl Worker {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            loader: Box::new(BundledSqlite),
            backend: None,
        }
    }

    /// Replace the engine loader (the bundled SQLite by default)
    pub fn with_loader(mut self, loader: impl EngineLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    /// Use `backend` for snapshots instead of the one named by the config
    pub fn with_backend(mut self, backend: Arc<dyn KvBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Start the context on its own thread
    ///
    /// Fails only when the config is invalid or the thread or runtime cannot
    /// be created. An engine that fails to load is reported through the
    /// replies, not here.
    pub fn spawn(self) -> Result<(WorkerPort, WorkerHandle)> {
        let Worker {
            config,
            loader,
            backend,
        } = self;
        config.validate()?;

        let backend = backend.unwrap_or_else(|| open_backend(&config.storage));
        let store = SnapshotStore::new(backend, config.container.clone()).with_policy(config.persist);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                ExError::new(ExErrorKind::Internal)
                    .with_op("spawn_worker")
                    .with_message(format!("failed to build runtime: {}", e))
            })?;

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let context_id = ContextId::new();
        let thread_context_id = context_id.clone();
        let database = config.database.clone();

        let thread = std::thread::Builder::new()
            .name(config.worker_name.clone())
            .spawn(move || {
                let span = tracing::info_span!("context", context_id = %thread_context_id);
                let _entered = span.enter();

                let dispatcher = Rc::new(Dispatcher::bootstrap(loader.as_ref(), store, &database));
                let local = LocalSet::new();
                local.spawn_local(serve(dispatcher, request_rx, response_tx));
                runtime.block_on(local);

                tracing::debug!("context stopped");
            })
            .map_err(|e| {
                ExError::new(ExErrorKind::Internal)
                    .with_op("spawn_worker")
                    .with_message(format!("failed to start worker thread: {}", e))
            })?;

        tracing::debug!(context_id = %context_id, worker = %config.worker_name, "context started");

        Ok((
            WorkerPort {
                requests: request_tx,
                responses: response_rx,
            },
            WorkerHandle { context_id, thread },
        ))
    }
}

/// Receive requests in arrival order and answer each from its own local task
async fn serve(
    dispatcher: Rc<Dispatcher>,
    mut requests: UnboundedReceiver<Request>,
    responses: UnboundedSender<Response>,
) {
    while let Some(request) = requests.recv().await {
        let dispatcher = Rc::clone(&dispatcher);
        let responses = responses.clone();

        tokio::task::spawn_local(async move {
            let id = request.id.clone();
            let response = match AssertUnwindSafe(dispatcher.handle(request))
                .catch_unwind()
                .await
            {
                Ok(response) => response,
                Err(_) => {
                    tracing::error!(request_id = %id, "request handler panicked");
                    Response::from_outcome(
                        id.clone(),
                        Err(ExError::new(ExErrorKind::Internal)
                            .with_op("dispatch")
                            .with_message("request handler panicked")),
                    )
                }
            };

            if responses.send(response).is_err() {
                tracing::debug!(request_id = %id, "reply discarded, host went away");
            }
        });
    }
}
