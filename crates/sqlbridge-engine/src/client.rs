//! Caller side of an execution context
//!
//! `BridgeClient` wraps a [`WorkerPort`]: it tags every request, keeps a
//! oneshot per in-flight id and runs a router task that hands each reply to
//! whoever is waiting for that id. Replies may arrive in any order.

use crate::worker::{Worker, WorkerHandle, WorkerPort};
use sqlbridge_core::config::BridgeConfig;
use sqlbridge_core::errors::{ExError, ExErrorKind, Result};
use sqlbridge_core::protocol::{Ack, Action, ActionResult, ExecResult, Params, Request, Response};
use sqlbridge_core_types::RequestId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

type Pending = Arc<Mutex<HashMap<RequestId, oneshot::Sender<Response>>>>;

pub struct BridgeClient {
    requests: UnboundedSender<Request>,
    pending: Pending,
    router: JoinHandle<()>,
}

impl BridgeClient {
    /// Attach to a running context
    ///
    /// Must be called from within a tokio runtime; the reply router is
    /// spawned onto it.
    pub fn new(port: WorkerPort) -> Self {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let router = tokio::spawn(route(port.responses, Arc::clone(&pending)));
        Self {
            requests: port.requests,
            pending,
            router,
        }
    }

    /// Start a context for `config` and attach to it
    pub fn spawn(config: BridgeConfig) -> Result<(Self, WorkerHandle)> {
        let (port, handle) = Worker::new(config).spawn()?;
        Ok((Self::new(port), handle))
    }

    /// Send a prepared request and wait for its reply
    ///
    /// The id must not belong to another request still in flight.
    pub async fn send(&self, request: Request) -> Result<Response> {
        let id = request.id.clone();
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = lock(&self.pending);
            if pending.contains_key(&id) {
                return Err(ExError::new(ExErrorKind::InvalidParams)
                    .with_op("send")
                    .with_request_id(id)
                    .with_message("request id is already in flight"));
            }
            pending.insert(id.clone(), tx);
        }

        if self.requests.send(request).is_err() {
            lock(&self.pending).remove(&id);
            return Err(terminated(id));
        }

        rx.await.map_err(|_| terminated(id))
    }

    /// Run `action` under a fresh request id
    pub async fn call(&self, action: Action, params: Params) -> Result<ActionResult> {
        self.send(Request::new(RequestId::new(), action, params))
            .await?
            .into_result()
    }

    pub async fn init(&self) -> Result<Ack> {
        match self.call(Action::Init, Params::default()).await? {
            ActionResult::Ack(ack) => Ok(ack),
            other => Err(unexpected(Action::Init, &other)),
        }
    }

    pub async fn open(&self, path: Option<&str>) -> Result<bool> {
        let params = path.map(Params::path).unwrap_or_default();
        match self.call(Action::Open, params).await? {
            ActionResult::Flag(flag) => Ok(flag),
            other => Err(unexpected(Action::Open, &other)),
        }
    }

    pub async fn exec(&self, sql: &str, args: Option<serde_json::Value>) -> Result<ExecResult> {
        let mut params = Params::sql(sql);
        params.args = args;
        match self.call(Action::Exec, params).await? {
            ActionResult::Rows(rows) => Ok(rows),
            other => Err(unexpected(Action::Exec, &other)),
        }
    }

    pub async fn close(&self) -> Result<bool> {
        match self.call(Action::Close, Params::default()).await? {
            ActionResult::Flag(flag) => Ok(flag),
            other => Err(unexpected(Action::Close, &other)),
        }
    }

    pub async fn export(&self) -> Result<Vec<u8>> {
        match self.call(Action::Export, Params::default()).await? {
            ActionResult::Blob(blob) => Ok(blob),
            other => Err(unexpected(Action::Export, &other)),
        }
    }

    pub async fn import(&self, data: Vec<u8>) -> Result<Ack> {
        match self.call(Action::Import, Params::data(data)).await? {
            ActionResult::Ack(ack) => Ok(ack),
            other => Err(unexpected(Action::Import, &other)),
        }
    }
}

impl Drop for BridgeClient {
    fn drop(&mut self) {
        self.router.abort();
    }
}

impl std::fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeClient")
            .field("in_flight", &lock(&self.pending).len())
            .finish_non_exhaustive()
    }
}

/// Deliver replies to their waiters until the context stops replying
async fn route(mut responses: UnboundedReceiver<Response>, pending: Pending) {
    while let Some(response) = responses.recv().await {
        let waiter = lock(&pending).remove(response.id());
        match waiter {
            Some(tx) => {
                if tx.send(response).is_err() {
                    tracing::debug!("reply dropped, caller stopped waiting");
                }
            }
            None => tracing::warn!(request_id = %response.id(), "reply for unknown request id"),
        }
    }

    // Dropping the senders wakes every remaining waiter with an error
    lock(&pending).clear();
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn terminated(id: RequestId) -> ExError {
    ExError::new(ExErrorKind::ContextTerminated)
        .with_op("send")
        .with_request_id(id)
        .with_message("execution context is no longer running")
}

fn unexpected(action: Action, result: &ActionResult) -> ExError {
    ExError::new(ExErrorKind::Internal)
        .with_op(action.as_str())
        .with_message(format!("unexpected result shape: {:?}", result))
}
