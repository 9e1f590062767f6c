//! Server management - binding, serving and releasing an app's listener

use axum::Router;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{WebError, WebResult};

/// How long `close` waits for in-flight connections before aborting
const CLOSE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerEvent {
    Opened { port: u16 },
    Closed { port: u16 },
}

/// Shared log of server lifecycle events
#[derive(Debug, Clone, Default)]
pub struct ServerEvents {
    inner: Arc<Mutex<Vec<ServerEvent>>>,
}

impl ServerEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: ServerEvent) {
        self.inner.lock().push(event);
    }

    pub fn snapshot(&self) -> Vec<ServerEvent> {
        self.inner.lock().clone()
    }

    pub fn opened(&self) -> usize {
        self.inner
            .lock()
            .iter()
            .filter(|e| matches!(e, ServerEvent::Opened { .. }))
            .count()
    }

    pub fn closed(&self) -> usize {
        self.inner
            .lock()
            .iter()
            .filter(|e| matches!(e, ServerEvent::Closed { .. }))
            .count()
    }

    /// Number of servers opened but not yet closed
    pub fn open_now(&self) -> usize {
        self.opened() - self.closed()
    }
}

/// Handle to a listening server.
///
/// The listener is released by [`ServerHandle::close`]; dropping the handle
/// signals shutdown as well, so unwinding out of a test still frees the port.
pub struct ServerHandle {
    pub port: u16,
    pub base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    events: Option<ServerEvents>,
}

impl ServerHandle {
    /// Bind `127.0.0.1:<port>` and serve `router` in the background
    pub async fn bind(router: Router, port: u16, events: Option<ServerEvents>) -> WebResult<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|source| WebError::Bind { port, source })?;
        let port = listener.local_addr()?.port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let shutdown = async move {
                let _ = rx.await;
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!("Server on port {} stopped with error: {}", port, e);
            }
        });

        info!("Server listening on {}", base_url);
        if let Some(events) = &events {
            events.record(ServerEvent::Opened { port });
        }

        Ok(Self {
            port,
            base_url,
            shutdown: Some(tx),
            task: Some(task),
            events,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Stop accepting connections and wait for the server task to finish
    pub async fn close(mut self) {
        self.release();
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
                warn!("Server on port {} did not drain in {:?}, aborting", self.port, CLOSE_GRACE);
                task.abort();
            }
        }
    }

    fn release(&mut self) -> bool {
        let Some(tx) = self.shutdown.take() else {
            return false;
        };
        let _ = tx.send(());
        info!("Server on port {} closed", self.port);
        if let Some(events) = &self.events {
            events.record(ServerEvent::Closed { port: self.port });
        }
        true
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if self.release() {
            debug!("Server on port {} released on drop", self.port);
        }
    }
}
