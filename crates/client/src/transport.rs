//! Resilient connection management.
//!
//! The transport owns one logical connection and keeps it alive across
//! drops: connect, wait for the session to die, back off, reconnect.
//! Failures never surface as errors to consumers; they watch the
//! [`ConnectionStatus`] channel instead.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::error::Result;

/// Observable connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected { reason: Option<String> },
    Connecting { attempt: u32 },
    Connected,
}

/// Who the transport connects as.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub principal: String,
}

impl Credentials {
    /// Credentials for a principal.
    pub fn new(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
        }
    }
}

/// A live connection. Returned by a [`Connector`]; the transport holds it
/// until it reports closure.
#[async_trait]
pub trait Session: Send {
    /// Resolve when the connection drops, with the close reason.
    async fn closed(&mut self) -> String;
}

/// Connection factory seam. Production connectors dial the gateway; tests
/// inject fakes with scripted failures.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish one session.
    async fn connect(&self, credentials: &Credentials) -> Result<Box<dyn Session>>;
}

/// Reconnecting transport over a [`Connector`].
pub struct ResilientTransport {
    connector: Arc<dyn Connector>,
    credentials: Credentials,
    policy: BackoffPolicy,
    status_tx: watch::Sender<ConnectionStatus>,
}

impl ResilientTransport {
    /// Transport with the default backoff policy.
    pub fn new(connector: Arc<dyn Connector>, credentials: Credentials) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected { reason: None });
        Self {
            connector,
            credentials,
            policy: BackoffPolicy::default(),
            status_tx,
        }
    }

    /// Set the backoff policy.
    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Watch the connection status.
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// Drive the connection until the task is aborted.
    ///
    /// A successful connect resets the attempt counter, so backoff always
    /// restarts from the base delay after a healthy session. Without a
    /// principal the transport stays idle.
    pub async fn run(&self) {
        if self.credentials.principal.is_empty() {
            debug!("no principal, transport stays idle");
            return;
        }

        let mut attempt: u32 = 0;
        loop {
            let _ = self.status_tx.send(ConnectionStatus::Connecting { attempt });

            match self.connector.connect(&self.credentials).await {
                Ok(mut session) => {
                    info!(principal = %self.credentials.principal, "connected");
                    attempt = 0;
                    let _ = self.status_tx.send(ConnectionStatus::Connected);

                    let reason = session.closed().await;
                    warn!(%reason, "connection dropped");
                    let _ = self.status_tx.send(ConnectionStatus::Disconnected {
                        reason: Some(reason),
                    });
                }
                Err(e) => {
                    debug!(attempt, error = %e, "connect failed");
                    let _ = self.status_tx.send(ConnectionStatus::Disconnected {
                        reason: Some(e.to_string()),
                    });
                }
            }

            tokio::time::sleep(self.policy.delay(attempt)).await;
            attempt = attempt.saturating_add(1);
        }
    }
}

/// Process-wide reference-counted transport handle.
///
/// Many consumers (views, caches, background sync) share one connection.
/// The first [`acquire`](SharedTransport::acquire) starts the run loop;
/// the loop is only stopped when the last handle drops, so one consumer
/// going away never tears the connection down under the others.
pub struct SharedTransport {
    transport: Arc<ResilientTransport>,
    refs: AtomicUsize,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SharedTransport {
    /// Wrap a transport for shared use.
    pub fn new(transport: ResilientTransport) -> Arc<Self> {
        Arc::new(Self {
            transport: Arc::new(transport),
            refs: AtomicUsize::new(0),
            task: Mutex::new(None),
        })
    }

    /// Take a handle on the shared connection, starting it if this is the
    /// first consumer. Must be called from within a tokio runtime.
    pub fn acquire(self: &Arc<Self>) -> TransportHandle {
        if self.refs.fetch_add(1, Ordering::SeqCst) == 0 {
            let transport = self.transport.clone();
            let handle = tokio::spawn(async move { transport.run().await });
            *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        }
        TransportHandle {
            shared: self.clone(),
        }
    }

    /// Number of live handles.
    pub fn handle_count(&self) -> usize {
        self.refs.load(Ordering::SeqCst)
    }

    /// Whether the run loop is currently active.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }
}

/// One consumer's claim on the shared connection.
pub struct TransportHandle {
    shared: Arc<SharedTransport>,
}

impl TransportHandle {
    /// Watch the connection status.
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.transport.status()
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        if self.shared.refs.fetch_sub(1, Ordering::SeqCst) == 1 {
            let mut task = self
                .shared
                .task
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(task) = task.take() {
                debug!("last handle dropped, stopping transport");
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    use crate::error::TransportError;

    use super::*;

    /// Session that stays open until dropped by the test via a oneshot.
    struct FakeSession {
        drop_rx: Option<tokio::sync::oneshot::Receiver<String>>,
    }

    #[async_trait]
    impl Session for FakeSession {
        async fn closed(&mut self) -> String {
            match self.drop_rx.take() {
                Some(rx) => rx.await.unwrap_or_else(|_| "test ended".to_string()),
                None => "already closed".to_string(),
            }
        }
    }

    /// Connector that fails the first `failures` connects, then hands out
    /// sessions controlled by the test.
    struct FlakyConnector {
        failures: u32,
        calls: AtomicU32,
        sessions: Mutex<Vec<tokio::sync::oneshot::Receiver<String>>>,
    }

    impl FlakyConnector {
        fn new(failures: u32, sessions: Vec<tokio::sync::oneshot::Receiver<String>>) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                sessions: Mutex::new(sessions),
            }
        }
    }

    #[async_trait]
    impl Connector for FlakyConnector {
        async fn connect(&self, _credentials: &Credentials) -> Result<Box<dyn Session>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(TransportError::ConnectFailed("refused".to_string()));
            }
            let rx = self
                .sessions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop();
            match rx {
                Some(rx) => Ok(Box::new(FakeSession { drop_rx: Some(rx) })),
                None => Err(TransportError::ConnectFailed("no session".to_string())),
            }
        }
    }

    fn fast_policy() -> BackoffPolicy {
        BackoffPolicy::new(1, 4).with_jitter(0.0)
    }

    async fn wait_for(
        status: &mut watch::Receiver<ConnectionStatus>,
        want: ConnectionStatus,
    ) {
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if *status.borrow_and_update() == want {
                    return;
                }
                status.changed().await.unwrap();
            }
        })
        .await
        .expect("status reached in time");
    }

    #[tokio::test]
    async fn test_connects_and_reports_status() {
        let (_keep, rx) = tokio::sync::oneshot::channel();
        let connector = Arc::new(FlakyConnector::new(0, vec![rx]));
        let transport = Arc::new(
            ResilientTransport::new(connector, Credentials::new("u1")).with_policy(fast_policy()),
        );

        let mut status = transport.status();
        let task = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.run().await })
        };

        wait_for(&mut status, ConnectionStatus::Connected).await;
        task.abort();
    }

    #[tokio::test]
    async fn test_retries_after_connect_failures() {
        let (_keep, rx) = tokio::sync::oneshot::channel();
        let connector = Arc::new(FlakyConnector::new(3, vec![rx]));
        let transport = Arc::new(
            ResilientTransport::new(connector.clone(), Credentials::new("u1"))
                .with_policy(fast_policy()),
        );

        let mut status = transport.status();
        let task = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.run().await })
        };

        wait_for(&mut status, ConnectionStatus::Connected).await;
        assert_eq!(connector.calls.load(Ordering::SeqCst), 4);
        task.abort();
    }

    #[tokio::test]
    async fn test_reconnects_after_session_drop() {
        let (drop_first, first_rx) = tokio::sync::oneshot::channel();
        let (_keep_second, second_rx) = tokio::sync::oneshot::channel();
        // Sessions pop from the back.
        let connector = Arc::new(FlakyConnector::new(0, vec![second_rx, first_rx]));
        let transport = Arc::new(
            ResilientTransport::new(connector, Credentials::new("u1")).with_policy(fast_policy()),
        );

        let mut status = transport.status();
        let task = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.run().await })
        };

        wait_for(&mut status, ConnectionStatus::Connected).await;
        drop_first.send("server restart".to_string()).unwrap();
        wait_for(
            &mut status,
            ConnectionStatus::Disconnected {
                reason: Some("server restart".to_string()),
            },
        )
        .await;
        wait_for(&mut status, ConnectionStatus::Connected).await;
        task.abort();
    }

    #[tokio::test]
    async fn test_no_principal_stays_idle() {
        let connector = Arc::new(FlakyConnector::new(0, vec![]));
        let transport =
            ResilientTransport::new(connector.clone(), Credentials::default());

        transport.run().await; // returns immediately
        assert_eq!(connector.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shared_transport_refcounting() {
        let (_keep, rx) = tokio::sync::oneshot::channel();
        let connector = Arc::new(FlakyConnector::new(0, vec![rx]));
        let transport =
            ResilientTransport::new(connector, Credentials::new("u1")).with_policy(fast_policy());
        let shared = SharedTransport::new(transport);

        let first = shared.acquire();
        let second = shared.acquire();
        assert_eq!(shared.handle_count(), 2);
        assert!(shared.is_running());

        let mut status = first.status();
        wait_for(&mut status, ConnectionStatus::Connected).await;

        // One consumer going away keeps the connection up.
        drop(first);
        assert_eq!(shared.handle_count(), 1);
        assert!(shared.is_running());

        drop(second);
        assert_eq!(shared.handle_count(), 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!shared.is_running());
    }
}
