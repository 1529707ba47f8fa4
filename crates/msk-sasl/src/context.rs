//! Per-call context threaded through `begin` and `step`.
//!
//! The broker host is connection-scoped while a mechanism may be built before
//! the host is known, so the transport passes it with every call inside a
//! [`SaslContext`]. The same context carries cooperative cancellation and an
//! optional deadline, which bound the credential retrieval and signing work
//! done inside a step.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{SaslError, SaslResult};

/// Connection metadata supplied by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaslMetadata {
    /// Broker host name, without port.
    pub host: String,
    /// Broker port, when known.
    pub port: Option<u16>,
}

impl SaslMetadata {
    /// Create metadata for a broker host.
    #[must_use]
    pub fn new(host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// Create a linked cancellation handle and signal.
///
/// # Examples
///
/// ```
/// use msk_sasl::cancellation_pair;
///
/// let (handle, signal) = cancellation_pair();
/// assert!(!signal.is_cancelled());
/// handle.cancel();
/// assert!(signal.is_cancelled());
/// ```
#[must_use]
pub fn cancellation_pair() -> (CancelHandle, CancellationSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), CancellationSignal(rx))
}

/// Triggers cancellation of every context holding the paired signal.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    /// Cancel. Idempotent.
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Observes a [`CancelHandle`].
#[derive(Debug, Clone)]
pub struct CancellationSignal(watch::Receiver<bool>);

impl CancellationSignal {
    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolve once cancellation is requested; never resolves if the handle
    /// is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.0.clone();
        let cancelled = rx.wait_for(|c| *c).await.is_ok();
        if !cancelled {
            std::future::pending::<()>().await;
        }
    }
}

/// Context for one `begin` or `step` call.
#[derive(Debug, Clone, Default)]
pub struct SaslContext {
    metadata: Option<SaslMetadata>,
    cancellation: Option<CancellationSignal>,
    deadline: Option<Instant>,
}

impl SaslContext {
    /// An empty context: no metadata, no cancellation, no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach connection metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: SaslMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Attach a cancellation signal.
    #[must_use]
    pub fn with_cancellation(mut self, signal: CancellationSignal) -> Self {
        self.cancellation = Some(signal);
        self
    }

    /// Attach an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Attach a deadline `timeout` from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Connection metadata, if the transport supplied it.
    #[must_use]
    pub fn metadata(&self) -> Option<&SaslMetadata> {
        self.metadata.as_ref()
    }

    /// Whether the context has been cancelled or its deadline has passed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationSignal::is_cancelled)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Run `operation`, aborting it on cancellation or deadline.
    ///
    /// Errors from `operation` are converted into [`SaslError`] without
    /// additional wrapping.
    pub async fn run<T, E, F>(&self, operation: F) -> SaslResult<T>
    where
        F: Future<Output = Result<T, E>>,
        SaslError: From<E>,
    {
        let cancelled = async {
            match &self.cancellation {
                Some(signal) => signal.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            () = cancelled => Err(SaslError::Cancelled),
            () = expired => Err(SaslError::DeadlineExceeded),
            result = operation => result.map_err(SaslError::from),
        }
    }
}
