use futures::channel::oneshot;
use futures::future::Shared;
use futures::{Future, FutureExt};
use std::sync::{Arc, Mutex, PoisonError};

/// Shared, idempotent cancellation signal.
///
/// Clones observe the same signal. `cancel` fires it at most once; later calls are no-ops.
#[derive(Clone)]
pub(crate) struct CancelToken {
    trigger: Arc<Mutex<Option<oneshot::Sender<()>>>>,
    fired: Shared<oneshot::Receiver<()>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            trigger: Arc::new(Mutex::new(Some(tx))),
            fired: rx.shared(),
        }
    }

    /// Fire the token. Returns `true` only for the call that actually fired it.
    pub fn cancel(&self) -> bool {
        let sender = self
            .trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Resolves once the token fires.
    pub fn cancelled(&self) -> impl Future<Output = ()> + Unpin + 'static {
        self.fired.clone().map(|_| ())
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
