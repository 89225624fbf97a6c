//! One-shot state request promise.
//!
//! Single-consumer completion with callback registration: registering before
//! resolution is safe, registering after resolution fires the callback
//! immediately. Cancellation resolves waiters with `Cancelled`, which
//! handlers treat as a no-op.

use std::sync::{Arc, Mutex};
use strata_types::Output;

/// Terminal failure of a state request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolveError {
    /// The referenced state does not exist (final for this reference).
    StateNotFound,
    /// The referenced state exists but was already spent.
    AlreadySpent,
    /// The engine is shutting down.
    Cancelled,
}

type Completion = Result<Output, ResolveError>;
type Callback = Box<dyn FnOnce(&Completion) + Send>;

struct RequestInner {
    result: Option<Completion>,
    callbacks: Vec<Callback>,
}

/// A one-shot promise for a resolved ledger state.
#[derive(Clone)]
pub struct StateRequest {
    inner: Arc<Mutex<RequestInner>>,
}

impl StateRequest {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RequestInner {
                result: None,
                callbacks: Vec::new(),
            })),
        }
    }

    /// An already-resolved request.
    pub fn resolved(output: Output) -> Self {
        let request = Self::new();
        request.resolve(output);
        request
    }

    /// An already-failed request.
    pub fn failed(error: ResolveError) -> Self {
        let request = Self::new();
        request.reject(error);
        request
    }

    /// Complete the request successfully. Later completions are ignored.
    pub fn resolve(&self, output: Output) {
        self.complete(Ok(output));
    }

    /// Complete the request with a failure. Later completions are ignored.
    pub fn reject(&self, error: ResolveError) {
        self.complete(Err(error));
    }

    fn complete(&self, completion: Completion) {
        let callbacks = {
            let mut inner = self.inner.lock().expect("state request lock poisoned");
            if inner.result.is_some() {
                return;
            }
            inner.result = Some(completion.clone());
            std::mem::take(&mut inner.callbacks)
        };
        // Callbacks run outside the lock so they may touch the request.
        for callback in callbacks {
            callback(&completion);
        }
    }

    /// Register a completion handler; fires immediately if already complete.
    pub fn on_complete(&self, callback: impl FnOnce(&Completion) + Send + 'static) {
        let mut pending: Option<Callback> = Some(Box::new(callback));
        let ready = {
            let mut inner = self.inner.lock().expect("state request lock poisoned");
            match inner.result.clone() {
                Some(result) => Some(result),
                None => {
                    inner
                        .callbacks
                        .push(pending.take().expect("callback consumed once"));
                    None
                }
            }
        };
        if let Some(result) = ready {
            (pending.take().expect("callback consumed once"))(&result);
        }
    }

    /// The completion, if the request has finished.
    pub fn result(&self) -> Option<Completion> {
        self.inner
            .lock()
            .expect("state request lock poisoned")
            .result
            .clone()
    }

    pub fn is_complete(&self) -> bool {
        self.result().is_some()
    }
}

impl Default for StateRequest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use strata_types::{BlockId, OutputBody, OutputId, SlotIndex, TransactionId};

    fn output() -> Output {
        Output {
            output_id: OutputId::new(TransactionId::new([1u8; 32]), 0),
            block_id_booked_in: BlockId::ZERO,
            slot_booked: SlotIndex::new(1),
            slot_created: SlotIndex::new(1),
            body: OutputBody::basic(7),
        }
    }

    #[test]
    fn register_before_resolve() {
        let request = StateRequest::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        request.on_complete(move |result| {
            assert!(result.is_ok());
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        request.resolve(output());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn register_after_resolve_fires_immediately() {
        let request = StateRequest::resolved(output());
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        request.on_complete(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn first_completion_wins() {
        let request = StateRequest::new();
        request.reject(ResolveError::StateNotFound);
        request.resolve(output());
        assert_eq!(request.result(), Some(Err(ResolveError::StateNotFound)));
    }

    #[test]
    fn rejection_reaches_handlers() {
        let request = StateRequest::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        request.on_complete(move |result| {
            assert_eq!(*result, Err(ResolveError::Cancelled));
            h.fetch_add(1, Ordering::SeqCst);
        });
        request.reject(ResolveError::Cancelled);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
