/*!
 * Per-device request queue.
 *
 * A [`RequestQueue`] lets at most one request per controller be in flight.
 * Requests are granted in the order they were accepted. Every accepted
 * request's continuation receives a [`QueueSlot`]; releasing the slot with
 * [`QueueSlot::done`] hands the connection to the next pending request,
 * optionally after a cooldown.
 *
 * Continuations never run inside [`RequestQueue::add`]. An immediate grant
 * is spawned as a separate task that waits until the caller drops the
 * returned [`Admission`], so the caller's own bookkeeping is finished before
 * the request starts on any runtime flavor.
 */
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn, Instrument};

use pacflow_core::config::{OverflowPolicy, QueueConfig};
use pacflow_core::logging::component_span;
use pacflow_core::types::Id;

type Continuation = Box<dyn FnOnce(QueueSlot) -> BoxFuture<'static, ()> + Send>;

/// Returned when a request cannot be accepted
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Queue is full ({max_length} pending requests)")]
pub struct QueueFull {
    /// Configured maximum number of pending requests
    pub max_length: usize,
}

/// The outcome of a successful [`RequestQueue::add`].
///
/// When the request was granted right away, its continuation starts once
/// the admission is dropped. Do not hold it across an await on that
/// continuation.
#[derive(Debug)]
pub struct Admission {
    /// Requests of the same owner still waiting, not counting one that was
    /// granted immediately
    pub queued: usize,
    /// Whether the request was granted the connection right away
    pub started: bool,
    start: Option<oneshot::Sender<()>>,
}

impl Drop for Admission {
    fn drop(&mut self) {
        if let Some(start) = self.start.take() {
            let _ = start.send(());
        }
    }
}

struct QueuedRequest {
    owner: Id,
    token: u64,
    continuation: Continuation,
}

#[derive(Debug, Clone)]
struct Current {
    owner: Id,
    token: u64,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<QueuedRequest>,
    current: Option<Current>,
    per_owner: HashMap<Id, usize>,
    next_token: u64,
}

impl QueueState {
    fn decrement(&mut self, owner: &Id) -> usize {
        match self.per_owner.get_mut(owner) {
            Some(count) if *count > 1 => {
                *count -= 1;
                *count
            }
            Some(_) => {
                self.per_owner.remove(owner);
                0
            }
            None => 0,
        }
    }
}

struct QueueInner {
    label: String,
    max_length: usize,
    overflow: OverflowPolicy,
    state: Mutex<QueueState>,
}

/// A FIFO queue that serializes requests to one controller
#[derive(Clone)]
pub struct RequestQueue {
    inner: Arc<QueueInner>,
}

impl fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("RequestQueue")
            .field("label", &self.inner.label)
            .field("max_length", &self.inner.max_length)
            .field("overflow", &self.inner.overflow)
            .field("pending", &state.pending.len())
            .field("current", &state.current.as_ref().map(|c| &c.owner))
            .finish()
    }
}

impl RequestQueue {
    /// Create a queue holding at most `max_length` pending requests
    pub fn new<S: Into<String>>(label: S, max_length: usize, overflow: OverflowPolicy) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                label: label.into(),
                max_length,
                overflow,
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// Create a queue from the `[queue]` configuration section
    pub fn from_config<S: Into<String>>(label: S, config: &QueueConfig) -> Self {
        Self::new(label, config.max_length, config.overflow)
    }

    /// Accept a request for `owner`.
    ///
    /// `task` runs once the request reaches the head of the queue. It must
    /// release the [`QueueSlot`] it is given when its exchange with the
    /// controller has settled.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn add<F, Fut>(&self, owner: &Id, task: F) -> Result<Admission, QueueFull>
    where
        F: FnOnce(QueueSlot) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let continuation: Continuation = Box::new(move |slot| task(slot).boxed());

        let mut state = self.lock();

        if state.pending.len() >= self.inner.max_length {
            match self.inner.overflow {
                OverflowPolicy::RejectNew => {
                    debug!(queue = %self.inner.label, owner = %owner, "Queue full, request rejected");
                    return Err(QueueFull {
                        max_length: self.inner.max_length,
                    });
                }
                OverflowPolicy::DropOldest => match state.pending.pop_front() {
                    Some(evicted) => {
                        state.decrement(&evicted.owner);
                        warn!(
                            queue = %self.inner.label,
                            evicted = %evicted.owner,
                            "Queue full, oldest pending request dropped"
                        );
                    }
                    None => {
                        return Err(QueueFull {
                            max_length: self.inner.max_length,
                        })
                    }
                },
            }
        }

        let token = state.next_token;
        state.next_token += 1;

        let count = {
            let count = state.per_owner.entry(owner.clone()).or_insert(0);
            *count += 1;
            *count
        };

        let request = QueuedRequest {
            owner: owner.clone(),
            token,
            continuation,
        };

        if state.current.is_none() {
            state.current = Some(Current {
                owner: owner.clone(),
                token,
            });
            drop(state);

            trace!(queue = %self.inner.label, owner = %owner, "Request granted immediately");
            let (start, gate) = oneshot::channel();
            self.schedule(request, Duration::ZERO, Some(gate));

            Ok(Admission {
                queued: count - 1,
                started: true,
                start: Some(start),
            })
        } else {
            state.pending.push_back(request);
            trace!(queue = %self.inner.label, owner = %owner, pending = state.pending.len(), "Request queued");

            Ok(Admission {
                queued: count,
                started: false,
                start: None,
            })
        }
    }

    /// Release the request currently in flight.
    ///
    /// The next pending request, if any, starts after `delay`. Returns how
    /// many requests of the released request's owner remain queued. Calling
    /// this while nothing is in flight does nothing and returns 0.
    pub fn done(&self, delay: Duration) -> usize {
        self.release(None, delay)
    }

    /// Drop every pending request; the one in flight is unaffected.
    ///
    /// Returns how many requests were dropped.
    pub fn dump(&self) -> usize {
        let mut state = self.lock();
        let dropped: Vec<QueuedRequest> = state.pending.drain(..).collect();
        for request in &dropped {
            state.decrement(&request.owner);
        }
        drop(state);

        if !dropped.is_empty() {
            debug!(queue = %self.inner.label, dropped = dropped.len(), "Pending requests dumped");
        }
        dropped.len()
    }

    /// Owner of the request currently in flight
    pub fn current_owner(&self) -> Option<Id> {
        self.lock().current.as_ref().map(|c| c.owner.clone())
    }

    /// Whether a request is in flight
    pub fn is_busy(&self) -> bool {
        self.lock().current.is_some()
    }

    /// Number of pending requests, excluding the one in flight
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Number of accepted, not yet released requests of `owner`
    pub fn queued_for(&self, owner: &Id) -> usize {
        self.lock().per_owner.get(owner).copied().unwrap_or(0)
    }

    /// Configured maximum number of pending requests
    pub fn max_length(&self) -> usize {
        self.inner.max_length
    }

    fn release(&self, token: Option<u64>, delay: Duration) -> usize {
        let mut state = self.lock();

        let current = match state.current.take() {
            Some(current) if token.map_or(true, |t| t == current.token) => current,
            other => {
                state.current = other;
                drop(state);
                warn!(queue = %self.inner.label, "Release without a matching request in flight");
                return 0;
            }
        };

        let remaining = state.decrement(&current.owner);

        let next = state.pending.pop_front();
        if let Some(next) = &next {
            state.current = Some(Current {
                owner: next.owner.clone(),
                token: next.token,
            });
        }
        drop(state);

        if let Some(next) = next {
            trace!(queue = %self.inner.label, owner = %next.owner, delay_ms = delay.as_millis() as u64, "Advancing queue");
            self.schedule(next, delay, None);
        }

        remaining
    }

    fn schedule(&self, request: QueuedRequest, delay: Duration, gate: Option<oneshot::Receiver<()>>) {
        let slot = QueueSlot {
            queue: self.clone(),
            owner: request.owner,
            token: request.token,
            released: false,
        };
        let continuation = request.continuation;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let span = component_span("queue", Some(self.inner.label.as_str()));
                handle.spawn(
                    async move {
                        if let Some(gate) = gate {
                            // Resolves when the admission is dropped.
                            let _ = gate.await;
                        }
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        continuation(slot).await;
                    }
                    .instrument(span),
                );
            }
            Err(_) => {
                // Dropping the slot here would recurse into the next request.
                warn!(queue = %self.inner.label, "No runtime available, request dropped");
                let mut slot = slot;
                slot.released = true;
                let mut state = self.lock();
                state.current = None;
                state.decrement(&slot.owner);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// The right to talk to the controller, held by the request in flight.
///
/// Dropping a slot without calling [`QueueSlot::done`] releases it with no
/// cooldown.
pub struct QueueSlot {
    queue: RequestQueue,
    owner: Id,
    token: u64,
    released: bool,
}

impl QueueSlot {
    /// Owner of the request holding the slot
    pub fn owner(&self) -> &Id {
        &self.owner
    }

    /// Release the slot; the next request starts after `delay`.
    ///
    /// Returns how many requests of this slot's owner remain queued.
    pub fn done(mut self, delay: Duration) -> usize {
        self.released = true;
        self.queue.release(Some(self.token), delay)
    }
}

impl fmt::Debug for QueueSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueSlot")
            .field("owner", &self.owner)
            .field("token", &self.token)
            .finish()
    }
}

impl Drop for QueueSlot {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            self.queue.release(Some(self.token), Duration::ZERO);
        }
    }
}
