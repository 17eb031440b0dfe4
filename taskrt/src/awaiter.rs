//! Reified suspension points.
//!
//! An `Awaiter` is a small [`Future`] that a process body `.await`s to
//! yield control back to the scheduler. Unlike a typical executor's
//! future, an `Awaiter` carries the name of the queue it wants to be
//! polled on next (`target_queue`) and consults the owning process's
//! pending signal before ever calling the caller-supplied readiness
//! predicate. There is no real wake mechanism: the scheduler drives
//! everything by polling with a no-op [`std::task::Waker`] once per tick
//! and reading back the queue each awaiter wrote into a shared cell.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::task::{Context, Poll};

use crate::process::{QueueTag, SignalCell};
use crate::signal::{SIG_INTERRUPT, SIG_NONE, SIG_TERMINATE};

/// The result a resumed process observes from the awaiter it just
/// finished waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwaiterResult {
    Success,
    SignalInterrupt,
    SignalTerminate,
    EndOfStream,
    UnknownError,
}

/// A suspension point. `F` is the readiness predicate: it returns `None`
/// while the process should keep waiting, or `Some(result)` once it's
/// ready to resume.
pub struct Awaiter<F> {
    queue_tag: QueueTag,
    target_queue: String,
    signal: SignalCell,
    predicate: F,
}

impl<F> Awaiter<F>
where
    F: FnMut() -> Option<AwaiterResult>,
{
    pub(crate) fn new(queue_tag: QueueTag, target_queue: impl Into<String>, signal: SignalCell, predicate: F) -> Self {
        Awaiter {
            queue_tag,
            target_queue: target_queue.into(),
            signal,
            predicate,
        }
    }
}

impl<F> Future for Awaiter<F>
where
    F: FnMut() -> Option<AwaiterResult> + Unpin,
{
    type Output = AwaiterResult;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<AwaiterResult> {
        *self.queue_tag.lock().unwrap() = self.target_queue.clone();

        // Signals short-circuit the predicate entirely: a process about
        // to be resumed for a reason of its own never gets the chance to
        // mask an interrupt or terminate request.
        let pending = self.signal.load(Ordering::SeqCst);
        if pending == SIG_INTERRUPT {
            self.signal.store(SIG_NONE, Ordering::SeqCst);
            return Poll::Ready(AwaiterResult::SignalInterrupt);
        }
        if pending == SIG_TERMINATE {
            self.signal.store(SIG_NONE, Ordering::SeqCst);
            return Poll::Ready(AwaiterResult::SignalTerminate);
        }

        match (self.predicate)() {
            Some(result) => Poll::Ready(result),
            None => Poll::Pending,
        }
    }
}

/// Builds a [`Context`] backed by a waker that does nothing. The
/// scheduler re-polls every pending task once per tick regardless of
/// whether a waker ever fires, so there is nothing useful for it to do.
pub(crate) fn noop_context() -> Context<'static> {
    Context::from_waker(futures_util::task::noop_waker_ref())
}
