//! The process record and the handle task bodies use to talk back to the
//! runtime that owns them.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::awaiter::{Awaiter, AwaiterResult};
use crate::pid::Pid;
use crate::signal::{Signal, SIG_NONE};
use crate::stream::{CheckResult, GetResult, Stream};
use crate::runtime::Shared;

/// Per-process cell an [`Awaiter`] writes into on every poll, naming the
/// queue it should be resumed on next. Read by the scheduler after a
/// `Poll::Pending` to decide where to requeue the task.
pub(crate) type QueueTag = Arc<Mutex<String>>;

/// Per-process cell carrying the last signal delivered and not yet
/// observed.
pub(crate) type SignalCell = Arc<AtomicI32>;

/// A boxed, type-erased process body. Its output is the process's exit
/// code.
pub type TaskFuture = Pin<Box<dyn Future<Output = i32> + Send>>;

pub(crate) type SignalHandler = Arc<dyn Fn(&Shared, Pid, Signal) + Send + Sync>;

pub(crate) struct ProcessRecord {
    pub pid: Pid,
    pub parent: Pid,
    pub children: HashSet<Pid>,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub stdin: Stream,
    pub stdout: Stream,
    pub queue_tag: QueueTag,
    pub last_signal: SignalCell,
    pub exit_code: Arc<Mutex<Option<i32>>>,
    pub is_complete: bool,
    pub force_terminate: bool,
    pub should_remove: bool,
    pub has_been_signaled: Arc<AtomicBool>,
    pub signal_handler: SignalHandler,
}

impl ProcessRecord {
    pub fn is_running(&self) -> bool {
        !self.is_complete && !self.should_remove
    }
}

/// The default signal handler every process starts with: forward the
/// signal to every child, recursively triggering their own handlers in
/// turn via [`crate::Runtime::signal`].
pub(crate) fn propagate_to_children(shared: &Shared, pid: Pid, sig: Signal) {
    let children: Vec<Pid> = {
        let inner = shared.lock().unwrap();
        match inner.processes.get(&pid) {
            Some(p) => p.children.iter().copied().collect(),
            None => return,
        }
    };
    for child in children {
        crate::runtime::deliver_signal(shared, child, sig);
    }
}

/// Handle passed into a process body's task factory. This is the only
/// way task code talks back to the runtime: it can read its own
/// args/env/streams, spawn children, and build the standard awaiters.
#[derive(Clone)]
pub struct TaskCtx {
    pub(crate) shared: Shared,
    pub(crate) pid: Pid,
    pub(crate) queue_tag: QueueTag,
    pub(crate) last_signal: SignalCell,
    pub(crate) stdin: Stream,
    pub(crate) stdout: Stream,
    pub(crate) args: Vec<String>,
    pub(crate) env: HashMap<String, String>,
}

impl TaskCtx {
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    pub fn stdin(&self) -> Stream {
        self.stdin.clone()
    }

    pub fn stdout(&self) -> Stream {
        self.stdout.clone()
    }

    pub fn clear_signal(&self) {
        self.last_signal.store(SIG_NONE, Ordering::SeqCst);
    }

    pub fn last_signal(&self) -> Signal {
        self.last_signal.load(Ordering::SeqCst)
    }

    /// Spawns `exec` as a child of this process.
    pub fn spawn(&self, exec: crate::command::Exec) -> Pid {
        crate::runtime::sub_spawn(&self.shared, exec, self.pid)
    }

    /// Resolves after exactly one scheduler sweep: `Pending` the first
    /// time it's polled, ready on the next.
    pub fn yield_now(&self) -> Awaiter<impl FnMut() -> Option<AwaiterResult>> {
        let mut polled_once = false;
        let queue = self.queue_tag.lock().unwrap().clone();
        Awaiter::new(self.queue_tag.clone(), queue, self.last_signal.clone(), move || {
            if polled_once {
                Some(AwaiterResult::Success)
            } else {
                polled_once = true;
                None
            }
        })
    }

    /// Resolves once the wall clock passes `deadline` from now.
    pub fn yield_for(&self, duration: Duration) -> Awaiter<impl FnMut() -> Option<AwaiterResult>> {
        let deadline = Instant::now() + duration;
        let queue = self.queue_tag.lock().unwrap().clone();
        Awaiter::new(self.queue_tag.clone(), queue, self.last_signal.clone(), move || {
            if Instant::now() >= deadline {
                Some(AwaiterResult::Success)
            } else {
                None
            }
        })
    }

    /// Resolves on the next poll performed while this task is queued on
    /// `queue_name`, letting a task migrate to a different named queue
    /// (e.g. a background worker queue) for its next step.
    pub fn yield_on(&self, queue_name: impl Into<String>) -> Awaiter<impl FnMut() -> Option<AwaiterResult>> {
        let mut polled_once = false;
        Awaiter::new(self.queue_tag.clone(), queue_name, self.last_signal.clone(), move || {
            if polled_once {
                Some(AwaiterResult::Success)
            } else {
                polled_once = true;
                None
            }
        })
    }

    /// Resolves once `stream` has at least one byte buffered, or reports
    /// `EndOfStream` once the stream is closed (explicitly or implicitly
    /// via its refcount).
    pub fn has_data(&self, stream: &Stream) -> Awaiter<impl FnMut() -> Option<AwaiterResult>> {
        let stream = stream.clone();
        let queue = self.queue_tag.lock().unwrap().clone();
        Awaiter::new(self.queue_tag.clone(), queue, self.last_signal.clone(), move || {
            match stream.check() {
                CheckResult::HasData => Some(AwaiterResult::Success),
                CheckResult::EndOfStream => Some(AwaiterResult::EndOfStream),
                CheckResult::Empty => None,
            }
        })
    }

    /// Reads one line (newline stripped) from `stream` into `buf`,
    /// resolving once a full line is available or the stream has closed.
    /// Keeps waiting (never resolves) while the stream is open and empty
    /// — bytes gathered so far stay in `buf` across polls, the same way
    /// [`Stream::read_line`]'s own drain loop does, but without reporting
    /// a false "line" on every single poll.
    pub fn read_line<'a>(
        &self,
        stream: &Stream,
        buf: &'a mut Vec<u8>,
    ) -> Awaiter<impl FnMut() -> Option<AwaiterResult> + 'a> {
        let stream = stream.clone();
        buf.clear();
        let queue = self.queue_tag.lock().unwrap().clone();
        Awaiter::new(self.queue_tag.clone(), queue, self.last_signal.clone(), move || loop {
            match stream.get() {
                GetResult::Success(b) => {
                    if b == b'\n' {
                        return Some(AwaiterResult::Success);
                    }
                    buf.push(b);
                }
                GetResult::Empty => return None,
                GetResult::EndOfStream => return Some(AwaiterResult::EndOfStream),
            }
        })
    }

    /// Resolves once every pid in `pids` has finished running.
    pub fn finished(&self, pids: impl Into<Vec<Pid>>) -> Awaiter<impl FnMut() -> Option<AwaiterResult>> {
        let pids = pids.into();
        let shared = self.shared.clone();
        let queue = self.queue_tag.lock().unwrap().clone();
        Awaiter::new(self.queue_tag.clone(), queue, self.last_signal.clone(), move || {
            let inner = shared.lock().unwrap();
            let all_done = pids.iter().all(|p| {
                inner
                    .processes
                    .get(p)
                    .map(|proc_| !proc_.is_running())
                    .unwrap_or(true)
            });
            if all_done {
                Some(AwaiterResult::Success)
            } else {
                None
            }
        })
    }
}
