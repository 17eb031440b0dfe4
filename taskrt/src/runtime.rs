//! The scheduler: named queues, the process table, and the command
//! registry, all owned by one `Runtime` value.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use tracing::{debug, instrument, trace, warn};

use crate::awaiter::noop_context;
use crate::command::Exec;
use crate::error::RuntimeError;
use crate::pid::{Pid, PidAllocator};
use crate::process::{propagate_to_children, ProcessRecord, SignalHandler, TaskCtx, TaskFuture};
use crate::signal::{Signal, SIG_INTERRUPT, SIG_NONE, SIG_TERMINATE};
use crate::stream::Stream;

/// Every process starts with the same handler (propagate to children);
/// built once rather than boxed fresh per spawn.
static DEFAULT_SIGNAL_HANDLER: Lazy<SignalHandler> = Lazy::new(|| Arc::new(propagate_to_children));

/// Name of the queue the scheduler reaps finished processes on. It is
/// the only queue permitted to finalize a process and the only one the
/// host is required to tick from a fixed, consistent thread.
pub const MAIN: &str = "MAIN";

pub(crate) type CommandFactory = Arc<dyn Fn(TaskCtx) -> TaskFuture + Send + Sync>;
pub(crate) type PreExecHook = Arc<dyn Fn(&mut Exec) + Send + Sync>;

struct QueueStorage {
    pop: VecDeque<(Pid, TaskFuture)>,
    push: VecDeque<(Pid, TaskFuture)>,
}

impl QueueStorage {
    fn new() -> Self {
        QueueStorage {
            pop: VecDeque::new(),
            push: VecDeque::new(),
        }
    }
}

pub(crate) struct Inner {
    pub(crate) processes: HashMap<Pid, ProcessRecord>,
    pid_alloc: PidAllocator,
    queues: HashMap<String, QueueStorage>,
    commands: HashMap<String, CommandFactory>,
    pre_exec: Option<PreExecHook>,
    main_thread: Option<ThreadId>,
}

impl Inner {
    fn new() -> Self {
        let mut queues = HashMap::new();
        queues.insert(MAIN.to_string(), QueueStorage::new());
        Inner {
            processes: HashMap::new(),
            pid_alloc: PidAllocator::new(),
            queues,
            commands: HashMap::new(),
            pre_exec: None,
            main_thread: None,
        }
    }

    fn assert_main_thread_context(&mut self) {
        let current = std::thread::current().id();
        match self.main_thread {
            Some(owner) if owner != current => {
                panic!("taskrt: process table mutated from a thread other than the one driving the MAIN queue");
            }
            Some(_) => {}
            None => self.main_thread = Some(current),
        }
    }
}

pub(crate) type Shared = Arc<Mutex<Inner>>;

/// Condition variable paired with a dirty flag, used by [`Runtime::bgrunner`]
/// worker threads to sleep between drains of their queue instead of
/// busy-polling.
struct WakeCell {
    mutex: Mutex<bool>,
    cv: Condvar,
}

impl WakeCell {
    fn new() -> Self {
        WakeCell {
            mutex: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn wake(&self) {
        let mut dirty = self.mutex.lock().unwrap();
        *dirty = true;
        self.cv.notify_all();
    }

    fn wait(&self) {
        let mut dirty = self.mutex.lock().unwrap();
        while !*dirty {
            dirty = self.cv.wait(dirty).unwrap();
        }
        *dirty = false;
    }
}

/// The scheduler, process table, and command registry for one embedded
/// instance of the system. Create exactly one per host program; there is
/// no global/ambient instance.
pub struct Runtime {
    shared: Shared,
    wakers: Mutex<HashMap<String, Arc<WakeCell>>>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Runtime {
            shared: Arc::new(Mutex::new(Inner::new())),
            wakers: Mutex::new(HashMap::new()),
        }
    }

    // -- command registry -------------------------------------------------

    pub fn register_command<F, Fut>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(TaskCtx) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = i32> + Send + 'static,
    {
        let mut inner = self.shared.lock().unwrap();
        inner
            .commands
            .insert(name.into(), Arc::new(move |ctx| Box::pin(factory(ctx))));
    }

    pub fn unregister_command(&self, name: &str) {
        self.shared.lock().unwrap().commands.remove(name);
    }

    pub fn clear_commands(&self) {
        self.shared.lock().unwrap().commands.clear();
    }

    pub fn set_pre_exec<F>(&self, hook: F)
    where
        F: Fn(&mut Exec) + Send + Sync + 'static,
    {
        self.shared.lock().unwrap().pre_exec = Some(Arc::new(hook));
    }

    // -- spawning -----------------------------------------------------------

    /// Splits a leading run of `NAME=VALUE` tokens into an environment map,
    /// leaving the remainder as argv.
    pub fn parse_args(tokens: &[String]) -> (HashMap<String, String>, Vec<String>) {
        let mut env = HashMap::new();
        let mut i = 0;
        while i < tokens.len() {
            match tokens[i].split_once('=') {
                Some((k, v)) if !k.is_empty() => {
                    env.insert(k.to_string(), v.to_string());
                    i += 1;
                }
                _ => break,
            }
        }
        (env, tokens[i..].to_vec())
    }

    #[instrument(skip(self, exec), fields(cmd = exec.args.first().map(String::as_str).unwrap_or("")))]
    pub fn spawn(&self, exec: Exec) -> Pid {
        sub_spawn(&self.shared, exec, Pid::INVALID)
    }

    pub fn sub_spawn(&self, exec: Exec, parent: Pid) -> Pid {
        sub_spawn(&self.shared, exec, parent)
    }

    /// Spawns a pipeline: consecutive execs share a stream, `exec[i].out ==
    /// exec[i+1].in`.
    pub fn spawn_pipeline(&self, mut execs: Vec<Exec>) -> Vec<Pid> {
        for i in 0..execs.len().saturating_sub(1) {
            let joint = execs[i].stdout.clone().unwrap_or_default_stream();
            execs[i].stdout = Some(joint.clone());
            execs[i + 1].stdin = Some(joint);
        }
        execs.into_iter().map(|e| self.spawn(e)).collect()
    }

    // -- queues ---------------------------------------------------------

    pub fn queue_create(&self, name: &str) -> Result<(), RuntimeError> {
        let mut inner = self.shared.lock().unwrap();
        if inner.queues.contains_key(name) {
            return Err(RuntimeError::QueueExists { name: name.to_string() });
        }
        inner.queues.insert(name.to_string(), QueueStorage::new());
        Ok(())
    }

    pub fn queue_exists(&self, name: &str) -> bool {
        self.shared.lock().unwrap().queues.contains_key(name)
    }

    // -- signals ----------------------------------------------------------

    pub fn signal(&self, pid: Pid, sig: Signal) -> bool {
        let running = {
            let inner = self.shared.lock().unwrap();
            inner.processes.get(&pid).map(|p| p.is_running()).unwrap_or(false)
        };
        if !running {
            return false;
        }
        deliver_signal(&self.shared, pid, sig);
        true
    }

    pub fn interrupt(&self, pid: Pid) -> bool {
        self.signal(pid, SIG_INTERRUPT)
    }

    pub fn kill(&self, pid: Pid) {
        let mut inner = self.shared.lock().unwrap();
        if let Some(p) = inner.processes.get_mut(&pid) {
            p.force_terminate = true;
        }
    }

    pub fn terminate_all(&self) {
        let pids: Vec<Pid> = {
            let inner = self.shared.lock().unwrap();
            inner.processes.keys().copied().collect()
        };
        for pid in pids {
            self.signal(pid, SIG_TERMINATE);
        }
    }

    /// Forces every process out of existence: repeatedly signals and
    /// ticks `MAIN`, then kills whatever refuses to exit.
    pub fn destroy(&self) {
        for _ in 0..64 {
            if self.shared.lock().unwrap().processes.is_empty() {
                return;
            }
            self.terminate_all();
            self.tick(MAIN);
        }
        let pids: Vec<Pid> = {
            let inner = self.shared.lock().unwrap();
            inner.processes.keys().copied().collect()
        };
        for pid in pids {
            self.kill(pid);
        }
        self.tick(MAIN);
    }

    // -- introspection ----------------------------------------------------

    pub fn is_running(&self, pid: Pid) -> bool {
        self.shared
            .lock()
            .unwrap()
            .processes
            .get(&pid)
            .map(|p| p.is_running())
            .unwrap_or(false)
    }

    pub fn get_io(&self, pid: Pid) -> Option<(Stream, Stream)> {
        let inner = self.shared.lock().unwrap();
        inner.processes.get(&pid).map(|p| (p.stdin.clone(), p.stdout.clone()))
    }

    pub fn get_exit_code(&self, pid: Pid) -> i32 {
        let inner = self.shared.lock().unwrap();
        match inner.processes.get(&pid) {
            Some(p) => p.exit_code.lock().unwrap().unwrap_or(-1),
            None => -1,
        }
    }

    pub fn get_parent(&self, pid: Pid) -> Pid {
        let inner = self.shared.lock().unwrap();
        inner.processes.get(&pid).map(|p| p.parent).unwrap_or(Pid::INVALID)
    }

    pub fn live_count(&self) -> usize {
        self.shared.lock().unwrap().processes.len()
    }

    // -- scheduling -------------------------------------------------------

    /// Drains one sweep of `queue_name`, resuming every ready task. If
    /// `queue_name` is [`MAIN`], also reaps finalized processes. Returns
    /// the number of processes still in the table afterward.
    #[instrument(skip(self))]
    pub fn tick(&self, queue_name: &str) -> usize {
        let batch = {
            let mut inner = self.shared.lock().unwrap();
            if queue_name == MAIN {
                inner.assert_main_thread_context();
            }
            let queue = inner
                .queues
                .entry(queue_name.to_string())
                .or_insert_with(QueueStorage::new);
            std::mem::swap(&mut queue.pop, &mut queue.push);
            std::mem::take(&mut queue.pop)
        };

        trace!(queue = queue_name, count = batch.len(), "draining queue");

        for (pid, mut fut) in batch {
            let skip = {
                let inner = self.shared.lock().unwrap();
                match inner.processes.get(&pid) {
                    Some(p) => p.force_terminate || p.should_remove,
                    None => true,
                }
            };
            if skip {
                continue;
            }

            let mut cx = noop_context();
            match fut.as_mut().poll(&mut cx) {
                std::task::Poll::Ready(code) => {
                    let mut inner = self.shared.lock().unwrap();
                    if let Some(p) = inner.processes.get_mut(&pid) {
                        p.is_complete = true;
                        let killed = p.force_terminate;
                        *p.exit_code.lock().unwrap() = Some(if killed { -1 } else { code });
                        debug!(pid = pid.raw(), exit_code = code, "process completed");
                    }
                }
                std::task::Poll::Pending => {
                    let mut inner = self.shared.lock().unwrap();
                    let target = inner
                        .processes
                        .get(&pid)
                        .map(|p| p.queue_tag.lock().unwrap().clone())
                        .unwrap_or_else(|| queue_name.to_string());
                    let dest_name = if inner.queues.contains_key(&target) {
                        target
                    } else {
                        warn!(queue = %target, pid = pid.raw(), "awaiter targeted an unknown queue, falling back to MAIN");
                        MAIN.to_string()
                    };
                    let dest = inner.queues.entry(dest_name).or_insert_with(QueueStorage::new);
                    dest.push.push_back((pid, fut));
                }
            }
        }

        if queue_name == MAIN {
            self.reap();
        }

        self.live_count()
    }

    fn reap(&self) {
        let mut inner = self.shared.lock().unwrap();
        let finalize: Vec<Pid> = inner
            .processes
            .iter()
            .filter(|(_, p)| p.is_complete || p.force_terminate)
            .map(|(pid, _)| *pid)
            .collect();

        for pid in finalize {
            if let Some(p) = inner.processes.get_mut(&pid) {
                if p.force_terminate && !p.is_complete {
                    *p.exit_code.lock().unwrap() = Some(-1);
                    p.is_complete = true;
                }
                p.stdout.set_eof();
                p.should_remove = true;
            }
        }

        let remove: Vec<Pid> = inner
            .processes
            .iter()
            .filter(|(_, p)| p.should_remove)
            .map(|(pid, _)| *pid)
            .collect();
        for pid in remove {
            if let Some(p) = inner.processes.remove(&pid) {
                if let Some(parent) = inner.processes.get_mut(&p.parent) {
                    parent.children.remove(&pid);
                }
            }
        }
    }

    /// Repeatedly ticks `MAIN` until either `duration` elapses or
    /// `max_iterations` ticks have run. Returns the live process count.
    pub fn tick_for(&self, duration: Duration, max_iterations: u64) -> usize {
        let deadline = Instant::now() + duration;
        let mut iterations = 0;
        loop {
            let live = self.tick(MAIN);
            iterations += 1;
            if live == 0 || iterations >= max_iterations || Instant::now() >= deadline {
                return live;
            }
        }
    }

    /// Spawns a host thread that drains `queue_name` whenever it has
    /// work, sleeping on a condition variable in between. Returns a
    /// handle whose `wake` can be used to nudge it (e.g. after enqueuing
    /// new work from another thread); dropping the handle does not stop
    /// the thread — use [`Runtime::destroy`] or process exit to end it.
    pub fn bgrunner(self: &Arc<Self>, queue_name: &str) -> std::thread::JoinHandle<()> {
        let cell = {
            let mut wakers = self.wakers.lock().unwrap();
            wakers
                .entry(queue_name.to_string())
                .or_insert_with(|| Arc::new(WakeCell::new()))
                .clone()
        };
        let rt = Arc::clone(self);
        let queue_name = queue_name.to_string();
        std::thread::spawn(move || loop {
            debug!(queue = %queue_name, "bgrunner waiting for work");
            cell.wait();
            debug!(queue = %queue_name, "bgrunner draining queue");
            rt.tick(&queue_name);
        })
    }

    /// Wakes any [`Runtime::bgrunner`] thread parked on `queue_name`.
    pub fn notify_queue(&self, queue_name: &str) {
        if let Some(cell) = self.wakers.lock().unwrap().get(queue_name) {
            cell.wake();
        }
    }
}

pub(crate) fn deliver_signal(shared: &Shared, pid: Pid, sig: Signal) {
    let (handler, already_signaling) = {
        let inner = shared.lock().unwrap();
        match inner.processes.get(&pid) {
            Some(p) => {
                p.last_signal.store(sig, Ordering::SeqCst);
                let already = p.has_been_signaled.swap(true, Ordering::SeqCst);
                (p.signal_handler.clone(), already)
            }
            None => return,
        }
    };
    if already_signaling {
        return;
    }
    handler(shared, pid, sig);
    if let Some(p) = shared.lock().unwrap().processes.get(&pid) {
        p.has_been_signaled.store(false, Ordering::SeqCst);
    }
}

pub(crate) fn sub_spawn(shared: &Shared, exec: Exec, parent: Pid) -> Pid {
    let (env, argv) = Runtime::parse_args(&exec.args);

    let mut exec = exec;
    exec.args = argv;

    let factory = {
        let mut inner = shared.lock().unwrap();
        inner.assert_main_thread_context();
        if let Some(hook) = inner.pre_exec.clone() {
            hook(&mut exec);
        }
        match exec.args.first() {
            Some(name) => inner.commands.get(name).cloned(),
            None => None,
        }
    };

    let factory = match (exec.args.first(), factory) {
        (None, _) => None, // env-only spawn: nothing to run, exits immediately with 0.
        (Some(_), Some(f)) => Some(f),
        (Some(name), None) => {
            debug!(command = name.as_str(), "no such command registered");
            return Pid::INVALID;
        }
    };

    let stdin = exec.stdin.unwrap_or_default_stream();
    let stdout = exec.stdout.unwrap_or_default_stream();
    let queue_tag = Arc::new(Mutex::new(MAIN.to_string()));
    let last_signal = Arc::new(AtomicI32::new(SIG_NONE));

    let ctx = TaskCtx {
        shared: shared.clone(),
        pid: Pid::INVALID, // patched in below, once the real pid is known
        queue_tag: queue_tag.clone(),
        last_signal: last_signal.clone(),
        stdin: stdin.clone(),
        stdout: stdout.clone(),
        args: exec.args.clone(),
        env: env.clone(),
    };

    let mut inner = shared.lock().unwrap();
    let pid = inner.pid_alloc.allocate();
    let ctx = TaskCtx { pid, ..ctx };

    let task: TaskFuture = match factory {
        Some(f) => f(ctx),
        None => Box::pin(async { 0 }),
    };

    let record = ProcessRecord {
        pid,
        parent,
        children: HashSet::new(),
        args: exec.args,
        env,
        stdin,
        stdout,
        queue_tag,
        last_signal,
        exit_code: Arc::new(Mutex::new(None)),
        is_complete: false,
        force_terminate: false,
        should_remove: false,
        has_been_signaled: Arc::new(AtomicBool::new(false)),
        signal_handler: DEFAULT_SIGNAL_HANDLER.clone(),
    };
    inner.processes.insert(pid, record);
    if parent.is_valid() {
        if let Some(p) = inner.processes.get_mut(&parent) {
            p.children.insert(pid);
        }
    }

    inner
        .queues
        .get_mut(MAIN)
        .expect("MAIN queue always exists")
        .push
        .push_back((pid, task));

    pid
}

trait StreamOrDefault {
    fn unwrap_or_default_stream(self) -> Stream;
}

impl StreamOrDefault for Option<Stream> {
    fn unwrap_or_default_stream(self) -> Stream {
        self.unwrap_or_default()
    }
}

impl StreamOrDefault for Stream {
    fn unwrap_or_default_stream(self) -> Stream {
        self
    }
}
