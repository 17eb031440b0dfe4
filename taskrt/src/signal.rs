//! Signal numbers and the conventional exit codes they map to.

/// A signal value delivered to a process via [`crate::Runtime::signal`].
///
/// Any non-zero `i32` is a legal signal; [`Signal::INTERRUPT`] and
/// [`Signal::TERMINATE`] are the two values the scheduler treats specially
/// (they short-circuit a process's pending awaiter, see
/// [`crate::awaiter::AwaiterResult`]). Other values are delivered verbatim
/// to the process's signal handler but otherwise have no runtime-defined
/// meaning.
pub type Signal = i32;

/// Conventionally requests cooperative cancellation.
pub const SIG_INTERRUPT: Signal = 2;
/// Conventionally requests unconditional shutdown.
pub const SIG_TERMINATE: Signal = 15;

/// No signal pending.
pub const SIG_NONE: Signal = 0;

/// Exit code used when a process is forcibly killed (never completed).
pub const EXIT_KILLED: i32 = -1;
/// Exit code a process should return after observing [`SIG_INTERRUPT`].
pub const EXIT_INTERRUPTED: i32 = 130;
/// Exit code a process should return after observing [`SIG_TERMINATE`].
pub const EXIT_TERMINATED: i32 = 143;

/// Maps a signal to the exit code a well-behaved process reports after
/// acting on it. Returns `None` for signals with no conventional code.
pub fn conventional_exit_code(sig: Signal) -> Option<i32> {
    match sig {
        SIG_INTERRUPT => Some(EXIT_INTERRUPTED),
        SIG_TERMINATE => Some(EXIT_TERMINATED),
        _ => None,
    }
}
