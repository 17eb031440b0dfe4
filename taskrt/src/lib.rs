//! `taskrt` is an embeddable, cooperatively-scheduled pseudo-OS runtime:
//! a single-process scheduler that hosts many tasks ("processes"),
//! connects them with byte streams, routes signals between them, and
//! exposes a small virtual filesystem.
//!
//! A host program owns exactly one [`Runtime`], registers commands,
//! spawns processes, and repeatedly calls [`Runtime::tick`] — the
//! runtime never spawns an OS thread or blocks on its own unless asked
//! to via [`Runtime::bgrunner`].
//!
//! ```no_run
//! use taskrt::{Exec, Runtime};
//!
//! let rt = Runtime::new();
//! taskrt::commands::register_reference_commands(&rt);
//! let pid = Exec::new("echo").arg("hi").spawn(&rt);
//! while rt.is_running(pid) {
//!     rt.tick(taskrt::MAIN);
//! }
//! ```

pub mod awaiter;
pub mod check;
pub mod command;
pub mod commands;
pub mod error;
pub mod pid;
pub mod process;
pub mod runtime;
pub mod signal;
pub mod stream;
pub mod vfs;

pub use awaiter::{Awaiter, AwaiterResult};
pub use check::CheckResult;
pub use command::Exec;
pub use error::{RuntimeError, VfsStatus};
pub use pid::Pid;
pub use process::TaskCtx;
pub use runtime::{Runtime, MAIN};
pub use signal::{Signal, EXIT_INTERRUPTED, EXIT_KILLED, EXIT_TERMINATED, SIG_INTERRUPT, SIG_NONE, SIG_TERMINATE};
pub use stream::Stream;
pub use vfs::{Mount, NodeType, Vfs};
