//! Builder for constructing a process before spawning it.

use crate::pid::Pid;
use crate::runtime::Runtime;
use crate::stream::Stream;

/// A not-yet-spawned process: argv (with any leading `NAME=VALUE` tokens
/// peeled off into the environment at spawn time), and optional
/// stdin/stdout stream overrides.
///
/// ```ignore
/// let pid = Exec::new("echo").arg("-n").arg("hi").spawn(&rt);
/// ```
#[derive(Default)]
pub struct Exec {
    pub(crate) args: Vec<String>,
    pub(crate) stdin: Option<Stream>,
    pub(crate) stdout: Option<Stream>,
}

impl Exec {
    pub fn new(command: impl Into<String>) -> Self {
        Exec {
            args: vec![command.into()],
            stdin: None,
            stdout: None,
        }
    }

    /// Builds an `Exec` from a raw token list; useful when the caller
    /// already has `NAME=VALUE` environment tokens interleaved ahead of
    /// the command, e.g. from a parsed shell line.
    pub fn from_tokens(tokens: Vec<String>) -> Self {
        Exec {
            args: tokens,
            stdin: None,
            stdout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        // Environment tokens must form a contiguous prefix of `args` ahead
        // of the command name, so this only makes sense before `new`/`arg`
        // have supplied the command itself; callers that need env should
        // prefer `from_tokens`. Exposed anyway for parity with a typical
        // process builder.
        self.args.insert(0, format!("{}={}", name.as_ref(), value.as_ref()));
        self
    }

    pub fn stdin(mut self, stream: Stream) -> Self {
        self.stdin = Some(stream);
        self
    }

    pub fn stdout(mut self, stream: Stream) -> Self {
        self.stdout = Some(stream);
        self
    }

    pub fn spawn(self, rt: &Runtime) -> Pid {
        rt.spawn(self)
    }

    pub fn sub_spawn(self, rt: &Runtime, parent: Pid) -> Pid {
        rt.sub_spawn(self, parent)
    }
}
