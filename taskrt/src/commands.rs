//! Reference builtin commands.
//!
//! None of these are registered by a fresh [`crate::Runtime`] — a new
//! runtime starts with an empty command table. This module exists so
//! downstream crates (a shell, test fixtures) have working examples of
//! how to write a command against [`crate::process::TaskCtx`] without
//! having to invent the plumbing themselves; call
//! [`register_reference_commands`] to opt in.

use crate::awaiter::AwaiterResult;
use crate::process::TaskCtx;
use crate::runtime::Runtime;
use crate::signal::{conventional_exit_code, SIG_INTERRUPT, SIG_TERMINATE};
use crate::stream::GetResult;

pub fn register_reference_commands(rt: &Runtime) {
    rt.register_command("echo", echo);
    rt.register_command("rev", rev);
    rt.register_command("cat", cat);
    rt.register_command("wc", wc);
    rt.register_command("sleep", sleep);
}

/// Maps a non-data awaiter outcome to the exit code a well-behaved
/// command reports for it.
fn exit_code_for(result: AwaiterResult) -> i32 {
    match result {
        AwaiterResult::SignalInterrupt => conventional_exit_code(SIG_INTERRUPT).unwrap_or(1),
        AwaiterResult::SignalTerminate => conventional_exit_code(SIG_TERMINATE).unwrap_or(1),
        _ => 1,
    }
}

async fn echo(ctx: TaskCtx) -> i32 {
    let mut no_newline = false;
    let mut first = true;
    for arg in ctx.args().iter().skip(1) {
        if first && arg == "-n" {
            no_newline = true;
            continue;
        }
        if !first {
            ctx.stdout().put(b' ');
        }
        ctx.stdout().put_bytes(arg.as_bytes());
        first = false;
    }
    if !no_newline {
        ctx.stdout().put(b'\n');
    }
    0
}

async fn rev(ctx: TaskCtx) -> i32 {
    loop {
        let mut line = Vec::new();
        match ctx.read_line(&ctx.stdin(), &mut line).await {
            AwaiterResult::Success => {
                line.reverse();
                ctx.stdout().put_bytes(&line);
                ctx.stdout().put(b'\n');
            }
            AwaiterResult::EndOfStream => {
                // the stream may close mid-line (no trailing newline); a
                // partial final line is still worth reversing and printing
                if !line.is_empty() {
                    line.reverse();
                    ctx.stdout().put_bytes(&line);
                    ctx.stdout().put(b'\n');
                }
                return 0;
            }
            other => return exit_code_for(other),
        }
    }
}

async fn cat(ctx: TaskCtx) -> i32 {
    loop {
        match ctx.has_data(&ctx.stdin()).await {
            AwaiterResult::Success => loop {
                match ctx.stdin().get() {
                    GetResult::Success(b) => ctx.stdout().put(b),
                    GetResult::Empty => break,
                    GetResult::EndOfStream => return 0,
                }
            },
            AwaiterResult::EndOfStream => return 0,
            other => return exit_code_for(other),
        }
    }
}

async fn wc(ctx: TaskCtx) -> i32 {
    let mut lines = 0u64;
    let mut bytes = 0u64;
    loop {
        let mut line = Vec::new();
        match ctx.read_line(&ctx.stdin(), &mut line).await {
            AwaiterResult::Success => {
                lines += 1;
                bytes += line.len() as u64 + 1;
            }
            AwaiterResult::EndOfStream => {
                let report = format!("{} {}\n", lines, bytes);
                ctx.stdout().put_bytes(report.as_bytes());
                return 0;
            }
            other => return exit_code_for(other),
        }
    }
}

async fn sleep(ctx: TaskCtx) -> i32 {
    let secs: f64 = ctx.args().get(1).and_then(|s| s.parse().ok()).unwrap_or(0.0);
    match ctx.yield_for(std::time::Duration::from_secs_f64(secs)).await {
        AwaiterResult::SignalInterrupt => exit_code_for(AwaiterResult::SignalInterrupt),
        AwaiterResult::SignalTerminate => exit_code_for(AwaiterResult::SignalTerminate),
        _ => 0,
    }
}
