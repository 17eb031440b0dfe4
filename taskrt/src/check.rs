//! Accumulates non-fatal diagnostics about a planned [`crate::command::Exec`]
//! or runtime configuration, in the style of a linter's findings list
//! rather than a single pass/fail `Result`.

use std::fmt;

#[derive(Debug, Default)]
pub struct CheckResult {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl CheckResult {
    pub fn new() -> Self {
        CheckResult::default()
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for e in &self.errors {
            writeln!(f, "error: {}", e)?;
        }
        for w in &self.warnings {
            writeln!(f, "warning: {}", w)?;
        }
        Ok(())
    }
}

/// Sanity-checks an exec before spawning it: empty argv after env
/// stripping is legal (it's the "set environment only" no-op spawn) but
/// worth a warning since it is rarely what a caller intends interactively.
pub fn check_exec(exec: &crate::command::Exec, runtime: &crate::Runtime) -> CheckResult {
    let mut result = CheckResult::new();
    let (_, argv) = crate::Runtime::parse_args(&exec.args);
    if argv.is_empty() {
        result.warning("command line has no argv after stripping NAME=VALUE tokens; process will exit immediately with code 0");
    } else if !runtime.queue_exists(crate::runtime::MAIN) {
        result.error("MAIN queue missing; runtime was not constructed with Runtime::new()");
    }
    result
}
