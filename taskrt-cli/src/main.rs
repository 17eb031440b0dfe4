//! Command-line harness for `taskrt`: spawns one pipeline of commands
//! against a fresh runtime and drives it to completion, printing each
//! stage's exit code. Mainly useful for poking at the reference
//! commands interactively.

use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use taskrt::{check::check_exec, commands, Exec, Runtime, MAIN};

/// Run a pipeline of commands through the taskrt scheduler.
#[derive(Debug, Parser)]
#[command(name = "taskrt-cli", author, version, about)]
struct Opt {
    /// Pipeline stages, separated by `--`, e.g.
    /// `taskrt-cli -- echo -n hi -- rev`
    #[arg(required = true, num_args = 1..)]
    pipeline: Vec<String>,

    /// Wall-clock budget for the whole pipeline
    #[arg(long, default_value = "10")]
    timeout_secs: f64,

    /// Print each stage's exit code as it finishes
    #[arg(long)]
    verbose: bool,
}

fn split_stages(tokens: &[String]) -> Vec<Vec<String>> {
    let mut stages = Vec::new();
    let mut current = Vec::new();
    for tok in tokens {
        if tok == "--" {
            if !current.is_empty() {
                stages.push(std::mem::take(&mut current));
            }
        } else {
            current.push(tok.clone());
        }
    }
    if !current.is_empty() {
        stages.push(current);
    }
    stages
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opt = Opt::parse();
    let stages = split_stages(&opt.pipeline);
    if stages.is_empty() {
        bail!("no pipeline stages given");
    }

    let rt = Runtime::new();
    commands::register_reference_commands(&rt);

    let execs: Vec<Exec> = stages.into_iter().map(Exec::from_tokens).collect();
    for exec in &execs {
        let check = check_exec(exec, &rt);
        for warning in check.warnings() {
            tracing::warn!("{}", warning);
        }
        if check.has_errors() {
            bail!("pipeline failed pre-flight check: {}", check);
        }
    }
    let pids = rt.spawn_pipeline(execs);

    let start = std::time::Instant::now();
    let budget = Duration::from_secs_f64(opt.timeout_secs);
    while pids.iter().any(|p| rt.is_running(*p)) {
        rt.tick(MAIN);
        if start.elapsed() > budget {
            tracing::warn!("timeout exceeded, terminating pipeline");
            rt.terminate_all();
            rt.destroy();
            bail!("pipeline did not finish within {:?}", budget);
        }
    }

    let mut last_code = 0;
    for pid in &pids {
        let code = rt.get_exit_code(*pid);
        if opt.verbose {
            println!("pid {} exited with {}", pid, code);
        }
        last_code = code;
    }

    std::process::exit(last_code);
}
