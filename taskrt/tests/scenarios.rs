//! End-to-end scheduler scenarios exercising pipelines, signals, and
//! stream EOF propagation together rather than in isolation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use taskrt::{commands, AwaiterResult, Exec, Runtime, Stream, MAIN};

fn drain(stream: &Stream) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        match stream.get() {
            taskrt::stream::GetResult::Success(b) => out.push(b),
            taskrt::stream::GetResult::Empty | taskrt::stream::GetResult::EndOfStream => break,
        }
    }
    out
}

fn run_to_completion(rt: &Runtime, pids: &[taskrt::Pid], max_ticks: usize) {
    for _ in 0..max_ticks {
        if pids.iter().all(|p| !rt.is_running(*p)) {
            return;
        }
        rt.tick(MAIN);
    }
    panic!("processes did not complete within {} ticks", max_ticks);
}

#[test]
fn echo_rev_pipeline_produces_expected_output() {
    let rt = Runtime::new();
    commands::register_reference_commands(&rt);

    let captured = Stream::new();
    let execs = vec![
        Exec::new("echo").arg("-n").arg("Hello").arg("world"),
        Exec::new("rev").stdout(captured.clone()),
    ];
    let pids = rt.spawn_pipeline(execs);
    run_to_completion(&rt, &pids, 32);

    assert_eq!(drain(&captured), b"dlrow olleH\n");
    assert_eq!(rt.get_exit_code(pids[0]), 0);
    assert_eq!(rt.get_exit_code(pids[1]), 0);
}

#[test]
fn interrupt_cancels_a_looping_process() {
    let rt = Runtime::new();
    rt.register_command("spin", |ctx: taskrt::TaskCtx| async move {
        loop {
            match ctx.yield_now().await {
                AwaiterResult::SignalInterrupt => return 130,
                AwaiterResult::SignalTerminate => return 143,
                _ => {}
            }
        }
    });

    let pid = Exec::new("spin").spawn(&rt);
    rt.tick(MAIN);
    assert!(rt.is_running(pid));

    assert!(rt.interrupt(pid));
    rt.tick(MAIN);

    assert!(!rt.is_running(pid));
    assert_eq!(rt.get_exit_code(pid), 130);
}

#[test]
fn kill_skips_cleanup_but_interrupt_runs_it() {
    for (use_kill, expected_code) in [(true, -1), (false, 130)] {
        let rt = Runtime::new();
        let cleaned = Arc::new(AtomicBool::new(false));
        let cleaned_for_cmd = cleaned.clone();
        rt.register_command("spin", move |ctx: taskrt::TaskCtx| {
            let cleaned = cleaned_for_cmd.clone();
            async move {
                loop {
                    match ctx.yield_now().await {
                        AwaiterResult::SignalInterrupt => {
                            cleaned.store(true, Ordering::SeqCst);
                            return 130;
                        }
                        AwaiterResult::SignalTerminate => {
                            cleaned.store(true, Ordering::SeqCst);
                            return 143;
                        }
                        _ => {}
                    }
                }
            }
        });

        let pid = Exec::new("spin").spawn(&rt);
        rt.tick(MAIN);
        assert!(rt.is_running(pid));

        if use_kill {
            rt.kill(pid);
        } else {
            rt.interrupt(pid);
        }
        rt.tick(MAIN);

        assert!(!rt.is_running(pid));
        assert_eq!(rt.get_exit_code(pid), expected_code);
        assert_eq!(cleaned.load(Ordering::SeqCst), !use_kill);
    }
}

#[test]
fn eof_propagates_through_a_pipeline_stage() {
    let rt = Runtime::new();
    rt.register_command("three_bytes", |ctx: taskrt::TaskCtx| async move {
        ctx.stdout().put_bytes(b"abc");
        0
    });
    rt.register_command("collect", |ctx: taskrt::TaskCtx| async move {
        let mut collected = Vec::new();
        loop {
            match ctx.has_data(&ctx.stdin()).await {
                AwaiterResult::Success => loop {
                    match ctx.stdin().get() {
                        taskrt::stream::GetResult::Success(b) => collected.push(b),
                        taskrt::stream::GetResult::Empty => break,
                        taskrt::stream::GetResult::EndOfStream => return collected.len() as i32,
                    }
                },
                AwaiterResult::EndOfStream => return collected.len() as i32,
                _ => return -1,
            }
        }
    });

    let pids = rt.spawn_pipeline(vec![Exec::new("three_bytes"), Exec::new("collect")]);
    run_to_completion(&rt, &pids, 32);

    assert_eq!(rt.get_exit_code(pids[1]), 3);
}

#[test]
fn parent_waits_on_child_completion() {
    let rt = Runtime::new();
    commands::register_reference_commands(&rt);
    rt.register_command("parent", |ctx: taskrt::TaskCtx| async move {
        let child = ctx.spawn(Exec::new("sleep").arg("0.01"));
        ctx.finished(vec![child]).await;
        ctx.stdout().put_bytes(b"done");
        0
    });

    let out = Stream::new();
    let pid = Exec::new("parent").stdout(out.clone()).spawn(&rt);
    let start = std::time::Instant::now();
    rt.tick_for(Duration::from_secs(2), 10_000);
    assert!(!rt.is_running(pid));
    assert_eq!(drain(&out), b"done");
    assert!(start.elapsed() >= Duration::from_millis(5));
}

#[derive(Debug, Default)]
struct MemoryMount {
    files: std::collections::BTreeMap<String, Vec<u8>>,
}

impl taskrt::Mount for MemoryMount {
    fn is_read_only(&self) -> bool {
        false
    }

    fn get_type(&self, path: &str) -> taskrt::NodeType {
        if path == "/" || path.is_empty() {
            return taskrt::NodeType::MountDir;
        }
        if self.files.contains_key(path) {
            taskrt::NodeType::MountFile
        } else {
            taskrt::NodeType::NoExist
        }
    }

    fn mkdir(&mut self, _path: &str) -> taskrt::VfsStatus {
        taskrt::VfsStatus::Unknown
    }

    fn mkfile(&mut self, path: &str) -> taskrt::VfsStatus {
        self.files.entry(path.to_string()).or_insert_with(Vec::new);
        taskrt::VfsStatus::Ok
    }

    fn remove(&mut self, path: &str) -> taskrt::VfsStatus {
        match self.files.remove(path) {
            Some(_) => taskrt::VfsStatus::Ok,
            None => taskrt::VfsStatus::DoesNotExist,
        }
    }

    fn open_read(&self, path: &str) -> Option<Stream> {
        self.files.get(path).map(|b| Stream::from_bytes(b.clone()))
    }

    fn open_write(&mut self, path: &str, _append: bool) -> Option<Stream> {
        self.files.insert(path.to_string(), Vec::new());
        None
    }

    fn list_dir(&self, _path: &str) -> Vec<String> {
        self.files.keys().cloned().collect()
    }
}

#[test]
fn mount_and_unmount_round_trip() {
    let mut vfs = taskrt::Vfs::new();
    vfs.mkdir("/m");

    let mut backing = MemoryMount::default();
    backing.files.insert("/known".to_string(), b"x".to_vec());
    assert_eq!(vfs.mount("/m", Box::new(backing)), taskrt::VfsStatus::Ok);

    assert!(vfs.exists("/m/known"));
    assert_eq!(vfs.unmount("/m"), taskrt::VfsStatus::Ok);
    assert!(!vfs.exists("/m/known"));
    assert_eq!(vfs.get_type("/m"), taskrt::NodeType::MemDir);
}
