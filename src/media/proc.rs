use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use tokio::process::{Child, Command};

/// Spawn an argv with the given stdio wiring. On unix the child leads its own
/// process group, so signals aimed at it never reach the supervisor's group.
pub(crate) fn spawn_group(argv: &[String], stdin: Stdio, stdout: Stdio) -> anyhow::Result<Child> {
    let (bin, args) = argv.split_first().context("empty command line")?;
    let mut cmd = Command::new(bin);
    cmd.args(args)
        .stdin(stdin)
        .stdout(stdout)
        // stderr is discarded: nobody reads it, and an unread pipe would
        // stall the child once the buffer fills
        .stderr(Stdio::null())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd.spawn().with_context(|| format!("spawn {}", bin))
}

pub(crate) fn is_running(child: &mut Child) -> bool {
    matches!(child.try_wait(), Ok(None))
}

/// Graceful stop: SIGTERM, wait up to `grace`, then SIGKILL. Never blocks
/// past the grace period plus reaping; already-exited children are fine.
pub(crate) async fn terminate(child: &mut Child, grace: Duration) {
    if !is_running(child) {
        return;
    }
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // spawn_group made the child a group leader, so -pid signals the
        // whole pipeline it may have forked
        unsafe { libc::kill(-(pid as i32), libc::SIGTERM) };
    }
    #[cfg(not(unix))]
    let _ = child.start_kill();

    if tokio::time::timeout(grace, child.wait()).await.is_err() {
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}

#[cfg(test)]
#[path = "proc_test.rs"]
mod proc_test;
