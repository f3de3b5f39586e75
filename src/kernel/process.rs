//! Locating a running supervisor instance through `/proc`.
//!
//! Used by `--reload`: find the instance that shares our program name and
//! send it SIGUSR1.

use crate::config::types::{NanoinitError, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::fs;
use std::path::Path;

/// Split a `/proc/<pid>/cmdline` blob into arguments.
pub fn parse_cmdline(raw: &[u8]) -> Vec<String> {
    raw.split(|&b| b == 0)
        .filter(|arg| !arg.is_empty())
        .map(|arg| String::from_utf8_lossy(arg).into_owned())
        .collect()
}

/// True when `args` is a supervising instance of `program`: the basename of
/// argv[0] matches and the invocation is not itself a reload request.
pub fn cmdline_matches(args: &[String], program: &str) -> bool {
    let Some(argv0) = args.first() else {
        return false;
    };
    let basename = Path::new(argv0)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(argv0);
    if basename != program {
        return false;
    }
    !args[1..]
        .iter()
        .any(|arg| arg == "-r" || arg == "--reload")
}

/// Lowest pid (other than our own) running `program` as a supervisor.
pub fn find_instance(program: &str) -> Result<Option<Pid>> {
    let own = std::process::id();
    let entries = fs::read_dir("/proc")
        .map_err(|e| NanoinitError::Process(format!("cannot list /proc: {}", e)))?;

    let mut found: Option<u32> = None;
    for entry in entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        if pid == own {
            continue;
        }
        // Processes vanish between listing and reading.
        let Ok(raw) = fs::read(entry.path().join("cmdline")) else {
            continue;
        };
        if cmdline_matches(&parse_cmdline(&raw), program) {
            found = Some(found.map_or(pid, |current| current.min(pid)));
        }
    }

    Ok(found.map(|pid| Pid::from_raw(pid as i32)))
}

/// Ask the running instance of `program` to reload. Returns its pid.
pub fn send_reload(program: &str) -> Result<Pid> {
    let pid = find_instance(program)?.ok_or_else(|| {
        NanoinitError::Process(format!("no running {} instance found", program))
    })?;
    kill(pid, Signal::SIGUSR1)
        .map_err(|e| NanoinitError::Signal(format!("failed to signal {}: {}", pid, e)))?;
    log::info!("sent SIGUSR1 to {} (pid {})", program, pid);
    Ok(pid)
}
