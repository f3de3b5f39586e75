use crate::config::types::{ApplicationDescriptor, NanoinitError, OutputTarget, Result};
use crate::kernel::signal::restore_default_dispositions;
use log::{debug, error};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::wait::waitpid;
use nix::unistd::{close, dup2, fork, pipe2, read, setsid, ForkResult, Pid};
/// Child process launch
///
/// Everything the child needs (argv, redirect files) is prepared in the
/// parent. Between fork and exec the child only makes async-signal-safe
/// calls: reset dispositions, dup2 the redirects, setsid, execv.
///
/// Exec failure is reported back over a close-on-exec pipe carrying the
/// child's errno, so a missing binary is an error to the caller and not an
/// exit status to supervise.
use std::ffi::{CStr, CString};
use std::fs::{File, OpenOptions};
use std::os::raw::c_char;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;

/// Exit status of a child whose exec failed.
pub const EXEC_FAILED_STATUS: i32 = 127;

fn spawn_error(app: &str, reason: impl std::fmt::Display) -> NanoinitError {
    NanoinitError::Spawn {
        app: app.to_string(),
        reason: reason.to_string(),
    }
}

/// fork and pipe2 failing is the supervisor's problem, not the application's.
fn launch_fault(app: &str, call: &str, err: Errno) -> NanoinitError {
    NanoinitError::Process(format!("{}: {}: {}", app, call, err))
}

/// A fully prepared launch of one application.
#[derive(Debug)]
pub struct LaunchPlan {
    name: String,
    path: CString,
    argv: Vec<CString>,
    stdout: Option<File>,
    stderr: Option<File>,
}

impl LaunchPlan {
    /// Build argv and open redirect targets. A target that cannot be opened
    /// is logged and the stream is inherited.
    pub fn prepare(app: &ApplicationDescriptor) -> Result<Self> {
        let path = CString::new(app.path())
            .map_err(|_| spawn_error(app.name(), "path contains NUL byte"))?;

        let mut argv = Vec::with_capacity(app.args().len() + 1);
        argv.push(path.clone());
        for arg in app.args() {
            let arg = CString::new(arg.as_str())
                .map_err(|_| spawn_error(app.name(), "argument contains NUL byte"))?;
            argv.push(arg);
        }

        Ok(Self {
            name: app.name().to_string(),
            path,
            argv,
            stdout: open_target(app.name(), "stdout", app.stdout()),
            stderr: open_target(app.name(), "stderr", app.stderr()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fork and exec. Returns the child's pid once exec has succeeded.
    pub fn launch(self) -> Result<Pid> {
        let mut argv_ptrs: Vec<*const c_char> = self.argv.iter().map(|arg| arg.as_ptr()).collect();
        argv_ptrs.push(std::ptr::null());

        let stdout_fd = self.stdout.as_ref().map(AsRawFd::as_raw_fd);
        let stderr_fd = self.stderr.as_ref().map(AsRawFd::as_raw_fd);

        let (err_read, err_write) =
            pipe2(OFlag::O_CLOEXEC).map_err(|e| launch_fault(&self.name, "pipe2", e))?;

        let child = match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                let _ = close(err_read);
                exec_child(&self.path, &argv_ptrs, stdout_fd, stderr_fd, err_write)
            }
            Ok(ForkResult::Parent { child }) => child,
            Err(e) => {
                let _ = close(err_read);
                let _ = close(err_write);
                return Err(launch_fault(&self.name, "fork", e));
            }
        };

        let _ = close(err_write);
        let exec_errno = read_exec_error(err_read);
        let _ = close(err_read);

        match exec_errno {
            None => {
                debug!("{} launched as pid {}", self.name, child);
                Ok(child)
            }
            Some(errno) => {
                // The child is already gone; reap it so it is never seen as
                // a supervised exit.
                loop {
                    match waitpid(child, None) {
                        Err(Errno::EINTR) => continue,
                        _ => break,
                    }
                }
                Err(spawn_error(
                    &self.name,
                    format!(
                        "exec {} failed: {}",
                        self.path.to_string_lossy(),
                        Errno::from_i32(errno).desc()
                    ),
                ))
            }
        }
    }
}

fn open_target(app: &str, stream: &str, target: &OutputTarget) -> Option<File> {
    let path = match target {
        OutputTarget::Inherit => return None,
        OutputTarget::Discard => Path::new("/dev/null"),
        OutputTarget::File(path) => path.as_path(),
    };
    match OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o666)
        .open(path)
    {
        Ok(file) => Some(file),
        Err(e) => {
            error!(
                "{}: cannot open {} target {}: {}; inheriting",
                app,
                stream,
                path.display(),
                e
            );
            None
        }
    }
}

/// Runs in the forked child. Never returns.
fn exec_child(
    path: &CStr,
    argv: &[*const c_char],
    stdout: Option<RawFd>,
    stderr: Option<RawFd>,
    err_write: RawFd,
) -> ! {
    restore_default_dispositions();
    if let Some(fd) = stdout {
        redirect(fd, libc::STDOUT_FILENO);
    }
    if let Some(fd) = stderr {
        redirect(fd, libc::STDERR_FILENO);
    }
    let _ = setsid();

    unsafe { libc::execv(path.as_ptr(), argv.as_ptr()) };

    let bytes = (Errno::last() as i32).to_ne_bytes();
    unsafe {
        libc::write(err_write, bytes.as_ptr().cast(), bytes.len());
        libc::_exit(EXEC_FAILED_STATUS)
    }
}

fn redirect(fd: RawFd, target: RawFd) {
    if fd == target {
        // dup2 onto itself keeps close-on-exec set.
        unsafe { libc::fcntl(fd, libc::F_SETFD, 0) };
    } else {
        let _ = dup2(fd, target);
    }
}

/// Errno written by a child whose exec failed; `None` on EOF (exec succeeded).
fn read_exec_error(fd: RawFd) -> Option<i32> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        match read(fd, &mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(Errno::EINTR) => continue,
            Err(_) => break,
        }
    }
    (filled == buf.len()).then(|| i32::from_ne_bytes(buf))
}
