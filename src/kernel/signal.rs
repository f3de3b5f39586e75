use crate::config::types::{NanoinitError, Result};
use log::{debug, info};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
/// Async-safe signal handling for the supervisor
///
/// The handler only stores into atomics; the supervision loop polls them.
/// SIGTERM, SIGINT and SIGQUIT request a stop carrying the received signal.
/// SIGUSR1 requests a reload, which stops the children with SIGTERM first.
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// Pending stop signal number (0 if none).
static STOP_SIGNAL: AtomicI32 = AtomicI32::new(0);

/// Pending reload request.
static RELOAD_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Signals the supervisor intercepts. Children get them reset to default.
pub const SUPERVISOR_SIGNALS: [Signal; 4] = [
    Signal::SIGTERM,
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGUSR1,
];

/// Handle on the process-wide signal flags.
#[derive(Debug, Clone, Copy)]
pub struct SignalHandler;

impl SignalHandler {
    /// Install handlers for [`SUPERVISOR_SIGNALS`]. Installing again is harmless.
    pub fn install() -> Result<Self> {
        let action = SigAction::new(
            SigHandler::Handler(Self::signal_handler),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );

        for sig in SUPERVISOR_SIGNALS {
            unsafe { signal::sigaction(sig, &action) }.map_err(|e| {
                NanoinitError::Signal(format!("failed to install {} handler: {}", sig, e))
            })?;
        }

        info!("signal handlers installed (SIGTERM, SIGINT, SIGQUIT, SIGUSR1)");
        Ok(Self)
    }

    /// Only atomic stores: no allocation, no locks, no I/O.
    extern "C" fn signal_handler(signal: libc::c_int) {
        if signal == libc::SIGUSR1 {
            STOP_SIGNAL.store(libc::SIGTERM, Ordering::SeqCst);
            RELOAD_REQUESTED.store(true, Ordering::SeqCst);
        } else {
            STOP_SIGNAL.store(signal, Ordering::SeqCst);
        }
    }

    /// Stop signal received since the last call, if any. Clears it.
    pub fn take_stop(&self) -> Option<Signal> {
        let raw = STOP_SIGNAL.swap(0, Ordering::SeqCst);
        if raw == 0 {
            return None;
        }
        Signal::try_from(raw).ok()
    }

    /// Whether a reload was requested since the last call. Clears it.
    pub fn take_reload(&self) -> bool {
        RELOAD_REQUESTED.swap(false, Ordering::SeqCst)
    }

    /// Same effect as receiving `signal` from outside.
    pub fn request_stop(&self, signal: Signal) {
        debug!("stop requested with {}", signal);
        STOP_SIGNAL.store(signal as i32, Ordering::SeqCst);
    }

    /// Same effect as receiving SIGUSR1.
    pub fn request_reload(&self) {
        debug!("reload requested");
        STOP_SIGNAL.store(libc::SIGTERM, Ordering::SeqCst);
        RELOAD_REQUESTED.store(true, Ordering::SeqCst);
    }

    /// Clear both flags (for testing)
    pub fn reset(&self) {
        STOP_SIGNAL.store(0, Ordering::SeqCst);
        RELOAD_REQUESTED.store(false, Ordering::SeqCst);
    }
}

/// Restore default dispositions in a freshly forked child.
///
/// Runs between fork and exec, so it must stay async-signal-safe.
pub fn restore_default_dispositions() {
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    for sig in SUPERVISOR_SIGNALS {
        let _ = unsafe { signal::sigaction(sig, &default) };
    }
    let _ = unsafe { signal::sigaction(Signal::SIGPIPE, &default) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // The flags are process-wide.
    static FLAGS: Mutex<()> = Mutex::new(());

    #[test]
    fn test_install() {
        assert!(SignalHandler::install().is_ok());
        assert!(SignalHandler::install().is_ok());
    }

    #[test]
    fn test_stop_is_consumed_once() {
        let _guard = FLAGS.lock().unwrap_or_else(|e| e.into_inner());
        let handler = SignalHandler;
        handler.reset();

        handler.request_stop(Signal::SIGINT);
        assert_eq!(handler.take_stop(), Some(Signal::SIGINT));
        assert_eq!(handler.take_stop(), None);
        assert!(!handler.take_reload());
    }

    #[test]
    fn test_reload_implies_sigterm_stop() {
        let _guard = FLAGS.lock().unwrap_or_else(|e| e.into_inner());
        let handler = SignalHandler;
        handler.reset();

        handler.request_reload();
        assert_eq!(handler.take_stop(), Some(Signal::SIGTERM));
        assert!(handler.take_reload());
        assert!(!handler.take_reload());
    }

    #[test]
    fn test_handler_maps_usr1_to_reload() {
        let _guard = FLAGS.lock().unwrap_or_else(|e| e.into_inner());
        let handler = SignalHandler;
        handler.reset();

        SignalHandler::signal_handler(libc::SIGQUIT);
        assert_eq!(handler.take_stop(), Some(Signal::SIGQUIT));
        assert!(!handler.take_reload());

        SignalHandler::signal_handler(libc::SIGUSR1);
        assert_eq!(handler.take_stop(), Some(Signal::SIGTERM));
        assert!(handler.take_reload());
    }
}
