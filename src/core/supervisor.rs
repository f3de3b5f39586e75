use crate::config::source::ConfigSource;
use crate::config::types::{Configuration, NanoinitError, Result};
use crate::core::types::{CycleOutcome, Poll, ProcessTable, RunSummary, SpawnOutcome, SupervisorOptions};
use crate::exec::launch::LaunchPlan;
use crate::kernel::signal::SignalHandler;
use log::{error, info, warn};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

fn to_process_error(prefix: &str, err: impl std::fmt::Display) -> NanoinitError {
    NanoinitError::Process(format!("{prefix}: {err}"))
}

/// Owns the process table of the current cycle and drives it through
/// start, monitor, forward, drain and reload.
///
/// All work happens on the calling thread. Signal handlers only set flags,
/// which are acted on at the next monitor tick.
pub struct Supervisor {
    options: SupervisorOptions,
    signals: SignalHandler,
    table: ProcessTable,
}

impl Supervisor {
    /// Install the supervisor's signal handlers. Call before spawning anything.
    pub fn new(options: SupervisorOptions) -> Result<Self> {
        Ok(Self {
            options,
            signals: SignalHandler::install()?,
            table: ProcessTable::default(),
        })
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    pub fn signals(&self) -> SignalHandler {
        self.signals
    }

    pub fn table(&self) -> &ProcessTable {
        &self.table
    }

    /// Run cycles until one ends without a reload request. The configuration
    /// is loaded from `source` afresh for every cycle.
    pub fn run(&mut self, source: &ConfigSource) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        loop {
            let config = source.load();
            summary.cycles += 1;
            match self.run_cycle(config)? {
                CycleOutcome::Reload => info!("reloading configuration"),
                CycleOutcome::Terminated => break,
            }
        }
        info!("supervisor finished after {} cycle(s)", summary.cycles);
        Ok(summary)
    }

    /// One full cycle: start everything, monitor until a stop is requested,
    /// forward the stop, drain, tear down.
    pub fn run_cycle(&mut self, config: Configuration) -> Result<CycleOutcome> {
        self.start(config);
        let signal = self.monitor()?;
        self.forward(signal);
        self.drain()?;
        self.table = ProcessTable::default();

        if self.signals.take_reload() {
            Ok(CycleOutcome::Reload)
        } else {
            Ok(CycleOutcome::Terminated)
        }
    }

    /// Replace the process table with one for `config` and spawn every
    /// descriptor in order. Spawn failures are logged and skipped.
    pub fn start(&mut self, config: Configuration) {
        self.table = ProcessTable::new(config);
        info!(
            "starting {} application(s){}",
            self.table.len(),
            if self.options.manual_mode {
                " in manual mode"
            } else {
                ""
            }
        );
        for index in 0..self.table.len() {
            let _ = self.spawn(index);
        }
    }

    /// Launch the descriptor at `index` unless manual mode suppresses it.
    ///
    /// A failed launch leaves the PCB not running, so autorestart never
    /// retries it.
    pub fn spawn(&mut self, index: usize) -> Result<SpawnOutcome> {
        let app = self
            .table
            .descriptor(index)
            .ok_or_else(|| NanoinitError::Process(format!("no application at index {}", index)))?;

        if self.options.manual_mode && app.manual() {
            info!("{}: manual application, not starting", app.name());
            return Ok(SpawnOutcome::Suppressed);
        }

        let launched = LaunchPlan::prepare(app).and_then(|plan| {
            let name = plan.name().to_string();
            plan.launch().map(|pid| (name, pid))
        });
        match launched {
            Ok((name, pid)) => {
                self.table.mark_started(index, pid);
                info!("{} started (pid {})", name, pid);
                Ok(SpawnOutcome::Started(pid))
            }
            Err(err) => {
                if err.is_supervisor_fault() {
                    error!("{}", err);
                } else {
                    warn!("{}", err);
                }
                Err(err)
            }
        }
    }

    /// One monitor iteration: reap at most one exited child without
    /// blocking, then check for a pending stop.
    pub fn poll(&mut self) -> Result<Poll> {
        loop {
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => break,
                Ok(status) => {
                    self.record_exit(status, true);
                    break;
                }
                Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => break,
                Err(e) => return Err(to_process_error("waitpid", e)),
            }
        }

        Ok(match self.signals.take_stop() {
            Some(signal) => Poll::Stop(signal),
            None => Poll::Continue,
        })
    }

    /// Poll on a fixed tick until a stop is requested; returns its signal.
    pub fn monitor(&mut self) -> Result<Signal> {
        loop {
            if let Poll::Stop(signal) = self.poll()? {
                info!("received {}", signal);
                return Ok(signal);
            }
            std::thread::sleep(self.options.tick);
        }
    }

    /// Send `signal` to every application still marked running.
    pub fn forward(&self, signal: Signal) {
        info!(
            "forwarding {} to {} running application(s)",
            signal,
            self.table.running_count()
        );
        for (app, pcb) in self.table.entries() {
            let Some(pid) = pcb.pid.filter(|_| pcb.running) else {
                continue;
            };
            if let Err(e) = kill(pid, signal) {
                warn!("{}: failed to send {} to pid {}: {}", app.name(), signal, pid, e);
            }
        }
    }

    /// Block until every running application has been reaped. No timeout and
    /// no escalation.
    pub fn drain(&mut self) -> Result<()> {
        while self.table.running_count() > 0 {
            match waitpid(Pid::from_raw(-1), None) {
                Ok(status) => self.record_exit(status, false),
                Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => {
                    error!(
                        "{} application(s) marked running but no children remain",
                        self.table.running_count()
                    );
                    self.table.mark_all_stopped();
                    break;
                }
                Err(e) => return Err(to_process_error("waitpid", e)),
            }
        }
        info!("all applications stopped");
        Ok(())
    }

    fn record_exit(&mut self, status: WaitStatus, respawn: bool) {
        let (pid, how) = match status {
            WaitStatus::Exited(pid, code) => (pid, format!("exited with status {}", code)),
            WaitStatus::Signaled(pid, signal, _) => (pid, format!("killed by {}", signal)),
            _ => return,
        };

        let Some(index) = self.table.find_by_pid(pid) else {
            info!("reaped orphan pid {} ({})", pid, how);
            return;
        };
        self.table.mark_exited(index);

        let Some(app) = self.table.descriptor(index) else {
            return;
        };
        if matches!(status, WaitStatus::Exited(_, 0)) {
            info!("{} (pid {}) {}", app.name(), pid, how);
        } else {
            warn!("{} (pid {}) {}", app.name(), pid, how);
        }

        if respawn && app.autorestart() {
            info!("restarting {}", app.name());
            let _ = self.spawn(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::ApplicationDescriptor;

    fn manual_only() -> Configuration {
        Configuration::from_descriptors(vec![
            ApplicationDescriptor::new("m", "/bin/true").with_manual(true)
        ])
        .unwrap()
    }

    #[test]
    fn test_manual_descriptor_suppressed_in_manual_mode() {
        let mut supervisor = Supervisor::new(SupervisorOptions {
            manual_mode: true,
            ..SupervisorOptions::default()
        })
        .unwrap();
        supervisor.start(manual_only());
        assert_eq!(supervisor.table().running_count(), 0);
        assert_eq!(supervisor.spawn(0).unwrap(), SpawnOutcome::Suppressed);
    }

    #[test]
    fn test_spawn_out_of_range() {
        let mut supervisor = Supervisor::new(SupervisorOptions::default()).unwrap();
        supervisor.start(Configuration::empty());
        assert!(supervisor.spawn(3).is_err());
    }

    #[test]
    fn test_failed_spawn_stays_not_running() {
        let mut supervisor = Supervisor::new(SupervisorOptions::default()).unwrap();
        let config = Configuration::from_descriptors(vec![
            ApplicationDescriptor::new("ghost", "/nonexistent/ghost").with_autorestart(true)
        ])
        .unwrap();
        supervisor.start(config);
        assert_eq!(supervisor.table().running_count(), 0);
        assert!(supervisor.table().pcbs()[0].pid.is_none());
    }

    #[test]
    fn test_forward_skips_idle_pcbs() {
        let mut supervisor = Supervisor::new(SupervisorOptions {
            manual_mode: true,
            ..SupervisorOptions::default()
        })
        .unwrap();
        supervisor.start(manual_only());
        supervisor.forward(Signal::SIGTERM);
        assert_eq!(supervisor.table().running_count(), 0);
    }
}
