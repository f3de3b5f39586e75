use crate::config::types::{ApplicationDescriptor, Configuration};
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::time::Duration;

/// Live state of one application within a supervision cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessControlBlock {
    pub pid: Option<Pid>,
    pub running: bool,
}

/// Configuration of the current cycle plus one PCB per descriptor, indexed
/// identically.
#[derive(Debug, Default)]
pub struct ProcessTable {
    config: Configuration,
    pcbs: Vec<ProcessControlBlock>,
}

impl ProcessTable {
    pub fn new(config: Configuration) -> Self {
        let pcbs = vec![ProcessControlBlock::default(); config.len()];
        Self { config, pcbs }
    }

    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    pub fn pcbs(&self) -> &[ProcessControlBlock] {
        &self.pcbs
    }

    pub fn len(&self) -> usize {
        self.pcbs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pcbs.is_empty()
    }

    pub fn descriptor(&self, index: usize) -> Option<&ApplicationDescriptor> {
        self.config.applications().get(index)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&ApplicationDescriptor, &ProcessControlBlock)> {
        self.config.applications().iter().zip(self.pcbs.iter())
    }

    /// Index of the running PCB holding `pid`.
    pub fn find_by_pid(&self, pid: Pid) -> Option<usize> {
        self.pcbs
            .iter()
            .position(|pcb| pcb.running && pcb.pid == Some(pid))
    }

    pub fn running_count(&self) -> usize {
        self.pcbs.iter().filter(|pcb| pcb.running).count()
    }

    pub(crate) fn mark_started(&mut self, index: usize, pid: Pid) {
        if let Some(pcb) = self.pcbs.get_mut(index) {
            pcb.pid = Some(pid);
            pcb.running = true;
        }
    }

    pub(crate) fn mark_exited(&mut self, index: usize) {
        if let Some(pcb) = self.pcbs.get_mut(index) {
            pcb.pid = None;
            pcb.running = false;
        }
    }

    pub fn mark_all_stopped(&mut self) {
        for pcb in &mut self.pcbs {
            pcb.pid = None;
            pcb.running = false;
        }
    }
}

/// Supervisor-wide settings fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorOptions {
    /// Suppress auto-start of descriptors that are themselves marked manual.
    pub manual_mode: bool,
    /// Monitor loop cadence; bounds exit and signal detection latency.
    pub tick: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            manual_mode: false,
            tick: Duration::from_millis(100),
        }
    }
}

/// Result of one monitor iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    Continue,
    Stop(Signal),
}

/// How a supervision cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Reload,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnOutcome {
    Started(Pid),
    /// Manual descriptor under supervisor-wide manual mode.
    Suppressed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Number of cycles run, including the initial one.
    pub cycles: usize,
}
