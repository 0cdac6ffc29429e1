//! Runtime sampler: statistics of the agent process itself

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::warn;

use super::{Sampler, push_counter, push_gauge};
use crate::model::Batch;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct ProcessReadings {
    resident_memory: u64,
    virtual_memory: u64,
    cpu_usage: f32,
    disk_read_bytes: u64,
    disk_written_bytes: u64,
    run_time: u64,
}

/// Samples the agent's own process, a poll counter and a random value
///
/// | metric                    | kind    |
/// |---------------------------|---------|
/// | `ProcessResidentMemory`   | gauge   |
/// | `ProcessVirtualMemory`    | gauge   |
/// | `ProcessCpuUsage`         | gauge   |
/// | `ProcessDiskReadBytes`    | gauge   |
/// | `ProcessDiskWrittenBytes` | gauge   |
/// | `ProcessRunTime`          | gauge   |
/// | `RandomValue`             | gauge   |
/// | `PollCount`               | counter |
pub struct RuntimeSampler {
    system: System,
    pid: Option<Pid>,
    readings: ProcessReadings,
    random_value: f64,
    polls: u64,
}

impl RuntimeSampler {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .inspect_err(|e| warn!("cannot determine own pid, process stats disabled: {e}"))
            .ok();

        Self {
            system: System::new(),
            pid,
            readings: ProcessReadings::default(),
            random_value: 0.0,
            polls: 0,
        }
    }

    fn refresh_process(&mut self) {
        let Some(pid) = self.pid else {
            return;
        };

        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing()
                .with_memory()
                .with_cpu()
                .with_disk_usage(),
        );

        if let Some(process) = self.system.process(pid) {
            let disk = process.disk_usage();
            self.readings = ProcessReadings {
                resident_memory: process.memory(),
                virtual_memory: process.virtual_memory(),
                cpu_usage: process.cpu_usage(),
                disk_read_bytes: disk.total_read_bytes,
                disk_written_bytes: disk.total_written_bytes,
                run_time: process.run_time(),
            };
        }
    }
}

impl Default for RuntimeSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for RuntimeSampler {
    fn name(&self) -> &str {
        "runtime"
    }

    fn update(&mut self) {
        self.refresh_process();
        self.random_value = rand::random::<f64>();
        self.polls += 1;
    }

    fn snapshot(&mut self) -> Batch {
        let r = self.readings;
        let mut batch = Batch::with_capacity(8);

        push_gauge(&mut batch, "ProcessResidentMemory", r.resident_memory as f64);
        push_gauge(&mut batch, "ProcessVirtualMemory", r.virtual_memory as f64);
        push_gauge(&mut batch, "ProcessCpuUsage", r.cpu_usage as f64);
        push_gauge(&mut batch, "ProcessDiskReadBytes", r.disk_read_bytes as f64);
        push_gauge(&mut batch, "ProcessDiskWrittenBytes", r.disk_written_bytes as f64);
        push_gauge(&mut batch, "ProcessRunTime", r.run_time as f64);
        push_gauge(&mut batch, "RandomValue", self.random_value);
        push_counter(&mut batch, "PollCount", std::mem::take(&mut self.polls));

        batch
    }
}
