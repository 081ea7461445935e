// Runtime statistics sampler
// Reads process and host counters through sysinfo on every poll

use crate::metrics::Metric;
use std::time::{SystemTime, UNIX_EPOCH};
use sysinfo::{Pid, System};
use tracing::warn;

/// Produces the gauges refreshed on every poll
pub trait Sampler: Send {
    fn sample(&mut self) -> Vec<Metric>;
}

/// Process and host statistics for the agent's own process
pub struct RuntimeSampler {
    system: System,
    pid: Option<Pid>,
}

impl RuntimeSampler {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!(error = e, "Cannot resolve own pid, process gauges will read zero");
                None
            }
        };
        Self {
            system: System::new(),
            pid,
        }
    }

    /// Names of every gauge this sampler emits, in emission order
    pub const GAUGES: [&'static str; 27] = [
        "ProcessMemory",
        "ProcessVirtualMemory",
        "ProcessCpuUsage",
        "ProcessRunTime",
        "ProcessStartTime",
        "ProcessDiskRead",
        "ProcessDiskWritten",
        "ProcessDiskReadTotal",
        "ProcessDiskWrittenTotal",
        "TotalMemory",
        "UsedMemory",
        "FreeMemory",
        "AvailableMemory",
        "MemoryUsedFraction",
        "TotalSwap",
        "UsedSwap",
        "FreeSwap",
        "SwapUsedFraction",
        "GlobalCpuUsage",
        "MaxCpuUsage",
        "NumCpu",
        "LoadAverage1",
        "LoadAverage5",
        "LoadAverage15",
        "Uptime",
        "BootTime",
        "LastPollTime",
    ];
}

impl Default for RuntimeSampler {
    fn default() -> Self {
        Self::new()
    }
}

fn fraction(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

impl Sampler for RuntimeSampler {
    fn sample(&mut self) -> Vec<Metric> {
        self.system.refresh_memory();
        self.system.refresh_cpu();

        let mut process = [0.0f64; 9];
        if let Some(pid) = self.pid {
            self.system.refresh_process(pid);
            if let Some(p) = self.system.process(pid) {
                let disk = p.disk_usage();
                process = [
                    p.memory() as f64,
                    p.virtual_memory() as f64,
                    p.cpu_usage() as f64,
                    p.run_time() as f64,
                    p.start_time() as f64,
                    disk.read_bytes as f64,
                    disk.written_bytes as f64,
                    disk.total_read_bytes as f64,
                    disk.total_written_bytes as f64,
                ];
            }
        }

        let sys = &self.system;
        let load = System::load_average();
        let max_cpu = sys
            .cpus()
            .iter()
            .map(|cpu| cpu.cpu_usage() as f64)
            .fold(0.0, f64::max);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        let host = [
            sys.total_memory() as f64,
            sys.used_memory() as f64,
            sys.free_memory() as f64,
            sys.available_memory() as f64,
            fraction(sys.used_memory(), sys.total_memory()),
            sys.total_swap() as f64,
            sys.used_swap() as f64,
            sys.free_swap() as f64,
            fraction(sys.used_swap(), sys.total_swap()),
            sys.global_cpu_info().cpu_usage() as f64,
            max_cpu,
            sys.cpus().len() as f64,
            load.one,
            load.five,
            load.fifteen,
            System::uptime() as f64,
            System::boot_time() as f64,
            now,
        ];

        Self::GAUGES
            .iter()
            .zip(process.iter().chain(host.iter()))
            .map(|(name, value)| Metric::gauge(*name, if value.is_finite() { *value } else { 0.0 }))
            .collect()
    }
}
