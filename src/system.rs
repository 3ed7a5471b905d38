//! Host resource snapshot
//!
//! Reads CPU, memory, uptime and host identity counters for the
//! `/api/system/resources` endpoint.

use serde::Serialize;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};

#[derive(Debug, Clone, Serialize)]
pub struct CpuSnapshot {
    /// Logical CPUs
    pub cores: usize,
    /// 1, 5 and 15 minute load averages
    pub load: [f64; 3],
    pub model: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySnapshot {
    pub total: u64,
    pub free: u64,
    pub used_percentage: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemSnapshot {
    pub cpu: CpuSnapshot,
    pub memory: MemorySnapshot,
    /// Seconds since boot
    pub uptime: u64,
    pub platform: String,
    pub hostname: String,
}

impl SystemSnapshot {
    pub fn collect() -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::new())
                .with_memory(MemoryRefreshKind::new().with_ram()),
        );

        let cpus = sys.cpus();
        let load = System::load_average();
        let total = sys.total_memory();
        let free = sys.available_memory();

        Self {
            cpu: CpuSnapshot {
                cores: cpus.len(),
                load: [load.one, load.five, load.fifteen],
                model: cpus
                    .first()
                    .map(|c| c.brand().trim().to_string())
                    .unwrap_or_else(|| "Unknown".to_string()),
            },
            memory: MemorySnapshot {
                total,
                free,
                used_percentage: used_percentage(total, free),
            },
            uptime: System::uptime(),
            platform: std::env::consts::OS.to_string(),
            hostname: System::host_name().unwrap_or_else(|| "localhost".to_string()),
        }
    }
}

/// round(100 * (1 - free / total)), clamped to 0..=100
pub fn used_percentage(total: u64, free: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let ratio = 1.0 - (free as f64 / total as f64);
    (ratio * 100.0).round().clamp(0.0, 100.0) as u8
}
