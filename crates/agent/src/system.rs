//! System monitoring

use sysinfo::System;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// System monitor wrapping `sysinfo`
pub struct SystemMonitor {
    system: System,
}

impl SystemMonitor {
    /// Create new system monitor
    pub fn new() -> Self {
        let mut system = System::new_all();
        system.refresh_all();

        Self { system }
    }

    /// Update system metrics
    pub fn update(&mut self) {
        self.system.refresh_all();
    }

    /// Get CPU count
    pub fn cpu_count(&self) -> usize {
        num_cpus::get()
    }

    /// Get total memory in GB
    pub fn total_memory_gb(&self) -> f64 {
        self.system.total_memory() as f64 / BYTES_PER_GB
    }

    /// Get used memory in GB
    pub fn used_memory_gb(&self) -> f64 {
        self.system.used_memory() as f64 / BYTES_PER_GB
    }

    /// Get CPU usage percentage
    pub fn cpu_usage(&self) -> f64 {
        self.system.global_cpu_usage() as f64
    }

    /// Get RAM usage percentage
    pub fn ram_usage(&self) -> f64 {
        let total = self.system.total_memory();
        if total == 0 {
            return 0.0;
        }
        self.system.used_memory() as f64 / total as f64 * 100.0
    }

    /// Operating system name
    pub fn os_name(&self) -> String {
        System::name().unwrap_or_else(|| std::env::consts::OS.to_string())
    }

    /// CPU architecture
    pub fn arch(&self) -> String {
        std::env::consts::ARCH.to_string()
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}
