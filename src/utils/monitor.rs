use std::time::{Duration, Instant};

/// 單一階段 (extract / transform / load) 的耗時與記憶體
#[derive(Debug, Clone)]
pub struct PhaseStats {
    pub phase: String,
    pub elapsed: Duration,
    pub memory_mb: Option<u64>,
}

/// 執行期監控：記錄各階段耗時，CLI 版另外取樣行程記憶體
pub struct RunMonitor {
    enabled: bool,
    started: Instant,
    phase_started: Instant,
    phases: Vec<PhaseStats>,
    #[cfg(feature = "cli")]
    system: Option<sysinfo::System>,
}

impl RunMonitor {
    pub fn new(enabled: bool) -> Self {
        let now = Instant::now();
        Self {
            enabled,
            started: now,
            phase_started: now,
            phases: Vec::new(),
            #[cfg(feature = "cli")]
            system: enabled.then(sysinfo::System::new),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn start_phase(&mut self) {
        self.phase_started = Instant::now();
    }

    pub fn finish_phase(&mut self, phase: &str) {
        if !self.enabled {
            return;
        }

        let stats = PhaseStats {
            phase: phase.to_string(),
            elapsed: self.phase_started.elapsed(),
            memory_mb: self.sample_memory_mb(),
        };

        match stats.memory_mb {
            Some(mb) => tracing::info!("📊 {} - Time: {:?}, Memory: {}MB", phase, stats.elapsed, mb),
            None => tracing::info!("📊 {} - Time: {:?}", phase, stats.elapsed),
        }
        self.phases.push(stats);
    }

    pub fn phases(&self) -> &[PhaseStats] {
        &self.phases
    }

    pub fn peak_memory_mb(&self) -> Option<u64> {
        self.phases.iter().filter_map(|p| p.memory_mb).max()
    }

    pub fn log_final_stats(&self) {
        if !self.enabled {
            return;
        }
        match self.peak_memory_mb() {
            Some(peak) => tracing::info!(
                "📊 Final Stats - Total Time: {:?}, Peak Memory: {}MB",
                self.started.elapsed(),
                peak
            ),
            None => tracing::info!("📊 Final Stats - Total Time: {:?}", self.started.elapsed()),
        }
    }

    #[cfg(feature = "cli")]
    fn sample_memory_mb(&mut self) -> Option<u64> {
        let system = self.system.as_mut()?;
        let pid = sysinfo::get_current_pid().ok()?;
        system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
        system.process(pid).map(|p| p.memory() / 1024 / 1024)
    }

    #[cfg(not(feature = "cli"))]
    fn sample_memory_mb(&mut self) -> Option<u64> {
        None
    }
}

impl Default for RunMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}
