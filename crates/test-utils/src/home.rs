use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use warden::config::{ConfigFile, RawConfigFile};
use warden::control::Supervisor;
use warden::os::{ProcessTable, SystemProcesses};
use warden::record::RecordDefaults;
use warden::registry::Registry;
use warden::tracker::HandleTracker;

/// A throwaway warden home with short timeouts.
pub struct TestHome {
    dir: TempDir,
    pub config: ConfigFile,
}

impl TestHome {
    pub fn new() -> Self {
        Self::with_raw(|_| {})
    }

    /// Start from the fast test settings and let `tweak` adjust them.
    pub fn with_raw(tweak: impl FnOnce(&mut RawConfigFile)) -> Self {
        let dir = tempfile::tempdir().expect("create temp home");

        let mut raw = RawConfigFile {
            home_dir: dir.path().to_path_buf(),
            ..RawConfigFile::default()
        };
        raw.registry.lock_timeout = "2s".to_string();
        raw.registry.lock_poll = "5ms".to_string();
        raw.process.kill_timeout = "2s".to_string();
        raw.process.kill_poll = "10ms".to_string();
        raw.tracker.reap_interval = "20ms".to_string();
        raw.tracker.kill_retries = 200;
        raw.tracker.kill_retry_delay = "10ms".to_string();
        raw.reconciler.interval = "50ms".to_string();
        tweak(&mut raw);

        let config = ConfigFile::try_from(raw).expect("valid test config");
        Self { dir, config }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn defaults(&self) -> RecordDefaults {
        RecordDefaults::from(&self.config)
    }

    pub fn registry(&self) -> Registry {
        Registry::from_config(&self.config).expect("open registry")
    }

    /// Supervisor over the live OS process table.
    pub fn supervisor(&self) -> Supervisor {
        self.supervisor_with(Arc::new(SystemProcesses::new()))
    }

    /// Supervisor over a scripted process table.
    pub fn supervisor_with(&self, os: Arc<dyn ProcessTable>) -> Supervisor {
        let registry = Arc::new(self.registry());
        let tracker = Arc::new(HandleTracker::new(self.config.tracker));
        Supervisor::new(registry, os, tracker, &self.config)
    }
}

impl Default for TestHome {
    fn default() -> Self {
        Self::new()
    }
}
