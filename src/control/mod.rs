// src/control/mod.rs

//! Control surface shared by the CLI, the daemon and the reconciler.
//!
//! Every operation takes a [`Target`] (id, name or selector), runs the record
//! state machine against the OS, persists the result through the
//! [`Registry`], and reports an [`Outcome`]. Errors never escape as `Err`:
//! they are folded into hard-failure outcomes so batch operations can keep
//! going past a bad record.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::{ConfigFile, ProcessSettings};
use crate::errors::{Result, WardenError};
use crate::os::{descendants, kill_tree, wait_for_exit, KillReport, ProcessTable, SystemProcesses};
use crate::record::{is_reserved_name, Record, RecordDefaults, RecordSpec, Spawned, Termination};
use crate::registry::{Registry, Resolution};
use crate::tracker::HandleTracker;
use crate::types::Target;

pub mod outcome;

pub use outcome::{Outcome, Payload};

#[derive(Debug, Clone)]
pub struct Supervisor {
    registry: Arc<Registry>,
    os: Arc<dyn ProcessTable>,
    tracker: Arc<HandleTracker>,
    process: ProcessSettings,
    defaults: RecordDefaults,
}

impl Supervisor {
    pub fn new(
        registry: Arc<Registry>,
        os: Arc<dyn ProcessTable>,
        tracker: Arc<HandleTracker>,
        cfg: &ConfigFile,
    ) -> Self {
        Self {
            registry,
            os,
            tracker,
            process: cfg.process.clone(),
            defaults: RecordDefaults::from(cfg),
        }
    }

    /// Production wiring: store from `cfg`, the live process table, and a
    /// fresh handle tracker.
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        let registry = Arc::new(Registry::from_config(cfg)?);
        let tracker = Arc::new(HandleTracker::new(cfg.tracker));
        Ok(Self::new(registry, Arc::new(SystemProcesses::new()), tracker, cfg))
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn tracker(&self) -> &Arc<HandleTracker> {
        &self.tracker
    }

    pub fn process_table(&self) -> &Arc<dyn ProcessTable> {
        &self.os
    }

    pub fn defaults(&self) -> &RecordDefaults {
        &self.defaults
    }

    /// Create a user record. Reserved (dunder) names are refused.
    pub fn create(&self, spec: RecordSpec, overwrite: bool) -> Outcome {
        if let Some(name) = spec.name.as_deref().filter(|n| is_reserved_name(n.trim())) {
            return Outcome::from_error(&WardenError::Validation(format!(
                "name '{name}' is reserved for internal records"
            )));
        }
        self.create_internal(spec, overwrite)
    }

    /// Create a record without the reserved-name check.
    pub fn create_internal(&self, spec: RecordSpec, overwrite: bool) -> Outcome {
        match self.registry.insert(spec, &self.defaults, overwrite) {
            Ok(record) => Outcome::ok(format!("created {record}")).with_record(record),
            Err(e) => {
                debug!(error = %e, "create refused");
                Outcome::from_error(&e)
            }
        }
    }

    /// Probe liveness and persist a self-healed pid.
    ///
    /// Returns the (possibly healed) record and whether it is running.
    pub fn probe(&self, record: &Record) -> Result<(Record, bool)> {
        let mut current = record.clone();
        let running = current.is_running(self.os.as_ref());
        if current.pid != record.pid {
            self.persist(&current)?;
        }
        Ok((current, running))
    }

    /// Matched records with their liveness refreshed.
    pub fn list(&self, target: &Target) -> Outcome {
        let resolution = match self.registry.resolve(target) {
            Ok(resolution) => resolution,
            Err(e) => return Outcome::from_error(&e),
        };
        if resolution.is_empty() {
            return not_found(&resolution);
        }

        let mut records = Vec::with_capacity(resolution.records.len());
        for record in &resolution.records {
            match self.probe(record) {
                Ok((record, _)) => records.push(record),
                Err(e) => return Outcome::from_error(&e),
            }
        }

        Outcome::ok(format!("{} record(s)", records.len())).with_payload(Payload::Records(records))
    }

    pub fn status(&self, target: &Target) -> Outcome {
        self.for_each("status", target, |sup, record| match sup.probe(&record) {
            Ok((record, true)) => {
                let pid = record.pid.map_or_else(|| "?".to_string(), |p| p.to_string());
                Outcome::ok(format!("{record} is running (pid {pid})")).with_record(record)
            }
            Ok((record, false)) => {
                Outcome::ok(format!("{record} is stopped")).with_record(record)
            }
            Err(e) => Outcome::from_error(&e),
        })
    }

    pub fn start(&self, target: &Target) -> Outcome {
        self.for_each("start", target, |sup, record| sup.start_record(record))
    }

    pub fn stop(&self, target: &Target) -> Outcome {
        self.for_each("stop", target, |sup, record| sup.stop_record(record))
    }

    /// Stop then start. A tree that survives the stop aborts the restart.
    pub fn restart(&self, target: &Target) -> Outcome {
        self.for_each("restart", target, |sup, record| {
            let stopped = sup.stop_record(record);
            let survived = matches!(
                &stopped.payload,
                Payload::Termination { report, .. } if !report.is_complete()
            );
            if stopped.hard_failure || survived {
                return Outcome {
                    message: format!("restart aborted: {}", stopped.message),
                    ..stopped
                };
            }
            let Some(record) = stopped.record().cloned() else {
                return stopped;
            };
            let started = sup.start_record(record);
            Outcome {
                message: format!("{}; {}", stopped.message, started.message),
                ..started
            }
        })
    }

    /// Stop and delete. A record whose tree survived the stop is kept.
    pub fn remove(&self, target: &Target) -> Outcome {
        self.for_each("remove", target, |sup, record| {
            let stopped = sup.stop_record(record);
            if stopped.hard_failure {
                return stopped;
            }
            if let Payload::Termination { report, .. } = &stopped.payload {
                if !report.is_complete() {
                    return Outcome {
                        message: format!("not removed: {}", stopped.message),
                        ..stopped
                    };
                }
            }

            let Some(record) = stopped.record().cloned() else {
                return stopped;
            };
            match sup.registry.remove(&record.id.into()) {
                Ok(Some(removed)) => Outcome::ok(format!("removed {removed}")).with_record(removed),
                Ok(None) => Outcome::from_error(&WardenError::NotFound(format!(
                    "{record} disappeared before removal"
                ))),
                Err(e) => Outcome::from_error(&e),
            }
        })
    }

    /// Zero the restart counter.
    pub fn reset(&self, target: &Target) -> Outcome {
        self.for_each("reset", target, |sup, mut record| {
            record.reset();
            match sup.persist(&record) {
                Ok(()) => {
                    Outcome::ok(format!("reset restart counter of {record}")).with_record(record)
                }
                Err(e) => Outcome::from_error(&e),
            }
        })
    }

    /// Rename a single record. Selectors are refused.
    pub fn rename(&self, target: &Target, new_name: &str) -> Outcome {
        let Target::Key(key) = target else {
            return Outcome::from_error(&WardenError::Validation(format!(
                "cannot rename selector '{target}'"
            )));
        };
        if is_reserved_name(new_name.trim()) {
            return Outcome::from_error(&WardenError::Validation(format!(
                "name '{new_name}' is reserved for internal records"
            )));
        }
        match self.registry.rename(key, new_name) {
            Ok(record) => Outcome::ok(format!("renamed to {record}")).with_record(record),
            Err(e) => Outcome::from_error(&e),
        }
    }

    /// Every record, hidden included, without probing.
    pub fn dump(&self) -> Outcome {
        match self.registry.all() {
            Ok(records) => Outcome::ok(format!("{} record(s)", records.len()))
                .with_payload(Payload::Records(records)),
            Err(e) => Outcome::from_error(&e),
        }
    }

    /// Start one record and hand the child to the tracker.
    pub fn start_record(&self, mut record: Record) -> Outcome {
        let pid_before = record.pid;
        match record.spawn(self.os.as_ref(), self.process.interpreter.as_deref()) {
            Ok(Spawned::AlreadyRunning(pid)) => {
                Outcome::warning(format!("{record} is already running (pid {pid})"))
                    .with_record(record)
            }
            Ok(Spawned::Started(child)) => {
                let pid = self.tracker.register(child);
                if let Err(e) = self.persist(&record) {
                    error!(
                        id = record.id,
                        pid,
                        error = %e,
                        "started process could not be recorded; terminating it"
                    );
                    self.kill(pid);
                    return Outcome::from_error(&e);
                }
                Outcome::ok(format!("started {record} (pid {pid})")).with_record(record)
            }
            Err(e) => {
                // The probe inside spawn may have healed a stale pid.
                if record.pid != pid_before {
                    if let Err(persist_err) = self.persist(&record) {
                        warn!(id = record.id, error = %persist_err, "could not persist healed pid");
                    }
                }
                warn!(id = record.id, name = %record.name, error = %e, "start refused");
                Outcome::from_error(&e).with_record(record)
            }
        }
    }

    /// Stop one record and suspend its autorun.
    ///
    /// Internal records (`__reconciler__`, `__supervisor__`) are stopped
    /// root-only: the processes they spawned are supervised records of their
    /// own and keep running.
    pub fn stop_record(&self, mut record: Record) -> Outcome {
        record.is_running(self.os.as_ref());
        let termination = if record.is_hidden() {
            record.terminate_with(|pid| self.kill_root(pid))
        } else {
            record.terminate_with(|pid| self.kill(pid))
        };
        record.suspend_autorun();

        if let Err(e) = self.persist(&record) {
            return Outcome::from_error(&e);
        }

        match termination {
            Termination::NotRunning => {
                Outcome::warning(format!("{record} is not running")).with_record(record)
            }
            Termination::Stopped(report) => Outcome::ok(format!("stopped {record}"))
                .with_payload(Payload::Termination {
                    record: Box::new(record),
                    report,
                }),
            Termination::Partial(report) => Outcome::warning(format!(
                "{record}: {} process(es) still alive after termination: {:?}",
                report.alive.len(),
                report.alive
            ))
            .with_payload(Payload::Termination {
                record: Box::new(record),
                report,
            }),
        }
    }

    /// Terminate `pid` and its descendants.
    ///
    /// A child spawned by this process is signalled through its handle;
    /// anything else goes through the OS tree-kill.
    fn kill(&self, pid: u32) -> KillReport {
        let os = self.os.as_ref();
        if !self.tracker.contains(pid) {
            return kill_tree(os, pid, self.process.kill_timeout, self.process.kill_poll);
        }

        // Descendants are reparented once the root exits; collect them first.
        let children = descendants(&os.snapshot(), pid);
        let mut report = self
            .tracker
            .terminate(pid)
            .unwrap_or_else(|| KillReport::gone([pid]));

        if !children.is_empty() {
            for &child in &children {
                if let Err(e) = os.terminate(child) {
                    debug!(pid = child, error = %e, "descendant not signalled");
                }
            }
            report.merge(wait_for_exit(
                os,
                children,
                self.process.kill_timeout,
                self.process.kill_poll,
            ));
        }
        report
    }

    /// Terminate `pid` alone, leaving its descendants untouched.
    fn kill_root(&self, pid: u32) -> KillReport {
        if let Some(report) = self.tracker.terminate(pid) {
            return report;
        }

        let os = self.os.as_ref();
        if let Err(e) = os.terminate(pid) {
            debug!(pid, error = %e, "root not signalled");
        }
        wait_for_exit(os, vec![pid], self.process.kill_timeout, self.process.kill_poll)
    }

    fn persist(&self, record: &Record) -> Result<()> {
        if self.registry.update(record)? {
            Ok(())
        } else {
            Err(WardenError::NotFound(format!("{record} was removed concurrently")))
        }
    }

    /// Run `op` on every record `target` matches.
    ///
    /// A literal key that matches nothing is a hard failure; a selector that
    /// matches nothing is a warning. Selectors always produce a batch.
    fn for_each(
        &self,
        verb: &str,
        target: &Target,
        op: impl Fn(&Self, Record) -> Outcome,
    ) -> Outcome {
        let resolution = match self.registry.resolve(target) {
            Ok(resolution) => resolution,
            Err(e) => return Outcome::from_error(&e),
        };

        if !resolution.is_batch() {
            if resolution.is_empty() {
                return not_found(&resolution);
            }
            let mut records = resolution.records;
            return op(self, records.remove(0));
        }

        let items: Vec<Outcome> = resolution
            .records
            .into_iter()
            .map(|record| op(self, record))
            .collect();

        let summary = Outcome::batch(verb, &target.to_string(), items);
        info!(verb, target = %target, message = %summary.message, "batch finished");
        summary
    }
}

fn not_found(resolution: &Resolution) -> Outcome {
    if resolution.is_batch() {
        Outcome::warning(format!("no records match '{}'", resolution.target))
    } else {
        Outcome::from_error(&WardenError::NotFound(resolution.target.to_string()))
    }
}
