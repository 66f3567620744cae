// src/reconcile/mod.rs

//! Autorun reconciler.
//!
//! Every `interval`, resolve `autorun_enabled` and start each match whose
//! liveness probe says it is not running. Starts go through the same
//! [`Supervisor`] path as manual ones, so `max_restart` bounds crash loops.
//! A failing record is logged and skipped; the pass carries on. A record at
//! its ceiling is reported as a warning on every pass and logged once until
//! it drops below the ceiling again.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::control::{Outcome, Supervisor};
use crate::types::{Selector, Target};

#[derive(Debug)]
pub struct Reconciler {
    supervisor: Supervisor,
    interval: Duration,
    exhausted: Mutex<HashSet<u32>>,
}

impl Reconciler {
    pub fn new(supervisor: Supervisor, interval: Duration) -> Self {
        Self {
            supervisor,
            interval,
            exhausted: Mutex::new(HashSet::new()),
        }
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// One evaluation of every autorun-enabled record.
    ///
    /// Returns one outcome per start attempted, per record that could not be
    /// probed, and per record held back by its restart ceiling. Running
    /// records produce nothing.
    pub fn pass(&self) -> Vec<Outcome> {
        let target = Target::Selector(Selector::AutorunEnabled);
        let resolution = match self.supervisor.registry().resolve(&target) {
            Ok(resolution) => resolution,
            Err(e) => {
                error!(error = %e, "reconcile pass could not read the registry");
                return vec![Outcome::from_error(&e)];
            }
        };

        let mut outcomes = Vec::new();
        let mut exhausted = self.exhausted.lock().unwrap_or_else(PoisonError::into_inner);
        for record in resolution.records {
            let record = match self.supervisor.probe(&record) {
                Ok((record, true)) => {
                    exhausted.remove(&record.id);
                    continue;
                }
                Ok((record, false)) => record,
                Err(e) => {
                    warn!(id = record.id, name = %record.name, error = %e, "probe failed");
                    outcomes.push(Outcome::from_error(&e));
                    continue;
                }
            };

            if record.restart >= record.max_restart {
                if exhausted.insert(record.id) {
                    warn!(
                        id = record.id,
                        name = %record.name,
                        restart = record.restart,
                        max_restart = record.max_restart,
                        "restart ceiling reached; no longer restarting"
                    );
                } else {
                    debug!(id = record.id, name = %record.name, "still at restart ceiling");
                }
                outcomes.push(
                    Outcome::warning(format!(
                        "{record} is down and at its restart limit ({}/{})",
                        record.restart, record.max_restart
                    ))
                    .with_record(record),
                );
                continue;
            }
            exhausted.remove(&record.id);

            info!(id = record.id, name = %record.name, "autorun record is down; starting");
            let outcome = self.supervisor.start_record(record);
            if outcome.hard_failure {
                warn!(message = %outcome.message, "autorun start failed");
            }
            outcomes.push(outcome);
        }

        outcomes
    }

    /// Run passes until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// Passes block on the store lock and on process creation, so each one
    /// runs on the blocking pool.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(every = ?self.interval, "reconciler started");

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let this = Arc::clone(&self);
                    match tokio::task::spawn_blocking(move || this.pass()).await {
                        Ok(outcomes) => {
                            let started = outcomes.iter().filter(|o| o.is_success()).count();
                            let failed = outcomes.iter().filter(|o| o.hard_failure).count();
                            if started + failed > 0 {
                                info!(started, failed, "reconcile pass finished");
                            } else {
                                debug!(reported = outcomes.len(), "reconcile pass: nothing started");
                            }
                        }
                        Err(e) => error!(error = %e, "reconcile pass aborted"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("reconciler stopped");
    }
}
