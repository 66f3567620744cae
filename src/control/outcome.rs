// src/control/outcome.rs

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorKind, WardenError};
use crate::os::KillReport;
use crate::record::Record;

/// Uniform result of every control operation.
///
/// `hard_failure` means nothing happened. `warning` means a partial effect or
/// a request that was already satisfied (e.g. stopping a stopped record).
/// `kind` is set when the outcome was built from an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub message: String,
    pub hard_failure: bool,
    pub warning: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(default)]
    pub payload: Payload,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    #[default]
    None,
    Record(Box<Record>),
    Records(Vec<Record>),
    /// A stop: the record afterwards plus which pids exited or survived.
    Termination {
        record: Box<Record>,
        report: KillReport,
    },
    /// One nested outcome per record matched by a selector.
    Batch(Vec<Outcome>),
}

impl Outcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            hard_failure: false,
            warning: false,
            kind: None,
            payload: Payload::None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            warning: true,
            ..Self::ok(message)
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            hard_failure: true,
            ..Self::ok(message)
        }
    }

    pub fn from_error(err: &WardenError) -> Self {
        Self {
            kind: Some(err.kind()),
            ..Self::failure(err.to_string())
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_record(self, record: Record) -> Self {
        self.with_payload(Payload::Record(Box::new(record)))
    }

    /// Summary over per-record outcomes.
    ///
    /// Hard failure only when every item failed; a warning when any item
    /// warned or failed; an empty batch is a warning ("nothing matched").
    pub fn batch(verb: &str, selector: &str, items: Vec<Outcome>) -> Self {
        let total = items.len();
        let failed = items.iter().filter(|o| o.hard_failure).count();
        let warned = items.iter().filter(|o| o.warning).count();
        let succeeded = total - failed - warned;

        let message = if total == 0 {
            format!("{verb} {selector}: no records matched")
        } else {
            format!(
                "{verb} {selector}: {succeeded} ok, {warned} warning(s), {failed} failed (of {total})"
            )
        };

        let outcome = if total == 0 {
            Self::warning(message)
        } else if failed == total {
            Self::failure(message)
        } else if failed > 0 || warned > 0 {
            Self::warning(message)
        } else {
            Self::ok(message)
        };

        outcome.with_payload(Payload::Batch(items))
    }

    pub fn is_success(&self) -> bool {
        !self.hard_failure && !self.warning
    }

    /// The record carried by a single-record payload.
    pub fn record(&self) -> Option<&Record> {
        match &self.payload {
            Payload::Record(record) => Some(&**record),
            Payload::Termination { record, .. } => Some(&**record),
            _ => None,
        }
    }

    pub fn records(&self) -> &[Record] {
        match &self.payload {
            Payload::Records(records) => records,
            _ => &[],
        }
    }

    pub fn items(&self) -> &[Outcome] {
        match &self.payload {
            Payload::Batch(items) => items,
            _ => &[],
        }
    }
}
