use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Map, Value};

use crate::codec::{Decode, DecodeResult, Decoder, Encode, Encoder, Versioned};
use crate::daemon::Daemon;
use crate::dump::{object_section, Dump};

pub const NO_DAEMONS_SUMMARY: &str = "no daemons active";
pub const UNKNOWN_BUCKET: &str = "unknown";

const SUMMARY_FIELD: &str = "summary";

/// A named group of daemons, keyed by daemon name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Service {
    pub daemons: BTreeMap<String, Daemon>,
    /// Replaces the computed summary when non-empty.
    pub summary: String,
}

impl Service {
    pub fn daemon(&self, name: &str) -> Option<&Daemon> {
        self.daemons.get(name)
    }

    /// One-line status, e.g. `3 portals active (gateway0, gateway1, gateway2)`.
    ///
    /// Daemons are grouped by their `daemon_type` metadata and listed by
    /// their `daemon_prefix` (or name). Groups and labels come out sorted.
    pub fn get_summary(&self) -> String {
        if !self.summary.is_empty() {
            return self.summary.clone();
        }
        if self.daemons.is_empty() {
            return NO_DAEMONS_SUMMARY.to_string();
        }

        let mut labels_by_type: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for (name, daemon) in &self.daemons {
            labels_by_type
                .entry(daemon.daemon_type())
                .or_default()
                .insert(daemon.label(name));
        }

        labels_by_type
            .iter()
            .map(|(daemon_type, labels)| {
                let count = labels.len();
                let plural = if count > 1 { "s" } else { "" };
                let listed = labels.iter().copied().collect::<Vec<_>>().join(", ");
                format!("{count} {daemon_type}{plural} active ({listed})")
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn has_running_tasks(&self) -> bool {
        self.daemons
            .values()
            .any(|daemon| !daemon.task_status.is_empty())
    }

    /// Multi-line task report grouped by task name:
    ///
    /// ```text
    ///
    ///     sync:
    ///         rgw.a: running
    ///         rgw.b: idle
    /// ```
    ///
    /// Empty when no daemon reports any task.
    pub fn get_task_summary(&self, prefix: &str) -> String {
        let mut by_task: BTreeMap<&str, BTreeMap<String, &str>> = BTreeMap::new();
        for (name, daemon) in &self.daemons {
            for (task, status) in &daemon.task_status {
                by_task
                    .entry(task.as_str())
                    .or_default()
                    .insert(format!("{prefix}.{name}"), status.as_str());
            }
        }

        let mut out = String::new();
        for (task, statuses) in &by_task {
            out.push_str(&format!("\n    {task}:"));
            for (id, status) in statuses {
                out.push_str(&format!("\n        {id}: {status}"));
            }
        }
        out
    }

    /// Histogram of `field` across daemons; daemons without it count
    /// under `"unknown"`.
    pub fn count_metadata(&self, field: &str) -> BTreeMap<String, u32> {
        let mut out = BTreeMap::new();
        self.count_metadata_into(field, &mut out);
        out
    }

    /// Adds this service's daemons to an existing histogram.
    pub fn count_metadata_into(&self, field: &str, out: &mut BTreeMap<String, u32>) {
        for daemon in self.daemons.values() {
            let bucket = daemon
                .metadata
                .get(field)
                .map(String::as_str)
                .unwrap_or(UNKNOWN_BUCKET);
            *out.entry(bucket.to_string()).or_insert(0) += 1;
        }
    }
}

impl Versioned for Service {
    const TYPE_NAME: &'static str = "Service";
    const VERSION: u8 = 1;
    const COMPAT: u8 = 1;
}

impl Encode for Service {
    fn encode(&self, enc: &mut Encoder) {
        enc.versioned(Self::VERSION, Self::COMPAT, |enc| {
            enc.encode(&self.daemons);
            enc.encode(&self.summary);
        });
    }
}

impl Decode for Service {
    fn decode(dec: &mut Decoder<'_>) -> DecodeResult<Self> {
        dec.versioned(Self::TYPE_NAME, Self::VERSION, |dec, _struct_v| {
            let daemons = dec.decode()?;
            let summary = dec.decode()?;
            Ok(Service { daemons, summary })
        })
    }
}

impl Dump for Service {
    // The summary lives inside the daemons section next to the daemon
    // objects; status tooling reads it from there. A daemon named
    // "summary" keeps that key and the summary moves up beside "daemons".
    fn dump(&self) -> Value {
        let summary = Value::String(self.summary.clone());
        let mut daemons = object_section(&self.daemons);
        if daemons.contains_key(SUMMARY_FIELD) {
            let mut service = Map::new();
            service.insert("daemons".to_string(), Value::Object(daemons));
            service.insert(SUMMARY_FIELD.to_string(), summary);
            return Value::Object(service);
        }
        daemons.insert(SUMMARY_FIELD.to_string(), summary);
        json!({ "daemons": daemons })
    }
}
