//! mqk-rb-events (ambient)
//!
//! `EventSink` trait plus a concrete `JsonlEventSink`, grounded on
//! `mqk-audit::AuditWriter`: append-only, canonical (sorted-key) JSON
//! lines, with an optional hash chain for tamper-evidence across a run.
//! Every event the engine emits (position lifecycle, grace/core-asset
//! transitions, and a `protection_decision` per consulted request) goes
//! through this trait; per spec.md §6/§7 a sink failure is logged to a
//! secondary diagnostic channel and never fails a rebalance.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Closed set of event kinds the engine emits (spec.md §6).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PositionOpen,
    PositionClose,
    PositionAdjust,
    GraceStart,
    GraceDecay,
    GraceRecovery,
    GraceForceClose,
    CoreMarked,
    CoreRevoked,
    ProtectionDecision,
    ProtectionError,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::PositionOpen => "position_open",
            EventKind::PositionClose => "position_close",
            EventKind::PositionAdjust => "position_adjust",
            EventKind::GraceStart => "grace_start",
            EventKind::GraceDecay => "grace_decay",
            EventKind::GraceRecovery => "grace_recovery",
            EventKind::GraceForceClose => "grace_force_close",
            EventKind::CoreMarked => "core_marked",
            EventKind::CoreRevoked => "core_revoked",
            EventKind::ProtectionDecision => "protection_decision",
            EventKind::ProtectionError => "protection_error",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One emitted event, per spec.md §6's `{timestamp, session_id, trace_id,
/// asset, before, after, reason, metadata}` shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub session_id: Uuid,
    pub trace_id: Uuid,
    pub asset: String,
    pub before: Value,
    pub after: Value,
    pub reason: String,
    pub metadata: Value,
}

impl Event {
    pub fn new(kind: EventKind, session_id: Uuid, asset: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            session_id,
            trace_id: Uuid::new_v4(),
            asset: asset.into(),
            before: Value::Null,
            after: Value::Null,
            reason: reason.into(),
            metadata: Value::Null,
        }
    }

    pub fn with_before(mut self, before: Value) -> Self {
        self.before = before;
        self
    }

    pub fn with_after(mut self, after: Value) -> Self {
        self.after = after;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Write-only event destination. Implementations must not let an IO
/// failure propagate out of `emit` — the rebalance that produced the
/// event has already completed (spec.md §7's "event sink error: never
/// propagated").
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Discards every event. Useful for tests and callers that only care
/// about the returned target list.
#[derive(Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: Event) {}
}

/// Collects events in memory, in emission order. Useful for tests that
/// assert on the event stream.
#[derive(Default)]
pub struct VecEventSink {
    events: Mutex<Vec<Event>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<Event> {
        std::mem::take(&mut self.events.lock().expect("event sink mutex poisoned"))
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.events.lock().expect("event sink mutex poisoned").clone()
    }
}

impl EventSink for VecEventSink {
    fn emit(&self, event: Event) {
        self.events.lock().expect("event sink mutex poisoned").push(event);
    }
}

/// Append-only JSON-Lines event journal, grounded on
/// `mqk-audit::AuditWriter`. One canonical (sorted-key) JSON object per
/// line; an optional SHA-256 hash chain makes the file tamper-evident.
/// IO failures are swallowed into a `tracing::error!` diagnostic, never
/// returned to the caller — `emit` has no `Result` to give one.
pub struct JsonlEventSink {
    path: PathBuf,
    hash_chain: bool,
    state: Mutex<Option<String>>,
}

impl JsonlEventSink {
    pub fn new(path: impl AsRef<Path>, hash_chain: bool) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            hash_chain,
            state: Mutex::new(None),
        })
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let mut f = OpenOptions::new().create(true).append(true).open(&self.path)?;
        f.write_all(line.as_bytes())?;
        f.write_all(b"\n")
    }
}

#[derive(Serialize)]
struct JournaledEvent<'a> {
    #[serde(flatten)]
    event: &'a Event,
    hash_prev: Option<String>,
    hash_self: Option<String>,
}

fn canonical_json(v: &Value) -> String {
    serde_json::to_string(&sort_keys(v)).expect("json serialization must not fail")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

impl EventSink for JsonlEventSink {
    fn emit(&self, event: Event) {
        let mut state = self.state.lock().expect("event sink mutex poisoned");

        let hash_prev = if self.hash_chain { state.clone() } else { None };
        let raw = serde_json::to_value(JournaledEvent {
            event: &event,
            hash_prev: hash_prev.clone(),
            hash_self: None,
        })
        .expect("event serialization must not fail");
        let line_without_self = canonical_json(&raw);

        let hash_self = if self.hash_chain {
            let mut hasher = Sha256::new();
            hasher.update(line_without_self.as_bytes());
            Some(hex::encode(hasher.finalize()))
        } else {
            None
        };

        let final_line = if self.hash_chain {
            let raw = serde_json::to_value(JournaledEvent {
                event: &event,
                hash_prev,
                hash_self: hash_self.clone(),
            })
            .expect("event serialization must not fail");
            canonical_json(&raw)
        } else {
            line_without_self
        };

        if let Err(err) = self.append_line(&final_line) {
            tracing::error!(path = %self.path.display(), error = %err, "event sink write failed");
            return;
        }
        *state = hash_self;
    }
}
