//! Task batch model — the validated form of an operator submission.
//!
//! A batch is built once by the schema validator and handed to the
//! correlator for a single round trip. Nothing here mutates after
//! construction.

use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

// ── Opcode ────────────────────────────────────────────────────────────────────

/// Operation a mesh device is asked to perform or report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Opcode {
    GetStatus,
    GetCadence,
    GetDescriptor,
    GetSetting,
    GetSeries,
    GetColumn,
}

impl Opcode {
    /// Canonical opcode set, in wire-documentation order.
    pub const ALL: [Opcode; 6] = [
        Opcode::GetStatus,
        Opcode::GetCadence,
        Opcode::GetDescriptor,
        Opcode::GetSetting,
        Opcode::GetSeries,
        Opcode::GetColumn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetStatus => "GET_STATUS",
            Self::GetCadence => "GET_CADENCE",
            Self::GetDescriptor => "GET_DESCRIPTOR",
            Self::GetSetting => "GET_SETTING",
            Self::GetSeries => "GET_SERIES",
            Self::GetColumn => "GET_COLUMN",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown opcode: {0}")]
pub struct UnknownOpcode(pub String);

impl FromStr for Opcode {
    type Err = UnknownOpcode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| UnknownOpcode(s.to_string()))
    }
}

// ── HexId ─────────────────────────────────────────────────────────────────────

/// Four hex digits identifying a mesh node (`addr`) or a sensor property
/// (`sensor_prop_id`).
///
/// The operator's casing is kept as written so that re-validating a
/// serialized batch yields the same batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexId {
    raw: String,
    value: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HexIdError {
    #[error("has to be 4 characters long, got {0}")]
    Length(usize),
    #[error("contains a character outside 0-9A-F")]
    Charset,
}

impl HexId {
    pub const LEN: usize = 4;

    /// Length is counted in characters and checked before the charset.
    pub fn parse(s: &str) -> Result<Self, HexIdError> {
        let len = s.chars().count();
        if len != Self::LEN {
            return Err(HexIdError::Length(len));
        }
        let bytes = hex::decode(s).map_err(|_| HexIdError::Charset)?;
        let value = u16::from_be_bytes([bytes[0], bytes[1]]);
        Ok(Self {
            raw: s.to_string(),
            value,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn value(&self) -> u16 {
        self.value
    }
}

impl fmt::Display for HexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for HexId {
    type Error = HexIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<HexId> for String {
    fn from(id: HexId) -> Self {
        id.raw
    }
}

// ── Actions ───────────────────────────────────────────────────────────────────

/// Recurring-task metadata. Only present when the schema rules required it,
/// in which case `auto: true` is emitted alongside it on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub name: String,
    /// Seconds between executions.
    pub delay: u64,
}

/// A command sent to one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestAction {
    pub opcode: Opcode,
    pub addr: HexId,
    pub schedule: Option<Schedule>,
    pub sensor_prop_id: Option<HexId>,
}

/// One entry of a batch: either removal of a scheduled task by name,
/// or a request to a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskAction {
    Remove { name: String },
    Request(RequestAction),
}

impl TaskAction {
    pub fn remove(name: impl Into<String>) -> Self {
        Self::Remove { name: name.into() }
    }

    /// Opcode of a request; `None` for removals.
    pub fn opcode(&self) -> Option<Opcode> {
        match self {
            Self::Remove { .. } => None,
            Self::Request(req) => Some(req.opcode),
        }
    }
}

impl Serialize for RequestAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut len = 2;
        if self.schedule.is_some() {
            len += 3;
        }
        if self.sensor_prop_id.is_some() {
            len += 1;
        }

        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("opcode", &self.opcode)?;
        map.serialize_entry("addr", &self.addr)?;
        if let Some(schedule) = &self.schedule {
            map.serialize_entry("auto", &true)?;
            map.serialize_entry("delay", &schedule.delay)?;
            map.serialize_entry("name", &schedule.name)?;
        }
        if let Some(id) = &self.sensor_prop_id {
            map.serialize_entry("sensor_prop_id", id)?;
        }
        map.end()
    }
}

impl Serialize for TaskAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Remove { name } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("name", name)?;
                map.end()
            }
            Self::Request(req) => req.serialize(serializer),
        }
    }
}

// ── Batch ─────────────────────────────────────────────────────────────────────

/// Top-level unit published on the command topic: `{"actions": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskBatch {
    actions: Vec<TaskAction>,
}

impl TaskBatch {
    pub fn new(actions: Vec<TaskAction>) -> Self {
        Self { actions }
    }

    /// A batch that removes each named task.
    pub fn removal<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(names.into_iter().map(TaskAction::remove).collect())
    }

    pub fn actions(&self) -> &[TaskAction] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Opcodes of every request action, in batch order (duplicates kept).
    pub fn requested_opcodes(&self) -> impl Iterator<Item = Opcode> + '_ {
        self.actions.iter().filter_map(TaskAction::opcode)
    }
}
