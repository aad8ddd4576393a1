//! Schema validation — turns operator-edited text into a [`TaskBatch`].
//!
//! Checks run per action in batch order and the first failure rejects the
//! whole batch. Within a request action the order is fixed: opcode presence,
//! opcode validity, addr presence, addr length, addr charset, schedule
//! metadata, sensor_prop_id.

use serde_json::{Map, Value};

use meshtask_core::config::{AutoMetadataMode, SchemaConfig};
use meshtask_core::{HexId, HexIdError, Opcode, RequestAction, Schedule, TaskAction, TaskBatch};

// ── Rules ─────────────────────────────────────────────────────────────────────

/// When `auto: true` requires `delay` and `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoMetadataRule {
    /// Only for the listed opcodes.
    ForOpcodes(Vec<Opcode>),
    /// For every opcode.
    WheneverAuto,
    /// Never. Schedule fields are always stripped.
    Never,
}

impl AutoMetadataRule {
    fn requires_schedule(&self, opcode: Opcode) -> bool {
        match self {
            Self::ForOpcodes(ops) => ops.contains(&opcode),
            Self::WheneverAuto => true,
            Self::Never => false,
        }
    }
}

/// The required-field matrix applied to request actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRules {
    pub opcodes: Vec<Opcode>,
    pub auto_metadata: AutoMetadataRule,
}

impl Default for SchemaRules {
    fn default() -> Self {
        Self {
            opcodes: Opcode::ALL.to_vec(),
            auto_metadata: AutoMetadataRule::ForOpcodes(vec![Opcode::GetStatus]),
        }
    }
}

impl From<&SchemaConfig> for SchemaRules {
    fn from(config: &SchemaConfig) -> Self {
        let auto_metadata = match config.auto_metadata {
            AutoMetadataMode::Opcodes => {
                AutoMetadataRule::ForOpcodes(config.scheduled_opcodes.clone())
            }
            AutoMetadataMode::Always => AutoMetadataRule::WheneverAuto,
            AutoMetadataMode::Never => AutoMetadataRule::Never,
        };
        Self {
            opcodes: config.opcodes.clone(),
            auto_metadata,
        }
    }
}

impl SchemaRules {
    /// Allowed opcodes rendered for error messages: `[GET_STATUS, ...]`.
    pub fn allowed_opcodes(&self) -> String {
        let names: Vec<&str> = self.opcodes.iter().map(Opcode::as_str).collect();
        format!("[{}]", names.join(", "))
    }
}

const HEX_CHARSET: &str = "[0-9A-F] (case-insensitive)";

// ── Errors ────────────────────────────────────────────────────────────────────

/// Fieldless discriminant of [`ValidationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    MalformedPayload,
    MissingActionsField,
    InvalidFieldType,
    MissingOpcode,
    InvalidOpcode,
    MissingAddr,
    InvalidAddrLength,
    InvalidAddrCharset,
    MissingAutoMetadata,
    InvalidSensorPropId,
}

/// Why a submission was rejected. `index` is the zero-based action position.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("payload is not valid JSON: {reason}")]
    MalformedPayload { reason: String },

    #[error("missing actions. Contains a list of actions or tasks to be created/removed")]
    MissingActionsField,

    #[error("action {index}: {field} has to be {expected}")]
    InvalidFieldType {
        index: usize,
        field: &'static str,
        expected: &'static str,
    },

    #[error("action {index}: missing opcode. Has to be within {allowed}")]
    MissingOpcode { index: usize, allowed: String },

    #[error("action {index}: opcode {value} is invalid. Has to be within {allowed}")]
    InvalidOpcode {
        index: usize,
        value: String,
        allowed: String,
    },

    #[error("action {index}: missing addr param. Contains the address to send the message to")]
    MissingAddr { index: usize },

    #[error("action {index}: addr {value:?} is not correct. Has to be 4 characters long")]
    InvalidAddrLength { index: usize, value: String },

    #[error("action {index}: addr {value:?} contains an invalid character. Has to be within [0-9A-F]")]
    InvalidAddrCharset { index: usize, value: String },

    #[error("action {index}: missing {field} param, required for auto {opcode} tasks")]
    MissingAutoMetadata {
        index: usize,
        field: &'static str,
        opcode: Opcode,
    },

    #[error("action {index}: sensor_prop_id {value:?} {reason}")]
    InvalidSensorPropId {
        index: usize,
        value: String,
        reason: HexIdError,
    },
}

impl ValidationError {
    pub fn kind(&self) -> ValidationErrorKind {
        match self {
            Self::MalformedPayload { .. } => ValidationErrorKind::MalformedPayload,
            Self::MissingActionsField => ValidationErrorKind::MissingActionsField,
            Self::InvalidFieldType { .. } => ValidationErrorKind::InvalidFieldType,
            Self::MissingOpcode { .. } => ValidationErrorKind::MissingOpcode,
            Self::InvalidOpcode { .. } => ValidationErrorKind::InvalidOpcode,
            Self::MissingAddr { .. } => ValidationErrorKind::MissingAddr,
            Self::InvalidAddrLength { .. } => ValidationErrorKind::InvalidAddrLength,
            Self::InvalidAddrCharset { .. } => ValidationErrorKind::InvalidAddrCharset,
            Self::MissingAutoMetadata { .. } => ValidationErrorKind::MissingAutoMetadata,
            Self::InvalidSensorPropId { .. } => ValidationErrorKind::InvalidSensorPropId,
        }
    }

    /// Offending action position, when the error concerns one action.
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::MalformedPayload { .. } | Self::MissingActionsField => None,
            Self::InvalidFieldType { index, .. }
            | Self::MissingOpcode { index, .. }
            | Self::InvalidOpcode { index, .. }
            | Self::MissingAddr { index }
            | Self::InvalidAddrLength { index, .. }
            | Self::InvalidAddrCharset { index, .. }
            | Self::MissingAutoMetadata { index, .. }
            | Self::InvalidSensorPropId { index, .. } => Some(*index),
        }
    }

    /// Offending field name.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::MalformedPayload { .. } => None,
            Self::MissingActionsField => Some("actions"),
            Self::InvalidFieldType { field, .. } | Self::MissingAutoMetadata { field, .. } => {
                Some(*field)
            }
            Self::MissingOpcode { .. } | Self::InvalidOpcode { .. } => Some("opcode"),
            Self::MissingAddr { .. }
            | Self::InvalidAddrLength { .. }
            | Self::InvalidAddrCharset { .. } => Some("addr"),
            Self::InvalidSensorPropId { .. } => Some("sensor_prop_id"),
        }
    }

    /// Allowed values for the offending field, when it has a fixed set.
    pub fn allowed(&self) -> Option<String> {
        match self {
            Self::MissingOpcode { allowed, .. } | Self::InvalidOpcode { allowed, .. } => {
                Some(allowed.clone())
            }
            Self::InvalidAddrCharset { .. } | Self::InvalidSensorPropId { .. } => {
                Some(HEX_CHARSET.to_string())
            }
            _ => None,
        }
    }
}

// ── Validator ─────────────────────────────────────────────────────────────────

/// Validate with the canonical rules.
pub fn validate(raw: &str) -> Result<TaskBatch, ValidationError> {
    Validator::default().validate(raw)
}

#[derive(Debug, Clone, Default)]
pub struct Validator {
    rules: SchemaRules,
}

impl Validator {
    pub fn new(rules: SchemaRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &SchemaRules {
        &self.rules
    }

    /// Decode and validate raw text.
    pub fn validate(&self, raw: &str) -> Result<TaskBatch, ValidationError> {
        let doc: Value = serde_json::from_str(raw).map_err(|e| ValidationError::MalformedPayload {
            reason: e.to_string(),
        })?;
        self.validate_value(&doc)
    }

    /// Validate an already-decoded document.
    pub fn validate_value(&self, doc: &Value) -> Result<TaskBatch, ValidationError> {
        let entries = doc
            .get("actions")
            .and_then(Value::as_array)
            .ok_or(ValidationError::MissingActionsField)?;

        let actions = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| self.validate_action(index, entry))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(actions = actions.len(), "task batch validated");
        Ok(TaskBatch::new(actions))
    }

    fn validate_action(&self, index: usize, entry: &Value) -> Result<TaskAction, ValidationError> {
        let fields = entry.as_object().ok_or(ValidationError::InvalidFieldType {
            index,
            field: "action",
            expected: "an object",
        })?;

        if fields.len() == 1 {
            if let Some(name) = fields.get("name") {
                let name = expect_str(index, "name", name)?;
                return Ok(TaskAction::remove(name));
            }
        }

        self.validate_request(index, fields).map(TaskAction::Request)
    }

    fn validate_request(
        &self,
        index: usize,
        fields: &Map<String, Value>,
    ) -> Result<RequestAction, ValidationError> {
        // opcode
        let raw_opcode = fields
            .get("opcode")
            .ok_or_else(|| ValidationError::MissingOpcode {
                index,
                allowed: self.rules.allowed_opcodes(),
            })?;
        let opcode = raw_opcode
            .as_str()
            .and_then(|s| s.parse::<Opcode>().ok())
            .filter(|op| self.rules.opcodes.contains(op))
            .ok_or_else(|| ValidationError::InvalidOpcode {
                index,
                value: display_value(raw_opcode),
                allowed: self.rules.allowed_opcodes(),
            })?;

        // addr
        let raw_addr = fields
            .get("addr")
            .ok_or(ValidationError::MissingAddr { index })?;
        let raw_addr = expect_str(index, "addr", raw_addr)?;
        let addr = HexId::parse(raw_addr).map_err(|e| match e {
            HexIdError::Length(_) => ValidationError::InvalidAddrLength {
                index,
                value: raw_addr.to_string(),
            },
            HexIdError::Charset => ValidationError::InvalidAddrCharset {
                index,
                value: raw_addr.to_string(),
            },
        })?;

        // auto / delay / name; only checked where the rule demands them
        let auto = match fields.get("auto") {
            Some(v) if self.rules.auto_metadata.requires_schedule(opcode) => {
                v.as_bool().ok_or(ValidationError::InvalidFieldType {
                    index,
                    field: "auto",
                    expected: "a boolean",
                })?
            }
            _ => false,
        };
        let schedule = if auto {
            let delay = fields
                .get("delay")
                .ok_or(ValidationError::MissingAutoMetadata {
                    index,
                    field: "delay",
                    opcode,
                })?
                .as_u64()
                .ok_or(ValidationError::InvalidFieldType {
                    index,
                    field: "delay",
                    expected: "a non-negative integer of seconds",
                })?;
            let name = fields
                .get("name")
                .ok_or(ValidationError::MissingAutoMetadata {
                    index,
                    field: "name",
                    opcode,
                })?;
            let name = expect_str(index, "name", name)?;
            Some(Schedule {
                name: name.to_string(),
                delay,
            })
        } else {
            None
        };

        // sensor_prop_id
        let sensor_prop_id = match fields.get("sensor_prop_id") {
            None => None,
            Some(v) => {
                let raw = expect_str(index, "sensor_prop_id", v)?;
                let id = HexId::parse(raw).map_err(|reason| ValidationError::InvalidSensorPropId {
                    index,
                    value: raw.to_string(),
                    reason,
                })?;
                Some(id)
            }
        };

        Ok(RequestAction {
            opcode,
            addr,
            schedule,
            sensor_prop_id,
        })
    }
}

fn expect_str<'a>(
    index: usize,
    field: &'static str,
    value: &'a Value,
) -> Result<&'a str, ValidationError> {
    value.as_str().ok_or(ValidationError::InvalidFieldType {
        index,
        field,
        expected: "a string",
    })
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
