//! Typed PLC process variables.
//!
//! A [`Variable`] describes where a value lives inside a PLC data block and
//! how its raw big-endian bytes map to an engineering value. Decoding and
//! encoding are pure: the current value needed for relative changes
//! (`"+"`/`"-"`) is passed in by the caller.

use core::fmt;

use tracing::{debug, warn};

use crate::encoding::{be_uint, put_be_uint};
use crate::error::CodecError;
use crate::ieee754;
use crate::pdu::VariableAddress;

/// Text reported for a state value with no matching entry.
pub const STATE_UNKNOWN: &str = "unknown";

/// Type tag of a PLC variable as exported by the programming tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(from = "u8", into = "u8")
)]
pub enum VarType {
    Bool,
    Int16,
    Float32,
    Int64,
    Schedule,
    Unknown(u8),
}

impl VarType {
    pub const fn from_tag(tag: u8) -> Self {
        match tag {
            0 => Self::Bool,
            2 => Self::Int16,
            13 => Self::Float32,
            18 => Self::Int64,
            64 => Self::Schedule,
            other => Self::Unknown(other),
        }
    }

    pub const fn tag(self) -> u8 {
        match self {
            Self::Bool => 0,
            Self::Int16 => 2,
            Self::Float32 => 13,
            Self::Int64 => 18,
            Self::Schedule => 64,
            Self::Unknown(tag) => tag,
        }
    }
}

impl From<u8> for VarType {
    fn from(tag: u8) -> Self {
        Self::from_tag(tag)
    }
}

impl From<VarType> for u8 {
    fn from(value: VarType) -> Self {
        value.tag()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Permission {
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "ro"))]
    ReadOnly,
    #[cfg_attr(feature = "serde", serde(rename = "rw"))]
    ReadWrite,
}

/// One entry of an enumerated variable.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct State {
    #[cfg_attr(feature = "serde", serde(rename = "state"))]
    pub value: u64,
    pub text: String,
    /// Value selected by `"+"` when this state is current.
    #[cfg_attr(
        feature = "serde",
        serde(rename = "nextstate", default, skip_serializing_if = "Option::is_none")
    )]
    pub next: Option<u64>,
}

impl State {
    pub fn new(value: u64, text: impl Into<String>) -> Self {
        Self {
            value,
            text: text.into(),
            next: None,
        }
    }

    pub fn with_next(mut self, next: u64) -> Self {
        self.next = Some(next);
        self
    }
}

/// Descriptor of a PLC process variable.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Variable {
    pub uid: u32,
    pub offset: u32,
    pub length: u32,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub var_type: VarType,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub name: Option<String>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Vec::is_empty")
    )]
    pub states: Vec<State>,
    #[cfg_attr(
        feature = "serde",
        serde(rename = "min", default, skip_serializing_if = "Option::is_none")
    )]
    pub minimum: Option<f64>,
    #[cfg_attr(
        feature = "serde",
        serde(rename = "max", default, skip_serializing_if = "Option::is_none")
    )]
    pub maximum: Option<f64>,
    /// Increment applied by `"+"`/`"-"` on float variables.
    #[cfg_attr(feature = "serde", serde(default, alias = "step_incr"))]
    pub step: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub perm: Permission,
}

impl Variable {
    pub fn new(uid: u32, offset: u32, length: u32, var_type: VarType) -> Self {
        Self {
            uid,
            offset,
            length,
            var_type,
            name: None,
            states: Vec::new(),
            minimum: None,
            maximum: None,
            step: 0.0,
            perm: Permission::ReadOnly,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_states(mut self, states: Vec<State>) -> Self {
        self.states = states;
        self
    }

    pub fn with_range(mut self, minimum: Option<f64>, maximum: Option<f64>) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    pub fn with_perm(mut self, perm: Permission) -> Self {
        self.perm = perm;
        self
    }

    pub fn writable(self) -> Self {
        self.with_perm(Permission::ReadWrite)
    }

    pub fn is_writable(&self) -> bool {
        self.perm == Permission::ReadWrite
    }

    pub const fn address(&self) -> VariableAddress {
        VariableAddress::new(self.uid, self.offset, self.length)
    }

    /// Stable identifier `"uid-offset-length"`.
    pub fn key(&self) -> String {
        format!("{}-{}-{}", self.uid, self.offset, self.length)
    }

    fn state_text(&self, value: u64) -> Option<&str> {
        self.states
            .iter()
            .find(|state| state.value == value)
            .map(|state| state.text.as_str())
    }

    /// Interpret raw bytes read from the PLC.
    pub fn decode(&self, raw: &[u8]) -> Value {
        match self.var_type {
            VarType::Float32 => match <[u8; 4]>::try_from(raw) {
                Ok(word) => Value::Float(ieee754::decode(u32::from_be_bytes(word))),
                Err(_) => {
                    warn!(uid = self.uid, len = raw.len(), "float variable is not 4 bytes");
                    Value::Float(0.0)
                }
            },
            VarType::Bool | VarType::Int16 if !self.states.is_empty() => {
                let value = be_uint(raw);
                let text = self.state_text(value).unwrap_or(STATE_UNKNOWN);
                Value::State {
                    value,
                    text: text.to_string(),
                }
            }
            VarType::Bool | VarType::Int16 | VarType::Int64 => Value::Integer(be_uint(raw)),
            VarType::Schedule => Value::Block(raw.to_vec()),
            VarType::Unknown(tag) => {
                warn!(
                    uid = self.uid,
                    tag, "unknown variable type, decoding as unsigned integer"
                );
                Value::Integer(be_uint(raw))
            }
        }
    }

    /// Human readable form of a decoded value.
    pub fn describe(&self, value: &Value) -> String {
        match value {
            Value::Integer(n) if !self.states.is_empty() => self
                .state_text(*n)
                .map(str::to_string)
                .unwrap_or_else(|| STATE_UNKNOWN.to_string()),
            other => other.to_string(),
        }
    }

    /// Convert a requested value into the raw bytes to write.
    ///
    /// `previous` is the last decoded value and is required for `"+"`/`"-"`.
    pub fn encode(&self, new: &NewValue, previous: Option<&Value>) -> Result<Vec<u8>, CodecError> {
        if !self.is_writable() {
            return Err(CodecError::ReadOnly { uid: self.uid });
        }
        if let NewValue::Raw(bytes) = new {
            return self.encode_raw(bytes);
        }
        if new.is_relative() && previous.is_none() {
            return Err(CodecError::NoCurrentValue { uid: self.uid });
        }
        match self.var_type {
            VarType::Float32 => self.encode_float(new, previous),
            VarType::Bool | VarType::Int16 if !self.states.is_empty() => {
                let value = self.select_state(new, previous)?;
                self.encode_uint(value)
            }
            VarType::Schedule => Err(self.invalid(new)),
            VarType::Unknown(tag) => {
                debug!(uid = self.uid, tag, "encoding unknown variable type as integer");
                let value = self.integer_value(new, previous)?;
                self.encode_uint(value)
            }
            VarType::Bool | VarType::Int16 | VarType::Int64 => {
                let value = self.integer_value(new, previous)?;
                self.encode_uint(value)
            }
        }
    }

    fn encode_raw(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        if usize::try_from(self.length).ok() != Some(bytes.len()) {
            return Err(CodecError::LengthMismatch {
                uid: self.uid,
                expected: self.length,
                got: bytes.len(),
            });
        }
        Ok(bytes.to_vec())
    }

    fn encode_float(&self, new: &NewValue, previous: Option<&Value>) -> Result<Vec<u8>, CodecError> {
        if self.length != 4 {
            return Err(CodecError::LengthMismatch {
                uid: self.uid,
                expected: self.length,
                got: 4,
            });
        }
        let current = || {
            previous
                .and_then(Value::as_f64)
                .ok_or(CodecError::NoCurrentValue { uid: self.uid })
        };
        let mut value = match new {
            NewValue::Increment | NewValue::Decrement if self.step == 0.0 => {
                return Err(self.invalid(new))
            }
            NewValue::Increment => current()? + self.step,
            NewValue::Decrement => current()? - self.step,
            NewValue::Float(value) => *value,
            NewValue::Integer(value) => *value as f64,
            NewValue::Text(text) => text
                .trim()
                .parse::<f64>()
                .map_err(|_| self.invalid(new))?,
            NewValue::Raw(_) => return Err(self.invalid(new)),
        };
        if !value.is_finite() {
            return Err(self.invalid(new));
        }
        if let Some(max) = self.maximum {
            value = value.min(max);
        }
        if let Some(min) = self.minimum {
            value = value.max(min);
        }
        Ok(ieee754::encode(value).to_be_bytes().to_vec())
    }

    fn select_state(&self, new: &NewValue, previous: Option<&Value>) -> Result<u64, CodecError> {
        let unknown = CodecError::UnknownState { uid: self.uid };
        let current = || {
            previous
                .and_then(Value::as_u64)
                .ok_or(CodecError::NoCurrentValue { uid: self.uid })
        };
        match new {
            NewValue::Increment => {
                let current = current()?;
                self.states
                    .iter()
                    .find(|state| state.value == current)
                    .and_then(|state| state.next)
                    .ok_or(unknown)
            }
            NewValue::Decrement => {
                let current = current()?;
                self.states
                    .iter()
                    .find(|state| state.next == Some(current))
                    .map(|state| state.value)
                    .ok_or(unknown)
            }
            NewValue::Text(text) => {
                let text = text.trim();
                let by_label = self.states.iter().find(|state| state.text == text);
                match (by_label, parse_uint(text)) {
                    (Some(state), _) => Ok(state.value),
                    (None, Some(value)) if self.state_text(value).is_some() => Ok(value),
                    _ => Err(unknown),
                }
            }
            NewValue::Integer(value) => u64::try_from(*value)
                .ok()
                .filter(|value| self.state_text(*value).is_some())
                .ok_or(unknown),
            NewValue::Float(_) | NewValue::Raw(_) => Err(self.invalid(new)),
        }
    }

    fn integer_value(&self, new: &NewValue, previous: Option<&Value>) -> Result<u64, CodecError> {
        match new {
            NewValue::Increment | NewValue::Decrement if self.length == 1 => {
                match previous.and_then(Value::as_u64) {
                    Some(0) => Ok(1),
                    Some(_) => Ok(0),
                    None => Err(CodecError::NoCurrentValue { uid: self.uid }),
                }
            }
            NewValue::Integer(value) => u64::try_from(*value).map_err(|_| CodecError::OutOfRange {
                uid: self.uid,
                length: self.length,
            }),
            NewValue::Text(text) => parse_uint(text.trim()).ok_or_else(|| self.invalid(new)),
            _ => Err(self.invalid(new)),
        }
    }

    fn encode_uint(&self, value: u64) -> Result<Vec<u8>, CodecError> {
        let out_of_range = CodecError::OutOfRange {
            uid: self.uid,
            length: self.length,
        };
        let len = usize::try_from(self.length).map_err(|_| out_of_range.clone())?;
        let mut out = vec![0u8; len];
        if len == 0 || !put_be_uint(value, &mut out) {
            return Err(out_of_range);
        }
        Ok(out)
    }

    fn invalid(&self, new: &NewValue) -> CodecError {
        CodecError::InvalidValue {
            uid: self.uid,
            value: new.to_string(),
        }
    }
}

fn parse_uint(text: &str) -> Option<u64> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse::<u64>().ok(),
    }
}

/// A decoded variable value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    Integer(u64),
    Float(f64),
    State { value: u64, text: String },
    Block(Vec<u8>),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Integer(value) | Self::State { value, .. } => Some(*value as f64),
            Self::Block(_) => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Integer(value) | Self::State { value, .. } => Some(*value),
            Self::Float(_) | Self::Block(_) => None,
        }
    }

    pub fn as_block(&self) -> Option<&[u8]> {
        match self {
            Self::Block(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::State { text, .. } => f.write_str(text),
            Self::Block(bytes) => {
                // Long blocks are grouped by 32-bit word.
                let grouped = bytes.len() >= 16;
                for (i, byte) in bytes.iter().enumerate() {
                    if grouped && i > 0 && i % 4 == 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// A value requested for writing.
#[derive(Debug, Clone, PartialEq)]
pub enum NewValue {
    /// `"+"`: next state, float step up or boolean toggle.
    Increment,
    /// `"-"`: previous state, float step down or boolean toggle.
    Decrement,
    Float(f64),
    Integer(i64),
    /// Numeric literal (decimal or `0x` hex) or state label.
    Text(String),
    /// Raw block, written as is.
    Raw(Vec<u8>),
}

impl NewValue {
    pub fn is_relative(&self) -> bool {
        matches!(self, Self::Increment | Self::Decrement)
    }
}

impl From<&str> for NewValue {
    fn from(text: &str) -> Self {
        match text {
            "+" => Self::Increment,
            "-" => Self::Decrement,
            other => Self::Text(other.to_string()),
        }
    }
}

impl From<f64> for NewValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for NewValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<Vec<u8>> for NewValue {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Raw(bytes)
    }
}

impl fmt::Display for NewValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Increment => f.write_str("+"),
            Self::Decrement => f.write_str("-"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Text(text) => f.write_str(text),
            Self::Raw(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}
