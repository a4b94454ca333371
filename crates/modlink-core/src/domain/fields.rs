//! Configuration field definitions exchanged between a module and the host UI.
//!
//! A module describes its user-configurable inputs as a list of
//! [`ConfigField`]s.  Each field may carry a visibility rule.  On the module
//! side the rule is an executable [`Predicate`]; on the wire it must be text,
//! because the host renders the fields in another process.
//! [`serialize_is_visible_fn`] performs that one-way rewrite.
//!
//! # Wire shape
//!
//! ```json
//! {
//!   "id": "port",
//!   "label": "Port",
//!   "type": "number",
//!   "default": 8000, "min": 1, "max": 65535,
//!   "isVisibleFn": "(options) => options.mode === \"advanced\""
//! }
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::predicate::{Predicate, PredicateError};
use crate::value::is_truthy;

// ── Field kinds ───────────────────────────────────────────────────────────────

/// One entry of a dropdown's choice list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropdownChoice {
    pub id: Value,
    pub label: String,
}

/// The value-kind of a field, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FieldKind {
    /// Read-only text shown in the form.
    StaticText { value: String },
    /// Free text, optionally constrained by a regular expression.
    Textinput {
        #[serde(default)]
        default: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        regex: Option<String>,
    },
    Number {
        default: f64,
        min: f64,
        max: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<f64>,
    },
    Checkbox { default: bool },
    Dropdown {
        default: Value,
        choices: Vec<DropdownChoice>,
    },
    Colorpicker { default: Value },
}

// ── Visibility ────────────────────────────────────────────────────────────────

/// The `isVisible` attribute of a field.
///
/// `Predicate` is the executable, host-local form and cannot be serialized;
/// `Value` is any plain JSON value (the wire form when a sender put data in
/// the slot).  Deserialization never produces `Predicate`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum IsVisible {
    #[default]
    Absent,
    Predicate(Predicate),
    Value(Value),
}

impl IsVisible {
    pub fn is_absent(&self) -> bool {
        matches!(self, IsVisible::Absent)
    }
}

impl Serialize for IsVisible {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            IsVisible::Absent => serializer.serialize_none(),
            IsVisible::Value(value) => value.serialize(serializer),
            IsVisible::Predicate(_) => Err(serde::ser::Error::custom(
                "executable isVisible must be encoded with serialize_is_visible_fn before transmission",
            )),
        }
    }
}

impl<'de> Deserialize<'de> for IsVisible {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            None => IsVisible::Absent,
            Some(value) => IsVisible::Value(value),
        })
    }
}

impl From<Predicate> for IsVisible {
    fn from(predicate: Predicate) -> Self {
        IsVisible::Predicate(predicate)
    }
}

// ── ConfigField ───────────────────────────────────────────────────────────────

/// One user-configurable input declared by a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigField {
    pub id: String,
    pub label: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "IsVisible::is_absent")]
    pub is_visible: IsVisible,
    /// Text form of the visibility predicate, only ever set by
    /// [`serialize_is_visible_fn`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_visible_fn: Option<String>,
}

impl ConfigField {
    pub fn new(id: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind,
            tooltip: None,
            width: None,
            is_visible: IsVisible::Absent,
            is_visible_fn: None,
        }
    }

    pub fn with_is_visible(mut self, predicate: Predicate) -> Self {
        self.is_visible = IsVisible::Predicate(predicate);
        self
    }

    pub fn with_tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip = Some(tooltip.into());
        self
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    /// Decides whether this field is shown for the given option values.
    ///
    /// An executable predicate is evaluated directly, a received text form is
    /// parsed and evaluated in the sandbox, a plain value is tested for
    /// truthiness, and a field without any rule is visible.
    ///
    /// # Errors
    ///
    /// Returns [`PredicateError`] if `is_visible_fn` is not valid predicate
    /// text.
    pub fn is_visible_for(&self, options: &Map<String, Value>) -> Result<bool, PredicateError> {
        match (&self.is_visible, &self.is_visible_fn) {
            (IsVisible::Predicate(predicate), _) => Ok(predicate.evaluate(options)),
            (IsVisible::Value(value), _) => Ok(is_truthy(value)),
            (IsVisible::Absent, Some(source)) => Ok(Predicate::parse(source)?.evaluate(options)),
            (IsVisible::Absent, None) => Ok(true),
        }
    }
}

/// Rewrites field definitions for transmission.
///
/// The output has the same length and order as the input.  A field whose
/// `is_visible` is an executable predicate comes out with the predicate's
/// source text in `is_visible_fn` and `is_visible` cleared.  Every other field
/// comes out with `is_visible_fn` cleared, so text that arrived from upstream
/// is never forwarded as if it had been derived here.
pub fn serialize_is_visible_fn<I>(fields: I) -> Vec<ConfigField>
where
    I: IntoIterator<Item = ConfigField>,
{
    fields
        .into_iter()
        .map(|mut field| {
            match std::mem::take(&mut field.is_visible) {
                IsVisible::Predicate(predicate) => {
                    field.is_visible_fn = Some(predicate.source().to_string());
                }
                other => {
                    field.is_visible = other;
                    field.is_visible_fn = None;
                }
            }
            field
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
