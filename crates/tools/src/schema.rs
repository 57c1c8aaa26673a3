use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Argument types a tool can declare. JSON numbers are split into
/// integers and reals because quantities and ids must never arrive
/// with a fractional part.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgKind {
    String,
    Integer,
    Number,
    Boolean,
}

impl ArgKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ArgSpec {
    pub name: &'static str,
    pub kind: ArgKind,
    pub required: bool,
}

impl ArgSpec {
    pub const fn required(name: &'static str, kind: ArgKind) -> Self {
        Self { name, kind, required: true }
    }

    pub const fn optional(name: &'static str, kind: ArgKind) -> Self {
        Self { name, kind, required: false }
    }
}

/// Declared shape of a tool's input. Violations name the offending
/// field so the agent can ask the user for exactly what is missing.
#[derive(Clone, Debug, Serialize)]
pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub args: Vec<ArgSpec>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    #[error("arguments must be a JSON object")]
    NotAnObject,
    #[error("missing required argument `{field}`")]
    MissingField { field: String },
    #[error("argument `{field}` must be a {expected}")]
    WrongType { field: String, expected: &'static str },
    #[error("unknown argument `{field}`")]
    UnknownField { field: String },
}

impl SchemaViolation {
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::NotAnObject => None,
            Self::MissingField { field }
            | Self::WrongType { field, .. }
            | Self::UnknownField { field } => Some(field),
        }
    }
}

impl ToolSchema {
    pub fn new(name: &'static str, description: &'static str, args: Vec<ArgSpec>) -> Self {
        Self { name, description, args }
    }

    pub fn validate(&self, input: &Value) -> Result<(), SchemaViolation> {
        let object = input.as_object().ok_or(SchemaViolation::NotAnObject)?;

        for spec in &self.args {
            match object.get(spec.name) {
                None | Some(Value::Null) if spec.required => {
                    return Err(SchemaViolation::MissingField { field: spec.name.to_string() });
                }
                None | Some(Value::Null) => {}
                Some(value) => {
                    if !spec.kind.matches(value) {
                        return Err(SchemaViolation::WrongType {
                            field: spec.name.to_string(),
                            expected: spec.kind.label(),
                        });
                    }
                }
            }
        }

        for key in object.keys() {
            if !self.args.iter().any(|spec| spec.name == key) {
                return Err(SchemaViolation::UnknownField { field: key.clone() });
            }
        }

        Ok(())
    }
}
