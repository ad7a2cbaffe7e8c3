//! Command descriptors.
//!
//! A [`CommandDescriptor`] is built per call: the procedure name (or SQL text),
//! its named parameters and the output cursor that carries the result set.
//! It is handed to a [`Connection`](crate::db::Connection) by reference and
//! dropped by the provider once the call completes.

use regex::Regex;
use std::fmt::{self, Write as _};
use std::sync::OnceLock;

use crate::db::types::DbValue;
use crate::error::{Error, Result};

/// Name of the output cursor parameter when callers do not specify one.
pub const DEFAULT_CURSOR_PARAMETER: &str = "p_cursor";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// A stored procedure invoked by (optionally package-qualified) name.
    StoredProcedure,
    /// Ad-hoc SQL text with positional binds in parameter order.
    Text,
}

/// Declared parameter type, used by backends that bind with explicit types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    /// Infer from the value.
    Auto,
    Varchar,
    Number,
    Decimal,
    Boolean,
    Date,
    Timestamp,
    Blob,
    RefCursor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
    InputOutput,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub db_type: DbType,
    pub direction: Direction,
    pub value: DbValue,
}

impl Parameter {
    /// Input parameter whose type follows its value.
    pub fn input(name: impl Into<String>, value: impl Into<DbValue>) -> Self {
        Self {
            name: name.into(),
            db_type: DbType::Auto,
            direction: Direction::Input,
            value: value.into(),
        }
    }

    /// Output ref cursor parameter.
    pub fn output_cursor(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            db_type: DbType::RefCursor,
            direction: Direction::Output,
            value: DbValue::Null,
        }
    }

    pub fn with_type(mut self, db_type: DbType) -> Self {
        self.db_type = db_type;
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Whether a value is sent to the database for this parameter.
    pub fn is_bound_input(&self) -> bool {
        matches!(self.direction, Direction::Input | Direction::InputOutput)
            && self.db_type != DbType::RefCursor
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandDescriptor {
    pub text: String,
    pub kind: CommandKind,
    pub parameters: Vec<Parameter>,
    pub output_cursor: Option<Parameter>,
}

impl CommandDescriptor {
    /// Describe a stored procedure call.
    pub fn procedure(name: impl Into<String>) -> Self {
        Self {
            text: name.into(),
            kind: CommandKind::StoredProcedure,
            parameters: Vec::new(),
            output_cursor: None,
        }
    }

    /// Describe an ad-hoc SQL command.
    pub fn text(sql: impl Into<String>) -> Self {
        Self {
            text: sql.into(),
            kind: CommandKind::Text,
            parameters: Vec::new(),
            output_cursor: None,
        }
    }

    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_parameters(mut self, parameters: impl IntoIterator<Item = Parameter>) -> Self {
        self.parameters.extend(parameters);
        self
    }

    /// Attach the output cursor that receives the result set.
    pub fn with_output_cursor(mut self, name: impl Into<String>) -> Self {
        self.output_cursor = Some(Parameter::output_cursor(name));
        self
    }

    /// Parameters that carry a value to the database, in declaration order.
    pub fn bound_inputs(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.is_bound_input())
    }

    /// Check argument shape before any connection is opened.
    ///
    /// Procedure and parameter names are interpolated into generated
    /// statements, so they must be plain identifiers.
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(Error::invalid_argument(
                "command_text",
                "command text must not be blank",
            ));
        }
        if self.kind == CommandKind::StoredProcedure && !procedure_name_regex().is_match(&self.text)
        {
            return Err(Error::invalid_argument(
                "command_text",
                format!("'{}' is not a valid procedure name", self.text),
            ));
        }

        let mut seen: Vec<String> = Vec::with_capacity(self.parameters.len() + 1);
        for param in self.parameters.iter().chain(self.output_cursor.iter()) {
            if param.name.trim().is_empty() {
                return Err(Error::invalid_argument(
                    "parameters",
                    "parameter name must not be blank",
                ));
            }
            if self.kind == CommandKind::StoredProcedure
                && !parameter_name_regex().is_match(&param.name)
            {
                return Err(Error::invalid_argument(
                    "parameters",
                    format!("'{}' is not a valid parameter name", param.name),
                ));
            }
            let lower = param.name.to_ascii_lowercase();
            if seen.contains(&lower) {
                return Err(Error::invalid_argument(
                    "parameters",
                    format!("parameter '{}' is bound more than once", param.name),
                ));
            }
            seen.push(lower);
        }
        Ok(())
    }

    /// Command text with its bindings, for diagnostics.
    ///
    /// Absent values render as `Null`; the cursor renders as `<cursor>`.
    pub fn formatted(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bindings = String::new();
        for param in &self.parameters {
            if !bindings.is_empty() {
                bindings.push_str(", ");
            }
            let _ = match param.direction {
                Direction::Output => write!(bindings, "{} => <out>", param.name),
                _ => write!(bindings, "{} => {}", param.name, param.value),
            };
        }
        if let Some(cursor) = &self.output_cursor {
            if !bindings.is_empty() {
                bindings.push_str(", ");
            }
            let _ = write!(bindings, "{} => <cursor>", cursor.name);
        }
        match self.kind {
            CommandKind::StoredProcedure => write!(f, "{}({})", self.text, bindings),
            CommandKind::Text if bindings.is_empty() => write!(f, "{}", self.text),
            CommandKind::Text => write!(f, "{} [{}]", self.text, bindings),
        }
    }
}

fn procedure_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_$#]*(\.[A-Za-z_][A-Za-z0-9_$#]*){0,2}$")
            .expect("Invalid regex pattern for procedure names")
    })
}

fn parameter_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_$#]*$")
            .expect("Invalid regex pattern for parameter names")
    })
}
