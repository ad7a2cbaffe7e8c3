//! Declarative request validation.
//!
//! A request's constraints are a plain list of [`Rule`]s evaluated by
//! [`RuleSet::validate`]. Every rule runs; all violations are reported
//! together.
//!
//! ```
//! use building_blocks::validation::{Rule, RuleSet};
//! use std::collections::BTreeMap;
//!
//! let rules = RuleSet::compile(vec![
//!     Rule::required("customer_id"),
//!     Rule::regex("customer_id", r"^\d+$"),
//!     Rule::one_of("status", ["ACTIVE", "BLOCKED"]),
//! ])
//! .unwrap();
//!
//! let mut fields = BTreeMap::new();
//! fields.insert("customer_id".to_string(), "x1".to_string());
//! fields.insert("status".to_string(), "LOST".to_string());
//! assert_eq!(rules.validate(&fields).len(), 2);
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::{Error, Result};

/// One validation rule bound to a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Rule {
    /// Field must be present and not blank.
    Required { field: String },
    /// Field, when present, must match `pattern`.
    Regex {
        field: String,
        pattern: String,
        #[serde(default)]
        message: Option<String>,
    },
    /// Field, when present, must be one of `allowed`.
    Enum {
        field: String,
        allowed: Vec<String>,
        #[serde(default)]
        ignore_case: bool,
    },
}

impl Rule {
    pub fn required(field: impl Into<String>) -> Self {
        Rule::Required {
            field: field.into(),
        }
    }

    pub fn regex(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Rule::Regex {
            field: field.into(),
            pattern: pattern.into(),
            message: None,
        }
    }

    pub fn one_of<I, S>(field: impl Into<String>, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Rule::Enum {
            field: field.into(),
            allowed: allowed.into_iter().map(Into::into).collect(),
            ignore_case: false,
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Rule::Required { field } | Rule::Regex { field, .. } | Rule::Enum { field, .. } => {
                field
            }
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Rule::Required { .. } => "required",
            Rule::Regex { .. } => "regex",
            Rule::Enum { .. } => "enum",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: String,
    pub rule: &'static str,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Read access to request fields by name.
pub trait Fields {
    fn field(&self, name: &str) -> Option<Cow<'_, str>>;
}

impl Fields for BTreeMap<String, String> {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(|v| Cow::Borrowed(v.as_str()))
    }
}

impl Fields for HashMap<String, String> {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(|v| Cow::Borrowed(v.as_str()))
    }
}

/// JSON objects: strings as-is, numbers and booleans via `to_string`, null as absent.
impl Fields for serde_json::Value {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match self.get(name)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(Cow::Borrowed(s.as_str())),
            other => Some(Cow::Owned(other.to_string())),
        }
    }
}

/// Rules with their patterns compiled.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<(Rule, Option<Regex>)>,
}

impl RuleSet {
    /// Compile `rules`; an invalid pattern is a configuration error.
    pub fn compile(rules: Vec<Rule>) -> Result<Self> {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let compiled = match &rule {
                    Rule::Regex { field, pattern, .. } => Some(Regex::new(pattern).map_err(|e| {
                        Error::config(format!("Invalid pattern for field '{}': {}", field, e))
                    })?),
                    _ => None,
                };
                Ok((rule, compiled))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate every rule and collect the violations.
    pub fn validate(&self, fields: &dyn Fields) -> Vec<Violation> {
        self.rules
            .iter()
            .filter_map(|(rule, regex)| check(rule, regex.as_ref(), fields))
            .collect()
    }

    /// Like [`RuleSet::validate`], surfacing violations as [`Error::Validation`].
    pub fn ensure_valid(&self, fields: &dyn Fields) -> Result<()> {
        let violations = self.validate(fields);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::validation(
                violations.iter().map(ToString::to_string).collect(),
            ))
        }
    }
}

fn check(rule: &Rule, regex: Option<&Regex>, fields: &dyn Fields) -> Option<Violation> {
    let value = fields.field(rule.field());
    let present = value.as_deref().map(str::trim).filter(|v| !v.is_empty());

    let message = match (rule, present) {
        (Rule::Required { .. }, None) => "is required".to_string(),
        (Rule::Regex { pattern, message, .. }, Some(v)) => {
            let matched = regex.is_some_and(|re| re.is_match(v));
            if matched {
                return None;
            }
            message
                .clone()
                .unwrap_or_else(|| format!("does not match {}", pattern))
        }
        (
            Rule::Enum {
                allowed,
                ignore_case,
                ..
            },
            Some(v),
        ) => {
            let found = allowed.iter().any(|a| {
                if *ignore_case {
                    a.eq_ignore_ascii_case(v)
                } else {
                    a == v
                }
            });
            if found {
                return None;
            }
            format!("must be one of {}", allowed.join(", "))
        }
        _ => return None,
    };

    Some(Violation {
        field: rule.field().to_string(),
        rule: rule.name(),
        message,
    })
}

/// Compile `rules` and validate `fields` in one step.
pub fn validate(rules: &[Rule], fields: &dyn Fields) -> Result<Vec<Violation>> {
    Ok(RuleSet::compile(rules.to_vec())?.validate(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn card_request_rules() -> RuleSet {
        RuleSet::compile(vec![
            Rule::required("customer_id"),
            Rule::regex("customer_id", r"^\d{1,10}$"),
            Rule::required("status"),
            Rule::Enum {
                field: "status".into(),
                allowed: vec!["ACTIVE".into(), "BLOCKED".into()],
                ignore_case: true,
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_valid_request() {
        let rules = card_request_rules();
        let fields = json!({ "customer_id": 42, "status": "active" });
        assert!(rules.validate(&fields).is_empty());
        assert!(rules.ensure_valid(&fields).is_ok());
    }

    #[test]
    fn test_reports_every_violation() {
        let rules = card_request_rules();
        let fields = json!({ "customer_id": "abc", "status": null });
        let violations = rules.validate(&fields);
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].field, "customer_id");
        assert_eq!(violations[0].rule, "regex");
        assert_eq!(violations[1].field, "status");
        assert_eq!(violations[1].rule, "required");
    }

    #[test]
    fn test_blank_counts_as_missing() {
        let rules = RuleSet::compile(vec![Rule::required("name")]).unwrap();
        let mut fields = HashMap::new();
        fields.insert("name".to_string(), "   ".to_string());
        assert_eq!(rules.validate(&fields).len(), 1);
    }

    #[test]
    fn test_enum_is_case_sensitive_by_default() {
        let violations = validate(
            &[Rule::one_of("status", ["ACTIVE"])],
            &json!({ "status": "active" }),
        )
        .unwrap();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].to_string().contains("must be one of ACTIVE"));
    }

    #[test]
    fn test_ensure_valid_error() {
        let rules = card_request_rules();
        let err = rules.ensure_valid(&json!({})).unwrap_err();
        match err {
            Error::Validation { violations } => assert_eq!(violations.len(), 2),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let err = RuleSet::compile(vec![Rule::regex("x", "(")]).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_rules_deserialize_from_json() {
        let rules: Vec<Rule> = serde_json::from_value(json!([
            { "rule": "required", "field": "pan" },
            { "rule": "regex", "field": "pan", "pattern": "^[0-9]+$", "message": "digits only" },
            { "rule": "enum", "field": "kind", "allowed": ["DEBIT", "CREDIT"] }
        ]))
        .unwrap();
        assert_eq!(rules.len(), 3);
        let violations = validate(&rules, &json!({ "pan": "12a", "kind": "DEBIT" })).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].message, "digits only");
    }
}
