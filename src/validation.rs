//! Per-kind attribute validation consulted before any write.

use std::collections::HashMap;
use std::fmt;

use regex_lite::Regex;
use serde_json::Value;
use tracing::warn;

use crate::entity::{Attributes, EntityKind};
use crate::error::FieldErrors;

/// Validation contract: `None` when the bag is acceptable, otherwise the
/// failing fields with one message each.
pub trait Validator: Send + Sync {
  fn validate(&self, kind: EntityKind, attrs: &Attributes) -> Option<FieldErrors>;
}

/// One field's checks, evaluated in order; the first failure wins.
#[derive(Clone)]
pub struct FieldRule {
  field: String,
  /// Dotted lookup path, e.g. `title.rendered`; defaults to the field name
  path: Vec<String>,
  required: Option<String>,
  pattern: Option<(Regex, String)>,
}

impl FieldRule {
  pub fn new(field: impl Into<String>) -> Self {
    let field = field.into();
    let path = vec![field.clone()];
    Self {
      field,
      path,
      required: None,
      pattern: None,
    }
  }

  /// Read the value from a nested path instead of the field itself.
  pub fn at(mut self, path: &str) -> Self {
    self.path = path.split('.').map(str::to_string).collect();
    self
  }

  pub fn required(mut self, message: impl Into<String>) -> Self {
    self.required = Some(message.into());
    self
  }

  /// Non-empty values must match `pattern`. An invalid pattern is logged and ignored.
  pub fn matching(mut self, pattern: &str, message: impl Into<String>) -> Self {
    match Regex::new(pattern) {
      Ok(re) => self.pattern = Some((re, message.into())),
      Err(e) => warn!(field = %self.field, pattern, error = %e, "invalid validation pattern"),
    }
    self
  }

  fn lookup<'a>(&self, attrs: &'a Attributes) -> Option<&'a Value> {
    let (first, rest) = self.path.split_first()?;
    rest
      .iter()
      .try_fold(attrs.get(first)?, |value, key| value.get(key))
  }

  fn check(&self, attrs: &Attributes) -> Option<String> {
    let value = self.lookup(attrs).filter(|v| !is_blank(v));

    match (value, &self.required) {
      (None, Some(message)) => return Some(message.clone()),
      (None, None) => return None,
      _ => {}
    }

    let (re, message) = self.pattern.as_ref()?;
    let text = match value? {
      Value::String(s) => s.clone(),
      other => other.to_string(),
    };
    (!re.is_match(&text)).then(|| message.clone())
  }
}

impl fmt::Debug for FieldRule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FieldRule")
      .field("field", &self.field)
      .field("path", &self.path.join("."))
      .field("required", &self.required)
      .field("pattern", &self.pattern.as_ref().map(|(re, _)| re.as_str()))
      .finish()
  }
}

fn is_blank(value: &Value) -> bool {
  match value {
    Value::Null => true,
    Value::String(s) => s.is_empty(),
    _ => false,
  }
}

/// Rule tables keyed by entity kind. Kinds without rules always pass.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
  rules: HashMap<EntityKind, Vec<FieldRule>>,
}

impl RuleTable {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn rule(mut self, kind: EntityKind, rule: FieldRule) -> Self {
    self.rules.entry(kind).or_default().push(rule);
    self
  }
}

impl Validator for RuleTable {
  fn validate(&self, kind: EntityKind, attrs: &Attributes) -> Option<FieldErrors> {
    let rules = self.rules.get(&kind)?;
    let mut errors = FieldErrors::new();
    for rule in rules {
      if errors.contains_key(&rule.field) {
        continue;
      }
      if let Some(message) = rule.check(attrs) {
        errors.insert(rule.field.clone(), message);
      }
    }
    (!errors.is_empty()).then_some(errors)
  }
}

/// The built-in rules for every entity kind.
pub fn default_rules() -> RuleTable {
  let mut table = RuleTable::new();
  for kind in [EntityKind::Post, EntityKind::Page] {
    table = table
      .rule(
        kind,
        FieldRule::new("title")
          .at("title.rendered")
          .required("Title is required"),
      )
      .rule(
        kind,
        FieldRule::new("content")
          .at("content.rendered")
          .required("Content is required"),
      );
  }

  table
    .rule(
      EntityKind::Tribute,
      FieldRule::new("loved_one_name").required("Loved one's name is required"),
    )
    .rule(
      EntityKind::Tribute,
      FieldRule::new("phone_number")
        .required("Phone number is required")
        .matching(
          r"^\d{3}-\d{3}-\d{4}$",
          "Phone number must be in the format 123-456-7890",
        ),
    )
    .rule(
      EntityKind::User,
      FieldRule::new("username").required("Username is required"),
    )
    .rule(
      EntityKind::User,
      FieldRule::new("email")
        .required("Email is required")
        .matching(r"^[^\s@]+@[^\s@]+\.[^\s@]+$", "Email must be a valid email address"),
    )
}

/// `field: message` lines for a single error banner.
pub fn format_field_errors(errors: &FieldErrors) -> String {
  errors
    .iter()
    .map(|(field, message)| format!("{}: {}", field, message))
    .collect::<Vec<_>>()
    .join("\n")
}
