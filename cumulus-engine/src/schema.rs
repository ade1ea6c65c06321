//! Data-driven resource descriptors.
//!
//! A [`ResourceDescriptor`] lists a resource type's fields with their type,
//! mutability and validation rules. Descriptors drive validation, defaulting,
//! update planning and the `schema` output of the binary.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::identity::IdentityFormat;
use crate::value::{Fields, TypeMismatch, Value, ValueKind};

/// Desired state failed validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("field '{field}' is required")]
    Missing { field: String },

    #[error("field '{field}' is computed and cannot be set")]
    Computed { field: String },

    #[error("unsupported field '{field}'")]
    Unknown { field: String },

    #[error("field '{field}': {reason}")]
    Invalid { field: String, reason: String },

    #[error(transparent)]
    Type(#[from] TypeMismatch),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Bool,
    Int,
    Float,
    List(Box<FieldType>),
    Map(Box<FieldType>),
    /// Nested block, given as a map or a list of maps.
    Block(Vec<FieldSpec>),
}

impl FieldType {
    pub fn list_of(elem: FieldType) -> Self {
        FieldType::List(Box::new(elem))
    }

    pub fn map_of(elem: FieldType) -> Self {
        FieldType::Map(Box::new(elem))
    }

    fn kind(&self) -> ValueKind {
        match self {
            FieldType::String => ValueKind::String,
            FieldType::Bool => ValueKind::Bool,
            FieldType::Int => ValueKind::Int,
            FieldType::Float => ValueKind::Float,
            FieldType::List(_) | FieldType::Block(_) => ValueKind::List,
            FieldType::Map(_) => ValueKind::Map,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Required,
    Optional,
    /// Set by the remote side only.
    Computed,
    /// Optional; the remote side fills it in when omitted.
    OptionalComputed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Validation {
    StringLen { min: usize, max: usize },
    IntRange { min: i64, max: i64 },
    FloatRange { min: f64, max: f64 },
    OneOf(&'static [&'static str]),
    /// A duration string such as "10m".
    Duration,
}

impl Validation {
    fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            Validation::StringLen { min, max } => {
                let len = value.as_str().map(|s| s.chars().count()).unwrap_or(0);
                if len < *min || len > *max {
                    return Err(format!("length must be between {} and {}, got {}", min, max, len));
                }
            }
            Validation::IntRange { min, max } => {
                match value.as_i64() {
                    Some(v) if v < *min || v > *max => {
                        return Err(format!("must be between {} and {}, got {}", min, max, v));
                    }
                    _ => {}
                }
            }
            Validation::FloatRange { min, max } => {
                match value.as_f64() {
                    Some(v) if v < *min || v > *max => {
                        return Err(format!("must be between {} and {}, got {}", min, max, v));
                    }
                    _ => {}
                }
            }
            Validation::OneOf(allowed) => {
                match value.as_str() {
                    Some(v) if !allowed.contains(&v) => {
                        return Err(format!(
                            "expected one of [{}], got {:?}",
                            allowed.join(", "),
                            v
                        ));
                    }
                    _ => {}
                }
            }
            Validation::Duration => {
                if let Some(v) = value.as_str() {
                    humantime::parse_duration(v)
                        .map_err(|e| format!("invalid duration {:?}: {}", v, e))?;
                }
            }
        }
        Ok(())
    }
}

/// One field of a resource type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub ty: FieldType,
    pub mode: Mode,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub force_new: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validation: Vec<Validation>,
    /// Update group; fields in one group change through one scoped call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<&'static str>,
}

impl FieldSpec {
    fn with_mode(name: &'static str, ty: FieldType, mode: Mode) -> Self {
        Self {
            name,
            ty,
            mode,
            force_new: false,
            default: None,
            validation: Vec::new(),
            group: None,
        }
    }

    pub fn required(name: &'static str, ty: FieldType) -> Self {
        Self::with_mode(name, ty, Mode::Required)
    }

    pub fn optional(name: &'static str, ty: FieldType) -> Self {
        Self::with_mode(name, ty, Mode::Optional)
    }

    pub fn computed(name: &'static str, ty: FieldType) -> Self {
        Self::with_mode(name, ty, Mode::Computed)
    }

    pub fn optional_computed(name: &'static str, ty: FieldType) -> Self {
        Self::with_mode(name, ty, Mode::OptionalComputed)
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn validate(mut self, validation: Validation) -> Self {
        self.validation.push(validation);
        self
    }

    pub fn group(mut self, group: &'static str) -> Self {
        self.group = Some(group);
        self
    }

    /// Key used when grouping changes: the update group or the field name.
    pub fn change_group(&self) -> &'static str {
        self.group.unwrap_or(self.name)
    }

    fn settable(&self) -> bool {
        self.mode != Mode::Computed
    }
}

/// Default Create/Update/Delete timeouts of a resource type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DefaultTimeouts {
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub create: Option<Duration>,
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub update: Option<Duration>,
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub delete: Option<Duration>,
}

impl DefaultTimeouts {
    /// Same default for every operation.
    pub fn all(timeout: Duration) -> Self {
        Self {
            create: Some(timeout),
            update: Some(timeout),
            delete: Some(timeout),
        }
    }
}

/// Schema and behavioural metadata of a resource type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceDescriptor {
    pub type_name: &'static str,
    pub fields: Vec<FieldSpec>,
    pub timeouts: DefaultTimeouts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityFormat>,
    pub taggable: bool,
}

impl ResourceDescriptor {
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            fields: Vec::new(),
            timeouts: DefaultTimeouts::default(),
            identity: None,
            taggable: false,
        }
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn timeouts(mut self, timeouts: DefaultTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn identity(mut self, format: IdentityFormat) -> Self {
        self.identity = Some(format);
        self
    }

    pub fn taggable(mut self) -> Self {
        self.taggable = true;
        self
    }

    pub fn spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check `desired` against the field specs.
    pub fn validate(&self, desired: &Fields) -> Result<(), ValidationError> {
        validate_fields(&self.fields, desired, "")
    }

    /// Fill in declared defaults for absent top-level fields.
    pub fn apply_defaults(&self, desired: &mut Fields) {
        for spec in &self.fields {
            match &spec.default {
                Some(default) if !desired.contains(spec.name) => {
                    desired.set(spec.name, default.clone());
                }
                _ => {}
            }
        }
    }

    /// Update groups with at least one changed in-place field.
    pub fn changed_groups(&self, old: &Fields, new: &Fields) -> BTreeSet<&'static str> {
        self.fields
            .iter()
            .filter(|f| f.settable() && !f.force_new && old.get(f.name) != new.get(f.name))
            .map(FieldSpec::change_group)
            .collect()
    }

    /// Changed fields that force a new resource.
    pub fn replacement_fields(&self, old: &Fields, new: &Fields) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|f| f.settable() && f.force_new && old.get(f.name) != new.get(f.name))
            .map(|f| f.name)
            .collect()
    }
}

fn path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn validate_fields(specs: &[FieldSpec], fields: &Fields, prefix: &str) -> Result<(), ValidationError> {
    for (name, value) in fields.iter() {
        if value.is_null() {
            continue;
        }
        match specs.iter().find(|s| s.name == name) {
            None => {
                return Err(ValidationError::Unknown {
                    field: path(prefix, name),
                });
            }
            Some(spec) if !spec.settable() => {
                return Err(ValidationError::Computed {
                    field: path(prefix, name),
                });
            }
            Some(_) => {}
        }
    }

    for spec in specs {
        let field = path(prefix, spec.name);
        let Some(value) = fields.get(spec.name) else {
            if spec.mode == Mode::Required && spec.default.is_none() {
                return Err(ValidationError::Missing { field });
            }
            continue;
        };
        check_type(&field, &spec.ty, value)?;
        for validation in &spec.validation {
            validation
                .check(value)
                .map_err(|reason| ValidationError::Invalid {
                    field: field.clone(),
                    reason,
                })?;
        }
    }
    Ok(())
}

fn check_type(field: &str, ty: &FieldType, value: &Value) -> Result<(), ValidationError> {
    match (ty, value) {
        (FieldType::String, Value::String(_))
        | (FieldType::Bool, Value::Bool(_))
        | (FieldType::Int, Value::Int(_))
        | (FieldType::Float, Value::Float(_) | Value::Int(_)) => Ok(()),
        (FieldType::List(elem), Value::List(items)) => {
            for (i, item) in items.iter().enumerate() {
                check_type(&format!("{}[{}]", field, i), elem, item)?;
            }
            Ok(())
        }
        (FieldType::Map(elem), Value::Map(entries)) => {
            for (k, item) in entries {
                check_type(&format!("{}.{}", field, k), elem, item)?;
            }
            Ok(())
        }
        (FieldType::Block(specs), Value::Map(entries)) => {
            validate_fields(specs, &Fields::from(entries.clone()), field)
        }
        (FieldType::Block(specs), Value::List(items)) => {
            for (i, item) in items.iter().enumerate() {
                let at = format!("{}[{}]", field, i);
                match item {
                    Value::Map(entries) => {
                        validate_fields(specs, &Fields::from(entries.clone()), &at)?
                    }
                    other => return Err(mismatch(&at, ValueKind::Map, other)),
                }
            }
            Ok(())
        }
        _ => Err(mismatch(field, ty.kind(), value)),
    }
}

fn mismatch(field: &str, expected: ValueKind, found: &Value) -> ValidationError {
    ValidationError::Type(TypeMismatch {
        field: field.to_string(),
        expected,
        found: found.kind(),
    })
}

/// Serialize descriptors keyed by type name.
pub fn catalog<'a>(
    descriptors: impl IntoIterator<Item = &'a ResourceDescriptor>,
) -> BTreeMap<&'static str, &'a ResourceDescriptor> {
    descriptors.into_iter().map(|d| (d.type_name, d)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> ResourceDescriptor {
        ResourceDescriptor::new("test_volume")
            .field(
                FieldSpec::required("name", FieldType::String)
                    .force_new()
                    .validate(Validation::StringLen { min: 1, max: 16 }),
            )
            .field(
                FieldSpec::optional("size", FieldType::Int)
                    .group("capacity")
                    .validate(Validation::IntRange { min: 1, max: 100 }),
            )
            .field(FieldSpec::optional("snapshot", FieldType::Bool).group("capacity"))
            .field(
                FieldSpec::optional("style", FieldType::String)
                    .default_value("FLEXVOL")
                    .validate(Validation::OneOf(&["FLEXVOL", "FLEXGROUP"])),
            )
            .field(FieldSpec::optional(
                "rules",
                FieldType::Block(vec![
                    FieldSpec::required("priority", FieldType::Int),
                    FieldSpec::optional("labels", FieldType::list_of(FieldType::String)),
                ]),
            ))
            .field(FieldSpec::computed("arn", FieldType::String))
    }

    #[test]
    fn test_validate_accepts_valid() {
        let fields = Fields::new()
            .with("name", "vol1")
            .with("size", 10i64)
            .with(
                "rules",
                Value::List(vec![Value::block(
                    Fields::new()
                        .with("priority", 1i64)
                        .with("labels", Value::string_list(["a", "b"])),
                )]),
            );
        descriptor().validate(&fields).unwrap();
    }

    #[test]
    fn test_validate_errors() {
        let d = descriptor();

        let err = d.validate(&Fields::new()).unwrap_err();
        assert_eq!(err, ValidationError::Missing { field: "name".into() });

        let err = d.validate(&Fields::new().with("name", "v").with("arn", "x")).unwrap_err();
        assert!(matches!(err, ValidationError::Computed { .. }));

        let err = d.validate(&Fields::new().with("name", "v").with("bogus", 1i64)).unwrap_err();
        assert!(matches!(err, ValidationError::Unknown { .. }));

        let err = d.validate(&Fields::new().with("name", "v").with("size", 1000i64)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "field 'size': must be between 1 and 100, got 1000"
        );

        let err = d.validate(&Fields::new().with("name", "v").with("size", "big")).unwrap_err();
        assert!(matches!(err, ValidationError::Type(_)));

        let err = d
            .validate(&Fields::new().with("name", "v").with("style", "OTHER"))
            .unwrap_err();
        assert!(matches!(err, ValidationError::Invalid { .. }));
    }

    #[test]
    fn test_validate_nested_block() {
        let fields = Fields::new().with("name", "v").with(
            "rules",
            Value::List(vec![Value::block(Fields::new().with("labels", Value::string_list(["a"])))]),
        );
        let err = descriptor().validate(&fields).unwrap_err();
        assert_eq!(
            err,
            ValidationError::Missing {
                field: "rules[0].priority".into()
            }
        );
    }

    #[test]
    fn test_apply_defaults() {
        let mut fields = Fields::new().with("name", "v");
        descriptor().apply_defaults(&mut fields);
        assert_eq!(fields.string("style").unwrap(), Some("FLEXVOL"));

        let mut fields = Fields::new().with("name", "v").with("style", "FLEXGROUP");
        descriptor().apply_defaults(&mut fields);
        assert_eq!(fields.string("style").unwrap(), Some("FLEXGROUP"));
    }

    #[test]
    fn test_changed_groups_and_replacement() {
        let d = descriptor();
        let old = Fields::new().with("name", "v").with("size", 1i64);
        let new = Fields::new()
            .with("name", "v")
            .with("size", 2i64)
            .with("snapshot", true)
            .with("style", "FLEXGROUP");

        let groups = d.changed_groups(&old, &new);
        assert_eq!(groups, BTreeSet::from(["capacity", "style"]));
        assert!(d.replacement_fields(&old, &new).is_empty());

        let renamed = new.clone().with("name", "w");
        assert_eq!(d.replacement_fields(&new, &renamed), vec!["name"]);
    }
}
