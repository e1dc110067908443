//! Deduplication registry
//!
//! Maps structural fingerprints to the first name registered with them.
//! Later schemas with the same fingerprint become aliases of that canonical
//! name instead of getting a declaration of their own.
//!
//! - [`PreRegistry`]: validators the caller already owns. The converter
//!   swaps them in at any node with a matching fingerprint.
//! - [`DedupRegistry`]: the names generated during one compilation, in
//!   emission order

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::codegen::names::is_valid_identifier;
use crate::error::{CompileError, Result};
use crate::fingerprint::{compute_fingerprint, Fingerprint};
use crate::schema::{Literal, SchemaKind, SchemaNode};

// =============================================================================
// Pre-registered validators
// =============================================================================

/// A validator the caller already defines elsewhere
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreRegisteredValidator {
    /// Identifier of the caller's validator (e.g. `isoDateSchema`)
    pub identifier: String,
    /// Fingerprint of the schema it validates
    pub fingerprint: Fingerprint,
    /// Output type when the validator transforms its input (e.g. `Date`)
    pub output_type: Option<String>,
}

impl PreRegisteredValidator {
    /// Name of the emitted type alias for this validator's output
    pub fn output_alias(&self) -> String {
        format!("{}Output", pascal_identifier(&self.identifier))
    }

    /// Name of the emitted type alias for this validator's input
    pub fn input_alias(&self) -> String {
        format!("{}Input", pascal_identifier(&self.identifier))
    }
}

fn pascal_identifier(identifier: &str) -> String {
    identifier
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Caller-supplied validators, read-only during a compilation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreRegistry {
    validators: Vec<PreRegisteredValidator>,
    by_fingerprint: HashMap<Fingerprint, usize>,
}

impl PreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a caller validator by fingerprint.
    ///
    /// Fails when the identifier is not a valid identifier, is already
    /// registered, or when another validator owns the same fingerprint.
    pub fn pre_register(
        &mut self,
        identifier: impl Into<String>,
        fingerprint: Fingerprint,
        output_type: Option<String>,
    ) -> Result<()> {
        let identifier = identifier.into();
        if !is_valid_identifier(&identifier) {
            return Err(CompileError::InvalidPreRegistration {
                name: identifier,
                message: "not a valid identifier".to_string(),
            });
        }
        if self.validators.iter().any(|v| v.identifier == identifier) {
            return Err(CompileError::InvalidPreRegistration {
                name: identifier,
                message: "identifier registered twice".to_string(),
            });
        }
        if let Some(&existing) = self.by_fingerprint.get(&fingerprint) {
            return Err(CompileError::InvalidPreRegistration {
                name: identifier,
                message: format!(
                    "schema already registered as '{}'",
                    self.validators[existing].identifier
                ),
            });
        }

        self.by_fingerprint.insert(fingerprint.clone(), self.validators.len());
        self.validators.push(PreRegisteredValidator {
            identifier,
            fingerprint,
            output_type,
        });
        Ok(())
    }

    /// Register a caller validator by the schema it validates
    pub fn pre_register_schema(
        &mut self,
        identifier: impl Into<String>,
        schema: &SchemaNode,
        output_type: Option<String>,
    ) -> Result<()> {
        self.pre_register(identifier, compute_fingerprint(schema), output_type)
    }

    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<&PreRegisteredValidator> {
        self.by_fingerprint.get(fingerprint).map(|&i| &self.validators[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &PreRegisteredValidator> {
        self.validators.iter()
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

// =============================================================================
// Dedup registry
// =============================================================================

/// Result of registering a schema under a name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterOutcome {
    /// True when the fingerprint was not seen before
    pub is_new: bool,
    /// Name owning the fingerprint
    pub canonical_name: String,
    pub fingerprint: Fingerprint,
}

/// Fingerprint → canonical name index owned by one compilation
#[derive(Debug, Clone, Default)]
pub struct DedupRegistry {
    canonical: HashMap<Fingerprint, String>,
}

impl DedupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema; the first name for a fingerprint wins
    pub fn register(&mut self, name: &str, schema: &SchemaNode) -> RegisterOutcome {
        self.register_fingerprint(name, compute_fingerprint(schema))
    }

    pub fn register_fingerprint(&mut self, name: &str, fingerprint: Fingerprint) -> RegisterOutcome {
        let (is_new, canonical_name) = match self.canonical.get(&fingerprint) {
            Some(existing) => (false, existing.clone()),
            None => {
                self.canonical.insert(fingerprint.clone(), name.to_string());
                (true, name.to_string())
            }
        };
        RegisterOutcome {
            is_new,
            canonical_name,
            fingerprint,
        }
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.canonical.contains_key(fingerprint)
    }
}

// =============================================================================
// Common schema detection
// =============================================================================

/// A structure shared by several named schemas
#[derive(Debug, Clone, PartialEq)]
pub struct CommonSchema {
    /// Name to declare the shared structure under
    pub name: String,
    pub fingerprint: Fingerprint,
    pub schema: SchemaNode,
    /// Names sharing the structure, in input order
    pub members: Vec<String>,
}

impl CommonSchema {
    pub fn count(&self) -> usize {
        self.members.len()
    }
}

/// Group named schemas by fingerprint and keep groups of at least
/// `min_occurrences` members.
///
/// Groups are ordered by size, largest first; equal sizes keep the order in
/// which their first member appeared.
pub fn find_common_schemas<'a, I>(entries: I, min_occurrences: usize) -> Vec<CommonSchema>
where
    I: IntoIterator<Item = (&'a str, &'a SchemaNode)>,
{
    let mut groups: IndexMap<Fingerprint, CommonSchema> = IndexMap::new();
    for (name, schema) in entries {
        let fingerprint = compute_fingerprint(schema);
        groups
            .entry(fingerprint.clone())
            .or_insert_with(|| CommonSchema {
                name: name.to_string(),
                fingerprint,
                schema: schema.clone(),
                members: Vec::new(),
            })
            .members
            .push(name.to_string());
    }

    let mut common: Vec<CommonSchema> = groups
        .into_values()
        .filter(|group| group.count() >= min_occurrences.max(1))
        .map(|mut group| {
            if let Some(code) = error_code(&group.schema) {
                group.name = format!("{}Error", error_code_to_pascal(&code));
            }
            group
        })
        .collect();
    // Stable sort keeps first-appearance order among equal counts.
    common.sort_by(|a, b| b.count().cmp(&a.count()));
    common
}

/// The single `error.code` literal of an error body shaped
/// `{ error: { code: enum[<one value>] } }`
pub fn error_code(schema: &SchemaNode) -> Option<String> {
    let SchemaKind::Object(body) = &schema.kind else {
        return None;
    };
    let SchemaKind::Object(error) = &body.properties.get("error")?.schema.kind else {
        return None;
    };
    let SchemaKind::Enum(code) = &error.properties.get("code")?.schema.kind else {
        return None;
    };
    match code.values.as_slice() {
        [Literal::String(value)] => Some(value.clone()),
        [other] => Some(other.to_json().to_string()),
        _ => None,
    }
}

/// `NOT_FOUND` → `NotFound`
pub fn error_code_to_pascal(code: &str) -> String {
    code.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let lower = part.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{NodeParser, ParseOptions};
    use serde_json::{json, Value};

    fn node(value: Value) -> SchemaNode {
        let options = ParseOptions::default();
        NodeParser::new("Test", &options).parse(&value).unwrap()
    }

    fn not_found() -> SchemaNode {
        node(json!({
            "type": "object",
            "properties": {
                "error": {
                    "type": "object",
                    "properties": {
                        "code": { "type": "string", "enum": ["NOT_FOUND"] },
                        "message": { "type": "string" }
                    },
                    "required": ["code", "message"]
                }
            },
            "required": ["error"]
        }))
    }

    #[test]
    fn test_register_first_name_wins() {
        let mut registry = DedupRegistry::new();
        let a = node(json!({ "type": "string" }));
        let b = node(json!({ "type": "string", "description": "same shape" }));

        let first = registry.register("Name", &a);
        assert!(first.is_new);
        assert_eq!(first.canonical_name, "Name");

        let second = registry.register("Label", &b);
        assert!(!second.is_new);
        assert_eq!(second.canonical_name, "Name");
        assert_eq!(second.fingerprint, first.fingerprint);
        assert!(registry.contains(&compute_fingerprint(&a)));
    }

    #[test]
    fn test_pre_registry_rejects_conflicts() {
        let mut pre = PreRegistry::new();
        let date = node(json!({ "type": "string", "format": "date" }));
        pre.pre_register_schema("isoDateSchema", &date, Some("Date".into()))
            .unwrap();

        let duplicate = pre.pre_register_schema("otherDateSchema", &date, None);
        assert!(matches!(duplicate, Err(CompileError::InvalidPreRegistration { .. })));

        let invalid = pre.pre_register_schema("not valid", &node(json!({ "type": "boolean" })), None);
        assert!(matches!(invalid, Err(CompileError::InvalidPreRegistration { .. })));

        let found = pre.lookup(&compute_fingerprint(&date)).unwrap();
        assert_eq!(found.identifier, "isoDateSchema");
        assert_eq!(found.output_alias(), "IsoDateSchemaOutput");
    }

    #[test]
    fn test_find_common_schemas_names_error_bodies() {
        let body = not_found();
        let other = node(json!({ "type": "object", "properties": { "id": { "type": "string" } } }));
        let entries = vec![
            ("GetUsersId404ErrorResponse", &body),
            ("GetUsers200Response", &other),
            ("DeleteUsersId404ErrorResponse", &body),
        ];

        let common = find_common_schemas(entries.iter().map(|(n, s)| (*n, *s)), 2);
        assert_eq!(common.len(), 1);
        assert_eq!(common[0].name, "NotFoundError");
        assert_eq!(
            common[0].members,
            vec!["GetUsersId404ErrorResponse", "DeleteUsersId404ErrorResponse"]
        );
    }

    #[test]
    fn test_find_common_schemas_orders_by_count() {
        let a = node(json!({ "type": "string" }));
        let b = node(json!({ "type": "boolean" }));
        let entries = vec![("A1", &a), ("B1", &b), ("B2", &b), ("A2", &a), ("B3", &b)];

        let common = find_common_schemas(entries.iter().map(|(n, s)| (*n, *s)), 2);
        let names: Vec<_> = common.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["B1", "A1"]);
    }

    #[test]
    fn test_error_code_to_pascal() {
        assert_eq!(error_code_to_pascal("NOT_FOUND"), "NotFound");
        assert_eq!(error_code_to_pascal("unauthorized"), "Unauthorized");
        assert_eq!(error_code_to_pascal("RATE__LIMITED"), "RateLimited");
    }
}
