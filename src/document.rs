//! Document loading
//!
//! Splits an API description into its named component schemas and its
//! routes, both in document order.

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{CompileError, Result};
use crate::routes::{parse_routes, RouteInfo};
use crate::schema::{component_ref, NodeParser, ParseOptions, SchemaNode};

/// A parsed API description
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// `components.schemas`, keyed by component name
    pub components: IndexMap<String, SchemaNode>,
    pub routes: Vec<RouteInfo>,
}

impl Document {
    /// Parse components and, when `include_routes` is set, routes.
    pub fn parse(value: &Value, options: &ParseOptions, include_routes: bool) -> Result<Self> {
        if !value.is_object() {
            return Err(CompileError::invalid_document("#", "expected a JSON object"));
        }
        let components = parse_components(value, options)?;
        let routes = if include_routes {
            parse_routes(value, options)?
        } else {
            Vec::new()
        };
        Ok(Self { components, routes })
    }
}

/// Parse `components.schemas` into nodes
pub fn parse_components(document: &Value, options: &ParseOptions) -> Result<IndexMap<String, SchemaNode>> {
    let Some(schemas) = document.get("components").and_then(|c| c.get("schemas")) else {
        return Ok(IndexMap::new());
    };
    let schemas = schemas
        .as_object()
        .ok_or_else(|| CompileError::invalid_document("#/components/schemas", "expected an object"))?;

    let mut components = IndexMap::with_capacity(schemas.len());
    for (name, raw) in schemas {
        let node = NodeParser::new(name, options)
            .with_base(component_ref(name))
            .parse(raw)?;
        components.insert(name.clone(), node);
    }
    tracing::debug!(count = components.len(), "components parsed");
    Ok(components)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaKind;
    use serde_json::json;

    #[test]
    fn test_components_keep_document_order() {
        let doc = Document::parse(
            &json!({
                "components": {
                    "schemas": {
                        "Zebra": { "type": "string" },
                        "Apple": { "type": "boolean" }
                    }
                }
            }),
            &ParseOptions::default(),
            true,
        )
        .unwrap();
        assert_eq!(doc.components.keys().collect::<Vec<_>>(), vec!["Zebra", "Apple"]);
        assert_eq!(doc.components["Apple"].kind, SchemaKind::Boolean);
        assert!(doc.routes.is_empty());
    }

    #[test]
    fn test_errors_carry_component_location() {
        let err = Document::parse(
            &json!({
                "components": {
                    "schemas": {
                        "User": {
                            "type": "object",
                            "properties": { "age": { "type": "integer", "multipleOf": 2 } }
                        }
                    }
                }
            }),
            &ParseOptions::default(),
            false,
        )
        .unwrap_err();
        match err {
            CompileError::UnsupportedSchema { schema, path, .. } => {
                assert_eq!(schema, "User");
                assert_eq!(path, "#/components/schemas/User/properties/age");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_non_object_document_rejected() {
        let err = Document::parse(&json!([1, 2]), &ParseOptions::default(), true).unwrap_err();
        assert!(matches!(err, CompileError::InvalidDocument { .. }));
    }
}
