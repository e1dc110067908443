//! Schema-to-validator conversion
//!
//! Walks a [`SchemaNode`] and builds its [`Validator`]. Context decides how
//! references bind: a reference to a cycle member that has not been declared
//! yet becomes `z.lazy`, everything else is a direct reference. Any node whose
//! fingerprint the caller pre-registered is replaced by the caller's
//! validator.

use indexmap::IndexMap;
use std::collections::HashSet;

use super::validator::{Binding, ObjectExtra, ObjectField, Validator};
use crate::error::{CompileError, Result};
use crate::fingerprint::compute_fingerprint;
use crate::graph::SccAnalysis;
use crate::registry::PreRegistry;
use crate::schema::{
    format_field_path, AdditionalProperties, FieldPath, FieldPathSegment, Literal, ObjectSchema,
    SchemaKind, SchemaNode,
};

/// Everything conversion reads; owned by the orchestrator
pub struct ConvertContext<'a> {
    pub components: &'a IndexMap<String, SchemaNode>,
    pub analysis: &'a SccAnalysis,
    /// Component name → emitted identifier
    pub identifiers: &'a IndexMap<String, String>,
    /// Components already emitted
    pub declared: &'a HashSet<String>,
    pub pre_registry: &'a PreRegistry,
    pub max_depth: usize,
}

impl<'a> ConvertContext<'a> {
    fn binding(&self, target: &str) -> Binding {
        if self.analysis.is_cyclic(target) && !self.declared.contains(target) {
            Binding::Lazy
        } else {
            Binding::Direct
        }
    }

    fn pre_registered(&self, node: &SchemaNode) -> Option<Validator> {
        if self.pre_registry.is_empty() {
            return None;
        }
        let bare = SchemaNode {
            description: None,
            ..node.without_examples()
        };
        let found = self.pre_registry.lookup(&compute_fingerprint(&bare))?;
        Some(Validator::PreRegistered {
            identifier: found.identifier.clone(),
            type_alias: found.output_alias(),
            schema: Box::new(strip_descriptions(bare)),
        })
    }
}

fn strip_descriptions(mut node: SchemaNode) -> SchemaNode {
    node.walk_mut(&mut |n| n.description = None);
    node
}

/// Converts the schemas of one declaration
pub struct Converter<'a> {
    ctx: &'a ConvertContext<'a>,
    /// Declaration name, for error messages
    schema: &'a str,
    /// Document location of the declaration root
    base: &'a str,
}

impl<'a> Converter<'a> {
    pub fn new(ctx: &'a ConvertContext<'a>, schema: &'a str, base: &'a str) -> Self {
        Self { ctx, schema, base }
    }

    pub fn convert(&self, node: &SchemaNode) -> Result<Validator> {
        let mut path = FieldPath::new();
        self.convert_node(node, &mut path)
    }

    fn convert_node(&self, node: &SchemaNode, path: &mut FieldPath) -> Result<Validator> {
        if path.len() > self.ctx.max_depth {
            return Err(CompileError::RecursionLimitExceeded {
                schema: self.schema.to_string(),
                path: self.pointer(path),
                limit: self.ctx.max_depth,
            });
        }

        if let Some(pre_registered) = self.ctx.pre_registered(node) {
            return Ok(match &node.description {
                Some(description) => Validator::Described {
                    inner: Box::new(pre_registered),
                    description: description.clone(),
                },
                None => pre_registered,
            });
        }

        let mut validator = self.convert_kind(&node.kind, path)?;
        if let Some(description) = &node.description {
            validator = Validator::Described {
                inner: Box::new(validator),
                description: description.clone(),
            };
        }
        if node.optional {
            validator = Validator::Optional(Box::new(validator));
        }
        if node.nullable {
            validator = Validator::Nullable(Box::new(validator));
        }
        Ok(validator)
    }

    fn convert_kind(&self, kind: &SchemaKind, path: &mut FieldPath) -> Result<Validator> {
        Ok(match kind {
            SchemaKind::Unknown => Validator::Unknown,
            SchemaKind::String(s) => Validator::String(s.clone()),
            SchemaKind::Number(n) => Validator::Number(n.clone()),
            SchemaKind::Boolean => Validator::Boolean,
            SchemaKind::Null => Validator::Null,
            SchemaKind::Enum(e) => {
                if e.values.is_empty() {
                    return Err(self.unsupported(path, "enum without values"));
                }
                Validator::Enum(e.values.clone())
            }
            SchemaKind::Array(array) => {
                path.push(FieldPathSegment::ArrayItems);
                let items = self.convert_node(&array.items, path);
                path.pop();
                Validator::Array {
                    items: Box::new(items?),
                    min_items: array.min_items,
                    max_items: array.max_items,
                }
            }
            SchemaKind::Object(object) => self.convert_object(object, path)?,
            SchemaKind::Ref(target) => self.convert_ref(target, path)?,
            SchemaKind::Union(variants) => self.convert_union(variants, path)?,
            SchemaKind::Intersection(parts) => {
                let mut converted = Vec::with_capacity(parts.len());
                for (i, part) in parts.iter().enumerate() {
                    path.push(FieldPathSegment::Part(i));
                    let part = self.convert_node(part, path);
                    path.pop();
                    converted.push(part?);
                }
                if converted.len() < 2 {
                    return Err(self.unsupported(path, "intersection needs at least two parts"));
                }
                Validator::Intersection(converted)
            }
        })
    }

    fn convert_object(&self, object: &ObjectSchema, path: &mut FieldPath) -> Result<Validator> {
        let mut fields = Vec::with_capacity(object.properties.len());
        for (name, property) in &object.properties {
            path.push(FieldPathSegment::Field(name.clone()));
            let validator = self.convert_node(&property.schema, path);
            path.pop();
            fields.push(ObjectField {
                name: name.clone(),
                validator: validator?,
                required: property.required,
            });
        }

        let additional = match &object.additional {
            AdditionalProperties::None => None,
            AdditionalProperties::Any => Some(None),
            AdditionalProperties::Schema(value) => {
                path.push(FieldPathSegment::MapValue);
                let converted = self.convert_node(value, path);
                path.pop();
                Some(Some(Box::new(converted?)))
            }
        };

        if object.sealed {
            if additional.is_some() {
                return Err(self.unsupported(path, "sealed object with additionalProperties"));
            }
            return Ok(Validator::Object {
                fields,
                extra: ObjectExtra::Strict,
            });
        }

        Ok(match (fields.is_empty(), additional) {
            (true, Some(value)) => Validator::Record(value),
            (_, None) => Validator::Object {
                fields,
                extra: ObjectExtra::Strip,
            },
            (false, Some(None)) => Validator::Object {
                fields,
                extra: ObjectExtra::Passthrough,
            },
            (false, Some(Some(value))) => Validator::Object {
                fields,
                extra: ObjectExtra::Catchall(value),
            },
        })
    }

    fn convert_ref(&self, target: &str, path: &FieldPath) -> Result<Validator> {
        let identifier = self
            .ctx
            .identifiers
            .get(target)
            .filter(|_| self.ctx.components.contains_key(target))
            .ok_or_else(|| CompileError::Resolution {
                missing: target.to_string(),
                schema: self.schema.to_string(),
                path: self.pointer(path),
            })?;
        Ok(Validator::Reference {
            target: target.to_string(),
            identifier: identifier.clone(),
            binding: self.ctx.binding(target),
        })
    }

    fn convert_union(&self, variants: &[SchemaNode], path: &mut FieldPath) -> Result<Validator> {
        if variants.len() < 2 {
            return Err(self.unsupported(path, "union needs at least two variants"));
        }
        let mut converted = Vec::with_capacity(variants.len());
        for (i, variant) in variants.iter().enumerate() {
            path.push(FieldPathSegment::Variant(i));
            let variant = self.convert_node(variant, path);
            path.pop();
            converted.push(variant?);
        }

        match self.discriminator(variants, &converted) {
            Some((discriminator, mapping)) => {
                tracing::debug!(
                    schema = self.schema,
                    path = %self.pointer(path),
                    discriminator = %discriminator,
                    "discriminated union inferred"
                );
                Ok(Validator::DiscriminatedUnion {
                    discriminator,
                    mapping,
                    variants: converted,
                })
            }
            None => Ok(Validator::Union(converted)),
        }
    }

    /// The shared discriminator of a union, if every variant qualifies:
    /// an object (refs resolved) with exactly one required single-literal
    /// property, the same property name everywhere, distinct values, and no
    /// variant bound lazily or replaced by a caller validator.
    fn discriminator(
        &self,
        variants: &[SchemaNode],
        converted: &[Validator],
    ) -> Option<(String, Vec<(Literal, usize)>)> {
        let mut key: Option<String> = None;
        let mut mapping: Vec<(Literal, usize)> = Vec::with_capacity(variants.len());

        for (i, (variant, validator)) in variants.iter().zip(converted).enumerate() {
            if !is_object_validator(validator) {
                return None;
            }
            let object = self.resolve_object(variant)?;
            let (name, value) = single_literal_field(object)?;
            match &key {
                None => key = Some(name.to_string()),
                Some(existing) if existing == name => {}
                Some(_) => return None,
            }
            if mapping.iter().any(|(seen, _)| seen == value) {
                return None;
            }
            mapping.push((value.clone(), i));
        }

        key.map(|key| (key, mapping))
    }

    /// Follow references to the object a variant stands for
    fn resolve_object<'n>(&self, node: &'n SchemaNode) -> Option<&'n ObjectSchema>
    where
        'a: 'n,
    {
        let mut current = node;
        for _ in 0..=self.ctx.max_depth {
            if current.optional || current.nullable {
                return None;
            }
            match &current.kind {
                SchemaKind::Object(object) => return Some(object),
                SchemaKind::Ref(target) => {
                    let next: &'a SchemaNode = self.ctx.components.get(target)?;
                    if self.ctx.pre_registered(next).is_some() {
                        return None;
                    }
                    current = next;
                }
                _ => return None,
            }
        }
        None
    }

    fn unsupported(&self, path: &FieldPath, reason: &str) -> CompileError {
        CompileError::unsupported(self.schema, &self.pointer(path), reason)
    }

    fn pointer(&self, path: &FieldPath) -> String {
        format!("{}{}", self.base, &format_field_path(path)[1..])
    }
}

/// A variant validator zod accepts as a discriminated union option
fn is_object_validator(validator: &Validator) -> bool {
    match validator {
        Validator::Object { .. } => true,
        Validator::Reference { binding, .. } => *binding == Binding::Direct,
        Validator::Described { inner, .. } => is_object_validator(inner),
        _ => false,
    }
}

/// The only required property whose schema is a one-value enum
fn single_literal_field(object: &ObjectSchema) -> Option<(&str, &Literal)> {
    let mut found = None;
    for (name, property) in &object.properties {
        if !property.required {
            continue;
        }
        let schema = &property.schema;
        if schema.optional || schema.nullable {
            continue;
        }
        if let SchemaKind::Enum(e) = &schema.kind {
            if let [value] = e.values.as_slice() {
                if found.is_some() {
                    return None;
                }
                found = Some((name.as_str(), value));
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{compute_scc_analysis, SchemaGraph};
    use crate::schema::{NodeParser, ParseOptions, DEFAULT_MAX_DEPTH};
    use serde_json::{json, Value};

    struct Fixture {
        components: IndexMap<String, SchemaNode>,
        analysis: SccAnalysis,
        identifiers: IndexMap<String, String>,
        declared: HashSet<String>,
        pre_registry: PreRegistry,
    }

    impl Fixture {
        fn new(value: Value) -> Self {
            let options = ParseOptions::default();
            let components: IndexMap<String, SchemaNode> = value
                .as_object()
                .unwrap()
                .iter()
                .map(|(name, schema)| (name.clone(), NodeParser::new(name, &options).parse(schema).unwrap()))
                .collect();
            let graph = SchemaGraph::build(&components, DEFAULT_MAX_DEPTH).unwrap();
            let analysis = compute_scc_analysis(&graph);
            let identifiers = components.keys().map(|k| (k.clone(), k.clone())).collect();
            Self {
                components,
                analysis,
                identifiers,
                declared: HashSet::new(),
                pre_registry: PreRegistry::new(),
            }
        }

        fn declare_all(mut self) -> Self {
            self.declared = self.components.keys().cloned().collect();
            self
        }

        fn convert(&self, name: &str) -> Result<Validator> {
            let ctx = ConvertContext {
                components: &self.components,
                analysis: &self.analysis,
                identifiers: &self.identifiers,
                declared: &self.declared,
                pre_registry: &self.pre_registry,
                max_depth: DEFAULT_MAX_DEPTH,
            };
            let base = format!("#/components/schemas/{}", name);
            Converter::new(&ctx, name, &base).convert(&self.components[name])
        }
    }

    fn reference(target: &str) -> Value {
        json!({ "$ref": format!("#/components/schemas/{}", target) })
    }

    fn variant(kind: &str) -> Value {
        json!({
            "type": "object",
            "properties": {
                "kind": { "type": "string", "enum": [kind] },
                "size": { "type": "number" }
            },
            "required": ["kind", "size"]
        })
    }

    #[test]
    fn test_round_trip_rich_object() {
        let fixture = Fixture::new(json!({
            "Tag": { "type": "string" },
            "Item": {
                "type": "object",
                "description": "An item",
                "properties": {
                    "id": { "type": "string", "format": "uuid" },
                    "count": { "type": "integer", "minimum": 0, "maximum": 10 },
                    "tags": { "type": "array", "items": reference("Tag"), "maxItems": 5 },
                    "note": { "type": "string", "nullable": true, "description": "free text" },
                    "meta": { "type": "object", "additionalProperties": { "type": "boolean" } },
                    "status": { "enum": ["open", "closed"] }
                },
                "required": ["id", "count"],
                "additionalProperties": false
            }
        }))
        .declare_all();

        let validator = fixture.convert("Item").unwrap();
        assert_eq!(validator.introspect(), fixture.components["Item"]);
    }

    #[test]
    fn test_discriminated_union_detected() {
        let fixture = Fixture::new(json!({
            "Circle": variant("circle"),
            "Square": variant("square"),
            "Shape": { "oneOf": [reference("Circle"), reference("Square")] }
        }))
        .declare_all();

        match fixture.convert("Shape").unwrap() {
            Validator::DiscriminatedUnion {
                discriminator,
                mapping,
                variants,
            } => {
                assert_eq!(discriminator, "kind");
                assert_eq!(mapping[0], (Literal::String("circle".into()), 0));
                assert_eq!(mapping[1], (Literal::String("square".into()), 1));
                assert_eq!(variants.len(), 2);
            }
            other => panic!("expected discriminated union, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_discriminator_values_fall_back() {
        let fixture = Fixture::new(json!({
            "A": variant("same"),
            "B": variant("same"),
            "AB": { "oneOf": [reference("A"), reference("B")] }
        }))
        .declare_all();
        assert!(matches!(fixture.convert("AB").unwrap(), Validator::Union(_)));
    }

    #[test]
    fn test_mismatched_discriminator_keys_fall_back() {
        let fixture = Fixture::new(json!({
            "Mixed": {
                "oneOf": [
                    variant("a"),
                    {
                        "type": "object",
                        "properties": { "type": { "type": "string", "enum": ["b"] } },
                        "required": ["type"]
                    }
                ]
            }
        }));
        assert!(matches!(fixture.convert("Mixed").unwrap(), Validator::Union(_)));
    }

    #[test]
    fn test_lazy_variant_prevents_discrimination() {
        let fixture = Fixture::new(json!({
            "Leaf": variant("leaf"),
            "Branch": {
                "type": "object",
                "properties": {
                    "kind": { "type": "string", "enum": ["branch"] },
                    "children": { "type": "array", "items": reference("Tree") }
                },
                "required": ["kind"]
            },
            "Tree": { "oneOf": [reference("Leaf"), reference("Branch")] }
        }));
        // Nothing declared yet: Branch is a cycle member and binds lazily.
        let validator = fixture.convert("Tree").unwrap();
        assert!(matches!(validator, Validator::Union(_)));
        assert_eq!(validator.lazy_count(), 1);
    }

    #[test]
    fn test_self_reference_is_lazy_until_declared() {
        let fixture = Fixture::new(json!({
            "Node": {
                "type": "object",
                "properties": { "next": reference("Node") }
            }
        }));
        let validator = fixture.convert("Node").unwrap();
        assert!(validator.render_expr().contains("z.lazy(() => NodeSchema)"));

        let declared = fixture.declare_all();
        let validator = declared.convert("Node").unwrap();
        assert!(!validator.render_expr().contains("z.lazy"));
    }

    #[test]
    fn test_pre_registered_validator_replaces_node() {
        let mut fixture = Fixture::new(json!({
            "Event": {
                "type": "object",
                "properties": {
                    "at": { "type": "string", "format": "date", "description": "day of the event" }
                },
                "required": ["at"]
            }
        }))
        .declare_all();
        let date = NodeParser::new("date", &ParseOptions::default())
            .parse(&json!({ "type": "string", "format": "date" }))
            .unwrap();
        fixture
            .pre_registry
            .pre_register_schema("isoDateSchema", &date, Some("Date".into()))
            .unwrap();

        let validator = fixture.convert("Event").unwrap();
        assert_eq!(
            validator.render_expr(),
            "z.object({\n  at: isoDateSchema.describe(\"day of the event\"),\n})"
        );
        assert_eq!(validator.render_type(), "{\n  at: IsoDateSchemaOutput;\n}");
        assert_eq!(validator.pre_registered_identifiers(), vec!["isoDateSchema"]);
        assert_eq!(validator.introspect(), fixture.components["Event"]);
    }

    #[test]
    fn test_intersection_renders_chained_and() {
        let fixture = Fixture::new(json!({
            "A": { "type": "object", "properties": { "a": { "type": "string" } } },
            "B": { "type": "object", "properties": { "b": { "type": "string" } } },
            "C": { "type": "object", "properties": { "c": { "type": "string" } } },
            "ABC": { "allOf": [reference("A"), { "allOf": [reference("B"), reference("C")] }] }
        }))
        .declare_all();
        let validator = fixture.convert("ABC").unwrap();
        assert_eq!(validator.render_expr(), "ASchema.and(BSchema).and(CSchema)");
        assert_eq!(validator.render_type(), "A & B & C");
    }
}
