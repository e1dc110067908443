//! Schema node model
//!
//! The tagged-variant, in-memory form of one schema. Nodes are parsed from
//! OpenAPI 3.0 schema objects (plus the common 3.1 `type: [T, "null"]` form)
//! and can describe themselves back as canonical JSON, which is what the
//! fingerprint is computed over.
//!
//! Parsing normalizes a few equivalent spellings so that every node has one
//! canonical shape:
//! - single-member `oneOf`/`anyOf`/`allOf` collapse into the member
//! - nested `allOf` flatten into one intersection
//! - an object with no properties and no `additionalProperties` is an open map
//! - a recognised `format` wins over `pattern`

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;

use crate::error::{CompileError, Result};

/// Prefix of every component schema reference
pub const COMPONENT_REF_PREFIX: &str = "#/components/schemas/";

/// Vendor key carrying `valid`/`invalid` example literals
pub const DEFAULT_EXAMPLES_KEY: &str = "x-contract-examples";

/// Default bound on schema nesting depth
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Keywords that change what a schema accepts but have no counterpart here
const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "multipleOf",
    "not",
    "if",
    "then",
    "else",
    "prefixItems",
    "contains",
    "patternProperties",
    "propertyNames",
    "dependentSchemas",
    "dependentRequired",
    "minProperties",
    "maxProperties",
    "unevaluatedItems",
    "unevaluatedProperties",
    "additionalItems",
];

/// Shape keywords that have no effect next to `$ref`; only `nullable`
/// and `description` are honoured there
const REF_IGNORED_SIBLINGS: &[&str] = &[
    "type",
    "properties",
    "required",
    "additionalProperties",
    "items",
    "enum",
    "const",
    "format",
    "pattern",
    "minLength",
    "maxLength",
    "minimum",
    "maximum",
    "minItems",
    "maxItems",
    "oneOf",
    "anyOf",
    "allOf",
];

/// Keywords accepted only with the value `false`
const FALSE_ONLY_KEYWORDS: &[&str] = &["exclusiveMinimum", "exclusiveMaximum", "uniqueItems"];

// =============================================================================
// Field Path
// =============================================================================

/// A segment in the path from a schema root to a nested node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldPathSegment {
    /// A named object property
    Field(String),
    /// Array items type
    ArrayItems,
    /// The value type in a map (additionalProperties)
    MapValue,
    /// A union variant (index into oneOf)
    Variant(usize),
    /// An intersection part (index into allOf)
    Part(usize),
}

impl fmt::Display for FieldPathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, "/properties/{}", escape_pointer(name)),
            Self::ArrayItems => write!(f, "/items"),
            Self::MapValue => write!(f, "/additionalProperties"),
            Self::Variant(i) => write!(f, "/oneOf/{}", i),
            Self::Part(i) => write!(f, "/allOf/{}", i),
        }
    }
}

/// Full path from a schema root to a node
pub type FieldPath = Vec<FieldPathSegment>;

/// Format a field path as a JSON pointer fragment relative to its schema
pub fn format_field_path(path: &[FieldPathSegment]) -> String {
    let mut out = String::from("#");
    for segment in path {
        out.push_str(&segment.to_string());
    }
    out
}

pub(crate) fn escape_pointer(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

// =============================================================================
// Node Types
// =============================================================================

/// Named string formats with a dedicated validator combinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StringFormat {
    Email,
    Url,
    Uri,
    Uuid,
    DateTime,
    Date,
}

impl StringFormat {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "email" => Some(Self::Email),
            "url" => Some(Self::Url),
            "uri" => Some(Self::Uri),
            "uuid" => Some(Self::Uuid),
            "date-time" => Some(Self::DateTime),
            "date" => Some(Self::Date),
            _ => None,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Url => "url",
            Self::Uri => "uri",
            Self::Uuid => "uuid",
            Self::DateTime => "date-time",
            Self::Date => "date",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringSchema {
    pub format: Option<StringFormat>,
    pub pattern: Option<String>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumberSchema {
    pub integer: bool,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

/// A literal value allowed by an enum
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    String(String),
    Number(Number),
    Boolean(bool),
}

impl Literal {
    pub fn kind(&self) -> LiteralKind {
        match self {
            Self::String(_) => LiteralKind::String,
            Self::Number(_) => LiteralKind::Number,
            Self::Boolean(_) => LiteralKind::Boolean,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Number(n) => Value::Number(n.clone()),
            Self::Boolean(b) => Value::Bool(*b),
        }
    }
}

impl fmt::Display for Literal {
    /// Renders the literal as JSON, which is also valid TypeScript.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// Kind shared by the values of an enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiteralKind {
    String,
    Number,
    Boolean,
    Mixed,
}

impl LiteralKind {
    pub fn of(values: &[Literal]) -> Self {
        let mut kinds = values.iter().map(Literal::kind);
        match kinds.next() {
            None => Self::Mixed,
            Some(first) if kinds.all(|k| k == first) => first,
            Some(_) => Self::Mixed,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumSchema {
    pub values: Vec<Literal>,
    pub value_kind: LiteralKind,
}

impl EnumSchema {
    pub fn new(values: Vec<Literal>) -> Self {
        let value_kind = LiteralKind::of(&values);
        Self { values, value_kind }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArraySchema {
    pub items: Box<SchemaNode>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
}

/// One object property
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub schema: SchemaNode,
    pub required: bool,
}

/// What an object accepts beyond its declared properties
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AdditionalProperties {
    /// Unspecified; extra keys are neither typed nor rejected
    #[default]
    None,
    /// Any extra key with any value
    Any,
    /// Extra keys whose values match a schema
    Schema(Box<SchemaNode>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectSchema {
    pub properties: IndexMap<String, Property>,
    pub additional: AdditionalProperties,
    /// `additionalProperties: false`
    pub sealed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaKind {
    /// The empty schema `{}`
    Unknown,
    String(StringSchema),
    Number(NumberSchema),
    Boolean,
    Null,
    Enum(EnumSchema),
    Array(ArraySchema),
    Object(ObjectSchema),
    Ref(String),
    Union(Vec<SchemaNode>),
    Intersection(Vec<SchemaNode>),
}

/// Example literals used only for self-test generation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Examples {
    pub valid: Vec<Value>,
    pub invalid: Vec<Value>,
}

/// One node of the schema tree
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    pub kind: SchemaKind,
    pub optional: bool,
    pub nullable: bool,
    pub description: Option<String>,
    pub examples: Option<Examples>,
}

impl SchemaNode {
    pub fn new(kind: SchemaKind) -> Self {
        Self {
            kind,
            optional: false,
            nullable: false,
            description: None,
            examples: None,
        }
    }

    pub fn reference(target: impl Into<String>) -> Self {
        Self::new(SchemaKind::Ref(target.into()))
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Name of the referenced component, if this is a `ref` node
    pub fn ref_target(&self) -> Option<&str> {
        match &self.kind {
            SchemaKind::Ref(target) => Some(target),
            _ => None,
        }
    }

    /// True when the node has no optional/nullable/description decoration
    pub fn is_bare(&self) -> bool {
        !self.optional && !self.nullable && self.description.is_none() && self.examples.is_none()
    }

    /// A copy without example literals anywhere in the tree
    pub fn without_examples(&self) -> SchemaNode {
        let mut node = self.clone();
        node.walk_mut(&mut |n| n.examples = None);
        node
    }

    /// Visit this node and every descendant, parents first
    pub fn walk_mut(&mut self, f: &mut dyn FnMut(&mut SchemaNode)) {
        f(self);
        match &mut self.kind {
            SchemaKind::Array(array) => array.items.walk_mut(f),
            SchemaKind::Object(object) => {
                for property in object.properties.values_mut() {
                    property.schema.walk_mut(f);
                }
                if let AdditionalProperties::Schema(schema) = &mut object.additional {
                    schema.walk_mut(f);
                }
            }
            SchemaKind::Union(members) | SchemaKind::Intersection(members) => {
                for member in members {
                    member.walk_mut(f);
                }
            }
            _ => {}
        }
    }

    /// Describe the node as an OpenAPI schema object.
    ///
    /// With `include_metadata` false, descriptions are left out; this is the
    /// form fingerprints are computed over. Examples are never included.
    pub fn to_openapi(&self, include_metadata: bool) -> Value {
        let mut map = Map::new();
        match &self.kind {
            SchemaKind::Unknown => {}
            SchemaKind::String(s) => {
                map.insert("type".into(), "string".into());
                if let Some(format) = s.format {
                    map.insert("format".into(), format.keyword().into());
                }
                if let Some(pattern) = &s.pattern {
                    map.insert("pattern".into(), pattern.clone().into());
                }
                if let Some(min) = s.min_length {
                    map.insert("minLength".into(), min.into());
                }
                if let Some(max) = s.max_length {
                    map.insert("maxLength".into(), max.into());
                }
            }
            SchemaKind::Number(n) => {
                let type_name = if n.integer { "integer" } else { "number" };
                map.insert("type".into(), type_name.into());
                if let Some(min) = n.minimum {
                    map.insert("minimum".into(), number_value(min));
                }
                if let Some(max) = n.maximum {
                    map.insert("maximum".into(), number_value(max));
                }
            }
            SchemaKind::Boolean => {
                map.insert("type".into(), "boolean".into());
            }
            SchemaKind::Null => {
                map.insert("type".into(), "null".into());
            }
            SchemaKind::Enum(e) => {
                match e.value_kind {
                    LiteralKind::String => {
                        map.insert("type".into(), "string".into());
                    }
                    LiteralKind::Number => {
                        map.insert("type".into(), "number".into());
                    }
                    LiteralKind::Boolean => {
                        map.insert("type".into(), "boolean".into());
                    }
                    LiteralKind::Mixed => {}
                }
                let values = e.values.iter().map(Literal::to_json).collect();
                map.insert("enum".into(), Value::Array(values));
            }
            SchemaKind::Array(a) => {
                map.insert("type".into(), "array".into());
                map.insert("items".into(), a.items.to_openapi(include_metadata));
                if let Some(min) = a.min_items {
                    map.insert("minItems".into(), min.into());
                }
                if let Some(max) = a.max_items {
                    map.insert("maxItems".into(), max.into());
                }
            }
            SchemaKind::Object(o) => {
                map.insert("type".into(), "object".into());
                let mut properties = Map::new();
                let mut required: Vec<&str> = Vec::new();
                for (name, property) in &o.properties {
                    properties.insert(name.clone(), property.schema.to_openapi(include_metadata));
                    if property.required {
                        required.push(name);
                    }
                }
                if !properties.is_empty() {
                    map.insert("properties".into(), Value::Object(properties));
                }
                if !required.is_empty() {
                    required.sort_unstable();
                    map.insert("required".into(), required.into());
                }
                if o.sealed {
                    map.insert("additionalProperties".into(), Value::Bool(false));
                } else {
                    match &o.additional {
                        AdditionalProperties::None => {}
                        AdditionalProperties::Any => {
                            map.insert("additionalProperties".into(), Value::Bool(true));
                        }
                        AdditionalProperties::Schema(schema) => {
                            map.insert(
                                "additionalProperties".into(),
                                schema.to_openapi(include_metadata),
                            );
                        }
                    }
                }
            }
            SchemaKind::Ref(target) => {
                map.insert("$ref".into(), component_ref(target).into());
            }
            SchemaKind::Union(variants) => {
                let variants = variants.iter().map(|v| v.to_openapi(include_metadata)).collect();
                map.insert("oneOf".into(), Value::Array(variants));
            }
            SchemaKind::Intersection(parts) => {
                let parts = parts.iter().map(|p| p.to_openapi(include_metadata)).collect();
                map.insert("allOf".into(), Value::Array(parts));
            }
        }
        if self.nullable {
            map.insert("nullable".into(), Value::Bool(true));
        }
        if self.optional {
            map.insert("x-optional".into(), Value::Bool(true));
        }
        if include_metadata {
            if let Some(description) = &self.description {
                map.insert("description".into(), description.clone().into());
            }
        }
        Value::Object(map)
    }
}

/// Render a component name as a `$ref` string
pub fn component_ref(name: &str) -> String {
    format!("{}{}", COMPONENT_REF_PREFIX, name.replace('%', "%25").replace(' ', "%20"))
}

fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        Value::from(value as i64)
    } else {
        Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Options shared by everything that parses schema JSON
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Vendor key carrying example literals
    pub examples_key: String,
    /// Maximum nesting depth before failing with `RecursionLimitExceeded`
    pub max_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            examples_key: DEFAULT_EXAMPLES_KEY.to_string(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Parses the schema tree rooted at one named schema
pub struct NodeParser<'a> {
    schema: &'a str,
    base: String,
    options: &'a ParseOptions,
}

impl<'a> NodeParser<'a> {
    /// `schema` names the root for error messages (a component name or a
    /// route location such as `GET /users responses/200`).
    pub fn new(schema: &'a str, options: &'a ParseOptions) -> Self {
        Self {
            schema,
            base: "#".to_string(),
            options,
        }
    }

    /// Prefix error paths with the document location of the root
    /// (e.g. `#/components/schemas/User`).
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    fn pointer(&self, path: &FieldPath) -> String {
        let relative = format_field_path(path);
        format!("{}{}", self.base, &relative[1..])
    }

    pub fn parse(&self, value: &Value) -> Result<SchemaNode> {
        let mut path = FieldPath::new();
        self.parse_node(value, &mut path)
    }

    fn parse_node(&self, value: &Value, path: &mut FieldPath) -> Result<SchemaNode> {
        if path.len() > self.options.max_depth {
            return Err(CompileError::RecursionLimitExceeded {
                schema: self.schema.to_string(),
                path: self.pointer(path),
                limit: self.options.max_depth,
            });
        }

        let map = match value {
            Value::Object(map) => map,
            Value::Bool(true) => return Ok(SchemaNode::new(SchemaKind::Unknown)),
            other => {
                return Err(self.unsupported(
                    path,
                    format!("expected a schema object, got {}", json_type_name(other)),
                ))
            }
        };

        self.reject_unsupported_keywords(map, path)?;

        let description = map.get("description").and_then(Value::as_str).map(str::to_string);
        let examples = self.parse_examples(map, path)?;
        let (type_name, null_in_type) = self.parse_type(map, path)?;
        let nullable = null_in_type || map.get("nullable").and_then(Value::as_bool).unwrap_or(false);

        let mut node = if let Some(reference) = map.get("$ref") {
            let ignored: Vec<&str> = REF_IGNORED_SIBLINGS
                .iter()
                .copied()
                .filter(|keyword| map.contains_key(*keyword))
                .collect();
            if !ignored.is_empty() {
                tracing::debug!(
                    schema = self.schema,
                    path = %self.pointer(path),
                    keywords = ?ignored,
                    "keywords next to $ref ignored"
                );
            }
            SchemaNode::reference(self.parse_ref(reference, path)?)
        } else if map.contains_key("oneOf") || map.contains_key("anyOf") {
            if map.contains_key("oneOf") && map.contains_key("anyOf") {
                return Err(self.unsupported(path, "both oneOf and anyOf on one schema"));
            }
            let key = if map.contains_key("oneOf") { "oneOf" } else { "anyOf" };
            self.parse_union(&map[key], key, path)?
        } else if let Some(parts) = map.get("allOf") {
            self.parse_intersection(parts, path)?
        } else if map.contains_key("enum") || map.contains_key("const") {
            self.parse_enum(map, path)?
        } else {
            self.parse_typed(map, type_name.as_deref(), path)?
        };

        node.nullable |= nullable;
        if description.is_some() {
            node.description = description;
        }
        if examples.is_some() {
            node.examples = examples;
        }
        Ok(node)
    }

    fn parse_typed(
        &self,
        map: &Map<String, Value>,
        type_name: Option<&str>,
        path: &mut FieldPath,
    ) -> Result<SchemaNode> {
        let kind = match type_name {
            Some("string") => SchemaKind::String(self.parse_string(map, path)?),
            Some("number") => SchemaKind::Number(self.parse_number(map, false, path)?),
            Some("integer") => SchemaKind::Number(self.parse_number(map, true, path)?),
            Some("boolean") => SchemaKind::Boolean,
            Some("null") => SchemaKind::Null,
            Some("array") => SchemaKind::Array(self.parse_array(map, path)?),
            Some("object") => SchemaKind::Object(self.parse_object(map, path)?),
            Some(other) => {
                return Err(self.unsupported(path, format!("unknown type '{}'", other)));
            }
            None if map.contains_key("properties")
                || map.contains_key("additionalProperties")
                || map.contains_key("required") =>
            {
                SchemaKind::Object(self.parse_object(map, path)?)
            }
            None if map.contains_key("items") => SchemaKind::Array(self.parse_array(map, path)?),
            None => SchemaKind::Unknown,
        };
        Ok(SchemaNode::new(kind))
    }

    fn reject_unsupported_keywords(&self, map: &Map<String, Value>, path: &FieldPath) -> Result<()> {
        for keyword in UNSUPPORTED_KEYWORDS {
            if map.contains_key(*keyword) {
                return Err(self.unsupported(path, format!("'{}' is not supported", keyword)));
            }
        }
        for keyword in FALSE_ONLY_KEYWORDS {
            match map.get(*keyword) {
                None | Some(Value::Bool(false)) => {}
                Some(_) => {
                    return Err(self.unsupported(path, format!("'{}' is not supported", keyword)));
                }
            }
        }
        Ok(())
    }

    fn parse_type(&self, map: &Map<String, Value>, path: &FieldPath) -> Result<(Option<String>, bool)> {
        match map.get("type") {
            None => Ok((None, false)),
            Some(Value::String(name)) => Ok((Some(name.clone()), false)),
            Some(Value::Array(names)) => {
                let mut has_null = false;
                let mut others = Vec::new();
                for name in names {
                    match name.as_str() {
                        Some("null") => has_null = true,
                        Some(other) => others.push(other.to_string()),
                        None => return Err(self.invalid(path, "type array must contain strings")),
                    }
                }
                match (others.len(), has_null) {
                    (0, true) => Ok((Some("null".to_string()), false)),
                    (1, _) => Ok((others.pop(), has_null)),
                    _ => Err(self.unsupported(path, "multi-type 'type' arrays are not supported")),
                }
            }
            Some(other) => Err(self.invalid(
                path,
                format!("type must be a string, got {}", json_type_name(other)),
            )),
        }
    }

    fn parse_ref(&self, reference: &Value, path: &FieldPath) -> Result<String> {
        let reference = reference
            .as_str()
            .ok_or_else(|| self.invalid(path, "$ref must be a string"))?;
        let name = reference
            .strip_prefix(COMPONENT_REF_PREFIX)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                self.unsupported(path, format!("only component schema refs are supported, got '{}'", reference))
            })?;
        Ok(decode_ref_name(name))
    }

    fn parse_union(&self, value: &Value, key: &str, path: &mut FieldPath) -> Result<SchemaNode> {
        let members = value
            .as_array()
            .ok_or_else(|| self.invalid(path, format!("{} must be an array", key)))?;
        let mut variants = Vec::with_capacity(members.len());
        for (i, member) in members.iter().enumerate() {
            path.push(FieldPathSegment::Variant(i));
            let parsed = self.parse_node(member, path);
            path.pop();
            variants.push(parsed?);
        }
        match variants.len() {
            0 => Err(self.invalid(path, format!("{} must not be empty", key))),
            1 => Ok(variants.remove(0)),
            _ => Ok(SchemaNode::new(SchemaKind::Union(variants))),
        }
    }

    fn parse_intersection(&self, value: &Value, path: &mut FieldPath) -> Result<SchemaNode> {
        let members = value
            .as_array()
            .ok_or_else(|| self.invalid(path, "allOf must be an array"))?;
        let mut parts = Vec::with_capacity(members.len());
        for (i, member) in members.iter().enumerate() {
            path.push(FieldPathSegment::Part(i));
            let parsed = self.parse_node(member, path);
            path.pop();
            parts.push(parsed?);
        }
        let mut parts = flatten_intersection(parts);
        match parts.len() {
            0 => Err(self.invalid(path, "allOf must not be empty")),
            1 => Ok(parts.remove(0)),
            _ => Ok(SchemaNode::new(SchemaKind::Intersection(parts))),
        }
    }

    fn parse_enum(&self, map: &Map<String, Value>, path: &FieldPath) -> Result<SchemaNode> {
        let raw: Vec<&Value> = match (map.get("enum"), map.get("const")) {
            (Some(Value::Array(values)), _) => values.iter().collect(),
            (Some(_), _) => return Err(self.invalid(path, "enum must be an array")),
            (None, Some(value)) => vec![value],
            (None, None) => Vec::new(),
        };

        let mut nullable = false;
        let mut values = Vec::with_capacity(raw.len());
        for value in raw {
            let literal = match value {
                Value::Null => {
                    nullable = true;
                    continue;
                }
                Value::String(s) => Literal::String(s.clone()),
                Value::Number(n) => Literal::Number(n.clone()),
                Value::Bool(b) => Literal::Boolean(*b),
                other => {
                    return Err(self.unsupported(
                        path,
                        format!("{} enum members are not supported", json_type_name(other)),
                    ))
                }
            };
            if !values.contains(&literal) {
                values.push(literal);
            }
        }

        let mut node = if values.is_empty() {
            if !nullable {
                return Err(self.invalid(path, "enum must not be empty"));
            }
            SchemaNode::new(SchemaKind::Null)
        } else {
            SchemaNode::new(SchemaKind::Enum(EnumSchema::new(values)))
        };
        node.nullable = nullable && !matches!(node.kind, SchemaKind::Null);
        Ok(node)
    }

    fn parse_string(&self, map: &Map<String, Value>, path: &FieldPath) -> Result<StringSchema> {
        let mut pattern = map.get("pattern").and_then(Value::as_str).map(str::to_string);
        let format = match map.get("format").and_then(Value::as_str) {
            Some(keyword) => match StringFormat::from_keyword(keyword) {
                Some(format) => {
                    if pattern.take().is_some() {
                        tracing::warn!(
                            schema = self.schema,
                            path = %self.pointer(path),
                            format = keyword,
                            "format takes precedence over pattern; pattern dropped"
                        );
                    }
                    Some(format)
                }
                None => {
                    tracing::debug!(
                        schema = self.schema,
                        path = %self.pointer(path),
                        format = keyword,
                        "unrecognised string format treated as plain string"
                    );
                    None
                }
            },
            None => None,
        };
        Ok(StringSchema {
            format,
            pattern,
            min_length: self.parse_count(map, "minLength", path)?,
            max_length: self.parse_count(map, "maxLength", path)?,
        })
    }

    fn parse_number(&self, map: &Map<String, Value>, integer: bool, path: &FieldPath) -> Result<NumberSchema> {
        Ok(NumberSchema {
            integer,
            minimum: self.parse_bound(map, "minimum", path)?,
            maximum: self.parse_bound(map, "maximum", path)?,
        })
    }

    fn parse_array(&self, map: &Map<String, Value>, path: &mut FieldPath) -> Result<ArraySchema> {
        let items = match map.get("items") {
            None => SchemaNode::new(SchemaKind::Unknown),
            Some(Value::Array(_)) => {
                return Err(self.unsupported(path, "tuple-typed arrays are not supported"));
            }
            Some(items) => {
                path.push(FieldPathSegment::ArrayItems);
                let parsed = self.parse_node(items, path);
                path.pop();
                parsed?
            }
        };
        Ok(ArraySchema {
            items: Box::new(items),
            min_items: self.parse_count(map, "minItems", path)?,
            max_items: self.parse_count(map, "maxItems", path)?,
        })
    }

    fn parse_object(&self, map: &Map<String, Value>, path: &mut FieldPath) -> Result<ObjectSchema> {
        let required: Vec<&str> = match map.get("required") {
            None => Vec::new(),
            Some(Value::Array(names)) => names
                .iter()
                .map(|n| n.as_str().ok_or_else(|| self.invalid(path, "required must list strings")))
                .collect::<Result<_>>()?,
            Some(_) => return Err(self.invalid(path, "required must be an array")),
        };

        let mut properties = IndexMap::new();
        match map.get("properties") {
            None => {}
            Some(Value::Object(props)) => {
                for (name, schema) in props {
                    path.push(FieldPathSegment::Field(name.clone()));
                    let parsed = self.parse_node(schema, path);
                    path.pop();
                    properties.insert(
                        name.clone(),
                        Property {
                            schema: parsed?,
                            required: required.contains(&name.as_str()),
                        },
                    );
                }
            }
            Some(_) => return Err(self.invalid(path, "properties must be an object")),
        }

        for name in &required {
            if !properties.contains_key(*name) {
                tracing::debug!(
                    schema = self.schema,
                    path = %self.pointer(path),
                    property = name,
                    "required property is not declared; ignored"
                );
            }
        }

        let mut sealed = false;
        let additional = match map.get("additionalProperties") {
            None if properties.is_empty() => AdditionalProperties::Any,
            None => AdditionalProperties::None,
            Some(Value::Bool(false)) => {
                sealed = true;
                AdditionalProperties::None
            }
            Some(Value::Bool(true)) => AdditionalProperties::Any,
            Some(Value::Object(extra)) if extra.is_empty() => AdditionalProperties::Any,
            Some(extra) => {
                path.push(FieldPathSegment::MapValue);
                let parsed = self.parse_node(extra, path);
                path.pop();
                let parsed = parsed?;
                if parsed.kind == SchemaKind::Unknown && parsed.is_bare() {
                    AdditionalProperties::Any
                } else {
                    AdditionalProperties::Schema(Box::new(parsed))
                }
            }
        };

        Ok(ObjectSchema {
            properties,
            additional,
            sealed,
        })
    }

    fn parse_examples(&self, map: &Map<String, Value>, path: &FieldPath) -> Result<Option<Examples>> {
        let Some(raw) = map.get(&self.options.examples_key) else {
            return Ok(None);
        };
        let raw = raw
            .as_object()
            .ok_or_else(|| self.invalid(path, format!("{} must be an object", self.options.examples_key)))?;
        let list = |key: &str| -> Result<Vec<Value>> {
            match raw.get(key) {
                None => Ok(Vec::new()),
                Some(Value::Array(values)) => Ok(values.clone()),
                Some(_) => Err(self.invalid(path, format!("{}.{} must be an array", self.options.examples_key, key))),
            }
        };
        Ok(Some(Examples {
            valid: list("valid")?,
            invalid: list("invalid")?,
        }))
    }

    fn parse_count(&self, map: &Map<String, Value>, key: &str, path: &FieldPath) -> Result<Option<u64>> {
        match map.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_u64()
                .map(Some)
                .ok_or_else(|| self.invalid(path, format!("{} must be a non-negative integer", key))),
        }
    }

    fn parse_bound(&self, map: &Map<String, Value>, key: &str, path: &FieldPath) -> Result<Option<f64>> {
        match map.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| self.invalid(path, format!("{} must be a number", key))),
        }
    }

    fn unsupported(&self, path: &FieldPath, reason: impl Into<String>) -> CompileError {
        CompileError::unsupported(self.schema, &self.pointer(path), reason)
    }

    fn invalid(&self, path: &FieldPath, message: impl Into<String>) -> CompileError {
        CompileError::invalid_document(&self.pointer(path), message)
    }
}

/// Splice undecorated nested intersections into their parent
pub fn flatten_intersection(parts: Vec<SchemaNode>) -> Vec<SchemaNode> {
    let mut flat = Vec::with_capacity(parts.len());
    for part in parts {
        match part.kind {
            SchemaKind::Intersection(inner)
                if !part.optional
                    && !part.nullable
                    && part.description.is_none()
                    && part.examples.is_none() =>
            {
                flat.extend(flatten_intersection(inner));
            }
            kind => flat.push(SchemaNode { kind, ..part }),
        }
    }
    flat
}

/// Decode a percent-encoded component name (`User%20Profile` → `User Profile`)
pub fn decode_ref_name(encoded: &str) -> String {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            if let Ok(byte) = u8::from_str_radix(&encoded[i + 1..i + 3], 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Result<SchemaNode> {
        let options = ParseOptions::default();
        NodeParser::new("Test", &options).parse(&value)
    }

    #[test]
    fn test_field_path_display() {
        assert_eq!(FieldPathSegment::Field("name".into()).to_string(), "/properties/name");
        assert_eq!(FieldPathSegment::ArrayItems.to_string(), "/items");
        assert_eq!(FieldPathSegment::MapValue.to_string(), "/additionalProperties");
        assert_eq!(FieldPathSegment::Variant(1).to_string(), "/oneOf/1");
        assert_eq!(FieldPathSegment::Part(0).to_string(), "/allOf/0");
    }

    #[test]
    fn test_format_field_path() {
        let path = vec![
            FieldPathSegment::Field("children".into()),
            FieldPathSegment::ArrayItems,
        ];
        assert_eq!(format_field_path(&path), "#/properties/children/items");
        assert_eq!(format_field_path(&[]), "#");
        assert_eq!(
            format_field_path(&[FieldPathSegment::Field("a/b".into())]),
            "#/properties/a~1b"
        );
    }

    #[test]
    fn test_decode_ref_name() {
        assert_eq!(decode_ref_name("User%20Profile"), "User Profile");
        assert_eq!(decode_ref_name("Plain"), "Plain");
        assert_eq!(decode_ref_name("Trailing%2"), "Trailing%2");
    }

    #[test]
    fn test_parse_object_with_required() {
        let node = parse(json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "format": "uuid" },
                "age": { "type": "integer", "minimum": 0 }
            },
            "required": ["id"]
        }))
        .unwrap();

        let SchemaKind::Object(object) = node.kind else {
            panic!("expected object");
        };
        assert!(object.properties["id"].required);
        assert!(!object.properties["age"].required);
        assert_eq!(object.additional, AdditionalProperties::None);
        assert!(!object.sealed);
        assert_eq!(
            object.properties["age"].schema.kind,
            SchemaKind::Number(NumberSchema { integer: true, minimum: Some(0.0), maximum: None })
        );
    }

    #[test]
    fn test_parse_open_and_sealed_objects() {
        let open = parse(json!({ "type": "object" })).unwrap();
        let SchemaKind::Object(open) = open.kind else { panic!("expected object") };
        assert_eq!(open.additional, AdditionalProperties::Any);

        let sealed = parse(json!({
            "type": "object",
            "properties": { "a": { "type": "string" } },
            "additionalProperties": false
        }))
        .unwrap();
        let SchemaKind::Object(sealed) = sealed.kind else { panic!("expected object") };
        assert!(sealed.sealed);
    }

    #[test]
    fn test_nullable_spellings_agree() {
        let v30 = parse(json!({ "type": "string", "nullable": true })).unwrap();
        let v31 = parse(json!({ "type": ["string", "null"] })).unwrap();
        assert_eq!(v30, v31);
        assert!(v30.nullable);
    }

    #[test]
    fn test_enum_null_member_sets_nullable() {
        let node = parse(json!({ "enum": ["a", null, "b", "a"] })).unwrap();
        assert!(node.nullable);
        let SchemaKind::Enum(e) = node.kind else { panic!("expected enum") };
        assert_eq!(e.values.len(), 2);
        assert_eq!(e.value_kind, LiteralKind::String);
    }

    #[test]
    fn test_format_wins_over_pattern() {
        let node = parse(json!({ "type": "string", "format": "email", "pattern": "^.+@.+$" })).unwrap();
        assert_eq!(
            node.kind,
            SchemaKind::String(StringSchema {
                format: Some(StringFormat::Email),
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_single_member_composition_collapses() {
        let node = parse(json!({
            "allOf": [{ "$ref": "#/components/schemas/User" }],
            "nullable": true,
            "description": "the owner"
        }))
        .unwrap();
        assert_eq!(node.ref_target(), Some("User"));
        assert!(node.nullable);
        assert_eq!(node.description.as_deref(), Some("the owner"));
    }

    #[test]
    fn test_nested_intersections_flatten() {
        let node = parse(json!({
            "allOf": [
                { "allOf": [{ "$ref": "#/components/schemas/A" }, { "$ref": "#/components/schemas/B" }] },
                { "$ref": "#/components/schemas/C" }
            ]
        }))
        .unwrap();
        let SchemaKind::Intersection(parts) = node.kind else { panic!("expected intersection") };
        let targets: Vec<_> = parts.iter().filter_map(SchemaNode::ref_target).collect();
        assert_eq!(targets, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_unsupported_keywords_fail_fast() {
        let err = parse(json!({ "type": "number", "exclusiveMinimum": 0 })).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedSchema { .. }));

        let err = parse(json!({
            "type": "object",
            "properties": { "pair": { "type": "array", "items": [{ "type": "string" }] } }
        }))
        .unwrap_err();
        match err {
            CompileError::UnsupportedSchema { path, .. } => assert_eq!(path, "#/properties/pair"),
            other => panic!("unexpected error {:?}", other),
        }

        let err = parse(json!({ "not": { "type": "string" } })).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedSchema { .. }));
    }

    #[test]
    fn test_external_ref_is_unsupported() {
        let err = parse(json!({ "$ref": "other.json#/Thing" })).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedSchema { .. }));
    }

    #[test]
    fn test_ref_siblings_other_than_nullable_are_ignored() {
        let node = parse(json!({
            "$ref": "#/components/schemas/Address",
            "type": "object",
            "properties": { "extra": { "type": "string" } },
            "nullable": true,
            "description": "home"
        }))
        .unwrap();
        assert_eq!(node.ref_target(), Some("Address"));
        assert!(node.nullable);
        assert_eq!(node.description.as_deref(), Some("home"));
    }

    #[test]
    fn test_recursion_limit() {
        let mut value = json!({ "type": "string" });
        for _ in 0..10 {
            value = json!({ "type": "array", "items": value });
        }
        let options = ParseOptions { max_depth: 4, ..Default::default() };
        let err = NodeParser::new("Deep", &options).parse(&value).unwrap_err();
        assert!(matches!(err, CompileError::RecursionLimitExceeded { limit: 4, .. }));
    }

    #[test]
    fn test_examples_are_captured() {
        let node = parse(json!({
            "type": "string",
            "x-contract-examples": { "valid": ["a"], "invalid": [1] }
        }))
        .unwrap();
        let examples = node.examples.clone().unwrap();
        assert_eq!(examples.valid, vec![json!("a")]);
        assert_eq!(examples.invalid, vec![json!(1)]);
        assert_eq!(node.without_examples().examples, None);
    }

    #[test]
    fn test_to_openapi_sorts_required() {
        let node = parse(json!({
            "type": "object",
            "properties": { "b": { "type": "string" }, "a": { "type": "string" } },
            "required": ["b", "a"]
        }))
        .unwrap();
        assert_eq!(node.to_openapi(false)["required"], json!(["a", "b"]));
    }
}
