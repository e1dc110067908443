//! Route extraction
//!
//! Reads `paths` into [`RouteInfo`] values and derives the request parts
//! (params, query, headers, body) and responses each route declares.
//!
//! Only `application/json` bodies are considered. Parameters, request bodies
//! and responses may be `$ref`s into `#/components/parameters`,
//! `#/components/requestBodies` and `#/components/responses`.

use indexmap::IndexMap;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

use crate::codegen::names::{response_role, route_schema_name};
use crate::error::{CompileError, Result};
use crate::schema::{
    decode_ref_name, escape_pointer, AdditionalProperties, NodeParser, ObjectSchema,
    ParseOptions, Property, SchemaKind, SchemaNode,
};

/// Operations read from a path item, in emission order
pub const HTTP_METHODS: [&str; 8] = ["get", "put", "post", "delete", "options", "head", "patch", "trace"];

/// The only media type whose schemas are compiled
pub const JSON_MEDIA_TYPE: &str = "application/json";

// =============================================================================
// Route model
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl ParameterLocation {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "cookie" => Some(Self::Cookie),
            _ => None,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
        }
    }
}

impl fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteParameter {
    pub name: String,
    pub location: ParameterLocation,
    pub schema: SchemaNode,
    /// Always true for path parameters
    pub required: bool,
}

/// One operation of the document
#[derive(Debug, Clone, PartialEq)]
pub struct RouteInfo {
    /// Literal path template, e.g. `/users/{id}`
    pub path: String,
    /// Upper-case method, e.g. `GET`
    pub method: String,
    pub parameters: Vec<RouteParameter>,
    pub request_body: Option<SchemaNode>,
    /// Status code (or `default`) → JSON response body
    pub responses: IndexMap<String, SchemaNode>,
}

impl RouteInfo {
    pub fn parameters_in(&self, location: ParameterLocation) -> impl Iterator<Item = &RouteParameter> {
        self.parameters.iter().filter(move |p| p.location == location)
    }

    /// Object schema of the path parameters, if any
    pub fn params_schema(&self) -> Option<SchemaNode> {
        self.parameter_object(ParameterLocation::Path)
    }

    pub fn query_schema(&self) -> Option<SchemaNode> {
        self.parameter_object(ParameterLocation::Query)
    }

    pub fn headers_schema(&self) -> Option<SchemaNode> {
        self.parameter_object(ParameterLocation::Header)
    }

    fn parameter_object(&self, location: ParameterLocation) -> Option<SchemaNode> {
        let properties: IndexMap<String, Property> = self
            .parameters_in(location)
            .map(|p| {
                (
                    p.name.clone(),
                    Property {
                        schema: p.schema.clone(),
                        required: p.required,
                    },
                )
            })
            .collect();
        if properties.is_empty() {
            return None;
        }
        Some(SchemaNode::new(SchemaKind::Object(ObjectSchema {
            properties,
            additional: AdditionalProperties::None,
            sealed: false,
        })))
    }

    /// Placeholders of the path template, in order of appearance
    pub fn placeholders(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for capture in placeholder_pattern().captures_iter(&self.path) {
            let name = capture[1].to_string();
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
        seen
    }

    /// Canonical names of the schemas this route declares
    pub fn schema_names(&self) -> RouteSchemaNames {
        let name = |role: &str| route_schema_name(&self.path, &self.method, role);
        let has = |location| self.parameters_in(location).next().is_some();
        RouteSchemaNames {
            params: has(ParameterLocation::Path).then(|| name("Params")),
            query: has(ParameterLocation::Query).then(|| name("Query")),
            headers: has(ParameterLocation::Header).then(|| name("Headers")),
            body: self.request_body.as_ref().map(|_| name("Body")),
            responses: self
                .responses
                .keys()
                .map(|status| (status.clone(), name(&response_role(status))))
                .collect(),
        }
    }

    /// `GET /users/{id}`
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Canonical (pre-dedup) names of a route's schemas
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteSchemaNames {
    pub params: Option<String>,
    pub query: Option<String>,
    pub headers: Option<String>,
    pub body: Option<String>,
    /// Status → response schema name
    pub responses: IndexMap<String, String>,
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([^}/]+)\}").expect("placeholder pattern is valid"))
}

// =============================================================================
// Validation
// =============================================================================

/// Check that the path placeholders and declared path parameters match
pub fn validate_placeholders(route: &RouteInfo) -> Result<()> {
    let placeholders = route.placeholders();
    let declared: Vec<&str> = route
        .parameters_in(ParameterLocation::Path)
        .map(|p| p.name.as_str())
        .collect();

    let undeclared: Vec<String> = placeholders
        .iter()
        .filter(|name| !declared.contains(&name.as_str()))
        .cloned()
        .collect();
    let placeholder_set: HashSet<&str> = placeholders.iter().map(String::as_str).collect();
    let unused: Vec<String> = declared
        .iter()
        .filter(|name| !placeholder_set.contains(*name))
        .map(|name| name.to_string())
        .collect();

    if undeclared.is_empty() && unused.is_empty() {
        return Ok(());
    }
    Err(CompileError::RouteParameterMismatch {
        path: route.path.clone(),
        method: route.method.clone(),
        undeclared,
        unused,
    })
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse every operation under `paths`, in document order.
///
/// Each route passes placeholder validation before it is returned.
pub fn parse_routes(document: &Value, options: &ParseOptions) -> Result<Vec<RouteInfo>> {
    let Some(paths) = document.get("paths") else {
        return Ok(Vec::new());
    };
    let paths = paths
        .as_object()
        .ok_or_else(|| CompileError::invalid_document("#/paths", "expected an object"))?;

    let extractor = RouteExtractor { document, options };
    let mut routes = Vec::new();
    for (path, item) in paths {
        let item_pointer = format!("#/paths/{}", escape_pointer(path));
        let item = item
            .as_object()
            .ok_or_else(|| CompileError::invalid_document(&item_pointer, "expected a path item object"))?;
        if item.contains_key("$ref") {
            return Err(CompileError::invalid_document(
                &item_pointer,
                "path item references are not supported",
            ));
        }

        for method in HTTP_METHODS {
            let Some(operation) = item.get(method) else {
                continue;
            };
            let route = extractor.route(path, method, item, operation, &item_pointer)?;
            validate_placeholders(&route)?;
            tracing::debug!(
                route = %route.label(),
                parameters = route.parameters.len(),
                responses = route.responses.len(),
                "route extracted"
            );
            routes.push(route);
        }
    }
    Ok(routes)
}

struct RouteExtractor<'a> {
    document: &'a Value,
    options: &'a ParseOptions,
}

impl<'a> RouteExtractor<'a> {
    fn route(
        &self,
        path: &str,
        method: &str,
        item: &'a Map<String, Value>,
        operation: &'a Value,
        item_pointer: &str,
    ) -> Result<RouteInfo> {
        let label = format!("{} {}", method.to_ascii_uppercase(), path);
        let op_pointer = format!("{}/{}", item_pointer, method);
        let operation = operation
            .as_object()
            .ok_or_else(|| CompileError::invalid_document(&op_pointer, "expected an operation object"))?;

        let mut parameters: Vec<RouteParameter> = Vec::new();
        let sources = [
            (item.get("parameters"), format!("{}/parameters", item_pointer)),
            (operation.get("parameters"), format!("{}/parameters", op_pointer)),
        ];
        for (list, pointer) in sources {
            let Some(list) = list else {
                continue;
            };
            let list = list
                .as_array()
                .ok_or_else(|| CompileError::invalid_document(&pointer, "expected an array"))?;
            for (i, raw) in list.iter().enumerate() {
                let parameter = self.parameter(&label, raw, &format!("{}/{}", pointer, i))?;
                match parameters
                    .iter_mut()
                    .find(|p| p.name == parameter.name && p.location == parameter.location)
                {
                    Some(existing) => *existing = parameter,
                    None => parameters.push(parameter),
                }
            }
        }

        let request_body = match operation.get("requestBody") {
            Some(raw) => {
                let pointer = format!("{}/requestBody", op_pointer);
                let (body, pointer) = self.resolve(&label, raw, "requestBodies", &pointer)?;
                self.json_body(&label, body, &pointer)?
            }
            None => None,
        };

        let mut responses = IndexMap::new();
        if let Some(raw) = operation.get("responses") {
            let pointer = format!("{}/responses", op_pointer);
            let raw = raw
                .as_object()
                .ok_or_else(|| CompileError::invalid_document(&pointer, "expected an object"))?;
            for (status, response) in raw {
                let pointer = format!("{}/{}", pointer, escape_pointer(status));
                let (response, pointer) = self.resolve(&label, response, "responses", &pointer)?;
                if let Some(schema) = self.json_body(&label, response, &pointer)? {
                    responses.insert(status.clone(), schema);
                }
            }
        }

        Ok(RouteInfo {
            path: path.to_string(),
            method: method.to_ascii_uppercase(),
            parameters,
            request_body,
            responses,
        })
    }

    fn parameter(&self, label: &str, raw: &'a Value, pointer: &str) -> Result<RouteParameter> {
        let (raw, pointer) = self.resolve(label, raw, "parameters", pointer)?;
        let object = raw
            .as_object()
            .ok_or_else(|| CompileError::invalid_document(&pointer, "expected a parameter object"))?;

        let name = object
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| CompileError::invalid_document(&pointer, "parameter without a name"))?;
        let location = object
            .get("in")
            .and_then(Value::as_str)
            .and_then(ParameterLocation::from_keyword)
            .ok_or_else(|| {
                CompileError::invalid_document(&pointer, format!("parameter '{}' has no valid 'in'", name))
            })?;
        let required = location == ParameterLocation::Path
            || object.get("required").and_then(Value::as_bool).unwrap_or(false);

        let schema = if let Some(schema) = object.get("schema") {
            self.parse_schema(label, schema, &format!("{}/schema", pointer))?
        } else if let Some(schema) = object
            .get("content")
            .and_then(|c| c.get(JSON_MEDIA_TYPE))
            .and_then(|m| m.get("schema"))
        {
            let pointer = format!("{}/content/{}/schema", pointer, escape_pointer(JSON_MEDIA_TYPE));
            self.parse_schema(label, schema, &pointer)?
        } else {
            SchemaNode::new(SchemaKind::Unknown)
        };

        Ok(RouteParameter {
            name: name.to_string(),
            location,
            schema,
            required,
        })
    }

    /// The JSON schema of a request body or response, if it has one
    fn json_body(&self, label: &str, raw: &Value, pointer: &str) -> Result<Option<SchemaNode>> {
        let Some(content) = raw.get("content") else {
            return Ok(None);
        };
        let Some(media) = content.get(JSON_MEDIA_TYPE) else {
            tracing::debug!(route = label, location = pointer, "no JSON content, skipped");
            return Ok(None);
        };
        let pointer = format!("{}/content/{}/schema", pointer, escape_pointer(JSON_MEDIA_TYPE));
        match media.get("schema") {
            Some(schema) => self.parse_schema(label, schema, &pointer).map(Some),
            None => Ok(Some(SchemaNode::new(SchemaKind::Unknown))),
        }
    }

    fn parse_schema(&self, label: &str, schema: &Value, pointer: &str) -> Result<SchemaNode> {
        NodeParser::new(label, self.options).with_base(pointer).parse(schema)
    }

    /// Follow a `$ref` into `#/components/<section>/`, returning the target
    /// and its document location
    fn resolve(
        &self,
        label: &str,
        raw: &'a Value,
        section: &str,
        pointer: &str,
    ) -> Result<(&'a Value, String)> {
        let Some(reference) = raw.get("$ref").and_then(Value::as_str) else {
            return Ok((raw, pointer.to_string()));
        };
        let prefix = format!("#/components/{}/", section);
        let encoded = reference.strip_prefix(&prefix).ok_or_else(|| {
            CompileError::unsupported(label, pointer, format!("reference '{}' outside {}", reference, prefix))
        })?;
        let name = decode_ref_name(encoded);
        let target = self
            .document
            .get("components")
            .and_then(|c| c.get(section))
            .and_then(|s| s.get(&name))
            .ok_or_else(|| CompileError::Resolution {
                missing: name.clone(),
                schema: label.to_string(),
                path: pointer.to_string(),
            })?;
        Ok((target, format!("{}{}", prefix, escape_pointer(&name))))
    }
}
