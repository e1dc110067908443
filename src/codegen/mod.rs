//! Code Generation
//!
//! Emits the contracts module for a document: one structural type and one
//! validator per schema, plus the `Request`/`Response` route tables.
//!
//! Pipeline:
//! - parse the document into the node model
//! - order components so dependencies come first (cycles bind lazily)
//! - fingerprint every schema; a structure seen before becomes an alias of
//!   the first name that declared it
//! - hoist response bodies shared by several routes, then declare the
//!   per-route schemas and build the tables from canonical names
//!
//! Output is byte-identical for identical input and options.

pub mod config;
pub mod convert;
pub mod names;
pub mod selftest;
pub mod validator;

pub use config::CompileOptions;
pub use selftest::render_self_tests;
pub use validator::Validator;

use indexmap::IndexMap;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use self::convert::{ConvertContext, Converter};
use self::names::{schema_const, NameResolver};
use self::validator::js_string;
use crate::document::Document;
use crate::error::Result;
use crate::fingerprint::{compute_fingerprint, Fingerprint};
use crate::graph::{compute_scc_analysis, SccAnalysis, SchemaGraph};
use crate::registry::{find_common_schemas, DedupRegistry, PreRegistry};
use crate::routes::{ParameterLocation, RouteInfo, RouteSchemaNames, JSON_MEDIA_TYPE};
use crate::schema::{component_ref, escape_pointer, SchemaNode};

const HEADER: [&str; 2] = [
    "// This file was automatically generated from an API description.",
    "// Do not manually edit this file.",
];

const ZOD_IMPORT: &str = "import { z } from \"zod\";";

/// Response bodies shared by at least this many routes are hoisted
const MIN_COMMON_OCCURRENCES: usize = 2;

// =============================================================================
// Output model
// =============================================================================

/// Where a declaration is emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Component,
    /// Response bodies hoisted because several routes share them
    Common,
    Route,
}

/// One emitted name, canonical or alias
#[derive(Debug, Clone, PartialEq)]
pub struct NamedDeclaration {
    /// Source name: component name or canonical route schema name
    pub name: String,
    /// Emitted type name; the validator is `{identifier}Schema`
    pub identifier: String,
    pub schema: SchemaNode,
    pub fingerprint: Fingerprint,
    pub is_canonical: bool,
    /// Identifier of the canonical declaration this one aliases
    pub alias_of: Option<String>,
    /// Emission order, increasing across all sections
    pub index: usize,
    pub section: Section,
    /// Present for canonical declarations only
    pub validator: Option<Validator>,
}

/// Request parts of one operation, as validator constant names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestEntry {
    pub params: Option<String>,
    pub query: Option<String>,
    pub headers: Option<String>,
    pub body: Option<String>,
}

impl RequestEntry {
    pub fn is_empty(&self) -> bool {
        self.parts().is_empty()
    }

    /// Present parts in table order
    pub fn parts(&self) -> Vec<(&'static str, &str)> {
        [
            ("params", &self.params),
            ("query", &self.query),
            ("headers", &self.headers),
            ("body", &self.body),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_deref().map(|v| (key, v)))
        .collect()
    }
}

/// path → METHOD → request parts
pub type RequestTable = IndexMap<String, IndexMap<String, RequestEntry>>;

/// path → METHOD → status → validator constant name
pub type ResponseTable = IndexMap<String, IndexMap<String, IndexMap<String, String>>>;

/// Result of one compilation
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOutput {
    /// The generated module
    pub code: String,
    pub declarations: Vec<NamedDeclaration>,
    pub request_table: RequestTable,
    pub response_table: ResponseTable,
    /// Parsed components, in document order
    pub components: IndexMap<String, SchemaNode>,
    /// Caller validators the output uses, in registration order
    pub pre_registered_used: Vec<String>,
}

impl CompileOutput {
    /// Declaration emitted for a component or route schema name
    pub fn declaration(&self, name: &str) -> Option<&NamedDeclaration> {
        self.declarations.iter().find(|d| d.name == name)
    }

    pub fn canonical_declarations(&self) -> impl Iterator<Item = &NamedDeclaration> {
        self.declarations.iter().filter(|d| d.is_canonical)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &NamedDeclaration> {
        self.declarations.iter().filter(|d| !d.is_canonical)
    }
}

// =============================================================================
// Compiler
// =============================================================================

/// Holds immutable options; documents compile independently.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn compile(&self, document: &Value) -> Result<CompileOutput> {
        compile(document, &self.options)
    }
}

/// Compile a document into its contracts module
pub fn compile(document: &Value, options: &CompileOptions) -> Result<CompileOutput> {
    let parse_options = options.parse_options();
    let doc = Document::parse(document, &parse_options, options.include_routes)?;

    let graph = SchemaGraph::build(&doc.components, options.max_depth)?;
    let analysis = compute_scc_analysis(&graph);
    let order = graph.dependency_order();

    let mut emitter = Emitter::new(&doc.components, &analysis, &options.pre_registry, options.max_depth);
    for name in &order {
        emitter.component(name)?;
    }
    if !doc.routes.is_empty() {
        emitter.routes(&doc.routes)?;
    }

    let route_count = doc.routes.len();
    let emitted = emitter.finish(&options.import_lines);

    tracing::info!(
        components = doc.components.len(),
        declarations = emitted.declarations.iter().filter(|d| d.is_canonical).count(),
        aliases = emitted.declarations.iter().filter(|d| !d.is_canonical).count(),
        routes = route_count,
        cycle_groups = analysis.groups.len(),
        pre_registered = emitted.pre_registered_used.len(),
        "compilation finished"
    );

    Ok(CompileOutput {
        code: emitted.code,
        declarations: emitted.declarations,
        request_table: emitted.request_table,
        response_table: emitted.response_table,
        components: doc.components,
        pre_registered_used: emitted.pre_registered_used,
    })
}

// =============================================================================
// Emitter
// =============================================================================

/// Mutable state of one compilation
struct Emitter<'a> {
    components: &'a IndexMap<String, SchemaNode>,
    analysis: &'a SccAnalysis,
    pre_registry: &'a PreRegistry,
    max_depth: usize,

    resolver: NameResolver,
    /// Component name → identifier
    identifiers: IndexMap<String, String>,
    /// (route or common schema name, fingerprint) → identifier
    route_identifiers: HashMap<(String, Fingerprint), String>,
    declared: HashSet<String>,
    dedup: DedupRegistry,

    declarations: Vec<NamedDeclaration>,
    component_lines: Vec<String>,
    common_lines: Vec<String>,
    route_lines: Vec<String>,
    pre_registered_used: HashSet<String>,
    has_routes: bool,
    request_table: RequestTable,
    response_table: ResponseTable,
}

struct Emitted {
    code: String,
    declarations: Vec<NamedDeclaration>,
    request_table: RequestTable,
    response_table: ResponseTable,
    pre_registered_used: Vec<String>,
}

impl<'a> Emitter<'a> {
    fn new(
        components: &'a IndexMap<String, SchemaNode>,
        analysis: &'a SccAnalysis,
        pre_registry: &'a PreRegistry,
        max_depth: usize,
    ) -> Self {
        let mut resolver = NameResolver::new();
        for validator in pre_registry.iter() {
            resolver.reserve(&validator.identifier);
            resolver.reserve(&validator.output_alias());
            resolver.reserve(&validator.input_alias());
        }
        let identifiers = components
            .keys()
            .map(|name| (name.clone(), resolver.resolve(name)))
            .collect();

        Self {
            components,
            analysis,
            pre_registry,
            max_depth,
            resolver,
            identifiers,
            route_identifiers: HashMap::new(),
            declared: HashSet::new(),
            dedup: DedupRegistry::new(),
            declarations: Vec::new(),
            component_lines: Vec::new(),
            common_lines: Vec::new(),
            route_lines: Vec::new(),
            pre_registered_used: HashSet::new(),
            has_routes: false,
            request_table: RequestTable::new(),
            response_table: ResponseTable::new(),
        }
    }

    fn convert(&self, node: &SchemaNode, schema: &str, base: &str) -> Result<Validator> {
        let ctx = ConvertContext {
            components: self.components,
            analysis: self.analysis,
            identifiers: &self.identifiers,
            declared: &self.declared,
            pre_registry: self.pre_registry,
            max_depth: self.max_depth,
        };
        Converter::new(&ctx, schema, base).convert(node)
    }

    // -------------------------------------------------------------------------
    // Components
    // -------------------------------------------------------------------------

    fn component(&mut self, name: &str) -> Result<()> {
        let components = self.components;
        let (Some(node), Some(identifier)) = (components.get(name), self.identifiers.get(name).cloned())
        else {
            return Ok(());
        };

        let outcome = self.dedup.register(&identifier, node);
        if outcome.is_new {
            let validator = self.convert(node, name, &component_ref(name))?;
            let cyclic = self.analysis.is_cyclic(name);
            self.declare(Section::Component, name, &identifier, node, outcome.fingerprint, validator, cyclic);
        } else {
            self.alias(
                Section::Component,
                name,
                &identifier,
                &outcome.canonical_name,
                node,
                outcome.fingerprint,
            );
        }
        self.declared.insert(name.to_string());
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Routes
    // -------------------------------------------------------------------------

    fn routes(&mut self, routes: &[RouteInfo]) -> Result<()> {
        self.has_routes = true;
        let names: Vec<RouteSchemaNames> = routes.iter().map(RouteInfo::schema_names).collect();

        // name → (route label, document location)
        let mut locations: HashMap<&str, (String, String)> = HashMap::new();
        let mut responses: Vec<(&str, &SchemaNode)> = Vec::new();
        for (route, route_names) in routes.iter().zip(&names) {
            for (status, schema) in &route.responses {
                let Some(name) = route_names.responses.get(status) else {
                    continue;
                };
                locations.insert(name.as_str(), (route.label(), response_pointer(route, status)));
                responses.push((name.as_str(), schema));
            }
        }

        for group in find_common_schemas(responses, MIN_COMMON_OCCURRENCES) {
            if self.dedup.contains(&group.fingerprint) {
                continue;
            }
            let (identifier, _) = self.route_identifier(&group.name, &group.fingerprint);
            self.dedup.register_fingerprint(&identifier, group.fingerprint.clone());

            let (label, pointer) = group
                .members
                .first()
                .and_then(|member| locations.get(member.as_str()))
                .cloned()
                .unwrap_or_else(|| (group.name.clone(), "#".to_string()));
            let validator = self.convert(&group.schema, &label, &pointer)?;
            tracing::debug!(name = %group.name, members = group.count(), "common schema hoisted");
            self.declare(
                Section::Common,
                &group.name,
                &identifier,
                &group.schema,
                group.fingerprint.clone(),
                validator,
                false,
            );
        }

        for (route, route_names) in routes.iter().zip(&names) {
            self.route(route, route_names)?;
        }
        Ok(())
    }

    fn route(&mut self, route: &RouteInfo, names: &RouteSchemaNames) -> Result<()> {
        let label = route.label();
        let operation = operation_pointer(route);

        let mut entry = RequestEntry::default();
        if let (Some(name), Some(schema)) = (&names.params, route.params_schema()) {
            let pointer = format!("{}/parameters", operation);
            entry.params = Some(self.route_schema(name, &schema, &label, &pointer)?);
        }
        if let (Some(name), Some(schema)) = (&names.query, route.query_schema()) {
            let pointer = format!("{}/parameters", operation);
            entry.query = Some(self.route_schema(name, &schema, &label, &pointer)?);
        }
        if let (Some(name), Some(schema)) = (&names.headers, route.headers_schema()) {
            let pointer = format!("{}/parameters", operation);
            entry.headers = Some(self.route_schema(name, &schema, &label, &pointer)?);
        }
        if let (Some(name), Some(schema)) = (&names.body, &route.request_body) {
            let pointer = format!(
                "{}/requestBody/content/{}/schema",
                operation,
                escape_pointer(JSON_MEDIA_TYPE)
            );
            entry.body = Some(self.route_schema(name, schema, &label, &pointer)?);
        }
        for cookie in route.parameters_in(ParameterLocation::Cookie) {
            tracing::debug!(route = %label, parameter = %cookie.name, "cookie parameter skipped");
        }

        let mut statuses = IndexMap::new();
        for (status, schema) in &route.responses {
            let Some(name) = names.responses.get(status) else {
                continue;
            };
            let pointer = response_pointer(route, status);
            let constant = self.route_schema(name, schema, &label, &pointer)?;
            statuses.insert(status.clone(), constant);
        }

        if !entry.is_empty() {
            self.request_table
                .entry(route.path.clone())
                .or_default()
                .insert(route.method.clone(), entry);
        }
        if !statuses.is_empty() {
            self.response_table
                .entry(route.path.clone())
                .or_default()
                .insert(route.method.clone(), statuses);
        }
        Ok(())
    }

    /// Declare or alias one route schema; returns the canonical validator
    /// constant the tables point at.
    fn route_schema(&mut self, name: &str, schema: &SchemaNode, label: &str, pointer: &str) -> Result<String> {
        let fingerprint = compute_fingerprint(schema);
        let (identifier, claimed) = self.route_identifier(name, &fingerprint);
        let outcome = self.dedup.register_fingerprint(&identifier, fingerprint.clone());
        // An identifier seen before already has its declaration or alias.
        if claimed {
            if outcome.is_new {
                let validator = self.convert(schema, label, pointer)?;
                self.declare(Section::Route, name, &identifier, schema, fingerprint, validator, false);
            } else {
                self.alias(Section::Route, name, &identifier, &outcome.canonical_name, schema, fingerprint);
            }
        }
        Ok(schema_const(&outcome.canonical_name))
    }

    /// Identifier for a route or common schema name. Distinct paths can
    /// share a canonical name (`/a-b`, `/a_b`), and distinct error bodies can
    /// share a code, so a name reused with another structure claims a fresh
    /// identifier. The flag is true when the identifier was claimed now.
    fn route_identifier(&mut self, name: &str, fingerprint: &Fingerprint) -> (String, bool) {
        let key = (name.to_string(), fingerprint.clone());
        if let Some(identifier) = self.route_identifiers.get(&key) {
            return (identifier.clone(), false);
        }
        let identifier = self.resolver.claim(name);
        self.route_identifiers.insert(key, identifier.clone());
        (identifier, true)
    }

    // -------------------------------------------------------------------------
    // Declarations
    // -------------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn declare(
        &mut self,
        section: Section,
        name: &str,
        identifier: &str,
        schema: &SchemaNode,
        fingerprint: Fingerprint,
        validator: Validator,
        cyclic: bool,
    ) {
        for used in validator.pre_registered_identifiers() {
            self.pre_registered_used.insert(used.to_string());
        }

        let constant = schema_const(identifier);
        let mut block = Vec::new();
        if let Some(description) = &schema.description {
            block.push(doc_comment(description));
        }
        block.push(format!("export type {} = {};", identifier, validator.render_type()));
        if cyclic {
            block.push(format!(
                "export const {}: z.ZodType<{}> = {};",
                constant,
                identifier,
                validator.render_expr()
            ));
        } else {
            block.push(format!("export const {} = {};", constant, validator.render_expr()));
        }
        self.push_block(section, block);

        tracing::debug!(
            name,
            identifier,
            fingerprint = %fingerprint.short(),
            lazy = validator.lazy_count(),
            "declaration emitted"
        );
        self.declarations.push(NamedDeclaration {
            name: name.to_string(),
            identifier: identifier.to_string(),
            schema: schema.clone(),
            fingerprint,
            is_canonical: true,
            alias_of: None,
            index: self.declarations.len(),
            section,
            validator: Some(validator),
        });
    }

    fn alias(
        &mut self,
        section: Section,
        name: &str,
        identifier: &str,
        canonical: &str,
        schema: &SchemaNode,
        fingerprint: Fingerprint,
    ) {
        self.push_block(
            section,
            vec![
                format!("export type {} = {};", identifier, canonical),
                format!("export const {} = {};", schema_const(identifier), schema_const(canonical)),
            ],
        );
        tracing::debug!(name, identifier, canonical, "alias emitted");
        self.declarations.push(NamedDeclaration {
            name: name.to_string(),
            identifier: identifier.to_string(),
            schema: schema.clone(),
            fingerprint,
            is_canonical: false,
            alias_of: Some(canonical.to_string()),
            index: self.declarations.len(),
            section,
            validator: None,
        });
    }

    fn push_block(&mut self, section: Section, block: Vec<String>) {
        let lines = match section {
            Section::Component => &mut self.component_lines,
            Section::Common => &mut self.common_lines,
            Section::Route => &mut self.route_lines,
        };
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.extend(block);
    }

    // -------------------------------------------------------------------------
    // Assembly
    // -------------------------------------------------------------------------

    fn finish(self, import_lines: &[String]) -> Emitted {
        let mut out: Vec<String> = HEADER.iter().map(|line| line.to_string()).collect();
        out.push(String::new());
        out.push(ZOD_IMPORT.to_string());
        out.extend(import_lines.iter().cloned());
        out.push(String::new());

        if !self.component_lines.is_empty() {
            out.extend(self.component_lines);
            out.push(String::new());
        }

        let used: Vec<String> = self
            .pre_registry
            .iter()
            .filter(|v| self.pre_registered_used.contains(&v.identifier))
            .map(|v| v.identifier.clone())
            .collect();
        if !used.is_empty() {
            out.push("// Pre-registered validator types".to_string());
            for validator in self.pre_registry.iter().filter(|v| used.contains(&v.identifier)) {
                let output = match &validator.output_type {
                    Some(output) => output.clone(),
                    None => format!("z.output<typeof {}>", validator.identifier),
                };
                out.push(format!("export type {} = {};", validator.output_alias(), output));
                out.push(format!(
                    "export type {} = z.input<typeof {}>;",
                    validator.input_alias(),
                    validator.identifier
                ));
            }
            out.push(String::new());
        }

        if self.has_routes {
            if !self.common_lines.is_empty() {
                out.push("// Common schemas".to_string());
                out.extend(self.common_lines);
                out.push(String::new());
            }
            if !self.route_lines.is_empty() {
                out.push("// Route schemas".to_string());
                out.extend(self.route_lines);
                out.push(String::new());
            }
            out.extend(render_request_table(&self.request_table));
            out.push(String::new());
            out.extend(render_response_table(&self.response_table));
            out.push(String::new());
        }

        Emitted {
            code: out.join("\n"),
            declarations: self.declarations,
            request_table: self.request_table,
            response_table: self.response_table,
            pre_registered_used: used,
        }
    }
}

fn operation_pointer(route: &RouteInfo) -> String {
    format!(
        "#/paths/{}/{}",
        escape_pointer(&route.path),
        route.method.to_ascii_lowercase()
    )
}

fn response_pointer(route: &RouteInfo, status: &str) -> String {
    format!(
        "{}/responses/{}/content/{}/schema",
        operation_pointer(route),
        escape_pointer(status),
        escape_pointer(JSON_MEDIA_TYPE)
    )
}

fn doc_comment(text: &str) -> String {
    let text = text.replace("*/", "*\\/");
    let lines: Vec<&str> = text.lines().collect();
    match lines.as_slice() {
        [single] => format!("/** {} */", single),
        _ => {
            let mut out = String::from("/**");
            for line in lines {
                out.push_str("\n *");
                if !line.is_empty() {
                    out.push(' ');
                    out.push_str(line);
                }
            }
            out.push_str("\n */");
            out
        }
    }
}

fn render_request_table(table: &RequestTable) -> Vec<String> {
    if table.is_empty() {
        return vec!["export const Request = {} as const;".to_string()];
    }
    let mut lines = vec!["export const Request = {".to_string()];
    for (path, methods) in table {
        lines.push(format!("  {}: {{", js_string(path)));
        for (method, entry) in methods {
            lines.push(format!("    {}: {{", method));
            for (key, constant) in entry.parts() {
                lines.push(format!("      {}: {},", key, constant));
            }
            lines.push("    },".to_string());
        }
        lines.push("  },".to_string());
    }
    lines.push("} as const;".to_string());
    lines
}

fn render_response_table(table: &ResponseTable) -> Vec<String> {
    if table.is_empty() {
        return vec!["export const Response = {} as const;".to_string()];
    }
    let mut lines = vec!["export const Response = {".to_string()];
    for (path, methods) in table {
        lines.push(format!("  {}: {{", js_string(path)));
        for (method, statuses) in methods {
            lines.push(format!("    {}: {{", method));
            for (status, constant) in statuses {
                lines.push(format!("      {}: {},", js_string(status), constant));
            }
            lines.push("    },".to_string());
        }
        lines.push("  },".to_string());
    }
    lines.push("} as const;".to_string());
    lines
}
