//! Schema Dependency Graph
//!
//! petgraph graph of component `$ref` dependencies. An edge `A → B` exists
//! whenever A's tree references B, through properties, array items, union
//! variants, intersection parts or schema-valued additionalProperties.
//!
//! The graph is built once per compilation and gives:
//! - dependency order (dependencies before dependents, document order stable)
//! - cycle groups via [`analysis::compute_scc_analysis`]
//! - GraphViz export for debugging

pub mod analysis;

pub use analysis::{compute_scc_analysis, CycleEdge, CycleHandling, SccAnalysis, SccGroup};

use indexmap::IndexMap;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;

use crate::error::{CompileError, Result};
use crate::schema::{
    component_ref, format_field_path, AdditionalProperties, FieldPath, FieldPathSegment,
    SchemaKind, SchemaNode,
};

/// Component name
pub type SchemaId = String;

/// Edge weight: where in the source schema the reference sits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefEdge {
    pub field_path: FieldPath,
}

/// The component dependency graph
#[derive(Debug, Clone)]
pub struct SchemaGraph {
    pub(crate) graph: DiGraph<SchemaId, RefEdge>,
    pub(crate) node_indices: HashMap<SchemaId, NodeIndex>,
}

impl SchemaGraph {
    /// Build the graph for a component map.
    ///
    /// Nodes are added in map order and edges in discovery order, which is
    /// what keeps [`SchemaGraph::dependency_order`] stable. A reference to a
    /// name missing from the map fails with `Resolution`.
    pub fn build(components: &IndexMap<String, SchemaNode>, max_depth: usize) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut node_indices = HashMap::new();
        for name in components.keys() {
            let idx = graph.add_node(name.clone());
            node_indices.insert(name.clone(), idx);
        }

        for (name, schema) in components {
            let from = node_indices[name];
            for (target, field_path) in collect_refs(name, schema, max_depth)? {
                let Some(&to) = node_indices.get(&target) else {
                    return Err(CompileError::Resolution {
                        missing: target,
                        schema: name.clone(),
                        path: format!("{}{}", component_ref(name), &format_field_path(&field_path)[1..]),
                    });
                };
                graph.add_edge(from, to, RefEdge { field_path });
            }
        }

        tracing::debug!(
            schemas = graph.node_count(),
            edges = graph.edge_count(),
            "built dependency graph"
        );

        Ok(Self { graph, node_indices })
    }

    pub fn schema_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Depth-first post-order: every schema after the schemas it depends on,
    /// except along cycles, where the first visited member comes last.
    ///
    /// Iterative so that deep reference chains cannot overflow the stack.
    pub fn dependency_order(&self) -> Vec<SchemaId> {
        let mut visited = vec![false; self.graph.node_count()];
        let mut order = Vec::with_capacity(self.graph.node_count());

        for root in self.graph.node_indices() {
            if visited[root.index()] {
                continue;
            }
            visited[root.index()] = true;
            let mut stack: Vec<(NodeIndex, Vec<NodeIndex>, usize)> =
                vec![(root, self.successors(root), 0)];

            while let Some((node, successors, next)) = stack.last_mut() {
                if let Some(&succ) = successors.get(*next) {
                    *next += 1;
                    if !visited[succ.index()] {
                        visited[succ.index()] = true;
                        let succs = self.successors(succ);
                        stack.push((succ, succs, 0));
                    }
                } else {
                    order.push(self.graph[*node].clone());
                    stack.pop();
                }
            }
        }
        order
    }

    fn successors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.ordered_edges(idx, Direction::Outgoing)
            .into_iter()
            .filter_map(|e| self.graph.edge_endpoints(e).map(|(_, target)| target))
            .collect()
    }

    /// Edges of a node sorted by insertion (petgraph walks them newest first)
    fn ordered_edges(&self, idx: NodeIndex, direction: Direction) -> Vec<EdgeIndex> {
        let mut edges: Vec<EdgeIndex> = self
            .graph
            .edges_directed(idx, direction)
            .map(|e| e.id())
            .collect();
        edges.sort();
        edges
    }

    /// Export the dependency graph to GraphViz DOT format.
    ///
    /// Members of cycle groups are filled orange; edges closing a cycle are
    /// dashed and labelled with their field path.
    pub fn to_dot(&self, analysis: &SccAnalysis) -> String {
        let mut output = String::new();
        output.push_str("digraph SchemaGraph {\n");
        output.push_str("  rankdir=LR;\n");
        output.push_str("  node [shape=box, style=\"filled,rounded\", fontname=\"Helvetica\", fontsize=10];\n");
        output.push_str("  edge [fontname=\"Helvetica\", fontsize=8, fontcolor=\"#808080\"];\n");
        output.push('\n');

        for idx in self.graph.node_indices() {
            let id = &self.graph[idx];
            let color = if analysis.is_cyclic(id) { "#FF9800" } else { "#CFD8DC" };
            output.push_str(&format!(
                "  \"{}\" [label=\"{}\", fillcolor=\"{}\"];\n",
                dot_escape(id),
                dot_escape(id),
                color
            ));
        }

        output.push('\n');

        for edge in self.graph.edge_references() {
            let source = &self.graph[edge.source()];
            let target = &self.graph[edge.target()];
            let label = format_field_path(&edge.weight().field_path);
            let style = if analysis.same_group(source, target) {
                ", style=dashed"
            } else {
                ""
            };
            output.push_str(&format!(
                "  \"{}\" -> \"{}\" [label=\"{}\"{}];\n",
                dot_escape(source),
                dot_escape(target),
                dot_escape(&label),
                style
            ));
        }

        output.push_str("}\n");
        output
    }
}

fn dot_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Every component reference in a schema tree, with the path it sits at,
/// in document order.
pub fn collect_refs(schema: &str, node: &SchemaNode, max_depth: usize) -> Result<Vec<(SchemaId, FieldPath)>> {
    let mut refs = Vec::new();
    let mut path = FieldPath::new();
    walk_refs(schema, node, &mut path, max_depth, &mut refs)?;
    Ok(refs)
}

fn walk_refs(
    schema: &str,
    node: &SchemaNode,
    path: &mut FieldPath,
    max_depth: usize,
    refs: &mut Vec<(SchemaId, FieldPath)>,
) -> Result<()> {
    if path.len() > max_depth {
        return Err(CompileError::RecursionLimitExceeded {
            schema: schema.to_string(),
            path: format!("{}{}", component_ref(schema), &format_field_path(path)[1..]),
            limit: max_depth,
        });
    }

    if let SchemaKind::Ref(target) = &node.kind {
        refs.push((target.clone(), path.clone()));
        return Ok(());
    }

    let mut descend = |segment: FieldPathSegment, child: &SchemaNode, path: &mut FieldPath| {
        path.push(segment);
        let result = walk_refs(schema, child, path, max_depth, refs);
        path.pop();
        result
    };

    match &node.kind {
        SchemaKind::Array(array) => descend(FieldPathSegment::ArrayItems, &array.items, path)?,
        SchemaKind::Object(object) => {
            for (name, property) in &object.properties {
                descend(FieldPathSegment::Field(name.clone()), &property.schema, path)?;
            }
            if let AdditionalProperties::Schema(value) = &object.additional {
                descend(FieldPathSegment::MapValue, value, path)?;
            }
        }
        SchemaKind::Union(variants) => {
            for (i, variant) in variants.iter().enumerate() {
                descend(FieldPathSegment::Variant(i), variant, path)?;
            }
        }
        SchemaKind::Intersection(parts) => {
            for (i, part) in parts.iter().enumerate() {
                descend(FieldPathSegment::Part(i), part, path)?;
            }
        }
        SchemaKind::Ref(_)
        | SchemaKind::Unknown
        | SchemaKind::String(_)
        | SchemaKind::Number(_)
        | SchemaKind::Boolean
        | SchemaKind::Null
        | SchemaKind::Enum(_) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{NodeParser, ParseOptions, DEFAULT_MAX_DEPTH};
    use serde_json::{json, Value};

    fn components(value: Value) -> IndexMap<String, SchemaNode> {
        let options = ParseOptions::default();
        value
            .as_object()
            .unwrap()
            .iter()
            .map(|(name, schema)| {
                let node = NodeParser::new(name, &options).parse(schema).unwrap();
                (name.clone(), node)
            })
            .collect()
    }

    fn object_ref(prop: &str, target: &str) -> Value {
        json!({
            "type": "object",
            "properties": { prop: { "$ref": format!("#/components/schemas/{}", target) } }
        })
    }

    #[test]
    fn test_dependencies_come_first() {
        let map = components(json!({
            "Order": {
                "type": "object",
                "properties": {
                    "customer": { "$ref": "#/components/schemas/Customer" },
                    "lines": { "type": "array", "items": { "$ref": "#/components/schemas/Line" } }
                }
            },
            "Line": object_ref("product", "Product"),
            "Customer": { "type": "object", "properties": { "name": { "type": "string" } } },
            "Product": { "type": "string" }
        }));
        let graph = SchemaGraph::build(&map, DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(
            graph.dependency_order(),
            vec!["Customer", "Product", "Line", "Order"]
        );
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.schema_count(), 4);
    }

    #[test]
    fn test_independent_schemas_keep_document_order() {
        let map = components(json!({
            "Zeta": { "type": "string" },
            "Alpha": { "type": "integer" },
            "Mid": { "type": "boolean" }
        }));
        let graph = SchemaGraph::build(&map, DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(graph.dependency_order(), vec!["Zeta", "Alpha", "Mid"]);
    }

    #[test]
    fn test_dangling_ref_is_resolution_error() {
        let map = components(json!({
            "User": object_ref("address", "Address")
        }));
        let err = SchemaGraph::build(&map, DEFAULT_MAX_DEPTH).unwrap_err();
        assert_eq!(
            err,
            CompileError::Resolution {
                missing: "Address".into(),
                schema: "User".into(),
                path: "#/components/schemas/User/properties/address".into(),
            }
        );
    }

    #[test]
    fn test_cycle_is_ordered_and_terminates() {
        let map = components(json!({
            "A": object_ref("b", "B"),
            "B": object_ref("a", "A"),
            "C": object_ref("a", "A")
        }));
        let graph = SchemaGraph::build(&map, DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(graph.dependency_order(), vec!["B", "A", "C"]);
    }

    #[test]
    fn test_refs_found_in_all_positions() {
        let map = components(json!({
            "T": { "type": "string" },
            "All": {
                "type": "object",
                "properties": {
                    "u": { "oneOf": [{ "$ref": "#/components/schemas/T" }, { "type": "null" }] },
                    "m": { "type": "object", "additionalProperties": { "$ref": "#/components/schemas/T" } },
                    "i": { "allOf": [{ "$ref": "#/components/schemas/T" }, { "type": "object" }] }
                }
            }
        }));
        let refs = collect_refs("All", &map["All"], DEFAULT_MAX_DEPTH).unwrap();
        let paths: Vec<String> = refs.iter().map(|(_, p)| format_field_path(p)).collect();
        assert_eq!(
            paths,
            vec![
                "#/properties/u/oneOf/0",
                "#/properties/m/additionalProperties",
                "#/properties/i/allOf/0",
            ]
        );
    }

    #[test]
    fn test_to_dot_marks_cycles() {
        let map = components(json!({
            "Node": {
                "type": "object",
                "properties": {
                    "children": { "type": "array", "items": { "$ref": "#/components/schemas/Node" } }
                }
            }
        }));
        let graph = SchemaGraph::build(&map, DEFAULT_MAX_DEPTH).unwrap();
        let analysis = compute_scc_analysis(&graph);
        let dot = graph.to_dot(&analysis);
        assert!(dot.starts_with("digraph SchemaGraph {"));
        assert!(dot.contains("\"Node\" -> \"Node\" [label=\"#/properties/children/items\", style=dashed];"));
    }
}
