//! Schema Graph Analysis
//!
//! Computes strongly connected components (SCCs) of the dependency graph and
//! the per-schema cycle metadata the converter needs to decide where a
//! reference has to be bound lazily.

use petgraph::algo::tarjan_scc;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

use super::{SchemaGraph, SchemaId};
use crate::schema::FieldPath;

// =============================================================================
// Cycle Edge
// =============================================================================

/// A reference between two members of the same cycle group
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CycleEdge {
    /// The schema containing the reference
    pub from_schema: SchemaId,
    /// Path from schema root to the reference
    pub field_path: FieldPath,
    /// The referenced schema
    pub to_schema: SchemaId,
    /// The SCC both ends belong to
    pub scc_id: usize,
}

// =============================================================================
// SCC Group
// =============================================================================

/// A strongly connected component (cycle group) in the schema graph
#[derive(Debug, Clone)]
pub struct SccGroup {
    pub id: usize,
    /// Members in document order
    pub members: Vec<SchemaId>,
    /// References between members of this group
    pub edges: Vec<CycleEdge>,
    /// Whether this is a single schema referencing itself
    pub is_self_referential: bool,
}

// =============================================================================
// Cycle Handling
// =============================================================================

/// Cycle metadata for a single schema
#[derive(Debug, Clone, Default)]
pub struct CycleHandling {
    /// Which SCC this schema belongs to (None = acyclic)
    pub scc_id: Option<usize>,
    pub is_self_referential: bool,
}

impl CycleHandling {
    pub fn is_cyclic(&self) -> bool {
        self.scc_id.is_some()
    }
}

// =============================================================================
// Analysis Result
// =============================================================================

/// Complete SCC analysis result for the graph
#[derive(Debug, Clone, Default)]
pub struct SccAnalysis {
    /// Cycle groups only: more than one member, or a self-reference
    pub groups: Vec<SccGroup>,
    pub cycle_handling: HashMap<SchemaId, CycleHandling>,
}

impl SccAnalysis {
    pub fn get(&self, schema_id: &str) -> Option<&CycleHandling> {
        self.cycle_handling.get(schema_id)
    }

    /// Check if a schema is in a cycle
    pub fn is_cyclic(&self, schema_id: &str) -> bool {
        self.cycle_handling
            .get(schema_id)
            .map(|h| h.is_cyclic())
            .unwrap_or(false)
    }

    /// True when both schemas are members of the same cycle group
    pub fn same_group(&self, a: &str, b: &str) -> bool {
        match (self.get(a).and_then(|h| h.scc_id), self.get(b).and_then(|h| h.scc_id)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }
}

// =============================================================================
// Analysis Functions
// =============================================================================

/// Compute SCC analysis for a schema graph
pub fn compute_scc_analysis(graph: &SchemaGraph) -> SccAnalysis {
    let mut components = tarjan_scc(&graph.graph);
    // tarjan yields reverse topological order; group ids follow the
    // document position of each group's first member instead.
    for component in &mut components {
        component.sort();
    }
    components.sort_by_key(|c| c.first().copied());

    let mut analysis = SccAnalysis::default();

    for component in components {
        let is_self_referential = component.len() == 1
            && graph
                .graph
                .edges_directed(component[0], Direction::Outgoing)
                .any(|e| e.target() == component[0]);

        if component.len() == 1 && !is_self_referential {
            let id = graph.graph[component[0]].clone();
            analysis.cycle_handling.insert(id, CycleHandling::default());
            continue;
        }

        let scc_id = analysis.groups.len();
        let members: Vec<SchemaId> = component.iter().map(|idx| graph.graph[*idx].clone()).collect();
        let member_set: HashSet<_> = component.iter().copied().collect();

        let mut edges: Vec<_> = graph
            .graph
            .edge_references()
            .filter(|e| member_set.contains(&e.source()) && member_set.contains(&e.target()))
            .map(|e| {
                (
                    e.id(),
                    CycleEdge {
                        from_schema: graph.graph[e.source()].clone(),
                        field_path: e.weight().field_path.clone(),
                        to_schema: graph.graph[e.target()].clone(),
                        scc_id,
                    },
                )
            })
            .collect();
        edges.sort_by_key(|(id, _)| *id);

        for member in &members {
            analysis.cycle_handling.insert(
                member.clone(),
                CycleHandling {
                    scc_id: Some(scc_id),
                    is_self_referential,
                },
            );
        }

        tracing::debug!(scc_id, members = ?members, "cycle group detected");

        analysis.groups.push(SccGroup {
            id: scc_id,
            members,
            edges: edges.into_iter().map(|(_, edge)| edge).collect(),
            is_self_referential,
        });
    }

    analysis
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{format_field_path, NodeParser, ParseOptions, SchemaNode, DEFAULT_MAX_DEPTH};
    use indexmap::IndexMap;
    use serde_json::{json, Value};

    fn graph(value: Value) -> SchemaGraph {
        let options = ParseOptions::default();
        let map: IndexMap<String, SchemaNode> = value
            .as_object()
            .unwrap()
            .iter()
            .map(|(name, schema)| (name.clone(), NodeParser::new(name, &options).parse(schema).unwrap()))
            .collect();
        SchemaGraph::build(&map, DEFAULT_MAX_DEPTH).unwrap()
    }

    fn reference(target: &str) -> Value {
        json!({ "$ref": format!("#/components/schemas/{}", target) })
    }

    #[test]
    fn test_self_reference_is_cyclic() {
        let g = graph(json!({
            "Tree": {
                "type": "object",
                "properties": { "children": { "type": "array", "items": reference("Tree") } }
            },
            "Leaf": { "type": "string" }
        }));
        let analysis = compute_scc_analysis(&g);

        assert!(analysis.is_cyclic("Tree"));
        assert!(!analysis.is_cyclic("Leaf"));
        let scc_id = analysis.get("Tree").and_then(|h| h.scc_id).unwrap();
        let group = &analysis.groups[scc_id];
        assert!(group.is_self_referential);
        assert_eq!(group.edges.len(), 1);
        assert_eq!(format_field_path(&group.edges[0].field_path), "#/properties/children/items");
    }

    #[test]
    fn test_mutual_recursion_shares_group() {
        let g = graph(json!({
            "Person": { "type": "object", "properties": { "employer": reference("Company") } },
            "Company": { "type": "object", "properties": { "ceo": reference("Person") } },
            "Report": { "type": "object", "properties": { "about": reference("Company") } }
        }));
        let analysis = compute_scc_analysis(&g);

        assert_eq!(analysis.groups.len(), 1);
        assert_eq!(analysis.groups[0].members, vec!["Person", "Company"]);
        assert!(!analysis.groups[0].is_self_referential);
        assert!(analysis.same_group("Person", "Company"));
        assert!(!analysis.same_group("Person", "Report"));
        assert!(!analysis.is_cyclic("Report"));
    }

    #[test]
    fn test_acyclic_graph_has_no_groups() {
        let g = graph(json!({
            "A": { "type": "object", "properties": { "b": reference("B") } },
            "B": { "type": "integer" }
        }));
        let analysis = compute_scc_analysis(&g);
        assert!(analysis.groups.is_empty());
        assert!(analysis.get("A").is_some_and(|h| !h.is_cyclic()));
    }
}
