//! Orphaned Discovery Results
//!
//! A discovery result is orphaned once its node no longer matches the
//! parent's node selector. Selector matching follows core node affinity
//! rules: terms are ORed, requirements within a term are ANDed.

use crate::crd::{
    LocalVolumeDiscovery, NodeSelector, NodeSelectorOperator, NodeSelectorRequirement,
    NodeSelectorTerm,
};
use crate::domain::ports::{DiscoveryClusterView, NodeInfo};
use crate::error::Result;
use kube::ResourceExt;
use std::collections::HashSet;
use tracing::{debug, info};

/// Field key supported in `matchFields`
const FIELD_NODE_NAME: &str = "metadata.name";

// =============================================================================
// Selector Matching
// =============================================================================

/// Whether a node matches the selector. A selector without terms matches
/// nothing.
pub fn node_matches(selector: &NodeSelector, node: &NodeInfo) -> bool {
    selector
        .node_selector_terms
        .iter()
        .any(|term| term_matches(term, node))
}

fn term_matches(term: &NodeSelectorTerm, node: &NodeInfo) -> bool {
    // an empty term matches no objects
    if term.match_expressions.is_empty() && term.match_fields.is_empty() {
        return false;
    }

    let labels_ok = term
        .match_expressions
        .iter()
        .all(|req| requirement_matches(req, node.labels.get(&req.key).map(String::as_str)));

    let fields_ok = term.match_fields.iter().all(|req| {
        let value = (req.key == FIELD_NODE_NAME).then_some(node.name.as_str());
        requirement_matches(req, value)
    });

    labels_ok && fields_ok
}

fn requirement_matches(req: &NodeSelectorRequirement, value: Option<&str>) -> bool {
    match req.operator {
        NodeSelectorOperator::In => value.map_or(false, |v| req.values.iter().any(|x| x == v)),
        NodeSelectorOperator::NotIn => value.map_or(true, |v| !req.values.iter().any(|x| x == v)),
        NodeSelectorOperator::Exists => value.is_some(),
        NodeSelectorOperator::DoesNotExist => value.is_none(),
        NodeSelectorOperator::Gt | NodeSelectorOperator::Lt => {
            let (Some(value), [bound]) = (value, req.values.as_slice()) else {
                return false;
            };
            match (value.parse::<i64>(), bound.parse::<i64>()) {
                (Ok(v), Ok(b)) if req.operator == NodeSelectorOperator::Gt => v > b,
                (Ok(v), Ok(b)) => v < b,
                _ => false,
            }
        }
    }
}

// =============================================================================
// Orphan Cleanup
// =============================================================================

/// Delete results whose node no longer matches the discovery's node
/// selector. Without a selector every node is eligible and nothing is
/// deleted. Returns the deleted result names.
pub async fn delete_orphan_results(
    cluster: &dyn DiscoveryClusterView,
    discovery: &LocalVolumeDiscovery,
) -> Result<Vec<String>> {
    let Some(selector) = discovery.spec.node_selector.as_ref() else {
        debug!("no node selector, skipping orphan cleanup");
        return Ok(Vec::new());
    };
    let namespace = discovery.namespace().unwrap_or_default();

    let matching: HashSet<String> = cluster
        .list_nodes()
        .await?
        .into_iter()
        .filter(|node| node_matches(selector, node))
        .map(|node| node.name)
        .collect();

    let mut deleted = Vec::new();
    for result in cluster.list_results(&namespace).await? {
        if matching.contains(&result.spec.node_name) {
            continue;
        }
        let name = result.name_any();
        info!(
            "deleting orphan discovery result {} for node {}",
            name, result.spec.node_name
        );
        cluster.delete_result(&namespace, &name).await?;
        deleted.push(name);
    }

    Ok(deleted)
}
