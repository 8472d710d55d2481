use std::collections::HashSet;
use std::sync::Arc;

use ballotguard_ledger_client::LedgerNode;
use ballotguard_types::NodeId;

use crate::FailoverError;

/// Enabled ledger nodes in ascending priority rank. The first is the
/// primary. Disabled nodes are dropped here and never probed.
#[derive(Clone)]
pub struct NodeRoster {
    nodes: Vec<Arc<dyn LedgerNode>>,
}

impl NodeRoster {
    pub fn new(nodes: Vec<Arc<dyn LedgerNode>>) -> Result<Self, FailoverError> {
        let mut seen = HashSet::new();
        for node in &nodes {
            if !seen.insert(node.id().clone()) {
                return Err(FailoverError::DuplicateNode(node.id().clone()));
            }
        }

        let mut nodes: Vec<_> = nodes
            .into_iter()
            .filter(|n| n.descriptor().enabled)
            .collect();
        if nodes.is_empty() {
            return Err(FailoverError::EmptyRoster);
        }
        // stable: equal ranks keep configuration order
        nodes.sort_by_key(|n| n.descriptor().priority);
        Ok(Self { nodes })
    }

    pub fn primary(&self) -> &Arc<dyn LedgerNode> {
        &self.nodes[0]
    }

    pub fn nodes(&self) -> &[Arc<dyn LedgerNode>] {
        &self.nodes
    }

    pub fn get(&self, id: &NodeId) -> Option<&Arc<dyn LedgerNode>> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    pub fn position(&self, id: &NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| n.id() == id)
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.id().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
