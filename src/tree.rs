// src/tree.rs
//
// Per-peer fork-tolerant block storage: an arena keyed by block id, with
// child links held as ids so shared `Arc<Block>` contents never form
// reference cycles. The tip is explicit; inserting never moves it, adoption
// is the owner's decision.
//

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::block::{Block, BlockId};
use crate::config::TieBreak;
use crate::sched::SimTime;
use crate::transaction::TxId;

/// One slot in a peer's local tree.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub block: Arc<Block>,
    /// Local virtual time at which this block first entered the tree.
    pub arrival: SimTime,
    /// Children in arrival order.
    pub children: Vec<BlockId>,
}

#[derive(Debug)]
pub struct BlockTree {
    nodes: HashMap<BlockId, TreeNode>,
    root: BlockId,
    tip: BlockId,
    tie_break: TieBreak,
}

impl BlockTree {
    pub fn new(genesis: Arc<Block>, tie_break: TieBreak) -> Self {
        let root = genesis.id;
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            TreeNode {
                block: genesis,
                arrival: SimTime::ZERO,
                children: Vec::new(),
            },
        );
        Self {
            nodes,
            root,
            tip: root,
            tie_break,
        }
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &BlockId) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root_id(&self) -> BlockId {
        self.root
    }

    pub fn tip_id(&self) -> BlockId {
        self.tip
    }

    pub fn tip(&self) -> &Arc<Block> {
        &self.nodes[&self.tip].block
    }

    /// Link `block` under its parent. Returns false (and changes nothing)
    /// for duplicates or an unknown parent. The tip is never touched.
    pub fn insert(&mut self, block: Arc<Block>, arrival: SimTime) -> bool {
        let id = block.id;
        if self.nodes.contains_key(&id) {
            return false;
        }
        let parent = match block.parent {
            Some(parent) => parent,
            None => return false,
        };
        match self.nodes.get_mut(&parent) {
            Some(node) => node.children.push(id),
            None => return false,
        }
        self.nodes.insert(
            id,
            TreeNode {
                block,
                arrival,
                children: Vec::new(),
            },
        );
        true
    }

    /// Would `block` beat the current tip under the longest-chain rule?
    /// Strictly greater height always wins; equal height falls to the
    /// configured timestamp tie-break.
    pub fn improves_tip(&self, block: &Block) -> bool {
        let tip = self.tip();
        if block.height != tip.height {
            return block.height > tip.height;
        }
        match self.tie_break {
            TieBreak::LaterTimestamp => block.timestamp > tip.timestamp,
            TieBreak::EarlierTimestamp => block.timestamp < tip.timestamp,
        }
    }

    /// Move the tip to a block already in the tree.
    pub fn set_tip(&mut self, id: BlockId) {
        debug_assert!(self.nodes.contains_key(&id));
        self.tip = id;
    }

    /// Ids on the main chain, tip first, ending at the root.
    pub fn main_chain(&self) -> Vec<BlockId> {
        let mut chain = Vec::new();
        let mut cursor = Some(self.tip);
        while let Some(id) = cursor {
            chain.push(id);
            cursor = self.nodes[&id].block.parent;
        }
        chain
    }

    /// Every transaction id on the chain from `from` back to the root.
    pub fn chain_tx_ids(&self, from: &BlockId) -> HashSet<TxId> {
        let mut seen = HashSet::new();
        let mut cursor = self.nodes.get(from);
        while let Some(node) = cursor {
            for tx in &node.block.transactions {
                seen.insert(tx.id);
            }
            cursor = node.block.parent.and_then(|p| self.nodes.get(&p));
        }
        seen
    }

    /// Preorder walk from the root, children in arrival order. Deterministic
    /// for a given insertion history; drives the artifact dumps.
    pub fn dfs_order(&self) -> Vec<BlockId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            // reversed so the first child is visited first
            for child in self.nodes[&id].children.iter().rev() {
                stack.push(*child);
            }
        }
        order
    }
}
