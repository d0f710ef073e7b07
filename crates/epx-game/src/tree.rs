//! Branching tree for the outer-approximation algorithm.
//!
//! Nodes live in an append-only arena and are addressed by index, so handles
//! stay valid while the tree grows. Each node carries a ±1/0 encoding over
//! the complementarities and a mask of branchings still allowed at that
//! node.

use crate::Encoding;
use epx_core::{EpxError, EpxResult};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Node {
    pub id: usize,
    pub parent: Option<usize>,
    /// Complementarities fixed by the branching that created this node.
    pub branched_on: Vec<usize>,
    /// ±1 at branched positions along the path, 0 elsewhere.
    pub encoding: Encoding,
    /// Positions still legal to branch on at this node.
    pub allowed: Vec<bool>,
}

impl Node {
    /// Number of positions already decided along the path to the root.
    pub fn cumulative_branches(&self) -> usize {
        self.encoding.iter().filter(|&&v| v != 0).count()
    }

    /// Mask of positions fixed on the path to the root.
    pub fn branched_mask(&self) -> Vec<bool> {
        self.encoding.iter().map(|&v| v != 0).collect()
    }
}

/// Rooted branching tree in an arena.
pub struct OuterTree {
    nodes: Vec<Node>,
    encoding_size: usize,
}

impl OuterTree {
    /// A tree whose root carries the all-zero encoding with every branching
    /// permitted.
    pub fn new(encoding_size: usize) -> Self {
        let root = Node {
            id: 0,
            parent: None,
            branched_on: Vec::new(),
            encoding: vec![0; encoding_size],
            allowed: vec![true; encoding_size],
        };
        OuterTree {
            nodes: vec![root],
            encoding_size,
        }
    }

    pub fn root(&self) -> usize {
        0
    }

    pub fn encoding_size(&self) -> usize {
        self.encoding_size
    }

    pub fn node(&self, id: usize) -> &Node {
        &self.nodes[id]
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    fn push_child(&mut self, parent: usize, fixes: &[(usize, i8)]) -> usize {
        let id = self.nodes.len();
        let mut encoding = self.nodes[parent].encoding.clone();
        let mut allowed = self.nodes[parent].allowed.clone();
        let mut branched_on = Vec::with_capacity(fixes.len());
        for &(pos, sign) in fixes {
            encoding[pos] = sign;
            allowed[pos] = false;
            branched_on.push(pos);
        }
        self.nodes.push(Node {
            id,
            parent: Some(parent),
            branched_on,
            encoding,
            allowed,
        });
        id
    }

    /// Creates the two children fixing `comp` to -1 and +1 respectively,
    /// clearing `comp` from both children's allowed mask. Returns
    /// `(minus_child, plus_child)`.
    pub fn single_branch(&mut self, comp: usize, node: usize) -> EpxResult<(usize, usize)> {
        if comp >= self.encoding_size {
            return Err(EpxError::InvalidShape(format!(
                "branching position {comp} outside the encoding of size {}",
                self.encoding_size
            )));
        }
        if self.nodes[node].encoding[comp] != 0 {
            warn!(comp, node, "position already branched on this path");
            return Err(EpxError::Unprepared(format!(
                "complementarity {comp} is already fixed at node {node}"
            )));
        }
        let minus = self.push_child(node, &[(comp, -1)]);
        let plus = self.push_child(node, &[(comp, 1)]);
        Ok((minus, plus))
    }

    /// Creates one child fixing every listed position at once (one tree
    /// level, several decisions), each to +1.
    pub fn multiple_branch(&mut self, comps: &[usize], node: usize) -> EpxResult<usize> {
        for &comp in comps {
            if comp >= self.encoding_size {
                return Err(EpxError::InvalidShape(format!(
                    "branching position {comp} outside the encoding of size {}",
                    self.encoding_size
                )));
            }
            if self.nodes[node].encoding[comp] != 0 {
                return Err(EpxError::Unprepared(format!(
                    "complementarity {comp} is already fixed at node {node}"
                )));
            }
        }
        let fixes: Vec<(usize, i8)> = comps.iter().map(|&c| (c, 1)).collect();
        Ok(self.push_child(node, &fixes))
    }

    /// Forbids branching on `position` at `node` without creating a child —
    /// used when the would-be child is infeasible.
    pub fn deny_branching(&mut self, node: usize, position: usize) -> EpxResult<()> {
        if position >= self.encoding_size {
            return Err(EpxError::InvalidShape(format!(
                "denied position {position} outside the encoding"
            )));
        }
        if !self.nodes[node].allowed[position] {
            warn!(node, position, "position was already denied");
        }
        self.nodes[node].allowed[position] = false;
        Ok(())
    }

    /// Forbids several positions at once.
    pub fn deny_branchings(&mut self, node: usize, positions: &[usize]) -> EpxResult<()> {
        for &p in positions {
            self.deny_branching(node, p)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_all_zero_and_all_allowed() {
        let tree = OuterTree::new(4);
        let root = tree.node(tree.root());
        assert_eq!(root.encoding, vec![0, 0, 0, 0]);
        assert!(root.allowed.iter().all(|&a| a));
        assert_eq!(root.cumulative_branches(), 0);
    }

    #[test]
    fn single_branch_creates_sign_pair() {
        let mut tree = OuterTree::new(3);
        let (minus, plus) = tree.single_branch(1, tree.root()).unwrap();
        assert_eq!(tree.node(minus).encoding, vec![0, -1, 0]);
        assert_eq!(tree.node(plus).encoding, vec![0, 1, 0]);
        assert!(!tree.node(minus).allowed[1]);
        assert!(!tree.node(plus).allowed[1]);
        assert_eq!(tree.node(plus).parent, Some(0));
        // a child differs from its parent exactly at the branched position
        assert_eq!(tree.node(plus).branched_on, vec![1]);
        // re-branching the same position on the child is rejected
        assert!(tree.single_branch(1, plus).is_err());
    }

    #[test]
    fn multiple_branch_fixes_all_positions_in_one_level() {
        let mut tree = OuterTree::new(4);
        let child = tree.multiple_branch(&[0, 2], tree.root()).unwrap();
        let node = tree.node(child);
        assert_eq!(node.cumulative_branches(), 2);
        assert!(!node.allowed[0] && !node.allowed[2]);
        assert!(node.allowed[1] && node.allowed[3]);
        assert_eq!(node.branched_mask(), vec![true, false, true, false]);
    }

    #[test]
    fn deny_marks_without_children() {
        let mut tree = OuterTree::new(2);
        let before = tree.n_nodes();
        tree.deny_branching(tree.root(), 0).unwrap();
        assert_eq!(tree.n_nodes(), before);
        assert!(!tree.node(tree.root()).allowed[0]);
    }

    #[test]
    fn arena_keeps_earlier_handles_valid() {
        let mut tree = OuterTree::new(2);
        let (minus, _) = tree.single_branch(0, tree.root()).unwrap();
        let snapshot = tree.node(minus).encoding.clone();
        let _ = tree.single_branch(1, minus).unwrap();
        assert_eq!(tree.node(minus).encoding, snapshot);
    }
}
