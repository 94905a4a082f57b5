//! Adaptive choice coder: a self-adjusting binary code tree.
//!
//! The tree starts as a balanced pairwise merge of one leaf per choice.
//! Every coded choice "ticks" its leaf; a node whose frequency exceeds its
//! uncle's swaps places with the uncle, moving frequent choices towards the
//! root. Encoder and decoder tick identically, so no table is transmitted.
//!
//! Nodes live in an arena; parent and child links are indices.

use std::collections::VecDeque;
use std::io::Read;

use crate::bitstream::{BitReader, BitWriter};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy)]
enum NodeKind {
    Leaf(u32),
    Inner { first: usize, second: usize },
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<usize>,
    /// True if the node is its parent's first child (bit 1).
    first_p: bool,
    frequency: u64,
    kind: NodeKind,
}

/// Frequency-sensitive coder for choice points with more than two choices.
#[derive(Debug, Clone)]
pub struct AdaptiveChoiceCoder {
    limit: u32,
    id: usize,
    nodes: Vec<Node>,
    /// Leaf node index per choice.
    leaves: Vec<usize>,
    root: usize,
}

impl AdaptiveChoiceCoder {
    /// Builds the initial tree. `limit` must be greater than 2.
    pub fn new(limit: u32, id: usize) -> Self {
        debug_assert!(limit > 2, "adaptive coder needs limit > 2, got {limit}");
        let mut nodes = Vec::with_capacity(2 * limit as usize);
        let mut queue = VecDeque::with_capacity(limit as usize);
        for choice in 0..limit {
            nodes.push(Node { parent: None, first_p: false, frequency: 0, kind: NodeKind::Leaf(choice) });
            queue.push_back(choice as usize);
        }
        let leaves: Vec<usize> = (0..limit as usize).collect();

        // Paarweise zusammenfassen, bis nur die Wurzel übrig ist.
        while queue.len() > 1 {
            let (Some(n1), Some(n2)) = (queue.pop_front(), queue.pop_front()) else {
                break;
            };
            let idx = nodes.len();
            nodes.push(Node {
                parent: None,
                first_p: false,
                frequency: 0,
                kind: NodeKind::Inner { first: n1, second: n2 },
            });
            nodes[n1].parent = Some(idx);
            nodes[n1].first_p = true;
            nodes[n2].parent = Some(idx);
            nodes[n2].first_p = false;
            queue.push_back(idx);
        }
        let root = queue.pop_front().unwrap_or(0);
        Self { limit, id, nodes, leaves, root }
    }

    /// Number of choices.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Debug identifier (the choice point's state id).
    pub fn id(&self) -> usize {
        self.id
    }

    /// Writes the path from the root to the choice's leaf, then adapts.
    pub fn encode(&mut self, choice: u32, out: &mut BitWriter) -> Result<()> {
        if choice >= self.limit {
            return Err(Error::InvalidChoice { choice: u64::from(choice), limit: self.limit });
        }
        let leaf = self.leaves[choice as usize];
        let mut path = Vec::new();
        let mut n = leaf;
        while let Some(p) = self.nodes[n].parent {
            path.push(self.nodes[n].first_p);
            n = p;
        }
        for &bit in path.iter().rev() {
            out.write_bit(bit);
        }
        self.tick(leaf);
        Ok(())
    }

    /// Walks from the root, one bit per level, then adapts like the encoder.
    pub fn decode<R: Read>(&mut self, input: &mut BitReader<R>) -> Result<u32> {
        let mut n = self.root;
        let choice = loop {
            match self.nodes[n].kind {
                NodeKind::Leaf(choice) => break choice,
                NodeKind::Inner { first, second } => {
                    n = if input.read_bit()? { first } else { second };
                }
            }
        };
        self.tick(n);
        Ok(choice)
    }

    /// Code length in bits the choice would currently take.
    pub fn code_length(&self, choice: u32) -> usize {
        let mut n = self.leaves[choice as usize];
        let mut len = 0;
        while let Some(p) = self.nodes[n].parent {
            len += 1;
            n = p;
        }
        len
    }

    fn child(&self, node: usize, first: bool) -> usize {
        match self.nodes[node].kind {
            NodeKind::Inner { first: f, second: s } => {
                if first { f } else { s }
            }
            NodeKind::Leaf(_) => node,
        }
    }

    fn set_child(&mut self, node: usize, first: bool, child: usize) {
        if let NodeKind::Inner { first: f, second: s } = &mut self.nodes[node].kind {
            if first { *f = child } else { *s = child }
        }
    }

    fn update(&mut self, node: usize) {
        if let NodeKind::Inner { first, second } = self.nodes[node].kind {
            self.nodes[node].frequency = self.nodes[first].frequency + self.nodes[second].frequency;
        }
    }

    fn tick(&mut self, start: usize) {
        let mut n = start;
        loop {
            self.nodes[n].frequency += 1;
            let Some(parent) = self.nodes[n].parent else {
                return;
            };
            let Some(gp) = self.nodes[parent].parent else {
                self.nodes[parent].frequency += 1;
                return;
            };
            let uncle = self.child(gp, !self.nodes[parent].first_p);
            if self.nodes[n].frequency > self.nodes[uncle].frequency {
                // Knoten und Onkel tauschen die Plätze.
                let node_first_p = self.nodes[n].first_p;
                let uncle_first_p = self.nodes[uncle].first_p;
                self.nodes[uncle].parent = Some(parent);
                self.set_child(parent, node_first_p, uncle);
                self.nodes[uncle].first_p = node_first_p;
                self.nodes[n].parent = Some(gp);
                self.set_child(gp, uncle_first_p, n);
                self.nodes[n].first_p = uncle_first_p;
                self.update(parent);
                n = gp;
            } else {
                n = parent;
            }
        }
    }
}
