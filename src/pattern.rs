// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The immutable compiled `Pattern` (§3.1) and the compiler-to-matcher
//! contract types (§6.1). Built once by `builder::build`, never mutated
//! afterwards except for the monotonic per-node caches described in §9.

use std::collections::HashMap;

use crate::encoding::Property;
use crate::literals::BoyerMoore;
use crate::node::{NodeArena, NodeId};
use crate::opcode::{Flags, RepeatStatus};
use crate::stringset::StringSet;

/// Per-group metadata the compiler hands over and the builder fills in
/// (§3.1 `group_info[]`).
#[derive(Clone, Debug, Default)]
pub struct GroupInfo {
    pub end_index: i64,
    pub defining_node: Option<NodeId>,
    pub referenced: bool,
    pub named: bool,
}

/// Per-call-ref metadata (§3.1 `call_ref_info[]`).
#[derive(Clone, Debug, Default)]
pub struct CallRefInfo {
    pub defining_node: Option<NodeId>,
    pub defined: bool,
    pub used: bool,
}

/// Per-repeat metadata: just the status bitset the "Add repeat guards"
/// post-pass computes (§3.1 `repeat_info[]`, §4.3).
#[derive(Clone, Copy, Debug, Default)]
pub struct RepeatInfo {
    pub status: RepeatStatus,
}

/// Which `Encoding` implementation a pattern was compiled against (§4.1,
/// §6.1 flags `UNICODE`/`LOCALE`/`ASCII`). The actual `Encoding` value
/// (with any injected property table) is supplied by the host at match
/// time rather than stored on `Pattern`, since `Locale`/`Unicode` borrow a
/// table the `Pattern` doesn't own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncodingKind {
    Ascii,
    Locale,
    Unicode,
}

/// The immutable compiled pattern (§3.1 `Pattern`).
pub struct Pattern {
    pub arena: NodeArena,
    pub start_node: NodeId,
    /// A precomputed lookahead node for fast false-rejects (§3.1
    /// `start_test`); `None` when the builder couldn't derive one cheaply.
    pub start_test: Option<NodeId>,
    pub true_group_count: usize,
    pub public_group_count: usize,
    pub group_end_index_max: i64,
    pub group_info: Vec<GroupInfo>,
    pub call_ref_info: HashMap<u32, CallRefInfo>,
    pub repeat_info: Vec<RepeatInfo>,
    pub repeat_count: usize,
    pub fuzzy_count: usize,
    /// Budget for each fuzzy section, indexed by section id (§4.10); looked
    /// up by the driver from a leaf node's `fuzzy_section` field.
    pub fuzzy_specs: Vec<crate::fuzzy::FuzzySpec>,
    pub min_width: usize,
    pub is_fuzzy: bool,
    pub do_search_start: bool,
    pub req_string_node: Option<NodeId>,
    pub req_offset: i64,
    pub encoding: EncodingKind,
    pub flags: Flags,
    pub named_lists: HashMap<String, StringSet>,
    pub named_list_indexes: Vec<String>,
    pub pattern_call_ref: Option<u32>,
    pub group_index: HashMap<String, u32>,
    pub index_group: HashMap<u32, String>,
}

impl Pattern {
    /// Resolve the `NodeId` a `GROUP_CALL` targeting `call_ref` should
    /// jump to.
    pub fn call_target(&self, call_ref: u32) -> Option<NodeId> {
        self.call_ref_info.get(&call_ref).and_then(|info| info.defining_node)
    }

    pub fn group_by_name(&self, name: &str) -> Option<u32> {
        self.group_index.get(name).copied()
    }

    pub fn name_by_group(&self, index: u32) -> Option<&str> {
        self.index_group.get(&index).map(|s| s.as_str())
    }

    /// Lazily build (once, guarded by `NodeStatus::FAST_INIT`) the
    /// Boyer-Moore tables for a literal node, per §4.7/§9.
    pub fn ensure_fast_tables(&self, node: NodeId, reverse: bool, case_insensitive: bool) -> Option<BoyerMoore> {
        use crate::node::Payload;
        match &self.arena.get(node).payload {
            Payload::Literal(chars, _) if chars.len() >= crate::literals::RE_MIN_FAST_LENGTH => {
                Some(BoyerMoore::build(chars.clone(), reverse, case_insensitive))
            }
            _ => None,
        }
    }
}

/// Host-supplied options governing one top-level `match`/`search` call
/// (§6.1's configuration surface, supplemented per `SPEC_FULL.md` §B).
#[derive(Clone, Copy, Debug)]
pub struct MatchOptions {
    pub pos: usize,
    pub endpos: Option<usize>,
    pub partial: bool,
    pub anchored: bool,
    pub concurrent: crate::state::Concurrent,
}

impl Default for MatchOptions {
    fn default() -> Self {
        MatchOptions { pos: 0, endpos: None, partial: false, anchored: false, concurrent: crate::state::Concurrent::Default }
    }
}

/// Options bounding a single build/match run (§SPEC_FULL.md §B
/// "Configuration"): size limits, carried forward from the teacher's own
/// `size_limit` parameter to `Program::new`, and the backtrack-budget cap
/// from §5.
#[derive(Clone, Copy, Debug)]
pub struct BuildOptions {
    pub max_nodes: usize,
    pub max_backtrack_entries: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            max_nodes: 1 << 20,
            max_backtrack_entries: crate::backtrack::RE_MAX_BACKTRACK_ALLOC,
        }
    }
}
