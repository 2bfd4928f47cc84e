// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The backtrack stack (component G, §3.1): a tagged union over the
//! ~30 choice-point kinds the driver can push, stored in block-allocated
//! `Vec`s the way §9's redesign flag directs ("growable vector of blocks
//! indexed by a cursor; keep the free-list semantics").
//!
//! A hard cap (`RE_MAX_BACKTRACK_ALLOC`) bounds the stack across all
//! blocks; exceeding it surfaces as `Error::Backtracking` rather than an
//! unbounded allocation (§5).

use crate::capture::{GroupData, Span};
use crate::fuzzy::{FuzzyCounts, FuzzyType};
use crate::groupcall::GroupCallFrame;
use crate::node::NodeId;
use crate::repeat::RepeatData;

/// Entries per block (§3.1 `BacktrackBlock`).
const BLOCK_SIZE: usize = 64;

/// Total entries allowed across every block before `Error::Backtracking`
/// (§5 `RE_MAX_BACKTRACK_ALLOC`).
pub const RE_MAX_BACKTRACK_ALLOC: usize = 1_048_576;

/// One choice point. The tag is the opcode family it pairs with; each
/// variant carries exactly what's needed to rewind that choice (§3.1
/// `BacktrackData`, §9 "tagged-union backtrack frames").
#[derive(Clone, Debug)]
pub enum BacktrackData {
    /// `BRANCH`: try the alternate successor at the saved position.
    Branch { alt: NodeId, pos: usize },
    /// Entering a group: restore the prior span/history index on
    /// backtrack.
    Group { index: usize, prior_span: Span, prior_capture: Option<usize> },
    /// `START_GROUP`: restore the pending-start marker (the group's open
    /// paren position isn't committed to `GroupData::span` until the
    /// matching `END_GROUP`, so it needs its own rewind record).
    GroupStart { index: usize, prior: Option<usize> },
    /// General repeat (§4.5): the fallback that stops iterating and jumps
    /// to the tail, either because greedy just finished an iteration and
    /// wants to try more first (pushed from `EndGreedyRepeat`, the
    /// alternative being "give up and take the tail at this count"), or
    /// because greedy's own entry point needs a zero-iteration fallback
    /// when `min == 0`. `node` is either the `GreedyRepeat`/`LazyRepeat`
    /// start node or its `End*` counterpart — both are wired with the same
    /// `next_2` (the tail), so either works as the jump target. `count`/
    /// `capture_change` are the repeat's counters at the moment this
    /// fallback was recorded, reapplied to `RepeatData` (with `start: pos`)
    /// before jumping, since nothing else rewinds them in between.
    MatchTail { node: NodeId, pos: usize, count: u32, capture_change: u64 },
    /// The mirror image for lazy repeats: the fallback that enters the body
    /// for one more iteration, either because lazy just tried the tail and
    /// it failed (pushed from `EndLazyRepeat`), or because lazy's entry
    /// point needs a first-iteration fallback when the tail (tried first,
    /// per laziness) doesn't pan out. Same `node`/`count`/`capture_change`
    /// shape and reasoning as `MatchTail`, jumping to `next_1` instead.
    MatchBody { node: NodeId, pos: usize, count: u32, capture_change: u64 },
    /// `GREEDY_REPEAT_ONE`: give back one character and retry the tail at
    /// `pos - 1`. `node` is the `GreedyRepeatOne` node itself (not a
    /// separate body/tail id): its `Payload::RepeatOne` carries `min`/`max`/
    /// the character test, and `next_1` is the tail, so the driver re-reads
    /// all of it from the arena rather than duplicating it in this frame.
    GreedyRepeatOne { node: NodeId, pos: usize, count: u32 },
    /// `LAZY_REPEAT_ONE`: consume one more character and retry the tail;
    /// same `node`-carries-everything shape as `GreedyRepeatOne`.
    LazyRepeatOne { node: NodeId, pos: usize, count: u32 },
    /// `ATOMIC`: once the subpattern commits (succeeds), every internal
    /// choice point it pushed is truncated away (atomic = no backtracking
    /// into alternatives already taken) and replaced by this single marker.
    /// The pre-entry snapshot itself lives on `State::saved` (component H):
    /// pushed before the subpattern runs, left in place while the commit
    /// stands, and popped here when a *later* backtrack reaches back past
    /// this node and needs to undo it (§4.6, §9 "tagged-union backtrack
    /// frames").
    Atomic,
    /// Positive lookaround success: same `State::saved`-backed shape as
    /// `Atomic`, pushed so a later backtrack past this zero-width assertion
    /// rolls back whatever captures its subpattern committed (§4.6).
    Lookaround,
    /// `GROUP_CALL`: undo the frame push.
    GroupCall,
    /// `GROUP_RETURN`: undo the caller-state restore it performed on entry,
    /// re-pushing the call frame it popped (§3.3 "on rewind, the matching
    /// push is undone").
    GroupReturn { frame: GroupCallFrame, groups_before_return: Vec<GroupData>, repeats_before_return: Vec<RepeatData> },
    /// A fuzzy leaf decision taken against a single node; `ty` is `None`
    /// when the exact (zero-cost) match was taken and `Some` when an edit
    /// was. Retrying resumes the SUB→INS→DEL cascade one step past `ty`
    /// (§4.10).
    FuzzyItem { section: usize, ty: Option<FuzzyType>, node: NodeId, pos: usize, counts_before: FuzzyCounts },
    /// `END_FUZZY`'s insertion-extension retry (§4.10).
    FuzzyInsertExtend { section: usize, node: NodeId, pos: usize, counts_before: FuzzyCounts },
    /// Marks that the top-level search should advance `match_pos` by `step`
    /// and retry, rather than declaring overall failure.
    SearchAdvance { step: i8 },
}

/// A fixed-size block of backtrack entries, one link in the logical stack.
struct Block {
    entries: Vec<Option<BacktrackData>>,
}

impl Block {
    fn new() -> Self {
        Block { entries: (0..BLOCK_SIZE).map(|_| None).collect() }
    }
}

/// The block-allocated backtrack stack for one `State` (§3.1, §9). Blocks
/// are retained on a free list within the stack itself (they're simply not
/// shrunk) and fully released only when the stack (and so the `State`) is
/// dropped, per §3.3.
pub struct BacktrackStack {
    blocks: Vec<Block>,
    /// Logical length across all blocks.
    len: usize,
}

impl BacktrackStack {
    pub fn new() -> Self {
        BacktrackStack { blocks: Vec::new(), len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Push an entry, allocating a fresh block if the current one is full.
    /// Errors with `Error::Backtracking` once `RE_MAX_BACKTRACK_ALLOC` is
    /// reached (§5).
    pub fn push(&mut self, data: BacktrackData) -> crate::error::Result<()> {
        if self.len >= RE_MAX_BACKTRACK_ALLOC {
            return Err(crate::error::Error::Backtracking);
        }
        let block_idx = self.len / BLOCK_SIZE;
        let slot = self.len % BLOCK_SIZE;
        if block_idx == self.blocks.len() {
            self.blocks.push(Block::new());
        }
        self.blocks[block_idx].entries[slot] = Some(data);
        self.len += 1;
        Ok(())
    }

    /// Pop the top entry. Blocks are kept allocated (not freed) so a
    /// subsequent push reuses the same storage, per §3.3.
    pub fn pop(&mut self) -> Option<BacktrackData> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        let block_idx = self.len / BLOCK_SIZE;
        let slot = self.len % BLOCK_SIZE;
        self.blocks[block_idx].entries[slot].take()
    }

    pub fn peek(&self) -> Option<&BacktrackData> {
        if self.len == 0 {
            return None;
        }
        let block_idx = (self.len - 1) / BLOCK_SIZE;
        let slot = (self.len - 1) % BLOCK_SIZE;
        self.blocks[block_idx].entries[slot].as_ref()
    }

    /// Truncate the logical stack back to `len`, used when a `Lookaround`
    /// snapshot needs to drop everything pushed since it was taken (§4.6).
    pub fn truncate(&mut self, len: usize) {
        while self.len > len {
            self.pop();
        }
    }
}

impl Default for BacktrackStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_across_block_boundary() {
        let mut stack = BacktrackStack::new();
        for i in 0..(BLOCK_SIZE * 2 + 3) {
            stack.push(BacktrackData::SearchAdvance { step: (i % 2) as i8 }).unwrap();
        }
        assert_eq!(stack.len(), BLOCK_SIZE * 2 + 3);
        let mut count = 0;
        while stack.pop().is_some() {
            count += 1;
        }
        assert_eq!(count, BLOCK_SIZE * 2 + 3);
    }

    #[test]
    fn truncate_drops_tail() {
        let mut stack = BacktrackStack::new();
        stack.push(BacktrackData::SearchAdvance { step: 1 }).unwrap();
        let mark = stack.len();
        stack.push(BacktrackData::SearchAdvance { step: 1 }).unwrap();
        stack.push(BacktrackData::SearchAdvance { step: 1 }).unwrap();
        stack.truncate(mark);
        assert_eq!(stack.len(), mark);
    }

    #[test]
    fn budget_exceeded_errors() {
        let mut stack = BacktrackStack { blocks: Vec::new(), len: RE_MAX_BACKTRACK_ALLOC };
        assert!(stack.push(BacktrackData::SearchAdvance { step: 1 }).is_err());
    }
}
