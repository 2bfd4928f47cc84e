// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The per-match mutable environment (§3.1 `State`, §3.3 lifecycle).
//! Created at the start of a top-level operation, reset between attempts
//! by `init_match`, and destroyed when the operation (or scanner) ends. May
//! be long-lived across successive `match`/`search` calls (the scanner
//! pattern, §6.4).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::backtrack::BacktrackStack;
use crate::capture::CaptureStore;
use crate::cursor::{PartialSide, Width};
use crate::fuzzy::FuzzyInfo;
use crate::groupcall::GroupCallStack;
use crate::repeat::RepeatStore;
use crate::saved::SavedStack;

/// Number of VM steps between cancellation checkpoints (§4.4, §5: "Every
/// ~65k iterations"). A `u16` counter wrapping at this value is exactly
/// what the spec describes.
pub const ITERATION_CHECKPOINT: u16 = u16::MAX;

/// A flag the host can set from another thread to request that matching
/// stop at the next checkpoint (§5 "Cancellation semantics"). `State`
/// polls it; it never blocks.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        CancelFlag(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The tri-state `concurrent` setting from §5: whether a shared `State`
/// takes its mutex around each top-level call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Concurrent {
    Yes,
    No,
    /// Enables the lock when the text backing is immutable (the common
    /// case), disables it otherwise; resolved by the host at `State`
    /// construction, not re-evaluated per call.
    Default,
}

/// The per-`State` lock described in §5 "Shared-state policy": held for
/// the duration of one top-level call (`scanner.next`, `splitter.next`) so
/// a `State` can be safely shared across threads. Plain mutex: the `State`
/// is never exposed to user code during the call, so no reentrance is
/// needed.
#[derive(Default)]
pub struct StateLock {
    mutex: Option<Mutex<()>>,
}

impl StateLock {
    pub fn new(concurrent: Concurrent, immutable_text: bool) -> Self {
        let enabled = match concurrent {
            Concurrent::Yes => true,
            Concurrent::No => false,
            Concurrent::Default => immutable_text,
        };
        StateLock { mutex: if enabled { Some(Mutex::new(())) } else { None } }
    }

    /// Acquire the lock (a no-op if this `State` wasn't configured to use
    /// one), returning a guard to hold for the call's duration.
    pub fn acquire(&self) -> Option<std::sync::MutexGuard<'_, ()>> {
        self.mutex.as_ref().map(|m| m.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

/// The matching environment itself (§3.1 `State`).
pub struct State<'t> {
    pub text: &'t [char],
    pub text_length: usize,
    pub width: Width,
    pub slice_start: usize,
    pub slice_end: usize,
    pub text_pos: usize,
    pub match_pos: usize,
    pub search_anchor: usize,
    pub reverse: bool,
    pub match_all: bool,
    pub must_advance: bool,
    pub partial_side: PartialSide,
    pub overlapped: bool,
    /// Whether the current top-level operation was asked to report a
    /// partial match at a slice boundary (§6.1 `partial`); distinct from
    /// `partial_side`, which records *where* a partial boundary was hit
    /// for the caller's benefit. Set once per operation, not reset by
    /// `init_match`.
    pub allow_partial: bool,
    /// Pending open-paren position for a capturing group between its
    /// `START_GROUP` and `END_GROUP` nodes (§4.4 "case START_GROUP/
    /// END_GROUP"); indexed like `captures`.
    pub group_starts: Vec<Option<usize>>,
    /// Recursion depth of nested `ATOMIC`/`LOOKAROUND` sub-invocations
    /// (§9 "Recursive basic_match ... cap depth by a configurable limit to
    /// avoid stack overflow"); checked by `driver::basic_match` against
    /// `driver::MAX_SUB_DEPTH`.
    pub sub_depth: usize,
    /// Legacy zero-width split behaviour, carried per §3.1 but not acted
    /// on by `ops.rs`'s splitter beyond documenting it — see DESIGN.md's
    /// Open Question decision for `version_0` vs `version_1`.
    pub version_0: bool,

    pub captures: CaptureStore,
    pub repeats: RepeatStore,
    pub fuzzy_info: FuzzyInfo,
    pub backtrack: BacktrackStack,
    pub saved: SavedStack,
    pub group_calls: GroupCallStack,

    /// Max total fuzzy cost budget for the current attempt; lowered by the
    /// BESTMATCH loop between successive attempts (§4.4).
    pub max_cost: u32,

    cancel: CancelFlag,
    iterations: u16,
}

impl<'t> State<'t> {
    pub fn new(
        text: &'t [char],
        width: Width,
        true_group_count: usize,
        repeat_count: usize,
        fuzzy_count: usize,
        cancel: CancelFlag,
    ) -> Self {
        let text_length = text.len();
        State {
            text,
            text_length,
            width,
            slice_start: 0,
            slice_end: text_length,
            text_pos: 0,
            match_pos: 0,
            search_anchor: 0,
            reverse: false,
            match_all: false,
            must_advance: false,
            partial_side: PartialSide::None,
            overlapped: false,
            allow_partial: false,
            group_starts: vec![None; true_group_count],
            sub_depth: 0,
            version_0: false,
            captures: CaptureStore::new(true_group_count),
            repeats: RepeatStore::new(repeat_count),
            fuzzy_info: FuzzyInfo::new(fuzzy_count),
            backtrack: BacktrackStack::new(),
            saved: SavedStack::new(),
            group_calls: GroupCallStack::new(),
            max_cost: u32::MAX,
            cancel,
            iterations: 0,
        }
    }

    /// Reset all per-attempt mutable state before running the driver
    /// again, keeping the `State`'s allocations (backtrack blocks, etc.)
    /// for reuse, per §3.3.
    pub fn init_match(&mut self, pos: usize, endpos: usize, reverse: bool) {
        self.slice_start = 0;
        self.slice_end = self.text_length;
        self.text_pos = if reverse { endpos } else { pos };
        self.match_pos = self.text_pos;
        self.search_anchor = self.text_pos;
        self.reverse = reverse;
        self.must_advance = false;
        self.partial_side = PartialSide::None;
        for g in &mut self.group_starts {
            *g = None;
        }
        self.sub_depth = 0;
        self.captures.reset();
        self.repeats.reset_all();
        self.fuzzy_info.reset();
        self.backtrack.truncate(0);
        while self.group_calls.pop().is_some() {}
        self.max_cost = u32::MAX;
        let _ = (pos, endpos);
    }

    /// Called on every VM step from the driver; increments the iteration
    /// counter and, at the checkpoint boundary, checks for cancellation
    /// (§4.4, §5).
    pub fn tick(&mut self) -> crate::error::Result<()> {
        self.iterations = self.iterations.wrapping_add(1);
        if self.iterations == 0 && self.cancel.is_cancelled() {
            return Err(crate::error::Error::Interrupted);
        }
        Ok(())
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Set once per top-level operation (§6.1 `partial`), before the first
    /// `init_match` of that operation; unlike the rest of `init_match`'s
    /// resets, this persists across a scanner's repeated calls only if the
    /// host re-asserts it, matching `MatchOptions::partial` being supplied
    /// fresh on every call.
    pub fn set_allow_partial(&mut self, allow: bool) {
        self.allow_partial = allow;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn init_match_resets_mutation() {
        let text = chars("hello world");
        let mut state = State::new(&text, Width::One, 1, 1, 0, CancelFlag::new());
        state.captures.set_span(0, crate::capture::Span::new(0, 3));
        state.init_match(0, text.len(), false);
        assert!(!state.captures.get(0).span.is_set());
    }

    #[test]
    fn cancellation_observed_at_checkpoint() {
        let text = chars("abc");
        let flag = CancelFlag::new();
        let mut state = State::new(&text, Width::One, 0, 0, 0, flag.clone());
        flag.cancel();
        for _ in 0..u16::MAX {
            assert!(state.tick().is_ok());
        }
        assert!(state.tick().is_err());
    }
}
