// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The capture store (component D, §3.1): per-group current span plus a
//! growable history of spans for groups that repeat.

/// A half-open `[start, end)` span over text positions. Introduced per
/// `SPEC_FULL.md`'s supplemented-features section as the natural factoring
/// for the `(start, end)` pairs the spec describes throughout but never
/// names as a type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    pub const UNSET: Span = Span { start: usize::MAX, end: usize::MAX };

    pub fn is_set(&self) -> bool {
        *self != Span::UNSET
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
}

/// Per-group mutable state (§3.1 `GroupData`). `current_capture` indexes
/// into `captures`, or is `None` when the group has never participated.
#[derive(Clone, Debug)]
pub struct GroupData {
    pub span: Span,
    pub captures: Vec<Span>,
    pub current_capture: Option<usize>,
    /// The store-wide `capture_change` value as of this group's most recent
    /// `record` (or `0` if it never has). Lets a caller recover `lastindex`/
    /// `lastgroup` (§6.2 `MatchResult`) — the public group whose span was
    /// set most recently — without the driver tracking a dedicated "last
    /// mark" field of its own.
    pub last_change: u64,
}

impl GroupData {
    pub fn new() -> Self {
        GroupData { span: Span::UNSET, captures: Vec::new(), current_capture: None, last_change: 0 }
    }

    /// Invariant (§3.2): `captures[current_capture] == span` whenever
    /// `current_capture` is set.
    pub fn check_invariant(&self) -> bool {
        match self.current_capture {
            Some(i) => self.captures.get(i) == Some(&self.span),
            None => true,
        }
    }

    pub fn record(&mut self, span: Span) {
        self.span = span;
        self.captures.push(span);
        self.current_capture = Some(self.captures.len() - 1);
    }

    /// Undo the most recent `record`, restoring the span that was active
    /// before it (used when backtracking out of a `START_GROUP`/`END_GROUP`
    /// pair, §4.4 "case Group").
    pub fn unrecord(&mut self, prior_span: Span, prior_capture: Option<usize>) {
        if let Some(i) = self.current_capture {
            if i < self.captures.len() && prior_capture != Some(i) {
                self.captures.truncate(i);
            }
        }
        self.span = prior_span;
        self.current_capture = prior_capture;
    }
}

impl Default for GroupData {
    fn default() -> Self {
        Self::new()
    }
}

/// The full set of group slots for one `State`, indexed by
/// `Pattern.true_group_count` (internal groups included, §3.1).
#[derive(Clone, Debug)]
pub struct CaptureStore {
    groups: Vec<GroupData>,
    /// Strictly monotonic counter bumped on every mutation that changes a
    /// group span (§3.2 `capture_change`); lookaround/atomic restore
    /// compares this to detect whether a subpattern mutated captures.
    capture_change: u64,
}

impl CaptureStore {
    pub fn new(true_group_count: usize) -> Self {
        CaptureStore {
            groups: (0..true_group_count).map(|_| GroupData::new()).collect(),
            capture_change: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, index: usize) -> &GroupData {
        &self.groups[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut GroupData {
        &mut self.groups[index]
    }

    pub fn capture_change(&self) -> u64 {
        self.capture_change
    }

    pub fn set_span(&mut self, index: usize, span: Span) {
        self.groups[index].record(span);
        self.capture_change += 1;
        self.groups[index].last_change = self.capture_change;
    }

    pub fn unset_span(&mut self, index: usize, prior_span: Span, prior_capture: Option<usize>) {
        self.groups[index].unrecord(prior_span, prior_capture);
        self.capture_change += 1;
    }

    pub fn reset(&mut self) {
        for g in &mut self.groups {
            *g = GroupData::new();
        }
        self.capture_change = 0;
    }

    /// A deep snapshot for lookaround/atomic/group-call save points (§3.1
    /// `GroupCallFrame`, §4.6).
    pub fn snapshot(&self) -> Vec<GroupData> {
        self.groups.clone()
    }

    pub fn restore(&mut self, snapshot: Vec<GroupData>) {
        self.groups = snapshot;
        self.capture_change += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_unrecord_roundtrip() {
        let mut g = GroupData::new();
        assert!(!g.span.is_set());
        let prior_span = g.span;
        let prior_cap = g.current_capture;
        g.record(Span::new(0, 3));
        assert_eq!(g.span, Span::new(0, 3));
        assert!(g.check_invariant());
        g.unrecord(prior_span, prior_cap);
        assert!(!g.span.is_set());
        assert!(g.captures.is_empty());
    }

    #[test]
    fn capture_change_is_monotonic() {
        let mut store = CaptureStore::new(2);
        let before = store.capture_change();
        store.set_span(0, Span::new(0, 1));
        assert!(store.capture_change() > before);
        let mid = store.capture_change();
        store.set_span(1, Span::new(1, 2));
        assert!(store.capture_change() > mid);
    }

    #[test]
    fn repeat_group_builds_capture_history() {
        let mut store = CaptureStore::new(1);
        store.set_span(0, Span::new(0, 1));
        store.set_span(0, Span::new(1, 2));
        store.set_span(0, Span::new(2, 3));
        assert_eq!(store.get(0).captures.len(), 3);
        assert_eq!(store.get(0).span, Span::new(2, 3));
    }

    // §8.1 "Capture consistency": after any sequence of `record`/`unrecord`
    // calls (the same push/pop pairing the driver does around every
    // `START_GROUP`/`END_GROUP`, §4.4), `captures[current_capture] == span`
    // still holds whenever `current_capture` is set.
    proptest::proptest! {
        #[test]
        fn group_data_invariant_survives_record_unrecord_sequences(
            spans in proptest::collection::vec((0usize..20, 0usize..20), 1..20)
        ) {
            let mut g = GroupData::new();
            let mut undo_stack = Vec::new();
            for (a, b) in spans {
                let (start, end) = if a <= b { (a, b) } else { (b, a) };
                undo_stack.push((g.span, g.current_capture));
                g.record(Span::new(start, end));
                proptest::prop_assert!(g.check_invariant());
            }
            while let Some((prior_span, prior_capture)) = undo_stack.pop() {
                g.unrecord(prior_span, prior_capture);
                proptest::prop_assert!(g.check_invariant());
            }
        }
    }
}
