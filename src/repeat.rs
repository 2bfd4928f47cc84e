// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The repeat & guard store (component E, §3.1, §3.2, §4.5): per-repeat
//! iteration bookkeeping plus the guard lists that stop the engine from
//! re-entering a zero-width repeat body/tail at the same text position.

/// Per-repeat iteration state (§3.1 `RepeatData`).
#[derive(Clone, Copy, Debug)]
pub struct RepeatData {
    pub count: u32,
    /// Text position where the current iteration began, used by the
    /// anti-infinite-loop check in §4.5 (`text_pos != start`).
    pub start: usize,
    /// Snapshot of `CaptureStore::capture_change` at iteration start, the
    /// other half of the "body made progress" test.
    pub capture_change: u64,
}

impl RepeatData {
    pub fn new() -> Self {
        RepeatData { count: 0, start: 0, capture_change: 0 }
    }
}

impl Default for RepeatData {
    fn default() -> Self {
        Self::new()
    }
}

/// A single protected half-open range within a `GuardList`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct GuardSpan {
    low: usize,
    high: usize,
    protect: bool,
}

/// A sorted, disjoint, maximally-merged set of guarded `[low, high]` text
/// positions (§3.1 `GuardList`, §3.2 invariant). Spans with *different*
/// `protect` values never merge even when adjacent/overlapping — preserved
/// exactly per §9's Open Question ("implicit in the C code ... preserve
/// that").
#[derive(Clone, Debug, Default)]
pub struct GuardList {
    spans: Vec<GuardSpan>,
}

impl GuardList {
    pub fn new() -> Self {
        GuardList { spans: Vec::new() }
    }

    pub fn clear(&mut self) {
        self.spans.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Insert `[low, high]` tagged `protect`, merging with adjacent spans
    /// of the *same* `protect` value. Keeps `self.spans` sorted by `low`.
    pub fn insert(&mut self, low: usize, high: usize, protect: bool) {
        let new = GuardSpan { low, high, protect };
        let idx = self.spans.partition_point(|s| s.low < new.low);

        let mergeable = |a: &GuardSpan, b: &GuardSpan| {
            a.protect == b.protect && a.low <= b.high.saturating_add(1) && b.low <= a.high.saturating_add(1)
        };

        let mut merged = new;
        let mut start = idx;
        while start > 0 && mergeable(&self.spans[start - 1], &merged) {
            start -= 1;
            merged.low = merged.low.min(self.spans[start].low);
            merged.high = merged.high.max(self.spans[start].high);
        }
        let mut end = idx;
        while end < self.spans.len() && mergeable(&self.spans[end], &merged) {
            merged.high = merged.high.max(self.spans[end].high);
            merged.low = merged.low.min(self.spans[end].low);
            end += 1;
        }
        self.spans.splice(start..end, std::iter::once(merged));
    }

    /// True if `pos` falls within a span tagged `protect` (the only query
    /// the driver needs: "has this position already been ruled out here?").
    pub fn is_guarded(&self, pos: usize, protect: bool) -> bool {
        let idx = self.spans.partition_point(|s| s.high < pos);
        self.spans[idx..]
            .iter()
            .take_while(|s| s.low <= pos)
            .any(|s| s.protect == protect && s.low <= pos && pos <= s.high)
    }

    #[cfg(test)]
    fn span_count(&self) -> usize {
        self.spans.len()
    }
}

/// Per-repeat guard lists: one for the body's re-entry positions, one for
/// the tail's completion positions (§3.1, §4.5).
#[derive(Clone, Debug, Default)]
pub struct RepeatGuards {
    pub body_guard_list: GuardList,
    pub tail_guard_list: GuardList,
}

impl RepeatGuards {
    pub fn new() -> Self {
        RepeatGuards::default()
    }

    /// Reset both guard lists, called when an enclosing atomic/lookaround
    /// subpattern exits (§4.3 post-pass 3, §4.6): the nested repeat's
    /// guards only ever applied within that speculative run.
    pub fn reset(&mut self) {
        self.body_guard_list.clear();
        self.tail_guard_list.clear();
    }
}

/// The full per-`State` repeat store, indexed by `Pattern.repeat_count`.
#[derive(Clone, Debug)]
pub struct RepeatStore {
    data: Vec<RepeatData>,
    guards: Vec<RepeatGuards>,
}

impl RepeatStore {
    pub fn new(repeat_count: usize) -> Self {
        RepeatStore {
            data: vec![RepeatData::new(); repeat_count],
            guards: (0..repeat_count).map(|_| RepeatGuards::new()).collect(),
        }
    }

    pub fn data(&self, index: usize) -> RepeatData {
        self.data[index]
    }

    pub fn data_mut(&mut self, index: usize) -> &mut RepeatData {
        &mut self.data[index]
    }

    pub fn guards(&self, index: usize) -> &RepeatGuards {
        &self.guards[index]
    }

    pub fn guards_mut(&mut self, index: usize) -> &mut RepeatGuards {
        &mut self.guards[index]
    }

    pub fn reset_nested(&mut self, indices: &[u32]) {
        for &i in indices {
            self.guards[i as usize].reset();
            self.data[i as usize] = RepeatData::new();
        }
    }

    pub fn reset_all(&mut self) {
        for d in &mut self.data {
            *d = RepeatData::new();
        }
        for g in &mut self.guards {
            g.reset();
        }
    }

    /// A snapshot of the per-repeat counters for a lookaround/atomic/
    /// group-call save point (§3.1 `GroupCallFrame`, §4.6). Guard lists are
    /// deliberately excluded: they're reset wholesale by `reset_nested` on
    /// exit rather than rolled back position-by-position.
    pub fn snapshot(&self) -> Vec<RepeatData> {
        self.data.clone()
    }

    pub fn restore(&mut self, snapshot: Vec<RepeatData>) {
        self.data = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacent_same_protect_merges() {
        let mut gl = GuardList::new();
        gl.insert(0, 3, true);
        gl.insert(4, 6, true);
        assert_eq!(gl.span_count(), 1);
        assert!(gl.is_guarded(5, true));
    }

    #[test]
    fn different_protect_never_merges() {
        let mut gl = GuardList::new();
        gl.insert(0, 3, true);
        gl.insert(4, 6, false);
        assert_eq!(gl.span_count(), 2);
        assert!(!gl.is_guarded(5, true));
        assert!(gl.is_guarded(5, false));
    }

    #[test]
    fn overlapping_spans_merge_into_one() {
        let mut gl = GuardList::new();
        gl.insert(0, 5, true);
        gl.insert(3, 8, true);
        assert_eq!(gl.span_count(), 1);
        assert!(gl.is_guarded(0, true));
        assert!(gl.is_guarded(8, true));
        assert!(!gl.is_guarded(9, true));
    }

    // §8.1 "Guard monotonicity": for any sequence of inserts, `spans`
    // stays sorted by `low`, no two spans overlap or touch (merging is
    // supposed to have absorbed that), and the list only grows — it's
    // never re-queried as guarded for a position no prior insert covered.
    proptest::proptest! {
        #[test]
        fn guard_list_stays_sorted_and_disjoint(
            inserts in proptest::collection::vec((0usize..40, 0usize..40, proptest::bool::ANY), 1..30)
        ) {
            let mut gl = GuardList::new();
            for (a, b, protect) in inserts {
                let (low, high) = if a <= b { (a, b) } else { (b, a) };
                gl.insert(low, high, protect);

                for w in gl.spans.windows(2) {
                    proptest::prop_assert!(w[0].low <= w[1].low);
                    if w[0].protect == w[1].protect {
                        proptest::prop_assert!(w[0].high.saturating_add(1) < w[1].low);
                    }
                }
                proptest::prop_assert!(gl.is_guarded(low, protect));
                proptest::prop_assert!(gl.is_guarded(high, protect));
            }
        }
    }
}
