// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The abstract return shape of a successful match (§6.2 `MatchResult`):
//! match bounds, per-group spans and capture history, fuzzy counts, and
//! whether the match was partial. `result.rs` also supplies the group
//! accessors `SPEC_FULL.md` calls out as the obvious completion of the
//! described shape: resolving a public index or a name to a `Span`.

use crate::capture::Span;
use crate::fuzzy::FuzzyCounts;
use crate::pattern::Pattern;
use crate::state::State;

/// One public group's state at the end of a successful match: its current
/// span (possibly unset, if the group never participated) and its full
/// capture history (§3.1 `GroupData`, non-empty only for groups under a
/// repeat).
#[derive(Clone, Debug)]
pub struct GroupResult {
    pub span: Span,
    pub captures: Vec<Span>,
}

/// The result of one successful top-level operation (§6.2). Borrows the
/// `Pattern` it was produced against so `name()` can resolve a named group
/// without this type owning a copy of the name table.
#[derive(Clone, Debug)]
pub struct MatchResult<'p> {
    pattern: &'p Pattern,
    pub pos: usize,
    pub endpos: usize,
    pub match_start: usize,
    pub match_end: usize,
    /// 1-based index of the highest-numbered public group that
    /// participated, or `None` if the pattern captures nothing (§6.2
    /// `lastindex`). Approximated, per `DESIGN.md`, as the group whose
    /// `last_change` counter (capture.rs) is greatest among those with a
    /// set span — the group that was most recently recorded, which for any
    /// non-pathological pattern coincides with "the last group the
    /// compiler's mark numbering would report".
    pub lastindex: Option<u32>,
    /// Per-public-group results, indexed `0..public_group_count` (group 1
    /// of the pattern is `groups[0]`; there is no entry for group 0, the
    /// whole match, since that is `span()`/`match_start`/`match_end`).
    pub groups: Vec<GroupResult>,
    /// Aggregate `(substitutions, insertions, deletions)` across every
    /// fuzzy section (§6.2 `fuzzy_counts`).
    pub fuzzy_counts: (u32, u32, u32),
    pub partial: bool,
}

impl<'p> MatchResult<'p> {
    /// Build a `MatchResult` from `state` immediately after a successful
    /// top-level operation. `state.match_pos`/`state.text_pos` are the raw
    /// VM bounds, which are direction-dependent (§3.2: `match_pos <=
    /// text_pos` forward, reversed in reverse mode) — this normalises them
    /// to `(match_start, match_end)` with `match_start <= match_end`.
    pub(crate) fn from_state(pattern: &'p Pattern, state: &State, pos: usize, endpos: usize) -> Self {
        let (match_start, match_end) =
            if state.reverse { (state.text_pos, state.match_pos) } else { (state.match_pos, state.text_pos) };

        let mut groups = Vec::with_capacity(pattern.public_group_count);
        let mut lastindex = None;
        let mut lastindex_change = 0u64;
        for i in 0..pattern.public_group_count {
            let g = state.captures.get(i);
            if g.span.is_set() && g.last_change >= lastindex_change {
                lastindex_change = g.last_change;
                lastindex = Some((i + 1) as u32);
            }
            groups.push(GroupResult { span: g.span, captures: g.captures.clone() });
        }

        let (sub, ins, del, _cost) = state.fuzzy_info.totals();

        MatchResult {
            pattern,
            pos,
            endpos,
            match_start,
            match_end,
            lastindex,
            groups,
            fuzzy_counts: (sub, ins, del),
            partial: state.partial_side != crate::cursor::PartialSide::None,
        }
    }

    /// The whole match's span — equivalent to `group(0)`.
    pub fn span(&self) -> Span {
        Span::new(self.match_start, self.match_end)
    }

    /// `group(0)` is always the whole match; `group(n)` for `n >= 1` looks
    /// up a public group, returning `None` if it never participated.
    pub fn group(&self, index: usize) -> Option<Span> {
        if index == 0 {
            return Some(self.span());
        }
        self.groups.get(index - 1).map(|g| g.span).filter(|s| s.is_set())
    }

    /// The full capture history of a public group (empty for group 0 and
    /// for groups that never participated).
    pub fn captures(&self, index: usize) -> &[Span] {
        if index == 0 {
            return &[];
        }
        self.groups.get(index - 1).map(|g| g.captures.as_slice()).unwrap_or(&[])
    }

    /// Resolve a named group to its current span (§6.1 `group_index`).
    pub fn name(&self, name: &str) -> Option<Span> {
        let idx = self.pattern.group_by_name(name)?;
        self.group(idx as usize)
    }

    /// The name of `lastindex`'s group, if it has one (§6.2 `lastgroup`).
    pub fn lastgroup(&self) -> Option<&str> {
        self.lastindex.and_then(|idx| self.pattern.name_by_group(idx))
    }

    /// Materialise the matched text of group `index` out of `text`, the
    /// same slice the operation matched against.
    pub fn text<'t>(&self, text: &'t [char], index: usize) -> Option<String> {
        let span = self.group(index)?;
        Some(text[span.start..span.end].iter().collect())
    }

    pub fn fuzzy_counts(&self) -> FuzzyCounts {
        let (sub, ins, del) = self.fuzzy_counts;
        FuzzyCounts { sub, ins, del, err: sub + ins + del, total_cost: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Span as S;
    use crate::opcode::Flags;
    use crate::pattern::EncodingKind;
    use std::collections::HashMap;

    fn empty_pattern() -> Pattern {
        Pattern {
            arena: crate::node::NodeArena::new(),
            start_node: crate::node::NodeId(0),
            start_test: None,
            true_group_count: 1,
            public_group_count: 1,
            group_end_index_max: -1,
            group_info: Vec::new(),
            call_ref_info: HashMap::new(),
            repeat_info: Vec::new(),
            repeat_count: 0,
            fuzzy_count: 0,
            fuzzy_specs: Vec::new(),
            min_width: 0,
            is_fuzzy: false,
            do_search_start: false,
            req_string_node: None,
            req_offset: 0,
            encoding: EncodingKind::Ascii,
            flags: Flags::empty(),
            named_lists: HashMap::new(),
            named_list_indexes: Vec::new(),
            pattern_call_ref: None,
            group_index: {
                let mut m = HashMap::new();
                m.insert("x".to_string(), 1u32);
                m
            },
            index_group: {
                let mut m = HashMap::new();
                m.insert(1u32, "x".to_string());
                m
            },
        }
    }

    #[test]
    fn group_zero_is_whole_match() {
        let pattern = empty_pattern();
        let text: Vec<char> = "hello".chars().collect();
        let mut state = crate::state::State::new(&text, crate::cursor::Width::One, 1, 0, 0, crate::state::CancelFlag::new());
        state.init_match(0, text.len(), false);
        state.match_pos = 0;
        state.text_pos = 5;
        state.captures.set_span(0, S::new(1, 3));
        let result = MatchResult::from_state(&pattern, &state, 0, text.len());
        assert_eq!(result.group(0), Some(S::new(0, 5)));
        assert_eq!(result.group(1), Some(S::new(1, 3)));
        assert_eq!(result.name("x"), Some(S::new(1, 3)));
        assert_eq!(result.lastindex, Some(1));
        assert_eq!(result.lastgroup(), Some("x"));
    }
}
