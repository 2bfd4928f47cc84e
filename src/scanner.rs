// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The scanner protocol (§6.4): a stateful, resumable search that drives a
//! single long-lived `State` across repeated calls instead of starting a
//! fresh one per match, the way `finditer`/`splititer` are built on top of
//! `match`/`search` in most regex engines. Each call resumes from where the
//! previous one left off (`text_pos`); a zero-width match sets
//! `state.must_advance` for the following call so the driver's own
//! `Success` dispatch (§4.4) refuses to stop at the same `search_anchor`
//! twice, keeping the scan-always-progresses guarantee inside the engine
//! rather than bumping the cursor externally. In `overlapped` mode the
//! anchor instead advances by exactly one position after *every* match,
//! regardless of width.

use std::collections::VecDeque;

use crate::encoding::Encoding;
use crate::error::{Error, Result, Status};
use crate::opcode::Flags;
use crate::ops;
use crate::pattern::{MatchOptions, Pattern};
use crate::result::MatchResult;
use crate::state::{CancelFlag, Concurrent, State, StateLock};

/// A resumable search over one `text`, yielding successive non-overlapping
/// (or, with `overlapped`, overlapping) matches. Used directly as an
/// `Iterator` by `finditer`, and internally by `SplitIter`.
///
/// `left`/`right` are the slice's fixed outer bounds; `cursor` is whichever
/// of the two the scan direction actually advances — `left` growing toward
/// `right` for a forward pattern, `right` shrinking toward `left` for one
/// compiled with `Flags::REVERSE` (§4.2's search direction is a property of
/// the pattern, not of an individual call).
pub struct Scanner<'p, 't, 'e> {
    pattern: &'p Pattern,
    enc: &'e dyn Encoding,
    text: &'t [char],
    state: State<'t>,
    lock: StateLock,
    left: usize,
    right: usize,
    cursor: usize,
    reverse: bool,
    overlapped: bool,
    must_advance: bool,
    done: bool,
}

impl<'p, 't, 'e> Scanner<'p, 't, 'e> {
    pub fn new(pattern: &'p Pattern, enc: &'e dyn Encoding, text: &'t [char], opts: MatchOptions) -> Result<Self> {
        Self::with_overlap(pattern, enc, text, opts, false)
    }

    pub fn with_overlap(
        pattern: &'p Pattern,
        enc: &'e dyn Encoding,
        text: &'t [char],
        opts: MatchOptions,
        overlapped: bool,
    ) -> Result<Self> {
        let right = opts.endpos.unwrap_or(text.len());
        if opts.pos > text.len() || right > text.len() || opts.pos > right {
            return Err(Error::Index);
        }
        let reverse = pattern.flags.contains(Flags::REVERSE);
        let mut state = State::new(
            text,
            crate::cursor::Width::Four,
            pattern.true_group_count,
            pattern.repeat_count,
            pattern.fuzzy_count,
            CancelFlag::new(),
        );
        state.set_allow_partial(opts.partial);
        Ok(Scanner {
            pattern,
            enc,
            text,
            state,
            lock: StateLock::new(opts.concurrent, true),
            left: opts.pos,
            right,
            cursor: if reverse { right } else { opts.pos },
            reverse,
            overlapped,
            must_advance: false,
            done: false,
        })
    }

    /// Find the next match, or `None` once the scan is exhausted. Distinct
    /// from the `Iterator` impl only in spelling out the `Result` rather
    /// than folding an error into a one-shot `Some(Err(_))` item.
    pub fn next_match(&mut self) -> Result<Option<MatchResult<'p>>> {
        let _guard = self.lock.acquire();
        if self.done {
            return Ok(None);
        }
        let (pos, endpos) = if self.reverse { (self.left, self.cursor) } else { (self.cursor, self.right) };
        if pos > endpos {
            self.done = true;
            return Ok(None);
        }

        self.state.init_match(pos, endpos, self.reverse);
        self.state.slice_start = self.left;
        self.state.slice_end = self.right;
        self.state.overlapped = self.overlapped;
        self.state.must_advance = self.must_advance;

        match ops::run_top_level(self.pattern, &mut self.state, self.enc, false)? {
            Status::Success => {
                let result = MatchResult::from_state(self.pattern, &self.state, pos, endpos);
                // Overlapped mode advances by exactly one code unit every
                // time (§6.4), so its next attempt never re-lands on this
                // call's search_anchor and doesn't need `must_advance`.
                self.must_advance = !self.overlapped && result.match_end == result.match_start;
                let next_cursor = if self.reverse {
                    if self.overlapped { result.match_end.saturating_sub(1) } else { result.match_start }
                } else if self.overlapped {
                    result.match_start + 1
                } else {
                    result.match_end
                };
                // Overlapped reverse mode has no `must_advance` backstop;
                // guard its `saturating_sub` floor at `left` explicitly.
                if self.overlapped && self.reverse && next_cursor >= self.cursor {
                    self.done = true;
                } else {
                    self.cursor = next_cursor;
                }
                Ok(Some(result))
            }
            Status::Partial => {
                self.done = true;
                Ok(Some(MatchResult::from_state(self.pattern, &self.state, pos, endpos)))
            }
            Status::Failure => {
                self.done = true;
                Ok(None)
            }
            Status::Interrupted => Err(Error::Interrupted),
        }
    }

    pub fn text(&self) -> &'t [char] {
        self.text
    }
}

impl<'p, 't, 'e> Iterator for Scanner<'p, 't, 'e> {
    type Item = Result<MatchResult<'p>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_match() {
            Ok(Some(result)) => Some(Ok(result)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// §6.2 `splititer`: the lazy counterpart to `ops::split`. Each match
/// yields one or more pending pieces (the text before it, then each of its
/// public groups); the final piece (the text after the last match) is
/// emitted once the underlying scan is exhausted.
pub struct SplitIter<'p, 't, 'e> {
    scanner: Scanner<'p, 't, 'e>,
    text: &'t [char],
    last_end: usize,
    maxsplit: usize,
    splits: usize,
    pending: VecDeque<String>,
    tail_emitted: bool,
}

impl<'p, 't, 'e> SplitIter<'p, 't, 'e> {
    pub fn new(pattern: &'p Pattern, enc: &'e dyn Encoding, text: &'t [char], maxsplit: usize) -> Result<Self> {
        Ok(SplitIter {
            scanner: Scanner::new(pattern, enc, text, MatchOptions::default())?,
            text,
            last_end: 0,
            maxsplit,
            splits: 0,
            pending: VecDeque::new(),
            tail_emitted: false,
        })
    }
}

impl<'p, 't, 'e> Iterator for SplitIter<'p, 't, 'e> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(piece) = self.pending.pop_front() {
            return Some(Ok(piece));
        }
        if self.tail_emitted {
            return None;
        }
        if self.maxsplit != 0 && self.splits >= self.maxsplit {
            self.tail_emitted = true;
            return Some(Ok(self.text[self.last_end..].iter().collect()));
        }
        match self.scanner.next_match() {
            Some(Ok(result)) => {
                self.pending.push_back(self.text[self.last_end..result.match_start].iter().collect());
                for i in 1..=self.scanner.pattern.public_group_count {
                    self.pending.push_back(match result.group(i) {
                        Some(span) => self.text[span.start..span.end].iter().collect(),
                        None => String::new(),
                    });
                }
                self.last_end = result.match_end;
                self.splits += 1;
                self.pending.pop_front().map(Ok)
            }
            Some(Err(e)) => Some(Err(e)),
            None => {
                self.tail_emitted = true;
                Some(Ok(self.text[self.last_end..].iter().collect()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Ascii;
    use crate::node::{Node, Payload};
    use crate::opcode::{Flags, Opcode};

    fn pattern_literal_x() -> Pattern {
        let mut arena = crate::node::NodeArena::new();
        let success = arena.push(Node::new(Opcode::Success));
        let mut x = Node::new(Opcode::Character).with_step(1).with_payload(Payload::Char('x'));
        x.next_1 = Some(success);
        let x = arena.push(x);
        Pattern {
            arena,
            start_node: x,
            start_test: None,
            true_group_count: 0,
            public_group_count: 0,
            group_end_index_max: -1,
            group_info: Vec::new(),
            call_ref_info: std::collections::HashMap::new(),
            repeat_info: Vec::new(),
            repeat_count: 0,
            fuzzy_count: 0,
            fuzzy_specs: Vec::new(),
            min_width: 1,
            is_fuzzy: false,
            do_search_start: false,
            req_string_node: None,
            req_offset: 0,
            encoding: crate::pattern::EncodingKind::Ascii,
            flags: Flags::empty(),
            named_lists: std::collections::HashMap::new(),
            named_list_indexes: Vec::new(),
            pattern_call_ref: None,
            group_index: std::collections::HashMap::new(),
            index_group: std::collections::HashMap::new(),
        }
    }

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn scanner_yields_every_non_overlapping_match() {
        let pattern = pattern_literal_x();
        let text = chars("xaxax");
        let scanner = Scanner::new(&pattern, &Ascii, &text, MatchOptions::default()).unwrap();
        let spans: Vec<_> = scanner.map(|r| r.unwrap().span()).collect();
        assert_eq!(spans, vec![crate::capture::Span::new(0, 1), crate::capture::Span::new(2, 3), crate::capture::Span::new(4, 5)]);
    }

    #[test]
    fn splititer_matches_eager_split() {
        let pattern = pattern_literal_x();
        let text = chars("axbxc");
        let pieces: Vec<String> = SplitIter::new(&pattern, &Ascii, &text, 0).unwrap().map(|p| p.unwrap()).collect();
        assert_eq!(pieces, vec!["a", "b", "c"]);
    }
}
