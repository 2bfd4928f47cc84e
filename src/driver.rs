// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The backtracking VM driver (§3, §4.4): a step/backtrack dispatch loop
//! over the node graph a `Pattern` compiles down to.
//!
//! `basic_match` runs one fixed-position attempt, either as the top-level
//! call from `run` or recursively from an `ATOMIC`/`LOOKAROUND`/
//! `GROUP_CALL` node. `run` is what a search loop actually wants: it seeds
//! the backtrack stack with a `SearchAdvance` sentinel when the caller asked
//! for unanchored matching, so exhausting every alternative at one position
//! falls through to retrying at the next one instead of declaring overall
//! failure — the position-advance loop lives inside the VM rather than as a
//! wrapper around it.

use crate::backtrack::BacktrackData;
use crate::capture::Span;
use crate::cursor::PartialSide;
use crate::encoding::Encoding;
use crate::error::{Error, Result, Status};
use crate::fuzzy::{FuzzyCounts, FuzzyType};
use crate::groupcall::GroupCallFrame;
use crate::node::{LeafMatcher, NodeId, Payload};
use crate::opcode::{NodeFlags, Opcode, RepeatStatus};
use crate::pattern::Pattern;
use crate::repeat::RepeatData;
use crate::saved::SavedFrame;
use crate::state::State;

/// Cap on recursive `basic_match` nesting from `ATOMIC`/`LOOKAROUND` (§9
/// "Recursive basic_match ... cap depth by a configurable limit to avoid
/// stack overflow"). Kept independent from `GroupCallStack`'s own depth
/// guard, which bounds `GROUP_CALL` recursion specifically rather than
/// Rust call-stack depth in general.
pub const MAX_SUB_DEPTH: usize = 4096;

/// What one `advance` step produced.
enum StepOutcome {
    Advance(NodeId),
    Success,
    Partial,
    Interrupted,
    Backtrack,
}

enum BacktrackOutcome {
    Advance(NodeId),
    Exhausted,
}

/// Run one top-level operation's worth of matching: a single anchored
/// attempt at `state`'s current position, or — when `anchored` is false —
/// a full left-to-right (or right-to-left, under `state.reverse`) search
/// driven by a `SearchAdvance` sentinel at the bottom of the backtrack
/// stack (§4.8's "top-level search").
pub fn run(pattern: &Pattern, state: &mut State, enc: &dyn Encoding, anchored: bool) -> Result<Status> {
    log::trace!(
        "run: {} search, pos={} endpos={} reverse={}",
        if anchored { "anchored" } else { "unanchored" },
        state.text_pos,
        state.slice_end,
        state.reverse
    );
    if !anchored {
        let step: i8 = if state.reverse { -1 } else { 1 };
        state.backtrack.push(BacktrackData::SearchAdvance { step })?;
    }
    let status = basic_match(pattern, state, enc, pattern.start_node)?;
    log::trace!("run: finished with {:?}", status);
    Ok(status)
}

/// Run the node graph from `start` at `state`'s current position to
/// completion: a plain `Success`/`Failure`/`Partial` outcome, or
/// `Interrupted` if the host's cancellation flag was observed. Used both
/// as the top-level loop (via `run`) and recursively for `ATOMIC`/
/// `LOOKAROUND`/`GROUP_CALL` subpatterns, which share the same `State`
/// (and so the same backtrack stack) as their caller — truncating the
/// stack back to a saved length is what keeps a nested call's internal
/// choice points from leaking into the caller's own backtracking (§4.6).
pub fn basic_match(pattern: &Pattern, state: &mut State, enc: &dyn Encoding, start: NodeId) -> Result<Status> {
    let mut current = start;
    loop {
        match state.tick() {
            Ok(()) => {}
            Err(Error::Interrupted) => {
                log::debug!("basic_match: cancelled, unwinding to caller");
                return Ok(Status::Interrupted);
            }
            Err(e) => return Err(e),
        }
        match advance(pattern, state, enc, current)? {
            StepOutcome::Advance(next) => current = next,
            StepOutcome::Success => return Ok(Status::Success),
            StepOutcome::Partial => return Ok(Status::Partial),
            StepOutcome::Interrupted => return Ok(Status::Interrupted),
            StepOutcome::Backtrack => match backtrack(pattern, state, enc)? {
                BacktrackOutcome::Advance(next) => current = next,
                BacktrackOutcome::Exhausted => return Ok(Status::Failure),
            },
        }
    }
}

// ---------------------------------------------------------------------
// Direction/position helpers
// ---------------------------------------------------------------------

/// The step a leaf node actually takes this attempt: the compiler only
/// ever emits `step = +1` for width-one leaves, so reverse matching
/// (lookbehind, `rsearch`) is carried entirely by `state.reverse` rather
/// than by a per-node negative step (§9's ambient-direction resolution).
fn effective_step(state: &State, node_step: i8) -> i8 {
    if state.reverse {
        -node_step
    } else {
        node_step
    }
}

fn advance_pos(pos: usize, step: i8) -> usize {
    if step >= 0 {
        pos + step as usize
    } else {
        pos - (-step) as usize
    }
}

enum Peek {
    Char(char),
    SliceBoundary,
    EndOfText,
}

/// Look at the next codepoint `step` away from `pos`, distinguishing "ran
/// off the active slice, but more text exists beyond it" (a partial-match
/// candidate) from "ran off the text entirely" (a definite mismatch).
fn peek_char(state: &State, pos: usize, step: i8) -> Peek {
    if step > 0 {
        if pos >= state.slice_end {
            if pos >= state.text_length {
                Peek::EndOfText
            } else {
                Peek::SliceBoundary
            }
        } else {
            Peek::Char(state.text[pos])
        }
    } else if step < 0 {
        if pos <= state.slice_start {
            if pos == 0 {
                Peek::EndOfText
            } else {
                Peek::SliceBoundary
            }
        } else {
            Peek::Char(state.text[pos - 1])
        }
    } else {
        Peek::EndOfText
    }
}

fn insufficient_text(state: &mut State, side: PartialSide) -> StepOutcome {
    if state.allow_partial {
        state.partial_side = side;
        StepOutcome::Partial
    } else {
        StepOutcome::Backtrack
    }
}

fn ignore_case(node: &crate::node::Node) -> bool {
    node.flags.contains(NodeFlags::CASE_INSENSITIVE)
}

fn char_eq(enc: &dyn Encoding, a: char, b: char, ignore_case: bool) -> bool {
    if ignore_case {
        enc.simple_case_fold(a) == enc.simple_case_fold(b)
    } else {
        a == b
    }
}

/// A full-fold comparison, approximated as set-membership rather than
/// true multi-codepoint expansion (the same simplification `stringset.rs`
/// makes for Turkic-I): two codepoints are equal under full case folding
/// if either one's fold set contains the other, or their simple folds
/// agree.
fn char_eq_full(enc: &dyn Encoding, a: char, b: char) -> bool {
    if a == b {
        return true;
    }
    enc.full_case_fold(a).contains(b) || enc.full_case_fold(b).contains(a) || enc.simple_case_fold(a) == enc.simple_case_fold(b)
}

fn range_test(ranges: &[(char, char)], enc: &dyn Encoding, ch: char, ignore_case: bool) -> bool {
    ranges.iter().any(|&(lo, hi)| {
        if ignore_case {
            let folded = enc.simple_case_fold(ch);
            (ch >= lo && ch <= hi) || (folded >= enc.simple_case_fold(lo) && folded <= enc.simple_case_fold(hi))
        } else {
            ch >= lo && ch <= hi
        }
    })
}

/// Evaluate whether `ch` matches the character test carried by node `id`,
/// recursing through `SetUnion`/`SetInter`/`SetDiff`/`SetSymDiff`
/// combinators over child leaf nodes (§6.3's class-combinator opcodes).
fn node_char_test(pattern: &Pattern, id: NodeId, enc: &dyn Encoding, ch: char, ignore_case: bool) -> bool {
    let node = pattern.arena.get(id);
    match node.op {
        Opcode::Any => ch != '\n',
        Opcode::AnyAll => true,
        Opcode::AnyU => !enc.is_line_sep(ch),
        Opcode::Character => match &node.payload {
            Payload::Char(c) => char_eq(enc, ch, *c, ignore_case),
            _ => false,
        },
        Opcode::Property => match &node.payload {
            Payload::Property(p) => enc.has_property(*p, ch),
            _ => false,
        },
        Opcode::Range => match &node.payload {
            Payload::Range(ranges) => range_test(ranges, enc, ch, ignore_case),
            _ => false,
        },
        Opcode::SetUnion => match &node.payload {
            Payload::CharSet(children) => children.iter().any(|&c| node_char_test(pattern, c, enc, ch, ignore_case)),
            _ => false,
        },
        Opcode::SetInter => match &node.payload {
            Payload::CharSet(children) => children.iter().all(|&c| node_char_test(pattern, c, enc, ch, ignore_case)),
            _ => false,
        },
        Opcode::SetDiff => match &node.payload {
            Payload::CharSet(children) => match children.split_first() {
                Some((first, rest)) => {
                    node_char_test(pattern, *first, enc, ch, ignore_case) && !rest.iter().any(|&c| node_char_test(pattern, c, enc, ch, ignore_case))
                }
                None => false,
            },
            _ => false,
        },
        Opcode::SetSymDiff => match &node.payload {
            Payload::CharSet(children) => {
                children.iter().filter(|&&c| node_char_test(pattern, c, enc, ch, ignore_case)).count() % 2 == 1
            }
            _ => false,
        },
        _ => false,
    }
}

fn leaf_matcher_test(test: &LeafMatcher, enc: &dyn Encoding, ch: char, ignore_case: bool) -> bool {
    test.matches(enc, ch, ignore_case)
}

/// Whether `node.op` is one of the single-character tests `node_char_test`
/// understands (everything `*_REPEAT_ONE` can inline as a `LeafMatcher`
/// plus the set-combinator opcodes it can't).
fn is_char_test_opcode(op: Opcode) -> bool {
    matches!(
        op,
        Opcode::Any | Opcode::AnyAll | Opcode::AnyU | Opcode::Character | Opcode::Property | Opcode::Range
            | Opcode::SetUnion | Opcode::SetInter | Opcode::SetDiff | Opcode::SetSymDiff
    )
}

fn literal_match_len(state: &State, pos: usize, chars: &[char], reverse: bool, enc: &dyn Encoding, ignore_case: bool, full_fold: bool) -> Option<usize> {
    let len = chars.len();
    if len == 0 {
        return Some(0);
    }
    let eq = |a: char, b: char| if full_fold { char_eq_full(enc, a, b) } else { char_eq(enc, a, b, ignore_case) };
    if reverse {
        if pos < len || pos < state.slice_start || pos > state.slice_end {
            return None;
        }
        for i in 0..len {
            if !eq(state.text[pos - 1 - i], chars[len - 1 - i]) {
                return None;
            }
        }
    } else {
        if pos + len > state.slice_end {
            return None;
        }
        for i in 0..len {
            if !eq(state.text[pos + i], chars[i]) {
                return None;
            }
        }
    }
    Some(len)
}

fn refgroup_match_len(state: &State, pos: usize, span: Span, reverse: bool, enc: &dyn Encoding, ignore_case: bool, full_fold: bool) -> Option<usize> {
    let len = span.len();
    if len == 0 {
        return Some(0);
    }
    let eq = |a: char, b: char| if full_fold { char_eq_full(enc, a, b) } else { char_eq(enc, a, b, ignore_case) };
    if reverse {
        if pos < len || pos < state.slice_start || pos > state.slice_end {
            return None;
        }
        for i in 0..len {
            if !eq(state.text[pos - 1 - i], state.text[span.end - 1 - i]) {
                return None;
            }
        }
    } else {
        if pos + len > state.slice_end {
            return None;
        }
        for i in 0..len {
            if !eq(state.text[pos + i], state.text[span.start + i]) {
                return None;
            }
        }
    }
    Some(len)
}

fn before_after(state: &State, pos: usize) -> (Option<char>, Option<char>) {
    let before = if pos > 0 { state.text.get(pos - 1).copied() } else { None };
    let after = state.text.get(pos).copied();
    (before, after)
}

// ---------------------------------------------------------------------
// advance: one dispatch step
// ---------------------------------------------------------------------

fn advance(pattern: &Pattern, state: &mut State, enc: &dyn Encoding, id: NodeId) -> Result<StepOutcome> {
    let pos = state.text_pos;
    let node = pattern.arena.get(id);
    let op = node.op;

    if is_char_test_opcode(op) && node.is_fuzzy() && node.fuzzy_section.is_some() {
        return Ok(dispatch_fuzzy_leaf(pattern, state, enc, id, pos));
    }

    match op {
        Opcode::Any | Opcode::AnyAll | Opcode::AnyU | Opcode::Character | Opcode::Property | Opcode::Range
        | Opcode::SetUnion | Opcode::SetInter | Opcode::SetDiff | Opcode::SetSymDiff => {
            let step = effective_step(state, node.step);
            let ic = ignore_case(node);
            match peek_char(state, pos, step) {
                Peek::Char(ch) if node_char_test(pattern, id, enc, ch, ic) => {
                    state.text_pos = advance_pos(pos, step);
                    Ok(StepOutcome::Advance(node.next_1.ok_or_else(|| Error::Internal("leaf node with no successor".into()))?))
                }
                Peek::Char(_) => Ok(StepOutcome::Backtrack),
                Peek::SliceBoundary => Ok(insufficient_text(state, if step > 0 { PartialSide::Right } else { PartialSide::Left })),
                Peek::EndOfText => Ok(StepOutcome::Backtrack),
            }
        }

        Opcode::String | Opcode::StringFld => {
            let chars = match &node.payload {
                Payload::Literal(chars, _) => chars,
                _ => return Err(Error::Internal("String node without Literal payload".into())),
            };
            let reverse = state.reverse;
            let ic = ignore_case(node);
            let full_fold = op == Opcode::StringFld;
            match literal_match_len(state, pos, chars, reverse, enc, ic, full_fold) {
                Some(len) => {
                    state.text_pos = if reverse { pos - len } else { pos + len };
                    Ok(StepOutcome::Advance(node.next_1.ok_or_else(|| Error::Internal("literal node with no successor".into()))?))
                }
                None => {
                    let at_edge = if reverse { pos < chars.len() || pos == state.slice_start } else { pos + chars.len() > state.text_length };
                    if at_edge {
                        Ok(StepOutcome::Backtrack)
                    } else {
                        Ok(insufficient_text(state, if reverse { PartialSide::Left } else { PartialSide::Right }))
                    }
                }
            }
        }

        Opcode::RefGroup | Opcode::RefGroupFld => {
            let group = match &node.payload {
                Payload::RefGroup { group } => *group as usize,
                _ => return Err(Error::Internal("RefGroup node without RefGroup payload".into())),
            };
            let span = state.captures.get(group).span;
            if !span.is_set() {
                // An unset backreference never matches (§DESIGN.md Open Question).
                return Ok(StepOutcome::Backtrack);
            }
            let reverse = state.reverse;
            let ic = ignore_case(node);
            let full_fold = op == Opcode::RefGroupFld;
            match refgroup_match_len(state, pos, span, reverse, enc, ic, full_fold) {
                Some(len) => {
                    state.text_pos = if reverse { pos - len } else { pos + len };
                    Ok(StepOutcome::Advance(node.next_1.ok_or_else(|| Error::Internal("RefGroup node with no successor".into()))?))
                }
                None => {
                    let at_edge = if reverse { pos < span.len() || pos == state.slice_start } else { pos + span.len() > state.text_length };
                    if at_edge {
                        Ok(StepOutcome::Backtrack)
                    } else {
                        Ok(insufficient_text(state, if reverse { PartialSide::Left } else { PartialSide::Right }))
                    }
                }
            }
        }

        Opcode::StringSet | Opcode::StringSetFld => {
            let list_id = match &node.payload {
                Payload::StringSet { list_id, .. } => *list_id,
                _ => return Err(Error::Internal("StringSet node without StringSet payload".into())),
            };
            let name = pattern
                .named_list_indexes
                .get(list_id as usize)
                .ok_or_else(|| Error::Internal("unknown named list id".into()))?;
            let set = pattern
                .named_lists
                .get(name)
                .ok_or_else(|| Error::Internal("named list not found".into()))?;
            // Forward-only: reverse matching over a string set isn't supported
            // (§DESIGN.md simplification), so a StringSet inside a lookbehind
            // always fails to match rather than searching backwards.
            if state.reverse {
                return Ok(StepOutcome::Backtrack);
            }
            let ic = ignore_case(node);
            match set.probe(enc, state.text, pos, ic, state.allow_partial) {
                crate::stringset::StringSetMatch::Full(len) => {
                    state.text_pos = pos + len;
                    Ok(StepOutcome::Advance(node.next_1.ok_or_else(|| Error::Internal("StringSet node with no successor".into()))?))
                }
                crate::stringset::StringSetMatch::Partial => Ok(insufficient_text(state, PartialSide::Right)),
                crate::stringset::StringSetMatch::None => Ok(StepOutcome::Backtrack),
            }
        }

        Opcode::Boundary => {
            let (b, a) = before_after(state, pos);
            dispatch_zero_width(node, enc.at_word_boundary(b, a))
        }
        Opcode::DefaultBoundary => {
            let (b, a) = before_after(state, pos);
            dispatch_zero_width(node, enc.at_default_word_boundary(b, a))
        }
        Opcode::StartOfWord => {
            let (b, a) = before_after(state, pos);
            dispatch_zero_width(node, enc.at_word_start(b, a))
        }
        Opcode::EndOfWord => {
            let (b, a) = before_after(state, pos);
            dispatch_zero_width(node, enc.at_word_end(b, a))
        }
        Opcode::DefaultStartOfWord => {
            let (b, a) = before_after(state, pos);
            dispatch_zero_width(node, enc.at_word_start(b, a))
        }
        Opcode::DefaultEndOfWord => {
            let (b, a) = before_after(state, pos);
            dispatch_zero_width(node, enc.at_word_end(b, a))
        }
        Opcode::GraphemeBoundary => {
            let (b, a) = before_after(state, pos);
            dispatch_zero_width(node, enc.at_grapheme_boundary(b, a))
        }
        Opcode::StartOfLine => {
            let (b, _) = before_after(state, pos);
            dispatch_zero_width(node, enc.at_line_start(b))
        }
        Opcode::EndOfLine => {
            let (_, a) = before_after(state, pos);
            dispatch_zero_width(node, enc.at_line_end(a))
        }
        Opcode::StartOfString => dispatch_zero_width(node, pos == state.slice_start),
        Opcode::EndOfString => dispatch_zero_width(node, pos == state.slice_end),
        Opcode::EndOfStringLine => {
            let at_end = pos == state.slice_end;
            let before_trailing_newline = pos + 1 == state.slice_end && enc.is_line_sep(state.text[pos]);
            dispatch_zero_width(node, at_end || before_trailing_newline)
        }
        Opcode::SearchAnchor => dispatch_zero_width(node, pos == state.search_anchor),

        Opcode::Branch => {
            let alt = node.next_2.ok_or_else(|| Error::Internal("Branch with no alternate".into()))?;
            state.backtrack.push(BacktrackData::Branch { alt, pos })?;
            Ok(StepOutcome::Advance(node.next_1.ok_or_else(|| Error::Internal("Branch with no primary".into()))?))
        }

        Opcode::Next => Ok(StepOutcome::Advance(node.next_1.ok_or_else(|| Error::Internal("Next with no successor".into()))?)),

        Opcode::Group => {
            let (index, capturing, is_end) = match &node.payload {
                Payload::Group { index, capturing, is_end } => (*index as usize, *capturing, *is_end),
                _ => return Err(Error::Internal("Group node without Group payload".into())),
            };
            let _ = capturing;
            if !is_end {
                let prior = state.group_starts[index];
                state.backtrack.push(BacktrackData::GroupStart { index, prior })?;
                state.group_starts[index] = Some(pos);
            } else {
                let start_pos = state.group_starts[index].ok_or_else(|| Error::Internal("END_GROUP with no matching START_GROUP".into()))?;
                let (a, b) = if state.reverse { (pos, start_pos) } else { (start_pos, pos) };
                let group = state.captures.get(index);
                let prior_span = group.span;
                let prior_capture = group.current_capture;
                state.backtrack.push(BacktrackData::Group { index, prior_span, prior_capture })?;
                state.captures.set_span(index, Span::new(a, b));
            }
            Ok(StepOutcome::Advance(node.next_1.ok_or_else(|| Error::Internal("Group with no successor".into()))?))
        }

        Opcode::GroupExists => {
            let group = match &node.payload {
                Payload::GroupExists { group } => *group as usize,
                _ => return Err(Error::Internal("GroupExists node without GroupExists payload".into())),
            };
            let exists = state.captures.get(group).span.is_set();
            if exists {
                Ok(StepOutcome::Advance(node.next_1.ok_or_else(|| Error::Internal("GroupExists with no then-branch".into()))?))
            } else {
                Ok(StepOutcome::Advance(node.next_2.ok_or_else(|| Error::Internal("GroupExists with no else-branch".into()))?))
            }
        }

        Opcode::CallRef => Err(Error::Internal("CallRef should never be reached at runtime".into())),

        Opcode::GroupCall => {
            let call_ref = match &node.payload {
                Payload::GroupCallTarget { call_ref } => *call_ref,
                _ => return Err(Error::Internal("GroupCall node without GroupCallTarget payload".into())),
            };
            if state.group_calls.would_exceed_depth() {
                return Err(Error::Backtracking);
            }
            let target = pattern.call_target(call_ref).ok_or_else(|| Error::Internal("unresolved call-ref target".into()))?;
            let return_node = node.next_1.ok_or_else(|| Error::Internal("GroupCall with no return address".into()))?;
            state.group_calls.push(GroupCallFrame {
                return_node,
                call_ref,
                groups_at_call: state.captures.snapshot(),
                repeats_at_call: state.repeats.snapshot(),
            });
            state.backtrack.push(BacktrackData::GroupCall)?;
            Ok(StepOutcome::Advance(target))
        }

        Opcode::GroupReturn => {
            let frame = state.group_calls.pop().ok_or_else(|| Error::Internal("GroupReturn with no active call".into()))?;
            let groups_before_return = state.captures.snapshot();
            let repeats_before_return = state.repeats.snapshot();
            // Subroutine calls don't export their internal capture/repeat
            // mutations to the caller (§DESIGN.md: treated like an atomic,
            // non-exporting invocation); only the resumed continuation's own
            // subsequent groups mutate caller-visible state from here on.
            state.captures.restore(frame.groups_at_call.clone());
            state.repeats.restore(frame.repeats_at_call.clone());
            let return_node = frame.return_node;
            state.backtrack.push(BacktrackData::GroupReturn { frame, groups_before_return, repeats_before_return })?;
            Ok(StepOutcome::Advance(return_node))
        }

        Opcode::GreedyRepeat => dispatch_greedy_repeat_entry(pattern, state, id, pos),
        Opcode::LazyRepeat => dispatch_lazy_repeat_entry(pattern, state, id, pos),
        Opcode::EndGreedyRepeat => dispatch_end_greedy_repeat(pattern, state, id, pos),
        Opcode::EndLazyRepeat => dispatch_end_lazy_repeat(pattern, state, id, pos),

        Opcode::GreedyRepeatOne => dispatch_greedy_repeat_one(state, enc, id, node, pos),
        Opcode::LazyRepeatOne => dispatch_lazy_repeat_one(state, enc, id, node, pos),

        Opcode::Atomic => dispatch_atomic(pattern, state, enc, id, node),
        Opcode::Lookaround => dispatch_lookaround(pattern, state, enc, id, node),

        Opcode::Fuzzy => Ok(StepOutcome::Advance(node.next_1.ok_or_else(|| Error::Internal("Fuzzy with no successor".into()))?)),
        Opcode::EndFuzzy => {
            let min_spec = match &node.payload {
                Payload::EndFuzzy(spec) => *spec,
                _ => return Err(Error::Internal("EndFuzzy node without EndFuzzy payload".into())),
            };
            let counts = state.fuzzy_info.counts(min_spec.section as usize);
            if counts.meets_minimums(&min_spec) {
                state.fuzzy_info.too_few_errors = false;
                Ok(StepOutcome::Advance(node.next_1.ok_or_else(|| Error::Internal("EndFuzzy with no successor".into()))?))
            } else {
                state.fuzzy_info.too_few_errors = true;
                Ok(StepOutcome::Backtrack)
            }
        }

        Opcode::Success => {
            if state.must_advance && pos == state.search_anchor {
                return Ok(StepOutcome::Backtrack);
            }
            if state.match_all {
                let boundary = if state.reverse { state.slice_start } else { state.slice_end };
                if pos != boundary {
                    return Ok(StepOutcome::Backtrack);
                }
            }
            Ok(StepOutcome::Success)
        }
        Opcode::Failure => Ok(StepOutcome::Backtrack),
        Opcode::End => Err(Error::Internal("End opcode has no runtime node".into())),
    }
}

fn dispatch_zero_width(node: &crate::node::Node, holds: bool) -> Result<StepOutcome> {
    if holds {
        Ok(StepOutcome::Advance(node.next_1.ok_or_else(|| Error::Internal("assertion node with no successor".into()))?))
    } else {
        Ok(StepOutcome::Backtrack)
    }
}

// ---------------------------------------------------------------------
// General (multi-node-body) repeats: §4.5
// ---------------------------------------------------------------------

fn repeat_payload(node: &crate::node::Node) -> Result<(usize, u32, Option<u32>)> {
    match &node.payload {
        Payload::Repeat { index, min, max } => Ok((*index as usize, *min, *max)),
        _ => Err(Error::Internal("repeat node without Repeat payload".into())),
    }
}

fn dispatch_greedy_repeat_entry(pattern: &Pattern, state: &mut State, id: NodeId, pos: usize) -> Result<StepOutcome> {
    let node = pattern.arena.get(id);
    let (index, min, max) = repeat_payload(node)?;
    let cc = state.captures.capture_change();
    *state.repeats.data_mut(index) = RepeatData { count: 0, start: pos, capture_change: cc };
    if max == Some(0) {
        return Ok(StepOutcome::Advance(node.next_2.ok_or_else(|| Error::Internal("repeat with no tail".into()))?));
    }
    if repeat_body_guarded(pattern, state, index, pos) {
        if repeat_tail_guarded(pattern, state, index, pos) {
            return Ok(StepOutcome::Backtrack);
        }
        return Ok(StepOutcome::Advance(node.next_2.ok_or_else(|| Error::Internal("repeat with no tail".into()))?));
    }
    if min == 0 {
        state.backtrack.push(BacktrackData::MatchTail { node: id, pos, count: 0, capture_change: cc })?;
    }
    Ok(StepOutcome::Advance(node.next_1.ok_or_else(|| Error::Internal("repeat with no body".into()))?))
}

fn dispatch_lazy_repeat_entry(pattern: &Pattern, state: &mut State, id: NodeId, pos: usize) -> Result<StepOutcome> {
    let node = pattern.arena.get(id);
    let (index, min, max) = repeat_payload(node)?;
    let cc = state.captures.capture_change();
    *state.repeats.data_mut(index) = RepeatData { count: 0, start: pos, capture_change: cc };
    let _ = max;
    if min == 0 {
        state.backtrack.push(BacktrackData::MatchBody { node: id, pos, count: 0, capture_change: cc })?;
        Ok(StepOutcome::Advance(node.next_2.ok_or_else(|| Error::Internal("repeat with no tail".into()))?))
    } else {
        Ok(StepOutcome::Advance(node.next_1.ok_or_else(|| Error::Internal("repeat with no body".into()))?))
    }
}

/// Whether re-entering this repeat's body at `pos` is already known to be
/// futile. Populated only by the zero-width anti-infinite-loop case in
/// `dispatch_end_*_repeat`, which is the one place re-entry at the same
/// `(index, pos)` is provably deterministic regardless of outer context —
/// same position, same (unchanged) capture_change (§DESIGN.md: a
/// conservative, narrowly-scoped use of the guard store rather than the
/// fuller position-indexed memoisation §4.3 describes). `repeat_tail_guarded`
/// below is the tail-side mirror, populated in the same place.
fn repeat_body_guarded(pattern: &Pattern, state: &State, index: usize, pos: usize) -> bool {
    pattern.repeat_info[index].status.contains(RepeatStatus::BODY_NEEDS_GUARD)
        && state.repeats.guards(index).body_guard_list.is_guarded(pos, true)
}

/// Mirror of `repeat_body_guarded` for the tail side of §4.5's three-way
/// decision ("count >= min and tail-entry isn't guarded: try tail").
fn repeat_tail_guarded(pattern: &Pattern, state: &State, index: usize, pos: usize) -> bool {
    pattern.repeat_info[index].status.contains(RepeatStatus::TAIL_NEEDS_GUARD)
        && state.repeats.guards(index).tail_guard_list.is_guarded(pos, true)
}

fn dispatch_end_greedy_repeat(pattern: &Pattern, state: &mut State, id: NodeId, pos: usize) -> Result<StepOutcome> {
    let node = pattern.arena.get(id);
    let (index, min, max) = repeat_payload(node)?;
    let rd = state.repeats.data(index);
    let new_count = rd.count + 1;
    let cc_now = state.captures.capture_change();
    let made_progress = pos != rd.start || cc_now != rd.capture_change;
    if !made_progress {
        if pattern.repeat_info[index].status.contains(RepeatStatus::BODY_NEEDS_GUARD) {
            state.repeats.guards_mut(index).body_guard_list.insert(pos, pos, true);
        }
        if new_count < min {
            return Ok(StepOutcome::Backtrack);
        }
        if repeat_tail_guarded(pattern, state, index, pos) {
            return Ok(StepOutcome::Backtrack);
        }
        if pattern.repeat_info[index].status.contains(RepeatStatus::TAIL_NEEDS_GUARD) {
            state.repeats.guards_mut(index).tail_guard_list.insert(pos, pos, true);
        }
        return Ok(StepOutcome::Advance(node.next_2.ok_or_else(|| Error::Internal("repeat with no tail".into()))?));
    }
    *state.repeats.data_mut(index) = RepeatData { count: new_count, start: pos, capture_change: cc_now };
    if new_count >= min {
        if max.map_or(true, |m| new_count < m) {
            state.backtrack.push(BacktrackData::MatchTail { node: id, pos, count: new_count, capture_change: cc_now })?;
        }
        Ok(StepOutcome::Advance(node.next_1.ok_or_else(|| Error::Internal("repeat with no body".into()))?))
    } else if max.map_or(true, |m| new_count < m) {
        Ok(StepOutcome::Advance(node.next_1.ok_or_else(|| Error::Internal("repeat with no body".into()))?))
    } else {
        Ok(StepOutcome::Backtrack)
    }
}

fn dispatch_end_lazy_repeat(pattern: &Pattern, state: &mut State, id: NodeId, pos: usize) -> Result<StepOutcome> {
    let node = pattern.arena.get(id);
    let (index, min, max) = repeat_payload(node)?;
    let rd = state.repeats.data(index);
    let new_count = rd.count + 1;
    let cc_now = state.captures.capture_change();
    let made_progress = pos != rd.start || cc_now != rd.capture_change;
    if !made_progress {
        if pattern.repeat_info[index].status.contains(RepeatStatus::BODY_NEEDS_GUARD) {
            state.repeats.guards_mut(index).body_guard_list.insert(pos, pos, true);
        }
        if new_count < min {
            return Ok(StepOutcome::Backtrack);
        }
        if repeat_tail_guarded(pattern, state, index, pos) {
            return Ok(StepOutcome::Backtrack);
        }
        if pattern.repeat_info[index].status.contains(RepeatStatus::TAIL_NEEDS_GUARD) {
            state.repeats.guards_mut(index).tail_guard_list.insert(pos, pos, true);
        }
        return Ok(StepOutcome::Advance(node.next_2.ok_or_else(|| Error::Internal("repeat with no tail".into()))?));
    }
    *state.repeats.data_mut(index) = RepeatData { count: new_count, start: pos, capture_change: cc_now };
    if new_count >= min {
        if max.map_or(true, |m| new_count < m) {
            state.backtrack.push(BacktrackData::MatchBody { node: id, pos, count: new_count, capture_change: cc_now })?;
        }
        Ok(StepOutcome::Advance(node.next_2.ok_or_else(|| Error::Internal("repeat with no tail".into()))?))
    } else {
        Ok(StepOutcome::Advance(node.next_1.ok_or_else(|| Error::Internal("repeat with no body".into()))?))
    }
}

// ---------------------------------------------------------------------
// Single-character-body repeats: §4.3's `*_REPEAT_ONE` collapse
// ---------------------------------------------------------------------

fn repeat_one_payload(node: &crate::node::Node) -> Result<(usize, u32, Option<u32>, &LeafMatcher)> {
    match &node.payload {
        Payload::RepeatOne { index, min, max, test } => Ok((*index as usize, *min, *max, test)),
        _ => Err(Error::Internal("RepeatOne node without RepeatOne payload".into())),
    }
}

/// Consume as many matching characters as `max` allows in one tight loop,
/// pushing one `GreedyRepeatOne` fallback per character consumed beyond
/// `min` (giving back is only ever legal once the mandatory minimum is
/// met) so the backtrack handler can hand characters back one at a time
/// (§4.3's `GREEDY_REPEAT_ONE` collapse).
fn dispatch_greedy_repeat_one(state: &mut State, enc: &dyn Encoding, id: NodeId, node: &crate::node::Node, pos: usize) -> Result<StepOutcome> {
    let (_index, min, max, test) = repeat_one_payload(node)?;
    let step = effective_step(state, node.step);
    let ic = ignore_case(node);
    let max_count = max.unwrap_or(u32::MAX);
    let tail = node.next_1.ok_or_else(|| Error::Internal("RepeatOne with no tail".into()))?;

    let mut p = pos;
    let mut count = 0u32;
    while count < max_count {
        match peek_char(state, p, step) {
            Peek::Char(ch) if leaf_matcher_test(test, enc, ch, ic) => {
                let next_p = advance_pos(p, step);
                count += 1;
                if count > min {
                    state.backtrack.push(BacktrackData::GreedyRepeatOne { node: id, pos: next_p, count })?;
                }
                p = next_p;
            }
            Peek::Char(_) => break,
            Peek::SliceBoundary if count >= min => break,
            Peek::SliceBoundary => {
                state.text_pos = p;
                return Ok(insufficient_text(state, if step > 0 { PartialSide::Right } else { PartialSide::Left }));
            }
            Peek::EndOfText => break,
        }
    }
    if count < min {
        return Ok(StepOutcome::Backtrack);
    }
    state.text_pos = p;
    Ok(StepOutcome::Advance(tail))
}

/// Consume exactly `min` characters mandatorily, then push one fallback
/// per further character tried, lazily, one at a time (§4.3).
fn dispatch_lazy_repeat_one(state: &mut State, enc: &dyn Encoding, id: NodeId, node: &crate::node::Node, pos: usize) -> Result<StepOutcome> {
    let (_index, min, max, test) = repeat_one_payload(node)?;
    let step = effective_step(state, node.step);
    let ic = ignore_case(node);
    let max_count = max.unwrap_or(u32::MAX);
    let tail = node.next_1.ok_or_else(|| Error::Internal("RepeatOne with no tail".into()))?;

    let mut p = pos;
    let mut count = 0u32;
    while count < min {
        match peek_char(state, p, step) {
            Peek::Char(ch) if leaf_matcher_test(test, enc, ch, ic) => {
                p = advance_pos(p, step);
                count += 1;
            }
            Peek::Char(_) => return Ok(StepOutcome::Backtrack),
            Peek::SliceBoundary => {
                state.text_pos = p;
                return Ok(insufficient_text(state, if step > 0 { PartialSide::Right } else { PartialSide::Left }));
            }
            Peek::EndOfText => return Ok(StepOutcome::Backtrack),
        }
    }
    if count < max_count {
        state.backtrack.push(BacktrackData::LazyRepeatOne { node: id, pos: p, count })?;
    }
    state.text_pos = p;
    Ok(StepOutcome::Advance(tail))
}

// ---------------------------------------------------------------------
// Atomic / lookaround: §4.6
// ---------------------------------------------------------------------

fn snapshot_frame(state: &State) -> SavedFrame {
    SavedFrame {
        groups: state.captures.snapshot(),
        repeats: state.repeats.snapshot(),
        fuzzy: state.fuzzy_info.snapshot(),
        capture_change_at_save: state.captures.capture_change(),
        too_few_errors_at_save: state.fuzzy_info.too_few_errors,
    }
}

fn restore_frame(state: &mut State, frame: SavedFrame) {
    state.captures.restore(frame.groups);
    state.repeats.restore(frame.repeats);
    state.fuzzy_info.restore(frame.fuzzy);
    state.fuzzy_info.too_few_errors = frame.too_few_errors_at_save;
}

fn reset_nested(state: &mut State, node: &crate::node::Node) {
    state.repeats.reset_nested(&node.nested_repeats);
    for &section in &node.nested_fuzzy {
        *state.fuzzy_info.counts_mut(section as usize) = FuzzyCounts::new();
    }
}

fn dispatch_atomic(pattern: &Pattern, state: &mut State, enc: &dyn Encoding, id: NodeId, node: &crate::node::Node) -> Result<StepOutcome> {
    if state.sub_depth >= MAX_SUB_DEPTH {
        log::debug!("dispatch_atomic: sub_depth budget ({}) exhausted", MAX_SUB_DEPTH);
        return Err(Error::Internal(format!("max sub-match recursion depth ({}) exceeded", MAX_SUB_DEPTH)));
    }
    let sub_entry = node.next_2.ok_or_else(|| Error::Internal("Atomic with no subpattern".into()))?;
    let tail = node.next_1.ok_or_else(|| Error::Internal("Atomic with no tail".into()))?;
    state.saved.push(snapshot_frame(state));
    let mark = state.backtrack.len();
    state.sub_depth += 1;
    let sub_result = basic_match(pattern, state, enc, sub_entry)?;
    state.sub_depth -= 1;
    match sub_result {
        Status::Success => {
            state.backtrack.truncate(mark);
            reset_nested(state, node);
            state.backtrack.push(BacktrackData::Atomic)?;
            Ok(StepOutcome::Advance(tail))
        }
        Status::Interrupted => Ok(StepOutcome::Interrupted),
        _ => {
            let frame = state.saved.pop().ok_or_else(|| Error::Internal("Atomic: saved-state stack underflow".into()))?;
            restore_frame(state, frame);
            Ok(StepOutcome::Backtrack)
        }
    }
}

fn dispatch_lookaround(pattern: &Pattern, state: &mut State, enc: &dyn Encoding, id: NodeId, node: &crate::node::Node) -> Result<StepOutcome> {
    if state.sub_depth >= MAX_SUB_DEPTH {
        log::debug!("dispatch_lookaround: sub_depth budget ({}) exhausted", MAX_SUB_DEPTH);
        return Err(Error::Internal(format!("max sub-match recursion depth ({}) exceeded", MAX_SUB_DEPTH)));
    }
    let sub_entry = node.next_2.ok_or_else(|| Error::Internal("Lookaround with no subpattern".into()))?;
    let tail = node.next_1.ok_or_else(|| Error::Internal("Lookaround with no tail".into()))?;
    let is_positive = node.is_positive();
    let saved_pos = state.text_pos;
    let saved_reverse = state.reverse;
    state.reverse = node.flags.contains(NodeFlags::REVERSE);
    state.saved.push(snapshot_frame(state));
    let mark = state.backtrack.len();
    state.sub_depth += 1;
    let sub_result = basic_match(pattern, state, enc, sub_entry)?;
    state.sub_depth -= 1;
    state.reverse = saved_reverse;
    state.text_pos = saved_pos;
    state.backtrack.truncate(mark);
    if sub_result == Status::Interrupted {
        state.saved.pop();
        return Ok(StepOutcome::Interrupted);
    }
    let sub_matched = sub_result == Status::Success;
    if sub_matched == is_positive {
        if is_positive {
            reset_nested(state, node);
            state.backtrack.push(BacktrackData::Lookaround)?;
            Ok(StepOutcome::Advance(tail))
        } else {
            let frame = state.saved.pop().ok_or_else(|| Error::Internal("Lookaround: saved-state stack underflow".into()))?;
            restore_frame(state, frame);
            Ok(StepOutcome::Advance(tail))
        }
    } else {
        let frame = state.saved.pop().ok_or_else(|| Error::Internal("Lookaround: saved-state stack underflow".into()))?;
        restore_frame(state, frame);
        Ok(StepOutcome::Backtrack)
    }
}

// ---------------------------------------------------------------------
// Fuzzy leaf transitions: §4.10
// ---------------------------------------------------------------------

fn dispatch_fuzzy_leaf(pattern: &Pattern, state: &mut State, enc: &dyn Encoding, id: NodeId, pos: usize) -> StepOutcome {
    let node = pattern.arena.get(id);
    let section = node.fuzzy_section.expect("checked by caller") as usize;
    let spec = pattern.fuzzy_specs[section];
    let counts_before = state.fuzzy_info.counts(section);
    let step = effective_step(state, node.step);
    let ic = ignore_case(node);
    if let Peek::Char(ch) = peek_char(state, pos, step) {
        if node_char_test(pattern, id, enc, ch, ic) {
            if state.backtrack.push(BacktrackData::FuzzyItem { section, ty: None, node: id, pos, counts_before }).is_err() {
                return StepOutcome::Backtrack;
            }
            state.text_pos = advance_pos(pos, step);
            return StepOutcome::Advance(node.next_1.expect("leaf has successor"));
        }
    }
    try_fuzzy_edit(pattern, state, id, pos, FuzzyType::Substitution, section, &spec, counts_before)
}

/// Cascade through `ty`, `ty.next()`, ... looking for an edit the
/// section's budget still admits, applying the first one that does
/// (§4.10's "SUB→INS→DEL in order").
fn try_fuzzy_edit(
    pattern: &Pattern,
    state: &mut State,
    id: NodeId,
    pos: usize,
    start_ty: FuzzyType,
    section: usize,
    spec: &crate::fuzzy::FuzzySpec,
    counts_before: FuzzyCounts,
) -> StepOutcome {
    let node = pattern.arena.get(id);
    let step = effective_step(state, node.step);
    let max_cost = state.max_cost.min(spec.max_cost);
    let mut ty = Some(start_ty);
    while let Some(t) = ty {
        if counts_before.admits(t, spec, max_cost) {
            match t {
                FuzzyType::Substitution => {
                    if matches!(peek_char(state, pos, step), Peek::Char(_)) {
                        let mut counts = counts_before;
                        counts.apply(t, spec);
                        if state.backtrack.push(BacktrackData::FuzzyItem { section, ty: Some(t), node: id, pos, counts_before }).is_err() {
                            return StepOutcome::Backtrack;
                        }
                        *state.fuzzy_info.counts_mut(section) = counts;
                        state.text_pos = advance_pos(pos, step);
                        return StepOutcome::Advance(node.next_1.expect("leaf has successor"));
                    }
                }
                FuzzyType::Insertion => {
                    // Forbidden at the search anchor (§4.10): admitting an
                    // insertion on the very first character would let the
                    // match trivially extend to the left of where the
                    // search actually started.
                    if pos != state.search_anchor && matches!(peek_char(state, pos, step), Peek::Char(_)) {
                        let mut counts = counts_before;
                        counts.apply(t, spec);
                        if state.backtrack.push(BacktrackData::FuzzyItem { section, ty: Some(t), node: id, pos, counts_before }).is_err() {
                            return StepOutcome::Backtrack;
                        }
                        *state.fuzzy_info.counts_mut(section) = counts;
                        state.text_pos = advance_pos(pos, step);
                        // Insertion consumes a text character the pattern
                        // doesn't account for; retry this same leaf against
                        // the next character instead of advancing past it.
                        return StepOutcome::Advance(id);
                    }
                }
                FuzzyType::Deletion => {
                    let mut counts = counts_before;
                    counts.apply(t, spec);
                    if state.backtrack.push(BacktrackData::FuzzyItem { section, ty: Some(t), node: id, pos, counts_before }).is_err() {
                        return StepOutcome::Backtrack;
                    }
                    *state.fuzzy_info.counts_mut(section) = counts;
                    // Deletion skips this pattern position without consuming
                    // any text.
                    return StepOutcome::Advance(node.next_1.expect("leaf has successor"));
                }
            }
        }
        ty = t.next();
    }
    StepOutcome::Backtrack
}

// ---------------------------------------------------------------------
// backtrack: pop choice points until one yields a node to resume at
// ---------------------------------------------------------------------

fn backtrack(pattern: &Pattern, state: &mut State, enc: &dyn Encoding) -> Result<BacktrackOutcome> {
    loop {
        match state.backtrack.pop() {
            None => return Ok(BacktrackOutcome::Exhausted),
            Some(data) => match handle_backtrack(pattern, state, enc, data)? {
                Some(next) => return Ok(BacktrackOutcome::Advance(next)),
                None => continue,
            },
        }
    }
}

fn handle_backtrack(pattern: &Pattern, state: &mut State, enc: &dyn Encoding, data: BacktrackData) -> Result<Option<NodeId>> {
    match data {
        BacktrackData::Branch { alt, pos } => {
            state.text_pos = pos;
            Ok(Some(alt))
        }
        BacktrackData::Group { index, prior_span, prior_capture } => {
            state.captures.unset_span(index, prior_span, prior_capture);
            Ok(None)
        }
        BacktrackData::GroupStart { index, prior } => {
            state.group_starts[index] = prior;
            Ok(None)
        }
        BacktrackData::MatchTail { node, pos, count, capture_change } => {
            let (index, _min, _max) = repeat_payload(pattern.arena.get(node))?;
            *state.repeats.data_mut(index) = RepeatData { count, start: pos, capture_change };
            state.text_pos = pos;
            Ok(Some(pattern.arena.get(node).next_2.ok_or_else(|| Error::Internal("repeat with no tail".into()))?))
        }
        BacktrackData::MatchBody { node, pos, count, capture_change } => {
            let (index, _min, _max) = repeat_payload(pattern.arena.get(node))?;
            *state.repeats.data_mut(index) = RepeatData { count, start: pos, capture_change };
            state.text_pos = pos;
            Ok(Some(pattern.arena.get(node).next_1.ok_or_else(|| Error::Internal("repeat with no body".into()))?))
        }
        BacktrackData::GreedyRepeatOne { node, pos, count } => {
            let n = pattern.arena.get(node);
            let step = effective_step(state, n.step);
            let back_pos = advance_pos(pos, -step);
            let _ = count;
            state.text_pos = back_pos;
            Ok(Some(n.next_1.ok_or_else(|| Error::Internal("RepeatOne with no tail".into()))?))
        }
        BacktrackData::LazyRepeatOne { node, pos, count } => {
            let n = pattern.arena.get(node);
            let (_index, _min, max, test) = repeat_one_payload(n)?;
            let step = effective_step(state, n.step);
            let max_count = max.unwrap_or(u32::MAX);
            match peek_char(state, pos, step) {
                Peek::Char(ch) if leaf_matcher_test(test, enc, ch, ignore_case(n)) && count < max_count => {
                    let new_pos = advance_pos(pos, step);
                    let new_count = count + 1;
                    if new_count < max_count {
                        state.backtrack.push(BacktrackData::LazyRepeatOne { node, pos: new_pos, count: new_count })?;
                    }
                    state.text_pos = new_pos;
                    Ok(Some(n.next_1.ok_or_else(|| Error::Internal("RepeatOne with no tail".into()))?))
                }
                _ => Ok(None),
            }
        }
        BacktrackData::Atomic => {
            let frame = state.saved.pop().ok_or_else(|| Error::Internal("Atomic backtrack: saved-state stack underflow".into()))?;
            restore_frame(state, frame);
            Ok(None)
        }
        BacktrackData::Lookaround => {
            let frame = state.saved.pop().ok_or_else(|| Error::Internal("Lookaround backtrack: saved-state stack underflow".into()))?;
            restore_frame(state, frame);
            Ok(None)
        }
        BacktrackData::GroupCall => {
            state.group_calls.pop();
            Ok(None)
        }
        BacktrackData::GroupReturn { frame, groups_before_return, repeats_before_return } => {
            state.captures.restore(groups_before_return);
            state.repeats.restore(repeats_before_return);
            state.group_calls.push(frame);
            Ok(None)
        }
        BacktrackData::FuzzyItem { section, ty, node, pos, counts_before } => {
            *state.fuzzy_info.counts_mut(section) = counts_before;
            let next_ty = match ty {
                None => Some(FuzzyType::Substitution),
                Some(t) => t.next(),
            };
            match next_ty {
                Some(t) => {
                    let spec = pattern.fuzzy_specs[section];
                    match try_fuzzy_edit(pattern, state, node, pos, t, section, &spec, counts_before) {
                        StepOutcome::Advance(n) => Ok(Some(n)),
                        _ => Ok(None),
                    }
                }
                None => Ok(None),
            }
        }
        BacktrackData::FuzzyInsertExtend { .. } => {
            // Not produced by this driver; a fuller implementation would use
            // this to let a trailing insertion run extend past a single
            // leaf's retry instead of only substituting/deleting at each
            // position independently (§DESIGN.md).
            Ok(None)
        }
        BacktrackData::SearchAdvance { step } => {
            let next_pos = if step >= 0 { state.match_pos.checked_add(step as usize) } else { state.match_pos.checked_sub((-step) as usize) };
            let next_pos = match next_pos {
                Some(p) => p,
                None => return Ok(None),
            };
            let in_range = if step >= 0 { next_pos <= state.slice_end } else { next_pos >= state.slice_start };
            if !in_range {
                return Ok(None);
            }
            state.match_pos = next_pos;
            state.text_pos = next_pos;
            state.search_anchor = next_pos;
            state.captures.reset();
            state.repeats.reset_all();
            state.fuzzy_info.reset();
            while state.group_calls.pop().is_some() {}
            state.backtrack.push(BacktrackData::SearchAdvance { step })?;
            Ok(Some(pattern.start_node))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Span;
    use crate::encoding::Ascii;
    use crate::node::{Node, NodeArena};
    use crate::opcode::Flags;
    use crate::pattern::{EncodingKind, GroupInfo, Pattern};
    use crate::state::{CancelFlag, State};
    use std::collections::HashMap;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    fn empty_pattern(arena: NodeArena, start_node: NodeId, true_group_count: usize) -> Pattern {
        Pattern {
            arena,
            start_node,
            start_test: None,
            true_group_count,
            public_group_count: true_group_count,
            group_end_index_max: -1,
            group_info: (0..true_group_count).map(|_| GroupInfo::default()).collect(),
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
            group_index: HashMap::new(),
            index_group: HashMap::new(),
        }
    }

    /// `a` then `Success`: the simplest possible program.
    #[test]
    fn matches_single_character() {
        let mut arena = NodeArena::new();
        let success = arena.push(Node::new(Opcode::Success));
        let mut a = Node::new(Opcode::Character).with_step(1).with_payload(Payload::Char('a'));
        a.next_1 = Some(success);
        let a = arena.push(a);
        let pattern = empty_pattern(arena, a, 0);

        let text = chars("a");
        let mut state = State::new(&text, crate::cursor::Width::One, 0, 0, 0, CancelFlag::new());
        state.init_match(0, text.len(), false);
        let status = run(&pattern, &mut state, &Ascii, true).unwrap();
        assert_eq!(status, Status::Success);
        assert_eq!(state.text_pos, 1);
    }

    #[test]
    fn branch_backtracks_to_second_alternative() {
        let mut arena = NodeArena::new();
        let success = arena.push(Node::new(Opcode::Success));
        let mut b = Node::new(Opcode::Character).with_step(1).with_payload(Payload::Char('b'));
        b.next_1 = Some(success);
        let b = arena.push(b);
        let mut a = Node::new(Opcode::Character).with_step(1).with_payload(Payload::Char('a'));
        a.next_1 = Some(success);
        let a = arena.push(a);
        let mut branch = Node::new(Opcode::Branch);
        branch.next_1 = Some(a);
        branch.next_2 = Some(b);
        let branch = arena.push(branch);
        let pattern = empty_pattern(arena, branch, 0);

        let text = chars("b");
        let mut state = State::new(&text, crate::cursor::Width::One, 0, 0, 0, CancelFlag::new());
        state.init_match(0, text.len(), false);
        let status = run(&pattern, &mut state, &Ascii, true).unwrap();
        assert_eq!(status, Status::Success);
        assert_eq!(state.text_pos, 1);
    }

    #[test]
    fn search_advance_finds_match_past_start() {
        let mut arena = NodeArena::new();
        let success = arena.push(Node::new(Opcode::Success));
        let mut x = Node::new(Opcode::Character).with_step(1).with_payload(Payload::Char('x'));
        x.next_1 = Some(success);
        let x = arena.push(x);
        let pattern = empty_pattern(arena, x, 0);

        let text = chars("aax");
        let mut state = State::new(&text, crate::cursor::Width::One, 0, 0, 0, CancelFlag::new());
        state.init_match(0, text.len(), false);
        let status = run(&pattern, &mut state, &Ascii, false).unwrap();
        assert_eq!(status, Status::Success);
        assert_eq!(state.match_pos, 2);
        assert_eq!(state.text_pos, 3);
    }

    #[test]
    fn group_records_span_and_unwinds_on_backtrack() {
        let mut arena = NodeArena::new();
        let fail = arena.push(Node::new(Opcode::Failure));
        let mut end = Node::new(Opcode::Group).with_payload(Payload::Group { index: 0, capturing: true, is_end: true });
        end.next_1 = Some(fail);
        let end = arena.push(end);
        let mut a = Node::new(Opcode::Character).with_step(1).with_payload(Payload::Char('a'));
        a.next_1 = Some(end);
        let a = arena.push(a);
        let mut start = Node::new(Opcode::Group).with_payload(Payload::Group { index: 0, capturing: true, is_end: false });
        start.next_1 = Some(a);
        let start = arena.push(start);
        let pattern = empty_pattern(arena, start, 1);

        let text = chars("a");
        let mut state = State::new(&text, crate::cursor::Width::One, 1, 0, 0, CancelFlag::new());
        state.init_match(0, text.len(), false);
        let status = run(&pattern, &mut state, &Ascii, true).unwrap();
        assert_eq!(status, Status::Failure);
        // The whole attempt failed, so END_GROUP's span record must have
        // been unwound again.
        assert!(!state.captures.get(0).span.is_set());
    }
}
