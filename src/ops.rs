// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The match driver's top-level operations (component J, §6.2): the public
//! entry points a host builds `match`/`search`/`findall`/`split`/`sub` out
//! of. Everything here is a thin, allocation-light wrapper around
//! `driver::run`/`driver::basic_match` plus two pieces of control flow the
//! driver itself doesn't own: the required-string prefilter (§4.8) and the
//! BESTMATCH/ENHANCEMATCH retry loop (§4.4), both of which need to call the
//! driver more than once per logical operation.

use crate::capture::Span;
use crate::cursor::Width;
use crate::driver;
use crate::encoding::Encoding;
use crate::error::{Error, Result, Status};
use crate::literals;
use crate::node::Payload;
use crate::opcode::Flags;
use crate::pattern::{MatchOptions, Pattern};
use crate::result::MatchResult;
use crate::state::{CancelFlag, State};

fn new_state<'t>(pattern: &Pattern, text: &'t [char], cancel: CancelFlag) -> State<'t> {
    // `State` works over decoded `char`s regardless of the host's original
    // code-unit width (§4.2's cursor comment), so `Width` only matters to
    // components that haven't been written against this crate; `Four`
    // covers every codepoint uniformly.
    State::new(text, Width::Four, pattern.true_group_count, pattern.repeat_count, pattern.fuzzy_count, cancel)
}

fn bounds(text_len: usize, opts: &MatchOptions) -> Result<(usize, usize)> {
    let endpos = opts.endpos.unwrap_or(text_len);
    if opts.pos > text_len || endpos > text_len || opts.pos > endpos {
        return Err(Error::Index);
    }
    Ok((opts.pos, endpos))
}

/// The required-string prefilter (§4.8): before searching, check whether
/// the pattern's required literal occurs at all in the remaining slice. If
/// it doesn't, no anchored attempt anywhere in the slice can succeed. If it
/// does, the earliest an overall match could begin is the literal's offset
/// back from its first occurrence — any earlier starting position was
/// already ruled out by that same search having found nothing sooner.
///
/// A no-op (returns `Ok(true)` without touching `state`) when the pattern
/// has no required string, the search is anchored, or matching runs in
/// reverse — the reverse case is left to a plain unanchored search rather
/// than mirroring this logic, since `req_offset` is defined relative to
/// forward match order.
fn apply_required_prefilter(pattern: &Pattern, state: &mut State, enc: &dyn Encoding) -> Result<bool> {
    let Some(req_node) = pattern.req_string_node else { return Ok(true) };
    if state.reverse {
        return Ok(true);
    }
    let node = pattern.arena.get(req_node);
    let Payload::Literal(ref chars, ref bm) = node.payload else { return Ok(true) };
    if chars.is_empty() {
        return Ok(true);
    }
    let case_insensitive = node.flags.contains(crate::opcode::NodeFlags::CASE_INSENSITIVE);
    let text = &state.text[..state.slice_end];
    let found = match bm {
        Some(table) => table.search(enc, text, state.search_anchor),
        None => literals::simple_search(enc, text, state.search_anchor, chars, case_insensitive),
    };
    let Some(found_pos) = found else { return Ok(false) };
    if pattern.req_offset >= 0 {
        let earliest = found_pos.saturating_sub(pattern.req_offset as usize);
        if earliest > state.search_anchor {
            state.search_anchor = earliest;
            state.text_pos = earliest;
            state.match_pos = earliest;
        }
    }
    Ok(true)
}

/// Run one logical top-level attempt, including the BESTMATCH/ENHANCEMATCH
/// retry loop (§4.4): once a first match is found under those flags, keep
/// re-running at the same start position with a tightened bound — a
/// strictly lower cost budget for BESTMATCH, a narrowed slice for
/// ENHANCEMATCH — keeping the best (last successful) result, until a retry
/// fails to improve on it.
pub(crate) fn run_top_level(pattern: &Pattern, state: &mut State, enc: &dyn Encoding, anchored: bool) -> Result<Status> {
    if !anchored && !apply_required_prefilter(pattern, state, enc)? {
        return Ok(Status::Failure);
    }

    let status = driver::run(pattern, state, enc, anchored)?;
    if status != Status::Success {
        return Ok(status);
    }
    if !pattern.flags.intersects(Flags::BESTMATCH | Flags::ENHANCEMATCH) {
        return Ok(Status::Success);
    }

    let start_pos = if state.reverse { state.text_pos } else { state.match_pos };
    let mut best_match_pos = state.match_pos;
    let mut best_text_pos = state.text_pos;
    let mut best_captures = state.captures.snapshot();
    let mut best_fuzzy = state.fuzzy_info.snapshot();
    let mut best_cost = state.fuzzy_info.totals().3;

    loop {
        if pattern.flags.contains(Flags::BESTMATCH) {
            if best_cost == 0 {
                break;
            }
        }
        let saved_slice = (state.slice_start, state.slice_end);
        if pattern.flags.contains(Flags::ENHANCEMATCH) && !pattern.flags.contains(Flags::BESTMATCH) {
            // Narrow the slice so a retry is forced to find a match no
            // longer than the one just found, preferring shorter spans.
            if state.reverse {
                state.slice_start = best_match_pos.saturating_add(1).min(state.slice_end);
            } else {
                state.slice_end = best_text_pos.saturating_sub(1).max(state.slice_start);
            }
        }

        state.text_pos = start_pos;
        state.match_pos = start_pos;
        for g in &mut state.group_starts {
            *g = None;
        }
        state.sub_depth = 0;
        state.captures.reset();
        state.repeats.reset_all();
        state.fuzzy_info.reset();
        state.backtrack.truncate(0);
        while state.group_calls.pop().is_some() {}
        if pattern.flags.contains(Flags::BESTMATCH) {
            state.max_cost = best_cost.saturating_sub(1);
        }

        let retry_status = driver::run(pattern, state, enc, true)?;
        state.slice_start = saved_slice.0;
        state.slice_end = saved_slice.1;

        match retry_status {
            Status::Success => {
                let cost = state.fuzzy_info.totals().3;
                best_match_pos = state.match_pos;
                best_text_pos = state.text_pos;
                best_captures = state.captures.snapshot();
                best_fuzzy = state.fuzzy_info.snapshot();
                best_cost = cost;
            }
            Status::Interrupted => return Ok(Status::Interrupted),
            _ => break,
        }
    }

    state.match_pos = best_match_pos;
    state.text_pos = best_text_pos;
    state.captures.restore(best_captures);
    state.fuzzy_info.restore(best_fuzzy);
    Ok(Status::Success)
}

/// §6.2 `match`: an anchored attempt at `opts.pos`.
pub fn match_<'p, 't>(
    pattern: &'p Pattern,
    enc: &dyn Encoding,
    text: &'t [char],
    opts: MatchOptions,
) -> Result<Option<MatchResult<'p>>> {
    let (pos, endpos) = bounds(text.len(), &opts)?;
    let mut state = new_state(pattern, text, CancelFlag::new());
    state.set_allow_partial(opts.partial);
    let reverse = pattern.flags.contains(Flags::REVERSE);
    state.init_match(pos, endpos, reverse);
    state.slice_start = pos;
    state.slice_end = endpos;
    match run_top_level(pattern, &mut state, enc, true)? {
        Status::Success => Ok(Some(MatchResult::from_state(pattern, &state, pos, endpos))),
        Status::Partial => Ok(Some(MatchResult::from_state(pattern, &state, pos, endpos))),
        Status::Failure => Ok(None),
        Status::Interrupted => Err(Error::Interrupted),
    }
}

/// §6.2 `fullmatch`: like `match_`, but only a match that consumes the
/// entire `[pos, endpos)` slice counts — the far end opposite the anchor
/// (`endpos` going forward, `pos` under `Flags::REVERSE`).
pub fn fullmatch<'p, 't>(
    pattern: &'p Pattern,
    enc: &dyn Encoding,
    text: &'t [char],
    opts: MatchOptions,
) -> Result<Option<MatchResult<'p>>> {
    let (pos, endpos) = bounds(text.len(), &opts)?;
    let reverse = pattern.flags.contains(Flags::REVERSE);
    match match_(pattern, enc, text, opts)? {
        Some(result) if (!reverse && result.match_end == endpos) || (reverse && result.match_start == pos) => Ok(Some(result)),
        _ => Ok(None),
    }
}

/// §6.2 `search`: an unanchored scan from `opts.pos` to `opts.endpos`.
pub fn search<'p, 't>(
    pattern: &'p Pattern,
    enc: &dyn Encoding,
    text: &'t [char],
    opts: MatchOptions,
) -> Result<Option<MatchResult<'p>>> {
    let (pos, endpos) = bounds(text.len(), &opts)?;
    let mut state = new_state(pattern, text, CancelFlag::new());
    state.set_allow_partial(opts.partial);
    let reverse = pattern.flags.contains(Flags::REVERSE);
    state.init_match(pos, endpos, reverse);
    state.slice_start = pos;
    state.slice_end = endpos;
    match run_top_level(pattern, &mut state, enc, opts.anchored)? {
        Status::Success | Status::Partial => Ok(Some(MatchResult::from_state(pattern, &state, pos, endpos))),
        Status::Failure => Ok(None),
        Status::Interrupted => Err(Error::Interrupted),
    }
}

/// One match from `findall`/`finditer` (§6.2): either the whole match (a
/// pattern with no groups) or the tuple of its public groups, mirroring
/// Python's `re.findall` result shape rather than always handing back a
/// full `MatchResult`.
#[derive(Clone, Debug)]
pub enum FindallItem {
    Whole(Span),
    Groups(Vec<Option<Span>>),
}

impl FindallItem {
    fn from_result(pattern: &Pattern, result: &MatchResult) -> Self {
        if pattern.public_group_count == 0 {
            FindallItem::Whole(result.span())
        } else {
            FindallItem::Groups((1..=pattern.public_group_count).map(|i| result.group(i)).collect())
        }
    }
}

/// §6.2 `findall`: every non-overlapping (or, with `overlapped`, every
/// overlapping) match in `[pos, endpos)`.
pub fn findall<'p, 't>(
    pattern: &'p Pattern,
    enc: &dyn Encoding,
    text: &'t [char],
    opts: MatchOptions,
    overlapped: bool,
) -> Result<Vec<FindallItem>> {
    let mut out = Vec::new();
    for_each_match(pattern, enc, text, opts, overlapped, |_pattern, result| {
        out.push(FindallItem::from_result(pattern, result));
        Ok(())
    })?;
    Ok(out)
}

/// Drive repeated `search` calls over `[pos, endpos)`, advancing past each
/// match, invoking `f` on every match found. Shared by `findall` and the
/// iterator adapters in `scanner.rs`.
///
/// A zero-width match doesn't move `cursor` on its own; instead the next
/// iteration's `state.must_advance` is set, so the driver's own `Success`
/// dispatch (§4.4) refuses to stop at the same `search_anchor` again and
/// falls through to the internal `SearchAdvance` retry at the next position
/// (§6.4) — the scan-always-progresses guarantee lives inside the engine
/// rather than as an external cursor bump.
pub(crate) fn for_each_match<'p, 't>(
    pattern: &'p Pattern,
    enc: &dyn Encoding,
    text: &'t [char],
    opts: MatchOptions,
    overlapped: bool,
    mut f: impl FnMut(&'p Pattern, &MatchResult<'p>) -> Result<()>,
) -> Result<()> {
    let (left, right) = bounds(text.len(), &opts)?;
    let reverse = pattern.flags.contains(Flags::REVERSE);
    let mut cursor = if reverse { right } else { left };
    let mut state = new_state(pattern, text, CancelFlag::new());
    state.set_allow_partial(false);
    state.overlapped = overlapped;
    let mut must_advance = false;
    loop {
        let (pos, endpos) = if reverse { (left, cursor) } else { (cursor, right) };
        if pos > endpos {
            break;
        }
        state.init_match(pos, endpos, reverse);
        state.slice_start = left;
        state.slice_end = right;
        state.must_advance = must_advance;
        match run_top_level(pattern, &mut state, enc, false)? {
            Status::Success => {
                let result = MatchResult::from_state(pattern, &state, pos, endpos);
                f(pattern, &result)?;
                // Overlapped mode advances the anchor by exactly one code
                // unit regardless of match width (§6.4), so its next
                // attempt never re-lands on the same search_anchor and
                // doesn't need `must_advance`'s help.
                must_advance = !overlapped && result.match_end == result.match_start;
                let next_cursor = if reverse {
                    if overlapped { result.match_end.saturating_sub(1) } else { result.match_start }
                } else if overlapped {
                    result.match_start + 1
                } else {
                    result.match_end
                };
                // Overlapped reverse mode has no `must_advance` backstop, so
                // a match pinned at `left` (where `saturating_sub` has
                // nowhere further to go) needs an explicit exhaustion check
                // to avoid re-finding the same match forever.
                if overlapped && reverse && next_cursor >= cursor {
                    break;
                }
                cursor = next_cursor;
            }
            Status::Failure | Status::Partial => break,
            Status::Interrupted => return Err(Error::Interrupted),
        }
    }
    Ok(())
}

/// §6.2 `split`: cut `text` at every non-overlapping match, per
/// `version_1` semantics (a zero-width match still splits, then the scan
/// advances by one position — the "version_0 vs version_1" Open Question
/// decided in `DESIGN.md`). `maxsplit == 0` means unlimited.
pub fn split<'p, 't>(
    pattern: &'p Pattern,
    enc: &dyn Encoding,
    text: &'t [char],
    maxsplit: usize,
) -> Result<Vec<String>> {
    let mut pieces = Vec::new();
    let mut last_end = 0usize;
    let mut splits = 0usize;
    let opts = MatchOptions::default();
    for_each_match(pattern, enc, text, opts, false, |p, result| {
        if maxsplit != 0 && splits >= maxsplit {
            return Ok(());
        }
        pieces.push(text[last_end..result.match_start].iter().collect());
        for i in 1..=p.public_group_count {
            if let Some(span) = result.group(i) {
                pieces.push(text[span.start..span.end].iter().collect());
            } else {
                pieces.push(String::new());
            }
        }
        last_end = result.match_end;
        splits += 1;
        Ok(())
    })?;
    pieces.push(text[last_end..].iter().collect());
    Ok(pieces)
}

/// A parsed substitution template: a sequence of literal runs and group
/// references (§6.2 `sub`'s `\1`/`\g<name>` syntax).
enum TemplatePiece {
    Literal(String),
    Group(GroupRef),
}

enum GroupRef {
    Index(usize),
    Name(String),
}

fn parse_template(template: &str) -> Result<Vec<TemplatePiece>> {
    let mut out = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            literal.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some(d) if d.is_ascii_digit() => {
                if !literal.is_empty() {
                    out.push(TemplatePiece::Literal(std::mem::take(&mut literal)));
                }
                let mut digits = String::new();
                while let Some(d) = chars.peek().copied() {
                    if d.is_ascii_digit() {
                        digits.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let idx: usize = digits.parse().map_err(|_| Error::Replacement(format!("\\{}", digits)))?;
                out.push(TemplatePiece::Group(GroupRef::Index(idx)));
            }
            Some('g') => {
                chars.next();
                if chars.peek() != Some(&'<') {
                    return Err(Error::Replacement("expected '<' after \\g".to_string()));
                }
                chars.next();
                let mut name = String::new();
                for d in chars.by_ref() {
                    if d == '>' {
                        break;
                    }
                    name.push(d);
                }
                if !literal.is_empty() {
                    out.push(TemplatePiece::Literal(std::mem::take(&mut literal)));
                }
                if let Ok(idx) = name.parse::<usize>() {
                    out.push(TemplatePiece::Group(GroupRef::Index(idx)));
                } else {
                    out.push(TemplatePiece::Group(GroupRef::Name(name)));
                }
            }
            Some('\\') => {
                chars.next();
                literal.push('\\');
            }
            Some(other) => {
                chars.next();
                literal.push(other);
            }
            None => return Err(Error::Replacement("dangling backslash".to_string())),
        }
    }
    if !literal.is_empty() {
        out.push(TemplatePiece::Literal(literal));
    }
    Ok(out)
}

fn render_template(pieces: &[TemplatePiece], text: &[char], result: &MatchResult) -> Result<String> {
    let mut out = String::new();
    for piece in pieces {
        match piece {
            TemplatePiece::Literal(s) => out.push_str(s),
            TemplatePiece::Group(GroupRef::Index(idx)) => {
                let span = result.group(*idx).ok_or(Error::InvalidGroupRef(*idx as i64))?;
                out.extend(text[span.start..span.end].iter());
            }
            TemplatePiece::Group(GroupRef::Name(name)) => {
                let span = result.name(name).ok_or_else(|| Error::NoSuchGroup(name.clone()))?;
                out.extend(text[span.start..span.end].iter());
            }
        }
    }
    Ok(out)
}

/// §6.2 `subn`: substitute up to `count` matches (`0` for unlimited) using
/// a `\1`/`\g<name>` template, returning the result and how many
/// substitutions were made.
pub fn subn<'p, 't>(
    pattern: &'p Pattern,
    enc: &dyn Encoding,
    text: &'t [char],
    template: &str,
    count: usize,
) -> Result<(String, usize)> {
    let pieces = parse_template(template)?;
    subfn_with(pattern, enc, text, count, |result| render_template(&pieces, text, result))
}

/// §6.2 `sub`: `subn` discarding the substitution count.
pub fn sub<'p, 't>(pattern: &'p Pattern, enc: &dyn Encoding, text: &'t [char], template: &str, count: usize) -> Result<String> {
    Ok(subn(pattern, enc, text, template, count)?.0)
}

/// §6.2 `subfn`: like `subn`, but the replacement is computed by a host
/// closure given the full `MatchResult` rather than a template string —
/// the natural Rust shape for what the spec's "format"-string replacement
/// variant (`subf`) would otherwise need a second mini-language for.
pub fn subfn_with<'p, 't>(
    pattern: &'p Pattern,
    enc: &dyn Encoding,
    text: &'t [char],
    count: usize,
    mut replace: impl FnMut(&MatchResult<'p>) -> Result<String>,
) -> Result<(String, usize)> {
    let mut out = String::new();
    let mut last_end = 0usize;
    let mut made = 0usize;
    let opts = MatchOptions::default();
    for_each_match(pattern, enc, text, opts, false, |_p, result| {
        if count != 0 && made >= count {
            return Ok(());
        }
        out.extend(text[last_end..result.match_start].iter());
        out.push_str(&replace(result)?);
        last_end = result.match_end;
        made += 1;
        Ok(())
    })?;
    out.extend(text[last_end..].iter());
    Ok((out, made))
}

/// §6.2 `subf`: `subfn_with` discarding the substitution count.
pub fn subf<'p, 't>(
    pattern: &'p Pattern,
    enc: &dyn Encoding,
    text: &'t [char],
    replace: impl FnMut(&MatchResult<'p>) -> Result<String>,
) -> Result<String> {
    Ok(subfn_with(pattern, enc, text, 0, replace)?.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Ascii;
    use crate::node::{Node, Payload};
    use crate::opcode::Opcode;

    // `a(b)c`, written directly out of nodes the way `driver.rs`'s own
    // tests build fixtures, avoiding a dependency on any higher-level
    // compiler frontend. The single capturing group is internal array
    // index 0 (matching `driver.rs`'s own `Group` payload convention),
    // which `group_index`/`index_group` expose to callers as public group
    // number 1 under the name "mid".
    fn pattern_abc() -> Pattern {
        use crate::node::NodeArena;
        let mut arena = NodeArena::new();
        let success = arena.push(Node::new(Opcode::Success));
        let end_group = {
            let mut n = Node::new(Opcode::Group).with_payload(Payload::Group { index: 0, capturing: true, is_end: true });
            n.next_1 = Some(success);
            arena.push(n)
        };
        let c = {
            let mut n = Node::new(Opcode::Character).with_step(1).with_payload(Payload::Char('c'));
            n.next_1 = Some(end_group);
            arena.push(n)
        };
        let b = {
            let mut n = Node::new(Opcode::Character).with_step(1).with_payload(Payload::Char('b'));
            n.next_1 = Some(c);
            arena.push(n)
        };
        let start_group = {
            let mut n = Node::new(Opcode::Group).with_payload(Payload::Group { index: 0, capturing: true, is_end: false });
            n.next_1 = Some(b);
            arena.push(n)
        };
        let a = {
            let mut n = Node::new(Opcode::Character).with_step(1).with_payload(Payload::Char('a'));
            n.next_1 = Some(start_group);
            arena.push(n)
        };

        let mut group_index = std::collections::HashMap::new();
        group_index.insert("mid".to_string(), 1u32);
        let mut index_group = std::collections::HashMap::new();
        index_group.insert(1u32, "mid".to_string());

        Pattern {
            arena,
            start_node: a,
            start_test: None,
            true_group_count: 1,
            public_group_count: 1,
            group_end_index_max: 1,
            group_info: Vec::new(),
            call_ref_info: std::collections::HashMap::new(),
            repeat_info: Vec::new(),
            repeat_count: 0,
            fuzzy_count: 0,
            fuzzy_specs: Vec::new(),
            min_width: 3,
            is_fuzzy: false,
            do_search_start: true,
            req_string_node: None,
            req_offset: 0,
            encoding: crate::pattern::EncodingKind::Ascii,
            flags: Flags::empty(),
            named_lists: std::collections::HashMap::new(),
            named_list_indexes: Vec::new(),
            pattern_call_ref: None,
            group_index,
            index_group,
        }
    }

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn search_finds_match_past_start_and_captures_group() {
        let pattern = pattern_abc();
        let text = chars("xx abc yy");
        let result = search(&pattern, &Ascii, &text, MatchOptions::default()).unwrap().unwrap();
        assert_eq!(result.span(), Span::new(3, 6));
        assert_eq!(result.group(1), Some(Span::new(4, 5)));
        assert_eq!(result.name("mid"), Some(Span::new(4, 5)));
    }

    #[test]
    fn match_requires_anchor_at_pos() {
        let pattern = pattern_abc();
        let text = chars("xabc");
        assert!(match_(&pattern, &Ascii, &text, MatchOptions::default()).unwrap().is_none());
        let opts = MatchOptions { pos: 1, ..MatchOptions::default() };
        assert!(match_(&pattern, &Ascii, &text, opts).unwrap().is_some());
    }

    #[test]
    fn findall_collects_every_non_overlapping_match() {
        let pattern = pattern_abc();
        let text = chars("abc abc abc");
        let matches = findall(&pattern, &Ascii, &text, MatchOptions::default(), false).unwrap();
        assert_eq!(matches.len(), 3);
    }

    #[test]
    fn split_cuts_around_each_match_and_its_group() {
        let pattern = pattern_abc();
        let text = chars("1abc2abc3");
        let pieces = split(&pattern, &Ascii, &text, 0).unwrap();
        assert_eq!(pieces, vec!["1", "b", "2", "b", "3"]);
    }

    #[test]
    fn sub_substitutes_group_reference() {
        let pattern = pattern_abc();
        let text = chars("abc");
        let out = sub(&pattern, &Ascii, &text, r"[\1]", 0).unwrap();
        assert_eq!(out, "[b]");
    }

    #[test]
    fn subn_reports_replacement_count() {
        let pattern = pattern_abc();
        let text = chars("abc abc");
        let (out, n) = subn(&pattern, &Ascii, &text, "X", 0).unwrap();
        assert_eq!(out, "X X");
        assert_eq!(n, 2);
    }
}
