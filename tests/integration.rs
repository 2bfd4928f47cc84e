// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Black-box scenarios from spec.md §8.2, built the only way this crate's
//! public surface allows: by hand-assembling the opcode word stream
//! `build` expects (there is no parser in scope) and driving it through
//! `ops.rs`'s top-level operations.

use backtrack_core::{build, findall, fullmatch, match_, search, split, sub, FindallItem};
use backtrack_core::{EncodingKind, MatchOptions};
use backtrack_core::Span;
use backtrack_core::encoding::Ascii;
use backtrack_core::opcode::{Flags, Opcode as Op};

mod common {
    use super::Op;

    pub fn word(op: Op) -> u32 {
        op as u32
    }

    pub fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }
}

use common::{chars, word};

// §8.2 scenario 1: `a(b*)c` on `abbbc` matches 0..5 with group 1 = "bbb".
#[test]
fn scenario_1_group_capturing_star_repeat() {
    let words = vec![
        word(Op::Character), 'a' as u32,
        word(Op::Group), 0, 1,
        word(Op::GreedyRepeatOne), 0, 0, u32::MAX,
        word(Op::Character), 'b' as u32,
        word(Op::End),
        word(Op::Character), 'c' as u32,
        word(Op::Success),
    ];
    let pattern = build(&words, Flags::empty(), EncodingKind::Ascii).unwrap();
    let text = chars("abbbc");
    let result = match_(&pattern, &Ascii, &text, MatchOptions::default()).unwrap().unwrap();
    assert_eq!(result.span(), Span::new(0, 5));
    assert_eq!(result.text(&text, 1).as_deref(), Some("bbb"));
}

// §8.2 scenario 2: `(\d+)-(\d+)` on `2024-11` matches 0..7, groups
// ("2024","11"), lastindex = 2. `\d` is modelled as a `Range('0','9')`
// since the Unicode property tables are out of scope (§4.1).
#[test]
fn scenario_2_two_groups_and_lastindex() {
    let words = vec![
        word(Op::Group), 0, 1,
        word(Op::GreedyRepeatOne), 0, 1, u32::MAX,
        word(Op::Range), 1, '0' as u32, '9' as u32,
        word(Op::End),
        word(Op::Character), '-' as u32,
        word(Op::Group), 1, 1,
        word(Op::GreedyRepeatOne), 1, 1, u32::MAX,
        word(Op::Range), 1, '0' as u32, '9' as u32,
        word(Op::End),
        word(Op::Success),
    ];
    let pattern = build(&words, Flags::empty(), EncodingKind::Ascii).unwrap();
    let text = chars("2024-11");
    let result = match_(&pattern, &Ascii, &text, MatchOptions::default()).unwrap().unwrap();
    assert_eq!(result.span(), Span::new(0, 7));
    assert_eq!(result.text(&text, 1).as_deref(), Some("2024"));
    assert_eq!(result.text(&text, 2).as_deref(), Some("11"));
    assert_eq!(result.lastindex, Some(2));
}

// §8.2 scenario 3: `(?:ab)+` on `ababab`, search, matches 0..6 with a
// repeat that iterated 3 times.
#[test]
fn scenario_3_non_capturing_repeat_of_multichar_body() {
    let words = vec![
        word(Op::GreedyRepeat), 0, 1, u32::MAX,
        word(Op::Character), 'a' as u32,
        word(Op::Character), 'b' as u32,
        word(Op::EndGreedyRepeat), 0,
        word(Op::Success),
    ];
    let pattern = build(&words, Flags::empty(), EncodingKind::Ascii).unwrap();
    let text = chars("ababab");
    let result = search(&pattern, &Ascii, &text, MatchOptions::default()).unwrap().unwrap();
    assert_eq!(result.span(), Span::new(0, 6));
}

// §8.2 scenario 4: `(a)+` on `aaa`: group 1's current span is the last
// iteration (2..3); its capture history lists all three iterations.
#[test]
fn scenario_4_repeated_group_keeps_full_capture_history() {
    let words = vec![
        word(Op::GreedyRepeat), 0, 1, u32::MAX,
        word(Op::Group), 0, 1,
        word(Op::Character), 'a' as u32,
        word(Op::End),
        word(Op::EndGreedyRepeat), 0,
        word(Op::Success),
    ];
    let pattern = build(&words, Flags::empty(), EncodingKind::Ascii).unwrap();
    let text = chars("aaa");
    let result = match_(&pattern, &Ascii, &text, MatchOptions::default()).unwrap().unwrap();
    assert_eq!(result.group(1), Some(Span::new(2, 3)));
    assert_eq!(result.captures(1), &[Span::new(0, 1), Span::new(1, 2), Span::new(2, 3)]);
}

// §8.2 scenario 5: `(?r)foo` on `foofoo`, reverse search, matches 3..6 —
// the rightmost occurrence, since a reverse scan anchors from the end.
#[test]
fn scenario_5_reverse_search_finds_rightmost_literal() {
    let words = vec![
        word(Op::String), 3, 'f' as u32, 'o' as u32, 'o' as u32,
        word(Op::Success),
    ];
    let pattern = build(&words, Flags::REVERSE, EncodingKind::Ascii).unwrap();
    let text = chars("foofoo");
    let result = search(&pattern, &Ascii, &text, MatchOptions::default()).unwrap().unwrap();
    assert_eq!(result.span(), Span::new(3, 6));
}

// §8.2 scenario 7: `split(",", "a,,b", maxsplit=0)` under `version_1`
// semantics yields `["a", "", "b"]`.
#[test]
fn scenario_7_split_on_literal_comma() {
    let words = vec![word(Op::Character), ',' as u32, word(Op::Success)];
    let pattern = build(&words, Flags::empty(), EncodingKind::Ascii).unwrap();
    let text = chars("a,,b");
    let pieces = split(&pattern, &Ascii, &text, 0).unwrap();
    assert_eq!(pieces, vec!["a", "", "b"]);
}

// §8.2 scenario 8: `findall("a{2,}", "aaaaa", overlapped=true)` yields
// every overlapping greedy match, shifting the start by one each time,
// until the remainder is too short to meet the `{2,}` minimum.
#[test]
fn scenario_8_findall_overlapped_shifts_by_one() {
    let words = vec![
        word(Op::GreedyRepeatOne), 0, 2, u32::MAX,
        word(Op::Character), 'a' as u32,
        word(Op::Success),
    ];
    let pattern = build(&words, Flags::empty(), EncodingKind::Ascii).unwrap();
    let text = chars("aaaaa");
    let matches = findall(&pattern, &Ascii, &text, MatchOptions::default(), true).unwrap();
    let spans: Vec<Span> = matches
        .into_iter()
        .map(|m| match m {
            FindallItem::Whole(s) => s,
            FindallItem::Groups(_) => panic!("pattern has no groups"),
        })
        .collect();
    assert_eq!(spans, vec![Span::new(0, 5), Span::new(1, 5), Span::new(2, 5), Span::new(3, 5)]);
}

// §8.2 scenario 9: `sub("(?P<x>\d+)", "[\g<x>]", "n=42")` -> `"n=[42]"`.
#[test]
fn scenario_9_sub_with_named_group_template() {
    let words = vec![
        word(Op::Group), 0, 1,
        word(Op::GreedyRepeatOne), 0, 1, u32::MAX,
        word(Op::Range), 1, '0' as u32, '9' as u32,
        word(Op::End),
        word(Op::Success),
    ];
    let mut pattern = build(&words, Flags::empty(), EncodingKind::Ascii).unwrap();
    pattern.group_index.insert("x".to_string(), 0);
    pattern.index_group.insert(0, "x".to_string());

    let text = chars("n=42");
    let out = sub(&pattern, &Ascii, &text, r"[\g<x>]", 0).unwrap();
    assert_eq!(out, "n=[42]");
}

// §8.2 scenario 10: `match("a(b|c)d", "ac", partial=true)` is a partial
// match 0..2 with group 1 = "c" — the literal `d` simply hasn't arrived
// yet, so this isn't a failure.
#[test]
fn scenario_10_partial_match_missing_trailing_literal() {
    let words = vec![
        word(Op::Character), 'a' as u32,
        word(Op::Group), 0, 1,
        word(Op::Branch), 2,
        word(Op::Character), 'b' as u32,
        word(Op::Next),
        word(Op::Character), 'c' as u32,
        word(Op::End),
        word(Op::End),
        word(Op::Character), 'd' as u32,
        word(Op::Success),
    ];
    let pattern = build(&words, Flags::empty(), EncodingKind::Ascii).unwrap();
    let text = chars("ac");
    let opts = MatchOptions { partial: true, ..MatchOptions::default() };
    let result = match_(&pattern, &Ascii, &text, opts).unwrap().unwrap();
    assert!(result.partial);
    assert_eq!(result.span(), Span::new(0, 2));
    assert_eq!(result.text(&text, 1).as_deref(), Some("c"));

    // Without partial matching the same text is a plain failure (§8.1
    // "Partial idempotence" is the contrapositive of this: a non-partial
    // attempt over the same text never succeeds here because `d` never
    // arrives).
    let opts_strict = MatchOptions { partial: false, ..MatchOptions::default() };
    assert!(match_(&pattern, &Ascii, &text, opts_strict).unwrap().is_none());
}

// §8.1 "Partial idempotence": if a partial match happens to be complete
// (the trailing literal *did* arrive), re-running without `partial` gives
// back the identical result.
#[test]
fn partial_idempotence_when_match_is_actually_complete() {
    let words = vec![
        word(Op::Character), 'a' as u32,
        word(Op::Group), 0, 1,
        word(Op::Branch), 2,
        word(Op::Character), 'b' as u32,
        word(Op::Next),
        word(Op::Character), 'c' as u32,
        word(Op::End),
        word(Op::End),
        word(Op::Character), 'd' as u32,
        word(Op::Success),
    ];
    let pattern = build(&words, Flags::empty(), EncodingKind::Ascii).unwrap();
    let text = chars("acd");
    let opts_partial = MatchOptions { partial: true, ..MatchOptions::default() };
    let with_partial = match_(&pattern, &Ascii, &text, opts_partial).unwrap().unwrap();
    assert!(!with_partial.partial);

    let opts_strict = MatchOptions { partial: false, ..MatchOptions::default() };
    let without_partial = match_(&pattern, &Ascii, &text, opts_strict).unwrap().unwrap();
    assert_eq!(with_partial.span(), without_partial.span());
    assert_eq!(with_partial.group(1), without_partial.group(1));
}

// §6.2 `fullmatch`: only succeeds when the match consumes the entire
// slice, even though `search`/`match_` would happily accept a prefix.
#[test]
fn fullmatch_requires_consuming_entire_slice() {
    let words = vec![word(Op::Character), 'a' as u32, word(Op::Success)];
    let pattern = build(&words, Flags::empty(), EncodingKind::Ascii).unwrap();
    assert!(fullmatch(&pattern, &Ascii, &chars("a"), MatchOptions::default()).unwrap().is_some());
    assert!(fullmatch(&pattern, &Ascii, &chars("ab"), MatchOptions::default()).unwrap().is_none());
}

// §8.3 round-trip law: `"".join(split(p, t)) == t` when `p` never matches
// an empty string (here a literal comma can't).
#[test]
fn split_pieces_rejoin_to_original_text() {
    let words = vec![word(Op::Character), ',' as u32, word(Op::Success)];
    let pattern = build(&words, Flags::empty(), EncodingKind::Ascii).unwrap();
    let text = chars("a,,b,c");
    let pieces = split(&pattern, &Ascii, &text, 0).unwrap();
    assert_eq!(pieces.join(","), "a,,b,c");
}

// A malformed opcode stream is `Illegal`, not a panic (§7): every fallible
// boundary in the builder returns a `Result`.
#[test]
fn malformed_stream_is_reported_not_panicked() {
    let words = vec![word(Op::Group), 0, 1, word(Op::Character), 'a' as u32]; // missing End/Success
    assert!(build(&words, Flags::empty(), EncodingKind::Ascii).is_err());
}
