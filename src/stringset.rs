// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! String-set ("named list") matching (component L, §4.9): "is the text at
//! this position a member of a precompiled set of strings?", with
//! partial-match truncation support for matches that run off the end of
//! the active slice.

use std::cell::RefCell;
use std::collections::HashSet;

use crate::encoding::Encoding;

/// One named list as delivered by the compiler (§6.1 `named_lists`):
/// a set of member strings plus the length bounds the compiler already
/// computed, so the matcher never has to scan the whole set to find them.
pub struct StringSet {
    members: HashSet<Vec<char>>,
    pub min_len: usize,
    pub max_len: usize,
    /// Lazily built, cached set of every proper prefix of every member,
    /// used to recognise a partial match when the available text is
    /// shorter than `min_len` (§4.9).
    partial_prefixes: RefCell<Option<HashSet<Vec<char>>>>,
}

impl StringSet {
    pub fn new(members: impl IntoIterator<Item = Vec<char>>) -> Self {
        let members: HashSet<Vec<char>> = members.into_iter().collect();
        let min_len = members.iter().map(|m| m.len()).min().unwrap_or(0);
        let max_len = members.iter().map(|m| m.len()).max().unwrap_or(0);
        StringSet { members, min_len, max_len, partial_prefixes: RefCell::new(None) }
    }

    fn ensure_partial_prefixes(&self) {
        if self.partial_prefixes.borrow().is_some() {
            return;
        }
        let mut set = HashSet::new();
        for member in &self.members {
            for len in 0..member.len() {
                set.insert(member[..len].to_vec());
            }
        }
        *self.partial_prefixes.borrow_mut() = Some(set);
    }

    fn contains_prefix(&self, candidate: &[char]) -> bool {
        self.ensure_partial_prefixes();
        self.partial_prefixes.borrow().as_ref().unwrap().contains(candidate)
    }

    /// Try matching the set at `text[pos..]`, trying lengths from
    /// `max_len` down to `min_len` (§4.9). `ignore_case` folds the grabbed
    /// substring through `enc` before probing; `allow_partial` additionally
    /// probes the cached prefix set when the available text is shorter
    /// than `min_len`.
    pub fn probe(
        &self,
        enc: &dyn Encoding,
        text: &[char],
        pos: usize,
        ignore_case: bool,
        allow_partial: bool,
    ) -> StringSetMatch {
        let available = text.len().saturating_sub(pos);
        if available < self.min_len {
            if allow_partial && self.contains_prefix(&text[pos..]) {
                return StringSetMatch::Partial;
            }
            return StringSetMatch::None;
        }
        let max_try = self.max_len.min(available);
        for len in (self.min_len..=max_try).rev() {
            let candidate = &text[pos..pos + len];
            if self.matches_member(enc, candidate, ignore_case) {
                return StringSetMatch::Full(len);
            }
        }
        StringSetMatch::None
    }

    fn matches_member(&self, enc: &dyn Encoding, candidate: &[char], ignore_case: bool) -> bool {
        if !ignore_case {
            return self.members.contains(candidate);
        }
        // Turkic-I positions enumerate all I-variants recursively (§4.9);
        // otherwise a straightforward case-folded comparison against every
        // member is correct and the set is normally small.
        'member: for member in &self.members {
            if member.len() != candidate.len() {
                continue;
            }
            for (a, b) in candidate.iter().zip(member.iter()) {
                if enc.possible_turkic(*a) || enc.possible_turkic(*b) {
                    if !enc.all_turkic_i(*a).contains(*b) && !enc.all_turkic_i(*b).contains(*a) {
                        continue 'member;
                    }
                } else if enc.simple_case_fold(*a) != enc.simple_case_fold(*b) {
                    continue 'member;
                }
            }
            return true;
        }
        false
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StringSetMatch {
    /// Matched a full member of length `usize`.
    Full(usize),
    /// The remaining text is a proper prefix of some member; the match
    /// would complete with more text.
    Partial,
    None,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Ascii;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn longest_member_wins() {
        let set = StringSet::new([chars("cat"), chars("catalog")]);
        let text = chars("catalog shelf");
        match set.probe(&Ascii, &text, 0, false, false) {
            StringSetMatch::Full(len) => assert_eq!(len, 7),
            other => panic!("expected Full(7), got {:?}", other),
        }
    }

    #[test]
    fn partial_prefix_recognised() {
        let set = StringSet::new([chars("hello")]);
        let text = chars("hel");
        assert_eq!(set.probe(&Ascii, &text, 0, false, true), StringSetMatch::Partial);
        assert_eq!(set.probe(&Ascii, &text, 0, false, false), StringSetMatch::None);
    }

    #[test]
    fn case_insensitive_probe() {
        let set = StringSet::new([chars("cat")]);
        let text = chars("CAT!");
        match set.probe(&Ascii, &text, 0, true, false) {
            StringSetMatch::Full(3) => {}
            other => panic!("expected Full(3), got {:?}", other),
        }
    }
}
