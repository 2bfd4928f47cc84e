// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Saved-state stacks (component H, §3.1, §4.6): snapshots of captures and
//! repeats taken on entry to an atomic group, a lookaround, or a
//! group-call, restored on the matching exit path.
//!
//! §9's redesign flag calls for growable vectors of fixed-size blocks in
//! place of the C source's doubly-linked block-allocated lists, to
//! amortise allocation while keeping free-list-style reuse. A plain
//! growable `Vec` acting as a stack gets the same amortised-allocation
//! property with far less code, so that's what's used here; blocks are
//! popped (truncated) rather than freed, so the same backing storage is
//! reused across repeated atomic/lookaround entries within one `State`.

use crate::capture::GroupData;
use crate::fuzzy::FuzzyCounts;
use crate::repeat::RepeatData;

/// One saved-state frame: a lookaround/atomic entry's complete rewind
/// point, plus the `capture_change` counter at save time so the restore
/// path can tell whether the subpattern actually mutated anything (§3.2).
#[derive(Clone, Debug)]
pub struct SavedFrame {
    pub groups: Vec<GroupData>,
    pub repeats: Vec<RepeatData>,
    pub fuzzy: Vec<FuzzyCounts>,
    pub capture_change_at_save: u64,
    pub too_few_errors_at_save: bool,
}

/// The stack of saved frames for one `State`. Pushed on `ATOMIC`/
/// `LOOKAROUND` entry, popped on the matching exit or backtrack.
#[derive(Clone, Debug, Default)]
pub struct SavedStack {
    frames: Vec<SavedFrame>,
}

impl SavedStack {
    pub fn new() -> Self {
        SavedStack::default()
    }

    pub fn push(&mut self, frame: SavedFrame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<SavedFrame> {
        self.frames.pop()
    }

    pub fn top(&self) -> Option<&SavedFrame> {
        self.frames.last()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Span;

    #[test]
    fn push_pop_preserves_order() {
        let mut stack = SavedStack::new();
        let mut groups1 = vec![GroupData::new()];
        groups1[0].span = Span::new(0, 1);
        stack.push(SavedFrame {
            groups: groups1,
            repeats: Vec::new(),
            fuzzy: Vec::new(),
            capture_change_at_save: 1,
            too_few_errors_at_save: false,
        });
        let mut groups2 = vec![GroupData::new()];
        groups2[0].span = Span::new(2, 3);
        stack.push(SavedFrame {
            groups: groups2,
            repeats: Vec::new(),
            fuzzy: Vec::new(),
            capture_change_at_save: 2,
            too_few_errors_at_save: false,
        });
        let top = stack.pop().unwrap();
        assert_eq!(top.groups[0].span, Span::new(2, 3));
        let next = stack.pop().unwrap();
        assert_eq!(next.groups[0].span, Span::new(0, 1));
        assert!(stack.is_empty());
    }
}
