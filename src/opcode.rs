// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The compiler-to-matcher wire format (§6.1, §6.3): a flat vector of
//! `u32` words, the first of each instruction being an `Opcode` and the
//! rest its operands. This module only decodes the shape; `builder.rs`
//! turns a decoded stream into the node graph the driver actually runs.

use bitflags::bitflags;

/// The ~100-variant opcode set from §6.3, trimmed to the core categories
/// the spec enumerates. Forward/reverse and case variants are carried as
/// `Node` flags (§3.1) rather than as separate opcodes, which keeps this
/// enum from duplicating every combination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opcode {
    Any = 0,
    AnyAll,
    AnyU,
    Character,
    Property,
    Range,
    SetUnion,
    SetInter,
    SetDiff,
    SetSymDiff,
    String,
    StringFld,
    Boundary,
    DefaultBoundary,
    StartOfWord,
    EndOfWord,
    DefaultStartOfWord,
    DefaultEndOfWord,
    GraphemeBoundary,
    StartOfLine,
    EndOfLine,
    StartOfString,
    EndOfString,
    EndOfStringLine,
    SearchAnchor,
    Branch,
    Next,
    Group,
    GroupExists,
    CallRef,
    GroupCall,
    GroupReturn,
    GreedyRepeat,
    LazyRepeat,
    GreedyRepeatOne,
    LazyRepeatOne,
    EndGreedyRepeat,
    EndLazyRepeat,
    Atomic,
    Lookaround,
    RefGroup,
    RefGroupFld,
    StringSet,
    StringSetFld,
    Fuzzy,
    EndFuzzy,
    Success,
    Failure,
    End,
}

impl Opcode {
    pub fn from_u32(v: u32) -> Option<Opcode> {
        use Opcode::*;
        const TABLE: &[Opcode] = &[
            Any, AnyAll, AnyU, Character, Property, Range, SetUnion, SetInter,
            SetDiff, SetSymDiff, String, StringFld, Boundary, DefaultBoundary,
            StartOfWord, EndOfWord, DefaultStartOfWord, DefaultEndOfWord,
            GraphemeBoundary, StartOfLine, EndOfLine, StartOfString,
            EndOfString, EndOfStringLine, SearchAnchor, Branch, Next, Group,
            GroupExists, CallRef, GroupCall, GroupReturn, GreedyRepeat,
            LazyRepeat, GreedyRepeatOne, LazyRepeatOne, EndGreedyRepeat,
            EndLazyRepeat, Atomic, Lookaround, RefGroup, RefGroupFld,
            StringSet, StringSetFld, Fuzzy, EndFuzzy, Success, Failure, End,
        ];
        TABLE.get(v as usize).copied()
    }

    /// Opcodes that open a subsequence closed by a matching `End` word
    /// (§6.1): `Branch`/`Atomic`/`Lookaround`/both repeat forms/`Group`/
    /// `CallRef`/`Fuzzy`.
    pub fn opens_subsequence(&self) -> bool {
        matches!(
            self,
            Opcode::Branch
                | Opcode::Atomic
                | Opcode::Lookaround
                | Opcode::GreedyRepeat
                | Opcode::LazyRepeat
                | Opcode::Group
                | Opcode::CallRef
                | Opcode::Fuzzy
        )
    }
}

bitflags! {
    /// Pattern-level flags from §6.1's compiler contract.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Flags: u32 {
        const IGNORECASE   = 1 << 0;
        const MULTILINE    = 1 << 1;
        const DOTALL       = 1 << 2;
        const UNICODE      = 1 << 3;
        const LOCALE       = 1 << 4;
        const ASCII        = 1 << 5;
        const VERBOSE      = 1 << 6;
        const REVERSE      = 1 << 7;
        const VERSION0     = 1 << 8;
        const VERSION1     = 1 << 9;
        const FULLCASE     = 1 << 10;
        const WORD         = 1 << 11;
        const BESTMATCH    = 1 << 12;
        const ENHANCEMATCH = 1 << 13;
        const TEMPLATE     = 1 << 14;
        const DEBUG        = 1 << 15;
    }
}

bitflags! {
    /// Per-node flags (§3.1): `positive`/`zero-width`/`fuzzy`/`reverse`/
    /// `required`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct NodeFlags: u8 {
        const POSITIVE   = 1 << 0;
        const ZERO_WIDTH = 1 << 1;
        const FUZZY      = 1 << 2;
        const REVERSE    = 1 << 3;
        const REQUIRED   = 1 << 4;
        /// Set on leaf nodes compiled under `IGNORECASE` (§6.1 `Flags`); the
        /// `_FLD` opcode variants (full case fold) always carry it too,
        /// since a full fold is a strict superset of a simple one.
        const CASE_INSENSITIVE = 1 << 5;
    }
}

bitflags! {
    /// Monotonic, write-once status bits attached to a node after the
    /// post-passes run (§4.3 "Add repeat guards", §4.7 "FAST_INIT").
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct NodeStatus: u8 {
        const VISITED         = 1 << 0;
        const FAST_INIT       = 1 << 1;
        const USED            = 1 << 2;
        const BODY_REFS_GROUP = 1 << 3;
        const TAIL_AFTER_REF  = 1 << 4;
    }
}

bitflags! {
    /// Per-repeat status bits set by the "Add repeat guards" post-pass
    /// (§4.3), consulted by the driver to decide whether a guard needs
    /// installing at runtime at all.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct RepeatStatus: u8 {
        const BODY_NEEDS_GUARD = 1 << 0;
        const TAIL_NEEDS_GUARD = 1 << 1;
    }
}

/// A decoded instruction: opcode plus its operand words, with the index
/// range it occupied in the flat vector (useful for error messages and for
/// `End` matching during the builder's recursive descent).
#[derive(Clone, Debug)]
pub struct Instruction {
    pub op: Opcode,
    pub operands: Vec<u32>,
    pub start: usize,
}

/// Decode a flat opcode vector into a sequence of `Instruction`s. Operand
/// counts are opcode-specific; unknown opcodes or a truncated operand run
/// are reported as `Error::Illegal` rather than panicking, since this
/// stream may originate from an adversarial or corrupt caller (§7).
pub fn decode(words: &[u32]) -> crate::error::Result<Vec<Instruction>> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < words.len() {
        let start = i;
        let op = Opcode::from_u32(words[i]).ok_or_else(|| {
            crate::error::Error::Illegal(format!("unknown opcode word {} at {}", words[i], i))
        })?;
        i += 1;
        let operand_count = operand_count_hint(op, &words[i..]);
        if i + operand_count > words.len() {
            return Err(crate::error::Error::Illegal(format!(
                "truncated operand list for {:?} at {}",
                op, start
            )));
        }
        let operands = words[i..i + operand_count].to_vec();
        i += operand_count;
        out.push(Instruction { op, operands, start });
    }
    Ok(out)
}

/// Fixed operand counts for opcodes whose operand shape doesn't depend on
/// the stream itself. Variable-length opcodes (`String`, `Range`, set
/// opcodes) are handled by the builder directly since their length is
/// carried in the first operand word.
fn operand_count_hint(op: Opcode, rest: &[u32]) -> usize {
    use Opcode::*;
    match op {
        Any | AnyAll | AnyU | Boundary | DefaultBoundary | StartOfWord | EndOfWord
        | DefaultStartOfWord | DefaultEndOfWord | GraphemeBoundary | StartOfLine
        | EndOfLine | StartOfString | EndOfString | EndOfStringLine | SearchAnchor
        | Next | Success | Failure | End | GroupReturn => 0,
        Character | Property => 1,
        Atomic | Lookaround => 1, // subpattern-length word
        Branch => 1,              // alt-count word
        Group | GroupExists => 2, // group index, capturing?
        CallRef => 1,             // call-ref id
        GroupCall => 1,           // call-ref id
        GreedyRepeat | LazyRepeat | GreedyRepeatOne | LazyRepeatOne => 3, // index,min,max
        EndGreedyRepeat | EndLazyRepeat => 1, // index
        RefGroup | RefGroupFld => 1, // group index
        StringSet | StringSetFld => 3, // list id, min_len, max_len
        Fuzzy => 8, // max_sub,max_ins,max_del,max_err,sub_cost,ins_cost,del_cost,max_cost
        EndFuzzy => 5, // section index, min_sub,min_ins,min_del,min_err
        String | StringFld => {
            // length-prefixed: first remaining word is the codepoint count.
            rest.first().map(|&n| n as usize + 1).unwrap_or(0)
        }
        Range => rest.first().map(|&n| n as usize * 2 + 1).unwrap_or(0),
        SetUnion | SetInter | SetDiff | SetSymDiff => {
            rest.first().map(|&n| n as usize + 1).unwrap_or(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_simple_stream() {
        let words = [
            Opcode::StartOfString as u32,
            Opcode::Character as u32,
            b'a' as u32,
            Opcode::Success as u32,
        ];
        let insts = decode(&words).unwrap();
        assert_eq!(insts.len(), 3);
        assert_eq!(insts[1].op, Opcode::Character);
        assert_eq!(insts[1].operands, vec![b'a' as u32]);
    }

    #[test]
    fn decode_truncated_is_illegal() {
        let words = [Opcode::Character as u32];
        assert!(decode(&words).is_err());
    }
}
