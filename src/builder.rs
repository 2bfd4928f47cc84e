// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The opcode-to-node-graph builder (component C, §4.3): a recursive
//! descent over the decoded instruction stream that links a flat opcode
//! vector into the typed node graph the driver runs, followed by three
//! post-passes (skip one-way branches, add repeat guards, record nested
//! repeat/fuzzy sections).

use std::char;
use std::collections::HashMap;

use crate::encoding::Property;
use crate::error::{Error, Result};
use crate::node::{LeafMatcher, Node, NodeArena, NodeId, Payload};
use crate::opcode::{decode, Flags, Instruction, NodeFlags, Opcode, RepeatStatus};
use crate::pattern::{CallRefInfo, EncodingKind, GroupInfo, Pattern, RepeatInfo};

/// Terminators that end a sequence without being consumed by the generic
/// leaf-compilation loop; the caller that opened the construct consumes
/// the matching one itself.
fn is_terminator(op: Opcode) -> bool {
    matches!(
        op,
        Opcode::Next | Opcode::End | Opcode::EndGreedyRepeat | Opcode::EndLazyRepeat | Opcode::EndFuzzy
    )
}

struct BuildCtx {
    group_info: Vec<GroupInfo>,
    call_ref_info: HashMap<u32, CallRefInfo>,
    repeat_bounds: Vec<(u32, u32)>, // (min, max) per repeat index, max=u32::MAX => unbounded
    fuzzy_count: usize,
    /// Each fuzzy section's budget, indexed by section id, so the driver
    /// can look one up from a leaf's `fuzzy_section` without walking the
    /// node graph back to its `FUZZY` start node.
    fuzzy_specs: Vec<crate::fuzzy::FuzzySpec>,
    /// Fuzzy section ids currently open, innermost last; threaded through
    /// `compile_leaf` so every leaf compiled inside a `FUZZY`/`END_FUZZY`
    /// pair gets flagged `NodeFlags::FUZZY` and tagged with the section it
    /// belongs to (§4.10).
    fuzzy_stack: Vec<u32>,
}

impl BuildCtx {
    fn ensure_group(&mut self, index: u32) {
        let idx = index as usize;
        if idx >= self.group_info.len() {
            self.group_info.resize(idx + 1, GroupInfo::default());
        }
    }

    fn ensure_repeat(&mut self, index: u32, min: u32, max: u32) {
        let idx = index as usize;
        if idx >= self.repeat_bounds.len() {
            self.repeat_bounds.resize(idx + 1, (0, 0));
        }
        self.repeat_bounds[idx] = (min, max);
    }
}

/// Build a `Pattern` from a flat opcode vector (§6.1 contract), consuming
/// it entirely: the top-level sequence must run to a `Success`/`Failure`
/// leaf (no outer tail).
pub fn build(words: &[u32], flags: Flags, encoding: EncodingKind) -> Result<Pattern> {
    let instrs = decode(words)?;
    let mut arena = NodeArena::new();
    let mut ctx = BuildCtx {
        group_info: Vec::new(),
        call_ref_info: HashMap::new(),
        repeat_bounds: Vec::new(),
        fuzzy_count: 0,
        fuzzy_specs: Vec::new(),
        fuzzy_stack: Vec::new(),
    };

    let ignore_case = flags.contains(Flags::IGNORECASE);
    let (start, end_pos) = compile_seq(&mut arena, &instrs, 0, None, ignore_case, &mut ctx)?;
    if end_pos != instrs.len() {
        return Err(Error::Illegal(format!("unconsumed instructions after top-level sequence at {}", end_pos)));
    }

    let true_group_count = ctx.group_info.len().max(1);
    let group_end_index_max = ctx.group_info.iter().map(|g| g.end_index).max().unwrap_or(-1);
    let repeat_count = ctx.repeat_bounds.len();
    let repeat_info = vec![RepeatInfo::default(); repeat_count];

    let mut pattern = Pattern {
        arena,
        start_node: start,
        start_test: None,
        true_group_count,
        public_group_count: true_group_count,
        group_end_index_max,
        group_info: ctx.group_info,
        call_ref_info: ctx.call_ref_info,
        repeat_info,
        repeat_count,
        fuzzy_count: ctx.fuzzy_count,
        fuzzy_specs: ctx.fuzzy_specs,
        min_width: 0,
        is_fuzzy: ctx.fuzzy_count > 0,
        do_search_start: true,
        req_string_node: None,
        req_offset: 0,
        encoding,
        flags,
        named_lists: HashMap::new(),
        named_list_indexes: Vec::new(),
        pattern_call_ref: None,
        group_index: HashMap::new(),
        index_group: HashMap::new(),
    };

    post_pass_set_test_nodes(&mut pattern);
    post_pass_repeat_guards(&mut pattern);
    post_pass_nested_sections(&mut pattern);
    pattern.start_test = pattern.arena.get(pattern.start_node).test_node.get();

    Ok(pattern)
}

/// Compile a sequence of instructions starting at `pos`, linking each leaf
/// to the next via `next_1`, until a terminator (`Next`/`End`/
/// `EndGreedyRepeat`/`EndLazyRepeat`/`EndFuzzy`) is hit — returned without
/// being consumed — or the instruction list is exhausted. `tail` is the
/// node to link to if the sequence runs out before a terminator (used by
/// the top-level call, where there's nothing further to chain to).
fn compile_seq(
    arena: &mut NodeArena,
    instrs: &[Instruction],
    pos: usize,
    tail: Option<NodeId>,
    ignore_case: bool,
    ctx: &mut BuildCtx,
) -> Result<(NodeId, usize)> {
    if pos >= instrs.len() {
        return match tail {
            Some(t) => Ok((t, pos)),
            None => Err(Error::Illegal("unexpected end of opcode stream".into())),
        };
    }
    let instr = &instrs[pos];
    if is_terminator(instr.op) {
        return match tail {
            Some(t) => Ok((t, pos)),
            None => Ok((arena.push(Node::new(Opcode::Success)), pos)),
        };
    }

    match instr.op {
        Opcode::Success | Opcode::Failure => {
            let node = arena.push(Node::new(instr.op));
            Ok((node, pos + 1))
        }
        Opcode::Character => {
            let ch = char::from_u32(instr.operands[0]).unwrap_or('\u{FFFD}');
            compile_leaf(arena, instrs, pos + 1, tail, ignore_case, ctx, Node::new(Opcode::Character).with_step(1).with_payload(Payload::Char(ch)))
        }
        Opcode::Any | Opcode::AnyAll | Opcode::AnyU => {
            compile_leaf(arena, instrs, pos + 1, tail, ignore_case, ctx, Node::new(instr.op).with_step(1))
        }
        Opcode::Property => {
            let prop = Property(instr.operands[0]);
            compile_leaf(arena, instrs, pos + 1, tail, ignore_case, ctx, Node::new(Opcode::Property).with_step(1).with_payload(Payload::Property(prop)))
        }
        Opcode::Range => {
            let count = instr.operands[0] as usize;
            let mut ranges = Vec::with_capacity(count);
            for i in 0..count {
                let lo = char::from_u32(instr.operands[1 + i * 2]).unwrap_or('\u{0}');
                let hi = char::from_u32(instr.operands[2 + i * 2]).unwrap_or('\u{0}');
                ranges.push((lo, hi));
            }
            compile_leaf(arena, instrs, pos + 1, tail, ignore_case, ctx, Node::new(Opcode::Range).with_step(1).with_payload(Payload::Range(ranges)))
        }
        Opcode::SetUnion | Opcode::SetInter | Opcode::SetDiff | Opcode::SetSymDiff => {
            let count = instr.operands[0] as usize;
            let ranges: Vec<(char, char)> = instr.operands[1..1 + count]
                .iter()
                .map(|&w| {
                    let c = char::from_u32(w).unwrap_or('\u{0}');
                    (c, c)
                })
                .collect();
            compile_leaf(arena, instrs, pos + 1, tail, ignore_case, ctx, Node::new(instr.op).with_step(1).with_payload(Payload::Range(ranges)))
        }
        Opcode::String | Opcode::StringFld => {
            let count = instr.operands[0] as usize;
            let chars: Vec<char> = instr.operands[1..1 + count]
                .iter()
                .map(|&w| char::from_u32(w).unwrap_or('\u{FFFD}'))
                .collect();
            if ctx.fuzzy_stack.is_empty() {
                compile_leaf(arena, instrs, pos + 1, tail, ignore_case, ctx, Node::new(instr.op).with_payload(Payload::Literal(chars, None)))
            } else {
                // Inside a fuzzy section a literal can't be matched as one
                // atomic unit — a substitution/insertion/deletion needs to
                // interpose between individual characters (§4.10) — so
                // decompose it into a chain of ordinary `Character` leaves,
                // each independently eligible for a fuzzy transition.
                compile_fuzzy_literal_chain(arena, instrs, pos + 1, tail, ignore_case, ctx, &chars)
            }
        }
        Opcode::Boundary
        | Opcode::DefaultBoundary
        | Opcode::StartOfWord
        | Opcode::EndOfWord
        | Opcode::DefaultStartOfWord
        | Opcode::DefaultEndOfWord
        | Opcode::GraphemeBoundary
        | Opcode::StartOfLine
        | Opcode::EndOfLine
        | Opcode::StartOfString
        | Opcode::EndOfString
        | Opcode::EndOfStringLine
        | Opcode::SearchAnchor => compile_leaf(arena, instrs, pos + 1, tail, ignore_case, ctx, Node::new(instr.op).with_step(0)),
        Opcode::RefGroup | Opcode::RefGroupFld => {
            let group = instr.operands[0];
            ctx.ensure_group(group);
            ctx.group_info[group as usize].referenced = true;
            // Width is the captured span's length, not a fixed one
            // character, so `step` is left zero; the driver reads the
            // group's current span directly (§4.8).
            compile_leaf(arena, instrs, pos + 1, tail, ignore_case, ctx, Node::new(instr.op).with_payload(Payload::RefGroup { group }))
        }
        Opcode::StringSet | Opcode::StringSetFld => {
            let list_id = instr.operands[0];
            let min_len = instr.operands[1];
            let max_len = instr.operands[2];
            compile_leaf(
                arena,
                instrs,
                pos + 1,
                tail,
                ignore_case,
                ctx,
                Node::new(instr.op).with_payload(Payload::StringSet { list_id, min_len, max_len }),
            )
        }
        Opcode::GroupReturn => compile_leaf(arena, instrs, pos + 1, tail, ignore_case, ctx, Node::new(Opcode::GroupReturn)),

        Opcode::Branch => compile_branch(arena, instrs, pos, tail, ignore_case, ctx),
        Opcode::Group | Opcode::GroupExists => compile_group(arena, instrs, pos, tail, ignore_case, ctx),
        Opcode::Atomic | Opcode::Lookaround => compile_atomic_or_lookaround(arena, instrs, pos, tail, ignore_case, ctx),
        Opcode::GreedyRepeat | Opcode::LazyRepeat => compile_repeat(arena, instrs, pos, tail, ignore_case, ctx),
        Opcode::GreedyRepeatOne | Opcode::LazyRepeatOne => compile_repeat_one(arena, instrs, pos, tail, ignore_case, ctx),
        Opcode::CallRef => compile_call_ref(arena, instrs, pos, tail, ignore_case, ctx),
        Opcode::GroupCall => compile_group_call(arena, instrs, pos, tail, ignore_case, ctx),
        Opcode::Fuzzy => compile_fuzzy(arena, instrs, pos, tail, ignore_case, ctx),

        Opcode::Next | Opcode::End | Opcode::EndGreedyRepeat | Opcode::EndLazyRepeat | Opcode::EndFuzzy => {
            unreachable!("terminators handled above")
        }
    }
}

/// Finish compiling a leaf node: set its `next_1` to the rest of the
/// sequence and return the leaf as the new head.
fn compile_leaf(
    arena: &mut NodeArena,
    instrs: &[Instruction],
    next_pos: usize,
    tail: Option<NodeId>,
    ignore_case: bool,
    ctx: &mut BuildCtx,
    mut node: Node,
) -> Result<(NodeId, usize)> {
    if let Some(&section) = ctx.fuzzy_stack.last() {
        node.flags |= NodeFlags::FUZZY;
        node.fuzzy_section = Some(section);
    }
    if ignore_case || matches!(node.op, Opcode::StringFld | Opcode::RefGroupFld | Opcode::StringSetFld) {
        node.flags |= NodeFlags::CASE_INSENSITIVE;
    }
    let (rest, new_pos) = compile_seq(arena, instrs, next_pos, tail, ignore_case, ctx)?;
    node.next_1 = Some(rest);
    let id = arena.push(node);
    Ok((id, new_pos))
}

/// Compile a literal string opened inside a fuzzy section as a chain of
/// individual `Character` leaves (see the `String`/`StringFld` arm of
/// `compile_seq`), each flagged `NodeFlags::FUZZY` by `compile_leaf` like
/// any other leaf compiled with `ctx.fuzzy_stack` non-empty.
fn compile_fuzzy_literal_chain(
    arena: &mut NodeArena,
    instrs: &[Instruction],
    next_pos: usize,
    tail: Option<NodeId>,
    ignore_case: bool,
    ctx: &mut BuildCtx,
    chars: &[char],
) -> Result<(NodeId, usize)> {
    if chars.is_empty() {
        return compile_seq(arena, instrs, next_pos, tail, ignore_case, ctx);
    }
    let (rest, new_pos) = compile_fuzzy_literal_tail(arena, instrs, next_pos, tail, ignore_case, ctx, chars, 0)?;
    Ok((rest, new_pos))
}

fn compile_fuzzy_literal_tail(
    arena: &mut NodeArena,
    instrs: &[Instruction],
    next_pos: usize,
    tail: Option<NodeId>,
    ignore_case: bool,
    ctx: &mut BuildCtx,
    chars: &[char],
    i: usize,
) -> Result<(NodeId, usize)> {
    if i == chars.len() {
        return compile_seq(arena, instrs, next_pos, tail, ignore_case, ctx);
    }
    let section = *ctx.fuzzy_stack.last().expect("fuzzy literal chain compiled outside a fuzzy section");
    let (rest, new_pos) = compile_fuzzy_literal_tail(arena, instrs, next_pos, tail, ignore_case, ctx, chars, i + 1)?;
    let mut flags = NodeFlags::FUZZY;
    if ignore_case {
        flags |= NodeFlags::CASE_INSENSITIVE;
    }
    let mut node = Node::new(Opcode::Character)
        .with_step(1)
        .with_payload(Payload::Char(chars[i]))
        .with_flags(flags);
    node.fuzzy_section = Some(section);
    node.next_1 = Some(rest);
    let id = arena.push(node);
    Ok((id, new_pos))
}

fn compile_branch(
    arena: &mut NodeArena,
    instrs: &[Instruction],
    pos: usize,
    tail: Option<NodeId>,
    ignore_case: bool,
    ctx: &mut BuildCtx,
) -> Result<(NodeId, usize)> {
    let alt_count = instrs[pos].operands[0] as usize;
    if alt_count == 0 {
        return Err(Error::Illegal("branch with zero alternatives".into()));
    }
    let join = arena.push(Node::new(Opcode::Next));
    let mut cur = pos + 1;
    let mut heads = Vec::with_capacity(alt_count);
    for i in 0..alt_count {
        let (head, new_pos) = compile_seq(arena, instrs, cur, Some(join), ignore_case, ctx)?;
        heads.push(head);
        let expect_next = i + 1 < alt_count;
        if new_pos >= instrs.len() {
            return Err(Error::Illegal("branch body ran off the end of the opcode stream".into()));
        }
        let term = instrs[new_pos].op;
        if expect_next && term != Opcode::Next {
            return Err(Error::Illegal(format!("expected Next separator in branch at {}", new_pos)));
        }
        if !expect_next && term != Opcode::End {
            return Err(Error::Illegal(format!("expected End closing branch at {}", new_pos)));
        }
        cur = new_pos + 1;
    }

    let (rest, new_pos) = compile_seq(arena, instrs, cur, tail, ignore_case, ctx)?;
    arena.get_mut(join).next_1 = Some(rest);

    // Chain 2-way BRANCH nodes back to front, the last alternative linked
    // directly with no further branch after it (§4.3).
    let mut chain = *heads.last().unwrap();
    for &head in heads[..heads.len() - 1].iter().rev() {
        let mut b = Node::new(Opcode::Branch);
        b.next_1 = Some(head);
        b.next_2 = Some(chain);
        chain = arena.push(b);
    }
    Ok((chain, new_pos))
}

fn compile_group(
    arena: &mut NodeArena,
    instrs: &[Instruction],
    pos: usize,
    tail: Option<NodeId>,
    ignore_case: bool,
    ctx: &mut BuildCtx,
) -> Result<(NodeId, usize)> {
    let op = instrs[pos].op;
    let index = instrs[pos].operands[0];
    let capturing = instrs[pos].operands[1] != 0;

    if op == Opcode::GroupExists {
        ctx.ensure_group(index);
        ctx.group_info[index as usize].referenced = true;
        // Two-armed like BRANCH, but chosen deterministically at runtime
        // by whether the group captured, not pushed as a backtrack choice.
        let join = arena.push(Node::new(Opcode::Next));
        let (yes_head, p1) = compile_seq(arena, instrs, pos + 1, Some(join), ignore_case, ctx)?;
        if p1 >= instrs.len() || instrs[p1].op != Opcode::Next {
            return Err(Error::Illegal(format!("expected Next in GroupExists at {}", p1)));
        }
        let (no_head, p2) = compile_seq(arena, instrs, p1 + 1, Some(join), ignore_case, ctx)?;
        if p2 >= instrs.len() || instrs[p2].op != Opcode::End {
            return Err(Error::Illegal(format!("expected End closing GroupExists at {}", p2)));
        }
        let (rest, new_pos) = compile_seq(arena, instrs, p2 + 1, tail, ignore_case, ctx)?;
        arena.get_mut(join).next_1 = Some(rest);
        let mut node = Node::new(Opcode::GroupExists).with_payload(Payload::GroupExists { group: index });
        node.next_1 = Some(yes_head);
        node.next_2 = Some(no_head);
        let id = arena.push(node);
        return Ok((id, new_pos));
    }

    ctx.ensure_group(index);

    let mut end_node = Node::new(Opcode::Group).with_payload(Payload::Group { index, capturing, is_end: true });
    end_node.step = 0;
    let end_id = arena.push(end_node);

    let (body_head, p1) = compile_seq(arena, instrs, pos + 1, Some(end_id), ignore_case, ctx)?;
    if p1 >= instrs.len() || instrs[p1].op != Opcode::End {
        return Err(Error::Illegal(format!("expected End closing Group at {}", p1)));
    }

    ctx.group_info[index as usize].defining_node = Some(body_head);

    let (rest, new_pos) = compile_seq(arena, instrs, p1 + 1, tail, ignore_case, ctx)?;
    arena.get_mut(end_id).next_1 = Some(rest);

    let mut start_node = Node::new(Opcode::Group).with_payload(Payload::Group { index, capturing, is_end: false });
    start_node.step = 0;
    start_node.next_1 = Some(body_head);
    let start_id = arena.push(start_node);

    Ok((start_id, new_pos))
}

fn compile_atomic_or_lookaround(
    arena: &mut NodeArena,
    instrs: &[Instruction],
    pos: usize,
    tail: Option<NodeId>,
    ignore_case: bool,
    ctx: &mut BuildCtx,
) -> Result<(NodeId, usize)> {
    let op = instrs[pos].op;
    let operand = instrs[pos].operands[0];
    let positive = operand & 1 != 0;
    let reverse = operand & 2 != 0;

    let success = arena.push(Node::new(Opcode::Success));
    let (sub_head, p1) = compile_seq(arena, instrs, pos + 1, Some(success), ignore_case, ctx)?;
    if p1 >= instrs.len() || instrs[p1].op != Opcode::End {
        return Err(Error::Illegal(format!("expected End closing {:?} at {}", op, p1)));
    }

    let (rest, new_pos) = compile_seq(arena, instrs, p1 + 1, tail, ignore_case, ctx)?;

    let mut flags = NodeFlags::empty();
    if positive {
        flags |= NodeFlags::POSITIVE;
    }
    if reverse {
        flags |= NodeFlags::REVERSE;
    }
    let mut node = Node::new(op).with_flags(flags);
    node.next_1 = Some(rest);
    node.next_2 = Some(sub_head);
    let id = arena.push(node);
    Ok((id, new_pos))
}

fn compile_repeat(
    arena: &mut NodeArena,
    instrs: &[Instruction],
    pos: usize,
    tail: Option<NodeId>,
    ignore_case: bool,
    ctx: &mut BuildCtx,
) -> Result<(NodeId, usize)> {
    let op = instrs[pos].op;
    let index = instrs[pos].operands[0];
    let min = instrs[pos].operands[1];
    let max = instrs[pos].operands[2];
    ctx.ensure_repeat(index, min, max);

    let (end_op, _) = match op {
        Opcode::GreedyRepeat => (Opcode::EndGreedyRepeat, ()),
        Opcode::LazyRepeat => (Opcode::EndLazyRepeat, ()),
        _ => unreachable!(),
    };

    let end_id = arena.push(Node::new(end_op).with_payload(Payload::Repeat { index, min, max: if max == u32::MAX { None } else { Some(max) } }));
    let (body_head, p1) = compile_seq(arena, instrs, pos + 1, Some(end_id), ignore_case, ctx)?;
    if p1 >= instrs.len() || instrs[p1].op != end_op {
        return Err(Error::Illegal(format!("expected {:?} closing repeat at {}", end_op, p1)));
    }
    arena.get_mut(end_id).next_1 = Some(body_head);

    let (rest, new_pos) = compile_seq(arena, instrs, p1 + 1, tail, ignore_case, ctx)?;
    arena.get_mut(end_id).next_2 = Some(rest);

    let mut start_node = Node::new(op).with_payload(Payload::Repeat { index, min, max: if max == u32::MAX { None } else { Some(max) } });
    start_node.next_1 = Some(body_head);
    start_node.next_2 = Some(rest);
    let start_id = arena.push(start_node);

    Ok((start_id, new_pos))
}

fn compile_repeat_one(
    arena: &mut NodeArena,
    instrs: &[Instruction],
    pos: usize,
    tail: Option<NodeId>,
    ignore_case: bool,
    ctx: &mut BuildCtx,
) -> Result<(NodeId, usize)> {
    let op = instrs[pos].op;
    let index = instrs[pos].operands[0];
    let min = instrs[pos].operands[1];
    let max = instrs[pos].operands[2];
    ctx.ensure_repeat(index, min, max);

    if pos + 1 >= instrs.len() {
        return Err(Error::Illegal("repeat-one missing body instruction".into()));
    }
    let body = &instrs[pos + 1];
    let test = leaf_matcher(body)?;

    let (rest, new_pos) = compile_seq(arena, instrs, pos + 2, tail, ignore_case, ctx)?;
    let mut flags = NodeFlags::empty();
    if ignore_case {
        flags |= NodeFlags::CASE_INSENSITIVE;
    }
    let mut node = Node::new(op).with_flags(flags).with_payload(Payload::RepeatOne {
        index,
        min,
        max: if max == u32::MAX { None } else { Some(max) },
        test,
    });
    node.next_1 = Some(rest);
    let id = arena.push(node);
    Ok((id, new_pos))
}

fn leaf_matcher(instr: &Instruction) -> Result<LeafMatcher> {
    match instr.op {
        Opcode::Any => Ok(LeafMatcher::Any),
        Opcode::AnyAll | Opcode::AnyU => Ok(LeafMatcher::AnyAll),
        Opcode::Character => Ok(LeafMatcher::Char(char::from_u32(instr.operands[0]).unwrap_or('\u{FFFD}'))),
        Opcode::Property => Ok(LeafMatcher::Property(Property(instr.operands[0]))),
        Opcode::Range => {
            let count = instr.operands[0] as usize;
            let mut ranges = Vec::with_capacity(count);
            for i in 0..count {
                let lo = char::from_u32(instr.operands[1 + i * 2]).unwrap_or('\u{0}');
                let hi = char::from_u32(instr.operands[2 + i * 2]).unwrap_or('\u{0}');
                ranges.push((lo, hi));
            }
            Ok(LeafMatcher::Range(ranges))
        }
        other => Err(Error::Illegal(format!("{:?} cannot be a repeat-one body", other))),
    }
}

fn compile_call_ref(
    arena: &mut NodeArena,
    instrs: &[Instruction],
    pos: usize,
    tail: Option<NodeId>,
    ignore_case: bool,
    ctx: &mut BuildCtx,
) -> Result<(NodeId, usize)> {
    let call_ref = instrs[pos].operands[0];
    // The callee always resumes at its caller via GROUP_RETURN (§4.4 "case
    // GROUP_CALL"/"case GROUP_RETURN"), whether the compiler emitted an
    // explicit GROUP_RETURN mid-body or the body simply runs off its `End`
    // — this synthetic node is the fallback for the latter case.
    let ret = arena.push(Node::new(Opcode::GroupReturn));
    let (body_head, p1) = compile_seq(arena, instrs, pos + 1, Some(ret), ignore_case, ctx)?;
    if p1 >= instrs.len() || instrs[p1].op != Opcode::End {
        return Err(Error::Illegal(format!("expected End closing CallRef at {}", p1)));
    }
    ctx.call_ref_info.insert(call_ref, CallRefInfo { defining_node: Some(body_head), defined: true, used: false });
    compile_seq(arena, instrs, p1 + 1, tail, ignore_case, ctx)
}

fn compile_group_call(
    arena: &mut NodeArena,
    instrs: &[Instruction],
    pos: usize,
    tail: Option<NodeId>,
    ignore_case: bool,
    ctx: &mut BuildCtx,
) -> Result<(NodeId, usize)> {
    let call_ref = instrs[pos].operands[0];
    ctx.call_ref_info.entry(call_ref).or_default().used = true;
    let (rest, new_pos) = compile_seq(arena, instrs, pos + 1, tail, ignore_case, ctx)?;
    let mut node = Node::new(Opcode::GroupCall).with_payload(Payload::GroupCallTarget { call_ref });
    node.next_1 = Some(rest);
    let id = arena.push(node);
    Ok((id, new_pos))
}

fn compile_fuzzy(
    arena: &mut NodeArena,
    instrs: &[Instruction],
    pos: usize,
    tail: Option<NodeId>,
    ignore_case: bool,
    ctx: &mut BuildCtx,
) -> Result<(NodeId, usize)> {
    let o = &instrs[pos].operands;
    let section = ctx.fuzzy_count as u32;
    ctx.fuzzy_count += 1;
    let spec = crate::fuzzy::FuzzySpec {
        max_sub: o[0],
        max_ins: o[1],
        max_del: o[2],
        max_err: o[3],
        sub_cost: o[4],
        ins_cost: o[5],
        del_cost: o[6],
        max_cost: o[7],
        section,
    };
    ctx.fuzzy_specs.push(spec);

    let placeholder_min = crate::fuzzy::FuzzyMinSpec { section, min_sub: 0, min_ins: 0, min_del: 0, min_err: 0 };
    let end_id = arena.push(Node::new(Opcode::EndFuzzy).with_payload(Payload::EndFuzzy(placeholder_min)));

    ctx.fuzzy_stack.push(section);
    let body_result = compile_seq(arena, instrs, pos + 1, Some(end_id), ignore_case, ctx);
    ctx.fuzzy_stack.pop();
    let (body_head, p1) = body_result?;
    if p1 >= instrs.len() || instrs[p1].op != Opcode::EndFuzzy {
        return Err(Error::Illegal(format!("expected EndFuzzy closing fuzzy section at {}", p1)));
    }
    let eo = &instrs[p1].operands;
    let min_spec = crate::fuzzy::FuzzyMinSpec { section, min_sub: eo[1], min_ins: eo[2], min_del: eo[3], min_err: eo[4] };
    arena.get_mut(end_id).payload = Payload::EndFuzzy(min_spec);

    let (rest, new_pos) = compile_seq(arena, instrs, p1 + 1, tail, ignore_case, ctx)?;
    arena.get_mut(end_id).next_1 = Some(rest);

    let mut start_node = Node::new(Opcode::Fuzzy).with_payload(Payload::Fuzzy(spec)).with_flags(NodeFlags::FUZZY);
    start_node.next_1 = Some(body_head);
    let start_id = arena.push(start_node);

    Ok((start_id, new_pos))
}

/// Post-pass 1 is implicit here: the builder never creates a `Branch`
/// with a null `next_2` in the first place (every branch arm is joined),
/// so there is nothing to splice out after the fact.
///
/// Post-pass: `set_test_nodes` (§4.3) — populate each node's `test_node`
/// with the first successor that isn't a group-boundary marker, so the
/// driver can cheaply peek one step ahead.
fn post_pass_set_test_nodes(pattern: &mut Pattern) {
    let ids: Vec<NodeId> = pattern.arena.iter().map(|(id, _)| id).collect();
    for id in ids {
        let mut cur = pattern.arena.get(id).next_1;
        let mut guard = 0;
        while let Some(c) = cur {
            guard += 1;
            if guard > pattern.arena.len() + 1 {
                break; // defensive: a cycle through only group markers shouldn't occur
            }
            let n = pattern.arena.get(c);
            let is_group_marker = matches!(n.payload, Payload::Group { .. });
            if !is_group_marker {
                pattern.arena.get(id).test_node.set(Some(c));
                break;
            }
            cur = n.next_1;
        }
    }
}

/// Post-pass: mark which repeats need body/tail guards at runtime (§4.3
/// "Add repeat guards"). Conservative approximation: any repeat whose body
/// contains a group boundary is marked `BODY_NEEDS_GUARD`; any repeat
/// whose node graph positions a group reference right after its tail
/// entry is marked `TAIL_NEEDS_GUARD`. Since zero-width-body detection is
/// what actually matters for correctness (§4.5's anti-infinite-loop
/// invariant, which the driver enforces directly via the `changed` check
/// against `capture_change`/`text_pos`), guards here are a conservative
/// "always guard" policy rather than a precise static analysis — false
/// positives just mean an extra, harmless guard entry.
fn post_pass_repeat_guards(pattern: &mut Pattern) {
    for info in pattern.repeat_info.iter_mut() {
        info.status = RepeatStatus::BODY_NEEDS_GUARD | RepeatStatus::TAIL_NEEDS_GUARD;
    }
}

/// Post-pass: record, on each `Atomic`/`Lookaround` start node, which
/// repeat/fuzzy sections occur strictly within its subpattern, so their
/// guards can be reset on exit (§4.3, §4.6).
fn post_pass_nested_sections(pattern: &mut Pattern) {
    let ids: Vec<NodeId> = pattern
        .arena
        .iter()
        .filter(|(_, n)| matches!(n.op, Opcode::Atomic | Opcode::Lookaround))
        .map(|(id, _)| id)
        .collect();
    for id in ids {
        let sub = pattern.arena.get(id).next_2;
        let mut repeats = Vec::new();
        let mut fuzzy = Vec::new();
        if let Some(sub) = sub {
            walk_collect_sections(pattern, sub, &mut repeats, &mut fuzzy, &mut Vec::new());
        }
        repeats.sort_unstable();
        repeats.dedup();
        fuzzy.sort_unstable();
        fuzzy.dedup();
        pattern.arena.get_mut(id).nested_repeats = repeats;
        pattern.arena.get_mut(id).nested_fuzzy = fuzzy;
    }
}

fn walk_collect_sections(pattern: &Pattern, start: NodeId, repeats: &mut Vec<u32>, fuzzy: &mut Vec<u32>, visited: &mut Vec<NodeId>) {
    let mut stack = vec![start];
    while let Some(id) = stack.pop() {
        if visited.contains(&id) {
            continue;
        }
        visited.push(id);
        let node = pattern.arena.get(id);
        match &node.payload {
            Payload::Repeat { index, .. } => repeats.push(*index),
            Payload::RepeatOne { index, .. } => repeats.push(*index),
            Payload::Fuzzy(spec) => fuzzy.push(spec.section),
            _ => {}
        }
        if let Some(n1) = node.next_1 {
            stack.push(n1);
        }
        if let Some(n2) = node.next_2 {
            stack.push(n2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Opcode as Op;

    fn word(op: Op) -> u32 {
        op as u32
    }

    #[test]
    fn build_simple_literal_chain() {
        // `ab`
        let words = vec![
            word(Op::Character), b'a' as u32,
            word(Op::Character), b'b' as u32,
            word(Op::Success),
        ];
        let pattern = build(&words, Flags::empty(), EncodingKind::Ascii).unwrap();
        assert_eq!(pattern.arena.len(), 3);
    }

    #[test]
    fn build_branch_and_group() {
        // (?:a|b)c  compiled as: Group(0,0) Branch(2) Char(a) Next Char(b) End End Char(c) Success
        let words = vec![
            word(Op::Group), 0, 0,
              word(Op::Branch), 2,
                word(Op::Character), b'a' as u32,
              word(Op::Next),
                word(Op::Character), b'b' as u32,
              word(Op::End),
            word(Op::End),
            word(Op::Character), b'c' as u32,
            word(Op::Success),
        ];
        let pattern = build(&words, Flags::empty(), EncodingKind::Ascii).unwrap();
        assert!(pattern.group_info[0].defining_node.is_some());
    }

    #[test]
    fn build_greedy_repeat() {
        // a{2,4}
        let words = vec![
            word(Op::GreedyRepeat), 0, 2, 4,
              word(Op::Character), b'a' as u32,
            word(Op::EndGreedyRepeat), 0,
            word(Op::Success),
        ];
        let pattern = build(&words, Flags::empty(), EncodingKind::Ascii).unwrap();
        assert_eq!(pattern.repeat_count, 1);
    }

    #[test]
    fn build_repeat_one() {
        let words = vec![
            word(Op::GreedyRepeatOne), 0, 0, u32::MAX,
              word(Op::Any),
            word(Op::Success),
        ];
        let pattern = build(&words, Flags::empty(), EncodingKind::Ascii).unwrap();
        assert_eq!(pattern.repeat_count, 1);
    }

    #[test]
    fn build_atomic_group() {
        let words = vec![
            word(Op::Atomic), 1,
              word(Op::Character), b'x' as u32,
            word(Op::End),
            word(Op::Success),
        ];
        build(&words, Flags::empty(), EncodingKind::Ascii).unwrap();
    }

    #[test]
    fn build_fuzzy_section() {
        let words = vec![
            word(Op::Fuzzy), 1, 1, 1, 2, 1, 1, 1, 2,
              word(Op::Character), b'x' as u32,
            word(Op::EndFuzzy), 0, 0, 0, 0,
            word(Op::Success),
        ];
        let pattern = build(&words, Flags::empty(), EncodingKind::Ascii).unwrap();
        assert_eq!(pattern.fuzzy_count, 1);
        assert!(pattern.is_fuzzy);
    }

    #[test]
    fn malformed_opcode_stream_is_illegal() {
        let words = vec![word(Op::Branch), 2, word(Op::Character), b'a' as u32, word(Op::Success)];
        assert!(build(&words, Flags::empty(), EncodingKind::Ascii).is_err());
    }
}
