// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The fuzzy-matching layer (component F, §4.10): cost/error budgets for a
//! `FUZZY`/`END_FUZZY` section and the substitution/insertion/deletion
//! transition generator that interposes around ordinary node transitions.

/// The three edit-transition kinds a fuzzy section can admit, tried in
/// this order on a mismatch (§4.10 "Retrying a fuzzy decision iterates
/// through SUB→INS→DEL in order").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FuzzyType {
    Substitution,
    Insertion,
    Deletion,
}

impl FuzzyType {
    pub fn next(self) -> Option<FuzzyType> {
        match self {
            FuzzyType::Substitution => Some(FuzzyType::Insertion),
            FuzzyType::Insertion => Some(FuzzyType::Deletion),
            FuzzyType::Deletion => None,
        }
    }
}

/// The budget a `FUZZY` opcode carries (§4.10, §6.3).
#[derive(Clone, Copy, Debug)]
pub struct FuzzySpec {
    pub max_sub: u32,
    pub max_ins: u32,
    pub max_del: u32,
    pub max_err: u32,
    pub sub_cost: u32,
    pub ins_cost: u32,
    pub del_cost: u32,
    pub max_cost: u32,
    pub section: u32,
}

/// The minimum-count constraints an `END_FUZZY` carries (§4.10).
#[derive(Clone, Copy, Debug)]
pub struct FuzzyMinSpec {
    pub section: u32,
    pub min_sub: u32,
    pub min_ins: u32,
    pub min_del: u32,
    pub min_err: u32,
}

/// Per-section running counters, snapshotted on `FUZZY` entry and restored
/// on backtrack (§4.10, §3.2 invariant `sum(counts[SUB|INS|DEL]) ==
/// counts[ERR]`).
#[derive(Clone, Copy, Debug, Default)]
pub struct FuzzyCounts {
    pub sub: u32,
    pub ins: u32,
    pub del: u32,
    pub err: u32,
    pub total_cost: u32,
}

impl FuzzyCounts {
    pub fn new() -> Self {
        FuzzyCounts::default()
    }

    pub fn check_invariant(&self) -> bool {
        self.sub + self.ins + self.del == self.err
    }

    pub fn apply(&mut self, ty: FuzzyType, spec: &FuzzySpec) {
        match ty {
            FuzzyType::Substitution => {
                self.sub += 1;
                self.total_cost += spec.sub_cost;
            }
            FuzzyType::Insertion => {
                self.ins += 1;
                self.total_cost += spec.ins_cost;
            }
            FuzzyType::Deletion => {
                self.del += 1;
                self.total_cost += spec.del_cost;
            }
        }
        self.err += 1;
    }

    pub fn unapply(&mut self, ty: FuzzyType, spec: &FuzzySpec) {
        match ty {
            FuzzyType::Substitution => {
                self.sub -= 1;
                self.total_cost -= spec.sub_cost;
            }
            FuzzyType::Insertion => {
                self.ins -= 1;
                self.total_cost -= spec.ins_cost;
            }
            FuzzyType::Deletion => {
                self.del -= 1;
                self.total_cost -= spec.del_cost;
            }
        }
        self.err -= 1;
    }

    /// Whether admitting one more transition of `ty` still respects the
    /// section's per-kind and aggregate budgets.
    pub fn admits(&self, ty: FuzzyType, spec: &FuzzySpec, max_cost_override: u32) -> bool {
        if self.err >= spec.max_err {
            return false;
        }
        let cost_after = self.total_cost
            + match ty {
                FuzzyType::Substitution => spec.sub_cost,
                FuzzyType::Insertion => spec.ins_cost,
                FuzzyType::Deletion => spec.del_cost,
            };
        if cost_after > max_cost_override {
            return false;
        }
        match ty {
            FuzzyType::Substitution => self.sub < spec.max_sub,
            FuzzyType::Insertion => self.ins < spec.max_ins,
            FuzzyType::Deletion => self.del < spec.max_del,
        }
    }

    /// Whether the section's minimums (`END_FUZZY`'s `min_*`) are all met.
    /// If not, `too_few_errors` should be signalled so an enclosing
    /// repeat/atomic is forced to retry with more errors admitted (§4.10).
    pub fn meets_minimums(&self, min: &FuzzyMinSpec) -> bool {
        self.sub >= min.min_sub
            && self.ins >= min.min_ins
            && self.del >= min.min_del
            && self.err >= min.min_err
    }
}

/// Per-State fuzzy accumulators: one `FuzzyCounts` per fuzzy section in
/// the pattern, plus the `too_few_errors` flag described in §4.10/§7.
#[derive(Clone, Debug)]
pub struct FuzzyInfo {
    counts: Vec<FuzzyCounts>,
    pub too_few_errors: bool,
}

impl FuzzyInfo {
    pub fn new(fuzzy_count: usize) -> Self {
        FuzzyInfo { counts: vec![FuzzyCounts::new(); fuzzy_count], too_few_errors: false }
    }

    pub fn counts(&self, section: usize) -> FuzzyCounts {
        self.counts[section]
    }

    pub fn counts_mut(&mut self, section: usize) -> &mut FuzzyCounts {
        &mut self.counts[section]
    }

    pub fn reset(&mut self) {
        for c in &mut self.counts {
            *c = FuzzyCounts::new();
        }
        self.too_few_errors = false;
    }

    /// Aggregate cost/error totals across every section, for `BESTMATCH`
    /// ranking (§4.4) and the `fuzzy_counts` field of a `MatchResult`
    /// (§6.2).
    pub fn totals(&self) -> (u32, u32, u32, u32) {
        self.counts.iter().fold((0, 0, 0, 0), |(s, i, d, c), fc| {
            (s + fc.sub, i + fc.ins, d + fc.del, c + fc.total_cost)
        })
    }

    /// Snapshot for an atomic/lookaround/group-call save point (§4.6).
    pub fn snapshot(&self) -> Vec<FuzzyCounts> {
        self.counts.clone()
    }

    pub fn restore(&mut self, snapshot: Vec<FuzzyCounts>) {
        self.counts = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> FuzzySpec {
        FuzzySpec {
            max_sub: 2,
            max_ins: 2,
            max_del: 2,
            max_err: 3,
            sub_cost: 1,
            ins_cost: 1,
            del_cost: 1,
            max_cost: 3,
            section: 0,
        }
    }

    #[test]
    fn apply_unapply_roundtrip() {
        let spec = spec();
        let mut counts = FuzzyCounts::new();
        counts.apply(FuzzyType::Substitution, &spec);
        assert!(counts.check_invariant());
        assert_eq!(counts.err, 1);
        counts.unapply(FuzzyType::Substitution, &spec);
        assert_eq!(counts.err, 0);
        assert!(counts.check_invariant());
    }

    #[test]
    fn budget_enforced() {
        let spec = spec();
        let mut counts = FuzzyCounts::new();
        for _ in 0..3 {
            assert!(counts.admits(FuzzyType::Insertion, &spec, spec.max_cost));
            counts.apply(FuzzyType::Insertion, &spec);
        }
        // max_err reached.
        assert!(!counts.admits(FuzzyType::Insertion, &spec, spec.max_cost));
    }

    #[test]
    fn minimums_checked() {
        let min = FuzzyMinSpec { section: 0, min_sub: 1, min_ins: 0, min_del: 0, min_err: 1 };
        let counts = FuzzyCounts::new();
        assert!(!counts.meets_minimums(&min));
        let mut counts2 = counts;
        counts2.apply(FuzzyType::Substitution, &spec());
        assert!(counts2.meets_minimums(&min));
    }
}
