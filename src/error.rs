// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The surface error codes a caller can observe (§6.5), plus the internal
//! status propagation described in §7.
//!
//! `Failure` (no match) is never constructed as an `Err`: the operations in
//! `ops.rs` fold a plain match failure into `Ok(None)`/an empty result, as
//! §7 requires. The variant still exists here because it is part of the
//! wire contract other components reason about (e.g. a `LOOKAROUND`
//! subpattern's `basic_match` returns a `Status`, and `Status::Failure`
//! triggers `goto backtrack` rather than bubbling an error).

use std::error;
use std::fmt;

/// Outcome of a recursive `basic_match` call or a top-level operation.
///
/// This is distinct from `Error`: a `Status` is the internal propagation
/// unit described in §7 ("every allocation and every recursive basic_match
/// call returns a status code"). `Error` is what a caller ultimately sees
/// once a `Status` other than `Success`/`Failure`/`Partial` has been turned
/// into a typed error by `ops.rs`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure,
    Partial,
    Interrupted,
}

/// The crate's error type, covering every code in §6.5.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// A corrupt or unrecognised opcode stream.
    Illegal(String),
    /// An engine invariant was violated; this indicates a bug in this crate
    /// rather than bad input.
    Internal(String),
    /// A `State` was accessed from two threads without the per-State lock
    /// held, or was re-entered from within a string-set membership probe.
    Concurrent,
    /// An allocation failed.
    Memory,
    /// The caller's cancellation flag was observed at a checkpoint.
    Interrupted,
    /// The backtrack stack exceeded `RE_MAX_BACKTRACK_ALLOC` (§5).
    Backtracking,
    /// A substitution template referenced a group that doesn't exist, or
    /// was otherwise malformed.
    Replacement(String),
    /// `REF_GROUP`/`group()` referenced a group index that the pattern
    /// doesn't define.
    InvalidGroupRef(i64),
    /// A group was looked up by a value of the wrong type (e.g. a negative
    /// index where the host API disallows it).
    GroupIndexType,
    /// A group was looked up by a name the pattern doesn't define.
    NoSuchGroup(String),
    /// A position argument (`pos`/`endpos`) was out of bounds for the text.
    Index,
    /// The host asked for byte-based matching against non-UTF-8-checked
    /// input where UTF-8 validity was required, or vice versa.
    NotString,
    NotUnicode,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::Illegal(ref msg) => write!(f, "illegal opcode stream: {}", msg),
            Error::Internal(ref msg) => write!(f, "internal engine error: {}", msg),
            Error::Concurrent => write!(f, "state accessed concurrently without a lock"),
            Error::Memory => write!(f, "allocation failed"),
            Error::Interrupted => write!(f, "matching was interrupted"),
            Error::Backtracking => write!(f, "backtracking budget exceeded"),
            Error::Replacement(ref msg) => write!(f, "invalid replacement template: {}", msg),
            Error::InvalidGroupRef(idx) => write!(f, "no such group: {}", idx),
            Error::GroupIndexType => write!(f, "group index has the wrong type"),
            Error::NoSuchGroup(ref name) => write!(f, "no such group: {:?}", name),
            Error::Index => write!(f, "position out of range"),
            Error::NotString => write!(f, "expected a string input"),
            Error::NotUnicode => write!(f, "input was not valid Unicode"),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = ::std::result::Result<T, Error>;
