// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A backtracking regular-expression matching engine: given an already
//! compiled opcode vector (`builder::build`), runs capturing, fuzzy,
//! lookaround, recursive-subpattern, and string-set matching over `char`
//! text. Parsing a pattern string into that opcode vector is a separate
//! concern and out of scope for this crate; callers bring their own
//! front end and hand this crate the decoded instruction stream.
//!
//! The pieces, roughly bottom-up:
//!
//! - [`cursor`]/[`encoding`]: indexed text access and the per-codepoint
//!   predicates (word/line/grapheme boundaries, case folding) the driver
//!   consults without embedding Unicode data itself.
//! - [`node`]/[`opcode`]: the node graph a pattern compiles down to, and
//!   the instruction encoding `builder::build` decodes.
//! - [`capture`]/[`repeat`]/[`fuzzy`]/[`backtrack`]/[`saved`]/[`groupcall`]:
//!   the per-match mutable stores [`state::State`] is built from.
//! - [`builder`]: turns an opcode vector into a [`pattern::Pattern`].
//! - [`driver`]: the backtracking VM that walks a pattern's node graph.
//! - [`ops`]/[`scanner`]/[`result`]: the public surface built on top —
//!   `match`/`search`/`findall`/`split`/`sub` and the result type they
//!   hand back.

pub mod backtrack;
pub mod builder;
pub mod capture;
pub mod cursor;
pub mod driver;
pub mod encoding;
pub mod error;
pub mod fuzzy;
pub mod groupcall;
pub mod literals;
pub mod node;
pub mod opcode;
pub mod ops;
pub mod pattern;
pub mod repeat;
pub mod result;
pub mod saved;
pub mod scanner;
pub mod state;
pub mod stringset;

pub use builder::build;
pub use capture::Span;
pub use error::{Error, Result, Status};
pub use ops::{findall, fullmatch, match_, search, split, sub, subf, subfn_with, subn, FindallItem};
pub use pattern::{BuildOptions, EncodingKind, MatchOptions, Pattern};
pub use result::{GroupResult, MatchResult};
pub use scanner::{Scanner, SplitIter};
pub use state::{CancelFlag, Concurrent};
