//! Lexing and emission of the nested-list text format.

pub mod sexp;
pub mod writer;

pub use sexp::{ParseError, SExp, SExpParser};
pub use writer::{compact, render, to_text, wrap_long_lines};
