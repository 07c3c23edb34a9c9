//! Tag markup lexing and parsing.
//!
//! Text mixes free content with tags such as `[[upper::hi]]` (inline) or
//! `[[#box::title]]body[[/box]]` (block). This crate turns such text into a
//! tree of tags:
//!
//! 1. **Delimiters**: the open, close and separator tokens, validated once
//! 2. **Lexing**: an explicit state-stack tokenizer ([`Lexer`])
//! 3. **Parsing**: an arena tree of tags addressed by path ([`TagTree`])
//!
//! [`RawTag`] re-reads a single tag from text that has changed since parsing,
//! which is what the rewrite loop in `closet` works with.
//!
//! ## Example
//!
//! ```
//! use closet_templates::{parse, Delimiters};
//!
//! let delimiters = Delimiters::default();
//! let tree = parse("a [[upper::hi]] b", &delimiters).unwrap();
//! let tag = tree.traverse(&[0]).unwrap();
//!
//! assert_eq!(tag.data.key, "upper");
//! assert_eq!(tag.data.value(0), Some("hi"));
//! ```

mod delimiters;
mod error;
mod lexer;
mod parser;
mod raw;
mod tokens;
mod tree;

pub use delimiters::Delimiters;
pub use error::DelimiterError;
pub use error::SyntaxError;
pub use error::TemplateError;
pub use lexer::Lexer;
pub use lexer::LexerState;
pub use parser::parse;
pub use parser::Parser;
pub use raw::split_top_level;
pub use raw::split_values;
pub use raw::RawTag;
pub use raw::Separators;
pub use tokens::SepKind;
pub use tokens::Span;
pub use tokens::Token;
pub use tokens::TokenKind;
pub use tree::TagData;
pub use tree::TagId;
pub use tree::TagInfo;
pub use tree::TagKind;
pub use tree::TagPath;
pub use tree::TagTree;
