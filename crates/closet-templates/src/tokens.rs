use serde::Serialize;

/// A byte range in the text a token or tag was read from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Which separator matched inside tag values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum SepKind {
    /// The primary separator: starts a new argument group.
    Group,
    /// The secondary separator: starts a new value inside the current group.
    Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum TokenKind {
    Text,
    InlineOpen,
    BlockOpen,
    BlockClose,
    KeyName(String),
    Sep(SepKind),
    Close,
}

/// A lexed token. `depth` is the number of tags open around the token,
/// counting the tag the token belongs to; free text outside any tag has
/// depth 0.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub depth: usize,
}

impl Token {
    #[must_use]
    pub fn new(kind: TokenKind, span: Span, depth: usize) -> Self {
        Self { kind, span, depth }
    }

    #[must_use]
    pub fn lexeme<'a>(&self, source: &'a str) -> &'a str {
        &source[self.span.start..self.span.end]
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self.kind, TokenKind::InlineOpen | TokenKind::BlockOpen)
    }
}
