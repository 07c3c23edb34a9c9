use crate::delimiters::Delimiters;
use crate::error::SyntaxError;
use crate::lexer::Lexer;
use crate::raw::split_values;
use crate::tokens::SepKind;
use crate::tokens::Token;
use crate::tokens::TokenKind;
use crate::tree::TagData;
use crate::tree::TagId;
use crate::tree::TagKind;
use crate::tree::TagTree;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Key,
    Header,
    Body,
    Closing,
}

/// A tag whose close has not been seen yet.
struct OpenTag {
    id: TagId,
    kind: TagKind,
    phase: Phase,
    key: String,
    values: Vec<Vec<String>>,
    value_start: usize,
    body_start: usize,
}

impl OpenTag {
    fn new(id: TagId, kind: TagKind) -> Self {
        Self {
            id,
            kind,
            phase: Phase::Key,
            key: String::new(),
            values: Vec::new(),
            value_start: 0,
            body_start: 0,
        }
    }

    fn push_value(&mut self, source: &str, end: usize) {
        let value = source[self.value_start..end].to_string();
        if let Some(group) = self.values.last_mut() {
            group.push(value);
        }
    }
}

/// Builds a [`TagTree`] from the token stream of `source`.
///
/// Values are sliced from the source between separators that belong to the
/// tag itself, so nested tags stay verbatim inside their parent's values.
pub struct Parser<'a> {
    source: &'a str,
    delimiters: &'a Delimiters,
    tree: TagTree,
    stack: Vec<OpenTag>,
}

impl<'a> Parser<'a> {
    #[must_use]
    pub fn new(source: &'a str, delimiters: &'a Delimiters) -> Self {
        Self {
            source,
            delimiters,
            tree: TagTree::new(source.len()),
            stack: Vec::new(),
        }
    }

    pub fn parse(mut self) -> Result<TagTree, SyntaxError> {
        for token in Lexer::new(self.source, self.delimiters) {
            self.consume(token?);
        }

        tracing::trace!(tags = self.tree.len(), "Parsed tag tree");
        Ok(self.tree)
    }

    fn consume(&mut self, token: Token) {
        match token.kind {
            TokenKind::InlineOpen => self.open(TagKind::Inline, token.span.start),
            TokenKind::BlockOpen => self.open(TagKind::Block, token.span.start),
            TokenKind::KeyName(name) => {
                if let Some(tag) = self.stack.last_mut() {
                    if tag.phase == Phase::Key {
                        tag.key = name;
                    }
                }
            }
            TokenKind::Sep(kind) => {
                let source = self.source;
                if let Some(tag) = self.stack.last_mut() {
                    if tag.phase == Phase::Key {
                        tag.phase = Phase::Header;
                        tag.values.push(Vec::new());
                    } else {
                        tag.push_value(source, token.span.start);
                        if kind == SepKind::Group {
                            tag.values.push(Vec::new());
                        }
                    }
                    tag.value_start = token.span.end;
                }
            }
            TokenKind::BlockClose => {
                let source = self.source;
                let delimiters = self.delimiters;
                if let Some(tag) = self.stack.last_mut() {
                    let body = &source[tag.body_start..token.span.start];
                    tag.values.extend(split_values(body, delimiters));
                    tag.phase = Phase::Closing;
                }
            }
            TokenKind::Close => self.close(token.span.start, token.span.end),
            TokenKind::Text => {}
        }
    }

    fn open(&mut self, kind: TagKind, start: usize) {
        let parent = self.stack.last().map_or(TagId::ROOT, |tag| tag.id);
        let id = self.tree.alloc(kind, start, parent);
        self.stack.push(OpenTag::new(id, kind));
    }

    fn close(&mut self, start: usize, end: usize) {
        let source = self.source;
        let Some(tag) = self.stack.last_mut() else {
            return;
        };

        if tag.phase == Phase::Header {
            tag.push_value(source, start);
        }

        if tag.kind == TagKind::Block && matches!(tag.phase, Phase::Key | Phase::Header) {
            tag.phase = Phase::Body;
            tag.body_start = end;
            return;
        }

        if let Some(tag) = self.stack.pop() {
            self.tree.finish(tag.id, end, TagData::new(tag.key, tag.values));
        }
    }
}

/// Lexes and parses `source` in one step.
pub fn parse(source: &str, delimiters: &Delimiters) -> Result<TagTree, SyntaxError> {
    Parser::new(source, delimiters).parse()
}
