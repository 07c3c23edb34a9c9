use serde::Serialize;

use crate::delimiters::Delimiters;
use crate::error::SyntaxError;
use crate::tokens::SepKind;
use crate::tokens::Span;
use crate::tokens::Token;
use crate::tokens::TokenKind;

/// Lexer states. `Main` is implicit when the frame stack is empty; every open
/// tag owns one frame whose state moves as the tag is read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LexerState {
    Main,
    InlineKey,
    BlockKey,
    InlineTag,
    BlockTag,
    BlockMain,
    BlockClose,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
struct Frame {
    state: LexerState,
    opened_at: usize,
    keyed: bool,
}

impl Frame {
    fn new(state: LexerState, opened_at: usize) -> Self {
        Self {
            state,
            opened_at,
            keyed: false,
        }
    }
}

/// Tokenizer for tag markup.
///
/// The lexer is an iterator of `Result<Token, SyntaxError>`: it reads one token
/// per step and stops after the first error. Running it again over the same
/// text yields the same tokens.
pub struct Lexer<'a> {
    source: &'a str,
    delimiters: &'a Delimiters,
    current: usize,
    stack: Vec<Frame>,
    done: bool,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(source: &'a str, delimiters: &'a Delimiters) -> Self {
        Lexer {
            source,
            delimiters,
            current: 0,
            stack: Vec::new(),
            done: false,
        }
    }

    pub fn tokenize(self) -> Result<Vec<Token>, SyntaxError> {
        self.collect()
    }

    #[must_use]
    pub fn state(&self) -> LexerState {
        self.stack.last().map_or(LexerState::Main, |frame| frame.state)
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn next_token(&mut self) -> Result<Token, SyntaxError> {
        match self.state() {
            LexerState::Main => self.lex_main(),
            LexerState::InlineKey | LexerState::BlockKey => self.lex_key(),
            LexerState::InlineTag | LexerState::BlockTag => self.lex_values(),
            LexerState::BlockMain => self.lex_block_main(),
            LexerState::BlockClose => self.lex_block_close(),
        }
    }

    fn lex_main(&mut self) -> Result<Token, SyntaxError> {
        if self.at(self.delimiters.block_close()) {
            return Err(SyntaxError::UnexpectedBlockClose {
                position: self.current,
            });
        }
        if let Some(token) = self.lex_open() {
            return Ok(token);
        }

        let end = self.find_next(&[self.delimiters.open()]);
        Ok(self.emit(TokenKind::Text, end))
    }

    fn lex_key(&mut self) -> Result<Token, SyntaxError> {
        let keyed = self.stack.last().is_some_and(|frame| frame.keyed);

        if !keyed {
            let key_len = scan_key(&self.source[self.current..]);
            if key_len > 0 {
                let name = self.source[self.current..self.current + key_len].to_string();
                self.set_keyed();
                return Ok(self.emit(TokenKind::KeyName(name), self.current + key_len));
            }
        }

        if self.at(self.delimiters.sep()) {
            let next = match self.state() {
                LexerState::BlockKey => LexerState::BlockTag,
                _ => LexerState::InlineTag,
            };
            let token = self.emit_delimiter(TokenKind::Sep(SepKind::Group), self.delimiters.sep());
            self.set_state(next);
            return Ok(token);
        }

        if self.at(self.delimiters.close()) {
            return Ok(self.close_tag());
        }

        Err(self.invalid_key())
    }

    fn lex_values(&mut self) -> Result<Token, SyntaxError> {
        if self.at(self.delimiters.block_close()) {
            return Err(SyntaxError::UnexpectedBlockClose {
                position: self.current,
            });
        }
        if let Some(token) = self.lex_open() {
            return Ok(token);
        }
        if self.at(self.delimiters.close()) {
            return Ok(self.close_tag());
        }
        if self.at(self.delimiters.sep()) {
            return Ok(self.emit_delimiter(TokenKind::Sep(SepKind::Group), self.delimiters.sep()));
        }
        if self.at(self.delimiters.sub_sep()) {
            return Ok(
                self.emit_delimiter(TokenKind::Sep(SepKind::Value), self.delimiters.sub_sep())
            );
        }

        let end = self.find_next(&[
            self.delimiters.open(),
            self.delimiters.close(),
            self.delimiters.sep(),
            self.delimiters.sub_sep(),
        ]);
        Ok(self.emit(TokenKind::Text, end))
    }

    fn lex_block_main(&mut self) -> Result<Token, SyntaxError> {
        if self.at(self.delimiters.block_close()) {
            let token = self.emit_delimiter(TokenKind::BlockClose, self.delimiters.block_close());
            if let Some(frame) = self.stack.last_mut() {
                frame.state = LexerState::BlockClose;
                frame.keyed = false;
            }
            return Ok(token);
        }
        if let Some(token) = self.lex_open() {
            return Ok(token);
        }

        let end = self.find_next(&[self.delimiters.open()]);
        Ok(self.emit(TokenKind::Text, end))
    }

    fn lex_block_close(&mut self) -> Result<Token, SyntaxError> {
        let keyed = self.stack.last().is_some_and(|frame| frame.keyed);

        if !keyed {
            let key_len = scan_key(&self.source[self.current..]);
            if key_len > 0 {
                let name = self.source[self.current..self.current + key_len].to_string();
                self.set_keyed();
                return Ok(self.emit(TokenKind::KeyName(name), self.current + key_len));
            }
        }

        if self.at(self.delimiters.close()) {
            return Ok(self.close_tag());
        }

        Err(self.invalid_key())
    }

    /// Block opens are checked before inline opens since `open#` starts with `open`.
    fn lex_open(&mut self) -> Option<Token> {
        if self.at(self.delimiters.block_open()) {
            let start = self.current;
            self.stack.push(Frame::new(LexerState::BlockKey, start));
            return Some(self.emit_delimiter(TokenKind::BlockOpen, self.delimiters.block_open()));
        }
        if self.at(self.delimiters.open()) {
            let start = self.current;
            self.stack.push(Frame::new(LexerState::InlineKey, start));
            return Some(self.emit_delimiter(TokenKind::InlineOpen, self.delimiters.open()));
        }
        None
    }

    /// Emits `close` for the innermost tag. Inline tags and block closers pop
    /// their frame; a block header moves on to the block body.
    fn close_tag(&mut self) -> Token {
        let token = self.emit_delimiter(TokenKind::Close, self.delimiters.close());
        match self.state() {
            LexerState::BlockKey | LexerState::BlockTag => {
                self.set_state(LexerState::BlockMain);
            }
            _ => {
                self.stack.pop();
            }
        }
        token
    }

    fn emit_delimiter(&mut self, kind: TokenKind, delimiter: &str) -> Token {
        let end = self.current + delimiter.len();
        self.emit(kind, end)
    }

    fn emit(&mut self, kind: TokenKind, end: usize) -> Token {
        let token = Token::new(kind, Span::new(self.current, end), self.stack.len());
        self.current = end;
        token
    }

    fn set_state(&mut self, state: LexerState) {
        if let Some(frame) = self.stack.last_mut() {
            frame.state = state;
        }
    }

    fn set_keyed(&mut self) {
        if let Some(frame) = self.stack.last_mut() {
            frame.keyed = true;
        }
    }

    fn invalid_key(&self) -> SyntaxError {
        SyntaxError::InvalidKey {
            position: self.current,
            found: self.source[self.current..].chars().next().unwrap_or('\0'),
        }
    }

    #[inline]
    fn at(&self, delimiter: &str) -> bool {
        self.source[self.current..].starts_with(delimiter)
    }

    /// Position of the nearest occurrence of any of `patterns` after the
    /// current position, or the end of input. Always makes progress.
    fn find_next(&self, patterns: &[&str]) -> usize {
        let rest = &self.source[self.current..];
        let first_len = rest.chars().next().map_or(0, char::len_utf8);

        patterns
            .iter()
            .filter_map(|pattern| rest[first_len..].find(pattern))
            .min()
            .map_or(self.source.len(), |offset| self.current + first_len + offset)
    }

    #[inline]
    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, SyntaxError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.is_at_end() {
            self.done = true;
            return self.stack.last().map(|frame| {
                Err(SyntaxError::UnterminatedTag {
                    position: frame.opened_at,
                })
            });
        }

        let result = self.next_token();
        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}

/// Length in bytes of the key name at the start of `text`: an optional `%` or
/// a letter/underscore, more letters/underscores, then optional digits.
fn scan_key(text: &str) -> usize {
    let bytes = text.as_bytes();
    let mut pos = 0;

    match bytes.first() {
        Some(b) if *b == b'%' || b.is_ascii_alphabetic() || *b == b'_' => pos += 1,
        _ => return 0,
    }
    while pos < bytes.len() && (bytes[pos].is_ascii_alphabetic() || bytes[pos] == b'_') {
        pos += 1;
    }
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }

    pos
}
