use serde::Serialize;

use crate::delimiters::Delimiters;
use crate::error::SyntaxError;
use crate::lexer::Lexer;
use crate::tokens::TokenKind;
use crate::tree::TagData;
use crate::tree::TagKind;

/// How a filter wants its tag values split.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Separators {
    /// The template's own `sep` and `sub_sep`.
    #[default]
    Template,
    /// Explicit separators. `None` leaves that level unsplit.
    Custom {
        group: Option<String>,
        value: Option<String>,
    },
}

impl Separators {
    #[must_use]
    pub fn custom(group: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Custom {
            group: Some(group.into()),
            value: Some(value.into()),
        }
    }

    /// No splitting at all: the whole argument text is one value.
    #[must_use]
    pub fn none() -> Self {
        Self::Custom {
            group: None,
            value: None,
        }
    }

    fn resolve<'a>(&'a self, delimiters: &'a Delimiters) -> (Option<&'a str>, Option<&'a str>) {
        match self {
            Self::Template => (Some(delimiters.sep()), Some(delimiters.sub_sep())),
            Self::Custom { group, value } => (
                group.as_deref().filter(|s| !s.is_empty()),
                value.as_deref().filter(|s| !s.is_empty()),
            ),
        }
    }
}

/// A single tag re-read from live text.
///
/// The parsed tree describes the pristine template; once filters have
/// rewritten a tag's children, the tag's key and values have to be taken from
/// the current text instead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RawTag {
    pub kind: TagKind,
    pub key: String,
    /// Text between the first separator and the header close, if any.
    pub header: Option<String>,
    /// Text between the header close and the block close, for block tags.
    pub body: Option<String>,
    /// The complete tag text.
    pub text: String,
}

impl RawTag {
    /// Reads `text`, which must consist of exactly one tag.
    pub fn from_text(text: &str, delimiters: &Delimiters) -> Result<Self, SyntaxError> {
        let mut kind = None;
        let mut key = String::new();
        let mut header_start = None;
        let mut header_end = None;
        let mut body_start = None;
        let mut body_end = None;
        let mut closed = false;

        for token in Lexer::new(text, delimiters) {
            let token = token?;

            if closed || (kind.is_none() && !token.is_open()) {
                return Err(SyntaxError::NotATag {
                    position: token.span.start,
                    found: token.lexeme(text).to_string(),
                });
            }
            if token.depth != 1 {
                continue;
            }

            match &token.kind {
                TokenKind::InlineOpen => kind = Some(TagKind::Inline),
                TokenKind::BlockOpen => kind = Some(TagKind::Block),
                TokenKind::KeyName(name) if header_end.is_none() && header_start.is_none() => {
                    key.clone_from(name);
                }
                TokenKind::Sep(_) if header_start.is_none() && header_end.is_none() => {
                    header_start = Some(token.span.end);
                }
                TokenKind::BlockClose => body_end = Some(token.span.start),
                TokenKind::Close => {
                    if header_end.is_none() {
                        header_end = Some(token.span.start);
                        if kind == Some(TagKind::Block) {
                            body_start = Some(token.span.end);
                            continue;
                        }
                    }
                    closed = true;
                }
                _ => {}
            }
        }

        let Some(kind) = kind.filter(|_| closed) else {
            return Err(SyntaxError::NotATag {
                position: 0,
                found: text.to_string(),
            });
        };

        let header = header_start
            .zip(header_end)
            .map(|(start, end)| text[start..end].to_string());
        let body = body_start
            .zip(body_end)
            .map(|(start, end)| text[start..end].to_string());

        Ok(Self {
            kind,
            key,
            header,
            body,
            text: text.to_string(),
        })
    }

    /// Splits the header and body into argument groups with `separators`.
    /// Separators inside nested tags are left alone.
    #[must_use]
    pub fn data(&self, separators: &Separators, delimiters: &Delimiters) -> TagData {
        let (group, value) = separators.resolve(delimiters);
        let mut values = self
            .header
            .as_deref()
            .map(|header| split_top_level(header, group, value, delimiters))
            .unwrap_or_default();
        if let Some(body) = &self.body {
            values.extend(split_top_level(body, group, value, delimiters));
        }

        TagData::new(self.key.clone(), values)
    }
}

/// Splits `text` with the template separators of `delimiters`.
#[must_use]
pub fn split_values(text: &str, delimiters: &Delimiters) -> Vec<Vec<String>> {
    split_top_level(
        text,
        Some(delimiters.sep()),
        Some(delimiters.sub_sep()),
        delimiters,
    )
}

/// Splits `text` into groups at `group` and each group into values at
/// `value`, ignoring separators inside tags. Text that does not lex is split
/// without regard for nesting.
#[must_use]
pub fn split_top_level(
    text: &str,
    group: Option<&str>,
    value: Option<&str>,
    delimiters: &Delimiters,
) -> Vec<Vec<String>> {
    let mut splitter = Splitter::new(group, value);

    let tokens: Result<Vec<_>, _> = Lexer::new(text, delimiters).collect();
    match tokens {
        Ok(tokens) => {
            for token in tokens {
                let lexeme = token.lexeme(text);
                if token.depth == 0 && token.kind == TokenKind::Text {
                    splitter.feed(lexeme);
                } else {
                    splitter.current.push_str(lexeme);
                }
            }
        }
        Err(_) => splitter.feed(text),
    }

    splitter.finish()
}

struct Splitter<'a> {
    group: Option<&'a str>,
    value: Option<&'a str>,
    groups: Vec<Vec<String>>,
    current: String,
}

impl<'a> Splitter<'a> {
    fn new(group: Option<&'a str>, value: Option<&'a str>) -> Self {
        Self {
            group,
            value,
            groups: vec![Vec::new()],
            current: String::new(),
        }
    }

    fn feed(&mut self, mut text: &str) {
        loop {
            let group_at = self.group.and_then(|sep| text.find(sep).map(|at| (at, sep)));
            let value_at = self.value.and_then(|sep| text.find(sep).map(|at| (at, sep)));

            let (at, sep, new_group) = match (group_at, value_at) {
                (Some((g, gs)), Some((v, _))) if g <= v => (g, gs, true),
                (Some((g, gs)), None) => (g, gs, true),
                (_, Some((v, vs))) => (v, vs, false),
                (None, None) => {
                    self.current.push_str(text);
                    return;
                }
            };

            self.current.push_str(&text[..at]);
            self.push_value();
            if new_group {
                self.groups.push(Vec::new());
            }
            text = &text[at + sep.len()..];
        }
    }

    fn push_value(&mut self) {
        let value = std::mem::take(&mut self.current);
        if let Some(group) = self.groups.last_mut() {
            group.push(value);
        }
    }

    fn finish(mut self) -> Vec<Vec<String>> {
        self.push_value();
        self.groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(groups: &[&[&str]]) -> Vec<Vec<String>> {
        groups
            .iter()
            .map(|group| group.iter().map(ToString::to_string).collect())
            .collect()
    }

    mod splitting {
        use super::*;

        #[test]
        fn test_groups_and_values() {
            let delimiters = Delimiters::default();
            assert_eq!(
                split_values("a||b::c", &delimiters),
                strings(&[&["a", "b"], &["c"]])
            );
        }

        #[test]
        fn test_empty_text_is_one_empty_value() {
            let delimiters = Delimiters::default();
            assert_eq!(split_values("", &delimiters), strings(&[&[""]]));
        }

        #[test]
        fn test_trailing_separator() {
            let delimiters = Delimiters::default();
            assert_eq!(
                split_values("a::", &delimiters),
                strings(&[&["a"], &[""]])
            );
        }

        #[test]
        fn test_nested_tags_are_not_split() {
            let delimiters = Delimiters::default();
            assert_eq!(
                split_values("x [[b::c||d]]::y", &delimiters),
                strings(&[&["x [[b::c||d]]"], &["y"]])
            );
        }

        #[test]
        fn test_nested_block_body_is_not_split() {
            let delimiters = Delimiters::default();
            assert_eq!(
                split_values("[[#k]]a::b[[/k]]::c", &delimiters),
                strings(&[&["[[#k]]a::b[[/k]]"], &["c"]])
            );
        }

        #[test]
        fn test_unlexable_text_splits_plainly() {
            let delimiters = Delimiters::default();
            assert_eq!(
                split_values("[[open::x", &delimiters),
                strings(&[&["[[open"], &["x"]])
            );
        }

        #[test]
        fn test_unsplit_levels() {
            let delimiters = Delimiters::default();
            assert_eq!(
                split_top_level("a||b::c", None, None, &delimiters),
                strings(&[&["a||b::c"]])
            );
            assert_eq!(
                split_top_level("a||b::c", Some("::"), None, &delimiters),
                strings(&[&["a||b"], &["c"]])
            );
        }
    }

    mod raw_tags {
        use super::*;

        #[test]
        fn test_inline() {
            let delimiters = Delimiters::default();
            let raw = RawTag::from_text("[[upper::hi||there::x]]", &delimiters).unwrap();
            assert_eq!(raw.kind, TagKind::Inline);
            assert_eq!(raw.key, "upper");
            assert_eq!(raw.header.as_deref(), Some("hi||there::x"));
            assert_eq!(raw.body, None);
            assert_eq!(
                raw.data(&Separators::Template, &delimiters),
                TagData::new("upper", strings(&[&["hi", "there"], &["x"]]))
            );
        }

        #[test]
        fn test_bare_key() {
            let delimiters = Delimiters::default();
            let raw = RawTag::from_text("[[x]]", &delimiters).unwrap();
            assert_eq!(raw.key, "x");
            assert_eq!(raw.header, None);
            assert!(raw.data(&Separators::Template, &delimiters).is_bare());
        }

        #[test]
        fn test_block() {
            let delimiters = Delimiters::default();
            let raw = RawTag::from_text("[[#k::a]]x::[[b::c]][[/k]]", &delimiters).unwrap();
            assert_eq!(raw.kind, TagKind::Block);
            assert_eq!(raw.key, "k");
            assert_eq!(raw.header.as_deref(), Some("a"));
            assert_eq!(raw.body.as_deref(), Some("x::[[b::c]]"));
            assert_eq!(
                raw.data(&Separators::Template, &delimiters).values,
                strings(&[&["a"], &["x"], &["[[b::c]]"]])
            );
        }

        #[test]
        fn test_nested_key_is_not_taken() {
            let delimiters = Delimiters::default();
            let raw = RawTag::from_text("[[::[[inner]]]]", &delimiters).unwrap();
            assert_eq!(raw.key, "");
            assert_eq!(raw.header.as_deref(), Some("[[inner]]"));
        }

        #[test]
        fn test_custom_separators() {
            let delimiters = Delimiters::default();
            let raw = RawTag::from_text("[[k::a,b;c]]", &delimiters).unwrap();
            assert_eq!(
                raw.data(&Separators::custom(";", ","), &delimiters).values,
                strings(&[&["a", "b"], &["c"]])
            );
            assert_eq!(
                raw.data(&Separators::none(), &delimiters).values,
                strings(&[&["a,b;c"]])
            );
        }

        #[test]
        fn test_trailing_text_is_not_a_tag() {
            let delimiters = Delimiters::default();
            assert_eq!(
                RawTag::from_text("[[a]]b", &delimiters),
                Err(SyntaxError::NotATag {
                    position: 5,
                    found: "b".to_string(),
                })
            );
        }

        #[test]
        fn test_leading_text_is_not_a_tag() {
            let delimiters = Delimiters::default();
            assert!(matches!(
                RawTag::from_text("x[[a]]", &delimiters),
                Err(SyntaxError::NotATag { position: 0, .. })
            ));
            assert!(matches!(
                RawTag::from_text("", &delimiters),
                Err(SyntaxError::NotATag { position: 0, .. })
            ));
        }

        #[test]
        fn test_broken_tag_is_a_syntax_error() {
            let delimiters = Delimiters::default();
            assert_eq!(
                RawTag::from_text("[[a::b", &delimiters),
                Err(SyntaxError::UnterminatedTag { position: 0 })
            );
        }
    }
}
