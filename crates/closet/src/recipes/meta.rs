//! Inline macro definitions.
//!
//! `[[def::greet::Hello %0!]]` registers a filter `greet` for the rest of the
//! render call, so `[[greet::World]]` becomes `Hello World!`. Inside the body,
//! `%` and `%N` stand for argument group N of the invoking tag (`%` is group
//! 0), with its sub-values joined by the secondary separator. Missing groups
//! expand to nothing.

use closet_templates::Delimiters;
use closet_templates::Separators;
use closet_templates::TagData;
use serde::Serialize;

use crate::error::FilterError;
use crate::filters::FilterContext;
use crate::filters::FilterManager;
use crate::renderer::FilterResult;

const PLACEHOLDER: char = '%';

/// What a defined filter expands to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum MacroStyle {
    /// The substituted body itself.
    #[default]
    Text,
    /// The substituted body wrapped in tag delimiters, so the expansion is
    /// another tag that is evaluated in the next pass.
    Tag,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetaRecipe {
    name: String,
    style: MacroStyle,
    separators: Separators,
}

impl MetaRecipe {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            style: MacroStyle::default(),
            separators: Separators::Template,
        }
    }

    #[must_use]
    pub fn style(mut self, style: MacroStyle) -> Self {
        self.style = style;
        self
    }

    /// Separators used to split the arguments of defined filters.
    #[must_use]
    pub fn separators(mut self, separators: Separators) -> Self {
        self.separators = separators;
        self
    }

    pub fn install(self, manager: &mut FilterManager) {
        let Self {
            name,
            style,
            separators,
        } = self;
        let defined_separators = separators.clone();

        manager.register(
            name,
            move |tag: &TagData, ctx: &mut FilterContext<'_>| {
                define(tag, ctx, style, &defined_separators)
            },
            separators,
        );
    }
}

/// Installs `def` with the default style.
pub fn register(manager: &mut FilterManager) {
    MetaRecipe::new("def").install(manager);
}

fn define(
    tag: &TagData,
    ctx: &mut FilterContext<'_>,
    style: MacroStyle,
    separators: &Separators,
) -> Result<FilterResult, FilterError> {
    let Some(name) = tag.value(0).filter(|name| !name.is_empty()) else {
        return Err(FilterError::msg("definition has no name"));
    };
    let body: Vec<Vec<String>> = tag.values.iter().skip(1).cloned().collect();

    tracing::debug!(%name, groups = body.len(), ?style, "Defining filter");
    ctx.register(
        name,
        move |invocation: &TagData, ctx: &mut FilterContext<'_>| {
            Ok(FilterResult::pending(expand(
                &body,
                invocation,
                ctx.delimiters(),
                style,
            )))
        },
        separators.clone(),
    );

    Ok(FilterResult::ready(""))
}

fn expand(
    body: &[Vec<String>],
    invocation: &TagData,
    delimiters: &Delimiters,
    style: MacroStyle,
) -> String {
    let expanded = body
        .iter()
        .map(|group| {
            group
                .iter()
                .map(|value| substitute(value, invocation, delimiters.sub_sep()))
                .collect::<Vec<_>>()
                .join(delimiters.sub_sep())
        })
        .collect::<Vec<_>>()
        .join(delimiters.sep());

    match style {
        MacroStyle::Text => expanded,
        MacroStyle::Tag => delimiters.wrap(&expanded),
    }
}

/// Replaces every `%` / `%N` in `value` with group N of `invocation`.
fn substitute(value: &str, invocation: &TagData, sub_sep: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(at) = rest.find(PLACEHOLDER) {
        out.push_str(&rest[..at]);
        let after = &rest[at + PLACEHOLDER.len_utf8()..];
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        let index = match digits {
            0 => Some(0),
            _ => after[..digits].parse::<usize>().ok(),
        };
        if let Some(index) = index {
            out.push_str(&invocation.joined(index, sub_sep));
        }
        rest = &after[digits..];
    }
    out.push_str(rest);

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(groups: &[&[&str]]) -> TagData {
        TagData::new(
            "m",
            groups
                .iter()
                .map(|group| group.iter().map(ToString::to_string).collect())
                .collect(),
        )
    }

    mod substitution {
        use super::*;

        #[test]
        fn test_numbered_placeholders() {
            let call = invocation(&[&["a"], &["b", "c"]]);
            assert_eq!(substitute("%0-%1", &call, "||"), "a-b||c");
        }

        #[test]
        fn test_bare_placeholder_is_first_group() {
            let call = invocation(&[&["World"]]);
            assert_eq!(substitute("Hello %!", &call, "||"), "Hello World!");
        }

        #[test]
        fn test_missing_group_is_empty() {
            let call = invocation(&[&["a"]]);
            assert_eq!(substitute("[%3]", &call, "||"), "[]");
        }

        #[test]
        fn test_multi_digit_index() {
            let groups: Vec<Vec<String>> = (0..12).map(|i| vec![i.to_string()]).collect();
            let call = TagData::new("m", groups);
            assert_eq!(substitute("%11%1", &call, "||"), "111");
        }

        #[test]
        fn test_overflowing_index_is_empty() {
            let call = invocation(&[&["a"]]);
            assert_eq!(substitute("[%99999999999999999999]", &call, "||"), "[]");
        }

        #[test]
        fn test_no_placeholder() {
            let call = invocation(&[]);
            assert_eq!(substitute("plain text", &call, "||"), "plain text");
        }
    }

    mod expansion {
        use super::*;

        #[test]
        fn test_text_style_joins_groups() {
            let body = vec![
                vec!["up".to_string()],
                vec!["%0".to_string(), "x".to_string()],
            ];
            let call = invocation(&[&["a", "b"]]);
            assert_eq!(
                expand(&body, &call, &Delimiters::default(), MacroStyle::Text),
                "up::a||b||x"
            );
        }

        #[test]
        fn test_tag_style_wraps() {
            let body = vec![vec!["up".to_string()], vec!["%".to_string()]];
            let call = invocation(&[&["a"]]);
            assert_eq!(
                expand(&body, &call, &Delimiters::default(), MacroStyle::Tag),
                "[[up::a]]"
            );
        }
    }
}
