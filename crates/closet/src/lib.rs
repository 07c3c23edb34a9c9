//! Iterative tag rewriting.
//!
//! A [`Template`] owns text fragments and the tag tree parsed from them.
//! Rendering runs rewrite passes: every tag is handed to a [`TagRenderer`],
//! innermost first, and its span replaced by the returned text. Passes repeat
//! while any tag reports that it is not ready, up to [`MAX_ITERATIONS`].
//!
//! [`FilterManager`] is the standard renderer: a registry of named filters
//! that filters can extend while a render is running (see
//! [`recipes::meta`]).
//!
//! ## Example
//!
//! ```
//! use closet::{FilterContext, FilterManager, FilterResult, Separators, TagData, Template};
//!
//! let mut manager = FilterManager::new();
//! manager.register(
//!     "upper",
//!     |tag: &TagData, _: &mut FilterContext<'_>| {
//!         Ok(FilterResult::ready(tag.value(0).unwrap_or_default().to_uppercase()))
//!     },
//!     Separators::Template,
//! );
//!
//! let rendered = Template::make("[[upper::hi]]").unwrap().render(&mut manager).unwrap();
//! assert_eq!(rendered.fragments, ["HI"]);
//! ```

mod error;
mod evaluate;
mod filters;
mod memory;
pub mod recipes;
mod renderer;
mod template;

pub use closet_conf::FailurePolicy;
pub use closet_conf::Settings;
pub use closet_templates::Delimiters;
pub use closet_templates::RawTag;
pub use closet_templates::Separators;
pub use closet_templates::TagData;
pub use closet_templates::TagInfo;
pub use closet_templates::TagPath;
pub use closet_templates::TemplateError;
pub use error::DispatchError;
pub use error::FilterError;
pub use error::RenderError;
pub use filters::Effect;
pub use filters::FilterContext;
pub use filters::FilterFn;
pub use filters::FilterManager;
pub use memory::Memory;
pub use renderer::BaseDepth;
pub use renderer::FilterResult;
pub use renderer::IterationInfo;
pub use renderer::TagRenderer;
pub use template::Rendered;
pub use template::Template;
pub use template::MAX_ITERATIONS;
