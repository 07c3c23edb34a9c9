use closet_conf::FailurePolicy;
use closet_templates::Delimiters;
use closet_templates::RawTag;
use serde::Serialize;

use crate::error::DispatchError;
use crate::template::Rendered;

/// How many logically separate fragments a template was built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum BaseDepth {
    /// One text, from `Template::make`.
    Single,
    /// Separately addressable fields, from `Template::make_from_fragments`.
    Fragments,
}

impl BaseDepth {
    #[must_use]
    pub fn depth(self) -> usize {
        match self {
            Self::Single => 1,
            Self::Fragments => 2,
        }
    }
}

/// Context shared by every dispatch of one rewrite pass.
#[derive(Clone, Copy, Debug)]
pub struct IterationInfo<'a> {
    pub index: usize,
    pub base_depth: BaseDepth,
    pub delimiters: &'a Delimiters,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FilterResult {
    pub result: String,
    /// `false` asks for the result to be looked at again in the next pass.
    pub ready: bool,
}

impl FilterResult {
    pub fn ready(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            ready: true,
        }
    }

    pub fn pending(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            ready: false,
        }
    }
}

/// What the render loop drives.
///
/// `dispatch` is called once per live tag per pass, innermost tags first. The
/// lifecycle hooks bracket a render call: `begin_run` before the first pass,
/// `finish_iteration` after each pass and `finish_run` once with the final
/// result.
pub trait TagRenderer {
    fn dispatch(
        &mut self,
        tag: &RawTag,
        path: Option<&[usize]>,
        info: &IterationInfo<'_>,
    ) -> Result<FilterResult, DispatchError>;

    /// What the render loop does with a tag whose dispatch failed.
    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::default()
    }

    fn begin_run(&mut self) {}

    fn finish_iteration(&mut self, _info: &IterationInfo<'_>) {}

    fn finish_run(&mut self, _rendered: &Rendered) {}
}
