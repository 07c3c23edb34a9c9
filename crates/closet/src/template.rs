use std::sync::Arc;

use closet_conf::Settings;
use closet_templates::parse;
use closet_templates::Delimiters;
use closet_templates::TagData;
use closet_templates::TagInfo;
use closet_templates::TagPath;
use closet_templates::TagTree;
use closet_templates::TemplateError;
use serde::Serialize;

use crate::error::RenderError;
use crate::evaluate::run_pass;
use crate::evaluate::Layout;
use crate::renderer::BaseDepth;
use crate::renderer::IterationInfo;
use crate::renderer::TagRenderer;

/// Upper bound on rewrite passes per render call.
pub const MAX_ITERATIONS: usize = 50;

/// Output of a render call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Rendered {
    /// One entry per fragment the template was built from.
    pub fragments: Vec<String>,
    /// `false` when the iteration ceiling stopped the loop before every tag
    /// reported ready.
    pub ready: bool,
    pub iterations: usize,
}

/// Text fragments and the tag tree parsed from them.
///
/// The tree is parsed once, at construction, and shared by every
/// [`zoom`](Template::zoom)ed view.
#[derive(Clone, Debug)]
pub struct Template {
    fragments: Vec<String>,
    text: String,
    base_depth: BaseDepth,
    delimiters: Arc<Delimiters>,
    tree: Arc<TagTree>,
    zoom: TagPath,
}

impl Template {
    pub fn make(text: impl Into<String>) -> Result<Self, TemplateError> {
        Self::with_delimiters(vec![text.into()], BaseDepth::Single, Delimiters::default())
    }

    pub fn make_from_fragments<I, S>(texts: I) -> Result<Self, TemplateError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_delimiters(
            texts.into_iter().map(Into::into).collect(),
            BaseDepth::Fragments,
            Delimiters::default(),
        )
    }

    pub fn with_settings(
        fragments: Vec<String>,
        base_depth: BaseDepth,
        settings: &Settings,
    ) -> Result<Self, TemplateError> {
        let delimiters = Delimiters::try_from(&settings.delimiters)?;
        Self::with_delimiters(fragments, base_depth, delimiters)
    }

    pub fn with_delimiters(
        fragments: Vec<String>,
        base_depth: BaseDepth,
        delimiters: Delimiters,
    ) -> Result<Self, TemplateError> {
        let text = fragments.concat();
        let tree = parse(&text, &delimiters)?;

        Ok(Self {
            fragments,
            text,
            base_depth,
            delimiters: Arc::new(delimiters),
            tree: Arc::new(tree),
            zoom: Vec::new(),
        })
    }

    /// A view of the same template focused on `path`.
    #[must_use]
    pub fn zoom(&self, path: impl Into<TagPath>) -> Self {
        Self {
            zoom: path.into(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn zoom_path(&self) -> &[usize] {
        &self.zoom
    }

    /// The tag the current zoom points at.
    #[must_use]
    pub fn current(&self) -> Option<&TagInfo> {
        self.traverse(&self.zoom)
    }

    #[must_use]
    pub fn traverse(&self, path: &[usize]) -> Option<&TagInfo> {
        self.tree.traverse(path)
    }

    #[must_use]
    pub fn exists(&self, path: &[usize]) -> bool {
        self.traverse(path).is_some()
    }

    #[must_use]
    pub fn get_info(&self, path: &[usize]) -> Option<&TagInfo> {
        self.traverse(path)
    }

    #[must_use]
    pub fn get_data(&self, path: &[usize]) -> Option<&TagData> {
        self.traverse(path).map(|tag| &tag.data)
    }

    /// `(0, start)` of the tag at `path`. The first element is always zero.
    #[must_use]
    pub fn get_offsets(&self, path: &[usize]) -> Option<(usize, usize)> {
        self.traverse(path).map(|tag| (0, tag.start))
    }

    /// Whether the zoom path points at a tag.
    #[must_use]
    pub fn exists_current(&self) -> bool {
        self.exists(&self.zoom)
    }

    #[must_use]
    pub fn current_data(&self) -> Option<&TagData> {
        self.get_data(&self.zoom)
    }

    #[must_use]
    pub fn current_offsets(&self) -> Option<(usize, usize)> {
        self.get_offsets(&self.zoom)
    }

    #[must_use]
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn base_depth(&self) -> BaseDepth {
        self.base_depth
    }

    #[must_use]
    pub fn delimiters(&self) -> &Delimiters {
        &self.delimiters
    }

    #[must_use]
    pub fn tree(&self) -> &TagTree {
        &self.tree
    }

    pub fn render<R: TagRenderer + ?Sized>(
        &self,
        renderer: &mut R,
    ) -> Result<Rendered, RenderError> {
        self.render_with(renderer, |_| {})
    }

    /// Renders the template, calling `on_intermediate` with the fragments
    /// after every pass.
    pub fn render_with<R, F>(
        &self,
        renderer: &mut R,
        mut on_intermediate: F,
    ) -> Result<Rendered, RenderError>
    where
        R: TagRenderer + ?Sized,
        F: FnMut(&[String]),
    {
        let _span = tracing::debug_span!(
            "render",
            fragments = self.fragments.len(),
            tags = self.tree.len()
        )
        .entered();

        renderer.begin_run();

        let mut text = self.text.clone();
        let mut boundaries = self.boundaries();
        let mut layout = Layout::from_tree(&self.tree);
        let mut fragments = self.fragments.clone();
        let mut ready = false;
        let mut iterations = 0;

        while iterations < MAX_ITERATIONS && !ready {
            let _iteration = tracing::debug_span!("iteration", index = iterations).entered();
            let info = IterationInfo {
                index: iterations,
                base_depth: self.base_depth,
                delimiters: &self.delimiters,
            };

            let pass = run_pass(&text, &boundaries, layout, renderer, &info).map_err(|source| {
                RenderError::Aborted {
                    iteration: iterations,
                    source,
                }
            })?;

            text = pass.text;
            boundaries = pass.boundaries;
            layout = pass.layout;
            ready = pass.ready;
            fragments = split_at(&text, &boundaries);
            iterations += 1;

            renderer.finish_iteration(&info);
            tracing::debug!(ready, pending = !layout.is_empty(), "Finished iteration");
            on_intermediate(&fragments);
        }

        if !ready {
            tracing::warn!(iterations, "Iteration ceiling reached before all tags were ready");
        }

        let rendered = Rendered {
            fragments,
            ready,
            iterations,
        };
        renderer.finish_run(&rendered);
        Ok(rendered)
    }

    /// Fragment boundaries in the joined text: `[0, len(f0), len(f0)+len(f1), ...]`.
    fn boundaries(&self) -> Vec<usize> {
        let mut boundaries = Vec::with_capacity(self.fragments.len() + 1);
        let mut position = 0;
        boundaries.push(position);
        for fragment in &self.fragments {
            position += fragment.len();
            boundaries.push(position);
        }
        boundaries
    }
}

fn split_at(text: &str, boundaries: &[usize]) -> Vec<String> {
    boundaries
        .windows(2)
        .map(|pair| text.get(pair[0]..pair[1]).unwrap_or_default().to_string())
        .collect()
}
