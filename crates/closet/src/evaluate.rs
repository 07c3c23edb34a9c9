use closet_conf::FailurePolicy;
use closet_templates::parse;
use closet_templates::RawTag;
use closet_templates::TagInfo;
use closet_templates::TagPath;
use closet_templates::TagTree;

use crate::error::DispatchError;
use crate::renderer::FilterResult;
use crate::renderer::IterationInfo;
use crate::renderer::TagRenderer;

#[derive(Clone, Debug, PartialEq, Eq)]
enum SlotKind {
    /// A tag to dispatch. `path` is set for tags of the template's own tree.
    Tag { path: Option<TagPath> },
    /// Filter output holding several tags; only its children are dispatched.
    Group,
}

/// A region of the current text that still needs work, with byte offsets into
/// the text at the start of a pass.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Slot {
    start: usize,
    end: usize,
    kind: SlotKind,
    children: Vec<Slot>,
}

/// The tags left to visit in the next pass, in document order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Layout(Vec<Slot>);

impl Layout {
    pub(crate) fn from_tree(tree: &TagTree) -> Self {
        Self(tree_slots(tree, tree.root(), &mut Vec::new()))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn tree_slots(tree: &TagTree, node: &TagInfo, path: &mut TagPath) -> Vec<Slot> {
    let mut slots = Vec::with_capacity(node.children().len());
    for (index, child) in node.children().iter().enumerate() {
        let Some(tag) = tree.get(*child) else {
            continue;
        };
        path.push(index);
        slots.push(Slot {
            start: tag.start,
            end: tag.end,
            kind: SlotKind::Tag {
                path: Some(path.clone()),
            },
            children: tree_slots(tree, tag, path),
        });
        path.pop();
    }
    slots
}

/// Slots for tags found in filter output, without tree paths.
fn output_slots(tree: &TagTree, node: &TagInfo, base: usize) -> Vec<Slot> {
    node.children()
        .iter()
        .filter_map(|id| tree.get(*id))
        .map(|tag| Slot {
            start: base + tag.start,
            end: base + tag.end,
            kind: SlotKind::Tag { path: None },
            children: output_slots(tree, tag, base),
        })
        .collect()
}

/// Result of one rewrite pass.
#[derive(Debug)]
pub(crate) struct Pass {
    pub(crate) text: String,
    pub(crate) boundaries: Vec<usize>,
    pub(crate) layout: Layout,
    pub(crate) ready: bool,
}

struct Evaluator<'r, 'i, R: ?Sized> {
    renderer: &'r mut R,
    info: &'i IterationInfo<'i>,
    policy: FailurePolicy,
    text: String,
    boundaries: Vec<usize>,
    offset: isize,
    ready: bool,
}

/// Runs one pass over `layout`: every slot is dispatched innermost first and
/// its result spliced into `text`. A tag is only dispatched once all tags
/// inside it have settled. Later slots are found through the running
/// offset, and fragment `boundaries` are carried through every splice.
pub(crate) fn run_pass<R: TagRenderer + ?Sized>(
    text: &str,
    boundaries: &[usize],
    layout: Layout,
    renderer: &mut R,
    info: &IterationInfo<'_>,
) -> Result<Pass, DispatchError> {
    let mut evaluator = Evaluator {
        policy: renderer.failure_policy(),
        renderer,
        info,
        text: text.to_string(),
        boundaries: boundaries.to_vec(),
        offset: 0,
        ready: true,
    };

    let mut next = Vec::new();
    for slot in layout.0 {
        if let Some(slot) = evaluator.visit(slot)? {
            next.push(slot);
        }
    }

    Ok(Pass {
        text: evaluator.text,
        boundaries: evaluator.boundaries,
        layout: Layout(next),
        ready: evaluator.ready,
    })
}

impl<R: TagRenderer + ?Sized> Evaluator<'_, '_, R> {
    fn visit(&mut self, slot: Slot) -> Result<Option<Slot>, DispatchError> {
        let start = shift(slot.start, self.offset);
        let mut children = Vec::new();
        for child in slot.children {
            if let Some(child) = self.visit(child)? {
                children.push(child);
            }
        }
        let end = shift(slot.end, self.offset);

        match slot.kind {
            SlotKind::Group => Ok((!children.is_empty()).then_some(Slot {
                start,
                end,
                kind: SlotKind::Group,
                children,
            })),
            SlotKind::Tag { path } if !children.is_empty() => {
                // Parents wait until every tag inside them has settled.
                self.ready = false;
                Ok(Some(Slot {
                    start,
                    end,
                    kind: SlotKind::Tag { path },
                    children,
                }))
            }
            SlotKind::Tag { path } => self.resolve(start, end, path, children),
        }
    }

    /// Dispatches the tag at `start..end` of the live text and splices in its
    /// result. A ready result is final. A tag left as it was keeps its slot and
    /// its pending children; other results are read again for tags to visit
    /// next pass.
    fn resolve(
        &mut self,
        start: usize,
        end: usize,
        path: Option<TagPath>,
        children: Vec<Slot>,
    ) -> Result<Option<Slot>, DispatchError> {
        let live = &self.text[start..end];
        let dispatched = RawTag::from_text(live, self.info.delimiters)
            .map_err(DispatchError::from)
            .and_then(|tag| {
                tracing::trace!(key = %tag.key, ?path, "Dispatching tag");
                self.renderer.dispatch(&tag, path.as_deref(), self.info)
            });

        let result = match dispatched {
            Ok(result) => result,
            Err(error) => self.on_failure(live, error)?,
        };

        if !result.ready {
            self.ready = false;
        }

        if result.result == self.text[start..end] {
            return Ok((!result.ready).then_some(Slot {
                start,
                end,
                kind: SlotKind::Tag { path },
                children,
            }));
        }

        self.splice(start, end, &result.result);
        if result.ready {
            return Ok(None);
        }
        Ok(self.pending_slot(start, &result.result))
    }

    fn on_failure(&self, live: &str, error: DispatchError) -> Result<FilterResult, DispatchError> {
        match self.policy {
            FailurePolicy::Retry => {
                tracing::warn!(%error, iteration = self.info.index, "Tag left for retry");
                Ok(FilterResult::pending(live))
            }
            FailurePolicy::Passthrough => {
                tracing::warn!(%error, iteration = self.info.index, "Tag left as is");
                Ok(FilterResult::ready(live))
            }
            FailurePolicy::Abort => Err(error),
        }
    }

    /// Slot for a not-ready result now at `start`: the tag itself when the
    /// result is one whole tag, otherwise a group of the tags inside it.
    fn pending_slot(&self, start: usize, result: &str) -> Option<Slot> {
        let tree = match parse(result, self.info.delimiters) {
            Ok(tree) => tree,
            Err(error) => {
                tracing::debug!(%error, "Pending result has no readable tags");
                return None;
            }
        };

        let mut slots = output_slots(&tree, tree.root(), start);
        match slots.len() {
            0 => None,
            1 if slots[0].start == start && slots[0].end == start + result.len() => {
                Some(slots.remove(0))
            }
            _ => Some(Slot {
                start,
                end: start + result.len(),
                kind: SlotKind::Group,
                children: slots,
            }),
        }
    }

    fn splice(&mut self, start: usize, end: usize, replacement: &str) {
        self.text.replace_range(start..end, replacement);

        let removed = end - start;
        let added = replacement.len();
        for boundary in &mut self.boundaries {
            *boundary = map_boundary(*boundary, start, end, added);
        }
        self.offset += to_isize(added) - to_isize(removed);
    }
}

/// Where `position` ends up after `start..end` is replaced by `added` bytes.
fn map_boundary(position: usize, start: usize, end: usize, added: usize) -> usize {
    if position <= start {
        position
    } else if position >= end {
        position - (end - start) + added
    } else {
        start + added
    }
}

fn shift(position: usize, offset: isize) -> usize {
    position.saturating_add_signed(offset)
}

fn to_isize(len: usize) -> isize {
    isize::try_from(len).unwrap_or(isize::MAX)
}
