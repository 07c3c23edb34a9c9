use serde::Serialize;

use crate::tokens::Span;

/// Positional address of a tag: `path[i]` picks the `i`-th child at depth `i`.
/// The empty path is the root.
pub type TagPath = Vec<usize>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TagId(u32);

impl TagId {
    pub const ROOT: TagId = TagId(0);

    #[must_use]
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn id(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum TagKind {
    /// The synthetic node wrapping the whole document.
    Root,
    Inline,
    Block,
}

/// Key and argument groups of a tag. Groups keep declaration order; the inner
/// vectors hold the sub-values of one group.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct TagData {
    pub key: String,
    pub values: Vec<Vec<String>>,
}

impl TagData {
    #[must_use]
    pub fn new(key: impl Into<String>, values: Vec<Vec<String>>) -> Self {
        Self {
            key: key.into(),
            values,
        }
    }

    #[must_use]
    pub fn group(&self, index: usize) -> Option<&[String]> {
        self.values.get(index).map(Vec::as_slice)
    }

    /// First sub-value of group `index`.
    #[must_use]
    pub fn value(&self, index: usize) -> Option<&str> {
        self.values
            .get(index)
            .and_then(|group| group.first())
            .map(String::as_str)
    }

    /// Sub-values of group `index` joined with `separator`, or an empty string
    /// when the group is absent.
    #[must_use]
    pub fn joined(&self, index: usize, separator: &str) -> String {
        self.values
            .get(index)
            .map(|group| group.join(separator))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_bare(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TagInfo {
    pub kind: TagKind,
    pub data: TagData,
    /// Byte offset of the opening delimiter in the parsed text.
    pub start: usize,
    /// Byte offset just past the closing delimiter in the parsed text.
    pub end: usize,
    children: Vec<TagId>,
    parent: Option<TagId>,
}

impl TagInfo {
    fn new(kind: TagKind, start: usize, parent: Option<TagId>) -> Self {
        Self {
            kind,
            data: TagData::default(),
            start,
            end: start,
            children: Vec::new(),
            parent,
        }
    }

    #[must_use]
    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }

    #[must_use]
    pub fn children(&self) -> &[TagId] {
        &self.children
    }

    #[must_use]
    pub fn parent(&self) -> Option<TagId> {
        self.parent
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.kind == TagKind::Root
    }
}

/// Arena of parsed tags. Node 0 is the root; nodes are stored in pre-order,
/// which is also document order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TagTree {
    nodes: Vec<TagInfo>,
}

impl TagTree {
    pub(crate) fn new(source_len: usize) -> Self {
        let mut root = TagInfo::new(TagKind::Root, 0, None);
        root.end = source_len;
        Self { nodes: vec![root] }
    }

    pub(crate) fn alloc(&mut self, kind: TagKind, start: usize, parent: TagId) -> TagId {
        let id = TagId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(TagInfo::new(kind, start, Some(parent)));
        self.node_mut(parent).children.push(id);
        id
    }

    pub(crate) fn finish(&mut self, id: TagId, end: usize, data: TagData) {
        let node = self.node_mut(id);
        node.end = end;
        node.data = data;
    }

    fn node_mut(&mut self, id: TagId) -> &mut TagInfo {
        &mut self.nodes[id.index()]
    }

    #[must_use]
    pub fn root(&self) -> &TagInfo {
        &self.nodes[TagId::ROOT.index()]
    }

    #[must_use]
    pub fn get(&self, id: TagId) -> Option<&TagInfo> {
        self.nodes.get(id.index())
    }

    /// Resolves `path` from the root, giving up at the first index that is out
    /// of range at its depth.
    #[must_use]
    pub fn resolve(&self, path: &[usize]) -> Option<TagId> {
        path.iter().try_fold(TagId::ROOT, |id, &index| {
            self.get(id)
                .and_then(|node| node.children.get(index))
                .copied()
        })
    }

    #[must_use]
    pub fn traverse(&self, path: &[usize]) -> Option<&TagInfo> {
        self.resolve(path).and_then(|id| self.get(id))
    }

    pub fn inner_tags(&self, id: TagId) -> impl Iterator<Item = &TagInfo> {
        self.get(id)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|child| self.get(*child))
    }

    /// All tags except the root, in document order.
    pub fn tags(&self) -> impl Iterator<Item = (TagId, &TagInfo)> {
        self.nodes
            .iter()
            .enumerate()
            .skip(1)
            .map(|(index, node)| (TagId(u32::try_from(index).unwrap_or(u32::MAX)), node))
    }

    #[must_use]
    pub fn path_of(&self, id: TagId) -> TagPath {
        let mut path = Vec::new();
        let mut current = id;

        while let Some(parent) = self.get(current).and_then(TagInfo::parent) {
            if let Some(index) = self
                .get(parent)
                .and_then(|node| node.children.iter().position(|child| *child == current))
            {
                path.push(index);
            }
            current = parent;
        }

        path.reverse();
        path
    }

    /// Number of tags, not counting the root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }
}
