//! Element tree for parsed XML documents.
//!
//! The tree uses an index-based arena: every element lives in a slot of
//! the owning [`Document`] and refers to its parent and children by
//! [`NodeId`]. Parent links are plain ids, so they never keep anything
//! alive and never form reference cycles. Slots freed by
//! [`Document::clear`] are reused, and each reuse bumps the slot's
//! generation so an id that outlived its element resolves to `None`
//! instead of to an unrelated element.
//!
//! # Example
//!
//! ```
//! use drill_core::parse_str;
//!
//! let doc = parse_str("<catalog><book id='b1'><title>Hello</title></book></catalog>").unwrap();
//! let catalog = doc.root().unwrap();
//! let book = catalog.first(Some("book")).unwrap();
//!
//! assert_eq!(book.attr("id").unwrap(), "b1");
//! assert_eq!(book.first(Some("title")).unwrap().data(), "Hello");
//! assert_eq!(book.first(Some("title")).unwrap().path(), "book[0]/title[0]");
//! ```

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, trace};
use unicode_xid::UnicodeXID;

use crate::error::{Error, Result};
use crate::event::Event;

// ============================================================================
// Core Types
// ============================================================================

/// Generational index into a document's element arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    fn slot(self) -> usize {
        self.index as usize
    }
}

/// Internal element storage.
#[derive(Debug)]
struct ElementData {
    tagname: String,
    attrs: BTreeMap<String, String>,
    data: String,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    /// Position in the parent's child list.
    index: usize,
    /// Position among the parent's children with the same tag name.
    tag_position: usize,
    /// Number of children per tag name.
    tag_counts: BTreeMap<String, usize>,
}

impl ElementData {
    fn new(
        tagname: String,
        attrs: BTreeMap<String, String>,
        parent: Option<NodeId>,
        index: usize,
        tag_position: usize,
    ) -> Self {
        ElementData {
            tagname,
            attrs,
            data: String::new(),
            children: Vec::new(),
            parent,
            index,
            tag_position,
            tag_counts: BTreeMap::new(),
        }
    }

    /// Count one more child with tag `tag`, returning the previous count.
    fn count_child(&mut self, tag: &str) -> usize {
        match self.tag_counts.get_mut(tag) {
            Some(count) => {
                *count += 1;
                *count - 1
            }
            None => {
                self.tag_counts.insert(tag.to_owned(), 1);
                0
            }
        }
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    element: Option<ElementData>,
}

/// Check that `name` is usable as a tag name or attribute key.
pub(crate) fn is_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c == ':' || c.is_xid_start() => {}
        _ => return false,
    }
    chars.all(is_name_char)
}

pub(crate) fn is_name_char(c: char) -> bool {
    c.is_xid_continue() || matches!(c, '-' | '.' | ':')
}

fn attr_map(attrs: &[(&str, &str)]) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for &(key, value) in attrs {
        if !is_name(key) {
            return Err(Error::InvalidName(key.to_owned()));
        }
        map.insert(key.to_owned(), value.to_owned());
    }
    Ok(map)
}

// ============================================================================
// Document
// ============================================================================

/// An element tree.
///
/// Owns every element; dropping the document drops the whole tree.
/// Read access goes through [`Element`] handles, mutation through
/// `&mut Document` methods keyed by [`NodeId`].
#[derive(Debug)]
pub struct Document {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: Option<NodeId>,
    live: usize,
}

impl Document {
    pub(crate) fn empty() -> Self {
        Document {
            slots: Vec::new(),
            free: Vec::new(),
            root: None,
            live: 0,
        }
    }

    /// Create a document consisting of a single root element.
    pub fn with_root(tag: &str, attrs: &[(&str, &str)]) -> Result<Self> {
        if !is_name(tag) {
            return Err(Error::InvalidName(tag.to_owned()));
        }
        let mut doc = Document::empty();
        let attrs = attr_map(attrs)?;
        doc.push_root(tag.to_owned(), attrs);
        Ok(doc)
    }

    /// The root element, if one has been started.
    pub fn root(&self) -> Option<Element<'_>> {
        self.root.and_then(|id| self.get(id))
    }

    /// Id of the root element.
    pub fn root_id(&self) -> Option<NodeId> {
        self.root
    }

    /// Resolve an id to an element handle. Returns `None` for ids whose
    /// element has been cleared away.
    pub fn get(&self, id: NodeId) -> Option<Element<'_>> {
        self.node_data(id).map(|data| Element { doc: self, id, data })
    }

    /// Check whether `id` still refers to a live element.
    pub fn contains(&self, id: NodeId) -> bool {
        self.node_data(id).is_some()
    }

    /// Number of live elements.
    pub fn element_count(&self) -> usize {
        self.live
    }

    /// Number of arena slots, live or free.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn node_data(&self, id: NodeId) -> Option<&ElementData> {
        let slot = self.slots.get(id.slot())?;
        if slot.generation != id.generation {
            return None;
        }
        slot.element.as_ref()
    }

    fn node_data_mut(&mut self, id: NodeId) -> Result<&mut ElementData> {
        let slot = self.slots.get_mut(id.slot()).ok_or(Error::StaleNode)?;
        if slot.generation != id.generation {
            return Err(Error::StaleNode);
        }
        slot.element.as_mut().ok_or(Error::StaleNode)
    }

    fn alloc(&mut self, data: ElementData) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.element = Some(data);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            element: Some(data),
        });
        NodeId { index, generation: 0 }
    }

    pub(crate) fn push_root(&mut self, tag: String, attrs: BTreeMap<String, String>) -> NodeId {
        let id = self.alloc(ElementData::new(tag, attrs, None, 0, 0));
        self.root = Some(id);
        id
    }

    /// Append a child without name validation. The caller guarantees
    /// `parent` is live.
    pub(crate) fn push_child(
        &mut self,
        parent: NodeId,
        tag: String,
        attrs: BTreeMap<String, String>,
    ) -> Result<NodeId> {
        let parent_data = self.node_data_mut(parent)?;
        let index = parent_data.children.len();
        let tag_position = parent_data.count_child(&tag);
        let id = self.alloc(ElementData::new(tag, attrs, Some(parent), index, tag_position));
        self.node_data_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Append a new child element to `parent`, returning its id.
    ///
    /// The child gets the next sequential index among its siblings.
    pub fn append(
        &mut self,
        parent: NodeId,
        tag: &str,
        attrs: &[(&str, &str)],
        data: Option<&str>,
    ) -> Result<NodeId> {
        if !is_name(tag) {
            return Err(Error::InvalidName(tag.to_owned()));
        }
        let attrs = attr_map(attrs)?;
        let id = self.push_child(parent, tag.to_owned(), attrs)?;
        if let Some(text) = data {
            self.node_data_mut(id)?.data.push_str(text);
        }
        Ok(id)
    }

    /// Insert a new child element into `parent` immediately before `before`.
    ///
    /// Siblings from `before` onward shift up by one index. Fails with
    /// [`Error::NotAChild`] when `before` is not a child of `parent`.
    pub fn insert(
        &mut self,
        parent: NodeId,
        before: NodeId,
        tag: &str,
        attrs: &[(&str, &str)],
        data: Option<&str>,
    ) -> Result<NodeId> {
        if !is_name(tag) {
            return Err(Error::InvalidName(tag.to_owned()));
        }
        let attrs = attr_map(attrs)?;
        let position = match self.node_data(before) {
            Some(b) if b.parent == Some(parent) => b.index,
            Some(_) => return Err(Error::NotAChild),
            None => return Err(Error::StaleNode),
        };
        let tag_position = match self.node_data(parent) {
            Some(p) => p.children[..position]
                .iter()
                .filter_map(|&id| self.node_data(id))
                .filter(|sibling| sibling.tagname == tag)
                .count(),
            None => return Err(Error::StaleNode),
        };
        let mut element = ElementData::new(tag.to_owned(), attrs, Some(parent), position, tag_position);
        if let Some(text) = data {
            element.data.push_str(text);
        }
        let id = self.alloc(element);

        let siblings = {
            let parent_data = self.node_data_mut(parent)?;
            parent_data.count_child(tag);
            parent_data.children.insert(position, id);
            parent_data.children[position + 1..].to_vec()
        };
        for (offset, sibling) in siblings.into_iter().enumerate() {
            let sibling = self.node_data_mut(sibling)?;
            sibling.index = position + 1 + offset;
            if sibling.tagname == tag {
                sibling.tag_position += 1;
            }
        }
        Ok(id)
    }

    /// Append character data to an element.
    pub fn characters(&mut self, id: NodeId, text: &str) -> Result<()> {
        self.node_data_mut(id)?.data.push_str(text);
        Ok(())
    }

    /// Trim surrounding whitespace from an element's data.
    ///
    /// The builder calls this exactly once, when the end tag arrives.
    pub fn finalize(&mut self, id: NodeId) -> Result<()> {
        let node = self.node_data_mut(id)?;
        let trimmed = node.data.trim();
        if trimmed.len() != node.data.len() {
            node.data = trimmed.to_owned();
        }
        Ok(())
    }

    /// Empty an element's data and drop its whole subtree.
    ///
    /// The element keeps its tag name, attributes, parent and index, so it
    /// stays reachable from its parent and its siblings. Ids of the dropped
    /// descendants become stale. Returns the number of elements freed.
    pub fn clear(&mut self, id: NodeId) -> Result<usize> {
        let node = self.node_data_mut(id)?;
        node.data = String::new();
        node.tag_counts.clear();
        let mut pending = std::mem::take(&mut node.children);

        let mut freed = 0;
        while let Some(child) = pending.pop() {
            let Some(slot) = self.slots.get_mut(child.slot()) else {
                continue;
            };
            if slot.generation != child.generation {
                continue;
            }
            if let Some(data) = slot.element.take() {
                pending.extend(data.children);
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(child.index);
                freed += 1;
            }
        }
        self.live -= freed;
        trace!(freed, "cleared element subtree");
        Ok(freed)
    }
}

// ============================================================================
// Element (navigation handle)
// ============================================================================

/// A handle for navigating the element tree.
///
/// This is a lightweight, copyable reference that borrows from the
/// document.
#[derive(Clone, Copy)]
pub struct Element<'d> {
    doc: &'d Document,
    id: NodeId,
    data: &'d ElementData,
}

impl<'d> Element<'d> {
    /// Get the element's id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The document this element belongs to.
    pub fn document(&self) -> &'d Document {
        self.doc
    }

    pub fn tagname(&self) -> &'d str {
        &self.data.tagname
    }

    /// Accumulated character data. Trimmed once the element is finalized.
    pub fn data(&self) -> &'d str {
        &self.data.data
    }

    /// Position in the parent's child list; 0 for the root.
    pub fn index(&self) -> usize {
        self.data.index
    }

    /// Number of child elements.
    pub fn len(&self) -> usize {
        self.data.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.children.is_empty()
    }

    /// Attribute value by key.
    ///
    /// A missing key is an error, distinct from an attribute whose value
    /// is the empty string. Use [`Element::get_attr`] when absence is
    /// expected.
    pub fn attr(&self, key: &str) -> Result<&'d str> {
        self.get_attr(key).ok_or_else(|| Error::MissingAttribute {
            tag: self.data.tagname.clone(),
            key: key.to_owned(),
        })
    }

    /// Attribute value by key, or `None`.
    pub fn get_attr(&self, key: &str) -> Option<&'d str> {
        self.data.attrs.get(key).map(String::as_str)
    }

    pub fn has_attr(&self, key: &str) -> bool {
        self.data.attrs.contains_key(key)
    }

    /// Attribute pairs, sorted by key.
    pub fn attrs(&self) -> impl Iterator<Item = (&'d str, &'d str)> + 'd {
        self.data.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The child at position `index`.
    pub fn child(&self, index: usize) -> Result<Element<'d>> {
        self.data
            .children
            .get(index)
            .and_then(|&id| self.doc.get(id))
            .ok_or(Error::IndexOutOfRange {
                index,
                len: self.len(),
            })
    }

    /// Get the parent element, if any.
    pub fn parent(&self) -> Option<Element<'d>> {
        self.data.parent.and_then(|id| self.doc.get(id))
    }

    /// The root of the tree this element belongs to.
    pub fn root(&self) -> Element<'d> {
        self.parents().last().unwrap_or(*self)
    }

    /// Direct children, optionally only those with tag `name`.
    ///
    /// The iterator is double-ended; `.rev()` walks the children last to
    /// first.
    pub fn children<'n>(&self, name: Option<&'n str>) -> Children<'d, 'n> {
        Children {
            doc: self.doc,
            iter: self.data.children.iter(),
            name,
        }
    }

    /// First child, optionally the first with tag `name`.
    pub fn first(&self, name: Option<&str>) -> Option<Element<'d>> {
        self.children(name).next()
    }

    /// Last child, optionally the last with tag `name`.
    pub fn last(&self, name: Option<&str>) -> Option<Element<'d>> {
        self.children(name).next_back()
    }

    /// All descendants in pre-order, optionally only those with tag `name`.
    pub fn find<'n>(&self, name: Option<&'n str>) -> Descendants<'d, 'n> {
        Descendants {
            doc: self.doc,
            stack: vec![self.data.children.iter()],
            name,
        }
    }

    /// The next sibling, optionally the next one with tag `name`.
    pub fn next(&self, name: Option<&str>) -> Option<Element<'d>> {
        let parent = self.parent()?;
        let mut following = parent.children(name);
        following.iter = parent.data.children[self.data.index + 1..].iter();
        following.next()
    }

    /// The previous sibling, optionally the previous one with tag `name`.
    pub fn prev(&self, name: Option<&str>) -> Option<Element<'d>> {
        let parent = self.parent()?;
        let mut preceding = parent.children(name);
        preceding.iter = parent.data.children[..self.data.index].iter();
        preceding.next_back()
    }

    /// Ancestors from the immediate parent up to the root.
    pub fn parents(&self) -> Ancestors<'d> {
        Ancestors {
            next: self.parent(),
        }
    }

    /// The parent's other children in document order, optionally only
    /// those with tag `name`.
    pub fn siblings<'n>(&self, name: Option<&'n str>) -> Siblings<'d, 'n> {
        let children = match self.parent() {
            Some(parent) => parent.children(name),
            None => {
                let none: &'d [NodeId] = &[];
                Children {
                    doc: self.doc,
                    iter: none.iter(),
                    name,
                }
            }
        };
        Siblings {
            children,
            skip: self.id,
        }
    }

    /// Position among the parent's children that share this tag name.
    pub fn tag_position(&self) -> usize {
        self.data.tag_position
    }

    /// Number of children with tag `name`.
    pub fn tag_count(&self, name: &str) -> usize {
        self.data.tag_counts.get(name).copied().unwrap_or(0)
    }

    /// Canonical path of this element relative to the root, such as
    /// `book[0]/title[2]`.
    ///
    /// Each segment is `tagname[n]` where `n` counts same-tag siblings, so
    /// evaluating the path against the root selects exactly this element.
    /// The root's own path is its single segment.
    pub fn path(&self) -> String {
        self.build_path(false)
    }

    /// Like [`Element::path`] but with the root segment included.
    pub fn path_with_root(&self) -> String {
        self.build_path(true)
    }

    fn build_path(&self, include_root: bool) -> String {
        let mut segments = Vec::new();
        let mut node = Some(*self);
        while let Some(el) = node {
            let parent = el.parent();
            if parent.is_some() || include_root || segments.is_empty() {
                segments.push(format!("{}[{}]", el.tagname(), el.tag_position()));
            }
            node = parent;
        }
        segments.reverse();
        segments.join("/")
    }

    /// Child indices from the root down to this element. Orders elements
    /// of one tree in document order.
    pub(crate) fn order_key(&self) -> Vec<usize> {
        let mut key: Vec<usize> = std::iter::once(*self)
            .chain(self.parents())
            .filter(|e| e.data.parent.is_some())
            .map(|e| e.index())
            .collect();
        key.reverse();
        key
    }
}

impl PartialEq for Element<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.doc, other.doc) && self.id == other.id
    }
}

impl Eq for Element<'_> {}

impl fmt::Debug for Element<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Element {}>", self.tagname())
    }
}

impl fmt::Display for Element<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.data())
    }
}

// ============================================================================
// Iterators
// ============================================================================

fn tag_matches(element: &Element<'_>, name: Option<&str>) -> bool {
    name.map_or(true, |n| element.tagname() == n)
}

/// Direct children of an element. See [`Element::children`].
#[derive(Clone)]
pub struct Children<'d, 'n> {
    doc: &'d Document,
    iter: std::slice::Iter<'d, NodeId>,
    name: Option<&'n str>,
}

impl<'d> Iterator for Children<'d, '_> {
    type Item = Element<'d>;

    fn next(&mut self) -> Option<Self::Item> {
        let name = self.name;
        let doc = self.doc;
        self.iter
            .by_ref()
            .filter_map(|&id| doc.get(id))
            .find(|e| tag_matches(e, name))
    }
}

impl DoubleEndedIterator for Children<'_, '_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let name = self.name;
        let doc = self.doc;
        self.iter
            .by_ref()
            .rev()
            .filter_map(|&id| doc.get(id))
            .find(|e| tag_matches(e, name))
    }
}

/// Pre-order descendants of an element. See [`Element::find`].
#[derive(Clone)]
pub struct Descendants<'d, 'n> {
    doc: &'d Document,
    stack: Vec<std::slice::Iter<'d, NodeId>>,
    name: Option<&'n str>,
}

impl<'d> Iterator for Descendants<'d, '_> {
    type Item = Element<'d>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.stack.last_mut()?;
            match top.next() {
                Some(&id) => {
                    let Some(element) = self.doc.get(id) else {
                        continue;
                    };
                    self.stack.push(element.data.children.iter());
                    if tag_matches(&element, self.name) {
                        return Some(element);
                    }
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

/// Ancestor chain of an element. See [`Element::parents`].
#[derive(Clone)]
pub struct Ancestors<'d> {
    next: Option<Element<'d>>,
}

impl<'d> Iterator for Ancestors<'d> {
    type Item = Element<'d>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent();
        Some(current)
    }
}

/// Other children of an element's parent. See [`Element::siblings`].
#[derive(Clone)]
pub struct Siblings<'d, 'n> {
    children: Children<'d, 'n>,
    skip: NodeId,
}

impl<'d> Iterator for Siblings<'d, '_> {
    type Item = Element<'d>;

    fn next(&mut self) -> Option<Self::Item> {
        let skip = self.skip;
        self.children.find(|e| e.id() != skip)
    }
}

// ============================================================================
// TreeBuilder (event consumer)
// ============================================================================

/// Builds an element tree from parse events.
///
/// Keeps a stack of open elements; start events push a child of the
/// current top, character events append to the top, end events finalize
/// and pop it.
#[derive(Debug)]
pub struct TreeBuilder {
    doc: Document,
    /// Stack of open element ids.
    stack: Vec<NodeId>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        TreeBuilder {
            doc: Document::empty(),
            stack: Vec::new(),
        }
    }

    /// Apply one event. Returns the id of the element an end event closed.
    pub fn handle_event(&mut self, event: Event<'_>) -> Result<Option<NodeId>> {
        match event {
            Event::Start { name, attrs } => {
                let attrs: BTreeMap<String, String> = attrs
                    .into_iter()
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect();
                let id = match self.stack.last() {
                    Some(&parent) => self.doc.push_child(parent, name.into_owned(), attrs)?,
                    None if self.doc.root.is_some() => {
                        return Err(Error::MultipleRoots {
                            name: name.into_owned(),
                        });
                    }
                    None => self.doc.push_root(name.into_owned(), attrs),
                };
                self.stack.push(id);
                Ok(None)
            }
            Event::Characters { text } => {
                match self.stack.last() {
                    Some(&current) => self.doc.characters(current, &text)?,
                    // Whitespace between prolog items and after the root
                    // is allowed; anything else is not.
                    None if text.trim().is_empty() => {}
                    None => return Err(Error::TextOutsideRoot(text.trim().to_owned())),
                }
                Ok(None)
            }
            Event::End { name } => {
                let Some(&current) = self.stack.last() else {
                    return Err(Error::UnexpectedEnd {
                        name: name.into_owned(),
                    });
                };
                let expected = self.doc.get(current).map(|e| e.tagname()).unwrap_or_default();
                if expected != name {
                    return Err(Error::MismatchedEnd {
                        expected: expected.to_owned(),
                        found: name.into_owned(),
                    });
                }
                self.doc.finalize(current)?;
                self.stack.pop();
                Ok(Some(current))
            }
        }
    }

    /// Number of currently open elements.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Check whether `id` is still waiting for its end tag.
    pub fn is_open(&self, id: NodeId) -> bool {
        self.stack.contains(&id)
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub(crate) fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// The document built so far, without completeness checks.
    pub fn into_document(self) -> Document {
        self.doc
    }

    /// Finish building. Fails if elements are still open or no element
    /// was ever started.
    pub fn finish(self) -> Result<Document> {
        if !self.stack.is_empty() {
            return Err(Error::Unclosed {
                depth: self.stack.len(),
            });
        }
        if self.doc.root.is_none() {
            return Err(Error::EmptyDocument);
        }
        debug!(elements = self.doc.live, "document built");
        Ok(self.doc)
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a document from any event source.
pub fn build<'a, I>(events: I) -> Result<Document>
where
    I: IntoIterator<Item = Result<Event<'a>>>,
{
    let mut builder = TreeBuilder::new();
    for event in events {
        builder.handle_event(event?)?;
    }
    builder.finish()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tags<'d>(elements: impl Iterator<Item = Element<'d>>) -> Vec<&'d str> {
        elements.map(|e| e.tagname()).collect()
    }

    /// <r><a/><b><c/><a/></b><a/></r>
    fn sample() -> (Document, [NodeId; 6]) {
        let mut doc = Document::with_root("r", &[]).unwrap();
        let r = doc.root_id().unwrap();
        let a0 = doc.append(r, "a", &[], None).unwrap();
        let b = doc.append(r, "b", &[("k", "v")], Some("text")).unwrap();
        let c = doc.append(b, "c", &[], None).unwrap();
        let a1 = doc.append(b, "a", &[], None).unwrap();
        let a2 = doc.append(r, "a", &[], None).unwrap();
        (doc, [r, a0, b, c, a1, a2])
    }

    #[test]
    fn test_append_assigns_sequential_indices() {
        let (doc, [r, a0, b, _, _, a2]) = sample();
        let root = doc.get(r).unwrap();
        assert_eq!(root.len(), 3);
        assert_eq!(doc.get(a0).unwrap().index(), 0);
        assert_eq!(doc.get(b).unwrap().index(), 1);
        assert_eq!(doc.get(a2).unwrap().index(), 2);
        assert_eq!(doc.get(b).unwrap().data(), "text");
        assert_eq!(doc.element_count(), 6);
    }

    #[test]
    fn test_insert_renumbers_following_siblings() {
        let (mut doc, [r, a0, b, _, _, a2]) = sample();
        let x = doc.insert(r, b, "x", &[], None).unwrap();
        let root = doc.get(r).unwrap();
        assert_eq!(tags(root.children(None)), vec!["a", "x", "b", "a"]);
        assert_eq!(doc.get(a0).unwrap().index(), 0);
        assert_eq!(doc.get(x).unwrap().index(), 1);
        assert_eq!(doc.get(b).unwrap().index(), 2);
        assert_eq!(doc.get(a2).unwrap().index(), 3);
        for (i, child) in root.children(None).enumerate() {
            assert_eq!(child.index(), i);
        }
    }

    #[test]
    fn test_tag_positions_track_insert_and_clear() {
        let (mut doc, [r, a0, b, _, a1, a2]) = sample();
        assert_eq!(doc.get(a2).unwrap().tag_position(), 1);
        assert_eq!(doc.get(a1).unwrap().tag_position(), 0);

        let inserted = doc.insert(r, b, "a", &[], None).unwrap();
        let positions: Vec<usize> = [a0, inserted, b, a2]
            .iter()
            .map(|&id| doc.get(id).unwrap().tag_position())
            .collect();
        assert_eq!(positions, vec![0, 1, 0, 2]);
        let root = doc.get(r).unwrap();
        assert_eq!(root.tag_count("a"), 3);
        assert_eq!(root.tag_count("b"), 1);
        assert_eq!(root.tag_count("zzz"), 0);

        doc.clear(b).unwrap();
        let fresh = doc.append(b, "a", &[], None).unwrap();
        assert_eq!(doc.get(fresh).unwrap().tag_position(), 0);
        assert_eq!(doc.get(b).unwrap().tag_count("a"), 1);
        assert_eq!(doc.get(b).unwrap().tag_count("c"), 0);
    }

    #[test]
    fn test_wide_parent_positions() {
        const WIDTH: usize = 20_000;
        let mut doc = Document::with_root("r", &[]).unwrap();
        let r = doc.root_id().unwrap();
        for i in 0..WIDTH {
            let tag = if i % 2 == 0 { "i" } else { "j" };
            doc.append(r, tag, &[], None).unwrap();
        }
        let root = doc.root().unwrap();
        let last = root.last(Some("i")).unwrap();
        assert_eq!(last.tag_position(), WIDTH / 2 - 1);
        assert_eq!(last.path(), format!("i[{}]", WIDTH / 2 - 1));
        let total: usize = root.children(None).map(|c| c.tag_position()).sum();
        assert_eq!(total, 2 * (0..WIDTH / 2).sum::<usize>());
    }

    #[test]
    fn test_insert_rejects_non_child() {
        let (mut doc, [r, _, _, c, _, _]) = sample();
        assert!(matches!(doc.insert(r, c, "x", &[], None), Err(Error::NotAChild)));
    }

    #[test]
    fn test_invalid_names_rejected() {
        let (mut doc, [r, ..]) = sample();
        assert!(matches!(doc.append(r, "", &[], None), Err(Error::InvalidName(_))));
        assert!(matches!(doc.append(r, "1abc", &[], None), Err(Error::InvalidName(_))));
        assert!(matches!(doc.append(r, "ok", &[("", "v")], None), Err(Error::InvalidName(_))));
        assert!(doc.append(r, "ns:tag-name.x", &[], None).is_ok());
    }

    #[test]
    fn test_attr_lookup() {
        let mut doc = Document::with_root("r", &[("empty", ""), ("id", "1")]).unwrap();
        let r = doc.root_id().unwrap();
        doc.append(r, "c", &[], None).unwrap();
        let root = doc.root().unwrap();
        assert_eq!(root.attr("empty").unwrap(), "");
        assert_eq!(root.attr("id").unwrap(), "1");
        assert!(matches!(root.attr("nope"), Err(Error::MissingAttribute { .. })));
        assert_eq!(root.get_attr("nope"), None);
        assert_eq!(root.attrs().collect::<Vec<_>>(), vec![("empty", ""), ("id", "1")]);
    }

    #[test]
    fn test_child_index_out_of_range() {
        let (doc, [r, ..]) = sample();
        let root = doc.get(r).unwrap();
        assert_eq!(root.child(1).unwrap().tagname(), "b");
        assert!(matches!(
            root.child(3),
            Err(Error::IndexOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_children_filter_and_reverse() {
        let (doc, [r, a0, _, _, _, a2]) = sample();
        let root = doc.get(r).unwrap();
        assert_eq!(tags(root.children(None)), vec!["a", "b", "a"]);
        assert_eq!(tags(root.children(None).rev()), vec!["a", "b", "a"]);
        assert_eq!(root.children(Some("a")).count(), 2);
        assert_eq!(root.first(Some("a")).unwrap().id(), a0);
        assert_eq!(root.last(Some("a")).unwrap().id(), a2);
        assert_eq!(root.first(Some("zzz")), None);
    }

    #[test]
    fn test_find_is_preorder() {
        let (doc, [r, a0, b, c, a1, a2]) = sample();
        let root = doc.get(r).unwrap();
        let ids: Vec<NodeId> = root.find(None).map(|e| e.id()).collect();
        assert_eq!(ids, vec![a0, b, c, a1, a2]);
        let ids: Vec<NodeId> = root.find(Some("a")).map(|e| e.id()).collect();
        assert_eq!(ids, vec![a0, a1, a2]);

        // Restartable: a fresh call yields the same sequence.
        let again: Vec<NodeId> = root.find(Some("a")).map(|e| e.id()).collect();
        assert_eq!(ids, again);
    }

    #[test]
    fn test_sibling_navigation() {
        let (doc, [r, a0, b, c, a1, a2]) = sample();
        let first = doc.get(a0).unwrap();
        assert_eq!(first.next(None).unwrap().id(), b);
        assert_eq!(first.next(Some("a")).unwrap().id(), a2);
        assert_eq!(first.prev(None), None);
        assert_eq!(doc.get(a2).unwrap().prev(Some("a")).unwrap().id(), a0);
        assert_eq!(doc.get(c).unwrap().next(None).unwrap().id(), a1);
        assert_eq!(doc.get(r).unwrap().next(None), None);

        let siblings: Vec<NodeId> = doc.get(b).unwrap().siblings(None).map(|e| e.id()).collect();
        assert_eq!(siblings, vec![a0, a2]);
        assert_eq!(doc.get(a0).unwrap().siblings(Some("a")).count(), 1);
        assert_eq!(doc.get(r).unwrap().siblings(None).count(), 0);
    }

    #[test]
    fn test_parents_chain() {
        let (doc, [r, _, b, c, _, _]) = sample();
        let chain: Vec<NodeId> = doc.get(c).unwrap().parents().map(|e| e.id()).collect();
        assert_eq!(chain, vec![b, r]);
        assert_eq!(doc.get(c).unwrap().root().id(), r);
    }

    #[test]
    fn test_path() {
        let (doc, [r, a0, b, _, a1, a2]) = sample();
        assert_eq!(doc.get(a0).unwrap().path(), "a[0]");
        assert_eq!(doc.get(a2).unwrap().path(), "a[1]");
        assert_eq!(doc.get(a1).unwrap().path(), "b[0]/a[0]");
        assert_eq!(doc.get(a1).unwrap().path_with_root(), "r[0]/b[0]/a[0]");
        assert_eq!(doc.get(b).unwrap().path(), "b[0]");
        assert_eq!(doc.get(r).unwrap().path(), "r[0]");
    }

    #[test]
    fn test_clear_frees_subtree_and_keeps_identity() {
        let (mut doc, [r, a0, b, c, a1, a2]) = sample();
        let freed = doc.clear(b).unwrap();
        assert_eq!(freed, 2);
        assert_eq!(doc.element_count(), 4);

        let cleared = doc.get(b).unwrap();
        assert_eq!(cleared.len(), 0);
        assert_eq!(cleared.data(), "");
        assert_eq!(cleared.tagname(), "b");
        assert_eq!(cleared.attr("k").unwrap(), "v");
        assert_eq!(cleared.index(), 1);
        assert_eq!(cleared.parent().unwrap().id(), r);
        assert_eq!(cleared.prev(None).unwrap().id(), a0);
        assert_eq!(cleared.next(None).unwrap().id(), a2);

        assert!(!doc.contains(c));
        assert!(!doc.contains(a1));
        assert!(matches!(doc.characters(c, "x"), Err(Error::StaleNode)));
    }

    #[test]
    fn test_cleared_slots_are_reused_with_new_generation() {
        let (mut doc, [_, _, b, c, _, _]) = sample();
        let capacity = doc.capacity();
        doc.clear(b).unwrap();
        let fresh = doc.append(b, "fresh", &[], None).unwrap();
        assert_eq!(doc.capacity(), capacity);
        assert_ne!(fresh, c);
        assert!(doc.get(c).is_none());
        assert_eq!(doc.get(fresh).unwrap().tagname(), "fresh");
    }

    #[test]
    fn test_builder_finalizes_and_trims() {
        let events = vec![
            Ok(Event::start("r")),
            Ok(Event::characters("  hello ")),
            Ok(Event::start("c")),
            Ok(Event::characters("\n x \n")),
            Ok(Event::end("c")),
            Ok(Event::characters("world  ")),
            Ok(Event::end("r")),
        ];
        let doc = build(events).unwrap();
        let root = doc.root().unwrap();
        assert_eq!(root.data(), "hello world");
        assert_eq!(root.first(None).unwrap().data(), "x");
    }

    #[test]
    fn test_builder_structural_errors() {
        let mut builder = TreeBuilder::new();
        assert!(matches!(
            builder.handle_event(Event::end("x")),
            Err(Error::UnexpectedEnd { .. })
        ));

        let mut builder = TreeBuilder::new();
        builder.handle_event(Event::start("a")).unwrap();
        assert!(matches!(
            builder.handle_event(Event::end("b")),
            Err(Error::MismatchedEnd { .. })
        ));

        let mut builder = TreeBuilder::new();
        builder.handle_event(Event::start("a")).unwrap();
        builder.handle_event(Event::end("a")).unwrap();
        assert!(matches!(
            builder.handle_event(Event::start("b")),
            Err(Error::MultipleRoots { .. })
        ));

        let mut builder = TreeBuilder::new();
        builder.handle_event(Event::characters("\n  ")).unwrap();
        assert!(matches!(
            builder.handle_event(Event::characters("junk")),
            Err(Error::TextOutsideRoot(ref text)) if text == "junk"
        ));

        let mut builder = TreeBuilder::new();
        builder.handle_event(Event::start("a")).unwrap();
        assert_eq!(builder.depth(), 1);
        assert!(matches!(builder.finish(), Err(Error::Unclosed { depth: 1 })));

        assert!(matches!(
            build(Vec::<Result<Event<'_>>>::new()),
            Err(Error::EmptyDocument)
        ));
    }
}
