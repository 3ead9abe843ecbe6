//! Streaming construction: yield each element as soon as it closes.
//!
//! The stream drives a [`TreeBuilder`] from an event source and hands out
//! the id of every element whose end tag has just been seen. Elements are
//! yielded in closing order: children before their parent, siblings in
//! document order, the root last.
//!
//! # Memory Management
//!
//! Yielded elements stay in the stream's document until the caller drops
//! them with [`Stream::clear`]. Clearing each element once it has been
//! processed keeps the live tree to roughly the open-element path plus
//! the cleared shells of already seen siblings.
//!
//! ```text
//! Event source        TreeBuilder              Caller
//!     │                   │                      │
//!     │──Start──────────▶ │ push                 │
//!     │──Characters─────▶ │ append to top        │
//!     │──End────────────▶ │ finalize, pop ──id──▶│ inspect, query
//!     │                   │ ◀──────clear(id)─────│
//! ```
//!
//! # Example
//!
//! ```
//! use drill_core::iterparse_str;
//!
//! let mut stream = iterparse_str("<r><a>1</a><a>2</a></r>");
//! let mut seen = Vec::new();
//! while let Some(id) = stream.next() {
//!     let id = id.unwrap();
//!     let element = stream.element(id).unwrap();
//!     seen.push(format!("{}={}", element.tagname(), element.data()));
//!     stream.clear(id).unwrap();
//! }
//! assert_eq!(seen, ["a=1", "a=2", "r="]);
//! ```

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::event::Event;
use crate::tree::{Document, Element, NodeId, TreeBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Still drawing events from the source.
    Running,
    /// Source exhausted after a complete document.
    Finished,
    /// A structural error ended the stream.
    Failed,
}

/// Pull-driven element stream over an event source.
///
/// Iterating yields `Result<NodeId>`; resolve ids with
/// [`Stream::element`]. After the first error the stream is fused, and
/// elements yielded before the error remain available.
#[derive(Debug)]
pub struct Stream<I> {
    events: I,
    builder: TreeBuilder,
    state: State,
    yielded: usize,
}

impl<'a, I> Stream<I>
where
    I: Iterator<Item = Result<Event<'a>>>,
{
    pub fn new(events: I) -> Self {
        Stream {
            events,
            builder: TreeBuilder::new(),
            state: State::Running,
            yielded: 0,
        }
    }

    /// Advance until the next element closes.
    pub fn next_element(&mut self) -> Option<Result<NodeId>> {
        if self.state != State::Running {
            return None;
        }
        loop {
            let Some(event) = self.events.next() else {
                return self.end_of_input();
            };
            match event.and_then(|event| self.builder.handle_event(event)) {
                Ok(Some(id)) => {
                    self.yielded += 1;
                    trace!(depth = self.builder.depth(), "element closed");
                    return Some(Ok(id));
                }
                Ok(None) => {}
                Err(err) => {
                    self.state = State::Failed;
                    debug!(error = %err, yielded = self.yielded, "stream aborted");
                    return Some(Err(err));
                }
            }
        }
    }

    fn end_of_input(&mut self) -> Option<Result<NodeId>> {
        let depth = self.builder.depth();
        let outcome = if depth > 0 {
            Some(Err(Error::Unclosed { depth }))
        } else if self.builder.document().root_id().is_none() {
            Some(Err(Error::EmptyDocument))
        } else {
            None
        };
        self.state = if outcome.is_some() {
            State::Failed
        } else {
            State::Finished
        };
        debug!(yielded = self.yielded, state = ?self.state, "stream finished");
        outcome
    }

    /// Resolve a yielded id. Returns `None` once the element was cleared
    /// away as part of an ancestor.
    pub fn element(&self, id: NodeId) -> Option<Element<'_>> {
        self.builder.document().get(id)
    }

    /// The root element, available from its start tag on.
    pub fn root(&self) -> Option<Element<'_>> {
        self.builder.document().root()
    }

    /// Drop an element's data and subtree. Only closed elements can be
    /// cleared; an element whose end tag is still pending fails with
    /// [`Error::ElementOpen`].
    pub fn clear(&mut self, id: NodeId) -> Result<usize> {
        if self.builder.is_open(id) {
            return Err(Error::ElementOpen);
        }
        self.builder.document_mut().clear(id)
    }

    /// The tree built so far.
    pub fn document(&self) -> &Document {
        self.builder.document()
    }

    /// Number of open elements.
    pub fn depth(&self) -> usize {
        self.builder.depth()
    }

    /// True when no element is open.
    pub fn is_idle(&self) -> bool {
        self.builder.depth() == 0
    }

    /// True once the source is exhausted or an error ended the stream.
    pub fn is_done(&self) -> bool {
        self.state != State::Running
    }

    /// Number of elements yielded so far.
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    /// Stop streaming and keep whatever tree has been built.
    pub fn into_document(self) -> Document {
        self.builder.into_document()
    }
}

impl<'a, I> Iterator for Stream<I>
where
    I: Iterator<Item = Result<Event<'a>>>,
{
    type Item = Result<NodeId>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_element()
    }
}

impl<'a, I> std::iter::FusedIterator for Stream<I> where I: Iterator<Item = Result<Event<'a>>> {}
