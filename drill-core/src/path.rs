//! Path queries over element trees.
//!
//! A path is one or more `/`-separated segments. Each segment is a tag
//! name or `*`, optionally followed by one bracketed predicate:
//!
//! ```text
//! book/isbn            isbn children of book children
//! //isbn               isbn elements at any depth
//! book//isbn           isbn elements anywhere below (or at) each book
//! *[0]                 first child
//! book[-1]             last book child
//! book[@id]            book children with an id attribute
//! book[@id=b1]         ... whose id is "b1" (quotes optional)
//! *[price]             children having a price child
//! *[price=4.99]        ... whose price text is "4.99"
//! ```
//!
//! A leading `/` or `//`, and any `//` inside the path, makes the next
//! segment search descendants-or-self instead of direct children. Runs of
//! slashes count as one marker.
//!
//! Queries are compiled once into an immutable [`Query`] that can be
//! shared between threads and evaluated against any number of trees.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use memchr::memchr;
use tracing::trace;

use crate::error::{Error, Result};
use crate::tree::{is_name_char, Element};

// ============================================================================
// Compiled representation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum TagMatcher {
    Any,
    Name(String),
}

impl TagMatcher {
    fn matches(&self, element: &Element<'_>) -> bool {
        match self {
            TagMatcher::Any => true,
            TagMatcher::Name(name) => element.tagname() == name,
        }
    }
}

impl fmt::Display for TagMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagMatcher::Any => f.write_str("*"),
            TagMatcher::Name(name) => f.write_str(name),
        }
    }
}

/// Bracketed segment filter.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    /// `[N]`
    Position(usize),
    /// `[-N]`
    FromEnd(usize),
    /// `[@attr]` or `[@attr=value]`
    Attr { name: String, value: Option<String> },
    /// `[tag]` or `[tag=value]`
    Child { tag: TagMatcher, text: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    descendant: bool,
    tag: TagMatcher,
    predicate: Option<Predicate>,
}

impl Segment {
    fn accepts(&self, element: &Element<'_>) -> bool {
        if !self.tag.matches(element) {
            return false;
        }
        match &self.predicate {
            None => true,
            Some(Predicate::Position(n)) => self.rank(element).0 == *n,
            Some(Predicate::FromEnd(n)) => {
                let (position, count) = self.rank(element);
                count.checked_sub(*n) == Some(position)
            }
            Some(Predicate::Attr { name, value }) => match value {
                None => element.has_attr(name),
                Some(value) => element.get_attr(name) == Some(value.as_str()),
            },
            Some(Predicate::Child { tag, text }) => element
                .children(None)
                .filter(|c| tag.matches(c))
                .any(|c| text.as_deref().map_or(true, |t| c.data().trim() == t)),
        }
    }

    /// Position of `element` among its parent's children that match this
    /// segment's tag, and how many such children there are.
    fn rank(&self, element: &Element<'_>) -> (usize, usize) {
        let Some(parent) = element.parent() else {
            return (0, 1);
        };
        match &self.tag {
            TagMatcher::Any => (element.index(), parent.len()),
            TagMatcher::Name(name) => (element.tag_position(), parent.tag_count(name)),
        }
    }
}

/// A compiled path query.
///
/// Cheap to clone; the segment list is shared and never mutated.
#[derive(Debug, Clone)]
pub struct Query {
    source: Arc<str>,
    segments: Arc<[Segment]>,
}

impl Query {
    /// Compile a path string. Fails on malformed syntax, independent of
    /// any tree.
    pub fn compile(query: &str) -> Result<Self> {
        let segments = Compiler::new(query).run()?;
        trace!(query, segments = segments.len(), "compiled path query");
        Ok(Query {
            source: Arc::from(query),
            segments: segments.into(),
        })
    }

    /// The path string this query was compiled from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Evaluate against `context`. Nothing is computed until the first
    /// match is requested; calling `select` again restarts from scratch.
    pub fn select<'d>(&self, context: Element<'d>) -> Matches<'d> {
        Matches {
            segments: Arc::clone(&self.segments),
            context,
            results: None,
        }
    }

    /// First match in document order.
    pub fn first<'d>(&self, context: Element<'d>) -> Option<Element<'d>> {
        self.select(context).next()
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

impl Eq for Query {}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for Query {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Query::compile(s)
    }
}

// ============================================================================
// Evaluation
// ============================================================================

fn evaluate<'d>(segments: &[Segment], context: Element<'d>) -> Vec<Element<'d>> {
    let mut candidates = vec![context];
    for segment in segments {
        let mut next = Vec::new();
        for candidate in &candidates {
            if segment.descendant {
                if segment.accepts(candidate) {
                    next.push(*candidate);
                }
                next.extend(candidate.find(None).filter(|e| segment.accepts(e)));
            } else {
                next.extend(candidate.children(None).filter(|e| segment.accepts(e)));
            }
        }
        if next.len() > 1 {
            next.sort_by_cached_key(|e| e.order_key());
            next.dedup_by_key(|e| e.id());
        }
        candidates = next;
        if candidates.is_empty() {
            break;
        }
    }
    candidates
}

/// Matches of a query, in document order without duplicates.
///
/// Evaluation is deferred to the first call to `next`.
#[derive(Clone)]
pub struct Matches<'d> {
    segments: Arc<[Segment]>,
    context: Element<'d>,
    results: Option<std::vec::IntoIter<Element<'d>>>,
}

impl<'d> Iterator for Matches<'d> {
    type Item = Element<'d>;

    fn next(&mut self) -> Option<Self::Item> {
        let segments = &self.segments;
        let context = self.context;
        self.results
            .get_or_insert_with(|| evaluate(segments, context).into_iter())
            .next()
    }
}

impl fmt::Debug for Matches<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matches")
            .field("context", &self.context)
            .field("evaluated", &self.results.is_some())
            .finish()
    }
}

impl<'d> Element<'d> {
    /// Compile `path` and evaluate it with this element as the root.
    pub fn query(&self, path: &str) -> Result<Matches<'d>> {
        Ok(Query::compile(path)?.select(*self))
    }

    /// Evaluate an already compiled query with this element as the root.
    pub fn select(&self, query: &Query) -> Matches<'d> {
        query.select(*self)
    }
}

// ============================================================================
// Compiler
// ============================================================================

struct Compiler<'q> {
    query: &'q str,
    pos: usize,
}

impl<'q> Compiler<'q> {
    fn new(query: &'q str) -> Self {
        Compiler { query, pos: 0 }
    }

    fn error(&self, reason: &'static str) -> Error {
        Error::query(self.query, self.pos, reason)
    }

    fn rest(&self) -> &'q str {
        &self.query[self.pos..]
    }

    fn peek(&self) -> Option<u8> {
        self.query.as_bytes().get(self.pos).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn run(mut self) -> Result<Vec<Segment>> {
        if self.query.is_empty() {
            return Err(self.error("empty query"));
        }
        let mut segments = Vec::new();
        loop {
            let mut slashes = 0;
            while self.eat(b'/') {
                slashes += 1;
            }
            if !segments.is_empty() && slashes == 0 {
                return Err(self.error("expected '/' between segments"));
            }
            let descendant = if segments.is_empty() { slashes > 0 } else { slashes > 1 };
            if self.peek().is_none() {
                return Err(self.error("expected tag name after '/'"));
            }
            segments.push(self.segment(descendant)?);
            if self.peek().is_none() {
                return Ok(segments);
            }
        }
    }

    fn segment(&mut self, descendant: bool) -> Result<Segment> {
        let tag = self.tag()?;
        let predicate = if self.eat(b'[') {
            Some(self.predicate()?)
        } else {
            None
        };
        match self.peek() {
            None | Some(b'/') => Ok(Segment {
                descendant,
                tag,
                predicate,
            }),
            Some(b'[') => Err(self.error("only one predicate per segment")),
            Some(_) => Err(self.error("unexpected character")),
        }
    }

    fn name(&mut self) -> &'q str {
        let rest = self.rest();
        let end = rest
            .char_indices()
            .find(|&(_, c)| !is_name_char(c))
            .map_or(rest.len(), |(i, _)| i);
        self.pos += end;
        &rest[..end]
    }

    fn tag(&mut self) -> Result<TagMatcher> {
        if self.eat(b'*') {
            return Ok(TagMatcher::Any);
        }
        match self.name() {
            "" => Err(self.error("expected tag name")),
            name => Ok(TagMatcher::Name(name.to_owned())),
        }
    }

    fn predicate(&mut self) -> Result<Predicate> {
        let predicate = match self.peek() {
            Some(b'@') => {
                self.pos += 1;
                let name = self.name();
                if name.is_empty() {
                    return Err(self.error("expected attribute name"));
                }
                let value = self.value()?;
                Predicate::Attr {
                    name: name.to_owned(),
                    value,
                }
            }
            Some(b'-') | Some(b'0'..=b'9') => {
                let negative = self.eat(b'-');
                let rest = self.rest();
                let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
                if digits == 0 {
                    return Err(self.error("expected digits"));
                }
                let n: usize = rest[..digits]
                    .parse()
                    .map_err(|_| self.error("index too large"))?;
                self.pos += digits;
                if negative {
                    Predicate::FromEnd(n)
                } else {
                    Predicate::Position(n)
                }
            }
            Some(b']') => return Err(self.error("empty predicate")),
            None => return Err(self.error("unclosed predicate")),
            Some(_) => {
                let tag = self.tag()?;
                let text = self.value()?;
                Predicate::Child { tag, text }
            }
        };
        if !self.eat(b']') {
            return Err(match self.peek() {
                None => self.error("unclosed predicate"),
                Some(_) => self.error("expected ']'"),
            });
        }
        Ok(predicate)
    }

    /// Optional `=value` part of a predicate.
    fn value(&mut self) -> Result<Option<String>> {
        if !self.eat(b'=') {
            return Ok(None);
        }
        let rest = self.rest().as_bytes();
        match rest.first() {
            Some(&quote) if quote == b'\'' || quote == b'"' => {
                let Some(len) = memchr(quote, &rest[1..]) else {
                    return Err(self.error("unterminated string"));
                };
                let value = &self.rest()[1..1 + len];
                self.pos += len + 2;
                Ok(Some(value.to_owned()))
            }
            _ => {
                let Some(len) = memchr(b']', rest) else {
                    return Err(self.error("unclosed predicate"));
                };
                let value = &self.rest()[..len];
                self.pos += len;
                Ok(Some(value.to_owned()))
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
