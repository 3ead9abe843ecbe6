//! Error types for building, querying and serializing element trees.
//!
//! Lookup misses for children, siblings and query matches are not errors:
//! they come back as `None` or as an empty iterator. Only conditions that
//! indicate a broken document, a malformed query or caller misuse end up
//! here.

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // ========== Structural parse errors ==========
    /// The tokenizer rejected the input.
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    /// An attribute could not be tokenized.
    #[error("malformed attribute: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),

    /// Input bytes could not be decoded in the document's encoding.
    #[error("undecodable input: {0}")]
    Encoding(#[from] quick_xml::encoding::EncodingError),

    /// An end-tag arrived while no element was open.
    #[error("end tag </{name}> has no matching start tag")]
    UnexpectedEnd { name: String },

    /// An end-tag did not match the innermost open element.
    #[error("end tag </{found}> does not close <{expected}>")]
    MismatchedEnd { expected: String, found: String },

    /// A second top-level element started after the root closed.
    #[error("element <{name}> starts after the root element closed")]
    MultipleRoots { name: String },

    /// Non-whitespace character data before or after the root element.
    #[error("character data {0:?} outside the root element")]
    TextOutsideRoot(String),

    /// The event source ended while elements were still open.
    #[error("input ended with {depth} unclosed element(s)")]
    Unclosed { depth: usize },

    /// The event source ended without producing any element.
    #[error("document contains no elements")]
    EmptyDocument,

    // ========== Query errors ==========
    /// A path query string could not be compiled.
    #[error("invalid path query {query:?} at offset {position}: {reason}")]
    QueryCompile {
        query: String,
        position: usize,
        reason: &'static str,
    },

    // ========== Lookup / misuse ==========
    /// The element has no attribute with this key.
    #[error("element <{tag}> has no attribute {key:?}")]
    MissingAttribute { tag: String, key: String },

    /// Numeric child access past the end of the child list.
    #[error("child index {index} out of range for element with {len} children")]
    IndexOutOfRange { index: usize, len: usize },

    /// A tag name or attribute key is empty or not a well-formed XML name.
    #[error("invalid name {0:?}")]
    InvalidName(String),

    /// The reference node given to `insert` is not a child of the target.
    #[error("reference node is not a child of the target element")]
    NotAChild,

    /// The node id refers to an element that has since been cleared away.
    #[error("node id refers to a cleared element")]
    StaleNode,

    /// `clear` was requested for an element whose end tag has not arrived.
    #[error("element is still open and cannot be cleared")]
    ElementOpen,

    // ========== Serialization / input ==========
    /// The output encoding label is not recognised.
    #[error("unknown encoding {0:?}")]
    UnknownEncoding(String),

    /// The URI scheme requires a retrieval collaborator this crate does not provide.
    #[error("unsupported URI scheme {0:?}")]
    UnsupportedScheme(String),

    /// The input looked like a URI but could not be parsed as one.
    #[error("invalid URI: {0}")]
    InvalidUri(#[from] url::ParseError),

    /// I/O failure while reading input or writing output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn query<S: Into<String>>(query: S, position: usize, reason: &'static str) -> Self {
        Error::QueryCompile {
            query: query.into(),
            position,
            reason,
        }
    }

    /// True for errors that mean the input document itself is malformed.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::Xml(_)
                | Error::Attr(_)
                | Error::Encoding(_)
                | Error::UnexpectedEnd { .. }
                | Error::MismatchedEnd { .. }
                | Error::MultipleRoots { .. }
                | Error::TextOutsideRoot(_)
                | Error::Unclosed { .. }
                | Error::EmptyDocument
        )
    }
}
