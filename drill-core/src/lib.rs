//! drill core
//!
//! Lightweight in-memory XML element trees with a compact path query
//! language and streaming construction for documents larger than memory.
//!
//! # Architecture
//!
//! - **event.rs** - Start/characters/end events, quick-xml event source
//! - **tree.rs** - Element arena, navigation handles, tree builder
//! - **path.rs** - Path query compiler and evaluator
//! - **streaming.rs** - Element stream with subtree pruning
//! - **writer.rs** - XML serialization
//! - **source.rs** - Parse entrypoints for URIs, text, files and readers
//!
//! # Example
//!
//! ```
//! use drill_core::{parse_str, WriteOptions};
//!
//! let doc = parse_str("<catalog><book><isbn>1</isbn></book><book><isbn>2</isbn></book></catalog>")?;
//! let catalog = doc.root().unwrap();
//!
//! let isbns: Vec<&str> = catalog.query("book/isbn")?.map(|e| e.data()).collect();
//! assert_eq!(isbns, ["1", "2"]);
//!
//! let last = catalog.query("book[-1]")?.next().unwrap();
//! assert_eq!(last.xml(&WriteOptions::compact())?, b"<book><isbn>2</isbn></book>");
//! # Ok::<(), drill_core::Error>(())
//! ```

pub mod error;
pub mod event;
pub mod path;
pub mod source;
pub mod streaming;
pub mod tree;
pub mod writer;

pub use error::{Error, Result};
pub use event::{Event, XmlEvents};
pub use path::{Matches, Query};
pub use source::{
    iterparse, iterparse_file, iterparse_str, parse, parse_bytes, parse_bytes_with_encoding,
    parse_file, parse_reader, parse_str, parse_uri, InputKind,
};
pub use streaming::Stream;
pub use tree::{build, Ancestors, Children, Descendants, Document, Element, NodeId, Siblings, TreeBuilder};
pub use writer::{WriteOptions, XmlWriter};
