//! Construction entrypoints.
//!
//! Every input form (URI, literal XML text, filesystem path, open reader)
//! is normalized to the same event sequence before it reaches the tree
//! builder. The single-shot `parse*` functions return a complete document
//! or an error, never a partial tree. The `iterparse*` functions return a
//! [`Stream`] that yields elements as they close.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use encoding_rs::Encoding;
use memchr::memmem;
use quick_xml::encoding::EncodingError;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::event::XmlEvents;
use crate::streaming::Stream;
use crate::tree::{build, Document};

/// How far into a string to look for a URI scheme separator.
const URI_SNIFF_LEN: usize = 50;
/// How far into a string to look for the opening `<` of literal XML.
const TEXT_SNIFF_LEN: usize = 100;

/// What a string handed to [`parse`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Contains `://` near the start.
    Uri,
    /// Starts with `<` after optional whitespace.
    Text,
    /// Anything else.
    Path,
}

impl InputKind {
    /// Literal text wins over the URI check: a namespace declaration
    /// near the start of a document also contains `://`.
    pub fn detect(input: &str) -> Self {
        let bytes = input.as_bytes();
        let head = &bytes[..bytes.len().min(TEXT_SNIFF_LEN)];
        if head.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'<') {
            return InputKind::Text;
        }
        let head = &bytes[..bytes.len().min(URI_SNIFF_LEN)];
        if memmem::find(head, b"://").is_some() {
            InputKind::Uri
        } else {
            InputKind::Path
        }
    }
}

/// Parse a URI, literal XML text, or a filesystem path, whichever `input`
/// looks like.
pub fn parse(input: &str) -> Result<Document> {
    match InputKind::detect(input) {
        InputKind::Uri => parse_uri(input),
        InputKind::Text => parse_str(input),
        InputKind::Path => parse_file(input),
    }
}

/// Parse literal XML text.
pub fn parse_str(xml: &str) -> Result<Document> {
    debug!(kind = "text", len = xml.len(), "parsing document");
    build(XmlEvents::from_str(xml))
}

/// Parse an in-memory byte buffer. The encoding comes from a byte order
/// mark or the XML declaration and defaults to UTF-8.
pub fn parse_bytes(bytes: &[u8]) -> Result<Document> {
    debug!(kind = "bytes", len = bytes.len(), "parsing document");
    build(XmlEvents::new(bytes))
}

/// Parse a byte buffer in a known encoding. A byte order mark still takes
/// precedence; the XML declaration does not.
pub fn parse_bytes_with_encoding(bytes: &[u8], encoding: &'static Encoding) -> Result<Document> {
    let (text, used, had_errors) = encoding.decode(bytes);
    debug!(kind = "bytes", len = bytes.len(), encoding = used.name(), "parsing document");
    if had_errors {
        return Err(Error::Encoding(EncodingError::Other(used)));
    }
    build(XmlEvents::from_str(&text))
}

/// Parse a file.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Document> {
    let path = path.as_ref();
    debug!(kind = "file", path = %path.display(), "parsing document");
    let file = File::open(path)?;
    build(XmlEvents::new(BufReader::new(file)))
}

/// Parse any byte source.
pub fn parse_reader<R: Read>(reader: R) -> Result<Document> {
    debug!(kind = "reader", "parsing document");
    build(XmlEvents::new(BufReader::new(reader)))
}

/// Parse the document a URI points at. Only `file:` URIs are read here;
/// other schemes need a retrieval collaborator that hands over a reader.
pub fn parse_uri(uri: &str) -> Result<Document> {
    let path = local_path(uri)?;
    debug!(kind = "uri", %uri, "parsing document");
    parse_file(path)
}

fn local_path(uri: &str) -> Result<std::path::PathBuf> {
    let url = Url::parse(uri)?;
    if url.scheme() != "file" {
        return Err(Error::UnsupportedScheme(url.scheme().to_owned()));
    }
    url.to_file_path().map_err(|()| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{uri} does not name a local file"),
        ))
    })
}

/// Stream elements from a buffered byte source.
pub fn iterparse<R: BufRead>(reader: R) -> Stream<XmlEvents<R>> {
    Stream::new(XmlEvents::new(reader))
}

/// Stream elements from literal XML text.
pub fn iterparse_str(xml: &str) -> Stream<XmlEvents<&[u8]>> {
    Stream::new(XmlEvents::from_str(xml))
}

/// Stream elements from a file.
pub fn iterparse_file(path: impl AsRef<Path>) -> Result<Stream<XmlEvents<BufReader<File>>>> {
    let path = path.as_ref();
    debug!(kind = "file", path = %path.display(), "streaming document");
    let file = File::open(path)?;
    Ok(iterparse(BufReader::new(file)))
}
