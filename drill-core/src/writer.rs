//! XML serialization of element subtrees.
//!
//! Output is a self-contained fragment (no XML declaration). Text and
//! attribute values are escaped; control characters other than tab,
//! newline and carriage return are not allowed in XML and are replaced by
//! [`WriteOptions::invalid`] (removed by default).

use std::collections::BTreeMap;
use std::io::Write;

use encoding_rs::{CoderResult, Encoder, Encoding, UTF_8};
use phf::phf_map;

use crate::error::{Error, Result};
use crate::tree::{Document, Element};

/// Escapes applied to character data and names.
static TEXT_ESCAPES: phf::Map<char, &'static str> = phf_map! {
    '&' => "&amp;",
    '<' => "&lt;",
    '>' => "&gt;",
    '"' => "&quot;",
};

/// Escapes applied to attribute values. Whitespace control characters are
/// written as references so they survive attribute value normalization.
static ATTR_ESCAPES: phf::Map<char, &'static str> = phf_map! {
    '&' => "&amp;",
    '<' => "&lt;",
    '>' => "&gt;",
    '"' => "&quot;",
    '\t' => "&#9;",
    '\n' => "&#10;",
    '\r' => "&#13;",
};

/// Pending output is encoded and flushed once it grows past this size.
const FLUSH_THRESHOLD: usize = 8 * 1024;

/// Serialization settings.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Indent nested elements and end lines.
    pub pretty: bool,
    /// Indent unit, used only when `pretty` is set.
    pub indent: String,
    /// Substitute for control characters XML cannot carry.
    pub invalid: String,
    /// Per-character substitutions, taking precedence over `invalid`.
    pub replacements: BTreeMap<char, String>,
    /// Output encoding. Characters it cannot represent are written as
    /// numeric character references.
    pub encoding: &'static Encoding,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions {
            pretty: true,
            indent: "    ".to_owned(),
            invalid: String::new(),
            replacements: BTreeMap::new(),
            encoding: UTF_8,
        }
    }
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compact output: no indentation, no newlines.
    pub fn compact() -> Self {
        WriteOptions {
            pretty: false,
            ..Self::default()
        }
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn indent(mut self, indent: impl Into<String>) -> Self {
        self.indent = indent.into();
        self
    }

    pub fn invalid(mut self, invalid: impl Into<String>) -> Self {
        self.invalid = invalid.into();
        self
    }

    pub fn replace(mut self, c: char, with: impl Into<String>) -> Self {
        self.replacements.insert(c, with.into());
        self
    }

    pub fn encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Select the output encoding by WHATWG label, e.g. `"latin1"`.
    pub fn with_encoding(self, label: &str) -> Result<Self> {
        let encoding = Encoding::for_label(label.trim().as_bytes())
            .ok_or_else(|| Error::UnknownEncoding(label.to_owned()))?;
        Ok(self.encoding(encoding))
    }

    /// Control characters map to `invalid`, then explicit replacements.
    fn substitution_table(&self) -> BTreeMap<char, String> {
        let mut table: BTreeMap<char, String> = (0u8..32)
            .filter(|c| !matches!(c, 9 | 10 | 13))
            .map(|c| (char::from(c), self.invalid.clone()))
            .collect();
        table.extend(self.replacements.iter().map(|(&c, s)| (c, s.clone())));
        table
    }
}

/// Incremental XML writer.
///
/// Text is escaped into an internal buffer and encoded into the sink in
/// chunks. Call [`XmlWriter::finish`] to flush the remainder.
pub struct XmlWriter<W: Write> {
    sink: W,
    pretty: bool,
    indent: String,
    substitutions: BTreeMap<char, String>,
    encoder: Encoder,
    pending: String,
    encoded: Vec<u8>,
    level: usize,
}

impl<W: Write> XmlWriter<W> {
    pub fn new(sink: W, options: &WriteOptions) -> Self {
        let substitutions = options.substitution_table();
        let mut indent = String::with_capacity(options.indent.len());
        escape_into(&mut indent, &options.indent, &TEXT_ESCAPES, &substitutions);
        XmlWriter {
            sink,
            pretty: options.pretty,
            indent,
            substitutions,
            encoder: options.encoding.new_encoder(),
            pending: String::with_capacity(FLUSH_THRESHOLD),
            encoded: Vec::new(),
            level: 0,
        }
    }

    fn newline(&mut self) {
        if self.pretty {
            self.pending.push('\n');
        }
    }

    fn write_indent(&mut self) {
        if self.pretty {
            for _ in 0..self.level {
                self.pending.push_str(&self.indent);
            }
        }
    }

    /// Open a tag. Attributes are written in the order given.
    pub fn start<'a>(
        &mut self,
        tag: &str,
        attrs: impl IntoIterator<Item = (&'a str, &'a str)>,
        newline: bool,
    ) -> Result<()> {
        self.write_indent();
        self.pending.push('<');
        escape_into(&mut self.pending, tag, &TEXT_ESCAPES, &self.substitutions);
        for (key, value) in attrs {
            self.pending.push(' ');
            escape_into(&mut self.pending, key, &TEXT_ESCAPES, &self.substitutions);
            self.pending.push_str("=\"");
            escape_into(&mut self.pending, value, &ATTR_ESCAPES, &self.substitutions);
            self.pending.push('"');
        }
        self.pending.push('>');
        if newline {
            self.newline();
        }
        self.level += 1;
        self.maybe_flush()
    }

    /// Write character data, trimmed and escaped.
    pub fn data(&mut self, text: &str) -> Result<()> {
        escape_into(&mut self.pending, text.trim(), &TEXT_ESCAPES, &self.substitutions);
        self.maybe_flush()
    }

    /// Close a tag. `indent` puts the end tag on its own indented line.
    pub fn end(&mut self, tag: &str, indent: bool) -> Result<()> {
        self.level = self.level.saturating_sub(1);
        if indent {
            self.write_indent();
        }
        self.pending.push_str("</");
        escape_into(&mut self.pending, tag, &TEXT_ESCAPES, &self.substitutions);
        self.pending.push('>');
        self.newline();
        self.maybe_flush()
    }

    /// Write `<tag attrs>data</tag>` on one line.
    pub fn simple_tag<'a>(
        &mut self,
        tag: &str,
        attrs: impl IntoIterator<Item = (&'a str, &'a str)>,
        data: Option<&str>,
    ) -> Result<()> {
        self.start(tag, attrs, false)?;
        if let Some(text) = data {
            self.data(text)?;
        }
        self.end(tag, false)
    }

    /// Write an element and its whole subtree.
    ///
    /// Walks the subtree with an explicit stack of open elements, so the
    /// nesting depth is bounded by memory rather than by the call stack.
    pub fn element(&mut self, element: Element<'_>) -> Result<()> {
        self.open(element)?;
        let mut stack = vec![(element, element.children(None))];
        while let Some((current, children)) = stack.last_mut() {
            match children.next() {
                Some(child) => {
                    self.open(child)?;
                    stack.push((child, child.children(None)));
                }
                None => {
                    let current = *current;
                    stack.pop();
                    self.end(current.tagname(), current.data().is_empty())?;
                }
            }
        }
        Ok(())
    }

    /// Start tag plus character data. Elements without data put their
    /// children on the following lines.
    fn open(&mut self, element: Element<'_>) -> Result<()> {
        let no_data = element.data().is_empty();
        self.start(element.tagname(), element.attrs(), no_data)?;
        if !no_data {
            self.data(element.data())?;
        }
        Ok(())
    }

    fn maybe_flush(&mut self) -> Result<()> {
        if self.pending.len() >= FLUSH_THRESHOLD {
            self.flush(false)?;
        }
        Ok(())
    }

    fn flush(&mut self, last: bool) -> Result<()> {
        let mut src = self.pending.as_str();
        loop {
            let needed = self
                .encoder
                .max_buffer_length_from_utf8_if_no_unmappables(src.len())
                .unwrap_or(src.len() * 4);
            // Room for a few numeric character references.
            self.encoded.reserve(needed + 64);
            let (result, read, _) = self.encoder.encode_from_utf8_to_vec(src, &mut self.encoded, last);
            src = &src[read..];
            self.sink.write_all(&self.encoded)?;
            self.encoded.clear();
            if result == CoderResult::InputEmpty {
                break;
            }
        }
        self.pending.clear();
        Ok(())
    }

    /// Flush buffered output and return the sink.
    pub fn finish(mut self) -> Result<W> {
        self.flush(true)?;
        self.sink.flush()?;
        Ok(self.sink)
    }
}

fn escape_into(
    out: &mut String,
    text: &str,
    escapes: &phf::Map<char, &'static str>,
    substitutions: &BTreeMap<char, String>,
) {
    for c in text.chars() {
        if let Some(entity) = escapes.get(&c) {
            out.push_str(entity);
        } else if let Some(with) = substitutions.get(&c) {
            out.push_str(with);
        } else {
            out.push(c);
        }
    }
}

impl<'d> Element<'d> {
    /// Serialize this element and its subtree.
    pub fn xml(&self, options: &WriteOptions) -> Result<Vec<u8>> {
        self.write_xml(Vec::new(), options)
    }

    /// Serialize this element and its subtree into `sink`.
    pub fn write_xml<W: Write>(&self, sink: W, options: &WriteOptions) -> Result<W> {
        let mut writer = XmlWriter::new(sink, options);
        writer.element(*self)?;
        writer.finish()
    }
}

impl Document {
    /// Serialize the whole document from its root. An empty document
    /// serializes to nothing.
    pub fn xml(&self, options: &WriteOptions) -> Result<Vec<u8>> {
        match self.root() {
            Some(root) => root.xml(options),
            None => Ok(Vec::new()),
        }
    }
}
