//! Parse events - the boundary between the tokenizer and the tree.
//!
//! This is a SAX-style event model: the tokenizer emits events as it
//! encounters markup, and the tree builder turns them into elements.
//! Structure is represented by start/end event pairs.
//!
//! ## Event Sequences
//!
//! `<book id="b1">Title<isbn/></book>` emits:
//! ```text
//! Start { name: "book", attrs: [("id", "b1")] }
//! Characters { text: "Title" }
//! Start { name: "isbn", attrs: [] }
//! End { name: "isbn" }
//! End { name: "book" }
//! ```
//!
//! Comments, processing instructions and the XML declaration produce no
//! events. CDATA sections arrive as `Characters`. Entity references are
//! already expanded.
//!
//! Byte input is decoded using the byte order mark or the `encoding`
//! pseudo-attribute of the XML declaration, falling back to UTF-8.

use std::borrow::Cow;
use std::io::BufRead;

use quick_xml::events::Event as XmlEvent;
use quick_xml::Reader;

use crate::error::Result;

/// Tree construction events.
///
/// The lifetime `'a` lets hand-built event sequences borrow their strings;
/// events read from a tokenizer are `Event<'static>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<'a> {
    /// Start tag with its attributes, in source order.
    Start {
        name: Cow<'a, str>,
        attrs: Vec<(Cow<'a, str>, Cow<'a, str>)>,
    },

    /// Character data inside the current element. May arrive in several
    /// pieces for one element.
    Characters { text: Cow<'a, str> },

    /// End tag.
    End { name: Cow<'a, str> },
}

impl<'a> Event<'a> {
    /// Start event without attributes.
    pub fn start(name: impl Into<Cow<'a, str>>) -> Self {
        Event::Start {
            name: name.into(),
            attrs: Vec::new(),
        }
    }

    /// Character data event.
    pub fn characters(text: impl Into<Cow<'a, str>>) -> Self {
        Event::Characters { text: text.into() }
    }

    /// End event.
    pub fn end(name: impl Into<Cow<'a, str>>) -> Self {
        Event::End { name: name.into() }
    }

    /// Detach the event from any borrowed input.
    pub fn into_owned(self) -> Event<'static> {
        match self {
            Event::Start { name, attrs } => Event::Start {
                name: Cow::Owned(name.into_owned()),
                attrs: attrs
                    .into_iter()
                    .map(|(k, v)| (Cow::Owned(k.into_owned()), Cow::Owned(v.into_owned())))
                    .collect(),
            },
            Event::Characters { text } => Event::Characters {
                text: Cow::Owned(text.into_owned()),
            },
            Event::End { name } => Event::End {
                name: Cow::Owned(name.into_owned()),
            },
        }
    }
}

/// Event source backed by the quick-xml tokenizer.
///
/// Pulls from the underlying reader only when the next event is requested,
/// so dropping the iterator stops all further reading. After the first
/// error the iterator is fused.
pub struct XmlEvents<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    done: bool,
}

impl<'a> XmlEvents<&'a [u8]> {
    /// Read already decoded text. Any encoding named in the XML
    /// declaration is ignored.
    pub fn from_str(text: &'a str) -> Self {
        XmlEvents::with_reader(Reader::from_str(text))
    }
}

impl<R: BufRead> XmlEvents<R> {
    /// Wrap a buffered byte source.
    pub fn new(source: R) -> Self {
        XmlEvents::with_reader(Reader::from_reader(source))
    }

    fn with_reader(mut reader: Reader<R>) -> Self {
        let config = reader.config_mut();
        config.expand_empty_elements = true;
        config.trim_text(false);
        XmlEvents {
            reader,
            buf: Vec::with_capacity(1024),
            done: false,
        }
    }

    fn read(&mut self) -> Result<Option<Event<'static>>> {
        loop {
            self.buf.clear();
            let event = self.reader.read_event_into(&mut self.buf)?;
            // Fetched after the read: a byte order mark or declaration
            // switches the encoding.
            let decoder = self.reader.decoder();
            match event {
                XmlEvent::Start(start) => {
                    let name = decoder.decode(start.name().as_ref())?.into_owned();
                    let mut attrs = Vec::new();
                    for attr in start.attributes() {
                        let attr = attr?;
                        let key = decoder.decode(attr.key.as_ref())?.into_owned();
                        let value = attr.decode_and_unescape_value(decoder)?.into_owned();
                        attrs.push((Cow::Owned(key), Cow::Owned(value)));
                    }
                    return Ok(Some(Event::Start {
                        name: Cow::Owned(name),
                        attrs,
                    }));
                }
                XmlEvent::End(end) => {
                    let name = decoder.decode(end.name().as_ref())?.into_owned();
                    return Ok(Some(Event::end(name)));
                }
                XmlEvent::Text(text) => {
                    let text = text.unescape()?;
                    if !text.is_empty() {
                        return Ok(Some(Event::characters(text.into_owned())));
                    }
                }
                XmlEvent::CData(data) => {
                    let text = data.decode()?.into_owned();
                    return Ok(Some(Event::characters(text)));
                }
                XmlEvent::Eof => return Ok(None),
                // Declarations, comments, processing instructions, doctype.
                _ => {}
            }
        }
    }
}

impl<R: BufRead> Iterator for XmlEvents<R> {
    type Item = Result<Event<'static>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl<R> std::fmt::Debug for XmlEvents<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlEvents").field("done", &self.done).finish()
    }
}
