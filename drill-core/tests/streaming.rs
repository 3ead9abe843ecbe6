//! Streaming construction over the catalog fixture.

mod common;

use drill_core::{iterparse, iterparse_file, iterparse_str, Error, Query};
use pretty_assertions::assert_eq;

#[test]
fn test_closing_order() {
    let mut stream = iterparse_file(common::catalog_path()).unwrap();
    let mut tags = Vec::new();
    while let Some(id) = stream.next() {
        let id = id.unwrap();
        tags.push(stream.element(id).unwrap().tagname().to_owned());
    }
    assert_eq!(
        tags,
        vec![
            "author", "title", "isbn", "book", "author", "isbn", "title", "book", "title", "price",
            "isbn", "book", "magazine", "catalog",
        ]
    );
}

#[test]
fn test_stream_and_clear() {
    let mut stream = iterparse_file(common::catalog_path()).unwrap();
    let isbn = Query::compile("isbn").unwrap();
    let mut books = Vec::new();
    while let Some(id) = stream.next() {
        let id = id.unwrap();
        let element = stream.element(id).unwrap();
        if element.tagname() == "book" {
            let number = isbn.first(element).unwrap().data().to_owned();
            books.push((element.attr("id").unwrap().to_owned(), number));
            stream.clear(id).unwrap();
        }
    }
    assert_eq!(
        books,
        vec![
            ("book1".to_owned(), "1234567890".to_owned()),
            ("book2".to_owned(), "0987654321".to_owned()),
            ("insert1".to_owned(), "5555555555".to_owned()),
        ]
    );

    let doc = stream.into_document();
    let catalog = doc.root().unwrap();
    assert_eq!(catalog.len(), 3);
    assert!(catalog.children(Some("book")).all(|b| b.is_empty() && b.data().is_empty()));
    assert_eq!(catalog.find(Some("isbn")).count(), 0);
    // The magazine was not cleared, only its nested book.
    assert_eq!(catalog.last(None).unwrap().len(), 3);
}

#[test]
fn test_clearing_everything_leaves_bare_root() {
    let text = common::catalog_text();
    let mut stream = iterparse_str(&text);
    let mut peak = 0;
    while let Some(id) = stream.next() {
        let id = id.unwrap();
        peak = peak.max(stream.document().element_count());
        stream.clear(id).unwrap();
    }
    assert!(stream.is_done());
    let root = stream.root().unwrap();
    assert_eq!(root.tagname(), "catalog");
    assert_eq!(root.len(), 0);
    assert_eq!(stream.document().element_count(), 1);
    // Open path plus cleared siblings, never the whole catalog.
    assert!(peak < common::catalog().element_count());
}

#[test]
fn test_stream_matches_full_parse() {
    let full = common::catalog();
    let text = common::catalog_text();
    let mut stream = iterparse(text.as_bytes());
    let count = stream.by_ref().map(|r| r.unwrap()).count();
    assert_eq!(count, full.element_count());

    let options = drill_core::WriteOptions::compact();
    let doc = stream.into_document();
    assert_eq!(doc.xml(&options).unwrap(), full.xml(&options).unwrap());
}

#[test]
fn test_malformed_input_keeps_yielded_elements() {
    let mut stream = iterparse_str("<r><a>1</a><b>2</c></r>");
    let a = stream.next().unwrap().unwrap();
    assert!(matches!(stream.next(), Some(Err(_))));
    assert!(stream.next().is_none());
    assert!(stream.is_done());
    assert_eq!(stream.element(a).unwrap().data(), "1");
}

#[test]
fn test_missing_file() {
    assert!(matches!(
        iterparse_file("no/such/catalog.xml"),
        Err(Error::Io(_))
    ));
}
