use std::time::Instant;
use drill_core::{iterparse, parse_bytes, Query};

fn main() {
    // Generate a decent-sized catalog
    let mut input = String::from("<catalog>\n");
    for i in 0..20000 {
        input.push_str(&format!("  <book id=\"b{}\" shelf=\"{}\">\n", i, i % 7));
        input.push_str(&format!("    <title>Book number {}</title>\n", i));
        input.push_str(&format!("    <isbn>{:010}</isbn>\n", i));
        input.push_str("  </book>\n");
    }
    input.push_str("</catalog>\n");
    let bytes = input.as_bytes();
    println!("Input size: {} bytes ({:.1} KB)", bytes.len(), bytes.len() as f64 / 1024.0);

    // Full tree, then query
    let start = Instant::now();
    let doc = parse_bytes(bytes).unwrap();
    let parse_time = start.elapsed();
    let shelf = Query::compile("book[@shelf=3]/isbn").unwrap();
    let start = Instant::now();
    let hits = shelf.select(doc.root().unwrap()).count();
    let query_time = start.elapsed();
    println!(
        "tree:   {} elements in {:?}, {} matches in {:?}",
        doc.element_count(),
        parse_time,
        hits,
        query_time
    );

    // Streaming, clearing every book once handled
    let isbn = Query::compile("isbn").unwrap();
    let start = Instant::now();
    let mut stream = iterparse(bytes);
    let mut peak = 0;
    let mut matched = 0;
    while let Some(id) = stream.next() {
        let id = id.unwrap();
        let element = stream.element(id).unwrap();
        if element.tagname() == "book" {
            if element.get_attr("shelf") == Some("3") && isbn.first(element).is_some() {
                matched += 1;
            }
            peak = peak.max(stream.document().element_count());
            stream.clear(id).unwrap();
        }
    }
    println!(
        "stream: {} matches in {:?}, peak {} live elements, {} slots",
        matched,
        start.elapsed(),
        peak,
        stream.document().capacity()
    );
}
