//! Pull-parser helpers shared by the Atom, RSS and OPML document models.
//!
//! All three models walk a `quick-xml` event stream over a borrowed `&str`
//! rather than deserializing through serde: feeds in the wild mix raw markup,
//! CDATA and escaped HTML inside the same elements, and Atom text constructs
//! need both their character data and their raw inner markup.
//!
//! SEC-002: `quick-xml` (0.37) never parses `<!ENTITY>` declarations, so DTD
//! entities in untrusted feeds are never expanded.

use std::borrow::Cow;
use std::io::Cursor;

use anyhow::{Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

/// Reader over an in-memory document.
pub(crate) type XmlReader<'a> = Reader<&'a [u8]>;

/// Structural failure while decoding an XML document.
///
/// The format detector treats any of these as "not this format" rather than
/// as a fatal error.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The underlying XML is malformed.
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    /// The document contains no root element at all.
    #[error("document has no root element")]
    NoRoot,

    /// The root element is not the one the format requires.
    #[error("unexpected root element <{found}>, expected <{expected}>")]
    UnexpectedRoot {
        expected: &'static str,
        found: String,
    },

    /// The document ended while an element was still open.
    #[error("unexpected end of document inside <{0}>")]
    UnexpectedEof(String),

    /// A required child element is missing.
    #[error("missing required element <{0}>")]
    MissingElement(&'static str),

    /// SEC-003: nesting depth exceeds the safety limit.
    #[error("nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),
}

/// Creates a reader with the settings every document model uses.
pub(crate) fn reader(input: &str) -> XmlReader<'_> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(true);
    reader
}

/// Decodes raw document bytes into text for the pull parser.
///
/// Strips a leading UTF-8 byte-order mark; invalid UTF-8 sequences are
/// replaced rather than rejected.
pub(crate) fn decode(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    String::from_utf8_lossy(bytes)
}

/// Advances to the root element.
///
/// Returns the root start tag and whether it was self-closing.
pub(crate) fn root<'a>(reader: &mut XmlReader<'a>) -> Result<(BytesStart<'a>, bool), ParseError> {
    loop {
        match reader.read_event()? {
            Event::Start(e) => return Ok((e, false)),
            Event::Empty(e) => return Ok((e, true)),
            Event::Eof => return Err(ParseError::NoRoot),
            _ => {}
        }
    }
}

/// Local (namespace-stripped) name of an element.
pub(crate) fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Qualified name of an element, including any namespace prefix.
pub(crate) fn qualified_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

/// Looks up an attribute by local name, unescaping its value.
///
/// Malformed attributes are skipped; a value with an unresolvable entity
/// reference is returned raw.
pub(crate) fn attr(reader: &XmlReader<'_>, e: &BytesStart<'_>, key: &str) -> Option<String> {
    e.attributes()
        .filter_map(Result::ok)
        .find(|a| a.key.local_name().as_ref() == key.as_bytes())
        .map(|a| match a.decode_and_unescape_value(reader.decoder()) {
            Ok(value) => value.into_owned(),
            Err(_) => String::from_utf8_lossy(&a.value).into_owned(),
        })
}

/// Unescapes a text node, keeping the raw text if an entity cannot be resolved.
pub(crate) fn unescape_text(t: &BytesText<'_>) -> String {
    match t.unescape() {
        Ok(text) => text.into_owned(),
        Err(e) => {
            tracing::debug!(error = %e, "Keeping text with unresolved entity reference verbatim");
            String::from_utf8_lossy(t).into_owned()
        }
    }
}

/// Reads the character data directly inside `start`, consuming through its end tag.
///
/// Text and CDATA of the element itself are concatenated; nested elements are
/// skipped along with their content.
pub(crate) fn read_chardata(
    reader: &mut XmlReader<'_>,
    start: &BytesStart<'_>,
    empty: bool,
) -> Result<String, ParseError> {
    if empty {
        return Ok(String::new());
    }

    let mut out = String::new();
    let mut depth: usize = 0;
    loop {
        match reader.read_event()? {
            Event::Text(t) if depth == 0 => out.push_str(&unescape_text(&t)),
            Event::CData(c) if depth == 0 => out.push_str(&String::from_utf8_lossy(&c)),
            Event::Start(_) => depth += 1,
            Event::End(_) if depth == 0 => return Ok(out),
            Event::End(_) => depth -= 1,
            Event::Eof => return Err(ParseError::UnexpectedEof(local_name(start))),
            _ => {}
        }
    }
}

/// Reads the raw markup between `start` and its end tag, without unescaping.
pub(crate) fn read_inner_xml(
    reader: &mut XmlReader<'_>,
    start: &BytesStart<'_>,
    empty: bool,
) -> Result<String, ParseError> {
    if empty {
        return Ok(String::new());
    }
    Ok(reader.read_text(start.name())?.into_owned())
}

/// Character data at the top level of an already-delimited markup fragment.
///
/// A fragment that stops being well-formed yields whatever was collected
/// before the error.
pub(crate) fn fragment_chardata(fragment: &str) -> String {
    let mut reader = Reader::from_str(fragment);
    let mut out = String::new();
    let mut depth: usize = 0;
    loop {
        match reader.read_event() {
            Ok(Event::Text(t)) if depth == 0 => out.push_str(&unescape_text(&t)),
            Ok(Event::CData(c)) if depth == 0 => out.push_str(&String::from_utf8_lossy(&c)),
            Ok(Event::Start(_)) => depth += 1,
            Ok(Event::End(_)) => depth = depth.saturating_sub(1),
            Ok(Event::Eof) | Err(_) => return out,
            _ => {}
        }
    }
}

/// Skips an element and everything inside it.
pub(crate) fn skip(
    reader: &mut XmlReader<'_>,
    start: &BytesStart<'_>,
    empty: bool,
) -> Result<(), ParseError> {
    if !empty {
        reader.read_to_end(start.name())?;
    }
    Ok(())
}

/// Child element of a container, as yielded by [`next_child`].
pub(crate) struct Child<'a> {
    pub start: BytesStart<'a>,
    pub empty: bool,
    pub name: String,
}

/// Reads events until the next child element of `parent` or the parent's end tag.
///
/// Returns `Ok(None)` once the end tag of the parent has been consumed. Loose
/// text between children is ignored.
pub(crate) fn next_child<'a>(
    reader: &mut XmlReader<'a>,
    parent: &str,
) -> Result<Option<Child<'a>>, ParseError> {
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = local_name(&e);
                return Ok(Some(Child {
                    start: e,
                    empty: false,
                    name,
                }));
            }
            Event::Empty(e) => {
                let name = local_name(&e);
                return Ok(Some(Child {
                    start: e,
                    empty: true,
                    name,
                }));
            }
            Event::End(_) => return Ok(None),
            Event::Eof => return Err(ParseError::UnexpectedEof(parent.to_string())),
            _ => {}
        }
    }
}

/// Writer over an in-memory buffer, as used by every encoder.
pub(crate) type XmlWriter = Writer<Cursor<Vec<u8>>>;

/// Creates an indenting writer and emits the XML declaration.
pub(crate) fn writer() -> Result<XmlWriter> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .context("Failed to write XML declaration")?;
    Ok(writer)
}

/// Writes a start tag.
pub(crate) fn open(writer: &mut XmlWriter, start: BytesStart<'_>) -> Result<()> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    writer
        .write_event(Event::Start(start))
        .with_context(|| format!("Failed to write <{name}>"))
}

/// Writes an end tag.
pub(crate) fn close(writer: &mut XmlWriter, name: &str) -> Result<()> {
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .with_context(|| format!("Failed to write </{name}>"))
}

/// Writes a self-closing element.
pub(crate) fn empty(writer: &mut XmlWriter, start: BytesStart<'_>) -> Result<()> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    writer
        .write_event(Event::Empty(start))
        .with_context(|| format!("Failed to write <{name}/>"))
}

/// Writes escaped character data.
pub(crate) fn text(writer: &mut XmlWriter, text: &str) -> Result<()> {
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .context("Failed to write text")
}

/// Writes `<name>text</name>`, escaping `text`.
pub(crate) fn text_element(writer: &mut XmlWriter, name: &str, body: &str) -> Result<()> {
    open(writer, BytesStart::new(name))?;
    text(writer, body)?;
    close(writer, name)
}

/// Writes `<name>text</name>` only when `text` is non-empty.
pub(crate) fn optional_text_element(writer: &mut XmlWriter, name: &str, text: &str) -> Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    text_element(writer, name, text)
}

/// Writes already-escaped markup verbatim.
pub(crate) fn raw(writer: &mut XmlWriter, markup: &str) -> Result<()> {
    writer
        .write_event(Event::Text(BytesText::from_escaped(markup)))
        .context("Failed to write raw markup")
}

/// Consumes the writer and returns the encoded document.
pub(crate) fn finish(writer: XmlWriter) -> Vec<u8> {
    writer.into_inner().into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_element<'a>(reader: &mut XmlReader<'a>) -> (BytesStart<'a>, bool) {
        root(reader).unwrap()
    }

    #[test]
    fn test_decode_strips_bom() {
        let bytes = b"\xEF\xBB\xBF<rss/>";
        assert_eq!(decode(bytes), "<rss/>");
    }

    #[test]
    fn test_root_skips_declaration_and_comments() {
        let doc = r#"<?xml version="1.0"?><!-- hi --><feed xmlns="http://www.w3.org/2005/Atom"></feed>"#;
        let mut r = reader(doc);
        let (start, empty) = first_element(&mut r);
        assert_eq!(local_name(&start), "feed");
        assert!(!empty);
    }

    #[test]
    fn test_root_of_text_only_input() {
        let mut r = reader("just some words");
        assert!(matches!(root(&mut r), Err(ParseError::NoRoot)));
    }

    #[test]
    fn test_read_chardata_joins_text_and_cdata() {
        let doc = "<d>a &amp; b <![CDATA[<p>c</p>]]><i>skipped</i></d>";
        let mut r = reader(doc);
        let (start, empty) = first_element(&mut r);
        let text = read_chardata(&mut r, &start, empty).unwrap();
        assert_eq!(text, "a & b<p>c</p>");
    }

    #[test]
    fn test_read_chardata_keeps_unknown_entity_raw() {
        let doc = "<t>a&nbsp;b</t>";
        let mut r = reader(doc);
        let (start, empty) = first_element(&mut r);
        let text = read_chardata(&mut r, &start, empty).unwrap();
        assert_eq!(text, "a&nbsp;b");
    }

    #[test]
    fn test_read_chardata_unclosed_element() {
        let doc = "<t>never closed";
        let mut r = reader(doc);
        let (start, empty) = first_element(&mut r);
        assert!(read_chardata(&mut r, &start, empty).is_err());
    }

    #[test]
    fn test_read_inner_xml_is_raw() {
        let doc = r#"<content type="xhtml"><div>Hi &amp; <b>bye</b></div></content>"#;
        let mut r = reader(doc);
        let (start, empty) = first_element(&mut r);
        let inner = read_inner_xml(&mut r, &start, empty).unwrap();
        assert_eq!(inner, "<div>Hi &amp; <b>bye</b></div>");
        assert_eq!(fragment_chardata(&inner), "");
    }

    #[test]
    fn test_attr_lookup_unescapes() {
        let doc = r#"<link href="https://x.test/?a=1&amp;b=2" rel="alternate"/>"#;
        let mut r = reader(doc);
        let (start, _) = first_element(&mut r);
        assert_eq!(
            attr(&r, &start, "href").as_deref(),
            Some("https://x.test/?a=1&b=2")
        );
        assert_eq!(attr(&r, &start, "rel").as_deref(), Some("alternate"));
        assert_eq!(attr(&r, &start, "type"), None);
    }

    #[test]
    fn test_next_child_walks_siblings() {
        let doc = "<root>text<a>1</a><b/><c><d/></c></root>";
        let mut r = reader(doc);
        let (_root, _) = first_element(&mut r);

        let mut names = Vec::new();
        while let Some(child) = next_child(&mut r, "root").unwrap() {
            names.push(child.name.clone());
            skip(&mut r, &child.start, child.empty).unwrap();
        }
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_writer_escapes_text() {
        let mut w = writer().unwrap();
        text_element(&mut w, "title", "Q&A <live>").unwrap();
        optional_text_element(&mut w, "skipped", "").unwrap();
        let out = String::from_utf8(finish(w)).unwrap();
        assert!(out.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(out.contains("<title>Q&amp;A &lt;live&gt;</title>"));
        assert!(!out.contains("skipped"));
    }
}
