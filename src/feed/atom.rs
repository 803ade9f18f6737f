//! Atom 1.0 document model.
//!
//! A structural mirror of the Atom syndication format (RFC 4287). Values are
//! kept as found in the document: timestamps stay raw strings and text
//! constructs keep both their character data and their raw markup. The
//! unified parser in `feed::parser` turns an [`AtomDocument`] into the
//! canonical `Feed`.

use anyhow::Result;
use quick_xml::events::BytesStart;
use serde::Serialize;

use super::xml::{self, ParseError, XmlReader, XmlWriter};

/// Atom namespace written on the `<feed>` root.
pub const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/Atom";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AtomDocument {
    pub id: String,
    pub title: AtomText,
    pub updated: String,
    pub entries: Vec<AtomEntry>,
    pub authors: Vec<AtomPerson>,
    pub links: Vec<AtomLink>,
    pub categories: Vec<AtomCategory>,
    pub contributors: Vec<AtomPerson>,
    pub generator: Option<AtomGenerator>,
    pub icon: String,
    pub logo: String,
    pub rights: Option<AtomText>,
    pub subtitle: Option<AtomText>,
    /// Set when an XML error cut the document short; `entries` holds every
    /// entry completed before the error.
    pub truncated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AtomEntry {
    pub id: String,
    pub title: AtomText,
    pub updated: String,
    pub authors: Vec<AtomPerson>,
    pub content: Option<AtomText>,
    pub links: Vec<AtomLink>,
    pub summary: Option<AtomText>,
    pub categories: Vec<AtomCategory>,
    pub contributors: Vec<AtomPerson>,
    pub published: String,
    pub rights: Option<AtomText>,
}

/// An Atom text construct (`title`, `summary`, `content`, `rights`, `subtitle`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AtomText {
    /// The `type` attribute: `text`, `html`, `xhtml` or a media type.
    pub kind: String,
    /// Character data directly inside the element, unescaped.
    pub body: String,
    /// Everything between the start and end tags, as written.
    pub inner_xml: String,
    /// The `src` attribute of out-of-line content.
    pub src: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AtomLink {
    pub href: String,
    pub rel: String,
    pub kind: String,
    pub hreflang: String,
    pub title: String,
    pub length: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AtomPerson {
    pub name: String,
    pub uri: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AtomCategory {
    pub term: String,
    pub scheme: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AtomGenerator {
    pub uri: String,
    pub version: String,
    pub name: String,
}

impl AtomText {
    /// Plain text construct, as produced when re-publishing.
    pub fn plain(body: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            body: body.into(),
            ..Self::default()
        }
    }

    /// HTML text construct, as produced when re-publishing.
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            kind: "html".to_string(),
            body: body.into(),
            ..Self::default()
        }
    }
}

impl AtomEntry {
    /// Returns the entry body: the first non-blank of content text, content
    /// markup, summary text and summary markup, trimmed.
    ///
    /// Returns an empty string when all four are blank.
    pub fn get_content(&self) -> &str {
        let content = self.content.as_ref();
        let summary = self.summary.as_ref();
        [
            content.map(|c| c.body.as_str()),
            content.map(|c| c.inner_xml.as_str()),
            summary.map(|s| s.body.as_str()),
            summary.map(|s| s.inner_xml.as_str()),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or("")
    }
}

/// Picks the `rel="alternate"` link, else the first link, else `""`.
pub fn best_link(links: &[AtomLink]) -> &str {
    links
        .iter()
        .find(|l| l.rel == "alternate")
        .or_else(|| links.first())
        .map(|l| l.href.as_str())
        .unwrap_or("")
}

/// Parses an Atom document.
///
/// # Errors
///
/// Fails when the input is not well-formed up to the `<feed>` root or the root
/// is something else. Errors after the root has been recognised truncate the
/// document instead (see [`AtomDocument::truncated`]).
pub fn parse(bytes: &[u8]) -> Result<AtomDocument, ParseError> {
    let text = xml::decode(bytes);
    let mut reader = xml::reader(&text);

    let (root, empty) = xml::root(&mut reader)?;
    let name = xml::local_name(&root);
    if name != "feed" {
        return Err(ParseError::UnexpectedRoot {
            expected: "feed",
            found: name,
        });
    }

    let mut doc = AtomDocument::default();
    if empty {
        return Ok(doc);
    }

    if let Err(e) = read_feed(&mut reader, &mut doc) {
        tracing::warn!(
            error = %e,
            entries = doc.entries.len(),
            "Atom document truncated at malformed XML"
        );
        doc.truncated = true;
    }
    Ok(doc)
}

fn read_feed(reader: &mut XmlReader<'_>, doc: &mut AtomDocument) -> Result<(), ParseError> {
    while let Some(child) = xml::next_child(reader, "feed")? {
        let (start, empty) = (&child.start, child.empty);
        match child.name.as_str() {
            "entry" => {
                let entry = read_entry(reader, empty)?;
                doc.entries.push(entry);
            }
            "id" => doc.id = xml::read_chardata(reader, start, empty)?,
            "title" => doc.title = read_text(reader, start, empty)?,
            "updated" => doc.updated = xml::read_chardata(reader, start, empty)?,
            "subtitle" => doc.subtitle = Some(read_text(reader, start, empty)?),
            "rights" => doc.rights = Some(read_text(reader, start, empty)?),
            "icon" => doc.icon = xml::read_chardata(reader, start, empty)?,
            "logo" => doc.logo = xml::read_chardata(reader, start, empty)?,
            "link" => {
                doc.links.push(read_link(reader, start));
                xml::skip(reader, start, empty)?;
            }
            "category" => {
                doc.categories.push(read_category(reader, start));
                xml::skip(reader, start, empty)?;
            }
            "author" => doc.authors.push(read_person(reader, "author", empty)?),
            "contributor" => doc.contributors.push(read_person(reader, "contributor", empty)?),
            "generator" => {
                let uri = xml::attr(reader, start, "uri").unwrap_or_default();
                let version = xml::attr(reader, start, "version").unwrap_or_default();
                let name = xml::read_chardata(reader, start, empty)?;
                doc.generator = Some(AtomGenerator { uri, version, name });
            }
            _ => xml::skip(reader, start, empty)?,
        }
    }
    Ok(())
}

fn read_entry(reader: &mut XmlReader<'_>, empty: bool) -> Result<AtomEntry, ParseError> {
    let mut entry = AtomEntry::default();
    if empty {
        return Ok(entry);
    }

    while let Some(child) = xml::next_child(reader, "entry")? {
        let (start, empty) = (&child.start, child.empty);
        match child.name.as_str() {
            "id" => entry.id = xml::read_chardata(reader, start, empty)?,
            "title" => entry.title = read_text(reader, start, empty)?,
            "updated" => entry.updated = xml::read_chardata(reader, start, empty)?,
            "published" => entry.published = xml::read_chardata(reader, start, empty)?,
            "content" => entry.content = Some(read_text(reader, start, empty)?),
            "summary" => entry.summary = Some(read_text(reader, start, empty)?),
            "rights" => entry.rights = Some(read_text(reader, start, empty)?),
            "link" => {
                entry.links.push(read_link(reader, start));
                xml::skip(reader, start, empty)?;
            }
            "category" => {
                entry.categories.push(read_category(reader, start));
                xml::skip(reader, start, empty)?;
            }
            "author" => entry.authors.push(read_person(reader, "author", empty)?),
            "contributor" => entry.contributors.push(read_person(reader, "contributor", empty)?),
            _ => xml::skip(reader, start, empty)?,
        }
    }
    Ok(entry)
}

fn read_text(
    reader: &mut XmlReader<'_>,
    start: &BytesStart<'_>,
    empty: bool,
) -> Result<AtomText, ParseError> {
    let kind = xml::attr(reader, start, "type").unwrap_or_default();
    let src = xml::attr(reader, start, "src").unwrap_or_default();
    let inner_xml = xml::read_inner_xml(reader, start, empty)?;
    let body = xml::fragment_chardata(&inner_xml);
    Ok(AtomText {
        kind,
        body,
        inner_xml,
        src,
    })
}

fn read_link(reader: &XmlReader<'_>, start: &BytesStart<'_>) -> AtomLink {
    let get = |key| xml::attr(reader, start, key).unwrap_or_default();
    AtomLink {
        href: get("href"),
        rel: get("rel"),
        kind: get("type"),
        hreflang: get("hreflang"),
        title: get("title"),
        length: get("length"),
    }
}

fn read_category(reader: &XmlReader<'_>, start: &BytesStart<'_>) -> AtomCategory {
    let get = |key| xml::attr(reader, start, key).unwrap_or_default();
    AtomCategory {
        term: get("term"),
        scheme: get("scheme"),
        label: get("label"),
    }
}

fn read_person(
    reader: &mut XmlReader<'_>,
    element: &str,
    empty: bool,
) -> Result<AtomPerson, ParseError> {
    let mut person = AtomPerson::default();
    if empty {
        return Ok(person);
    }
    while let Some(child) = xml::next_child(reader, element)? {
        let (start, empty) = (&child.start, child.empty);
        match child.name.as_str() {
            "name" => person.name = xml::read_chardata(reader, start, empty)?,
            "uri" => person.uri = xml::read_chardata(reader, start, empty)?,
            "email" => person.email = xml::read_chardata(reader, start, empty)?,
            _ => xml::skip(reader, start, empty)?,
        }
    }
    Ok(person)
}

impl AtomDocument {
    /// Encodes the document as Atom 1.0 XML.
    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut w = xml::writer()?;

        let mut root = BytesStart::new("feed");
        root.push_attribute(("xmlns", ATOM_NAMESPACE));
        xml::open(&mut w, root)?;

        xml::text_element(&mut w, "id", &self.id)?;
        write_text(&mut w, "title", &self.title)?;
        xml::text_element(&mut w, "updated", &self.updated)?;
        if let Some(subtitle) = &self.subtitle {
            write_text(&mut w, "subtitle", subtitle)?;
        }
        for link in &self.links {
            write_link(&mut w, link)?;
        }
        write_people(&mut w, "author", &self.authors)?;
        write_people(&mut w, "contributor", &self.contributors)?;
        for category in &self.categories {
            write_category(&mut w, category)?;
        }
        if let Some(generator) = &self.generator {
            let mut start = BytesStart::new("generator");
            if !generator.uri.is_empty() {
                start.push_attribute(("uri", generator.uri.as_str()));
            }
            if !generator.version.is_empty() {
                start.push_attribute(("version", generator.version.as_str()));
            }
            xml::open(&mut w, start)?;
            xml::text(&mut w, &generator.name)?;
            xml::close(&mut w, "generator")?;
        }
        xml::optional_text_element(&mut w, "icon", &self.icon)?;
        xml::optional_text_element(&mut w, "logo", &self.logo)?;
        if let Some(rights) = &self.rights {
            write_text(&mut w, "rights", rights)?;
        }

        for entry in &self.entries {
            write_entry(&mut w, entry)?;
        }

        xml::close(&mut w, "feed")?;
        Ok(xml::finish(w))
    }
}

fn write_entry(w: &mut XmlWriter, entry: &AtomEntry) -> Result<()> {
    xml::open(w, BytesStart::new("entry"))?;
    xml::text_element(w, "id", &entry.id)?;
    write_text(w, "title", &entry.title)?;
    xml::text_element(w, "updated", &entry.updated)?;
    xml::optional_text_element(w, "published", &entry.published)?;
    for link in &entry.links {
        write_link(w, link)?;
    }
    write_people(w, "author", &entry.authors)?;
    write_people(w, "contributor", &entry.contributors)?;
    for category in &entry.categories {
        write_category(w, category)?;
    }
    if let Some(summary) = &entry.summary {
        write_text(w, "summary", summary)?;
    }
    if let Some(content) = &entry.content {
        write_text(w, "content", content)?;
    }
    if let Some(rights) = &entry.rights {
        write_text(w, "rights", rights)?;
    }
    xml::close(w, "entry")
}

/// Writes a text construct. XHTML keeps its markup; everything else is
/// written as escaped character data.
fn write_text(w: &mut XmlWriter, name: &str, text: &AtomText) -> Result<()> {
    let mut start = BytesStart::new(name);
    if !text.kind.is_empty() {
        start.push_attribute(("type", text.kind.as_str()));
    }
    if !text.src.is_empty() {
        start.push_attribute(("src", text.src.as_str()));
        return xml::empty(w, start);
    }
    xml::open(w, start)?;
    if text.kind == "xhtml" && !text.inner_xml.is_empty() {
        xml::raw(w, &text.inner_xml)?;
    } else {
        xml::text(w, &text.body)?;
    }
    xml::close(w, name)
}

fn write_link(w: &mut XmlWriter, link: &AtomLink) -> Result<()> {
    let mut start = BytesStart::new("link");
    start.push_attribute(("href", link.href.as_str()));
    for (key, value) in [
        ("rel", &link.rel),
        ("type", &link.kind),
        ("hreflang", &link.hreflang),
        ("title", &link.title),
        ("length", &link.length),
    ] {
        if !value.is_empty() {
            start.push_attribute((key, value.as_str()));
        }
    }
    xml::empty(w, start)
}

fn write_category(w: &mut XmlWriter, category: &AtomCategory) -> Result<()> {
    let mut start = BytesStart::new("category");
    start.push_attribute(("term", category.term.as_str()));
    if !category.scheme.is_empty() {
        start.push_attribute(("scheme", category.scheme.as_str()));
    }
    if !category.label.is_empty() {
        start.push_attribute(("label", category.label.as_str()));
    }
    xml::empty(w, start)
}

fn write_people(w: &mut XmlWriter, name: &str, people: &[AtomPerson]) -> Result<()> {
    for person in people {
        xml::open(w, BytesStart::new(name))?;
        xml::text_element(w, "name", &person.name)?;
        xml::optional_text_element(w, "uri", &person.uri)?;
        xml::optional_text_element(w, "email", &person.email)?;
        xml::close(w, name)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="text">Example Feed</title>
  <subtitle>All about examples</subtitle>
  <link rel="self" href="https://example.org/feed.atom"/>
  <link rel="alternate" type="text/html" href="https://example.org/"/>
  <updated>2003-12-13T18:30:02Z</updated>
  <author><name>John Doe</name><email>john@example.org</email></author>
  <id>urn:uuid:60a76c80-d399-11d9-b93C-0003939e0af6</id>
  <generator uri="https://gen.example" version="1.0">ExampleGen</generator>
  <category term="tech" label="Technology"/>
  <entry>
    <title>Atom-Powered Robots Run Amok</title>
    <link href="https://example.org/2003/12/13/atom03"/>
    <link rel="alternate" href="https://example.org/2003/12/13/atom03.html"/>
    <id>urn:uuid:1225c695-cfb8-4ebb-aaaa-80da344efa6a</id>
    <updated>2003-12-13T18:30:02Z</updated>
    <published>2003-12-13T08:29:29-04:00</published>
    <summary>Some text.</summary>
  </entry>
  <entry>
    <title type="html">Second &amp;amp; last</title>
    <id>tag:example.org,2003:2</id>
    <updated>2003-12-14T10:00:00Z</updated>
    <content type="xhtml"><div xmlns="http://www.w3.org/1999/xhtml"><p>Hello <b>world</b></p></div></content>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed_level_fields() {
        let doc = parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(doc.title.body, "Example Feed");
        assert_eq!(doc.title.kind, "text");
        assert_eq!(doc.id, "urn:uuid:60a76c80-d399-11d9-b93C-0003939e0af6");
        assert_eq!(doc.updated, "2003-12-13T18:30:02Z");
        assert_eq!(doc.subtitle.as_ref().unwrap().body, "All about examples");
        assert_eq!(doc.links.len(), 2);
        assert_eq!(best_link(&doc.links), "https://example.org/");
        assert_eq!(doc.authors[0].name, "John Doe");
        assert_eq!(doc.authors[0].email, "john@example.org");
        assert_eq!(
            doc.generator,
            Some(AtomGenerator {
                uri: "https://gen.example".to_string(),
                version: "1.0".to_string(),
                name: "ExampleGen".to_string(),
            })
        );
        assert_eq!(doc.categories[0].term, "tech");
        assert_eq!(doc.categories[0].label, "Technology");
        assert!(!doc.truncated);
    }

    #[test]
    fn test_parse_entries() {
        let doc = parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(doc.entries.len(), 2);

        let first = &doc.entries[0];
        assert_eq!(first.title.body, "Atom-Powered Robots Run Amok");
        assert_eq!(first.published, "2003-12-13T08:29:29-04:00");
        assert_eq!(
            best_link(&first.links),
            "https://example.org/2003/12/13/atom03.html"
        );
        assert_eq!(first.get_content(), "Some text.");

        let second = &doc.entries[1];
        assert_eq!(second.title.kind, "html");
        assert_eq!(second.title.body, "Second &amp; last");
        let content = second.content.as_ref().unwrap();
        assert_eq!(content.body, "");
        assert!(content.inner_xml.starts_with("<div"));
        assert!(second.get_content().contains("<p>Hello <b>world</b></p>"));
    }

    #[test]
    fn test_best_link_falls_back_to_first() {
        let links = vec![
            AtomLink {
                href: "https://a.test/".to_string(),
                rel: "self".to_string(),
                ..AtomLink::default()
            },
            AtomLink {
                href: "https://b.test/".to_string(),
                rel: "related".to_string(),
                ..AtomLink::default()
            },
        ];
        assert_eq!(best_link(&links), "https://a.test/");
        assert_eq!(best_link(&[]), "");
    }

    #[test]
    fn test_get_content_precedence() {
        let text = |body: &str, inner: &str| AtomText {
            body: body.to_string(),
            inner_xml: inner.to_string(),
            ..AtomText::default()
        };

        let mut entry = AtomEntry {
            content: Some(text(" body ", "<i>markup</i>")),
            summary: Some(text("summary", "")),
            ..AtomEntry::default()
        };
        assert_eq!(entry.get_content(), "body");

        entry.content = Some(text("  ", " <i>markup</i> "));
        assert_eq!(entry.get_content(), "<i>markup</i>");

        entry.content = Some(text("", ""));
        assert_eq!(entry.get_content(), "summary");

        entry.summary = Some(text("", "<p>only markup</p>"));
        assert_eq!(entry.get_content(), "<p>only markup</p>");

        entry.summary = None;
        assert_eq!(entry.get_content(), "");
    }

    #[test]
    fn test_get_content_summary_when_content_empty() {
        let doc = parse(
            br#"<feed xmlns="http://www.w3.org/2005/Atom"><entry>
                <content></content><summary>From summary</summary>
            </entry></feed>"#,
        )
        .unwrap();
        assert_eq!(doc.entries[0].get_content(), "From summary");
    }

    #[test]
    fn test_cdata_content_body() {
        let doc = parse(
            br#"<feed xmlns="http://www.w3.org/2005/Atom"><entry>
                <content type="html"><![CDATA[<p>raw html</p>]]></content>
            </entry></feed>"#,
        )
        .unwrap();
        let content = doc.entries[0].content.as_ref().unwrap();
        assert_eq!(content.body, "<p>raw html</p>");
        assert_eq!(content.inner_xml, "<![CDATA[<p>raw html</p>]]>");
    }

    #[test]
    fn test_prefixed_atom_elements() {
        let doc = parse(
            br#"<a:feed xmlns:a="http://www.w3.org/2005/Atom">
                <a:title>Prefixed</a:title>
                <a:link href="https://p.test/"/>
            </a:feed>"#,
        )
        .unwrap();
        assert_eq!(doc.title.body, "Prefixed");
        assert_eq!(best_link(&doc.links), "https://p.test/");
    }

    #[test]
    fn test_wrong_root_rejected() {
        let err = parse(b"<rss version=\"2.0\"><channel/></rss>").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedRoot { expected: "feed", .. }));
    }

    #[test]
    fn test_malformed_before_root_rejected() {
        assert!(parse(b"").is_err());
        assert!(parse(b"\x00\x01garbage").is_err());
    }

    #[test]
    fn test_truncated_entry_keeps_earlier_entries() {
        let doc = parse(
            br#"<feed xmlns="http://www.w3.org/2005/Atom">
                <link href="https://t.test/"/>
                <entry><id>1</id><title>one</title></entry>
                <entry><id>2</id><title>two</wrong></entry>
            </feed>"#,
        )
        .unwrap();
        assert!(doc.truncated);
        assert_eq!(doc.entries.len(), 1);
        assert_eq!(doc.entries[0].id, "1");
    }

    #[test]
    fn test_to_xml_is_parseable() {
        let doc = parse(SAMPLE.as_bytes()).unwrap();
        let encoded = doc.to_xml().unwrap();
        let reparsed = parse(&encoded).unwrap();

        assert_eq!(reparsed.title.body, doc.title.body);
        assert_eq!(reparsed.links, doc.links);
        assert_eq!(reparsed.generator, doc.generator);
        assert_eq!(reparsed.entries.len(), 2);
        assert_eq!(reparsed.entries[0].get_content(), "Some text.");
        assert_eq!(reparsed.entries[1].title.body, "Second &amp; last");
        assert!(reparsed.entries[1]
            .get_content()
            .contains("<p>Hello <b>world</b></p>"));
    }
}
