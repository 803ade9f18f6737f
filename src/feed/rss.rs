//! RSS document model (RSS 2.0, plus the RSS 1.0 `rdf:RDF` layout).
//!
//! Inside `<channel>` and `<item>` only unprefixed elements are read as RSS
//! fields; namespaced extensions such as `<atom:link rel="self">` or
//! `<media:title>` are skipped. The exceptions are `content:encoded`,
//! `dc:date` and `dc:creator`, which fill in the item body, a missing
//! `pubDate` and a missing `author`.

use std::borrow::Cow;

use anyhow::Result;
use quick_xml::events::BytesStart;
use serde::Serialize;

use super::clean::clean;
use super::xml::{self, ParseError, XmlReader, XmlWriter};

/// Namespace for the `content:encoded` extension.
pub const CONTENT_NAMESPACE: &str = "http://purl.org/rss/1.0/modules/content/";

/// Control character some feeds embed raw, which XML 1.0 forbids.
const BACKSPACE: u8 = 0x08;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RssDocument {
    pub title: String,
    pub link: String,
    pub description: String,
    pub language: String,
    pub pub_date: String,
    pub last_build_date: String,
    pub generator: String,
    pub items: Vec<RssItem>,
    /// Set when an XML error cut the document short; `items` holds every
    /// item completed before the error.
    pub truncated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RssItem {
    pub title: String,
    pub link: String,
    pub description: String,
    /// `pubDate`, or `dc:date` when `pubDate` is absent.
    pub pub_date: String,
    pub guid: Option<RssGuid>,
    /// Full HTML body from `content:encoded`.
    pub encoded_content: Option<String>,
    pub author: String,
    pub categories: Vec<String>,
    pub comments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RssGuid {
    pub value: String,
    /// Defaults to `true` when the attribute is absent.
    pub is_perma_link: bool,
}

impl RssItem {
    /// Stable identifier: the GUID if it has a value, else the link.
    pub fn id(&self) -> &str {
        self.guid
            .as_ref()
            .map(|g| g.value.trim())
            .filter(|v| !v.is_empty())
            .unwrap_or(&self.link)
    }

    /// Item body: the cleaned `content:encoded` if it has any content, else
    /// the raw description.
    pub fn get_content(&self) -> Cow<'_, str> {
        if let Some(encoded) = &self.encoded_content {
            let cleaned = clean(encoded);
            if !cleaned.is_empty() {
                return Cow::Owned(cleaned);
            }
        }
        Cow::Borrowed(&self.description)
    }
}

/// Removes raw backspace bytes before the document reaches the XML reader.
fn scrub(bytes: &[u8]) -> Cow<'_, [u8]> {
    if bytes.contains(&BACKSPACE) {
        Cow::Owned(bytes.iter().copied().filter(|&b| b != BACKSPACE).collect())
    } else {
        Cow::Borrowed(bytes)
    }
}

/// Parses an RSS document.
///
/// Raw `0x08` bytes are stripped unconditionally first. The root must be
/// `<rss>` or `<rdf:RDF>`.
///
/// # Errors
///
/// Fails when the input is not well-formed up to the root element or the
/// root is something else. Errors inside the document truncate it instead
/// (see [`RssDocument::truncated`]).
pub fn parse(bytes: &[u8]) -> Result<RssDocument, ParseError> {
    let scrubbed = scrub(bytes);
    let text = xml::decode(&scrubbed);
    let mut reader = xml::reader(&text);

    let (root, empty) = xml::root(&mut reader)?;
    let name = xml::local_name(&root);
    if name != "rss" && name != "RDF" {
        return Err(ParseError::UnexpectedRoot {
            expected: "rss",
            found: name,
        });
    }

    let mut doc = RssDocument::default();
    if empty {
        return Ok(doc);
    }

    if let Err(e) = read_root(&mut reader, &name, &mut doc) {
        tracing::warn!(
            error = %e,
            items = doc.items.len(),
            "RSS document truncated at malformed XML"
        );
        doc.truncated = true;
    }
    Ok(doc)
}

fn read_root(reader: &mut XmlReader<'_>, root: &str, doc: &mut RssDocument) -> Result<(), ParseError> {
    while let Some(child) = xml::next_child(reader, root)? {
        match xml::qualified_name(&child.start).as_str() {
            "channel" => read_channel(reader, doc, child.empty)?,
            // RSS 1.0 places items next to the channel.
            "item" => {
                let item = read_item(reader, child.empty)?;
                doc.items.push(item);
            }
            _ => xml::skip(reader, &child.start, child.empty)?,
        }
    }
    Ok(())
}

fn read_channel(
    reader: &mut XmlReader<'_>,
    doc: &mut RssDocument,
    empty: bool,
) -> Result<(), ParseError> {
    if empty {
        return Ok(());
    }

    let mut dc_date = String::new();
    while let Some(child) = xml::next_child(reader, "channel")? {
        let (start, empty) = (&child.start, child.empty);
        match xml::qualified_name(start).as_str() {
            "item" => {
                let item = read_item(reader, empty)?;
                doc.items.push(item);
            }
            "title" => doc.title = xml::read_chardata(reader, start, empty)?,
            "link" => doc.link = xml::read_chardata(reader, start, empty)?,
            "description" => doc.description = xml::read_chardata(reader, start, empty)?,
            "language" => doc.language = xml::read_chardata(reader, start, empty)?,
            "pubDate" => doc.pub_date = xml::read_chardata(reader, start, empty)?,
            "lastBuildDate" => doc.last_build_date = xml::read_chardata(reader, start, empty)?,
            "generator" => doc.generator = xml::read_chardata(reader, start, empty)?,
            "dc:date" => dc_date = xml::read_chardata(reader, start, empty)?,
            _ => xml::skip(reader, start, empty)?,
        }
    }
    if doc.pub_date.is_empty() {
        doc.pub_date = dc_date;
    }
    Ok(())
}

fn read_item(reader: &mut XmlReader<'_>, empty: bool) -> Result<RssItem, ParseError> {
    let mut item = RssItem::default();
    if empty {
        return Ok(item);
    }

    let mut dc_date = String::new();
    let mut dc_creator = String::new();
    while let Some(child) = xml::next_child(reader, "item")? {
        let (start, empty) = (&child.start, child.empty);
        match xml::qualified_name(start).as_str() {
            "title" => item.title = xml::read_chardata(reader, start, empty)?,
            "link" => item.link = xml::read_chardata(reader, start, empty)?,
            "description" => item.description = xml::read_chardata(reader, start, empty)?,
            "pubDate" => item.pub_date = xml::read_chardata(reader, start, empty)?,
            "guid" => item.guid = Some(read_guid(reader, start, empty)?),
            "content:encoded" => {
                item.encoded_content = Some(xml::read_chardata(reader, start, empty)?)
            }
            "author" => item.author = xml::read_chardata(reader, start, empty)?,
            "category" => item.categories.push(xml::read_chardata(reader, start, empty)?),
            "comments" => item.comments = xml::read_chardata(reader, start, empty)?,
            "dc:date" => dc_date = xml::read_chardata(reader, start, empty)?,
            "dc:creator" => dc_creator = xml::read_chardata(reader, start, empty)?,
            _ => xml::skip(reader, start, empty)?,
        }
    }
    if item.pub_date.is_empty() {
        item.pub_date = dc_date;
    }
    if item.author.is_empty() {
        item.author = dc_creator;
    }
    Ok(item)
}

fn read_guid(
    reader: &mut XmlReader<'_>,
    start: &BytesStart<'_>,
    empty: bool,
) -> Result<RssGuid, ParseError> {
    let is_perma_link = xml::attr(reader, start, "isPermaLink")
        .map(|v| !v.trim().eq_ignore_ascii_case("false"))
        .unwrap_or(true);
    let value = xml::read_chardata(reader, start, empty)?;
    Ok(RssGuid {
        value,
        is_perma_link,
    })
}

impl RssDocument {
    /// Encodes the document as RSS 2.0 XML.
    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut w = xml::writer()?;

        let mut root = BytesStart::new("rss");
        root.push_attribute(("version", "2.0"));
        root.push_attribute(("xmlns:content", CONTENT_NAMESPACE));
        xml::open(&mut w, root)?;
        xml::open(&mut w, BytesStart::new("channel"))?;

        xml::text_element(&mut w, "title", &self.title)?;
        xml::text_element(&mut w, "link", &self.link)?;
        xml::text_element(&mut w, "description", &self.description)?;
        xml::optional_text_element(&mut w, "language", &self.language)?;
        xml::optional_text_element(&mut w, "pubDate", &self.pub_date)?;
        xml::optional_text_element(&mut w, "lastBuildDate", &self.last_build_date)?;
        xml::optional_text_element(&mut w, "generator", &self.generator)?;

        for item in &self.items {
            write_item(&mut w, item)?;
        }

        xml::close(&mut w, "channel")?;
        xml::close(&mut w, "rss")?;
        Ok(xml::finish(w))
    }
}

fn write_item(w: &mut XmlWriter, item: &RssItem) -> Result<()> {
    xml::open(w, BytesStart::new("item"))?;
    xml::text_element(w, "title", &item.title)?;
    xml::optional_text_element(w, "link", &item.link)?;
    xml::text_element(w, "description", &item.description)?;
    if let Some(encoded) = &item.encoded_content {
        xml::text_element(w, "content:encoded", encoded)?;
    }
    xml::optional_text_element(w, "author", &item.author)?;
    for category in &item.categories {
        xml::text_element(w, "category", category)?;
    }
    xml::optional_text_element(w, "comments", &item.comments)?;
    if let Some(guid) = &item.guid {
        let mut start = BytesStart::new("guid");
        if !guid.is_perma_link {
            start.push_attribute(("isPermaLink", "false"));
        }
        xml::open(w, start)?;
        xml::text(w, &guid.value)?;
        xml::close(w, "guid")?;
    }
    xml::optional_text_element(w, "pubDate", &item.pub_date)?;
    xml::close(w, "item")
}
