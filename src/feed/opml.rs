use anyhow::Result;
use chrono::{DateTime, Utc};
use quick_xml::events::BytesStart;
use serde::Serialize;

use super::timestamp::parse_timestamp;
use super::xml::{self, ParseError, XmlReader};

/// SEC-003: Maximum allowed nesting depth for OPML outline elements.
/// Prevents stack overflow attacks from maliciously crafted deeply nested OPMLs.
const MAX_OPML_DEPTH: usize = 50;

/// A subscription list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OpmlDocument {
    /// `<head><title>`.
    pub title: String,
    /// `<head><dateCreated>`, if present and parseable.
    pub created_at: Option<DateTime<Utc>>,
    /// Feed outlines in document order, flattened out of any folders.
    pub outlines: Vec<Outline>,
}

/// A feed subscription extracted from an OPML file.
///
/// Represents a single `<outline>` element with an `xmlUrl` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outline {
    /// The `type` attribute, usually `rss`. Empty when absent.
    pub kind: String,
    /// Display title. Sourced from `title` attribute, falling back to `text`
    /// attribute, then to the XML URL itself.
    pub title: String,
    /// URL of the RSS/Atom feed XML.
    pub xml_url: String,
    /// URL of the feed's website, if provided via `htmlUrl` attribute.
    pub html_url: Option<String>,
}

/// Parses an OPML document and extracts its feed outlines.
///
/// Handles both nested and flat OPML structures, extracting feeds from any
/// `<outline>` element with an `xmlUrl` attribute regardless of nesting
/// depth. Category/folder outlines (those without `xmlUrl`) are traversed but
/// not returned in the result.
///
/// # Errors
///
/// Any XML error, a root other than `<opml>`, or nesting deeper than
/// `MAX_OPML_DEPTH` outlines. Unlike feeds, OPML is never accepted partially.
///
/// # Security
///
/// XXE (XML External Entity) attacks are mitigated because `quick-xml` (0.37)
/// does not parse `<!ENTITY>` declarations; an undeclared reference such as
/// `&xxe;` is kept as literal text.
pub fn parse_opml(bytes: &[u8]) -> Result<OpmlDocument, ParseError> {
    let text = xml::decode(bytes);
    let mut reader = xml::reader(&text);

    let (root, empty) = xml::root(&mut reader)?;
    let name = xml::local_name(&root);
    if name != "opml" {
        return Err(ParseError::UnexpectedRoot {
            expected: "opml",
            found: name,
        });
    }

    let mut doc = OpmlDocument::default();
    if empty {
        return Ok(doc);
    }

    while let Some(child) = xml::next_child(&mut reader, "opml")? {
        match child.name.as_str() {
            "head" => read_head(&mut reader, &mut doc, child.empty)?,
            "body" if !child.empty => read_outlines(&mut reader, "body", 0, &mut doc.outlines)?,
            _ => xml::skip(&mut reader, &child.start, child.empty)?,
        }
    }
    Ok(doc)
}

fn read_head(
    reader: &mut XmlReader<'_>,
    doc: &mut OpmlDocument,
    empty: bool,
) -> Result<(), ParseError> {
    if empty {
        return Ok(());
    }
    while let Some(child) = xml::next_child(reader, "head")? {
        match child.name.as_str() {
            "title" => doc.title = xml::read_chardata(reader, &child.start, child.empty)?,
            "dateCreated" => {
                let raw = xml::read_chardata(reader, &child.start, child.empty)?;
                doc.created_at = match parse_timestamp(&raw) {
                    Ok(ts) => Some(ts),
                    Err(e) => {
                        tracing::debug!(error = %e, "Ignoring OPML dateCreated");
                        None
                    }
                };
            }
            _ => xml::skip(reader, &child.start, child.empty)?,
        }
    }
    Ok(())
}

/// Collects feed outlines below `parent`, which sits at nesting `depth`.
fn read_outlines(
    reader: &mut XmlReader<'_>,
    parent: &str,
    depth: usize,
    out: &mut Vec<Outline>,
) -> Result<(), ParseError> {
    while let Some(child) = xml::next_child(reader, parent)? {
        if child.name != "outline" {
            xml::skip(reader, &child.start, child.empty)?;
            continue;
        }

        if let Some(outline) = parse_outline_attributes(reader, &child.start) {
            out.push(outline);
        }

        if !child.empty {
            // SEC-003: Reject excessively nested OPMLs
            if depth + 1 > MAX_OPML_DEPTH {
                return Err(ParseError::MaxDepthExceeded(MAX_OPML_DEPTH));
            }
            read_outlines(reader, "outline", depth + 1, out)?;
        }
    }
    Ok(())
}

/// Extracts feed attributes from an outline element.
///
/// Returns `None` for category/folder outlines without feed URLs.
fn parse_outline_attributes(reader: &XmlReader<'_>, e: &BytesStart<'_>) -> Option<Outline> {
    let non_empty = |key: &str| {
        xml::attr(reader, e, key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let xml_url = non_empty("xmlUrl")?;
    let title = non_empty("title")
        .or_else(|| non_empty("text"))
        .unwrap_or_else(|| xml_url.clone());

    Some(Outline {
        kind: non_empty("type").unwrap_or_default(),
        title,
        xml_url,
        html_url: non_empty("htmlUrl"),
    })
}

/// Serializes outlines as an OPML 2.0 document.
///
/// Each outline is written with `type` (defaulting to `rss`), `text`,
/// `title`, `xmlUrl` and, when known, `htmlUrl`.
pub fn serialize_opml(
    title: &str,
    created_at: DateTime<Utc>,
    outlines: &[Outline],
) -> Result<Vec<u8>> {
    let mut writer = xml::writer()?;

    // <opml version="2.0">
    let mut opml = BytesStart::new("opml");
    opml.push_attribute(("version", "2.0"));
    xml::open(&mut writer, opml)?;

    xml::open(&mut writer, BytesStart::new("head"))?;
    xml::text_element(&mut writer, "title", title)?;
    xml::text_element(&mut writer, "dateCreated", &created_at.to_rfc2822())?;
    xml::close(&mut writer, "head")?;

    xml::open(&mut writer, BytesStart::new("body"))?;
    for outline in outlines {
        let kind = if outline.kind.is_empty() {
            "rss"
        } else {
            outline.kind.as_str()
        };
        let mut element = BytesStart::new("outline");
        element.push_attribute(("type", kind));
        element.push_attribute(("text", outline.title.as_str()));
        element.push_attribute(("title", outline.title.as_str()));
        element.push_attribute(("xmlUrl", outline.xml_url.as_str()));
        if let Some(html_url) = outline.html_url.as_deref().filter(|u| !u.is_empty()) {
            element.push_attribute(("htmlUrl", html_url));
        }
        xml::empty(&mut writer, element)?;
    }
    xml::close(&mut writer, "body")?;

    xml::close(&mut writer, "opml")?;
    Ok(xml::finish(writer))
}
