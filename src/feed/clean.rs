//! Content normalizer for titles and descriptions lifted out of feed XML.
//!
//! Feeds frequently double-wrap their HTML: a `<description>` that already
//! went through a CDATA section upstream still carries literal
//! `<![CDATA[ ... ]]>` markers or HTML comments once unescaped. [`clean`]
//! removes those wrappers and surrounding whitespace.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

/// Complete `<![CDATA[ ... ]]>` wrapper; the inner text is kept.
static CDATA_WRAPPER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("bad CDATA wrapper regex"));

/// Unmatched CDATA start or end marker.
static CDATA_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!\[CDATA\[|\]\]>").expect("bad CDATA marker regex"));

/// XML comment, matched non-greedily so adjacent comments are removed separately.
static XML_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("bad comment regex"));

/// Strips CDATA wrappers, stray CDATA markers and XML comments, then trims.
///
/// Removing one construct can splice together the pieces of another
/// (`<!-<!---->-x-->`), so passes repeat until the text stops changing. Every
/// pass that changes the text makes it shorter, which bounds the loop and
/// makes the function idempotent: `clean(&clean(s)) == clean(s)`.
///
/// # Examples
///
/// ```
/// use feedmill::feed::clean;
///
/// assert_eq!(clean("<![CDATA[<p>Hello</p>]]>"), "<p>Hello</p>");
/// assert_eq!(clean("<!-- generated -->text"), "text");
/// ```
pub fn clean(raw: &str) -> String {
    let mut current = raw.trim().to_string();
    loop {
        let next = clean_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn clean_pass(text: &str) -> String {
    let unwrapped = CDATA_WRAPPER.replace_all(text, "$1");
    let unmarked = strip(&CDATA_MARKER, unwrapped);
    let uncommented = strip(&XML_COMMENT, unmarked);
    uncommented.trim().to_string()
}

fn strip<'a>(re: &Regex, text: Cow<'a, str>) -> Cow<'a, str> {
    match text {
        Cow::Borrowed(s) => re.replace_all(s, ""),
        Cow::Owned(s) => Cow::Owned(re.replace_all(&s, "").into_owned()),
    }
}
