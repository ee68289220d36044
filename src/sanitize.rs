//! Admin-safe HTML filtering for stored placeholder values.
//!
//! Events are rendered later by reporting surfaces, so markup carried
//! by a placeholder is reduced to a tag allowlist before it is stored:
//! disallowed tags are dropped (their text content kept), event-handler
//! attributes are stripped, and script-ish URL schemes are removed from
//! the attributes that take URLs.

/// Tags an administrator-facing report is allowed to keep.
const ALLOWED_TAGS: &[&str] = &[
    "a", "abbr", "acronym", "address", "article", "aside", "b", "bdi", "bdo", "big",
    "blockquote", "br", "caption", "cite", "code", "col", "colgroup", "dd", "del", "details",
    "dfn", "div", "dl", "dt", "em", "figcaption", "figure", "footer", "h1", "h2", "h3", "h4",
    "h5", "h6", "header", "hgroup", "hr", "i", "img", "ins", "kbd", "li", "mark", "menu",
    "meter", "nav", "ol", "output", "p", "pre", "progress", "q", "rp", "rt", "ruby", "s",
    "samp", "section", "small", "span", "strong", "sub", "summary", "sup", "table", "tbody",
    "td", "tfoot", "th", "thead", "time", "tr", "tt", "u", "ul", "var", "wbr",
];

/// Attributes that take a URL and therefore need scheme checking.
const URL_ATTRIBUTES: &[&str] = &["href", "src", "cite", "poster"];

const FORBIDDEN_SCHEMES: &[&str] = &["javascript:", "vbscript:", "data:"];

/// Reduce markup to the administrator-safe tag allowlist.
///
/// Text content always survives; only tag markup is filtered. Stray
/// `<` characters that do not open a tag are escaped, and comments are
/// removed entirely.
pub fn filter_admin(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find('<') {
        output.push_str(&rest[..open]);
        rest = &rest[open..];

        if let Some(stripped) = rest.strip_prefix("<!--") {
            // Drop the comment; an unterminated one swallows the rest.
            rest = match stripped.find("-->") {
                Some(end) => &stripped[end + 3..],
                None => "",
            };
            continue;
        }

        match parse_tag(rest) {
            Some((tag, consumed)) => {
                output.push_str(&tag);
                rest = &rest[consumed..];
            }
            None => {
                output.push_str("&lt;");
                rest = &rest[1..];
            }
        }
    }

    output.push_str(rest);
    output
}

/// Parse one tag starting at `<`. Returns the filtered replacement
/// (empty for a disallowed tag) and the number of input bytes
/// consumed, or `None` when the input is not a tag at all.
fn parse_tag(input: &str) -> Option<(String, usize)> {
    let inner = &input[1..];
    let closing = inner.starts_with('/');
    let body = if closing { &inner[1..] } else { inner };

    let name_end = body
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(body.len());
    if name_end == 0 {
        return None;
    }
    let name = body[..name_end].to_ascii_lowercase();

    // Find the end of the tag, honoring quoted attribute values.
    let after_name = &body[name_end..];
    let mut end = None;
    let mut quote: Option<char> = None;
    for (i, c) in after_name.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '>' => {
                    end = Some(i);
                    break;
                }
                '<' => return None,
                _ => {}
            },
        }
    }
    let end = end?;
    let consumed = 1 + usize::from(closing) + name_end + end + 1;

    if !ALLOWED_TAGS.contains(&name.as_str()) {
        return Some((String::new(), consumed));
    }

    if closing {
        return Some((format!("</{}>", name), consumed));
    }

    let raw_attributes = after_name[..end].trim_end_matches('/');
    let attributes = filter_attributes(raw_attributes);
    let self_closing = after_name[..end].trim_end().ends_with('/');

    let mut tag = String::from("<");
    tag.push_str(&name);
    if !attributes.is_empty() {
        tag.push(' ');
        tag.push_str(&attributes);
    }
    if self_closing {
        tag.push_str(" /");
    }
    tag.push('>');
    Some((tag, consumed))
}

/// Keep safe attributes, dropping event handlers and forbidden URL
/// schemes.
fn filter_attributes(input: &str) -> String {
    let mut kept: Vec<String> = Vec::new();

    for attribute in split_attributes(input) {
        let (name, value) = match attribute.split_once('=') {
            Some((name, value)) => (name.trim(), Some(value.trim())),
            None => (attribute.trim(), None),
        };
        if name.is_empty() {
            continue;
        }
        let lower = name.to_ascii_lowercase();
        if lower.starts_with("on") || lower == "style" {
            continue;
        }
        if let Some(value) = value {
            let unquoted = value.trim_matches(|c| c == '"' || c == '\'');
            if URL_ATTRIBUTES.contains(&lower.as_str()) && has_forbidden_scheme(unquoted) {
                continue;
            }
            kept.push(format!("{}=\"{}\"", lower, unquoted));
        } else {
            kept.push(lower);
        }
    }

    kept.join(" ")
}

fn has_forbidden_scheme(value: &str) -> bool {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    FORBIDDEN_SCHEMES
        .iter()
        .any(|scheme| compact.starts_with(scheme))
}

/// Split an attribute string on whitespace, keeping quoted values
/// intact.
fn split_attributes(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = None;
    let mut quote: Option<char> = None;

    for (i, c) in input.char_indices() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => {
                if c == '"' || c == '\'' {
                    quote = Some(c);
                    if start.is_none() {
                        start = Some(i);
                    }
                } else if c.is_whitespace() {
                    if let Some(s) = start.take() {
                        parts.push(&input[s..i]);
                    }
                } else if start.is_none() {
                    start = Some(i);
                }
            }
        }
    }
    if let Some(s) = start {
        parts.push(&input[s..]);
    }
    parts
}
