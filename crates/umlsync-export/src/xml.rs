//! Minimal XML reader for exchange documents.
//!
//! Produces an element tree with attributes. Declarations, comments,
//! processing instructions, doctype, CDATA and character data are consumed
//! and dropped: the exchange format carries everything in attributes.

use std::borrow::Cow;

use thiserror::Error;
use winnow::{
    Parser as _,
    ascii::{multispace0, multispace1},
    combinator::{alt, cut_err, delimited, opt, preceded, repeat},
    error::{ContextError, ErrMode, ModalResult, StrContext},
    stream::{LocatingSlice, Location},
    token::{literal, take_till, take_until, take_while},
};

type Input<'a> = LocatingSlice<&'a str>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed XML at byte {offset}: {message}")]
pub struct XmlError {
    pub offset: usize,
    pub message: String,
}

/// An element with its attributes (in document order) and child elements
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute value, treating empty strings as absent
    pub fn attr_nonempty(&self, key: &str) -> Option<&str> {
        self.attr(key).map(str::trim).filter(|v| !v.is_empty())
    }

    /// Name without its namespace prefix
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    pub fn children_named<'s>(&'s self, name: &'s str) -> impl Iterator<Item = &'s Element> + 's {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Depth-first walk of every element below this one
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: self.children.iter().rev().collect() }
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        self.stack.extend(next.children.iter().rev());
        Some(next)
    }
}

/// Replace the predefined entities and numeric character references.
/// Unknown references are kept verbatim.
pub fn unescape(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').and_then(|semi| {
            let entity = &tail[1..semi];
            let ch = match entity {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "amp" => Some('&'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .or_else(|| entity.strip_prefix('#').map(|dec| dec.parse::<u32>()))
                    .and_then(Result::ok)
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, semi + 1))
        });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Escape text for use inside a double-quoted attribute value
pub fn escape(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn name<'a>(input: &mut Input<'a>) -> ModalResult<&'a str> {
    take_while(1.., |c: char| c.is_alphanumeric() || matches!(c, ':' | '_' | '-' | '.'))
        .parse_next(input)
}

fn comment(input: &mut Input<'_>) -> ModalResult<()> {
    ("<!--", cut_err(take_until(0.., "-->")), "-->")
        .void()
        .context(StrContext::Label("comment"))
        .parse_next(input)
}

fn processing_instruction(input: &mut Input<'_>) -> ModalResult<()> {
    ("<?", cut_err((take_until(0.., "?>"), "?>")))
        .void()
        .context(StrContext::Label("processing instruction"))
        .parse_next(input)
}

fn doctype(input: &mut Input<'_>) -> ModalResult<()> {
    ("<!DOCTYPE", cut_err((take_till(0.., '>'), '>')))
        .void()
        .parse_next(input)
}

fn cdata(input: &mut Input<'_>) -> ModalResult<()> {
    ("<![CDATA[", cut_err((take_until(0.., "]]>"), "]]>")))
        .void()
        .parse_next(input)
}

fn text(input: &mut Input<'_>) -> ModalResult<()> {
    take_while(1.., |c: char| c != '<').void().parse_next(input)
}

fn quoted<'a>(input: &mut Input<'a>) -> ModalResult<&'a str> {
    alt((
        delimited('"', take_till(0.., '"'), '"'),
        delimited('\'', take_till(0.., '\''), '\''),
    ))
    .parse_next(input)
}

fn attribute(input: &mut Input<'_>) -> ModalResult<(String, String)> {
    let key = preceded(multispace1, name).parse_next(input)?;
    let value = cut_err(preceded((multispace0, '=', multispace0), quoted))
        .context(StrContext::Label("attribute value"))
        .parse_next(input)?;
    Ok((key.to_string(), unescape(value).into_owned()))
}

/// Child content: `Some` for elements, `None` for everything that is skipped
fn node(input: &mut Input<'_>) -> ModalResult<Option<Element>> {
    alt((
        comment.map(|()| None),
        cdata.map(|()| None),
        processing_instruction.map(|()| None),
        element.map(Some),
        text.map(|()| None),
    ))
    .parse_next(input)
}

fn element(input: &mut Input<'_>) -> ModalResult<Element> {
    let tag = preceded('<', name).parse_next(input)?;
    let attributes: Vec<(String, String)> = repeat(0.., attribute).parse_next(input)?;
    multispace0.parse_next(input)?;

    let mut element = Element { name: tag.to_string(), attributes, children: Vec::new() };
    if opt("/>").parse_next(input)?.is_some() {
        return Ok(element);
    }
    cut_err('>').context(StrContext::Label("start tag")).parse_next(input)?;

    let children: Vec<Option<Element>> = repeat(0.., node).parse_next(input)?;
    element.children = children.into_iter().flatten().collect();

    cut_err(("</", literal(tag), multispace0, '>'))
        .context(StrContext::Label("closing tag"))
        .parse_next(input)?;
    Ok(element)
}

fn misc(input: &mut Input<'_>) -> ModalResult<()> {
    alt((multispace1.void(), comment, processing_instruction, doctype)).parse_next(input)
}

fn document(input: &mut Input<'_>) -> ModalResult<Element> {
    let _: () = repeat(0.., misc).parse_next(input)?;
    let root = cut_err(element).context(StrContext::Label("root element")).parse_next(input)?;
    let _: () = repeat(0.., misc).parse_next(input)?;
    Ok(root)
}

fn describe(err: ErrMode<ContextError>) -> String {
    let ctx = match err {
        ErrMode::Backtrack(ctx) | ErrMode::Cut(ctx) => ctx,
        ErrMode::Incomplete(_) => return "unexpected end of input".to_string(),
    };
    match ctx.context().next() {
        Some(StrContext::Label(label)) => format!("invalid {label}"),
        Some(other) => other.to_string(),
        None => "unexpected input".to_string(),
    }
}

/// Parse a document into its root element
pub fn parse(text: &str) -> Result<Element, XmlError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut input = LocatingSlice::new(text);

    match document(&mut input) {
        Ok(root) if input.is_empty() => Ok(root),
        Ok(_) => Err(XmlError {
            offset: input.current_token_start(),
            message: "content after root element".to_string(),
        }),
        Err(err) => Err(XmlError {
            offset: input.current_token_start(),
            message: describe(err),
        }),
    }
}
