//! Streaming HTML rewriting.
//!
//! Tags are buffered from `<` to `>` because the attribute deciding whether a
//! reference gets rewritten (`rel`, `type`) may follow the reference itself.
//! Once a tag is complete it is replayed with the eligible attribute values
//! replaced. Text, comments, CDATA sections and declarations are forwarded as
//! they are scanned.

use std::{
    io::{self, Write},
    ops::Range,
};

use crate::{
    css::rewrite_css_text,
    processor::{decode_all, Output, Processor, Rewriter},
};

/// Tags longer than this are forwarded unchanged instead of being buffered.
const MAX_TAG_LENGTH: usize = 64 * 1024;

const COMMENT_OPEN: &str = "<!--";
const CDATA_OPEN: &str = "<![CDATA[";
const DATA_LAVENDER: &str = "data-lavender-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    Single,
    Double,
    Unquoted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagState {
    Name,
    BeforeAttrName,
    AttrName,
    AfterAttrName,
    BeforeAttrValue,
    Value(Quote),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    /// Seen `<`.
    TagOpen,
    /// Seen `<!`, not yet known whether comment, CDATA or declaration.
    MarkupDecl,
    Comment { dashes: u8 },
    Cdata { brackets: u8 },
    /// `<!DOCTYPE ...>`, `<?...>` and friends.
    Declaration,
    Tag(TagState),
    /// A tag that outgrew the buffer, forwarded until its end.
    Overflow(Option<char>),
}

#[derive(Debug, Clone)]
struct Attribute {
    name: Range<usize>,
    value: Option<Range<usize>>,
}

/// The tag currently being buffered.
#[derive(Debug, Default)]
struct Tag {
    raw: String,
    closing: bool,
    name: Range<usize>,
    attributes: Vec<Attribute>,
}

enum Action {
    Rewrite,
    Css,
}

impl Tag {
    fn reset(&mut self) {
        self.raw.clear();
        self.closing = false;
        self.name = 0..0;
        self.attributes.clear();
    }

    /// Byte offset of the character just pushed.
    fn last(&self, c: char) -> usize {
        self.raw.len() - c.len_utf8()
    }

    fn name(&self) -> &str {
        &self.raw[self.name.clone()]
    }

    fn start_attribute(&mut self, at: usize) {
        self.attributes.push(Attribute {
            name: at..at,
            value: None,
        });
    }

    fn end_attribute_name(&mut self, at: usize) {
        if let Some(attribute) = self.attributes.last_mut() {
            attribute.name.end = at;
        }
    }

    fn start_value(&mut self, at: usize) {
        if let Some(attribute) = self.attributes.last_mut() {
            attribute.value = Some(at..at);
        }
    }

    fn end_value(&mut self, at: usize) {
        if let Some(Attribute {
            value: Some(value), ..
        }) = self.attributes.last_mut()
        {
            value.end = at;
        }
    }

    fn attribute_value(&self, name: &str) -> Option<&str> {
        let raw = self.raw.as_str();
        self.attributes.iter().find_map(|attribute| {
            let value = attribute.value.clone()?;
            if raw[attribute.name.clone()].eq_ignore_ascii_case(name) {
                Some(&raw[value])
            } else {
                None
            }
        })
    }

    fn attribute_is(&self, name: &str, expected: &[&str]) -> bool {
        self.attribute_value(name).is_some_and(|value| {
            let value = value.trim();
            expected.iter().any(|e| value.eq_ignore_ascii_case(e))
        })
    }

    fn action(&self, attribute: &str) -> Option<Action> {
        let attribute = attribute.to_ascii_lowercase();
        if attribute == "style" {
            return Some(Action::Css);
        }
        if attribute.starts_with(DATA_LAVENDER) {
            return Some(Action::Rewrite);
        }
        let tag = self.name().to_ascii_lowercase();
        let eligible = match (tag.as_str(), attribute.as_str()) {
            ("img" | "source", "src") => true,
            ("a", "href") => true,
            ("link", "href") => self.attribute_is("rel", &["stylesheet", "icon", "shortcut icon"]),
            ("script", "src") => self.attribute_is("type", &["text/javascript"]),
            ("input", "src") => self.attribute_is("type", &["image"]),
            _ => false,
        };
        eligible.then_some(Action::Rewrite)
    }

    /// The tag with all eligible attribute values rewritten.
    fn render(&self, rewriter: &dyn Rewriter) -> String {
        if self.closing {
            return self.raw.clone();
        }
        let mut out = String::with_capacity(self.raw.len());
        let mut copied = 0;
        for attribute in &self.attributes {
            let Some(value) = attribute.value.clone() else {
                continue;
            };
            let replacement = match self.action(&self.raw[attribute.name.clone()]) {
                Some(Action::Rewrite) => rewriter.rewrite(&self.raw[value.clone()]),
                Some(Action::Css) => rewrite_css_text(rewriter, &self.raw[value.clone()]),
                None => continue,
            };
            out.push_str(&self.raw[copied..value.start]);
            out.push_str(&replacement);
            copied = value.end;
        }
        out.push_str(&self.raw[copied..]);
        out
    }
}

/// Rewrites references in an HTML stream.
///
/// Rewritten are `src` of `img` and `source`, `href` of `a`, `href` of
/// `link` with `rel` stylesheet or icon, `src` of `script` with type
/// `text/javascript`, `src` of `input` with type `image`, every
/// `data-lavender-*` attribute, and the `url(...)` references of every
/// `style` attribute.
pub struct HtmlProcessor<'a, W: Write> {
    rewriter: &'a dyn Rewriter,
    out: Output<W>,
    state: State,
    tag: Tag,
    /// Prefix of `<!` constructs until their kind is known.
    markup: String,
}

impl<'a, W: Write> HtmlProcessor<'a, W> {
    pub fn new(rewriter: &'a dyn Rewriter, writer: W) -> Self {
        Self {
            rewriter,
            out: Output::new(writer),
            state: State::Text,
            tag: Tag::default(),
            markup: String::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn step(&mut self, c: char) {
        self.state = match self.state {
            State::Text => self.text(c),
            State::TagOpen => match c {
                '!' => {
                    self.markup.clear();
                    self.markup.push_str("<!");
                    State::MarkupDecl
                }
                '?' => {
                    self.out.push_str("<?");
                    State::Declaration
                }
                '/' => {
                    self.tag.reset();
                    self.tag.raw.push_str("</");
                    self.tag.closing = true;
                    self.tag.name = 2..2;
                    State::Tag(TagState::Name)
                }
                c if c.is_ascii_alphabetic() => {
                    self.tag.reset();
                    self.tag.raw.push('<');
                    self.tag.raw.push(c);
                    self.tag.name = 1..2;
                    State::Tag(TagState::Name)
                }
                c => {
                    self.out.push('<');
                    self.text(c)
                }
            },
            State::MarkupDecl => {
                self.markup.push(c);
                if self.markup == COMMENT_OPEN {
                    self.out.push_str(&self.markup);
                    State::Comment { dashes: 0 }
                } else if self.markup == CDATA_OPEN {
                    self.out.push_str(&self.markup);
                    State::Cdata { brackets: 0 }
                } else if COMMENT_OPEN.starts_with(self.markup.as_str())
                    || CDATA_OPEN.starts_with(self.markup.as_str())
                {
                    State::MarkupDecl
                } else {
                    self.out.push_str(&self.markup);
                    if c == '>' {
                        State::Text
                    } else {
                        State::Declaration
                    }
                }
            }
            State::Comment { dashes } => {
                self.out.push(c);
                match c {
                    '-' => State::Comment {
                        dashes: (dashes + 1).min(2),
                    },
                    '>' if dashes == 2 => State::Text,
                    _ => State::Comment { dashes: 0 },
                }
            }
            State::Cdata { brackets } => {
                self.out.push(c);
                match c {
                    ']' => State::Cdata {
                        brackets: (brackets + 1).min(2),
                    },
                    '>' if brackets == 2 => State::Text,
                    _ => State::Cdata { brackets: 0 },
                }
            }
            State::Declaration => {
                self.out.push(c);
                if c == '>' {
                    State::Text
                } else {
                    State::Declaration
                }
            }
            State::Tag(tag_state) => {
                self.tag.raw.push(c);
                let next = self.tag_step(tag_state, c);
                if next == State::Text {
                    let rendered = self.tag.render(self.rewriter);
                    self.out.push_str(&rendered);
                    self.tag.reset();
                } else if self.tag.raw.len() > MAX_TAG_LENGTH {
                    return self.overflow(next);
                }
                next
            }
            State::Overflow(quote) => {
                self.out.push(c);
                match (quote, c) {
                    (None, '>') => State::Text,
                    (None, '"' | '\'') => State::Overflow(Some(c)),
                    (Some(q), c) if q == c => State::Overflow(None),
                    _ => State::Overflow(quote),
                }
            }
        };
    }

    fn text(&mut self, c: char) -> State {
        if c == '<' {
            State::TagOpen
        } else {
            self.out.push(c);
            State::Text
        }
    }

    /// Gives up on buffering the current tag.
    fn overflow(&mut self, state: State) {
        self.out.push_str(&self.tag.raw);
        self.tag.reset();
        self.state = match state {
            State::Tag(TagState::Value(Quote::Double)) => State::Overflow(Some('"')),
            State::Tag(TagState::Value(Quote::Single)) => State::Overflow(Some('\'')),
            _ => State::Overflow(None),
        };
    }

    /// Advances the tag scanner by `c`, which is already appended to the raw
    /// tag. Returns [`State::Text`] once the tag is complete.
    fn tag_step(&mut self, state: TagState, c: char) -> State {
        let at = self.tag.last(c);
        let next = match state {
            TagState::Name => match c {
                '>' => {
                    self.tag.name.end = at;
                    return State::Text;
                }
                '/' if at > self.tag.name.start => {
                    self.tag.name.end = at;
                    TagState::BeforeAttrName
                }
                c if c.is_whitespace() => {
                    self.tag.name.end = at;
                    TagState::BeforeAttrName
                }
                _ => TagState::Name,
            },
            TagState::BeforeAttrName => match c {
                '>' => return State::Text,
                '/' => TagState::BeforeAttrName,
                c if c.is_whitespace() => TagState::BeforeAttrName,
                _ => {
                    self.tag.start_attribute(at);
                    TagState::AttrName
                }
            },
            TagState::AttrName => match c {
                '>' => {
                    self.tag.end_attribute_name(at);
                    return State::Text;
                }
                '=' => {
                    self.tag.end_attribute_name(at);
                    TagState::BeforeAttrValue
                }
                '/' => {
                    self.tag.end_attribute_name(at);
                    TagState::BeforeAttrName
                }
                c if c.is_whitespace() => {
                    self.tag.end_attribute_name(at);
                    TagState::AfterAttrName
                }
                _ => TagState::AttrName,
            },
            TagState::AfterAttrName => match c {
                '>' => return State::Text,
                '=' => TagState::BeforeAttrValue,
                '/' => TagState::BeforeAttrName,
                c if c.is_whitespace() => TagState::AfterAttrName,
                _ => {
                    self.tag.start_attribute(at);
                    TagState::AttrName
                }
            },
            TagState::BeforeAttrValue => match c {
                '>' => return State::Text,
                '"' => {
                    self.tag.start_value(self.tag.raw.len());
                    TagState::Value(Quote::Double)
                }
                '\'' => {
                    self.tag.start_value(self.tag.raw.len());
                    TagState::Value(Quote::Single)
                }
                c if c.is_whitespace() => TagState::BeforeAttrValue,
                _ => {
                    self.tag.start_value(at);
                    TagState::Value(Quote::Unquoted)
                }
            },
            TagState::Value(quote) => match (quote, c) {
                (Quote::Double, '"') | (Quote::Single, '\'') => {
                    self.tag.end_value(at);
                    TagState::BeforeAttrName
                }
                (Quote::Unquoted, '>') => {
                    self.tag.end_value(at);
                    return State::Text;
                }
                (Quote::Unquoted, c) if c.is_whitespace() => {
                    self.tag.end_value(at);
                    TagState::BeforeAttrName
                }
                _ => TagState::Value(quote),
            },
        };
        State::Tag(next)
    }

    /// Whatever is buffered, written literally.
    fn flush_buffered(&mut self) {
        match self.state {
            State::TagOpen => self.out.push('<'),
            State::MarkupDecl => self.out.push_str(&self.markup),
            State::Tag(_) => self.out.push_str(&self.tag.raw),
            _ => {}
        }
        self.markup.clear();
        self.tag.reset();
        self.state = State::Text;
    }
}

impl<W: Write> Processor for HtmlProcessor<'_, W> {
    fn process(&mut self, text: &str) -> io::Result<()> {
        for c in text.chars() {
            self.step(c);
            self.out.drain_if_full()?;
        }
        self.out.drain()
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    fn finish(&mut self) -> io::Result<()> {
        self.flush_buffered();
        self.out.flush()
    }
}

/// Runs `html` through an [`HtmlProcessor`] in memory. Should that fail,
/// `html` comes back unchanged.
pub fn rewrite_html(rewriter: &dyn Rewriter, html: &str) -> String {
    let mut processor = HtmlProcessor::new(rewriter, Vec::with_capacity(html.len()));
    let run = processor
        .process(&decode_all(html.as_bytes()))
        .and_then(|_| processor.finish());
    match run {
        Ok(()) => {
            let bytes = processor.into_inner();
            String::from_utf8(bytes)
                .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
        }
        Err(_) => html.to_string(),
    }
}
