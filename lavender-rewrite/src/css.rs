use std::io::{self, Write};

use crate::processor::{decode_all, Output, Processor, Rewriter};

/// Longest `url(...)` body that is buffered; longer ones (inline data URIs)
/// are passed through without rewriting.
const MAX_URL_LENGTH: usize = 4 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Other,
    UrlU,
    UrlR,
    UrlL,
    /// Inside `url(`, collecting until `)`.
    UrlLpar,
}

/// Rewrites the references inside `url(...)` of a CSS stream and forwards
/// everything else verbatim.
pub struct CssProcessor<'a, W: Write> {
    rewriter: &'a dyn Rewriter,
    out: Output<W>,
    state: State,
    url: String,
}

impl<'a, W: Write> CssProcessor<'a, W> {
    pub fn new(rewriter: &'a dyn Rewriter, writer: W) -> Self {
        Self {
            rewriter,
            out: Output::new(writer),
            state: State::Other,
            url: String::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn step(&mut self, c: char) {
        self.state = match self.state {
            State::UrlLpar => {
                if c == ')' {
                    self.emit_url();
                    self.out.push(c);
                    State::Other
                } else {
                    self.url.push(c);
                    if self.url.len() > MAX_URL_LENGTH {
                        self.out.push_str(&self.url);
                        self.url.clear();
                        State::Other
                    } else {
                        State::UrlLpar
                    }
                }
            }
            state => {
                self.out.push(c);
                match (state, c.to_ascii_lowercase()) {
                    (State::UrlU, 'r') => State::UrlR,
                    (State::UrlR, 'l') => State::UrlL,
                    (State::UrlL, '(') => {
                        self.url.clear();
                        State::UrlLpar
                    }
                    (_, 'u') => State::UrlU,
                    _ => State::Other,
                }
            }
        };
    }

    /// Rewrites the collected reference, keeping surrounding whitespace.
    fn emit_url(&mut self) {
        let trimmed = self.url.trim();
        if trimmed.is_empty() {
            self.out.push_str(&self.url);
        } else {
            let start = self.url.len() - self.url.trim_start().len();
            let end = start + trimmed.len();
            let rewritten = self.rewriter.rewrite(trimmed);
            self.out.push_str(&self.url[..start]);
            self.out.push_str(&rewritten);
            self.out.push_str(&self.url[end..]);
        }
        self.url.clear();
    }
}

impl<W: Write> Processor for CssProcessor<'_, W> {
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
        if self.state == State::UrlLpar {
            self.out.push_str(&self.url);
            self.url.clear();
        }
        self.state = State::Other;
        self.out.flush()
    }
}

/// Runs `css` through a [`CssProcessor`] in memory. Should that fail, `css`
/// comes back unchanged.
pub fn rewrite_css(rewriter: &dyn Rewriter, css: &str) -> String {
    match run(rewriter, &decode_all(css.as_bytes())) {
        Ok(bytes) => String::from_utf8(bytes)
            .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()),
        Err(_) => css.to_string(),
    }
}

/// [`rewrite_css`] for text taken from a processor's own input, such as a
/// `style` attribute inside an HTML stream.
pub(crate) fn rewrite_css_text(rewriter: &dyn Rewriter, css: &str) -> String {
    match run(rewriter, css) {
        Ok(bytes) => decode_all(&bytes),
        Err(_) => css.to_string(),
    }
}

fn run(rewriter: &dyn Rewriter, css: &str) -> io::Result<Vec<u8>> {
    let mut processor = CssProcessor::new(rewriter, Vec::with_capacity(css.len()));
    processor.process(css)?;
    processor.finish()?;
    Ok(processor.into_inner())
}
