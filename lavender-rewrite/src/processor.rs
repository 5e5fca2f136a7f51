use std::io::{self, Write};

/// Turns one reference found in a document into its replacement.
///
/// Implementations must not fail: a reference that cannot be handled comes
/// back unchanged.
pub trait Rewriter {
    fn rewrite(&self, reference: &str) -> String;
}

/// A streaming text rewriter. Input may be split at any character boundary.
pub trait Processor {
    fn process(&mut self, text: &str) -> io::Result<()>;

    /// Pushes pending output to the underlying writer without ending the
    /// stream.
    fn flush(&mut self) -> io::Result<()>;

    /// Ends the stream: anything still buffered, such as a truncated tag, is
    /// written literally.
    fn finish(&mut self) -> io::Result<()>;
}

/// Bytes that are not UTF-8 travel through the processors as characters
/// `RAW_BYTE_BASE + byte` and are written back as the byte itself. Text
/// already using that range is carried byte by byte the same way, so every
/// input byte that is not rewritten comes out unchanged.
const RAW_BYTE_BASE: u32 = 0x10_FF00;

fn raw_byte(byte: u8) -> char {
    char::from_u32(RAW_BYTE_BASE + u32::from(byte)).unwrap_or(char::REPLACEMENT_CHARACTER)
}

fn push_text(text: &str, out: &mut String) {
    for c in text.chars() {
        if u32::from(c) >= RAW_BYTE_BASE {
            out.extend(c.encode_utf8(&mut [0; 4]).bytes().map(raw_byte));
        } else {
            out.push(c);
        }
    }
}

/// Decodes `bytes` into `out`. Returns the length of an incomplete sequence
/// at the end, which is left undecoded.
pub(crate) fn decode_into(mut bytes: &[u8], out: &mut String) -> usize {
    loop {
        match std::str::from_utf8(bytes) {
            Ok(text) => {
                push_text(text, out);
                return 0;
            }
            Err(e) => {
                let (valid, rest) = bytes.split_at(e.valid_up_to());
                push_text(std::str::from_utf8(valid).unwrap_or_default(), out);
                match e.error_len() {
                    Some(invalid) => {
                        out.extend(rest[..invalid].iter().copied().map(raw_byte));
                        bytes = &rest[invalid..];
                    }
                    None => return rest.len(),
                }
            }
        }
    }
}

/// Decodes a complete byte sequence, keeping a truncated trailing sequence as
/// raw bytes.
pub(crate) fn decode_all(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    let pending = decode_into(bytes, &mut text);
    text.extend(bytes[bytes.len() - pending..].iter().copied().map(raw_byte));
    text
}

/// The inverse of [`decode_into`].
pub(crate) fn encode_into(text: &str, out: &mut Vec<u8>) {
    for c in text.chars() {
        match u32::from(c).checked_sub(RAW_BYTE_BASE) {
            Some(byte) => out.push(byte as u8),
            None => out.extend_from_slice(c.encode_utf8(&mut [0; 4]).as_bytes()),
        }
    }
}

/// Output buffering shared by the processors. Text is collected and handed
/// to the writer in blocks instead of character by character.
#[derive(Debug)]
pub(crate) struct Output<W: Write> {
    writer: W,
    pending: String,
    encoded: Vec<u8>,
}

const OUTPUT_BLOCK: usize = 8 * 1024;

impl<W: Write> Output<W> {
    pub(crate) fn new(writer: W) -> Self {
        Self {
            writer,
            pending: String::new(),
            encoded: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, c: char) {
        self.pending.push(c);
    }

    pub(crate) fn push_str(&mut self, s: &str) {
        self.pending.push_str(s);
    }

    pub(crate) fn drain_if_full(&mut self) -> io::Result<()> {
        if self.pending.len() >= OUTPUT_BLOCK {
            self.drain()?;
        }
        Ok(())
    }

    pub(crate) fn drain(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            self.encoded.clear();
            encode_into(&self.pending, &mut self.encoded);
            self.writer.write_all(&self.encoded)?;
            self.pending.clear();
        }
        Ok(())
    }

    pub(crate) fn flush(&mut self) -> io::Result<()> {
        self.drain()?;
        self.writer.flush()
    }

    pub(crate) fn into_inner(self) -> W {
        self.writer
    }
}

/// Adapts a [`Processor`] to [`std::io::Write`], decoding UTF-8 across
/// arbitrary chunk boundaries. Bytes that are not UTF-8, such as Latin-1
/// text, are forwarded unchanged.
pub struct ProcessorWriter<P: Processor> {
    processor: P,
    undecoded: Vec<u8>,
    text: String,
}

impl<P: Processor> ProcessorWriter<P> {
    pub fn new(processor: P) -> Self {
        Self {
            processor,
            undecoded: Vec::new(),
            text: String::new(),
        }
    }

    /// Ends the stream and returns the processor.
    pub fn finish(mut self) -> io::Result<P> {
        if !self.undecoded.is_empty() {
            // a multi-byte sequence cut off by the end of the stream
            let text = decode_all(&self.undecoded);
            self.processor.process(&text)?;
            self.undecoded.clear();
        }
        self.processor.finish()?;
        Ok(self.processor)
    }

    fn decode(&mut self) -> io::Result<()> {
        self.text.clear();
        let pending = decode_into(&self.undecoded, &mut self.text);
        if !self.text.is_empty() {
            self.processor.process(&self.text)?;
        }
        let decoded = self.undecoded.len() - pending;
        self.undecoded.drain(..decoded);
        Ok(())
    }
}

impl<P: Processor> Write for ProcessorWriter<P> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.undecoded.extend_from_slice(buf);
        self.decode()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.processor.flush()
    }
}
