//! Output plumbing for exports: destination selection, CSV writer setup and
//! transcoding into a non-UTF-8 output encoding via `encoding_rs`.
//!
//! The `-` path routes to stdout.

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoder, EncoderResult, Encoding, UTF_8};

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'")),
        None => Ok(UTF_8),
    }
}

/// File (or stdout for `None`/`-`) wrapped in a transcoder when `encoding`
/// is not UTF-8.
pub fn open_output(path: Option<&Path>, encoding: &'static Encoding) -> Result<Box<dyn Write>> {
    let base: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(io::stdout()),
    };
    Ok(if encoding == UTF_8 {
        base
    } else {
        Box::new(TranscodingWriter::new(base, encoding))
    })
}

pub fn csv_writer<W: Write>(writer: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true)
        .from_writer(writer)
}

/// Accepts UTF-8 bytes and forwards them re-encoded. A multi-byte sequence
/// split across writes is held back until it completes.
pub struct TranscodingWriter<W: Write> {
    inner: W,
    encoder: Encoder,
    pending: Vec<u8>,
}

impl<W: Write> TranscodingWriter<W> {
    pub fn new(inner: W, encoding: &'static Encoding) -> Self {
        Self {
            inner,
            encoder: encoding.new_encoder(),
            pending: Vec::new(),
        }
    }

    fn drain(&mut self, at_end: bool) -> io::Result<()> {
        let complete = match std::str::from_utf8(&self.pending) {
            Ok(text) => text.len(),
            Err(err) if err.error_len().is_none() && !at_end => err.valid_up_to(),
            Err(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "Invalid UTF-8 sequence in output stream",
                ));
            }
        };
        if complete == 0 {
            return Ok(());
        }
        let chunk: Vec<u8> = self.pending.drain(..complete).collect();
        let text = std::str::from_utf8(&chunk)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        self.encode(text)
    }

    fn encode(&mut self, mut text: &str) -> io::Result<()> {
        let mut out = [0u8; 4096];
        loop {
            let (result, read, written) =
                self.encoder
                    .encode_from_utf8_without_replacement(text, &mut out, false);
            self.inner.write_all(&out[..written])?;
            text = &text[read..];
            match result {
                EncoderResult::InputEmpty => return Ok(()),
                EncoderResult::OutputFull => continue,
                EncoderResult::Unmappable(ch) => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "'{ch}' cannot be represented in {}",
                            self.encoder.encoding().name()
                        ),
                    ));
                }
            }
        }
    }
}

impl<W: Write> Write for TranscodingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        self.drain(false)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.drain(true)?;
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_labels_case_insensitively() {
        assert_eq!(resolve_encoding(None).unwrap(), UTF_8);
        assert_eq!(
            resolve_encoding(Some(" Windows-1252 ")).unwrap().name(),
            "windows-1252"
        );
        assert!(resolve_encoding(Some("klingon")).is_err());
    }

    #[test]
    fn transcodes_split_multibyte_input() {
        let encoding = resolve_encoding(Some("windows-1252")).unwrap();
        let mut writer = TranscodingWriter::new(Vec::new(), encoding);
        let bytes = "café".as_bytes();
        writer.write_all(&bytes[..4]).unwrap();
        writer.write_all(&bytes[4..]).unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.inner, vec![b'c', b'a', b'f', 0xE9]);
    }

    #[test]
    fn unmappable_characters_fail() {
        let encoding = resolve_encoding(Some("windows-1252")).unwrap();
        let mut writer = TranscodingWriter::new(Vec::new(), encoding);
        assert!(writer.write_all("日本".as_bytes()).is_err());
    }
}
