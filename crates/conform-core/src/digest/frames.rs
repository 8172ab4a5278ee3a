//! Frame boundaries in decoded output.
//!
//! Y4M output describes itself: a header line followed by `FRAME` markers.
//! Raw planar output needs a [`FrameLayout`] supplied by the adapter.

use std::io::{BufRead, Read};

use serde::{Deserialize, Serialize};
use sha2::{Digest as Sha2Digest, Sha256};

use super::{Digest, DigestError, Result};

const Y4M_MAGIC: &[u8] = b"YUV4MPEG2";
const Y4M_FRAME: &[u8] = b"FRAME";

/// Longest Y4M header or frame marker line accepted.
const Y4M_MAX_LINE: u64 = 4096;

/// Chroma subsampling of planar output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChromaFormat {
    Mono,
    Yuv420,
    Yuv422,
    Yuv444,
}

/// Geometry of one raw planar frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FrameLayout {
    pub width: usize,
    pub height: usize,
    pub chroma: ChromaFormat,
    /// 1 for 8-bit samples, 2 for anything deeper.
    pub bytes_per_sample: usize,
}

impl FrameLayout {
    /// 8-bit 4:2:0, what most decoders write by default.
    pub fn yuv420(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            chroma: ChromaFormat::Yuv420,
            bytes_per_sample: 1,
        }
    }

    /// Bytes occupied by one frame, or `None` if the size overflows.
    pub fn frame_len(&self) -> Option<usize> {
        let luma = self.width.checked_mul(self.height)?;
        let half_w = self.width.div_ceil(2);
        let half_h = self.height.div_ceil(2);
        let chroma = match self.chroma {
            ChromaFormat::Mono => 0,
            ChromaFormat::Yuv420 => half_w.checked_mul(half_h)?.checked_mul(2)?,
            ChromaFormat::Yuv422 => half_w.checked_mul(self.height)?.checked_mul(2)?,
            ChromaFormat::Yuv444 => luma.checked_mul(2)?,
        };
        luma.checked_add(chroma)?.checked_mul(self.bytes_per_sample)
    }
}

/// Whether `data` starts with a Y4M stream header.
fn is_y4m(data: &[u8]) -> bool {
    data.starts_with(Y4M_MAGIC)
}

/// Hash decoded output frame by frame, reading it as a stream.
///
/// Y4M headers and `FRAME` markers are not part of any payload, so a Y4M
/// stream and the raw stream with the same pictures yield identical
/// digests. Raw output needs `layout`.
pub fn digest_frames<R: BufRead>(
    file: &str,
    reader: &mut R,
    layout: Option<FrameLayout>,
) -> Result<Vec<Digest>> {
    let mut magic = Vec::with_capacity(Y4M_MAGIC.len());
    reader
        .by_ref()
        .take(Y4M_MAGIC.len() as u64)
        .read_to_end(&mut magic)?;
    let mut stream = magic.as_slice().chain(reader);

    if is_y4m(&magic) {
        return digest_y4m(&mut stream);
    }

    let layout = layout.ok_or_else(|| DigestError::UnknownFrameLayout {
        file: file.to_string(),
    })?;
    let frame_len = match layout.frame_len() {
        Some(len) if len > 0 => len,
        _ => {
            return Err(DigestError::InvalidLayout(format!(
                "{}x{} {:?} x{}",
                layout.width, layout.height, layout.chroma, layout.bytes_per_sample
            )))
        }
    };
    digest_raw(&mut stream, frame_len)
}

fn digest_raw<R: BufRead>(reader: &mut R, frame_len: usize) -> Result<Vec<Digest>> {
    let mut digests = Vec::new();
    loop {
        let (digest, read) = hash_payload(reader, frame_len)?;
        if read == 0 {
            return Ok(digests);
        }
        if read < frame_len {
            return Err(DigestError::TruncatedFrame {
                frame: digests.len(),
                expected: frame_len,
                actual: read,
            });
        }
        digests.push(digest);
    }
}

fn digest_y4m<R: BufRead>(reader: &mut R) -> Result<Vec<Digest>> {
    let header = match next_line(reader)? {
        Line::Complete(header) => header,
        Line::End | Line::Unterminated => {
            return Err(DigestError::MalformedY4m(
                "unterminated stream header".to_string(),
            ))
        }
    };
    let layout = parse_y4m_header(&header)?;
    let frame_len = layout.frame_len().ok_or_else(|| {
        DigestError::MalformedY4m(format!(
            "frame size overflows for W{} H{}",
            layout.width, layout.height
        ))
    })?;

    let mut digests = Vec::new();
    loop {
        let marker = match next_line(reader)? {
            Line::End => return Ok(digests),
            Line::Complete(marker) => marker,
            Line::Unterminated => {
                return Err(DigestError::MalformedY4m(format!(
                    "unterminated marker for frame {}",
                    digests.len()
                )))
            }
        };
        if !marker.starts_with(Y4M_FRAME) {
            return Err(DigestError::MalformedY4m(format!(
                "expected FRAME marker for frame {}",
                digests.len()
            )));
        }
        let (digest, read) = hash_payload(reader, frame_len)?;
        if read < frame_len {
            return Err(DigestError::TruncatedFrame {
                frame: digests.len(),
                expected: frame_len,
                actual: read,
            });
        }
        digests.push(digest);
    }
}

/// Hash up to `len` bytes; returns the digest and how many bytes were read.
fn hash_payload<R: Read>(reader: &mut R, len: usize) -> Result<(Digest, usize)> {
    let mut hasher = Sha256::new();
    let read = std::io::copy(&mut reader.by_ref().take(len as u64), &mut hasher)?;
    Ok((Digest::from_hasher(hasher), read as usize))
}

enum Line {
    End,
    Complete(Vec<u8>),
    /// Stream ended or the line grew past [`Y4M_MAX_LINE`] before `\n`.
    Unterminated,
}

/// Read one `\n`-terminated line, returned without the newline.
fn next_line<R: BufRead>(reader: &mut R) -> Result<Line> {
    let mut line = Vec::new();
    reader
        .by_ref()
        .take(Y4M_MAX_LINE)
        .read_until(b'\n', &mut line)?;
    if line.is_empty() {
        return Ok(Line::End);
    }
    if line.pop() != Some(b'\n') {
        return Ok(Line::Unterminated);
    }
    Ok(Line::Complete(line))
}

fn parse_y4m_header(line: &[u8]) -> Result<FrameLayout> {
    let text = std::str::from_utf8(line)
        .map_err(|_| DigestError::MalformedY4m("header is not ASCII".to_string()))?;

    let mut width = None;
    let mut height = None;
    let mut chroma = ChromaFormat::Yuv420;
    let mut bytes_per_sample = 1;

    for token in text.split_ascii_whitespace().skip(1) {
        let mut chars = token.chars();
        let tag = chars.next();
        let value = chars.as_str();
        match tag {
            Some('W') => width = value.parse().ok(),
            Some('H') => height = value.parse().ok(),
            Some('C') => {
                chroma = if value.starts_with("mono") {
                    ChromaFormat::Mono
                } else if value.starts_with("444") {
                    ChromaFormat::Yuv444
                } else if value.starts_with("422") {
                    ChromaFormat::Yuv422
                } else if value.starts_with("420") {
                    ChromaFormat::Yuv420
                } else {
                    return Err(DigestError::MalformedY4m(format!(
                        "unsupported colorspace {value}"
                    )));
                };
                if has_deep_samples(value) {
                    bytes_per_sample = 2;
                }
            }
            _ => {}
        }
    }

    match (width, height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => Ok(FrameLayout {
            width,
            height,
            chroma,
            bytes_per_sample,
        }),
        _ => Err(DigestError::MalformedY4m(
            "missing or invalid W/H in header".to_string(),
        )),
    }
}

/// `C420p10`, `C444p12`, `Cmono16`: anything above 8 bits takes two bytes.
fn has_deep_samples(colorspace: &str) -> bool {
    let depth = match colorspace.strip_prefix("mono") {
        Some(depth) => depth,
        None => colorspace.split_once('p').map_or("", |(_, depth)| depth),
    };
    !depth.is_empty() && depth != "8" && depth.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn y4m(header: &str, frames: &[Vec<u8>]) -> Vec<u8> {
        let mut out = format!("{header}\n").into_bytes();
        for frame in frames {
            out.extend_from_slice(b"FRAME\n");
            out.extend_from_slice(frame);
        }
        out
    }

    fn digests(data: &[u8], layout: Option<FrameLayout>) -> Result<Vec<Digest>> {
        digest_frames("a.ivf", &mut &data[..], layout)
    }

    #[test]
    fn test_frame_len() {
        assert_eq!(FrameLayout::yuv420(176, 144).frame_len(), Some(38016));
        assert_eq!(FrameLayout::yuv420(3, 3).frame_len(), Some(9 + 2 * 4));
        let mono = FrameLayout {
            chroma: ChromaFormat::Mono,
            ..FrameLayout::yuv420(16, 16)
        };
        assert_eq!(mono.frame_len(), Some(256));
        let deep = FrameLayout {
            chroma: ChromaFormat::Yuv444,
            bytes_per_sample: 2,
            ..FrameLayout::yuv420(4, 4)
        };
        assert_eq!(deep.frame_len(), Some(96));
    }

    #[test]
    fn test_frame_len_overflow() {
        assert_eq!(FrameLayout::yuv420(usize::MAX, 2).frame_len(), None);
        let wide = FrameLayout {
            bytes_per_sample: usize::MAX,
            ..FrameLayout::yuv420(2, 2)
        };
        assert_eq!(wide.frame_len(), None);
    }

    #[test]
    fn test_raw_frames() {
        let layout = FrameLayout::yuv420(2, 2);
        let data: Vec<u8> = (0..18).collect();
        let frames = digests(&data, Some(layout)).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[1], Digest::compute(&[6, 7, 8, 9, 10, 11]));
    }

    #[test]
    fn test_raw_frames_truncated() {
        let err = digests(&[0u8; 7], Some(FrameLayout::yuv420(2, 2))).unwrap_err();
        assert!(matches!(
            err,
            DigestError::TruncatedFrame {
                frame: 1,
                expected: 6,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_raw_frames_without_layout() {
        let err = digests(&[0u8; 12], None).unwrap_err();
        assert!(matches!(err, DigestError::UnknownFrameLayout { .. }));
    }

    #[test]
    fn test_raw_layout_overflow_is_rejected() {
        let err = digests(&[0u8; 12], Some(FrameLayout::yuv420(usize::MAX, usize::MAX)))
            .unwrap_err();
        assert!(matches!(err, DigestError::InvalidLayout(_)));

        let empty = FrameLayout::yuv420(0, 0);
        let err = digests(&[0u8; 12], Some(empty)).unwrap_err();
        assert!(matches!(err, DigestError::InvalidLayout(_)));
    }

    #[test]
    fn test_raw_input_shorter_than_magic() {
        let frames = digests(&[5u8, 6, 7], Some(FrameLayout::yuv420(1, 1))).unwrap();
        assert_eq!(frames, vec![Digest::compute(&[5, 6, 7])]);
    }

    #[test]
    fn test_y4m_matches_raw_payloads() {
        let f0 = vec![1u8; 6];
        let f1 = vec![2u8; 6];
        let stream = y4m("YUV4MPEG2 W2 H2 F30:1 Ip A1:1 C420jpeg", &[f0.clone(), f1.clone()]);
        let frames = digests(&stream, None).unwrap();
        assert_eq!(frames, vec![Digest::compute(&f0), Digest::compute(&f1)]);

        let raw: Vec<u8> = [f0, f1].concat();
        let raw_frames = digests(&raw, Some(FrameLayout::yuv420(2, 2))).unwrap();
        assert_eq!(frames, raw_frames);
    }

    #[test]
    fn test_y4m_frame_params_and_high_bitdepth() {
        let frame = vec![9u8; 12];
        let mut stream = b"YUV4MPEG2 W2 H2 C420p10\n".to_vec();
        stream.extend_from_slice(b"FRAME Ixyz\n");
        stream.extend_from_slice(&frame);
        let frames = digests(&stream, None).unwrap();
        assert_eq!(frames, vec![Digest::compute(&frame)]);
    }

    #[test]
    fn test_colorspace_depth() {
        assert!(!has_deep_samples("420jpeg"));
        assert!(!has_deep_samples("420mpeg2"));
        assert!(!has_deep_samples("420paldv"));
        assert!(!has_deep_samples("mono"));
        assert!(has_deep_samples("420p10"));
        assert!(has_deep_samples("mono16"));
    }

    #[test]
    fn test_y4m_truncated() {
        let stream = y4m("YUV4MPEG2 W2 H2", &[vec![0u8; 4]]);
        let err = digests(&stream, None).unwrap_err();
        assert!(matches!(
            err,
            DigestError::TruncatedFrame {
                frame: 0,
                expected: 6,
                actual: 4
            }
        ));
    }

    #[test]
    fn test_y4m_oversized_dimensions_are_malformed() {
        let stream = b"YUV4MPEG2 W9999999999 H9999999999 C420jpeg\nFRAME\nxx";
        let err = digests(stream, None).unwrap_err();
        match err {
            DigestError::MalformedY4m(message) => assert!(message.contains("overflows")),
            other => panic!("expected MalformedY4m, got {other:?}"),
        }
    }

    #[test]
    fn test_y4m_bad_marker() {
        let mut stream = b"YUV4MPEG2 W2 H2\n".to_vec();
        stream.extend_from_slice(b"FRAMX\n");
        stream.extend_from_slice(&[0u8; 6]);
        let err = digests(&stream, None).unwrap_err();
        assert!(matches!(err, DigestError::MalformedY4m(_)));
    }

    #[test]
    fn test_y4m_unterminated_header() {
        let err = digests(b"YUV4MPEG2 W2 H2", None).unwrap_err();
        assert!(matches!(err, DigestError::MalformedY4m(_)));

        let long = format!("YUV4MPEG2 W2 H2 X{}\n", "a".repeat(5000));
        let err = digests(long.as_bytes(), None).unwrap_err();
        assert!(matches!(err, DigestError::MalformedY4m(_)));
    }

    #[test]
    fn test_y4m_missing_dimensions() {
        let err = digests(b"YUV4MPEG2 F30:1\n", None).unwrap_err();
        assert!(matches!(err, DigestError::MalformedY4m(_)));
    }

    #[test]
    fn test_y4m_empty_stream() {
        let frames = digests(b"YUV4MPEG2 W2 H2\n", None).unwrap();
        assert!(frames.is_empty());
    }
}
