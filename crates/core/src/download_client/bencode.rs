//! Info hash computation over raw `.torrent` bytes.
//!
//! Only the byte span of the top-level `info` value is needed, so values are
//! measured rather than decoded.

use sha1::{Digest, Sha1};
use thiserror::Error;

const INFO_MARKER: &[u8] = b"4:info";

/// Deepest list/dict nesting accepted from a `.torrent` file.
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BencodeError {
    #[error("Unexpected end of data at offset {0}")]
    UnexpectedEof(usize),

    #[error("Invalid integer at offset {0}")]
    InvalidInteger(usize),

    #[error("Invalid string length at offset {0}")]
    InvalidLength(usize),

    #[error("Unknown bencode type 0x{byte:02x} at offset {offset}")]
    UnknownType { byte: u8, offset: usize },

    #[error("Nesting too deep at offset {0}")]
    TooDeep(usize),

    #[error("Invalid .torrent: no \"info\" dictionary")]
    MissingInfo,
}

/// Offset one past the end of the bencode value starting at `offset`.
pub fn value_end(buf: &[u8], offset: usize) -> Result<usize, BencodeError> {
    nested_value_end(buf, offset, 0)
}

fn nested_value_end(buf: &[u8], offset: usize, depth: usize) -> Result<usize, BencodeError> {
    let byte = *buf.get(offset).ok_or(BencodeError::UnexpectedEof(offset))?;

    match byte {
        b'i' => {
            let end = find(buf, b'e', offset + 1).ok_or(BencodeError::InvalidInteger(offset))?;
            Ok(end + 1)
        }
        b'l' | b'd' => {
            if depth >= MAX_DEPTH {
                return Err(BencodeError::TooDeep(offset));
            }
            let is_dict = byte == b'd';
            let mut pos = offset + 1;
            while pos < buf.len() && buf[pos] != b'e' {
                if is_dict {
                    pos = nested_value_end(buf, pos, depth + 1)?;
                }
                pos = nested_value_end(buf, pos, depth + 1)?;
            }
            if pos >= buf.len() {
                return Err(BencodeError::UnexpectedEof(pos));
            }
            Ok(pos + 1)
        }
        b'0'..=b'9' => {
            let colon = find(buf, b':', offset).ok_or(BencodeError::InvalidLength(offset))?;
            let len: usize = std::str::from_utf8(&buf[offset..colon])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or(BencodeError::InvalidLength(offset))?;
            let end = colon
                .checked_add(1)
                .and_then(|start| start.checked_add(len))
                .ok_or(BencodeError::InvalidLength(offset))?;
            if end > buf.len() {
                return Err(BencodeError::UnexpectedEof(buf.len()));
            }
            Ok(end)
        }
        other => Err(BencodeError::UnknownType {
            byte: other,
            offset,
        }),
    }
}

fn find(buf: &[u8], needle: u8, from: usize) -> Option<usize> {
    buf.get(from..)?
        .iter()
        .position(|&b| b == needle)
        .map(|p| from + p)
}

/// Byte range of the `info` dictionary value.
pub fn info_span(buf: &[u8]) -> Result<(usize, usize), BencodeError> {
    let marker = buf
        .windows(INFO_MARKER.len())
        .position(|w| w == INFO_MARKER)
        .ok_or(BencodeError::MissingInfo)?;

    let start = marker + INFO_MARKER.len();
    let end = value_end(buf, start)?;
    Ok((start, end))
}

/// Upper-case hex SHA-1 of the `info` dictionary, as the download client computes it.
pub fn info_hash(buf: &[u8]) -> Result<String, BencodeError> {
    let (start, end) = info_span(buf)?;
    let digest = Sha1::digest(&buf[start..end]);
    Ok(hex::encode_upper(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Vec<u8> {
        let mut buf = b"d8:announce18:http://tracker/ann4:infod5:filesld6:lengthi5e4:pathl9:album.cueeee4:name5:album6:pieces20:".to_vec();
        buf.extend_from_slice(&[b'e'; 20]);
        buf.extend_from_slice(b"e7:comment4:teste");
        buf
    }

    #[test]
    fn test_value_end_scalars() {
        assert_eq!(value_end(b"i42e", 0), Ok(4));
        assert_eq!(value_end(b"i-3exx", 0), Ok(4));
        assert_eq!(value_end(b"4:spam", 0), Ok(6));
        assert_eq!(value_end(b"0:", 0), Ok(2));
        assert_eq!(value_end(b"le", 0), Ok(2));
        assert_eq!(value_end(b"d1:ai1ee", 0), Ok(8));
    }

    #[test]
    fn test_value_end_errors() {
        assert_eq!(value_end(b"", 0), Err(BencodeError::UnexpectedEof(0)));
        assert_eq!(value_end(b"i42", 0), Err(BencodeError::InvalidInteger(0)));
        assert_eq!(value_end(b"9:short", 0), Err(BencodeError::UnexpectedEof(7)));
        assert_eq!(value_end(b"l4:spam", 0), Err(BencodeError::UnexpectedEof(7)));
        assert!(matches!(
            value_end(b"x", 0),
            Err(BencodeError::UnknownType { byte: b'x', offset: 0 })
        ));
    }

    #[test]
    fn test_huge_string_length_is_rejected() {
        assert_eq!(
            value_end(b"18446744073709551615:x", 0),
            Err(BencodeError::InvalidLength(0))
        );
        assert_eq!(
            value_end(b"18446744073709551614:x", 0),
            Err(BencodeError::InvalidLength(0))
        );
        assert!(info_hash(b"d4:info18446744073709551615:xe").is_err());
    }

    #[test]
    fn test_nesting_is_capped() {
        let mut deep = vec![b'l'; MAX_DEPTH + 1];
        deep.extend(std::iter::repeat(b'e').take(MAX_DEPTH + 1));
        assert_eq!(value_end(&deep, 0), Err(BencodeError::TooDeep(MAX_DEPTH)));

        let mut ok = vec![b'l'; MAX_DEPTH];
        ok.extend(std::iter::repeat(b'e').take(MAX_DEPTH));
        assert_eq!(value_end(&ok, 0), Ok(2 * MAX_DEPTH));
    }

    #[test]
    fn test_info_span_is_exact() {
        let buf = fixture();
        assert_eq!(info_span(&buf), Ok((38, 125)));
        assert!(buf[38..125].starts_with(b"d5:files"));
        assert_eq!(&buf[125..], b"7:comment4:teste");
    }

    #[test]
    fn test_info_hash_known_value() {
        assert_eq!(
            info_hash(&fixture()).unwrap(),
            "9693829E74611B9A363CBB5A42612EDD2F57B105"
        );
    }

    #[test]
    fn test_minimal_info_dict() {
        assert_eq!(
            info_hash(b"d4:infod4:name1:aee").unwrap(),
            "9E3F71178C577DCB032D2D7DFBB436D21769D456"
        );
    }

    #[test]
    fn test_missing_info() {
        assert_eq!(
            info_hash(b"d8:announce3:urle"),
            Err(BencodeError::MissingInfo)
        );
        assert!(info_hash(b"d4:infod4:name").is_err());
    }
}
