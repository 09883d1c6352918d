//! Cue sheet text decoding.
//!
//! Cue sheets from Russian-speaking rippers are routinely saved in legacy
//! Cyrillic code pages. UTF-8 wins when a BOM is present or the bytes are
//! strictly valid UTF-8; otherwise every candidate legacy encoding is decoded
//! and scored.

use encoding_rs::{Encoding, IBM866, KOI8_R, WINDOWS_1251, WINDOWS_1252};
use tracing::debug;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Decoded text and the label of the encoding used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    pub encoding: &'static str,
}

/// Strict UTF-8 validation: rejects overlong forms, surrogates, code points
/// above U+10FFFF and truncated sequences.
pub fn is_strict_utf8(bytes: &[u8]) -> bool {
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i];
        let width = match b0 {
            0x00..=0x7F => 1,
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => return false,
        };
        if i + width > bytes.len() {
            return false;
        }
        let rest = &bytes[i + 1..i + width];
        if rest.iter().any(|b| b & 0xC0 != 0x80) {
            return false;
        }
        if width >= 3 {
            let b1 = rest[0];
            let ok = match b0 {
                0xE0 => b1 >= 0xA0,
                0xED => b1 < 0xA0,
                0xF0 => b1 >= 0x90,
                0xF4 => b1 <= 0x8F,
                _ => true,
            };
            if !ok {
                return false;
            }
        }
        i += width;
    }
    true
}

/// Higher is more plausible: Cyrillic letters count for, replacement and
/// control characters against.
pub fn score_text(text: &str) -> i64 {
    text.chars().fold(0i64, |score, c| match c {
        'А'..='я' | 'Ё' | 'ё' => score + 6,
        '\u{FFFD}' => score - 30,
        '\u{0}'..='\u{8}' | '\u{B}' | '\u{C}' | '\u{E}'..='\u{1F}' => score - 2,
        _ => score,
    })
}

/// Legacy candidates in preference order; ties keep the earlier one.
/// The `latin1` label resolves to windows-1252.
fn candidates() -> [&'static Encoding; 4] {
    [WINDOWS_1251, IBM866, KOI8_R, WINDOWS_1252]
}

pub fn decode_cue(bytes: &[u8]) -> DecodedText {
    if let Some(body) = bytes.strip_prefix(UTF8_BOM) {
        return DecodedText {
            text: String::from_utf8_lossy(body).into_owned(),
            encoding: "utf-8-bom",
        };
    }

    if is_strict_utf8(bytes) {
        return DecodedText {
            text: String::from_utf8_lossy(bytes).into_owned(),
            encoding: "utf-8",
        };
    }

    let (default_text, _) = WINDOWS_1251.decode_without_bom_handling(bytes);
    let mut best = DecodedText {
        text: default_text.into_owned(),
        encoding: WINDOWS_1251.name(),
    };
    // Only a positive score displaces the windows-1251 default.
    let mut best_score = 0;

    for encoding in candidates() {
        let (text, _) = encoding.decode_without_bom_handling(bytes);
        let text = text.trim_start_matches('\u{FEFF}');
        let score = score_text(text);
        if score > best_score {
            best_score = score;
            best = DecodedText {
                text: text.to_string(),
                encoding: encoding.name(),
            };
        }
    }

    debug!(encoding = best.encoding, score = best_score, "Decoded legacy cue sheet");
    best
}
