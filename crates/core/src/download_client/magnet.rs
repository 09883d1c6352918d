//! Info hash extraction from magnet links.

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Upper-case hex info hash from the `xt=urn:btih:` parameter of a magnet.
///
/// Accepts a 40 character hex hash or a 26-40 character Base32 hash.
pub fn parse_magnet_hash(magnet: &str) -> Option<String> {
    let lower = magnet.to_ascii_lowercase();
    let start = lower.find("xt=urn:btih:")? + "xt=urn:btih:".len();
    let hash = magnet[start..].split('&').next()?.trim();

    if hash.len() == 40 && hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Some(hash.to_uppercase());
    }

    let is_base32 = (26..=40).contains(&hash.len())
        && hash
            .bytes()
            .all(|b| b.is_ascii_alphabetic() || (b'2'..=b'7').contains(&b));
    if is_base32 {
        return base32_to_hex(hash).map(|h| h.to_uppercase());
    }

    None
}

/// Decode Base32 into hex, four bits per digit, capped at 40 digits.
fn base32_to_hex(value: &str) -> Option<String> {
    let cleaned = value.trim_end_matches('=').to_ascii_uppercase();

    let mut bits: u64 = 0;
    let mut bit_count = 0u32;
    let mut hex = String::with_capacity(40);

    for ch in cleaned.bytes() {
        let digit = BASE32_ALPHABET.iter().position(|&c| c == ch)? as u64;
        bits = (bits << 5) | digit;
        bit_count += 5;

        while bit_count >= 4 {
            bit_count -= 4;
            let nibble = (bits >> bit_count) & 0xF;
            hex.push(char::from_digit(nibble as u32, 16)?);
        }
        bits &= (1 << bit_count) - 1;
    }

    hex.truncate(40);
    if hex.is_empty() {
        None
    } else {
        Some(hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "C12FE1C06BBA254A9DC9F519B335AA7C1367A88A";
    // Same 20 bytes in RFC 4648 Base32.
    const BASE32: &str = "YEX6DQDLXISUVHOJ6UM3GNNKPQJWPKEK";

    #[test]
    fn test_hex_hash_any_case() {
        let magnet = format!("magnet:?xt=urn:btih:{}&dn=The+Wall", HEX.to_lowercase());
        assert_eq!(parse_magnet_hash(&magnet).as_deref(), Some(HEX));

        let magnet = format!("MAGNET:?XT=URN:BTIH:{}", HEX);
        assert_eq!(parse_magnet_hash(&magnet).as_deref(), Some(HEX));
    }

    #[test]
    fn test_base32_hash_matches_hex() {
        let magnet = format!("magnet:?dn=x&xt=urn:btih:{}&tr=udp://t", BASE32);
        assert_eq!(parse_magnet_hash(&magnet).as_deref(), Some(HEX));

        let magnet = format!("magnet:?xt=urn:btih:{}", BASE32.to_lowercase());
        assert_eq!(parse_magnet_hash(&magnet).as_deref(), Some(HEX));
    }

    #[test]
    fn test_invalid_magnets() {
        assert_eq!(parse_magnet_hash("not a magnet"), None);
        assert_eq!(parse_magnet_hash("magnet:?dn=Test"), None);
        assert_eq!(parse_magnet_hash("magnet:?xt=urn:btih:abc123"), None);
        assert_eq!(parse_magnet_hash("magnet:?xt=urn:btih:!!!!!!!!!!!!!!!!!!!!!!!!!!!!"), None);
    }

    #[test]
    fn test_base32_to_hex_short_input() {
        // 26 characters carry 130 bits: 32 full hex digits.
        let hex = base32_to_hex(&BASE32[..26]).unwrap();
        assert_eq!(hex.len(), 32);
        assert!(HEX.to_lowercase().starts_with(&hex));
    }
}
