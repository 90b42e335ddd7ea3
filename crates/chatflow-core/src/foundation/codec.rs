//! Zero-width binary token codec.
//!
//! Reply keyboards and inline-query texts only carry plain text, so callback
//! ids are smuggled through them as invisible characters. An id is written in
//! binary, most significant bit first, using two zero-width code points as the
//! digits. [`embed`] frames the digits between two [`SEPARATOR`]s and places
//! the frame in front of the visible text:
//!
//! ```text
//! SEP 1 0 1 1 SEP Add ➕
//! ```
//!
//! The closing separator marks where the token ends, so visible text that
//! happens to start with one of the digit characters is never read as part of
//! the token.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::CodecError;
use crate::foundation::ids::COUNTER_CEILING;

/// Binary digit `0` (ZERO WIDTH NON-JOINER).
pub const ZERO: char = '\u{200C}';

/// Binary digit `1` (ZERO WIDTH SPACE).
pub const ONE: char = '\u{200B}';

/// Frame delimiter (ZERO WIDTH JOINER).
pub const SEPARATOR: char = '\u{200D}';

/// Longest frame [`embed`] produces for a counter id: 20 digits and two separators.
pub const MAX_FRAME_LEN: usize = COUNTER_CEILING.count_ones() as usize + 2;

static FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("^\u{200D}([\u{200B}\u{200C}]+)\u{200D}").expect("frame pattern is valid")
});

/// Encodes `id` as a string of zero-width digits.
pub fn encode(id: u64) -> String {
    format!("{id:b}")
        .chars()
        .map(|bit| if bit == '1' { ONE } else { ZERO })
        .collect()
}

/// Decodes a token produced by [`encode`]. Separators are ignored.
pub fn decode(token: &str) -> Result<u64, CodecError> {
    let mut value: u64 = 0;
    let mut digits = 0usize;

    for c in token.chars().filter(|c| *c != SEPARATOR) {
        let bit = match c {
            ZERO => 0,
            ONE => 1,
            _ => return Err(CodecError::malformed("character outside the token alphabet")),
        };
        if value >> 63 != 0 {
            return Err(CodecError::malformed("token exceeds 64 bits"));
        }
        value = (value << 1) | bit;
        digits += 1;
    }

    if digits == 0 {
        return Err(CodecError::malformed("empty token"));
    }
    Ok(value)
}

/// Prepends an invisible frame carrying `id` to `text`.
pub fn embed(text: &str, id: u64) -> String {
    let token = encode(id);
    let mut out = String::with_capacity(text.len() + (token.chars().count() + 2) * 3);
    out.push(SEPARATOR);
    out.push_str(&token);
    out.push(SEPARATOR);
    out.push_str(text);
    out
}

/// Splits a leading frame off `text`, returning the id and the visible rest.
pub fn split(text: &str) -> Option<(u64, &str)> {
    let captures = FRAME.captures(text)?;
    let frame = captures.get(0)?;
    let digits = captures.get(1)?;
    let id = decode(digits.as_str()).ok()?;
    Some((id, &text[frame.end()..]))
}

/// Returns the id embedded at the start of `text`, if any.
///
/// Most texts carry no token; absence is not an error.
pub fn extract(text: &str) -> Option<u64> {
    split(text).map(|(id, _)| id)
}

/// Returns `text` without its leading frame.
pub fn strip(text: &str) -> &str {
    split(text).map_or(text, |(_, rest)| rest)
}

/// Removes every codec character from `text`, yielding what a user sees.
pub fn visible(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(*c, ZERO | ONE | SEPARATOR))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_over_counter_range() {
        for n in 0..=u64::from(COUNTER_CEILING) {
            assert_eq!(decode(&encode(n)), Ok(n));
        }
        assert_eq!(decode(&encode(u64::MAX)), Ok(u64::MAX));
    }

    #[test]
    fn test_encode_is_msb_first() {
        assert_eq!(encode(0), ZERO.to_string());
        assert_eq!(encode(6), [ONE, ONE, ZERO].iter().collect::<String>());
        assert_eq!(encode(u64::from(COUNTER_CEILING)).chars().count(), 20);
    }

    #[test]
    fn test_decode_rejects_foreign_characters() {
        let mut token = encode(5);
        token.push('x');
        assert!(matches!(
            decode(&token),
            Err(CodecError::MalformedToken { .. })
        ));
        assert!(decode("").is_err());
        assert!(decode(&SEPARATOR.to_string()).is_err());

        let too_long: String = std::iter::repeat_n(ONE, 65).collect();
        assert!(decode(&too_long).is_err());
    }

    #[test]
    fn test_embed_is_invisible() {
        for text in ["", "Add ➕", "🗑 buy milk", "with\u{200B}inner"] {
            for id in [0, 1, 7, 100, u64::from(COUNTER_CEILING)] {
                let embedded = embed(text, id);
                assert_eq!(visible(&embedded), visible(text));
                assert_eq!(extract(&embedded), Some(id));
                assert_eq!(strip(&embedded), text);
            }
        }
    }

    #[test]
    fn test_extract_absent_token() {
        assert_eq!(extract("buy milk"), None);
        assert_eq!(extract(""), None);
        assert_eq!(strip("buy milk"), "buy milk");
        // Unterminated frame is not a token.
        let unterminated = format!("{SEPARATOR}{}rest", encode(3));
        assert_eq!(extract(&unterminated), None);
    }

    #[test]
    fn test_visible_text_starting_with_digit_characters() {
        let text = format!("{ONE}{ZERO}label");
        let embedded = embed(&text, 9);
        assert_eq!(split(&embedded), Some((9, text.as_str())));
    }

    #[test]
    fn test_max_frame_len() {
        let embedded = embed("", u64::from(COUNTER_CEILING));
        assert_eq!(embedded.chars().count(), MAX_FRAME_LEN);
    }
}
