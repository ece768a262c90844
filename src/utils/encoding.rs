// Encoding utilities

use encoding_rs::{UTF_8, WINDOWS_1252};

/// Decode comment text.
///
/// Comment fields are UTF-8 by definition, but some taggers write Latin-1.
/// Anything that is not valid UTF-8 is read as Windows-1252.
pub fn decode_comment_text(data: &[u8]) -> String {
    match UTF_8.decode_without_bom_handling_and_without_replacement(data) {
        Some(text) => text.into_owned(),
        None => WINDOWS_1252.decode(data).0.into_owned(),
    }
}

/// Keep at most `max_chars` characters of `text`
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}
