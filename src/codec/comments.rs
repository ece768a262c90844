// Comment header framing
//
// Shared by Vorbis ("\x03vorbis") and Opus ("OpusTags") after the magic:
// - Vendor length (u32 LE) + vendor string
// - Comment count (u32 LE)
// - For each comment: length (u32 LE) + "KEY=value"
//
// Damaged framing never fails the stream. Whatever was read before the
// damage is kept and the rest is dropped.

use tracing::warn;

use crate::codec::StreamMetadata;
use crate::field_mapping::FieldMappings;
use crate::utils::encoding::{decode_comment_text, truncate_chars};
use crate::utils::io::ByteReader;

/// Parsed comment header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentHeader {
    pub vendor: String,
    pub comments: Vec<(String, String)>,
    /// Description of the framing problem that stopped parsing, if any
    pub malformed: Option<String>,
}

impl CommentHeader {
    /// Parse the comment block, truncating every value to `max_len` characters
    pub fn parse(data: &[u8], max_len: usize) -> Self {
        let mut header = CommentHeader::default();
        if let Err(reason) = header.read(&mut ByteReader::new(data), max_len) {
            header.malformed = Some(reason);
        }
        header
    }

    fn read(&mut self, reader: &mut ByteReader<'_>, max_len: usize) -> Result<(), String> {
        let vendor = read_string(reader).ok_or("vendor string overruns packet")?;
        self.vendor = truncate_chars(&decode_comment_text(vendor), max_len);

        let count = reader.read_le_u32().ok_or("comment count missing")?;
        for index in 0..count {
            let raw = read_string(reader)
                .ok_or_else(|| format!("comment {} of {} overruns packet", index + 1, count))?;
            let text = decode_comment_text(raw);
            if let Some((key, value)) = text.split_once('=') {
                self.comments
                    .push((key.to_string(), truncate_chars(value, max_len)));
            }
        }
        Ok(())
    }

    /// Copy vendor and recognised fields into `metadata`
    pub fn apply_to(&self, metadata: &mut StreamMetadata) {
        metadata.vendor = self.vendor.clone();
        FieldMappings::apply(&self.comments, metadata);
        if let Some(reason) = &self.malformed {
            warn!("malformed comment header: {}", reason);
        }
    }

    /// Get a comment value by field name
    pub fn get(&self, field: &str) -> Option<&str> {
        self.comments
            .iter()
            .find(|(f, _)| f.eq_ignore_ascii_case(field))
            .map(|(_, v)| v.as_str())
    }
}

fn read_string<'a>(reader: &mut ByteReader<'a>) -> Option<&'a [u8]> {
    let len = reader.read_le_u32()? as usize;
    reader.take(len)
}
