// Comment field mapping
//
// Maps comment-header keys onto the metadata fields reported to the consumer.
// Keys are matched case-insensitively; anything unrecognised is ignored.

use crate::codec::StreamMetadata;

/// Metadata fields carried in `StreamMetadata`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardField {
    Title,
    Artist,
    Album,
    Date,
    Track,
}

impl StandardField {
    /// Slot for this field in `metadata`
    pub fn slot<'m>(&self, metadata: &'m mut StreamMetadata) -> &'m mut Option<String> {
        match self {
            StandardField::Title => &mut metadata.title,
            StandardField::Artist => &mut metadata.artist,
            StandardField::Album => &mut metadata.album,
            StandardField::Date => &mut metadata.date,
            StandardField::Track => &mut metadata.track,
        }
    }
}

/// Comment-header key conventions
pub struct FieldMappings;

impl FieldMappings {
    pub const VORBIS_TITLE: &'static str = "TITLE";
    pub const VORBIS_ARTIST: &'static str = "ARTIST";
    pub const VORBIS_ALBUM: &'static str = "ALBUM";
    pub const VORBIS_DATE: &'static str = "DATE";
    pub const VORBIS_TRACK: &'static str = "TRACKNUMBER";

    /// Convert a comment key to a standard field
    pub fn from_vorbis(key: &str) -> Option<StandardField> {
        match key.to_uppercase().as_str() {
            Self::VORBIS_TITLE => Some(StandardField::Title),
            Self::VORBIS_ARTIST => Some(StandardField::Artist),
            Self::VORBIS_ALBUM => Some(StandardField::Album),
            Self::VORBIS_DATE | "YEAR" => Some(StandardField::Date),
            Self::VORBIS_TRACK | "TRACK" => Some(StandardField::Track),
            _ => None,
        }
    }

    /// Copy recognised comments into `metadata`.
    ///
    /// The first occurrence of a key wins. Values are expected to be
    /// truncated already.
    pub fn apply(comments: &[(String, String)], metadata: &mut StreamMetadata) {
        for (key, value) in comments {
            if let Some(field) = Self::from_vorbis(key) {
                let slot = field.slot(metadata);
                if slot.is_none() {
                    *slot = Some(value.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_mapping() {
        assert_eq!(FieldMappings::from_vorbis("title"), Some(StandardField::Title));
        assert_eq!(FieldMappings::from_vorbis("TrackNumber"), Some(StandardField::Track));
        assert_eq!(FieldMappings::from_vorbis("track"), Some(StandardField::Track));
        assert_eq!(FieldMappings::from_vorbis("GENRE"), None);
        assert_eq!(FieldMappings::from_vorbis("Year"), Some(StandardField::Date));
    }

    #[test]
    fn test_apply_keeps_first_value() {
        let comments = vec![
            ("ARTIST".to_string(), "First".to_string()),
            ("artist".to_string(), "Second".to_string()),
            ("Date".to_string(), "1999".to_string()),
            ("ENCODER".to_string(), "x".to_string()),
        ];
        let mut metadata = StreamMetadata::default();
        FieldMappings::apply(&comments, &mut metadata);
        assert_eq!(metadata.artist.as_deref(), Some("First"));
        assert_eq!(metadata.date.as_deref(), Some("1999"));
        assert_eq!(metadata.title, None);
    }
}
