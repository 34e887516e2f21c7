//! `Accept` header negotiation.
//!
//! Media ranges are ranked by their `q` parameter (default 1.0, ties keep
//! header order). Wildcard ranges never select a language. When nothing in
//! the header names a supported language the default language is used.

use super::Language;

/// A single media range from an `Accept` header.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRange {
    pub media_type: String,
    pub quality: f32,
}

/// Parse an `Accept` header into media ranges, highest quality first.
pub fn parse_accept(header: &str) -> Vec<MediaRange> {
    let mut ranges: Vec<MediaRange> = header
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split(';');
            let media_type = parts.next()?.trim().to_ascii_lowercase();
            if media_type.is_empty() {
                return None;
            }

            let quality = parts
                .find_map(|param| {
                    let (key, value) = param.split_once('=')?;
                    if key.trim().eq_ignore_ascii_case("q") {
                        value.trim().parse::<f32>().ok()
                    } else {
                        None
                    }
                })
                .unwrap_or(1.0);

            Some(MediaRange { media_type, quality })
        })
        .collect();

    // Stable sort keeps header order among equal qualities.
    ranges.sort_by(|a, b| b.quality.total_cmp(&a.quality));
    ranges
}

/// Pick the response language for an optional `Accept` header.
pub fn negotiate(accept: Option<&str>) -> Language {
    let Some(header) = accept else {
        return Language::DEFAULT;
    };

    parse_accept(header)
        .into_iter()
        .filter(|range| range.quality > 0.0 && !range.media_type.contains('*'))
        .find_map(|range| Language::from_mime_type(&range.media_type))
        .unwrap_or(Language::DEFAULT)
}

/// Whether the header explicitly prefers the given media type over every
/// RDF language.
pub fn prefers(accept: Option<&str>, media_type: &str) -> bool {
    let Some(header) = accept else {
        return false;
    };

    parse_accept(header)
        .into_iter()
        .filter(|range| range.quality > 0.0 && !range.media_type.contains('*'))
        .find(|range| {
            range.media_type == media_type || Language::from_mime_type(&range.media_type).is_some()
        })
        .is_some_and(|range| range.media_type == media_type)
}
