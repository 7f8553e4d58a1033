//! Media discovery: turn raw located elements into complete records.
//!
//! Locating media in a document is pluggable and happens elsewhere; this
//! module only validates what the locator extracted. Initial scans and
//! incremental mutations both flow through [`extract_batch`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A media element as reported by a locator. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaElement {
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub original_filename: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// A media element with every required field present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredMedia {
    pub hash: String,
    pub original_filename: String,
    pub current_filename: String,
    pub source_url: String,
}

/// The first required field an element was missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MissingField {
    #[error("missing hash")]
    Hash,
    #[error("missing original filename")]
    OriginalFilename,
    #[error("missing filename")]
    Filename,
    #[error("missing source url")]
    Url,
}

fn present(field: Option<String>) -> Option<String> {
    field.filter(|v| !v.is_empty())
}

impl TryFrom<MediaElement> for DiscoveredMedia {
    type Error = MissingField;

    fn try_from(element: MediaElement) -> Result<Self, Self::Error> {
        Ok(Self {
            hash: present(element.hash).ok_or(MissingField::Hash)?,
            original_filename: present(element.original_filename)
                .ok_or(MissingField::OriginalFilename)?,
            current_filename: present(element.filename).ok_or(MissingField::Filename)?,
            source_url: present(element.url).ok_or(MissingField::Url)?,
        })
    }
}

/// Split a batch into complete media and the reasons incomplete elements
/// were skipped. Order of the complete media is preserved.
pub fn extract_batch(
    elements: impl IntoIterator<Item = MediaElement>,
) -> (Vec<DiscoveredMedia>, Vec<(MediaElement, MissingField)>) {
    let mut found = Vec::new();
    let mut skipped = Vec::new();
    for element in elements {
        match DiscoveredMedia::try_from(element.clone()) {
            Ok(media) => found.push(media),
            Err(missing) => skipped.push((element, missing)),
        }
    }
    (found, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(hash: &str, original: &str, filename: &str, url: &str) -> MediaElement {
        let opt = |s: &str| (!s.is_empty()).then(|| s.to_string());
        MediaElement {
            hash: opt(hash),
            original_filename: opt(original),
            filename: opt(filename),
            url: opt(url),
        }
    }

    #[test]
    fn complete_element_is_extracted() {
        let media =
            DiscoveredMedia::try_from(element("abc123", "cat.png", "1699.png", "https://i/1699.png"))
                .unwrap();
        assert_eq!(media.hash, "abc123");
        assert_eq!(media.original_filename, "cat.png");
        assert_eq!(media.current_filename, "1699.png");
        assert_eq!(media.source_url, "https://i/1699.png");
    }

    #[test]
    fn each_missing_field_is_reported() {
        assert_eq!(
            DiscoveredMedia::try_from(element("", "a", "b", "c")),
            Err(MissingField::Hash)
        );
        assert_eq!(
            DiscoveredMedia::try_from(element("h", "", "b", "c")),
            Err(MissingField::OriginalFilename)
        );
        assert_eq!(
            DiscoveredMedia::try_from(element("h", "a", "", "c")),
            Err(MissingField::Filename)
        );
        assert_eq!(
            DiscoveredMedia::try_from(element("h", "a", "b", "")),
            Err(MissingField::Url)
        );
    }

    #[test]
    fn batch_keeps_order_and_skips_incomplete() {
        let (found, skipped) = extract_batch(vec![
            element("h1", "a", "b", "u"),
            element("", "a", "b", "u"),
            element("h2", "a", "b", "u"),
        ]);
        let hashes: Vec<_> = found.iter().map(|m| m.hash.as_str()).collect();
        assert_eq!(hashes, ["h1", "h2"]);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].1, MissingField::Hash);
    }

    #[test]
    fn element_parses_with_absent_fields() {
        let el: MediaElement = serde_json::from_str(r#"{"hash":"abc"}"#).unwrap();
        assert_eq!(el.hash.as_deref(), Some("abc"));
        assert!(el.url.is_none());
    }
}
