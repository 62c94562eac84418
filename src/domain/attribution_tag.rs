use unicode_segmentation::UnicodeSegmentation;

const MAX_CHAR_LENGTH: usize = 128;
const FORBIDDEN_CHARS: [char; 9] = ['/', '{', '}', '"', '>', '<', '\\', '(', ')'];

/// Free-form marketing attribution (`source`, `utm_*`) supplied by the signup form.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AttributionTag(String);

impl AttributionTag {
    pub fn parse(tag: String) -> Result<AttributionTag, String> {
        let tag = tag.trim().to_string();
        let is_empty = tag.is_empty();
        let is_too_long = tag.graphemes(true).count() > MAX_CHAR_LENGTH;
        let contains_forbidden_chars = tag.chars().any(|char| FORBIDDEN_CHARS.contains(&char));

        if is_empty || is_too_long || contains_forbidden_chars {
            return Err(format!("{} is not a valid attribution tag", tag));
        }

        Ok(Self(tag))
    }

    /// Parses an optional field, treating blank input as absent.
    pub fn parse_optional(tag: Option<String>) -> Result<Option<AttributionTag>, String> {
        match tag {
            Some(tag) if !tag.trim().is_empty() => AttributionTag::parse(tag).map(Some),
            _ => Ok(None),
        }
    }
}

impl AsRef<str> for AttributionTag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::AttributionTag;
    use claim::{assert_err, assert_none, assert_ok};

    #[test]
    fn tag_of_128_chars_is_valid() {
        let tag = "a".repeat(128);

        assert_ok!(AttributionTag::parse(tag));
    }

    #[test]
    fn tag_longer_than_128_chars_is_invalid() {
        let tag = "a".repeat(129);

        assert_err!(AttributionTag::parse(tag));
    }

    #[test]
    fn tag_with_markup_is_invalid() {
        assert_err!(AttributionTag::parse(String::from("<script>")));
    }

    #[test]
    fn blank_optional_tag_is_absent() {
        let parsed = AttributionTag::parse_optional(Some(String::from("   "))).unwrap();

        assert_none!(parsed);
    }

    #[test]
    fn tag_valid() {
        assert_ok!(AttributionTag::parse(String::from("landing-page")));
    }
}
