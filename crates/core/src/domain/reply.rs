use serde::ser::{Serialize, SerializeMap, Serializer};

/// One ordered piece of a rendered assistant reply. A reply is a sequence of
/// these, alternating freely between text and inline images, in the order
/// they appeared in the completion.
///
/// Serialization is written by hand because the `type` tag of an opaque
/// segment is whatever the completion service produced, which rules out a
/// derived internally-tagged enum.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplySegment {
    Text { content: String },
    Image { url: String, alt: String },
    Opaque { kind: String, content: Option<String> },
}

impl ReplySegment {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text { content: content.into() }
    }

    pub fn image(url: impl Into<String>, alt: impl Into<String>) -> Self {
        Self::Image { url: url.into(), alt: alt.into() }
    }
}

impl Serialize for ReplySegment {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Text { content } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "text")?;
                map.serialize_entry("content", content)?;
                map.end()
            }
            Self::Image { url, alt } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("type", "image")?;
                map.serialize_entry("content", url)?;
                map.serialize_entry("alt", alt)?;
                map.end()
            }
            Self::Opaque { kind, content } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", kind)?;
                map.serialize_entry("content", content)?;
                map.end()
            }
        }
    }
}
