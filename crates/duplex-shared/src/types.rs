use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// User identity, assigned by the external auth layer.  Opaque to this core:
// nothing here ever inspects it beyond equality and ordering.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Body of a message as submitted by the sender.
///
/// Text and image may both be present; a message with neither is rejected
/// before it ever reaches the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageContent {
    /// Plain text body.
    pub text: Option<String>,
    /// Image payload as a data URL (the upload path hands us the encoded
    /// form; the core treats it as an opaque string).
    pub image: Option<String>,
}

impl MessageContent {
    pub fn text(s: impl Into<String>) -> Self {
        Self {
            text: Some(s.into()),
            image: None,
        }
    }

    pub fn image(s: impl Into<String>) -> Self {
        Self {
            text: None,
            image: Some(s.into()),
        }
    }

    /// True when the content carries neither text nor image.
    ///
    /// Only an absent or empty-string field counts as missing; whitespace
    /// is a valid text body.
    pub fn is_empty(&self) -> bool {
        let has_text = self.text.as_deref().is_some_and(|t| !t.is_empty());
        let has_image = self.image.as_deref().is_some_and(|i| !i.is_empty());
        !has_text && !has_image
    }
}

/// A single direct message between two users.
///
/// `seen` is the only mutable field and only ever flips `false -> true`,
/// through the store's mark-seen path.  Everything else is fixed at
/// persistence time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message identifier (UUID v4, assigned by the store).
    pub id: Uuid,
    /// Who sent it.
    pub sender_id: UserId,
    /// Who it is addressed to.
    pub recipient_id: UserId,
    /// Optional text body.
    pub text: Option<String>,
    /// Optional image payload (data URL).
    pub image: Option<String>,
    /// Timestamp assigned when the record was persisted.
    pub created_at: DateTime<Utc>,
    /// Whether the recipient has seen the message.
    pub seen: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_content_detected() {
        assert!(MessageContent::default().is_empty());
        assert!(MessageContent::text("").is_empty());
        assert!(!MessageContent::text("hi").is_empty());
        assert!(!MessageContent::image("data:image/png;base64,AAAA").is_empty());
    }

    #[test]
    fn whitespace_only_text_is_present() {
        assert!(!MessageContent::text("   ").is_empty());
    }

    #[test]
    fn text_and_image_together_is_valid() {
        let content = MessageContent {
            text: Some("look".into()),
            image: Some("data:image/png;base64,AAAA".into()),
        };
        assert!(!content.is_empty());
    }

    #[test]
    fn user_id_round_trips_through_display() {
        let id = UserId::new();
        assert_eq!(UserId::parse(&id.to_string()).unwrap(), id);
    }
}
