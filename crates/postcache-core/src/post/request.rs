use crate::error::PostError;

/// The message to publish, optionally as a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRequest {
    text: String,
    reply_to: Option<String>,
}

impl PostRequest {
    /// Blank messages are rejected before any network or storage work.
    pub fn new(text: impl Into<String>) -> Result<Self, PostError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(PostError::InvalidRequest("message text is empty".to_string()));
        }
        Ok(Self { text, reply_to: None })
    }

    pub fn in_reply_to(mut self, post_id: impl Into<String>) -> Self {
        let id = post_id.into();
        let id = id.trim();
        self.reply_to = (!id.is_empty()).then(|| id.to_string());
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn reply_to(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }
}
