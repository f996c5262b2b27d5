use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Platforms disagree on id fields: `id_str` when present, else `id` as
/// either a string or a number.
fn pick_id(id_str: Option<String>, id: Option<Value>) -> Option<String> {
    id_str.or_else(|| match id {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Deserialize)]
struct RawProfile {
    id_str: Option<String>,
    id: Option<Value>,
    handle: Option<String>,
    screen_name: Option<String>,
    username: Option<String>,
    display_name: Option<String>,
    name: Option<String>,
}

/// The account a session is currently authenticated as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawProfile")]
pub struct Profile {
    pub id: String,
    pub handle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl TryFrom<RawProfile> for Profile {
    type Error = String;

    fn try_from(raw: RawProfile) -> Result<Self, Self::Error> {
        let handle = raw
            .handle
            .or(raw.screen_name)
            .or(raw.username)
            .ok_or_else(|| "profile has no handle".to_string())?;
        Ok(Profile {
            id: pick_id(raw.id_str, raw.id).unwrap_or_default(),
            handle,
            display_name: raw.display_name.or(raw.name),
        })
    }
}

/// Success payload returned by the platform for a new post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostResult(pub Value);

impl PostResult {
    /// Id of the created post, if the payload carries one in a common shape.
    pub fn id(&self) -> Option<String> {
        ["id_str", "id", "rest_id"].iter().find_map(|field| match self.0.get(field) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }
}

#[derive(Deserialize)]
struct RawPostSummary {
    id_str: Option<String>,
    id: Option<Value>,
    full_text: Option<String>,
    text: Option<String>,
    created_at: Option<String>,
    reply_to: Option<String>,
    in_reply_to_status_id_str: Option<String>,
    in_reply_to_screen_name: Option<String>,
    retweet_count: Option<u64>,
    favorite_count: Option<u64>,
    reply_count: Option<u64>,
    is_retweet: Option<bool>,
    retweeted_status: Option<Value>,
}

/// One recent post on an account's timeline.
///
/// Counters are only present when the platform reports them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPostSummary")]
pub struct PostSummary {
    pub id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to_screen_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retweet_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favorite_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_retweet: Option<bool>,
}

impl TryFrom<RawPostSummary> for PostSummary {
    type Error = String;

    fn try_from(raw: RawPostSummary) -> Result<Self, Self::Error> {
        Ok(PostSummary {
            id: pick_id(raw.id_str, raw.id).ok_or_else(|| "post has no id".to_string())?,
            // Long posts only carry their untruncated text in `full_text`.
            text: raw.full_text.or(raw.text).unwrap_or_default(),
            created_at: raw.created_at,
            reply_to: raw.reply_to.or(raw.in_reply_to_status_id_str),
            in_reply_to_screen_name: raw.in_reply_to_screen_name,
            retweet_count: raw.retweet_count,
            favorite_count: raw.favorite_count,
            reply_count: raw.reply_count,
            // Timeline entries mark reposts by embedding the original.
            is_retweet: raw.is_retweet.or(raw.retweeted_status.map(|_| true)),
        })
    }
}
