use serde::{Deserialize, Deserializer, Serialize};

/// Reply for invocations from outside the admin category.
pub const ACCESS_DENIED: &str =
    "❌ This command can only be used in channels under the admin category.";

/// Where an invocation came from, as reported by the chat adapter.
///
/// Chat ids are 64-bit snowflakes; adapters written in JavaScript send them
/// as strings, so both forms are accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationContext {
    #[serde(default, deserialize_with = "snowflake")]
    pub guild_id: Option<u64>,
    #[serde(default, deserialize_with = "snowflake")]
    pub channel_id: Option<u64>,
    #[serde(default, deserialize_with = "snowflake")]
    pub category_id: Option<u64>,
    #[serde(default)]
    pub user: Option<String>,
}

impl InvocationContext {
    pub fn in_category(category_id: u64) -> Self {
        Self {
            category_id: Some(category_id),
            ..Default::default()
        }
    }
}

/// Single-category allow-list in front of every command.
#[derive(Debug, Clone, Copy)]
pub struct AccessGate {
    admin_category_id: u64,
}

impl AccessGate {
    pub fn new(admin_category_id: u64) -> Self {
        Self { admin_category_id }
    }

    /// `None` permits; `Some(message)` is the denial to send back.
    /// A missing category never matches.
    pub fn check(&self, ctx: &InvocationContext) -> Option<&'static str> {
        match ctx.category_id {
            Some(id) if id == self.admin_category_id => None,
            _ => Some(ACCESS_DENIED),
        }
    }
}

fn snowflake<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Str(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Num(id)) => Ok(Some(id)),
        Some(Raw::Str(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid snowflake {s:?}"))),
    }
}
