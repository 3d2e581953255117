use serde::{ Deserialize, Serialize };
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use chrono::{ DateTime, Utc };

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseRoleError {
    message: String,
}

impl fmt::Display for ParseRoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseRoleError {}

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            _ =>
                Err(ParseRoleError {
                    message: format!("Invalid role: '{}' (expected user, assistant or system)", s),
                }),
        }
    }
}

/// Creation time as a `(seconds, nanoseconds)` pair, serialized in the
/// Firestore `{_seconds, _nanoseconds}` shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Timestamp {
    #[serde(rename = "_seconds")]
    pub seconds: i64,
    #[serde(rename = "_nanoseconds")]
    pub nanos: u32,
}

impl Timestamp {
    pub fn new(seconds: i64, nanos: u32) -> Self {
        Self { seconds, nanos }
    }

    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self {
            seconds: dt.timestamp(),
            nanos: dt.timestamp_subsec_nanos(),
        }
    }
}

/// Every timestamp shape seen from the store or the cache.
#[derive(Deserialize)]
#[serde(untagged)]
enum TimestampRepr {
    Structured {
        #[serde(rename = "_seconds", alias = "seconds")]
        seconds: i64,
        #[serde(rename = "_nanoseconds", alias = "nanoseconds", alias = "nanos", default)]
        nanos: u32,
    },
    Seconds(i64),
    Text(String),
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where D: serde::Deserializer<'de>
    {
        match TimestampRepr::deserialize(deserializer)? {
            TimestampRepr::Structured { seconds, nanos } => Ok(Timestamp::new(seconds, nanos)),
            TimestampRepr::Seconds(seconds) => Ok(Timestamp::new(seconds, 0)),
            TimestampRepr::Text(text) =>
                DateTime::parse_from_rfc3339(&text)
                    .map(|dt| Timestamp::from_datetime(dt.with_timezone(&Utc)))
                    .map_err(serde::de::Error::custom),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    #[serde(default)]
    pub id: Option<String>,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
}

impl Turn {
    /// Stable newest-first ordering. Turns without a timestamp sort last and
    /// equal timestamps keep their relative order.
    pub fn sort_newest_first(turns: &mut [Turn]) {
        turns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }
}

/// A turn as returned by the authoritative store, before normalization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTurn {
    #[serde(default)]
    pub id: Option<JsonValue>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    #[serde(default)]
    pub created_at_seconds: Option<i64>,
    #[serde(default)]
    pub created_at_nanos: Option<u32>,
}

impl RawTurn {
    /// Returns `None` when the record has no usable role or content.
    pub fn normalize(self) -> Option<Turn> {
        let role = self.role?.parse::<Role>().ok()?;
        let content = self.content?;
        let id = match self.id {
            Some(JsonValue::String(s)) => Some(s),
            Some(JsonValue::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let created_at = self.created_at.or_else(|| {
            self.created_at_seconds.map(|secs| Timestamp::new(secs, self.created_at_nanos.unwrap_or(0)))
        });
        Some(Turn { id, role, content, created_at })
    }
}

/// A value read back from the cache backend: either serialized text or an
/// already-decoded structure. Resolved once by [`RawValue::decode`].
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Text(String),
    Structured(JsonValue),
}

impl RawValue {
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        match self {
            RawValue::Text(text) => serde_json::from_str(&text),
            RawValue::Structured(value) => serde_json::from_value(value),
        }
    }
}
