use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A single search hit. Only the fields the outreach pipeline reads are kept.
#[derive(Debug, Clone, Deserialize)]
pub struct Listing {
    #[serde(deserialize_with = "listing_id")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub price: f64,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Listing {
    /// `is_gently_used` → `gently used`.
    pub fn condition_label(&self) -> String {
        let raw = self.condition.as_deref().unwrap_or("").trim();
        let stripped = raw.strip_prefix("is_").unwrap_or(raw);
        let label = stripped.replace('_', " ");
        if label.trim().is_empty() {
            "unspecified".to_string()
        } else {
            label
        }
    }

    pub fn description_or_placeholder(&self) -> &str {
        self.description
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or("Not provided")
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawListingId {
    Text(String),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
}

fn listing_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let id = match RawListingId::deserialize(deserializer)? {
        RawListingId::Text(value) => value,
        RawListingId::Unsigned(value) => value.to_string(),
        RawListingId::Signed(value) => value.to_string(),
        RawListingId::Float(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
            (value as i64).to_string()
        }
        RawListingId::Float(value) => value.to_string(),
    };
    if id.trim().is_empty() {
        return Err(serde::de::Error::custom("empty listing id"));
    }
    Ok(id)
}

/// Reads `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Cookie/CSRF/device-id triple used for authenticated marketplace calls.
///
/// Stored under the `AUTH` block of the configuration file and rewritten
/// whenever the session is refreshed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCredentials {
    #[serde(default)]
    pub cookie: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csrf: Option<String>,
    #[serde(default)]
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl SessionCredentials {
    pub fn csrf_token(&self) -> Option<&str> {
        self.csrf
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    pub fn is_usable(&self) -> bool {
        self.csrf_token().is_some()
    }
}
