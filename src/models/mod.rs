//! Data models for scraped product records and session cookies

use serde::{Deserialize, Serialize, Serializer};

/// Literal used in place of any value that could not be read.
pub const SENTINEL: &str = "N/A";

/// A value read from a page, or the marker that it was not available.
#[derive(Debug, Clone, PartialEq)]
pub enum Field<T> {
    Value(T),
    Unavailable,
}

impl<T> Field<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            Self::Unavailable => None,
        }
    }
}

impl Field<String> {
    /// Treats empty or whitespace-only text as unavailable.
    pub fn non_empty(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            Self::Unavailable
        } else {
            Self::Value(text.to_string())
        }
    }
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Self::Unavailable
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Unavailable, Self::Value)
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Value(v) => v.serialize(serializer),
            Self::Unavailable => serializer.serialize_str(SENTINEL),
        }
    }
}

/// A product listing scraped from the shopping results page
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProductRecord {
    pub title: Field<String>,
    pub price: Field<String>,
    pub link: Field<String>,
    pub image: Field<String>,
    pub rating: Field<f64>,
    pub review_count: Field<i64>,
    pub description: Field<String>,
}

/// One entry of a browser cookie export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserCookie {
    #[serde(alias = "key", default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    /// Seconds since the epoch; negative or absent for session cookies
    #[serde(alias = "expirationDate", default)]
    pub expires: Option<f64>,
    #[serde(default)]
    pub same_site: Option<String>,
}
