//! Listing rows as the feed sees them.
//!
//! The backend stores listings in a relational table; the feed only ever reads
//! a narrow projection ([`ListingSummary`]), while the detail view reads the
//! full row ([`Listing`]). Decoding is lenient about representation (ids may be
//! integers or uuids, prices may arrive as numeric strings) but strict about
//! meaning: a negative or non-finite price makes the row malformed.

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque listing identifier, stable across fetches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ListingId(String);

impl ListingId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ListingId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Integer(i64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) if s.trim().is_empty() => Err(de::Error::custom("empty listing id")),
            Raw::Text(s) => Ok(ListingId(s)),
            Raw::Integer(n) => Ok(ListingId(n.to_string())),
        }
    }
}

// ============================================================================
// Category
// ============================================================================

/// Category tag attached to a listing. Unknown tags decode as [`Category::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Electronics,
    Fashion,
    Home,
    Books,
    Sports,
    Vehicles,
    #[serde(other)]
    Other,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Electronics,
        Category::Fashion,
        Category::Home,
        Category::Books,
        Category::Sports,
        Category::Vehicles,
        Category::Other,
    ];

    /// Wire name, as stored in the `category` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Electronics => "electronics",
            Category::Fashion => "fashion",
            Category::Home => "home",
            Category::Books => "books",
            Category::Sports => "sports",
            Category::Vehicles => "vehicles",
            Category::Other => "other",
        }
    }

    /// Next filter in the cycle `None → Electronics → … → Other → None`.
    pub fn cycle(current: Option<Category>) -> Option<Category> {
        match current {
            None => Some(Self::ALL[0]),
            Some(c) => {
                let idx = Self::ALL.iter().position(|&x| x == c).unwrap_or(0);
                Self::ALL.get(idx + 1).copied()
            }
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|c| c.as_str()).collect();
                format!("unknown category '{}' (expected one of: {})", s, known.join(", "))
            })
    }
}

// ============================================================================
// Rows
// ============================================================================

/// Read-only projection of a listing used by the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingSummary {
    pub id: ListingId,
    pub title: String,
    #[serde(deserialize_with = "deserialize_price")]
    pub price: f64,
    #[serde(default)]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub category: Option<Category>,
}

impl ListingSummary {
    /// Price formatted for display, e.g. `$12.50`.
    pub fn display_price(&self) -> String {
        format!("${:.2}", self.price)
    }
}

/// Full listing row, as shown by the detail view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    #[serde(flatten)]
    pub summary: ListingSummary,
    #[serde(default)]
    pub description: Option<String>,
    /// Seller's user id.
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Server-side filter applied to every page fetch of a feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingFilter {
    pub category: Option<Category>,
    /// Restrict to one seller (the "my listings" feed).
    pub seller: Option<String>,
}

impl ListingFilter {
    /// Market feed, optionally narrowed to one category.
    pub fn category(category: Option<Category>) -> Self {
        Self {
            category,
            seller: None,
        }
    }

    pub fn seller(user_id: impl Into<String>) -> Self {
        Self {
            category: None,
            seller: Some(user_id.into()),
        }
    }
}

fn deserialize_price<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    let value = match Raw::deserialize(deserializer)? {
        Raw::Number(n) => n,
        Raw::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| de::Error::custom(format!("invalid price '{}'", s)))?,
    };

    if !value.is_finite() || value < 0.0 {
        return Err(de::Error::custom(format!(
            "price must be a non-negative number, got {}",
            value
        )));
    }
    Ok(value)
}
