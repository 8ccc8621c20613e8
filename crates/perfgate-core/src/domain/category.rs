//! Measurement categories.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A quality category the measurement engine scores.
///
/// The four builtin categories serialize to their conventional names
/// (`performance`, `accessibility`, `best-practices`, `seo`); any other string
/// is kept verbatim as a user-defined category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Performance,
    Accessibility,
    BestPractices,
    Seo,
    Custom(String),
}

impl Category {
    /// The builtin categories, in report order.
    pub const BUILTIN: [Category; 4] = [
        Category::Performance,
        Category::Accessibility,
        Category::BestPractices,
        Category::Seo,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Category::Performance => "performance",
            Category::Accessibility => "accessibility",
            Category::BestPractices => "best-practices",
            Category::Seo => "seo",
            Category::Custom(name) => name,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Category::Custom(_))
    }
}

impl From<&str> for Category {
    fn from(s: &str) -> Self {
        match s {
            "performance" => Category::Performance,
            "accessibility" => Category::Accessibility,
            "best-practices" => Category::BestPractices,
            "seo" => Category::Seo,
            other => Category::Custom(other.to_string()),
        }
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        match Category::from(s.as_str()) {
            Category::Custom(_) => Category::Custom(s),
            builtin => builtin,
        }
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        match c {
            Category::Custom(name) => name,
            builtin => builtin.as_str().to_string(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}
