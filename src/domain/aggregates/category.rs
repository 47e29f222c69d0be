//! Category Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
pub struct CategoryInput {
    #[validate(length(min = 1, max = 80, message = "name is required (max 80 characters)"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 300))]
    pub description: Option<String>,
}

impl CategoryInput {
    pub fn new(name: impl Into<String>) -> Self { Self { name: name.into(), description: None } }

    pub fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.description = self.description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty());
        self
    }
}

/// Case-insensitive lookup, the way the catalog import resolves category names.
pub fn find_by_name<'a>(categories: &'a [Category], name: &str) -> Option<&'a Category> {
    let name = name.trim();
    categories.iter().find(|c| c.name.trim().eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_find_by_name_ignores_case() {
        let cats = vec![Category { id: Uuid::new_v4(), name: "Jeans".into(), description: None, created_at: Utc::now() }];
        assert!(find_by_name(&cats, " jeans").is_some());
        assert!(find_by_name(&cats, "shirts").is_none());
    }
    #[test]
    fn test_category_input_requires_name() {
        assert!(CategoryInput::new("  ").normalized().validate().is_err());
        assert!(CategoryInput::new("Dresses").validate().is_ok());
    }
}
