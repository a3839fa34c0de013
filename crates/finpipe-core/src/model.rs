use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Check categories, declared in execution order.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Existence,
    Integrity,
    Quality,
    Reconciliation,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Existence,
        Category::Integrity,
        Category::Quality,
        Category::Reconciliation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Existence => "existence",
            Category::Integrity => "integrity",
            Category::Quality => "quality",
            Category::Reconciliation => "reconciliation",
        }
    }

    /// Critical categories decide the overall verdict. Quality only warns.
    pub fn is_critical(&self) -> bool {
        !matches!(self, Category::Quality)
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
        match s.trim().to_ascii_lowercase().as_str() {
            "existence" | "counts" => Ok(Category::Existence),
            "integrity" => Ok(Category::Integrity),
            "quality" => Ok(Category::Quality),
            "reconciliation" | "consistency" => Ok(Category::Reconciliation),
            other => Err(format!("unknown check category: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckStatus::Pass => f.write_str("PASS"),
            CheckStatus::Warn => f.write_str("WARN"),
            CheckStatus::Fail => f.write_str("FAIL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_are_ordered_for_execution() {
        let mut shuffled = vec![
            Category::Reconciliation,
            Category::Existence,
            Category::Quality,
            Category::Integrity,
        ];
        shuffled.sort();
        assert_eq!(shuffled, Category::ALL.to_vec());
    }

    #[test]
    fn only_quality_is_advisory() {
        assert!(Category::Existence.is_critical());
        assert!(Category::Integrity.is_critical());
        assert!(Category::Reconciliation.is_critical());
        assert!(!Category::Quality.is_critical());
    }

    #[test]
    fn parses_category_names() {
        assert_eq!("integrity".parse::<Category>().unwrap(), Category::Integrity);
        assert_eq!(" Quality ".parse::<Category>().unwrap(), Category::Quality);
        assert_eq!("consistency".parse::<Category>().unwrap(), Category::Reconciliation);
        assert!("freshness".parse::<Category>().is_err());
    }
}
