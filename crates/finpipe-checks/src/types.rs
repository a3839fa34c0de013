use std::collections::BTreeMap;
use std::fmt;

use finpipe_core::Category;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Gt,
    Ge,
    Eq,
    Le,
    Lt,
}

impl Comparator {
    pub fn holds(&self, observed: f64, threshold: f64) -> bool {
        match self {
            Comparator::Gt => observed > threshold,
            Comparator::Ge => observed >= threshold,
            Comparator::Eq => observed == threshold,
            Comparator::Le => observed <= threshold,
            Comparator::Lt => observed < threshold,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Eq => "==",
            Comparator::Le => "<=",
            Comparator::Lt => "<",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// What to observe when the rule's field comes back NULL.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fallback {
    /// `|coalesce(left, 0) - coalesce(right, 0)|`
    AbsDifference { left: String, right: String },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EvaluationRule {
    pub field: String,
    pub comparator: Comparator,
    pub threshold: f64,
    #[serde(default)]
    pub fallback: Option<Fallback>,
}

impl EvaluationRule {
    pub fn new(field: impl Into<String>, comparator: Comparator, threshold: f64) -> Self {
        Self {
            field: field.into(),
            comparator,
            threshold,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Fallback) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn expectation(&self) -> String {
        format!("{} {}", self.comparator, self.threshold)
    }
}

/// A registered check. Immutable once it is in a [`crate::Registry`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CheckDefinition {
    pub name: String,
    pub category: Category,
    /// SQL with `{placeholder}` parameters, rendered by [`CheckDefinition::render`].
    pub query_template: String,
    pub rule: EvaluationRule,
}

impl CheckDefinition {
    pub fn new(name: impl Into<String>, category: Category, query_template: impl Into<String>, rule: EvaluationRule) -> Self {
        Self {
            name: name.into(),
            category,
            query_template: query_template.into(),
            rule,
        }
    }

    pub fn render(&self, params: &QueryParams) -> String {
        params.apply(&self.query_template)
    }
}

/// Values substituted into query templates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryParams {
    values: BTreeMap<String, String>,
}

impl QueryParams {
    pub fn for_schema(schema: impl Into<String>) -> Self {
        let mut params = Self::default();
        params.set("schema", schema);
        params
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn apply(&self, template: &str) -> String {
        let mut sql = template.to_string();
        for (key, value) in &self.values {
            sql = sql.replace(&format!("{{{key}}}"), value);
        }
        sql
    }
}
