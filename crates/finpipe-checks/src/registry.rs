use std::collections::{BTreeMap, HashSet};

use finpipe_core::Category;
use thiserror::Error;

use crate::schema::WarehouseSchema;
use crate::types::{CheckDefinition, Comparator, EvaluationRule, Fallback, QueryParams};

pub const DEFAULT_TOLERANCE: f64 = 1.0;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("duplicate check `{name}` in category {category}")]
    Duplicate { category: Category, name: String },
    #[error("check `{0}` has an empty query template")]
    EmptyTemplate(String),
    #[error("check `{name}` has an invalid threshold {threshold}")]
    InvalidThreshold { name: String, threshold: f64 },
    #[error("check `{name}` is stored under {stored} but declares {declared}")]
    CategoryMismatch {
        name: String,
        stored: Category,
        declared: Category,
    },
    #[error("tolerance override for unknown reconciliation check `{0}`")]
    UnknownOverride(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct RegistryOptions {
    pub default_tolerance: f64,
    /// Per-check tolerance, keyed by reconciliation check name.
    pub tolerances: BTreeMap<String, f64>,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            default_tolerance: DEFAULT_TOLERANCE,
            tolerances: BTreeMap::new(),
        }
    }
}

impl RegistryOptions {
    pub fn tolerance_for(&self, check_name: &str) -> f64 {
        self.tolerances.get(check_name).copied().unwrap_or(self.default_tolerance)
    }
}

/// Static catalog of checks, bucketed by category in registration order.
#[derive(Clone, Debug, PartialEq)]
pub struct Registry {
    checks: BTreeMap<Category, Vec<CheckDefinition>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            checks: Category::ALL.iter().map(|c| (*c, vec![])).collect(),
        }
    }

    pub fn register(&mut self, def: CheckDefinition) -> Result<(), RegistryError> {
        check_definition(&def)?;
        let bucket = self.checks.entry(def.category).or_default();
        if bucket.iter().any(|d| d.name == def.name) {
            return Err(RegistryError::Duplicate {
                category: def.category,
                name: def.name,
            });
        }
        bucket.push(def);
        Ok(())
    }

    pub fn checks_for(&self, category: Category) -> &[CheckDefinition] {
        self.checks.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All checks, categories in execution order.
    pub fn all(&self) -> impl Iterator<Item = &CheckDefinition> {
        self.checks.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.checks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find(&self, category: Category, name: &str) -> Option<&CheckDefinition> {
        self.checks_for(category).iter().find(|d| d.name == name)
    }

    /// Statement to execute for `def`, with placeholders substituted.
    pub fn render(&self, def: &CheckDefinition, params: &QueryParams) -> String {
        def.render(params)
    }

    /// Re-checks every invariant of the catalog.
    pub fn validate(&self) -> Result<(), RegistryError> {
        for (stored, defs) in &self.checks {
            let mut seen = HashSet::new();
            for def in defs {
                if def.category != *stored {
                    return Err(RegistryError::CategoryMismatch {
                        name: def.name.clone(),
                        stored: *stored,
                        declared: def.category,
                    });
                }
                if !seen.insert(def.name.as_str()) {
                    return Err(RegistryError::Duplicate {
                        category: *stored,
                        name: def.name.clone(),
                    });
                }
                check_definition(def)?;
            }
        }
        Ok(())
    }

    /// Builds the built-in catalog for `schema`. Table names are baked in;
    /// the `{schema}` placeholder is left for render time.
    pub fn from_schema(schema: &WarehouseSchema, options: &RegistryOptions) -> Result<Self, RegistryError> {
        let mut reg = Self::new();
        let fact = &schema.fact.table;

        for table in schema.tables() {
            reg.register(CheckDefinition::new(
                table,
                Category::Existence,
                format!("SELECT COUNT(*) AS row_count FROM {{schema}}.{table}"),
                EvaluationRule::new("row_count", Comparator::Gt, 0.0),
            ))?;
        }

        for fk in &schema.fact.foreign_keys {
            reg.register(CheckDefinition::new(
                format!("fact_to_{}", fk.dimension),
                Category::Integrity,
                format!(
                    "SELECT COUNT(*) AS orphaned_records \
                     FROM {{schema}}.{fact} f \
                     LEFT JOIN {{schema}}.{dim} d ON f.{col} = d.{key} \
                     WHERE d.{key} IS NULL",
                    dim = fk.dimension,
                    col = fk.column,
                    key = fk.dimension_key,
                ),
                EvaluationRule::new("orphaned_records", Comparator::Eq, 0.0),
            ))?;
        }

        let violation = |name: String, predicate: &str| {
            CheckDefinition::new(
                name,
                Category::Quality,
                format!("SELECT COUNT(*) AS violation_count FROM {{schema}}.{fact} WHERE {predicate}"),
                EvaluationRule::new("violation_count", Comparator::Eq, 0.0),
            )
        };
        let id = &schema.fact.business_id;
        reg.register(violation(format!("null_{id}s"), &format!("{id} IS NULL")))?;
        for rule in &schema.fact.quality_rules {
            reg.register(violation(rule.name.clone(), &rule.violation))?;
        }
        for fk in &schema.fact.foreign_keys {
            reg.register(violation(format!("missing_{}s", fk.column), &format!("{} IS NULL", fk.column)))?;
        }

        let mut reconciled = HashSet::new();
        for mart in &schema.marts {
            let Some(rec) = &mart.reconcile else { continue };
            reconciled.insert(rec.check_name.as_str());
            reg.register(CheckDefinition::new(
                rec.check_name.clone(),
                Category::Reconciliation,
                format!(
                    "WITH fact_totals AS (SELECT SUM({fm}) AS fact_total FROM {{schema}}.{fact}), \
                     mart_totals AS (SELECT SUM({mm}) AS mart_total FROM {{schema}}.{mart}) \
                     SELECT fact_totals.fact_total, mart_totals.mart_total, \
                     ABS(fact_totals.fact_total - mart_totals.mart_total) AS difference \
                     FROM fact_totals, mart_totals",
                    fm = rec.fact_metric,
                    mm = rec.mart_metric,
                    mart = mart.table,
                ),
                EvaluationRule::new("difference", Comparator::Le, options.tolerance_for(&rec.check_name))
                    .with_fallback(Fallback::AbsDifference {
                        left: "fact_total".into(),
                        right: "mart_total".into(),
                    }),
            ))?;
        }

        if let Some(unknown) = options.tolerances.keys().find(|k| !reconciled.contains(k.as_str())) {
            return Err(RegistryError::UnknownOverride(unknown.clone()));
        }

        Ok(reg)
    }
}

fn check_definition(def: &CheckDefinition) -> Result<(), RegistryError> {
    if def.query_template.trim().is_empty() {
        return Err(RegistryError::EmptyTemplate(def.name.clone()));
    }
    let t = def.rule.threshold;
    if !t.is_finite() || t < 0.0 {
        return Err(RegistryError::InvalidThreshold {
            name: def.name.clone(),
            threshold: t,
        });
    }
    Ok(())
}
