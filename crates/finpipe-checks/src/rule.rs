use finpipe_core::{CheckResult, EvaluationError, QueryError, Table, Value};

use crate::types::{CheckDefinition, Fallback};

/// Applies a check's rule to the single-row result of its query.
///
/// Only the first row is read. The observed value comes from the rule's field,
/// or from its fallback when the field is NULL.
pub fn evaluate(def: &CheckDefinition, table: &Table) -> Result<CheckResult, EvaluationError> {
    let details: Vec<(String, Value)> = table
        .named_row(0)
        .ok_or(EvaluationError::NoRows)?
        .into_iter()
        .map(|(c, v)| (c.to_string(), v.clone()))
        .collect();

    let rule = &def.rule;
    let raw = table
        .value(0, &rule.field)
        .ok_or_else(|| EvaluationError::MissingField(rule.field.clone()))?;

    let (observed, measured, note) = match (raw, &rule.fallback) {
        (Value::Null, Some(Fallback::AbsDifference { left, right })) => {
            let l = numeric_or_zero(table, left)?;
            let r = numeric_or_zero(table, right)?;
            let diff = (l.unwrap_or(0.0) - r.unwrap_or(0.0)).abs();
            let null_sides: Vec<&str> = [(left, l), (right, r)]
                .into_iter()
                .filter(|(_, v)| v.is_none())
                .map(|(name, _)| name.as_str())
                .collect();
            let verb = if null_sides.len() > 1 { "are" } else { "is" };
            let note = format!(" ({} {verb} NULL, treated as 0)", null_sides.join(" and "));
            (Value::Real(diff), diff, Some(note))
        }
        (Value::Null, None) => return Err(EvaluationError::NullField(rule.field.clone())),
        (v, _) => {
            let n = v.as_f64().ok_or_else(|| EvaluationError::NotNumeric {
                field: rule.field.clone(),
                value: v.to_string(),
            })?;
            (v.clone(), n, None)
        }
    };

    let passed = rule.comparator.holds(measured, rule.threshold);
    let mut message = format!("{} = {}, expected {}", rule.field, observed, rule.expectation());
    if let Some(note) = note {
        message.push_str(&note);
    }

    Ok(CheckResult {
        check_name: def.name.clone(),
        category: def.category,
        passed,
        observed,
        details,
        message,
    })
}

/// A check that could not be evaluated never counts as passing.
pub fn unevaluated(def: &CheckDefinition, reason: &str) -> CheckResult {
    CheckResult {
        check_name: def.name.clone(),
        category: def.category,
        passed: false,
        observed: Value::Null,
        details: vec![],
        message: format!("could not evaluate ({reason}); expected {} {}", def.rule.field, def.rule.expectation()),
    }
}

pub fn query_failed(def: &CheckDefinition, err: &QueryError) -> CheckResult {
    unevaluated(def, &format!("{err}; statement: {}", compact(&err.statement)))
}

fn numeric_or_zero(table: &Table, column: &str) -> Result<Option<f64>, EvaluationError> {
    match table.value(0, column) {
        None => Err(EvaluationError::MissingField(column.to_string())),
        Some(Value::Null) => Ok(None),
        Some(v) => v.as_f64().map(Some).ok_or_else(|| EvaluationError::NotNumeric {
            field: column.to_string(),
            value: v.to_string(),
        }),
    }
}

fn compact(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}
