use serde::{Deserialize, Serialize};

/// Logical layout of a dimensional warehouse: what the checks are generated from.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WarehouseSchema {
    pub dimensions: Vec<String>,
    pub fact: FactTable,
    #[serde(default)]
    pub marts: Vec<Mart>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FactTable {
    pub table: String,
    /// Primary business identifier; must never be NULL.
    pub business_id: String,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    pub quality_rules: Vec<QualityRule>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ForeignKey {
    pub column: String,
    pub dimension: String,
    pub dimension_key: String,
}

/// A business rule expressed as a SQL predicate selecting the violating fact rows.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QualityRule {
    pub name: String,
    pub violation: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Mart {
    pub table: String,
    #[serde(default)]
    pub reconcile: Option<Reconcile>,
}

/// The mart's defining metric must sum to the same total as the fact table.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Reconcile {
    pub check_name: String,
    pub fact_metric: String,
    pub mart_metric: String,
}

impl WarehouseSchema {
    /// The financial star schema: five dimensions, one transaction fact, six marts.
    pub fn financial() -> Self {
        let fk = |column: &str, dimension: &str| ForeignKey {
            column: column.to_string(),
            dimension: dimension.to_string(),
            dimension_key: column.to_string(),
        };
        let rule = |name: &str, violation: &str| QualityRule {
            name: name.to_string(),
            violation: violation.to_string(),
        };
        let mart = |table: &str, reconcile: Option<(&str, &str, &str)>| Mart {
            table: table.to_string(),
            reconcile: reconcile.map(|(check_name, fact_metric, mart_metric)| Reconcile {
                check_name: check_name.to_string(),
                fact_metric: fact_metric.to_string(),
                mart_metric: mart_metric.to_string(),
            }),
        };

        Self {
            dimensions: ["dim_date", "dim_product", "dim_segment", "dim_geography", "dim_discount"]
                .iter()
                .map(|d| d.to_string())
                .collect(),
            fact: FactTable {
                table: "fact_financial_transactions".to_string(),
                business_id: "transaction_id".to_string(),
                foreign_keys: vec![
                    fk("date_key", "dim_date"),
                    fk("product_key", "dim_product"),
                    fk("segment_key", "dim_segment"),
                    fk("geography_key", "dim_geography"),
                    fk("discount_key", "dim_discount"),
                ],
                quality_rules: vec![
                    rule("negative_sales", "net_sales < 0"),
                    rule("units_sold_zero_with_sales", "units_sold = 0 AND net_sales > 0"),
                    rule("profit_margin_validation", "profit > net_sales"),
                ],
            },
            marts: vec![
                mart(
                    "monthly_sales_analysis",
                    Some(("monthly_sales_totals_match_fact", "net_sales", "net_sales")),
                ),
                mart(
                    "product_profitability",
                    Some(("product_profit_totals_match_fact", "profit", "total_profit")),
                ),
                mart(
                    "segment_performance",
                    Some(("segment_totals_match_fact", "net_sales", "net_sales")),
                ),
                mart("geography_performance", None),
                mart("discount_analysis", None),
                mart("executive_dashboard", None),
            ],
        }
    }

    /// Every table the transformation step must have produced, in
    /// dimension, fact, mart order.
    pub fn tables(&self) -> Vec<&str> {
        self.dimensions
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.fact.table.as_str()))
            .chain(self.marts.iter().map(|m| m.table.as_str()))
            .collect()
    }
}

impl Default for WarehouseSchema {
    fn default() -> Self {
        Self::financial()
    }
}
