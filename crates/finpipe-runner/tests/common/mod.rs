#![allow(dead_code)]

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};

pub const FACT_ROWS: i64 = 100;
pub const NET_SALES_PER_ROW: f64 = 100.0;
pub const PROFIT_PER_ROW: f64 = 10.0;

/// A populated financial warehouse in a scratch directory. Every check passes
/// until a test mutates it with [`SeededWarehouse::exec`].
pub struct SeededWarehouse {
    pub dir: tempfile::TempDir,
    pub path: PathBuf,
}

impl SeededWarehouse {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("financial_dw.db");
        let mut conn = Connection::open(&path).unwrap();
        seed(&mut conn);
        Self { dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exec(&self, sql: &str) {
        Connection::open(&self.path).unwrap().execute_batch(sql).unwrap();
    }
}

fn seed(conn: &mut Connection) {
    conn.execute_batch(
        "CREATE TABLE dim_date (date_key INTEGER PRIMARY KEY, calendar_date TEXT);
         CREATE TABLE dim_product (product_key INTEGER PRIMARY KEY, product_name TEXT);
         CREATE TABLE dim_segment (segment_key INTEGER PRIMARY KEY, segment_name TEXT);
         CREATE TABLE dim_geography (geography_key INTEGER PRIMARY KEY, country TEXT);
         CREATE TABLE dim_discount (discount_key INTEGER PRIMARY KEY, discount_band TEXT);
         CREATE TABLE fact_financial_transactions (
             transaction_id TEXT,
             date_key INTEGER,
             product_key INTEGER,
             segment_key INTEGER,
             geography_key INTEGER,
             discount_key INTEGER,
             units_sold REAL,
             net_sales REAL,
             profit REAL,
             load_date TEXT
         );
         CREATE TABLE monthly_sales_analysis (month TEXT, net_sales REAL);
         CREATE TABLE product_profitability (product_key INTEGER, total_profit REAL);
         CREATE TABLE segment_performance (segment_key INTEGER, net_sales REAL);
         CREATE TABLE geography_performance (geography_key INTEGER, net_sales REAL);
         CREATE TABLE discount_analysis (discount_key INTEGER, net_sales REAL);
         CREATE TABLE executive_dashboard (metric TEXT, value REAL);",
    )
    .unwrap();

    let tx = conn.transaction().unwrap();
    for key in 1..=5i64 {
        tx.execute("INSERT INTO dim_date VALUES (?1, ?2)", params![key, format!("2024-03-0{key}")])
            .unwrap();
        tx.execute("INSERT INTO dim_product VALUES (?1, ?2)", params![key, format!("product {key}")])
            .unwrap();
        tx.execute("INSERT INTO dim_segment VALUES (?1, ?2)", params![key, format!("segment {key}")])
            .unwrap();
        tx.execute("INSERT INTO dim_geography VALUES (?1, ?2)", params![key, format!("country {key}")])
            .unwrap();
        tx.execute("INSERT INTO dim_discount VALUES (?1, ?2)", params![key, format!("band {key}")])
            .unwrap();
    }
    for i in 0..FACT_ROWS {
        let key = i % 5 + 1;
        tx.execute(
            "INSERT INTO fact_financial_transactions VALUES (?1, ?2, ?2, ?2, ?2, ?2, 1.0, ?3, ?4, '2024-03-31')",
            params![format!("t{}", i + 1), key, NET_SALES_PER_ROW, PROFIT_PER_ROW],
        )
        .unwrap();
    }
    let net_total = FACT_ROWS as f64 * NET_SALES_PER_ROW;
    let profit_total = FACT_ROWS as f64 * PROFIT_PER_ROW;
    tx.execute("INSERT INTO monthly_sales_analysis VALUES ('2024-03', ?1)", params![net_total])
        .unwrap();
    tx.execute("INSERT INTO product_profitability VALUES (1, ?1)", params![profit_total])
        .unwrap();
    tx.execute("INSERT INTO segment_performance VALUES (1, ?1)", params![net_total])
        .unwrap();
    tx.execute_batch(
        "INSERT INTO geography_performance VALUES (1, 10000.0);
         INSERT INTO discount_analysis VALUES (1, 10000.0);
         INSERT INTO executive_dashboard VALUES ('net_sales', 10000.0);",
    )
    .unwrap();
    tx.commit().unwrap();
}
