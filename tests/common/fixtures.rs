// Test fixtures: run events for the ecommerce sample pipelines

use chrono::{DateTime, TimeZone, Utc};
use tributary::events::{ColumnMapping, Event, IoDirection, RunStatus, SchemaField};

pub const ORDERS_JOB: &str = "ecommerce.etl_orders";
pub const CUSTOMERS_JOB: &str = "ecommerce.etl_customers_daily";

pub const RAW_ORDERS: &str = "raw_data.orders.csv";
pub const RAW_CUSTOMERS: &str = "raw_data.customers.csv";
pub const ORDERS_CLEAN: &str = "processed_data.orders_clean.csv";
pub const CUSTOMERS_DAILY: &str = "processed_data.customers_daily.csv";

fn schema(columns: &[(&str, &str)]) -> Vec<SchemaField> {
    columns.iter().map(|(name, ty)| SchemaField::new(*name, *ty)).collect()
}

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap()
}

pub fn raw_orders_schema() -> Vec<SchemaField> {
    schema(&[
        ("order_id", "int64"),
        ("customer_id", "int64"),
        ("product_id", "int64"),
        ("quantity", "int64"),
        ("unit_price", "float64"),
        ("discount", "float64"),
        ("order_date", "object"),
        ("status", "object"),
    ])
}

pub fn raw_customers_schema() -> Vec<SchemaField> {
    schema(&[
        ("customer_id", "int64"),
        ("name", "object"),
        ("email", "object"),
        ("region", "object"),
        ("status", "object"),
    ])
}

/// The orders job: column lineage is declared before the output dataset.
pub fn orders_run(run_id: &str) -> Vec<Event> {
    vec![
        Event::run_started(run_id, "ecommerce", "etl_orders", at(2)),
        Event::io(run_id, IoDirection::In, "raw_data", "orders.csv", raw_orders_schema(), Some(1000)),
        Event::io(run_id, IoDirection::In, "raw_data", "customers.csv", raw_customers_schema(), Some(200)),
        Event::column_lineage(
            run_id,
            vec![
                ColumnMapping::new(
                    "net_amount",
                    ["quantity", "unit_price", "discount"],
                    "quantity * unit_price - discount",
                ),
                ColumnMapping::new("total_value", ["quantity", "unit_price"], "quantity * unit_price"),
                ColumnMapping::new("estimated_profit", ["net_amount"], "net_amount * 0.30"),
                ColumnMapping::new(
                    "order_size_category",
                    ["net_amount"],
                    "categorize_order_size(net_amount)",
                ),
            ],
        ),
        Event::io(
            run_id,
            IoDirection::Out,
            "processed_data",
            "orders_clean.csv",
            schema(&[
                ("order_id", "int64"),
                ("customer_id", "int64"),
                ("quantity", "int64"),
                ("unit_price", "float64"),
                ("discount", "float64"),
                ("net_amount", "float64"),
                ("total_value", "float64"),
                ("estimated_profit", "float64"),
                ("order_size_category", "object"),
                ("customer_name", "object"),
                ("region", "object"),
                ("order_status", "object"),
                ("customer_status", "object"),
            ]),
            Some(1000),
        ),
        Event::run_ended(run_id, RunStatus::Completed, Some(1250)),
    ]
}

pub fn customers_daily_run(run_id: &str) -> Vec<Event> {
    vec![
        Event::run_started(run_id, "ecommerce", "etl_customers_daily", at(3)),
        Event::io(run_id, IoDirection::In, "raw_data", "customers.csv", raw_customers_schema(), Some(200)),
        Event::io(run_id, IoDirection::In, "raw_data", "orders.csv", raw_orders_schema(), Some(1000)),
        Event::column_lineage(
            run_id,
            vec![
                ColumnMapping::new("email_hash", ["email"], "sha256_hash(email)[:16]"),
                ColumnMapping::new(
                    "is_high_value",
                    ["total_spent", "total_orders"],
                    "(total_spent > 500) OR (total_orders > 5)",
                ),
                ColumnMapping::new(
                    "clv_score",
                    ["total_spent", "total_orders", "total_quantity"],
                    "total_spent * 0.6 + total_orders * 50 + total_quantity * 10",
                ),
                ColumnMapping::new("engagement_level", ["total_orders"], "categorize_engagement(total_orders)"),
            ],
        ),
        Event::io(
            run_id,
            IoDirection::Out,
            "processed_data",
            "customers_daily.csv",
            schema(&[
                ("customer_id", "int64"),
                ("name", "object"),
                ("region", "object"),
                ("email_hash", "object"),
                ("total_orders", "int64"),
                ("total_spent", "float64"),
                ("total_quantity", "int64"),
                ("is_high_value", "bool"),
                ("clv_score", "float64"),
                ("engagement_level", "object"),
            ]),
            Some(200),
        ),
        Event::run_ended(run_id, RunStatus::Completed, Some(800)),
    ]
}

/// Both pipelines, one completed run each.
pub fn sample_events() -> Vec<Event> {
    let mut events = orders_run("run-orders-1");
    events.extend(customers_daily_run("run-customers-1"));
    events
}

/// A backfill job that rewrites the raw orders from the cleaned output,
/// closing a dataset-level loop.
pub fn backfill_run(run_id: &str) -> Vec<Event> {
    vec![
        Event::run_started(run_id, "ecommerce", "backfill", at(4)),
        Event::io(run_id, IoDirection::In, "processed_data", "orders_clean.csv", Vec::new(), None),
        Event::io(run_id, IoDirection::Out, "raw_data", "orders.csv", Vec::new(), None),
        Event::run_ended(run_id, RunStatus::Completed, None),
    ]
}
