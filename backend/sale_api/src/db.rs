//! Database layer: migrations, durable sale state, purchases and events.

use std::str::FromStr;

use crowdsale::ledger::AccountingLedger;
use crowdsale::{Amount, Fill, PhaseState, PhaseStatus, SaleEvent, SaleState};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use crate::errors::{ApiError, Result};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);

    // Every connection to `:memory:` is a separate database.
    let max_connections = if url.contains(":memory:") { 1 } else { 5 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Sale state
// ─────────────────────────────────────────────────────────

/// Ledger parts as last committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredState {
    pub sale: SaleState,
    pub phases: Vec<PhaseState>,
    pub revision: u64,
}

/// Read back the committed ledger. Returns `None` before the first write.
pub async fn load_state(pool: &SqlitePool) -> Result<Option<StoredState>> {
    let row: Option<(bool, i64, String, String, i64)> = sqlx::query_as(
        "SELECT started, active_phase, total_sold, total_raised, revision FROM sale_state WHERE id = 1",
    )
    .fetch_optional(pool)
    .await?;

    let Some((started, active_phase, total_sold, total_raised, revision)) = row else {
        return Ok(None);
    };

    let rows: Vec<(i64, String, String, Option<i64>, String)> = sqlx::query_as(
        r#"
        SELECT phase_index, sold, raised, started_at, status
        FROM   phase_state
        ORDER  BY phase_index ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut phases = Vec::with_capacity(rows.len());
    for (expected, (index, sold, raised, started_at, status)) in (1_i64..).zip(rows) {
        if index != expected {
            return Err(ApiError::Corrupt(format!(
                "phase_state gap: expected phase {expected}, found {index}"
            )));
        }
        phases.push(PhaseState {
            sold: parse_amount(&sold)?,
            raised: parse_amount(&raised)?,
            started_at: started_at.map(|t| t as u64),
            status: PhaseStatus::parse(&status)
                .ok_or_else(|| ApiError::Corrupt(format!("unknown phase status '{status}'")))?,
        });
    }

    Ok(Some(StoredState {
        sale: SaleState {
            active_phase: u32::try_from(active_phase)
                .map_err(|_| ApiError::Corrupt(format!("active_phase {active_phase}")))?,
            total_sold: parse_amount(&total_sold)?,
            total_raised: parse_amount(&total_raised)?,
            started,
            // Restored from configuration.
            min_purchase: 0,
        },
        phases,
        revision: revision as u64,
    }))
}

/// Overwrite the stored ledger with `ledger`.
pub async fn write_state(conn: &mut SqliteConnection, ledger: &AccountingLedger) -> Result<()> {
    let sale = ledger.sale();
    sqlx::query(
        r#"
        INSERT INTO sale_state (id, started, active_phase, total_sold, total_raised, revision)
        VALUES (1, ?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(id) DO UPDATE SET
            started      = excluded.started,
            active_phase = excluded.active_phase,
            total_sold   = excluded.total_sold,
            total_raised = excluded.total_raised,
            revision     = excluded.revision
        "#,
    )
    .bind(sale.started)
    .bind(sale.active_phase as i64)
    .bind(sale.total_sold.to_string())
    .bind(sale.total_raised.to_string())
    .bind(ledger.revision() as i64)
    .execute(&mut *conn)
    .await?;

    for (index, phase) in (1_i64..).zip(ledger.phase_states()) {
        sqlx::query(
            r#"
            INSERT INTO phase_state (phase_index, sold, raised, started_at, status)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(phase_index) DO UPDATE SET
                sold       = excluded.sold,
                raised     = excluded.raised,
                started_at = excluded.started_at,
                status     = excluded.status
            "#,
        )
        .bind(index)
        .bind(phase.sold.to_string())
        .bind(phase.raised.to_string())
        .bind(phase.started_at.map(|t| t as i64))
        .bind(phase.status.as_str())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

fn parse_amount(raw: &str) -> Result<Amount> {
    raw.parse()
        .map_err(|_| ApiError::Corrupt(format!("invalid stored amount '{raw}'")))
}

// ─────────────────────────────────────────────────────────
// Purchases
// ─────────────────────────────────────────────────────────

/// A purchase as written to storage, before settlement references exist.
pub struct NewPurchase<'a> {
    pub receipt_id: &'a str,
    pub buyer: &'a str,
    pub amount: Amount,
    pub total_cost: Amount,
    pub fills: &'a [Fill],
    pub timestamp: u64,
    pub revision: u64,
}

pub async fn insert_purchase(conn: &mut SqliteConnection, purchase: &NewPurchase<'_>) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO purchases
            (receipt_id, buyer, amount, total_cost, fills, timestamp, revision, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(purchase.receipt_id)
    .bind(purchase.buyer)
    .bind(purchase.amount.to_string())
    .bind(purchase.total_cost.to_string())
    .bind(Json(purchase.fills))
    .bind(purchase.timestamp as i64)
    .bind(purchase.revision as i64)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Attach the settlement references to an already inserted purchase.
pub async fn set_purchase_refs(
    conn: &mut SqliteConnection,
    receipt_id: &str,
    payment_ref: Option<&str>,
    issuance_ref: Option<&str>,
) -> Result<()> {
    let rows_affected = sqlx::query(
        "UPDATE purchases SET payment_ref = ?1, issuance_ref = ?2 WHERE receipt_id = ?3",
    )
    .bind(payment_ref)
    .bind(issuance_ref)
    .bind(receipt_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if rows_affected != 1 {
        return Err(ApiError::Corrupt(format!("no purchase row for receipt {receipt_id}")));
    }
    Ok(())
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PurchaseRecord {
    pub id: i64,
    pub receipt_id: String,
    pub buyer: String,
    pub amount: String,
    pub total_cost: String,
    pub fills: Json<Vec<Fill>>,
    pub payment_ref: Option<String>,
    pub issuance_ref: Option<String>,
    pub timestamp: i64,
    pub revision: i64,
    pub created_at: Option<String>,
}

/// Fetch all purchases made by `buyer`, oldest first.
pub async fn get_purchases_for_buyer(pool: &SqlitePool, buyer: &str) -> Result<Vec<PurchaseRecord>> {
    let rows = sqlx::query_as::<_, PurchaseRecord>(
        r#"
        SELECT id, receipt_id, buyer, amount, total_cost, fills, payment_ref, issuance_ref,
               timestamp, revision, created_at
        FROM   purchases
        WHERE  buyer = ?1
        ORDER  BY id ASC
        "#,
    )
    .bind(buyer)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ─────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────

pub async fn insert_events(conn: &mut SqliteConnection, events: &[SaleEvent]) -> Result<usize> {
    let created_at = chrono::Utc::now().to_rfc3339();
    let mut count = 0usize;
    for ev in events {
        let rows_affected = sqlx::query(
            r#"
            INSERT INTO events (event_type, payload, timestamp, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(ev.kind())
        .bind(Json(ev))
        .bind(ev.at() as i64)
        .bind(&created_at)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        count += rows_affected as usize;
    }
    Ok(count)
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct EventRecord {
    pub id: i64,
    pub event_type: String,
    pub payload: Json<SaleEvent>,
    pub timestamp: i64,
    pub created_at: Option<String>,
}

/// Fetch all events in the order they were committed.
pub async fn get_all_events(pool: &SqlitePool) -> Result<Vec<EventRecord>> {
    let rows = sqlx::query_as::<_, EventRecord>(
        r#"
        SELECT id, event_type, payload, timestamp, created_at
        FROM   events
        ORDER  BY id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
