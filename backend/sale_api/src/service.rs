//! Serialized purchase processing over the sale aggregate.
//!
//! All mutations run under one async lock. A purchase is quoted, staged on a
//! copy of the aggregate and fully written inside a SQL transaction before
//! settlement. Once settled, the transaction is committed and the staged
//! aggregate swapped into memory; if storage fails at that point, settlement
//! is reversed.

use std::sync::Arc;

use crowdsale::{
    Amount, Clock, PhaseDetails, PhaseIndex, PurchasePlan, PurchaseReceipt, Sale, SaleConfig,
    SaleSummary,
};
use sha2::{Digest, Sha256};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::db::{self, NewPurchase};
use crate::errors::{ApiError, Result};
use crate::settlement::{SettlementRef, Settler};

struct Desk {
    sale: Sale,
    settler: Settler,
}

pub struct SaleService {
    desk: Mutex<Desk>,
    pool: SqlitePool,
}

/// A committed purchase with its durable identifier.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PurchaseOutcome {
    pub receipt_id: String,
    #[serde(flatten)]
    pub receipt: PurchaseReceipt,
}

impl SaleService {
    /// Restore the sale from `pool`, or create and persist a fresh one.
    pub async fn open(
        pool: SqlitePool,
        config: SaleConfig,
        clock: Arc<dyn Clock>,
        settler: Settler,
    ) -> Result<Self> {
        let sale = match db::load_state(&pool).await? {
            Some(stored) => {
                info!(revision = stored.revision, "restoring sale state");
                Sale::restore(config, clock, stored.sale, stored.phases, stored.revision)?
            }
            None => {
                info!("no stored sale state, initializing");
                let sale = Sale::new(config, clock)?;
                let mut conn = pool.acquire().await?;
                db::write_state(&mut conn, sale.ledger()).await?;
                sale
            }
        };

        Ok(Self {
            desk: Mutex::new(Desk { sale, settler }),
            pool,
        })
    }

    // ─────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────

    pub async fn start(&self, caller: &str) -> Result<SaleSummary> {
        let mut desk = self.desk.lock().await;

        let mut staged = desk.sale.clone();
        staged.start_crowdsale(caller)?;
        let events = staged.drain_events();

        let mut tx = self.pool.begin().await?;
        db::write_state(&mut tx, staged.ledger()).await?;
        db::insert_events(&mut tx, &events).await?;
        tx.commit().await?;

        desk.sale = staged;
        Ok(desk.sale.summary())
    }

    pub async fn purchase(&self, buyer: &str, amount: Amount) -> Result<PurchaseOutcome> {
        let mut desk = self.desk.lock().await;
        let Desk { sale, settler } = &mut *desk;

        let plan = sale.quote(amount)?;
        let cost = plan.total_cost();
        let recipient = sale.config().fund_recipient.clone();

        let mut staged = sale.clone();
        let receipt = staged.commit(buyer, plan)?;
        let events = staged.drain_events();
        let receipt_id = receipt_id(&receipt);

        // Every fallible write happens before any money moves.
        let mut tx = self.pool.begin().await?;
        db::write_state(&mut tx, staged.ledger()).await?;
        db::insert_events(&mut tx, &events).await?;
        db::insert_purchase(
            &mut tx,
            &NewPurchase {
                receipt_id: &receipt_id,
                buyer,
                amount,
                total_cost: cost,
                fills: &receipt.fills,
                timestamp: receipt.at,
                revision: receipt.revision,
            },
        )
        .await?;

        let payment_ref = match settler.collect_payment(buyer, &recipient, cost).await {
            Ok(reference) => reference,
            Err(e) => {
                warn!(%buyer, cost = %cost, error = %e, "payment collection failed");
                return Err(crowdsale::Error::PaymentFailed.into());
            }
        };

        let issuance_ref = match settler.issue_tokens(buyer, amount).await {
            Ok(reference) => reference,
            Err(e) => {
                warn!(%buyer, amount = %amount, error = %e, "token issuance failed, refunding");
                compensate(settler, buyer, &recipient, cost, None).await;
                return Err(crowdsale::Error::IssuanceFailed.into());
            }
        };

        if let Err(e) = finish_purchase(tx, &receipt_id, payment_ref, issuance_ref).await {
            error!(%buyer, %receipt_id, error = %e, "durable commit failed after settlement");
            compensate(settler, buyer, &recipient, cost, Some(amount)).await;
            return Err(e);
        }

        *sale = staged;
        info!(%buyer, %receipt_id, revision = receipt.revision, "purchase committed");
        Ok(PurchaseOutcome {
            receipt_id,
            receipt,
        })
    }

    /// Stock the settlement treasury with the supply still for sale.
    pub async fn fund_treasury(&self) -> Result<()> {
        let mut desk = self.desk.lock().await;
        let remaining = desk.sale.summary().remaining_supply;
        desk.settler.fund_treasury(remaining)
    }

    /// Credit a buyer in the in-process token book.
    pub async fn fund_buyer(&self, account: &str, amount: Amount) -> Result<()> {
        self.desk.lock().await.settler.fund_buyer(account, amount)
    }

    // ─────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────

    pub async fn quote(&self, amount: Amount) -> Result<PurchasePlan> {
        Ok(self.desk.lock().await.sale.quote(amount)?)
    }

    pub async fn phase_details(&self, index: PhaseIndex) -> Result<PhaseDetails> {
        Ok(self.desk.lock().await.sale.get_phase_details(index)?)
    }

    pub async fn active_phase(&self) -> Result<PhaseIndex> {
        Ok(self.desk.lock().await.sale.active_phase()?)
    }

    pub async fn summary(&self) -> SaleSummary {
        self.desk.lock().await.sale.summary()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn finish_purchase(
    mut tx: Transaction<'_, Sqlite>,
    receipt_id: &str,
    payment_ref: SettlementRef,
    issuance_ref: SettlementRef,
) -> Result<()> {
    db::set_purchase_refs(&mut tx, receipt_id, payment_ref.as_deref(), issuance_ref.as_deref())
        .await?;
    tx.commit().await?;
    Ok(())
}

/// Undo settlement for a purchase that will not be committed: take back
/// `issued` tokens if any were delivered, then refund the payment.
async fn compensate(
    settler: &mut Settler,
    buyer: &str,
    recipient: &str,
    cost: Amount,
    issued: Option<Amount>,
) {
    if let Some(amount) = issued {
        if let Err(e) = settler.return_tokens(buyer, amount).await {
            error!(%buyer, amount = %amount, error = %e, "token reversal failed");
        }
    }
    if let Err(e) = settler.refund_payment(buyer, recipient, cost).await {
        error!(%buyer, cost = %cost, error = %e, "refund failed");
    }
}

/// Hex SHA-256 over the fields that make a purchase unique.
pub fn receipt_id(receipt: &PurchaseReceipt) -> String {
    let mut hasher = Sha256::new();
    hasher.update(receipt.buyer.as_bytes());
    hasher.update(receipt.amount.to_be_bytes());
    hasher.update(receipt.total_cost.to_be_bytes());
    hasher.update(receipt.at.to_be_bytes());
    hasher.update(receipt.revision.to_be_bytes());
    hex::encode(hasher.finalize())
}
