//! Transaction Store (§4.4 persistence side): append-only rows plus tree
//! queries. The idempotent-insert and parent-locking logic here is the
//! storage half of the Transaction Engine's check/persist/commit pattern;
//! the engine crate owns validation and gateway submission.

use chrono::{DateTime, Utc};
use pay_common::{Money, PayError, TenantId, TransactionId};
use serde_json::Value as Json;
use sqlx::{postgres::PgRow, PgPool, Postgres, Row};
use uuid::Uuid;

#[derive(Copy, Clone, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum TranType {
    Auth,
    Sale,
    Capture,
    Void,
    Refund,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TransactionStatus {
    Approved,
    Declined,
    Pending,
}

/// Everything needed to attempt an idempotent insert. `idempotency_fingerprint`
/// is a hash of the caller-visible request payload (amount, type, parent,
/// token) used to detect key reuse with a different payload (§4.4).
#[derive(Clone, Debug)]
pub struct NewTransaction {
    pub id: TransactionId,
    pub tenant_id: TenantId,
    pub customer_id: Option<Uuid>,
    pub amount: Money,
    pub currency: String,
    pub tran_type: TranType,
    pub payment_method_type: String,
    pub payment_method_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
    pub tran_nbr: Option<String>,
    pub metadata: Json,
    pub parent_transaction_id: Option<TransactionId>,
    pub idempotency_fingerprint: String,
}

#[derive(Clone, Debug)]
pub struct Transaction {
    pub id: TransactionId,
    pub tenant_id: TenantId,
    pub customer_id: Option<Uuid>,
    pub amount: Money,
    pub currency: String,
    pub tran_type: TranType,
    pub payment_method_type: String,
    pub payment_method_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
    pub tran_nbr: Option<String>,
    pub auth_guid: Option<String>,
    pub auth_resp: Option<String>,
    pub auth_code: Option<String>,
    pub auth_card_type: Option<String>,
    pub auth_resp_text: Option<String>,
    pub metadata: Json,
    pub parent_transaction_id: Option<TransactionId>,
    pub idempotency_fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Derived, not stored: approved iff `auth_resp == "00"`, pending while
    /// null, otherwise declined (§3).
    pub fn status(&self) -> TransactionStatus {
        match self.auth_resp.as_deref() {
            Some("00") => TransactionStatus::Approved,
            Some(_) => TransactionStatus::Declined,
            None => TransactionStatus::Pending,
        }
    }

    fn from_row(row: &PgRow) -> Result<Self, PayError> {
        let map_err = |e: sqlx::Error| PayError::internal(format!("row decode: {e}"));
        Ok(Self {
            id: TransactionId::from_uuid(row.try_get("id").map_err(map_err)?),
            tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(map_err)?),
            customer_id: row.try_get("customer_id").map_err(map_err)?,
            amount: Money::from_minor_units(row.try_get("amount_minor_units").map_err(map_err)?)
                .map_err(|e| PayError::internal(format!("stored amount invalid: {e}")))?,
            currency: row.try_get("currency").map_err(map_err)?,
            tran_type: row.try_get("tran_type").map_err(map_err)?,
            payment_method_type: row.try_get("payment_method_type").map_err(map_err)?,
            payment_method_id: row.try_get("payment_method_id").map_err(map_err)?,
            subscription_id: row.try_get("subscription_id").map_err(map_err)?,
            tran_nbr: row.try_get("tran_nbr").map_err(map_err)?,
            auth_guid: row.try_get("auth_guid").map_err(map_err)?,
            auth_resp: row.try_get("auth_resp").map_err(map_err)?,
            auth_code: row.try_get("auth_code").map_err(map_err)?,
            auth_card_type: row.try_get("auth_card_type").map_err(map_err)?,
            auth_resp_text: row.try_get("auth_resp_text").map_err(map_err)?,
            metadata: row.try_get("metadata").map_err(map_err)?,
            parent_transaction_id: row
                .try_get::<Option<Uuid>, _>("parent_transaction_id")
                .map_err(map_err)?
                .map(TransactionId::from_uuid),
            idempotency_fingerprint: row.try_get("idempotency_fingerprint").map_err(map_err)?,
            created_at: row.try_get("created_at").map_err(map_err)?,
            processed_at: row.try_get("processed_at").map_err(map_err)?,
            updated_at: row.try_get("updated_at").map_err(map_err)?,
        })
    }
}

/// Outcome of an idempotent insert attempt.
pub enum InsertOutcome {
    /// No prior row existed; this is the first submission for this key.
    Inserted(Transaction),
    /// A prior row with the same id and a matching fingerprint exists.
    AlreadyExists(Transaction),
}

pub struct TransactionStore {
    pool: PgPool,
}

const SELECT_COLUMNS: &str = "id, tenant_id, customer_id, amount_minor_units, currency, \
     tran_type, payment_method_type, payment_method_id, subscription_id, tran_nbr, \
     auth_guid, auth_resp, auth_code, auth_card_type, auth_resp_text, metadata, \
     parent_transaction_id, idempotency_fingerprint, created_at, processed_at, updated_at";

impl TransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_idempotent(&self, new: NewTransaction) -> Result<InsertOutcome, PayError> {
        let query = format!(
            "INSERT INTO transactions (id, tenant_id, customer_id, amount_minor_units, \
             currency, tran_type, payment_method_type, payment_method_id, subscription_id, \
             tran_nbr, metadata, parent_transaction_id, idempotency_fingerprint) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             ON CONFLICT (id) DO NOTHING \
             RETURNING {SELECT_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(new.id.as_uuid())
            .bind(new.tenant_id.as_uuid())
            .bind(new.customer_id)
            .bind(new.amount.minor_units())
            .bind(&new.currency)
            .bind(new.tran_type)
            .bind(&new.payment_method_type)
            .bind(new.payment_method_id)
            .bind(new.subscription_id)
            .bind(&new.tran_nbr)
            .bind(&new.metadata)
            .bind(new.parent_transaction_id.map(|id| id.as_uuid()))
            .bind(&new.idempotency_fingerprint)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PayError::internal(format!("insert transaction: {e}")))?;

        match row {
            Some(row) => Ok(InsertOutcome::Inserted(Transaction::from_row(&row)?)),
            None => {
                let existing = self
                    .get(new.id)
                    .await?
                    .ok_or_else(|| PayError::internal("conflicting row vanished"))?;
                if existing.idempotency_fingerprint != new.idempotency_fingerprint {
                    return Err(PayError::DuplicateIdempotencyKey);
                }
                Ok(InsertOutcome::AlreadyExists(existing))
            }
        }
    }

    /// Write the gateway's response fields exactly once (§3 invariant:
    /// immutable after `processed_at` is set, except via this path).
    pub async fn write_gateway_response(
        &self,
        id: TransactionId,
        auth_resp: &str,
        auth_guid: Option<&str>,
        auth_code: Option<&str>,
        auth_card_type: Option<&str>,
        auth_resp_text: Option<&str>,
    ) -> Result<Transaction, PayError> {
        let query = format!(
            "UPDATE transactions SET auth_resp = $2, auth_guid = $3, auth_code = $4, \
             auth_card_type = $5, auth_resp_text = $6, processed_at = now(), updated_at = now() \
             WHERE id = $1 AND processed_at IS NULL \
             RETURNING {SELECT_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id.as_uuid())
            .bind(auth_resp)
            .bind(auth_guid)
            .bind(auth_code)
            .bind(auth_card_type)
            .bind(auth_resp_text)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PayError::internal(format!("write gateway response: {e}")))?;

        match row {
            Some(row) => Transaction::from_row(&row),
            None => self
                .get(id)
                .await?
                .ok_or_else(|| PayError::not_found(format!("transaction {id}"))),
        }
    }

    pub async fn get(&self, id: TransactionId) -> Result<Option<Transaction>, PayError> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM transactions WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PayError::internal(format!("get transaction: {e}")))?;
        row.as_ref().map(Transaction::from_row).transpose()
    }

    /// Look up by the gateway-echoed `tran_nbr`, used by the Browser-Post
    /// Coordinator to reconcile an asynchronous callback (§4.7). `tran_nbr`
    /// is unique, so this is never ambiguous.
    pub async fn get_by_tran_nbr(&self, tran_nbr: &str) -> Result<Option<Transaction>, PayError> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM transactions WHERE tran_nbr = $1");
        let row = sqlx::query(&query)
            .bind(tran_nbr)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PayError::internal(format!("get transaction by tran_nbr: {e}")))?;
        row.as_ref().map(Transaction::from_row).transpose()
    }

    /// Lock the parent row `FOR UPDATE` inside a caller-managed transaction,
    /// giving row-level serialization for concurrent CAPTURE/REFUND attempts
    /// (§4.4, combined with the engine's in-process sharded mutex).
    pub async fn lock_parent_for_update(
        &self,
        db_tx: &mut sqlx::Transaction<'_, Postgres>,
        parent_id: TransactionId,
    ) -> Result<Transaction, PayError> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM transactions WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&query)
            .bind(parent_id.as_uuid())
            .fetch_optional(&mut **db_tx)
            .await
            .map_err(|e| PayError::internal(format!("lock parent: {e}")))?
            .ok_or_else(|| PayError::not_found(format!("transaction {parent_id}")))?;
        Transaction::from_row(&row)
    }

    /// Sum of approved REFUND children directly parented on `parent_id`
    /// (§8: over-refund prevention invariant).
    pub async fn sum_approved_refunds(&self, parent_id: TransactionId) -> Result<Money, PayError> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(amount_minor_units), 0) AS total FROM transactions \
             WHERE parent_transaction_id = $1 AND tran_type = 'REFUND' AND auth_resp = '00'",
        )
        .bind(parent_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PayError::internal(format!("sum refunds: {e}")))?;
        let total: i64 = row
            .try_get("total")
            .map_err(|e| PayError::internal(format!("sum refunds decode: {e}")))?;
        Money::from_minor_units(total).map_err(|e| PayError::internal(e.to_string()))
    }

    /// Whether `parent_id` already has an approved CAPTURE or VOID child,
    /// used by CAPTURE/VOID validation (§4.4 lifecycle contracts).
    pub async fn has_approved_child_of_type(
        &self,
        parent_id: TransactionId,
        tran_type: TranType,
    ) -> Result<bool, PayError> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM transactions WHERE parent_transaction_id = $1 \
             AND tran_type = $2 AND auth_resp = '00') AS exists",
        )
        .bind(parent_id.as_uuid())
        .bind(tran_type)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PayError::internal(format!("check child type: {e}")))?;
        row.try_get("exists")
            .map_err(|e| PayError::internal(format!("check child type decode: {e}")))
    }

    /// Walk upward to the root (a node with no parent), then recursively
    /// collect every descendant, returning the whole tree in chronological
    /// order regardless of which node was queried (§4.4).
    pub async fn get_tree(&self, any_node_id: TransactionId) -> Result<Vec<Transaction>, PayError> {
        let mut current = self
            .get(any_node_id)
            .await?
            .ok_or_else(|| PayError::not_found(format!("transaction {any_node_id}")))?;
        while let Some(parent_id) = current.parent_transaction_id {
            current = self
                .get(parent_id)
                .await?
                .ok_or_else(|| PayError::internal("dangling parent pointer"))?;
        }
        let root = current;

        let mut tree = vec![root.clone()];
        let mut frontier = vec![root.id];
        while !frontier.is_empty() {
            let mut next_frontier = Vec::new();
            for parent_id in frontier {
                let children = self.children_of(parent_id).await?;
                next_frontier.extend(children.iter().map(|c| c.id));
                tree.extend(children);
            }
            frontier = next_frontier;
        }
        tree.sort_by_key(|t| t.created_at);
        Ok(tree)
    }

    async fn children_of(&self, parent_id: TransactionId) -> Result<Vec<Transaction>, PayError> {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM transactions WHERE parent_transaction_id = $1 \
             ORDER BY created_at"
        );
        let rows = sqlx::query(&query)
            .bind(parent_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PayError::internal(format!("list children: {e}")))?;
        rows.iter().map(Transaction::from_row).collect()
    }

    pub async fn list(
        &self,
        tenant_id: TenantId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, PayError> {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM transactions WHERE tenant_id = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query(&query)
            .bind(tenant_id.as_uuid())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PayError::internal(format!("list transactions: {e}")))?;
        rows.iter().map(Transaction::from_row).collect()
    }

    /// Access the underlying pool so the engine can open a spanning
    /// transaction across insert → gateway submission → response write
    /// (§4.4 "Persistence").
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn new_tx(tenant_id: TenantId, fingerprint: &str, parent: Option<TransactionId>) -> NewTransaction {
        let id = TransactionId::new_random();
        NewTransaction {
            id,
            tenant_id,
            customer_id: None,
            amount: Money::from_minor_units(1000).unwrap(),
            currency: "USD".to_string(),
            tran_type: if parent.is_some() { TranType::Refund } else { TranType::Sale },
            payment_method_type: "CARD".to_string(),
            payment_method_id: None,
            subscription_id: None,
            tran_nbr: Some(format!("{:010}", id.as_uuid().as_u128() % 10_000_000_000)),
            metadata: Json::Null,
            parent_transaction_id: parent,
            idempotency_fingerprint: fingerprint.to_string(),
        }
    }

    /// Two concurrent callers reusing the same row id (derived from the same
    /// idempotency key) see exactly one persisted row (§8 universal
    /// invariant).
    #[sqlx::test(migrations = "./migrations")]
    async fn idempotent_insert_produces_one_row(pool: PgPool) {
        let store = TransactionStore::new(pool);
        let tenant = TenantId::new_random();
        let mut tx = new_tx(tenant, "fp-1", None);
        tx.id = pay_common::ids::derive_idempotent_transaction_id(tenant, "k1");

        let first = store.insert_idempotent(tx.clone()).await.unwrap();
        assert!(matches!(first, InsertOutcome::Inserted(_)));

        let second = store.insert_idempotent(tx).await.unwrap();
        let InsertOutcome::AlreadyExists(row) = second else {
            panic!("expected AlreadyExists on retry");
        };
        let all = store.list(tenant, 10, 0).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, row.id);
    }

    /// A conflicting payload under the same id is rejected rather than
    /// silently overwriting or silently succeeding (§4.4).
    #[sqlx::test(migrations = "./migrations")]
    async fn reused_id_with_different_fingerprint_errors(pool: PgPool) {
        let store = TransactionStore::new(pool);
        let tenant = TenantId::new_random();
        let shared_id = pay_common::ids::derive_idempotent_transaction_id(tenant, "k1");

        let mut a = new_tx(tenant, "fp-a", None);
        a.id = shared_id;
        store.insert_idempotent(a).await.unwrap();

        let mut b = new_tx(tenant, "fp-b", None);
        b.id = shared_id;
        let err = store.insert_idempotent(b).await.unwrap_err();
        assert!(matches!(err, PayError::DuplicateIdempotencyKey));
    }

    /// Cumulative approved refunds never exceed the parent amount once the
    /// sum crosses it; exercised directly against the store's aggregate
    /// query, which is the enforcement point the engine relies on (§8).
    #[sqlx::test(migrations = "./migrations")]
    async fn sum_approved_refunds_reflects_only_approved_children(pool: PgPool) {
        let store = TransactionStore::new(pool);
        let tenant = TenantId::new_random();
        let parent = new_tx(tenant, "fp-parent", None);
        let parent_id = parent.id;
        store.insert_idempotent(parent).await.unwrap();
        store
            .write_gateway_response(parent_id, "00", Some("g1"), Some("c1"), None, None)
            .await
            .unwrap();

        let mut refund_1 = new_tx(tenant, "fp-r1", Some(parent_id));
        refund_1.amount = Money::from_minor_units(600).unwrap();
        let refund_1_id = refund_1.id;
        store.insert_idempotent(refund_1).await.unwrap();
        store
            .write_gateway_response(refund_1_id, "00", Some("g2"), Some("c2"), None, None)
            .await
            .unwrap();

        let mut refund_2 = new_tx(tenant, "fp-r2", Some(parent_id));
        refund_2.amount = Money::from_minor_units(500).unwrap();
        let refund_2_id = refund_2.id;
        store.insert_idempotent(refund_2).await.unwrap();
        // Declined: must not count toward the cumulative-refund sum.
        store
            .write_gateway_response(refund_2_id, "05", None, None, None, Some("declined"))
            .await
            .unwrap();

        let total = store.sum_approved_refunds(parent_id).await.unwrap();
        assert_eq!(total.minor_units(), 600);
    }

    /// `GetTree` returns the same set regardless of which node in the tree
    /// is queried (§8).
    #[sqlx::test(migrations = "./migrations")]
    async fn get_tree_is_consistent_from_any_node(pool: PgPool) {
        let store = TransactionStore::new(pool);
        let tenant = TenantId::new_random();
        let parent = new_tx(tenant, "fp-parent", None);
        let parent_id = parent.id;
        store.insert_idempotent(parent).await.unwrap();

        let child = new_tx(tenant, "fp-child", Some(parent_id));
        let child_id = child.id;
        store.insert_idempotent(child).await.unwrap();

        let from_parent = store.get_tree(parent_id).await.unwrap();
        let from_child = store.get_tree(child_id).await.unwrap();
        let ids_a: std::collections::HashSet<_> = from_parent.iter().map(|t| t.id).collect();
        let ids_b: std::collections::HashSet<_> = from_child.iter().map(|t| t.id).collect();
        assert_eq!(ids_a, ids_b);
        assert_eq!(ids_a.len(), 2);
    }
}
