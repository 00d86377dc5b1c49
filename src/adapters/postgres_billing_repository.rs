//! Postgres implementation of BillingRepository.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Transaction as DbTransaction};
use uuid::Uuid;

use crate::domain::invoice::settle;
use crate::domain::{
    Company, Currency, Customer, FulfillmentDraft, Invoice, InvoiceDetails, InvoiceLookup,
    PaidStatus, Payment, PaymentMethod, Transaction, TransactionStatus,
};
use crate::ports::{BillingRepository, FulfillmentRecord, RepositoryError, RepositoryResult};

/// `email_logs.mailable_type` written by Crater for invoice emails.
pub const DEFAULT_INVOICE_MAILABLE_TYPE: &str = "Crater\\Models\\Invoice";

const INVOICE_SELECT: &str = r#"
    SELECT
        i.id, i.invoice_number, i.unique_hash, i.company_id, i.customer_id, i.currency_id,
        i.total, i.due_amount, i.exchange_rate, i.paid_status,
        co.name AS company_name, co.slug AS company_slug,
        cu.name AS customer_name, cu.email AS customer_email,
        cur.code AS currency_code, cur.name AS currency_name,
        (
            SELECT el.token FROM email_logs el
            WHERE el.mailable_type = $2 AND el.mailable_id = i.id
            ORDER BY el.created_at DESC
            LIMIT 1
        ) AS email_log_token
    FROM invoices i
    JOIN companies co ON co.id = i.company_id
    JOIN customers cu ON cu.id = i.customer_id
    LEFT JOIN currencies cur ON cur.id = i.currency_id
"#;

const TRANSACTION_COLUMNS: &str =
    "id, transaction_id, type, status, transaction_date, company_id, invoice_id, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, payment_number, sequence_number, payment_date, amount, exchange_rate, \
     base_amount, invoice_id, customer_id, company_id, currency_id, payment_method_id, \
     transaction_id, created_at";

/// Postgres-backed billing repository.
#[derive(Clone)]
pub struct PostgresBillingRepository {
    pool: PgPool,
    invoice_mailable_type: String,
}

impl PostgresBillingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            invoice_mailable_type: DEFAULT_INVOICE_MAILABLE_TYPE.to_string(),
        }
    }

    /// Overrides the `email_logs.mailable_type` matched when resolving the
    /// invoice's email-log token.
    pub fn with_invoice_mailable_type(mut self, mailable_type: impl Into<String>) -> Self {
        self.invoice_mailable_type = mailable_type.into();
        self
    }

    async fn insert_transaction_in(
        db: &mut DbTransaction<'_, Postgres>,
        tx: &Transaction,
    ) -> RepositoryResult<Transaction> {
        let sql = format!(
            "INSERT INTO transactions ({cols}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {cols}",
            cols = TRANSACTION_COLUMNS
        );
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(tx.id)
            .bind(&tx.transaction_id)
            .bind(&tx.kind)
            .bind(tx.status.as_str())
            .bind(tx.transaction_date)
            .bind(tx.company_id)
            .bind(tx.invoice_id)
            .bind(tx.created_at)
            .bind(tx.updated_at)
            .fetch_one(&mut **db)
            .await?;

        row.into_domain()
    }
}

#[async_trait]
impl BillingRepository for PostgresBillingRepository {
    async fn ping(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_invoice(&self, lookup: &InvoiceLookup) -> RepositoryResult<Option<InvoiceDetails>> {
        let row = match lookup {
            InvoiceLookup::Id(id) => {
                let sql = format!("{} WHERE i.id = $1", INVOICE_SELECT);
                sqlx::query_as::<_, InvoiceRow>(&sql)
                    .bind(id)
                    .bind(&self.invoice_mailable_type)
                    .fetch_optional(&self.pool)
                    .await?
            }
            InvoiceLookup::IdOrHash(token) => {
                // Hash matches win over numeric ids.
                let sql = format!(
                    "{} WHERE i.unique_hash = $1 OR i.id::text = $1 \
                     ORDER BY (i.unique_hash = $1) DESC LIMIT 1",
                    INVOICE_SELECT
                );
                sqlx::query_as::<_, InvoiceRow>(&sql)
                    .bind(token)
                    .bind(&self.invoice_mailable_type)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };

        row.map(InvoiceRow::into_domain).transpose()
    }

    async fn find_transaction(&self, session_id: &str) -> RepositoryResult<Option<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE transaction_id = $1",
            TRANSACTION_COLUMNS
        );
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn list_transactions(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            TRANSACTION_COLUMNS
        );
        let rows = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }

    async fn insert_transaction(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let mut db = self.pool.begin().await?;
        let inserted = Self::insert_transaction_in(&mut db, tx).await?;
        db.commit().await?;
        Ok(inserted)
    }

    async fn find_or_create_payment_method(
        &self,
        name: &str,
        company_id: i64,
    ) -> RepositoryResult<PaymentMethod> {
        let candidate = PaymentMethod::new(name.to_string(), company_id);
        sqlx::query(
            "INSERT INTO payment_methods (id, name, company_id) VALUES ($1, $2, $3) \
             ON CONFLICT (name, company_id) DO NOTHING",
        )
        .bind(candidate.id)
        .bind(&candidate.name)
        .bind(company_id)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, PaymentMethodRow>(
            "SELECT id, name, company_id FROM payment_methods WHERE name = $1 AND company_id = $2",
        )
        .bind(name)
        .bind(company_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_domain())
    }

    async fn find_payment_for_transaction(&self, transaction_id: Uuid) -> RepositoryResult<Option<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE transaction_id = $1",
            PAYMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(PaymentRow::into_domain))
    }

    async fn record_fulfillment(&self, draft: FulfillmentDraft) -> RepositoryResult<FulfillmentRecord> {
        let mut db = self.pool.begin().await?;

        let sql = format!(
            "SELECT {} FROM transactions WHERE transaction_id = $1 FOR UPDATE",
            TRANSACTION_COLUMNS
        );
        let existing = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(&draft.session_id)
            .fetch_optional(&mut *db)
            .await?
            .map(TransactionRow::into_domain)
            .transpose()?;

        let (transaction, transaction_created) = match existing {
            Some(tx) if tx.status == TransactionStatus::Success => {
                let sql = format!(
                    "SELECT {} FROM payments WHERE transaction_id = $1",
                    PAYMENT_COLUMNS
                );
                let payment = sqlx::query_as::<_, PaymentRow>(&sql)
                    .bind(tx.id)
                    .fetch_optional(&mut *db)
                    .await?
                    .map(PaymentRow::into_domain);
                db.rollback().await?;
                return Ok(FulfillmentRecord::AlreadyFulfilled {
                    transaction: tx,
                    payment,
                });
            }
            Some(mut tx) if tx.status.can_transition_to(TransactionStatus::Success) => {
                tx.complete();
                sqlx::query(
                    "UPDATE transactions SET status = $1, updated_at = $2 \
                     WHERE id = $3 AND status = $4",
                )
                .bind(TransactionStatus::Success.as_str())
                .bind(tx.updated_at)
                .bind(tx.id)
                .bind(TransactionStatus::Pending.as_str())
                .execute(&mut *db)
                .await?;
                (tx, false)
            }
            Some(tx) => {
                return Err(RepositoryError::Conflict(format!(
                    "transaction {} is {}",
                    tx.transaction_id, tx.status
                )));
            }
            None => {
                let tx = Transaction::new(
                    draft.session_id.clone(),
                    draft.provider.clone(),
                    TransactionStatus::Success,
                    draft.company_id,
                    draft.invoice_id,
                );
                (Self::insert_transaction_in(&mut db, &tx).await?, true)
            }
        };

        // NO KEY UPDATE leaves the KEY SHARE locks taken by foreign key checks
        // (ours and concurrent fulfillments') unblocked.
        let due_amount: BigDecimal = sqlx::query_scalar(
            "SELECT due_amount FROM invoices WHERE id = $1 FOR NO KEY UPDATE",
        )
        .bind(draft.invoice_id)
        .fetch_one(&mut *db)
        .await?;
        let (remaining, paid_status) = settle(&due_amount, &draft.amount);
        sqlx::query("UPDATE invoices SET due_amount = $1, paid_status = $2 WHERE id = $3")
            .bind(&remaining)
            .bind(paid_status.as_str())
            .bind(draft.invoice_id)
            .execute(&mut *db)
            .await?;

        // Serializes numbering per company; the unique index backs it up.
        sqlx::query("SELECT id FROM companies WHERE id = $1 FOR NO KEY UPDATE")
            .bind(draft.company_id)
            .execute(&mut *db)
            .await?;
        let sequence_number: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sequence_number), 0) + 1 FROM payments WHERE company_id = $1",
        )
        .bind(draft.company_id)
        .fetch_one(&mut *db)
        .await?;

        let payment = draft.into_payment(transaction.id, sequence_number);
        let sql = format!(
            "INSERT INTO payments ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
            PAYMENT_COLUMNS
        );
        sqlx::query(&sql)
            .bind(payment.id)
            .bind(&payment.payment_number)
            .bind(payment.sequence_number)
            .bind(payment.payment_date)
            .bind(&payment.amount)
            .bind(&payment.exchange_rate)
            .bind(&payment.base_amount)
            .bind(payment.invoice_id)
            .bind(payment.customer_id)
            .bind(payment.company_id)
            .bind(payment.currency_id)
            .bind(payment.payment_method_id)
            .bind(payment.transaction_id)
            .bind(payment.created_at)
            .execute(&mut *db)
            .await?;

        db.commit().await?;

        Ok(FulfillmentRecord::Fulfilled {
            transaction,
            payment,
            transaction_created,
        })
    }
}

fn corrupt(column: &str, err: String) -> RepositoryError {
    RepositoryError::Database(format!("invalid {}: {}", column, err))
}

/// Internal row types for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: i64,
    invoice_number: String,
    unique_hash: String,
    company_id: i64,
    customer_id: i64,
    currency_id: Option<i64>,
    total: BigDecimal,
    due_amount: BigDecimal,
    exchange_rate: BigDecimal,
    paid_status: String,
    company_name: String,
    company_slug: String,
    customer_name: String,
    customer_email: Option<String>,
    currency_code: Option<String>,
    currency_name: Option<String>,
    email_log_token: Option<String>,
}

impl InvoiceRow {
    fn into_domain(self) -> RepositoryResult<InvoiceDetails> {
        let paid_status: PaidStatus = self
            .paid_status
            .parse()
            .map_err(|e| corrupt("paid_status", e))?;

        let currency = match (self.currency_id, self.currency_code) {
            (Some(id), Some(code)) => Some(Currency {
                id,
                code,
                name: self.currency_name.unwrap_or_default(),
            }),
            _ => None,
        };

        Ok(InvoiceDetails {
            invoice: Invoice {
                id: self.id,
                invoice_number: self.invoice_number,
                unique_hash: self.unique_hash,
                company_id: self.company_id,
                customer_id: self.customer_id,
                currency_id: self.currency_id,
                total: self.total,
                due_amount: self.due_amount,
                exchange_rate: self.exchange_rate,
                paid_status,
            },
            company: Company {
                id: self.company_id,
                name: self.company_name,
                slug: self.company_slug,
            },
            customer: Customer {
                id: self.customer_id,
                name: self.customer_name,
                email: self.customer_email,
            },
            currency,
            email_log_token: self.email_log_token,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    transaction_id: String,
    #[sqlx(rename = "type")]
    kind: String,
    status: String,
    transaction_date: DateTime<Utc>,
    company_id: i64,
    invoice_id: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> RepositoryResult<Transaction> {
        let status = self.status.parse().map_err(|e| corrupt("status", e))?;
        Ok(Transaction {
            id: self.id,
            transaction_id: self.transaction_id,
            kind: self.kind,
            status,
            transaction_date: self.transaction_date,
            company_id: self.company_id,
            invoice_id: self.invoice_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentMethodRow {
    id: Uuid,
    name: String,
    company_id: i64,
}

impl PaymentMethodRow {
    fn into_domain(self) -> PaymentMethod {
        PaymentMethod {
            id: self.id,
            name: self.name,
            company_id: self.company_id,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    payment_number: String,
    sequence_number: i64,
    payment_date: NaiveDate,
    amount: BigDecimal,
    exchange_rate: BigDecimal,
    base_amount: BigDecimal,
    invoice_id: i64,
    customer_id: i64,
    company_id: i64,
    currency_id: Option<i64>,
    payment_method_id: Uuid,
    transaction_id: Uuid,
    created_at: DateTime<Utc>,
}

impl PaymentRow {
    fn into_domain(self) -> Payment {
        Payment {
            id: self.id,
            payment_number: self.payment_number,
            sequence_number: self.sequence_number,
            payment_date: self.payment_date,
            amount: self.amount,
            exchange_rate: self.exchange_rate,
            base_amount: self.base_amount,
            invoice_id: self.invoice_id,
            customer_id: self.customer_id,
            company_id: self.company_id,
            currency_id: self.currency_id,
            payment_method_id: self.payment_method_id,
            transaction_id: self.transaction_id,
            created_at: self.created_at,
        }
    }
}
