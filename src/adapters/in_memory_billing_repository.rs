//! In-memory implementation of BillingRepository.
//!
//! Every operation runs under one mutex, which gives the same atomicity the
//! Postgres adapter gets from its database transaction. Backs the router and
//! use-case tests; the binary always runs against Postgres.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::domain::invoice::settle;
use crate::domain::{
    Completion, FulfillmentDraft, InvoiceDetails, InvoiceLookup, Payment, PaymentMethod,
    Transaction, TransactionStatus,
};
use crate::ports::{BillingRepository, FulfillmentRecord, RepositoryError, RepositoryResult};

#[derive(Default)]
struct State {
    invoices: HashMap<i64, InvoiceDetails>,
    transactions: Vec<Transaction>,
    payment_methods: Vec<PaymentMethod>,
    payments: Vec<Payment>,
}

#[derive(Default)]
pub struct InMemoryBillingRepository {
    state: Mutex<State>,
}

impl InMemoryBillingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> RepositoryResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Database("repository lock poisoned".to_string()))
    }

    /// Seeds or replaces an invoice.
    pub fn put_invoice(&self, details: InvoiceDetails) {
        if let Ok(mut state) = self.lock() {
            state.invoices.insert(details.invoice.id, details);
        }
    }

    pub fn invoice(&self, id: i64) -> Option<InvoiceDetails> {
        self.lock().ok()?.invoices.get(&id).cloned()
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.lock()
            .map(|state| state.transactions.clone())
            .unwrap_or_default()
    }

    pub fn payments(&self) -> Vec<Payment> {
        self.lock()
            .map(|state| state.payments.clone())
            .unwrap_or_default()
    }

    pub fn payment_methods(&self) -> Vec<PaymentMethod> {
        self.lock()
            .map(|state| state.payment_methods.clone())
            .unwrap_or_default()
    }
}

impl State {
    fn insert_transaction(&mut self, tx: &Transaction) -> RepositoryResult<Transaction> {
        if self
            .transactions
            .iter()
            .any(|existing| existing.transaction_id == tx.transaction_id)
        {
            return Err(RepositoryError::Conflict(format!(
                "transaction {} already exists",
                tx.transaction_id
            )));
        }
        self.transactions.push(tx.clone());
        Ok(tx.clone())
    }

    fn next_sequence_number(&self, company_id: i64) -> i64 {
        self.payments
            .iter()
            .filter(|p| p.company_id == company_id)
            .map(|p| p.sequence_number)
            .max()
            .unwrap_or(0)
            + 1
    }
}

#[async_trait]
impl BillingRepository for InMemoryBillingRepository {
    async fn ping(&self) -> RepositoryResult<()> {
        self.lock().map(|_| ())
    }

    async fn find_invoice(&self, lookup: &InvoiceLookup) -> RepositoryResult<Option<InvoiceDetails>> {
        let state = self.lock()?;
        let found = match lookup {
            InvoiceLookup::Id(id) => state.invoices.get(id).cloned(),
            InvoiceLookup::IdOrHash(token) => state
                .invoices
                .values()
                .find(|d| &d.invoice.unique_hash == token)
                .or_else(|| {
                    token
                        .parse::<i64>()
                        .ok()
                        .and_then(|id| state.invoices.get(&id))
                })
                .cloned(),
        };
        Ok(found)
    }

    async fn find_transaction(&self, session_id: &str) -> RepositoryResult<Option<Transaction>> {
        let state = self.lock()?;
        Ok(state
            .transactions
            .iter()
            .find(|tx| tx.transaction_id == session_id)
            .cloned())
    }

    async fn list_transactions(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Transaction>> {
        let state = self.lock()?;
        let mut all = state.transactions.clone();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn insert_transaction(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        self.lock()?.insert_transaction(tx)
    }

    async fn find_or_create_payment_method(
        &self,
        name: &str,
        company_id: i64,
    ) -> RepositoryResult<PaymentMethod> {
        let mut state = self.lock()?;
        if let Some(existing) = state
            .payment_methods
            .iter()
            .find(|m| m.name == name && m.company_id == company_id)
        {
            return Ok(existing.clone());
        }
        let method = PaymentMethod::new(name.to_string(), company_id);
        state.payment_methods.push(method.clone());
        Ok(method)
    }

    async fn find_payment_for_transaction(&self, transaction_id: Uuid) -> RepositoryResult<Option<Payment>> {
        let state = self.lock()?;
        Ok(state
            .payments
            .iter()
            .find(|p| p.transaction_id == transaction_id)
            .cloned())
    }

    async fn record_fulfillment(&self, draft: FulfillmentDraft) -> RepositoryResult<FulfillmentRecord> {
        let mut state = self.lock()?;

        if !state.invoices.contains_key(&draft.invoice_id) {
            return Err(RepositoryError::NotFound(format!("invoice {}", draft.invoice_id)));
        }

        let position = state
            .transactions
            .iter()
            .position(|tx| tx.transaction_id == draft.session_id);

        let (transaction, transaction_created) = match position {
            Some(index) => {
                let mut tx = state.transactions[index].clone();
                match tx.complete() {
                    Completion::AlreadyCompleted => {
                        let payment = state
                            .payments
                            .iter()
                            .find(|p| p.transaction_id == tx.id)
                            .cloned();
                        return Ok(FulfillmentRecord::AlreadyFulfilled {
                            transaction: tx,
                            payment,
                        });
                    }
                    Completion::Rejected(status) => {
                        return Err(RepositoryError::Conflict(format!(
                            "transaction {} is {}",
                            tx.transaction_id, status
                        )));
                    }
                    Completion::Completed => {
                        state.transactions[index] = tx.clone();
                        (tx, false)
                    }
                }
            }
            None => {
                let tx = Transaction::new(
                    draft.session_id.clone(),
                    draft.provider.clone(),
                    TransactionStatus::Success,
                    draft.company_id,
                    draft.invoice_id,
                );
                (state.insert_transaction(&tx)?, true)
            }
        };

        if let Some(details) = state.invoices.get_mut(&draft.invoice_id) {
            let (remaining, paid_status) = settle(&details.invoice.due_amount, &draft.amount);
            details.invoice.due_amount = remaining;
            details.invoice.paid_status = paid_status;
        }

        let sequence_number = state.next_sequence_number(draft.company_id);
        let payment = draft.into_payment(transaction.id, sequence_number);
        state.payments.push(payment.clone());

        Ok(FulfillmentRecord::Fulfilled {
            transaction,
            payment,
            transaction_created,
        })
    }
}
