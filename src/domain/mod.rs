//! Framework-agnostic billing entities.

pub mod invoice;
pub mod money;
pub mod payment;
pub mod transaction;

pub use invoice::{Company, Currency, Customer, Invoice, InvoiceDetails, InvoiceLookup, PaidStatus};
pub use payment::{FulfillmentDraft, Payment, PaymentMethod};
pub use transaction::{Completion, Transaction, TransactionStatus};
