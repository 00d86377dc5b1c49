//! Persistence adapters implementing BillingRepository.

pub mod in_memory_billing_repository;
pub mod postgres_billing_repository;

pub use in_memory_billing_repository::InMemoryBillingRepository;
pub use postgres_billing_repository::PostgresBillingRepository;
