pub mod balance;
pub mod idempotency;
pub mod ledger;
pub mod subscription;
pub mod webhook_ingest;
