pub mod account;
pub mod package;
pub mod processed_event;
pub mod provider_event;
pub mod transaction;
