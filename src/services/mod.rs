pub mod invoicing;
pub mod orders;
pub mod payments;
pub mod receipts;
pub mod reconciliation;
pub mod wallet;
