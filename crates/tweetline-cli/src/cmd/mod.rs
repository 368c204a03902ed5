pub mod fetch;
pub mod ledger;
