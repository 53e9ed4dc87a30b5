pub mod records;
pub mod transactions;
