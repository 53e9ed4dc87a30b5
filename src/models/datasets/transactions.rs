use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::common::Category;

/////////////////////////////////// Normalized Data ////////////////////////////////////

/// Canonical transaction produced by the normalizer. Never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    pub from: String,
    pub to: String,
    pub category: Category,
    pub asset_contract_address: Option<String>,
    pub asset_symbol: Option<String>,
    pub token_id: Option<String>,
    /// Amount in the asset's natural unit, as an exact decimal string.
    pub amount: String,
    /// Fee in ETH, as an exact decimal string.
    pub gas_fee: String,

    // Auxiliary data, not exported
    pub block_number: u64,
    pub gas_used: u64,
    pub gas_price: Option<String>, // in wei
    pub nonce: Option<u64>,
    pub is_error: bool,
    pub input: Option<String>,
    pub method_id: Option<String>,
    pub function_name: Option<String>,
    pub decimals: Option<u8>,
}
