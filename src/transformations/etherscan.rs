use chrono::{DateTime, Utc};

use crate::models::common::{Category, NormalizationOutcome};
use crate::models::datasets::records::{
    InternalCallRecord, NativeTransferRecord, TokenTransferRecord,
};
use crate::models::datasets::transactions::Transaction;
use crate::models::errors::NormalizationError;
use crate::transformations::Normalizer;
use crate::transformations::units::{gas_fee_eth, parse_decimals, scale_units, wei_to_eth};

const NATIVE_SYMBOL: &str = "ETH";

/// Normalizer for Etherscan account API records.
#[derive(Debug, Clone, Copy, Default)]
pub struct EtherscanNormalizer;

impl EtherscanNormalizer {
    pub fn new() -> Self {
        Self
    }
}

fn parse_block_number(raw: &str) -> Result<u64, NormalizationError> {
    raw.parse::<u64>()
        .map_err(|_| NormalizationError::MalformedInteger {
            field: "blockNumber",
            value: raw.to_string(),
        })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, NormalizationError> {
    raw.parse::<i64>()
        .ok()
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .ok_or_else(|| NormalizationError::InvalidTimestamp {
            value: raw.to_string(),
        })
}

// Empty means absent; anything else must be a valid u64
fn parse_optional_u64(field: &'static str, raw: &str) -> Result<Option<u64>, NormalizationError> {
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<u64>()
        .map(Some)
        .map_err(|_| NormalizationError::MalformedInteger {
            field,
            value: raw.to_string(),
        })
}

fn non_empty(raw: &str) -> Option<String> {
    (!raw.is_empty()).then(|| raw.to_string())
}

fn require_token_id(raw: &str) -> Result<String, NormalizationError> {
    non_empty(raw.trim()).ok_or(NormalizationError::MissingField { field: "tokenID" })
}

impl EtherscanNormalizer {
    // Fields shared by the three token standards
    fn token_transaction(
        &self,
        record: &TokenTransferRecord,
        category: Category,
        amount: String,
        token_id: Option<String>,
        decimals: Option<u8>,
    ) -> NormalizationOutcome {
        Ok(Transaction {
            hash: record.hash.clone(),
            timestamp: parse_timestamp(&record.time_stamp)?,
            from: record.from.clone(),
            to: record.to.clone(),
            category,
            asset_contract_address: non_empty(&record.contract_address),
            asset_symbol: non_empty(&record.token_symbol),
            token_id,
            amount,
            gas_fee: gas_fee_eth(&record.gas_used, &record.gas_price)?,
            block_number: parse_block_number(&record.block_number)?,
            gas_used: parse_optional_u64("gasUsed", &record.gas_used)?.unwrap_or_default(),
            gas_price: non_empty(&record.gas_price),
            nonce: parse_optional_u64("nonce", &record.nonce)?,
            is_error: record.is_error == "1",
            input: non_empty(&record.input),
            method_id: None,
            function_name: None,
            decimals,
        })
    }
}

impl Normalizer for EtherscanNormalizer {
    fn normalize_native(&self, record: &NativeTransferRecord) -> NormalizationOutcome {
        Ok(Transaction {
            hash: record.hash.clone(),
            timestamp: parse_timestamp(&record.time_stamp)?,
            from: record.from.clone(),
            to: record.to.clone(),
            category: Category::Native,
            asset_contract_address: non_empty(&record.contract_address),
            asset_symbol: Some(NATIVE_SYMBOL.to_string()),
            token_id: None,
            amount: wei_to_eth(&record.value)?,
            gas_fee: gas_fee_eth(&record.gas_used, &record.gas_price)?,
            block_number: parse_block_number(&record.block_number)?,
            gas_used: parse_optional_u64("gasUsed", &record.gas_used)?.unwrap_or_default(),
            gas_price: non_empty(&record.gas_price),
            nonce: parse_optional_u64("nonce", &record.nonce)?,
            is_error: record.is_error == "1",
            input: non_empty(&record.input),
            method_id: non_empty(&record.method_id),
            function_name: non_empty(&record.function_name),
            decimals: None,
        })
    }

    fn normalize_internal(&self, record: &InternalCallRecord) -> NormalizationOutcome {
        Ok(Transaction {
            hash: record.hash.clone(),
            timestamp: parse_timestamp(&record.time_stamp)?,
            from: record.from.clone(),
            to: record.to.clone(),
            category: Category::Internal,
            asset_contract_address: non_empty(&record.contract_address),
            asset_symbol: Some(NATIVE_SYMBOL.to_string()),
            token_id: None,
            amount: wei_to_eth(&record.value)?,
            // Gas is paid by the parent transaction
            gas_fee: "0".to_string(),
            block_number: parse_block_number(&record.block_number)?,
            gas_used: parse_optional_u64("gasUsed", &record.gas_used)?.unwrap_or_default(),
            gas_price: None,
            nonce: None,
            is_error: record.is_error == "1",
            input: non_empty(&record.input),
            method_id: None,
            function_name: None,
            decimals: None,
        })
    }

    fn normalize_erc20(&self, record: &TokenTransferRecord) -> NormalizationOutcome {
        let decimals = parse_decimals(&record.token_decimal)?;
        let amount = scale_units("value", &record.value, decimals)?;

        self.token_transaction(record, Category::Erc20, amount, None, Some(decimals))
    }

    fn normalize_erc721(&self, record: &TokenTransferRecord) -> NormalizationOutcome {
        let token_id = require_token_id(&record.token_id)?;

        // Non-fungible: always exactly one token
        self.token_transaction(record, Category::Erc721, "1".to_string(), Some(token_id), None)
    }

    fn normalize_erc1155(&self, record: &TokenTransferRecord) -> NormalizationOutcome {
        let token_id = require_token_id(&record.token_id)?;

        let (field, quantity) = if !record.token_value.is_empty() {
            ("tokenValue", record.token_value.as_str())
        } else if !record.value.is_empty() {
            ("value", record.value.as_str())
        } else {
            return Err(NormalizationError::MissingField {
                field: "tokenValue",
            });
        };
        let amount = scale_units(field, quantity, 0)?;

        self.token_transaction(record, Category::Erc1155, amount, Some(token_id), None)
    }
}
