#![allow(dead_code)] // Allow unused fields in API data for completeness

use serde::{Deserialize, Serialize};

use crate::models::common::Category;

//////////////////////////////////// Provider Data /////////////////////////////////////
// Numeric fields stay decimal-digit strings: values can exceed 64 bits.

///////////////////////////////////// action=txlist ////////////////////////////////////
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NativeTransferRecord {
    pub block_number: String,
    pub time_stamp: String,
    pub hash: String,
    pub nonce: String,
    pub block_hash: String,
    pub transaction_index: String,
    pub from: String,
    pub to: String,
    pub value: String,
    pub gas: String,
    pub gas_price: String,
    pub is_error: String,
    #[serde(rename = "txreceipt_status")]
    pub tx_receipt_status: String,
    pub input: String,
    pub contract_address: String,
    pub cumulative_gas_used: String,
    pub gas_used: String,
    pub confirmations: String,
    pub method_id: String,
    pub function_name: String,
}

/////////////////////////////// action=txlistinternal //////////////////////////////////
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InternalCallRecord {
    pub block_number: String,
    pub time_stamp: String,
    pub hash: String,
    pub from: String,
    pub to: String,
    pub value: String,
    pub contract_address: String,
    pub input: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub gas: String,
    pub gas_used: String,
    pub trace_id: String,
    pub is_error: String,
    pub err_code: String,
}

//////////////////////// action=tokentx | tokennfttx | token1155tx /////////////////////
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TokenTransferRecord {
    pub block_number: String,
    pub time_stamp: String,
    pub hash: String,
    pub nonce: String,
    pub block_hash: String,
    pub from: String,
    pub contract_address: String,
    pub to: String,
    pub value: String,
    pub token_name: String,
    pub token_symbol: String,
    pub token_decimal: String,
    pub transaction_index: String,
    pub gas: String,
    pub gas_price: String,
    pub gas_used: String,
    pub cumulative_gas_used: String,
    pub input: String,
    pub confirmations: String,
    pub is_error: String,
    #[serde(rename = "txreceipt_status")]
    pub tx_receipt_status: String,
    #[serde(rename = "tokenID")]
    pub token_id: String,
    pub token_value: String,
}

/// A single upstream record tagged with its category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawRecord {
    NativeTransfer(NativeTransferRecord),
    InternalCall(InternalCallRecord),
    Erc20Transfer(TokenTransferRecord),
    Erc721Transfer(TokenTransferRecord),
    Erc1155Transfer(TokenTransferRecord),
}

impl RawRecord {
    pub fn category(&self) -> Category {
        match self {
            RawRecord::NativeTransfer(_) => Category::Native,
            RawRecord::InternalCall(_) => Category::Internal,
            RawRecord::Erc20Transfer(_) => Category::Erc20,
            RawRecord::Erc721Transfer(_) => Category::Erc721,
            RawRecord::Erc1155Transfer(_) => Category::Erc1155,
        }
    }
}

/// All records returned by one provider call for a single category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryRecords {
    Native(Vec<NativeTransferRecord>),
    Internal(Vec<InternalCallRecord>),
    Erc20(Vec<TokenTransferRecord>),
    Erc721(Vec<TokenTransferRecord>),
    Erc1155(Vec<TokenTransferRecord>),
}

impl CategoryRecords {
    pub fn category(&self) -> Category {
        match self {
            CategoryRecords::Native(_) => Category::Native,
            CategoryRecords::Internal(_) => Category::Internal,
            CategoryRecords::Erc20(_) => Category::Erc20,
            CategoryRecords::Erc721(_) => Category::Erc721,
            CategoryRecords::Erc1155(_) => Category::Erc1155,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CategoryRecords::Native(r) => r.len(),
            CategoryRecords::Internal(r) => r.len(),
            CategoryRecords::Erc20(r) | CategoryRecords::Erc721(r) | CategoryRecords::Erc1155(r) => {
                r.len()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Raw records grouped by category, ready for normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecords {
    pub native: Vec<NativeTransferRecord>,
    pub internal: Vec<InternalCallRecord>,
    pub erc20: Vec<TokenTransferRecord>,
    pub erc721: Vec<TokenTransferRecord>,
    pub erc1155: Vec<TokenTransferRecord>,
}

impl RawRecords {
    pub fn insert(&mut self, records: CategoryRecords) {
        match records {
            CategoryRecords::Native(r) => self.native.extend(r),
            CategoryRecords::Internal(r) => self.internal.extend(r),
            CategoryRecords::Erc20(r) => self.erc20.extend(r),
            CategoryRecords::Erc721(r) => self.erc721.extend(r),
            CategoryRecords::Erc1155(r) => self.erc1155.extend(r),
        }
    }

    pub fn len(&self) -> usize {
        self.native.len()
            + self.internal.len()
            + self.erc20.len()
            + self.erc721.len()
            + self.erc1155.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count(&self, category: Category) -> usize {
        match category {
            Category::Native => self.native.len(),
            Category::Internal => self.internal.len(),
            Category::Erc20 => self.erc20.len(),
            Category::Erc721 => self.erc721.len(),
            Category::Erc1155 => self.erc1155.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_record_deserializes_etherscan_field_names() {
        let json = r#"{
            "blockNumber": "18000000",
            "timeStamp": "1700000000",
            "hash": "0xabc",
            "from": "0x1",
            "to": "0x2",
            "contractAddress": "0xc",
            "value": "1",
            "tokenSymbol": "PUNK",
            "tokenDecimal": "0",
            "tokenID": "42",
            "tokenValue": "3",
            "txreceipt_status": "1"
        }"#;

        let record: TokenTransferRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.block_number, "18000000");
        assert_eq!(record.token_id, "42");
        assert_eq!(record.token_value, "3");
        assert_eq!(record.tx_receipt_status, "1");
        // Absent fields default to empty strings
        assert_eq!(record.gas_price, "");
    }

    #[test]
    fn test_raw_records_grouping() {
        let mut records = RawRecords::default();
        records.insert(CategoryRecords::Native(vec![NativeTransferRecord::default()]));
        records.insert(CategoryRecords::Erc721(vec![TokenTransferRecord::default()]));
        records.insert(CategoryRecords::Erc721(vec![TokenTransferRecord::default()]));

        assert_eq!(records.len(), 3);
        assert_eq!(records.count(Category::Native), 1);
        assert_eq!(records.count(Category::Erc721), 2);
        assert_eq!(records.count(Category::Erc20), 0);
    }
}
