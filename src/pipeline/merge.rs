use crate::models::datasets::transactions::Transaction;

/// Order by block number, then confirmation time. Ties keep their input order.
pub fn sort_transactions(mut transactions: Vec<Transaction>) -> Vec<Transaction> {
    transactions.sort_by_key(|tx| (tx.block_number, tx.timestamp));
    transactions
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    use crate::models::common::Category;

    fn transaction(hash: &str, block_number: u64, timestamp: i64, category: Category) -> Transaction {
        Transaction {
            hash: hash.to_string(),
            timestamp: DateTime::from_timestamp(timestamp, 0).unwrap(),
            from: "0xfrom".to_string(),
            to: "0xto".to_string(),
            category,
            asset_contract_address: None,
            asset_symbol: None,
            token_id: None,
            amount: "1".to_string(),
            gas_fee: "0".to_string(),
            block_number,
            gas_used: 0,
            gas_price: None,
            nonce: None,
            is_error: false,
            input: None,
            method_id: None,
            function_name: None,
            decimals: None,
        }
    }

    fn hashes(transactions: &[Transaction]) -> Vec<&str> {
        transactions.iter().map(|tx| tx.hash.as_str()).collect()
    }

    #[test]
    fn test_sorts_by_block_then_time() {
        let sorted = sort_transactions(vec![
            transaction("c", 102, 30, Category::Erc20),
            transaction("b", 101, 25, Category::Native),
            transaction("a2", 101, 20, Category::Internal),
            transaction("a1", 100, 99, Category::Native),
        ]);

        assert_eq!(hashes(&sorted), vec!["a1", "a2", "b", "c"]);
    }

    #[test]
    fn test_ties_keep_input_order() {
        // A transfer and its internal call share block and timestamp
        let sorted = sort_transactions(vec![
            transaction("native", 100, 10, Category::Native),
            transaction("erc20", 99, 5, Category::Erc20),
            transaction("internal", 100, 10, Category::Internal),
            transaction("erc721", 100, 10, Category::Erc721),
        ]);

        assert_eq!(hashes(&sorted), vec!["erc20", "native", "internal", "erc721"]);
    }

    #[test]
    fn test_sort_is_idempotent() {
        let input = vec![
            transaction("x", 5, 1, Category::Native),
            transaction("y", 3, 1, Category::Native),
            transaction("z", 5, 1, Category::Erc1155),
            transaction("w", 4, 9, Category::Erc20),
        ];

        let once = sort_transactions(input.clone());
        let twice = sort_transactions(once.clone());
        assert_eq!(once, twice);
        assert_eq!(once, sort_transactions(input));
    }
}
