use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::models::common::{PageRange, ProviderConfig};
use crate::models::datasets::records::{
    InternalCallRecord, NativeTransferRecord, TokenTransferRecord,
};
use crate::models::errors::ProviderError;
use crate::providers::Provider;
use crate::utils::strip_html;
use crate::utils::throttle::RequestThrottle;

const START_BLOCK: u64 = 0;
const END_BLOCK: u64 = 99_999_999;
const NO_TRANSACTIONS: &str = "No transactions found";

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: serde_json::Value,
}

/// `Provider` backed by the Etherscan account API.
pub struct EtherscanClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
    throttle: RequestThrottle,
}

impl EtherscanClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.parse()?,
            api_key: config.api_key.clone(),
            throttle: RequestThrottle::new(Duration::from_millis(config.request_interval_ms)),
        })
    }

    async fn fetch_list<T: DeserializeOwned>(
        &self,
        action: &str,
        address: &str,
        pages: PageRange,
    ) -> Result<Vec<T>, ProviderError> {
        let mut query = vec![
            ("module", "account".to_string()),
            ("action", action.to_string()),
            ("address", address.to_string()),
            ("startblock", START_BLOCK.to_string()),
            ("endblock", END_BLOCK.to_string()),
            ("page", pages.start.to_string()),
            ("offset", pages.offset().to_string()),
            ("sort", "asc".to_string()),
        ];
        if let Some(api_key) = &self.api_key {
            query.push(("apikey", api_key.clone()));
        }

        self.throttle.wait().await;
        debug!("Requesting {} for {} (page {}, offset {})", action, address, pages.start, pages.offset());

        let response = self
            .http
            .get(self.base_url.clone())
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        parse_response(&body)
    }
}

fn parse_response<T: DeserializeOwned>(body: &str) -> Result<Vec<T>, ProviderError> {
    let response: ApiResponse = serde_json::from_str(body)?;

    if response.status == "0" {
        // An empty history is reported as a failed status
        if response.message.starts_with(NO_TRANSACTIONS) {
            return Ok(Vec::new());
        }

        let message = match &response.result {
            serde_json::Value::String(text) if !text.is_empty() => strip_html(text),
            _ => strip_html(&response.message),
        };
        return Err(ProviderError::Api { message });
    }

    Ok(serde_json::from_value(response.result)?)
}

#[async_trait]
impl Provider for EtherscanClient {
    async fn fetch_native_transfers(
        &self,
        address: &str,
        pages: PageRange,
    ) -> Result<Vec<NativeTransferRecord>, ProviderError> {
        self.fetch_list("txlist", address, pages).await
    }

    async fn fetch_internal_calls(
        &self,
        address: &str,
        pages: PageRange,
    ) -> Result<Vec<InternalCallRecord>, ProviderError> {
        self.fetch_list("txlistinternal", address, pages).await
    }

    async fn fetch_erc20_transfers(
        &self,
        address: &str,
        pages: PageRange,
    ) -> Result<Vec<TokenTransferRecord>, ProviderError> {
        self.fetch_list("tokentx", address, pages).await
    }

    async fn fetch_erc721_transfers(
        &self,
        address: &str,
        pages: PageRange,
    ) -> Result<Vec<TokenTransferRecord>, ProviderError> {
        self.fetch_list("tokennfttx", address, pages).await
    }

    async fn fetch_erc1155_transfers(
        &self,
        address: &str,
        pages: PageRange,
    ) -> Result<Vec<TokenTransferRecord>, ProviderError> {
        self.fetch_list("token1155tx", address, pages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_successful_response() {
        let body = r#"{"status":"1","message":"OK","result":[
            {"blockNumber":"100","timeStamp":"1700000000","hash":"0xa","value":"1"},
            {"blockNumber":"101","timeStamp":"1700000012","hash":"0xb","value":"2"}
        ]}"#;

        let records: Vec<NativeTransferRecord> = parse_response(body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].hash, "0xb");
    }

    #[test]
    fn test_parse_empty_history() {
        let body = r#"{"status":"0","message":"No transactions found","result":[]}"#;
        let records: Vec<TokenTransferRecord> = parse_response(body).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_parse_api_error() {
        let body = r#"{"status":"0","message":"NOTOK","result":"Invalid API Key"}"#;
        let err = parse_response::<NativeTransferRecord>(body).unwrap_err();
        assert!(matches!(err, ProviderError::Api { ref message } if message == "Invalid API Key"));
    }

    #[test]
    fn test_parse_malformed_body() {
        let err = parse_response::<NativeTransferRecord>("<html>oops</html>").unwrap_err();
        assert!(matches!(err, ProviderError::Decode(_)));
    }
}
