pub mod etherscan;

use async_trait::async_trait;

use crate::models::common::{Category, PageRange};
use crate::models::datasets::records::{
    CategoryRecords, InternalCallRecord, NativeTransferRecord, TokenTransferRecord,
};
use crate::models::errors::ProviderError;

pub use etherscan::EtherscanClient;

/// Upstream source of raw account history, one operation per category.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn fetch_native_transfers(
        &self,
        address: &str,
        pages: PageRange,
    ) -> Result<Vec<NativeTransferRecord>, ProviderError>;

    async fn fetch_internal_calls(
        &self,
        address: &str,
        pages: PageRange,
    ) -> Result<Vec<InternalCallRecord>, ProviderError>;

    async fn fetch_erc20_transfers(
        &self,
        address: &str,
        pages: PageRange,
    ) -> Result<Vec<TokenTransferRecord>, ProviderError>;

    async fn fetch_erc721_transfers(
        &self,
        address: &str,
        pages: PageRange,
    ) -> Result<Vec<TokenTransferRecord>, ProviderError>;

    async fn fetch_erc1155_transfers(
        &self,
        address: &str,
        pages: PageRange,
    ) -> Result<Vec<TokenTransferRecord>, ProviderError>;
}

/// Route a category to its provider operation.
pub async fn fetch_category(
    provider: &dyn Provider,
    category: Category,
    address: &str,
    pages: PageRange,
) -> Result<CategoryRecords, ProviderError> {
    match category {
        Category::Native => provider
            .fetch_native_transfers(address, pages)
            .await
            .map(CategoryRecords::Native),
        Category::Internal => provider
            .fetch_internal_calls(address, pages)
            .await
            .map(CategoryRecords::Internal),
        Category::Erc20 => provider
            .fetch_erc20_transfers(address, pages)
            .await
            .map(CategoryRecords::Erc20),
        Category::Erc721 => provider
            .fetch_erc721_transfers(address, pages)
            .await
            .map(CategoryRecords::Erc721),
        Category::Erc1155 => provider
            .fetch_erc1155_transfers(address, pages)
            .await
            .map(CategoryRecords::Erc1155),
    }
}
