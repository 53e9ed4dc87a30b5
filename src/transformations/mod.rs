pub mod etherscan;
pub mod units;

use crate::models::common::NormalizationOutcome;
use crate::models::datasets::records::{
    InternalCallRecord, NativeTransferRecord, RawRecord, TokenTransferRecord,
};

pub use etherscan::EtherscanNormalizer;

/// Converts one provider record into one canonical transaction.
///
/// Implementations must be pure: no I/O, deterministic for a given input. The
/// pipeline only depends on this seam, so a different provider's wire format
/// plugs in here without touching orchestration.
pub trait Normalizer: Send + Sync {
    fn normalize_native(&self, record: &NativeTransferRecord) -> NormalizationOutcome;

    fn normalize_internal(&self, record: &InternalCallRecord) -> NormalizationOutcome;

    fn normalize_erc20(&self, record: &TokenTransferRecord) -> NormalizationOutcome;

    fn normalize_erc721(&self, record: &TokenTransferRecord) -> NormalizationOutcome;

    fn normalize_erc1155(&self, record: &TokenTransferRecord) -> NormalizationOutcome;

    fn normalize(&self, record: &RawRecord) -> NormalizationOutcome {
        match record {
            RawRecord::NativeTransfer(r) => self.normalize_native(r),
            RawRecord::InternalCall(r) => self.normalize_internal(r),
            RawRecord::Erc20Transfer(r) => self.normalize_erc20(r),
            RawRecord::Erc721Transfer(r) => self.normalize_erc721(r),
            RawRecord::Erc1155Transfer(r) => self.normalize_erc1155(r),
        }
    }
}
