use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseKey {
    pub id: String,
    pub product_id: String,
    /// The secret handed to the customer, unique across the whole store
    pub value: String,
    pub is_used: bool,
    pub used_by_email: Option<String>,
    pub used_at: Option<i64>,
    /// Explicit expiry override; when None the subscription runs 30 days from `used_at`
    pub expiration_date: Option<i64>,
    /// Purchase intent that consumed this key, if it was claimed for one
    pub purchase_intent_id: Option<String>,
    pub created_at: i64,
}

/// Who a key is being claimed for.
#[derive(Debug, Clone, Deserialize)]
pub struct ClaimKey {
    pub email: String,
    #[serde(default)]
    pub intent_id: Option<String>,
}

/// Result of a bulk key upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AddKeysOutcome {
    pub inserted: usize,
    /// Values dropped because they already existed (in the store or earlier in the batch)
    pub skipped: usize,
}

/// Result of a bulk delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoveKeysOutcome {
    pub removed: usize,
    pub not_found: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum KeyAvailability {
    #[default]
    All,
    Available,
    Used,
}

/// Stock levels for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductInventory {
    pub product_id: String,
    pub available: i64,
    pub used: i64,
    pub total: i64,
}
