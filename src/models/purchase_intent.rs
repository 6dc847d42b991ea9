use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// A purchase request captured by the storefront. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseIntent {
    pub id: String,
    pub created_at: i64,
    pub product_id: String,
    pub product_title: String,
    pub country: Option<String>,
    pub email: String,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePurchaseIntent {
    pub product_id: String,
    pub product_title: String,
    #[serde(default)]
    pub country: Option<String>,
    pub email: String,
    #[serde(default)]
    pub phone_number: Option<String>,
}

/// Derived from whether any key references the intent; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum IntentStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseIntentWithStatus {
    #[serde(flatten)]
    pub intent: PurchaseIntent,
    pub status: IntentStatus,
}
