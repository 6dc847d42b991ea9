use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use super::LicenseKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    /// Still running, but with three days or less remaining
    Expiring,
    Expired,
}

impl SubscriptionStatus {
    /// Active and expiring subscriptions both still grant access.
    pub fn is_live(self) -> bool {
        !matches!(self, SubscriptionStatus::Expired)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Expiring,
    Expired,
    #[serde(alias = "multiActive")]
    MultiActive,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionFilter {
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub status: StatusFilter,
}

/// A used key seen as a customer subscription.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionRecord {
    #[serde(flatten)]
    pub key: LicenseKey,
    pub expires_at: i64,
    pub remaining_seconds: i64,
    pub status: SubscriptionStatus,
    /// Keys this customer has bought, any status
    pub purchase_count: usize,
    /// Keys this customer holds that have not expired
    pub active_count: usize,
    pub is_loyal: bool,
    pub is_multi_active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubscriptionSummary {
    pub active: usize,
    pub expiring: usize,
    pub expired: usize,
    pub customers: usize,
    pub multi_active_customers: usize,
}
