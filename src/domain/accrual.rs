use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order status as reported by the accrual service.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccrualStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
}

/// Body of a `200 OK` from `GET /api/orders/{number}`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct AccrualResponse {
    pub order: String,
    pub status: AccrualStatus,
    /// Present only when `status` is PROCESSED.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accrual: Option<Decimal>,
}
