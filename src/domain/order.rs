use crate::domain::balance::Money;
use crate::error::{ReconcileError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type UserId = u64;

/// A Luhn-valid order number, kept as the digit string it was uploaded as.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNumber(String);

impl OrderNumber {
    pub fn parse(raw: &str) -> Result<Self> {
        let digits = raw.trim();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ReconcileError::ValidationError(format!(
                "Order number must be a non-empty digit string, got {raw:?}"
            )));
        }
        if !luhn_valid(digits) {
            return Err(ReconcileError::ValidationError(format!(
                "Order number {digits} fails the Luhn check"
            )));
        }
        Ok(Self(digits.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for OrderNumber {
    type Error = ReconcileError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<OrderNumber> for String {
    fn from(number: OrderNumber) -> Self {
        number.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn luhn_valid(digits: &str) -> bool {
    let sum: u32 = digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let n = u32::from(b - b'0');
            if i % 2 == 1 {
                let doubled = n * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                n
            }
        })
        .sum();
    sum % 10 == 0
}

/// Local processing state of an order.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    Processing,
    Invalid,
    Processed,
}

impl OrderStatus {
    /// Terminal states never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Invalid | OrderStatus::Processed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Invalid => "INVALID",
            OrderStatus::Processed => "PROCESSED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded order awaiting (or done with) accrual.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Order {
    pub number: OrderNumber,
    pub user: UserId,
    pub status: OrderStatus,
    /// Nonzero only once the order is PROCESSED.
    pub accrual: Money,
    pub uploaded_at: DateTime<Utc>,
}

impl Order {
    pub fn new(number: OrderNumber, user: UserId) -> Self {
        Self {
            number,
            user,
            status: OrderStatus::New,
            accrual: Money::ZERO,
            uploaded_at: Utc::now(),
        }
    }

    /// Applies a transition that the store has already checked against the
    /// stored status.
    pub fn apply(&mut self, transition: &OrderTransition) {
        self.status = transition.to;
        self.accrual = if transition.to == OrderStatus::Processed {
            transition.accrual
        } else {
            Money::ZERO
        };
    }
}

/// A status change computed from one accrual response, conditioned on the
/// status it was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderTransition {
    pub number: OrderNumber,
    pub user: UserId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub accrual: Money,
}

impl OrderTransition {
    pub fn new(order: &Order, to: OrderStatus, accrual: Money) -> Self {
        Self {
            number: order.number.clone(),
            user: order.user,
            from: order.status,
            to,
            accrual,
        }
    }

    /// The amount to credit to the owner's balance in the same commit.
    pub fn credit(&self) -> Option<Money> {
        (self.to == OrderStatus::Processed && !self.accrual.is_zero()).then_some(self.accrual)
    }
}
