use crate::domain::order::{OrderNumber, UserId};
use crate::error::{ReconcileError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A non-negative monetary value.
///
/// Wraps `rust_decimal::Decimal` so accruals and balances never pick up float
/// rounding, and so a negative amount cannot be constructed from outside input.
/// Serialized in normalized form (`25`, not `25.00`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(ReconcileError::ValidationError(format!(
                "Amount must not be negative, got {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Adds `rhs`, or `None` when the sum exceeds `Decimal`'s range.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// Subtracts `rhs`, or `None` when the result would be negative.
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        if self.0 >= rhs.0 {
            Some(Self(self.0 - rhs.0))
        } else {
            None
        }
    }
}

impl TryFrom<Decimal> for Money {
    type Error = ReconcileError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.normalize(), f)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        Serialize::serialize(&self.0.normalize(), serializer)
    }
}

/// A user's loyalty balance.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct UserBalance {
    pub user: UserId,
    /// Points available for withdrawal.
    pub current: Money,
    /// Points spent so far.
    pub withdrawn: Money,
}

impl UserBalance {
    pub fn new(user: UserId) -> Self {
        Self {
            user,
            current: Money::ZERO,
            withdrawn: Money::ZERO,
        }
    }

    /// Credits an accrual to the current balance. On overflow the balance is
    /// left untouched.
    pub fn credit(&mut self, amount: Money) -> Result<()> {
        self.current = self
            .current
            .checked_add(amount)
            .ok_or(ReconcileError::BalanceOverflow {
                user: self.user,
                amount,
            })?;
        Ok(())
    }

    /// Moves `amount` from current to withdrawn if sufficient.
    pub fn withdraw(&mut self, amount: Money) -> Result<()> {
        let remaining =
            self.current
                .checked_sub(amount)
                .ok_or(ReconcileError::InsufficientFunds {
                    available: self.current,
                    requested: amount,
                })?;
        let withdrawn = self
            .withdrawn
            .checked_add(amount)
            .ok_or(ReconcileError::BalanceOverflow {
                user: self.user,
                amount,
            })?;
        self.current = remaining;
        self.withdrawn = withdrawn;
        Ok(())
    }
}

/// A spend of loyalty points against an order number.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Withdrawal {
    pub order: OrderNumber,
    pub user: UserId,
    pub sum: Money,
    pub processed_at: DateTime<Utc>,
}

impl Withdrawal {
    pub fn new(order: OrderNumber, user: UserId, sum: Money) -> Self {
        Self {
            order,
            user,
            sum,
            processed_at: Utc::now(),
        }
    }
}
