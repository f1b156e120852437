#![allow(dead_code)]

use accrual_reconciler::accrual::client::{AccrualApi, AccrualOutcome};
use accrual_reconciler::domain::accrual::{AccrualResponse, AccrualStatus};
use accrual_reconciler::domain::order::{Order, OrderNumber, UserId};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Builds a Luhn-valid order number by appending the check digit to `body`.
pub fn luhn_number(body: u64) -> String {
    let digits = body.to_string();
    let sum: u32 = digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let n = u32::from(b - b'0');
            // Position 0 here becomes position 1 once the check digit is appended.
            if i % 2 == 0 {
                let doubled = n * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                n
            }
        })
        .sum();
    let check = (10 - sum % 10) % 10;
    format!("{digits}{check}")
}

pub fn order(body: u64, user: UserId) -> Order {
    Order::new(OrderNumber::parse(&luhn_number(body)).unwrap(), user)
}

pub fn response(number: &OrderNumber, status: AccrualStatus, accrual: Option<Decimal>) -> AccrualResponse {
    AccrualResponse {
        order: number.to_string(),
        status,
        accrual,
    }
}

type Script = Box<dyn Fn(&OrderNumber, usize) -> AccrualOutcome + Send + Sync>;

/// Accrual service double driven by a closure of `(order, call index)`.
pub struct FakeAccrual {
    script: Script,
    calls: AtomicUsize,
    seen: Mutex<Vec<(OrderNumber, tokio::time::Instant)>>,
}

impl FakeAccrual {
    pub fn new(script: impl Fn(&OrderNumber, usize) -> AccrualOutcome + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Always answers PROCESSED with `accrual` for every order.
    pub fn processed(accrual: Decimal) -> Self {
        Self::new(move |number, _| {
            AccrualOutcome::Success(response(number, AccrualStatus::Processed, Some(accrual)))
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<(OrderNumber, tokio::time::Instant)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccrualApi for FakeAccrual {
    async fn fetch(&self, number: &OrderNumber) -> AccrualOutcome {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((number.clone(), tokio::time::Instant::now()));
        tokio::task::yield_now().await;
        (self.script)(number, call)
    }
}
