use crate::domain::balance::UserBalance;
use crate::error::Result;
use std::io::Write;

/// Writes balances as `user,current,withdrawn` CSV.
pub struct BalanceWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> BalanceWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_balances(&mut self, balances: impl IntoIterator<Item = UserBalance>) -> Result<()> {
        let mut wrote_any = false;
        for balance in balances {
            self.writer.serialize(balance)?;
            wrote_any = true;
        }
        if !wrote_any {
            self.writer.write_record(["user", "current", "withdrawn"])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::balance::Money;
    use rust_decimal_macros::dec;

    #[test]
    fn test_writes_header_and_rows() {
        let mut balance = UserBalance::new(7);
        balance.credit(Money::new(dec!(500.5)).unwrap()).unwrap();

        let mut out = Vec::new();
        BalanceWriter::new(&mut out)
            .write_balances(vec![balance, UserBalance::new(8)])
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "user,current,withdrawn\n7,500.5,0\n8,0,0\n");
    }

    #[test]
    fn test_amounts_are_normalized() {
        let mut balance = UserBalance::new(3);
        for _ in 0..10 {
            balance.credit(Money::new(dec!(2.50)).unwrap()).unwrap();
        }

        let mut out = Vec::new();
        BalanceWriter::new(&mut out)
            .write_balances(vec![balance])
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "user,current,withdrawn\n3,25,0\n"
        );
    }

    #[test]
    fn test_header_only_when_empty() {
        let mut out = Vec::new();
        BalanceWriter::new(&mut out)
            .write_balances(Vec::new())
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "user,current,withdrawn\n");
    }
}
