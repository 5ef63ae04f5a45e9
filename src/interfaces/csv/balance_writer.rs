use crate::domain::wallet::Wallet;
use std::io::Write;

/// Writes final wallet balances as CSV, sorted by user id for deterministic
/// output.
pub struct BalanceWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> BalanceWriter<W> {
    pub fn new(target: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(target),
        }
    }

    pub fn write_wallets(&mut self, mut wallets: Vec<Wallet>) -> Result<(), csv::Error> {
        wallets.sort_by_key(|wallet| wallet.user_id);
        self.writer.write_record(["user", "balance"])?;
        for wallet in wallets {
            self.writer
                .write_record([wallet.user_id.to_string(), wallet.balance.to_canonical()])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
