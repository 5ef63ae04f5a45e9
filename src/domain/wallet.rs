use super::money::{Amount, Balance};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's wallet. One per user, holding the cached balance.
///
/// The balance is derived state: the append-only ledger rows are the source of
/// truth, and a committed wallet balance is never negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance: Balance,
}

impl Wallet {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            balance: Balance::ZERO,
        }
    }
}

/// Side of a double-entry ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryType {
    Debit,
    Credit,
}

/// One immutable ledger row. Every completed transfer writes exactly two:
/// a DEBIT on the sender's wallet and a CREDIT on the receiver's, both linked
/// to the same transaction log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub transaction_log_id: Uuid,
    pub entry_type: EntryType,
    pub amount: Amount,
    pub balance_before: Balance,
    pub balance_after: Balance,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_wallet_starts_empty() {
        let user = Uuid::new_v4();
        let wallet = Wallet::new(user);
        assert_eq!(wallet.user_id, user);
        assert_eq!(wallet.balance, Balance::ZERO);
    }

    #[test]
    fn test_entry_type_wire_format() {
        assert_eq!(serde_json::to_string(&EntryType::Debit).unwrap(), "\"DEBIT\"");
        assert_eq!(serde_json::to_string(&EntryType::Credit).unwrap(), "\"CREDIT\"");
    }
}
