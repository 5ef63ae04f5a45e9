use crate::domain::money::Amount;
use crate::domain::ports::LedgerStoreRef;
use crate::domain::wallet::Wallet;
use crate::error::{LedgerError, Result};
use serde::Serialize;
use uuid::Uuid;

/// Result of funding a wallet, with canonical 4-decimal amounts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FundReceipt {
    pub wallet_id: Uuid,
    pub previous_balance: String,
    pub amount_funded: String,
    pub new_balance: String,
}

/// Wallet lookup and funding.
pub struct WalletService {
    store: LedgerStoreRef,
}

impl WalletService {
    pub fn new(store: LedgerStoreRef) -> Self {
        Self { store }
    }

    pub async fn get_balance(&self, user_id: Uuid) -> Result<Wallet> {
        self.store
            .find_wallet_by_user(user_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound("wallet not found".to_string()))
    }

    /// Adds funds to a user's wallet, creating the wallet lazily on first
    /// funding. The locked read, optional create, and balance write share one
    /// unit of work.
    pub async fn fund_wallet(&self, user_id: Uuid, amount: Amount) -> Result<FundReceipt> {
        let mut uow = self.store.begin().await?;

        let result = async {
            let wallet = match uow.wallet_for_update(user_id).await? {
                Some(wallet) => wallet,
                None => uow.create_wallet(user_id).await?,
            };
            let previous_balance = wallet.balance;
            let new_balance = previous_balance + amount.into();
            uow.set_wallet_balance(wallet.id, new_balance).await?;
            Ok(FundReceipt {
                wallet_id: wallet.id,
                previous_balance: previous_balance.to_canonical(),
                amount_funded: amount.to_canonical(),
                new_balance: new_balance.to_canonical(),
            })
        }
        .await;

        match result {
            Ok(receipt) => {
                uow.commit().await?;
                Ok(receipt)
            }
            Err(err) => {
                let _ = uow.rollback().await;
                Err(err)
            }
        }
    }
}
