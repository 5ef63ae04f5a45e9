use crate::domain::money::{Amount, Balance};
use crate::domain::ports::{
    LedgerStoreRef, NewLedgerEntry, NewTransactionLog, ReferenceSourceRef, UnitOfWork,
};
use crate::domain::transfer::{TransactionLog, TransferOutcome, TransferReceipt, TransferStatus};
use crate::domain::wallet::EntryType;
use crate::error::{LedgerError, Result};
use tracing::warn;
use uuid::Uuid;

/// Idempotent, atomic, double-entry money movement between two wallets.
pub struct TransferEngine {
    store: LedgerStoreRef,
    references: ReferenceSourceRef,
}

impl TransferEngine {
    pub fn new(store: LedgerStoreRef, references: ReferenceSourceRef) -> Self {
        Self { store, references }
    }

    /// Moves `amount` from the sender's wallet to the receiver's.
    ///
    /// The idempotency key makes retries safe: a COMPLETED key replays the
    /// stored outcome, a PENDING key is rejected as in flight, and a FAILED
    /// key is permanently consumed and must be replaced for a retry.
    pub async fn transfer(
        &self,
        sender_id: Uuid,
        idempotency_key: &str,
        receiver_id: Uuid,
        amount: Amount,
    ) -> Result<TransferOutcome> {
        if sender_id == receiver_id {
            return Err(LedgerError::Validation(
                "cannot transfer to yourself".to_string(),
            ));
        }
        if idempotency_key.is_empty() {
            return Err(LedgerError::Validation(
                "idempotency key must not be empty".to_string(),
            ));
        }

        if let Some(log) = self
            .store
            .find_log_by_idempotency_key(idempotency_key)
            .await?
        {
            return match log.status {
                TransferStatus::Completed => Ok(TransferOutcome {
                    message: "Transfer already processed",
                    transaction: self.replay_receipt(log).await?,
                }),
                TransferStatus::Pending => Err(LedgerError::Conflict(
                    "transfer is already being processed".to_string(),
                )),
                TransferStatus::Failed => Err(LedgerError::Conflict(
                    "previous transfer with this key failed; retry with a new idempotency key"
                        .to_string(),
                )),
            };
        }

        // The PENDING row is written before the atomic section so a crash or
        // failure leaves a durable record that blocks key reuse.
        let log = self
            .store
            .create_transaction_log(NewTransactionLog {
                idempotency_key: idempotency_key.to_string(),
                sender_id,
                receiver_id,
                amount,
                reference: self.references.next_reference(),
            })
            .await?;

        match self.execute(&log, sender_id, receiver_id, amount).await {
            Ok(receipt) => Ok(TransferOutcome {
                message: "Transfer successful",
                transaction: receipt,
            }),
            Err(err) => {
                // Best-effort FAILED mark outside the rolled-back unit of
                // work. If it fails the log stays PENDING, which still blocks
                // key reuse; the original error is what propagates.
                if let Err(mark_err) = self
                    .store
                    .set_log_status(log.id, TransferStatus::Failed)
                    .await
                {
                    warn!(
                        transaction_id = %log.id,
                        error = %mark_err,
                        "could not mark transfer FAILED; leaving it PENDING"
                    );
                }
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        log: &TransactionLog,
        sender_id: Uuid,
        receiver_id: Uuid,
        amount: Amount,
    ) -> Result<TransferReceipt> {
        let mut uow = self.store.begin().await?;
        match transfer_in(uow.as_mut(), log, sender_id, receiver_id, amount).await {
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

    /// Rebuilds the receipt for a COMPLETED log from its DEBIT ledger row.
    async fn replay_receipt(&self, log: TransactionLog) -> Result<TransferReceipt> {
        let entries = self.store.ledger_entries_for_log(log.id).await?;
        let debit = entries
            .iter()
            .find(|entry| entry.entry_type == EntryType::Debit)
            .ok_or_else(|| {
                LedgerError::Store("completed transfer has no debit ledger entry".to_string())
            })?;
        Ok(TransferReceipt {
            transaction_id: log.id,
            reference: log.reference,
            sender_id: log.sender_id,
            receiver_id: log.receiver_id,
            amount: log.amount.to_canonical(),
            sender_new_balance: debit.balance_after.to_canonical(),
            status: TransferStatus::Completed,
        })
    }
}

/// The atomic section: lock order, sufficiency check, balance writes, and the
/// double ledger entry, all against one unit of work.
async fn transfer_in(
    uow: &mut dyn UnitOfWork,
    log: &TransactionLog,
    sender_id: Uuid,
    receiver_id: Uuid,
    amount: Amount,
) -> Result<TransferReceipt> {
    // Lock the lexicographically smaller user id first, regardless of role.
    // Every path that locks two wallets must use this order or two opposing
    // transfers can deadlock.
    let (first, second) = if sender_id < receiver_id {
        (sender_id, receiver_id)
    } else {
        (receiver_id, sender_id)
    };
    let first_wallet = uow.wallet_for_update(first).await?;
    let second_wallet = uow.wallet_for_update(second).await?;
    let (Some(first_wallet), Some(second_wallet)) = (first_wallet, second_wallet) else {
        return Err(LedgerError::NotFound(
            "wallet not found for one or both users".to_string(),
        ));
    };

    let (sender_wallet, receiver_wallet) = if first_wallet.user_id == sender_id {
        (first_wallet, second_wallet)
    } else {
        (second_wallet, first_wallet)
    };

    if sender_wallet.balance < Balance::from(amount) {
        return Err(LedgerError::InsufficientFunds);
    }

    let new_sender_balance = sender_wallet.balance - Balance::from(amount);
    let new_receiver_balance = receiver_wallet.balance + Balance::from(amount);

    uow.set_wallet_balance(sender_wallet.id, new_sender_balance)
        .await?;
    uow.set_wallet_balance(receiver_wallet.id, new_receiver_balance)
        .await?;

    uow.insert_ledger_entry(NewLedgerEntry {
        wallet_id: sender_wallet.id,
        transaction_log_id: log.id,
        entry_type: EntryType::Debit,
        amount,
        balance_before: sender_wallet.balance,
        balance_after: new_sender_balance,
    })
    .await?;
    uow.insert_ledger_entry(NewLedgerEntry {
        wallet_id: receiver_wallet.id,
        transaction_log_id: log.id,
        entry_type: EntryType::Credit,
        amount,
        balance_before: receiver_wallet.balance,
        balance_after: new_receiver_balance,
    })
    .await?;

    uow.set_log_status(log.id, TransferStatus::Completed).await?;

    Ok(TransferReceipt {
        transaction_id: log.id,
        reference: log.reference.clone(),
        sender_id,
        receiver_id,
        amount: amount.to_canonical(),
        sender_new_balance: new_sender_balance.to_canonical(),
        status: TransferStatus::Completed,
    })
}
