use crate::domain::loan::{InterestAccrual, Loan, LoanStatus};
use crate::domain::money::Balance;
use crate::domain::ports::{
    LedgerStore, NewInterestAccrual, NewLedgerEntry, NewLoan, NewTransactionLog, UnitOfWork,
};
use crate::domain::transfer::{TransactionLog, TransferStatus};
use crate::domain::wallet::{LedgerEntry, Wallet};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

type RowLocks = Arc<Mutex<HashMap<Uuid, Arc<RowMutex<()>>>>>;

#[derive(Default)]
struct State {
    wallets: HashMap<Uuid, Wallet>,
    wallet_ids_by_user: HashMap<Uuid, Uuid>,
    logs: HashMap<Uuid, TransactionLog>,
    log_ids_by_key: HashMap<String, Uuid>,
    entries: Vec<LedgerEntry>,
    loans: HashMap<Uuid, Loan>,
    accruals: Vec<InterestAccrual>,
    accrued_dates: HashSet<(Uuid, NaiveDate)>,
}

impl State {
    /// PENDING -> {COMPLETED, FAILED}, exactly once.
    fn transition_log(&mut self, log_id: Uuid, status: TransferStatus) -> Result<()> {
        let log = self
            .logs
            .get_mut(&log_id)
            .ok_or_else(|| LedgerError::NotFound("transaction log not found".to_string()))?;
        if log.status != TransferStatus::Pending {
            return Err(LedgerError::Conflict(
                "transaction log status is already finalized".to_string(),
            ));
        }
        log.status = status;
        Ok(())
    }
}

/// In-memory [`LedgerStore`] with the locking and atomicity semantics of the
/// row-locked relational store the core is written against.
///
/// Each wallet row (keyed by user id) and each loan row carries an async
/// mutex; a unit of work holds the guards it acquired until commit or
/// rollback, and stages its writes so they apply atomically under the global
/// state lock. Uniqueness constraints (idempotency key, one wallet per user,
/// one accrual per loan-date) are enforced here the way a relational schema
/// would enforce them.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    state: Arc<RwLock<State>>,
    row_locks: RowLocks,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

async fn lock_row(locks: &RowLocks, key: Uuid) -> OwnedMutexGuard<()> {
    let row = {
        let mut map = locks.lock().expect("row lock registry poisoned");
        map.entry(key)
            .or_insert_with(|| Arc::new(RowMutex::new(())))
            .clone()
    };
    row.lock_owned().await
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        Ok(Box::new(InMemoryUnitOfWork {
            state: self.state.clone(),
            row_locks: self.row_locks.clone(),
            held: HashMap::new(),
            staged: Vec::new(),
        }))
    }

    async fn find_wallet_by_user(&self, user_id: Uuid) -> Result<Option<Wallet>> {
        let state = self.state.read().await;
        Ok(state
            .wallet_ids_by_user
            .get(&user_id)
            .and_then(|id| state.wallets.get(id))
            .cloned())
    }

    async fn all_wallets(&self) -> Result<Vec<Wallet>> {
        let state = self.state.read().await;
        Ok(state.wallets.values().cloned().collect())
    }

    async fn find_log_by_idempotency_key(&self, key: &str) -> Result<Option<TransactionLog>> {
        let state = self.state.read().await;
        Ok(state
            .log_ids_by_key
            .get(key)
            .and_then(|id| state.logs.get(id))
            .cloned())
    }

    async fn create_transaction_log(&self, new_log: NewTransactionLog) -> Result<TransactionLog> {
        let mut state = self.state.write().await;
        if state.log_ids_by_key.contains_key(&new_log.idempotency_key) {
            return Err(LedgerError::Conflict(
                "idempotency key is already in use".to_string(),
            ));
        }
        let log = TransactionLog {
            id: Uuid::new_v4(),
            idempotency_key: new_log.idempotency_key,
            sender_id: new_log.sender_id,
            receiver_id: new_log.receiver_id,
            amount: new_log.amount,
            status: TransferStatus::Pending,
            reference: new_log.reference,
            created_at: chrono::Utc::now(),
        };
        state
            .log_ids_by_key
            .insert(log.idempotency_key.clone(), log.id);
        state.logs.insert(log.id, log.clone());
        Ok(log)
    }

    async fn set_log_status(&self, log_id: Uuid, status: TransferStatus) -> Result<()> {
        let mut state = self.state.write().await;
        state.transition_log(log_id, status)
    }

    async fn ledger_entries_for_log(&self, log_id: Uuid) -> Result<Vec<LedgerEntry>> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .iter()
            .filter(|entry| entry.transaction_log_id == log_id)
            .cloned()
            .collect())
    }

    async fn create_loan(&self, new_loan: NewLoan) -> Result<Loan> {
        let mut state = self.state.write().await;
        let loan = Loan {
            id: Uuid::new_v4(),
            user_id: new_loan.user_id,
            principal: new_loan.principal,
            annual_rate: new_loan.annual_rate,
            accrued_interest: Balance::ZERO,
            last_interest_date: new_loan.start_date,
            status: LoanStatus::Active,
        };
        state.loans.insert(loan.id, loan.clone());
        Ok(loan)
    }

    async fn find_loan(&self, loan_id: Uuid) -> Result<Option<Loan>> {
        let state = self.state.read().await;
        Ok(state.loans.get(&loan_id).cloned())
    }

    async fn loans_for_user(&self, user_id: Uuid) -> Result<Vec<Loan>> {
        let state = self.state.read().await;
        Ok(state
            .loans
            .values()
            .filter(|loan| loan.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn set_loan_status(&self, loan_id: Uuid, status: LoanStatus) -> Result<()> {
        let mut state = self.state.write().await;
        let loan = state
            .loans
            .get_mut(&loan_id)
            .ok_or_else(|| LedgerError::NotFound("loan not found".to_string()))?;
        if loan.status == LoanStatus::Closed {
            return Err(LedgerError::InvalidState(
                "loan is already closed".to_string(),
            ));
        }
        loan.status = status;
        Ok(())
    }

    async fn accruals_for_loan(&self, loan_id: Uuid) -> Result<Vec<InterestAccrual>> {
        let state = self.state.read().await;
        let mut accruals: Vec<InterestAccrual> = state
            .accruals
            .iter()
            .filter(|accrual| accrual.loan_id == loan_id)
            .cloned()
            .collect();
        accruals.sort_by_key(|accrual| accrual.date);
        Ok(accruals)
    }

    async fn find_accrual(
        &self,
        loan_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<InterestAccrual>> {
        let state = self.state.read().await;
        Ok(state
            .accruals
            .iter()
            .find(|accrual| accrual.loan_id == loan_id && accrual.date == date)
            .cloned())
    }
}

enum Write {
    CreateWallet(Wallet),
    SetBalance {
        wallet_id: Uuid,
        balance: Balance,
    },
    InsertEntry(LedgerEntry),
    SetLogStatus {
        log_id: Uuid,
        status: TransferStatus,
    },
    InsertAccrual(InterestAccrual),
    SetLoanAccrued {
        loan_id: Uuid,
        accrued_interest: Balance,
        last_interest_date: NaiveDate,
    },
}

/// Unit of work over [`InMemoryLedger`]: holds row locks, stages writes, and
/// applies them all-or-nothing at commit. Dropping it releases the locks and
/// discards the staged writes, which is exactly a rollback.
pub struct InMemoryUnitOfWork {
    state: Arc<RwLock<State>>,
    row_locks: RowLocks,
    held: HashMap<Uuid, OwnedMutexGuard<()>>,
    staged: Vec<Write>,
}

impl InMemoryUnitOfWork {
    async fn lock(&mut self, key: Uuid) {
        // Re-locking a row this unit of work already holds would self-deadlock.
        if !self.held.contains_key(&key) {
            let guard = lock_row(&self.row_locks, key).await;
            self.held.insert(key, guard);
        }
    }

    /// A wallet created earlier in this unit of work, with staged balance
    /// updates applied.
    fn staged_wallet(&self, user_id: Uuid) -> Option<Wallet> {
        let mut wallet: Option<Wallet> = None;
        for write in &self.staged {
            match write {
                Write::CreateWallet(created) if created.user_id == user_id => {
                    wallet = Some(created.clone());
                }
                Write::SetBalance { wallet_id, balance } => {
                    if let Some(found) = wallet.as_mut()
                        && found.id == *wallet_id
                    {
                        found.balance = *balance;
                    }
                }
                _ => {}
            }
        }
        wallet
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn wallet_for_update(&mut self, user_id: Uuid) -> Result<Option<Wallet>> {
        self.lock(user_id).await;
        if let Some(wallet) = self.staged_wallet(user_id) {
            return Ok(Some(wallet));
        }
        let mut wallet = {
            let state = self.state.read().await;
            state
                .wallet_ids_by_user
                .get(&user_id)
                .and_then(|id| state.wallets.get(id))
                .cloned()
        };
        if let Some(found) = wallet.as_mut() {
            for write in &self.staged {
                if let Write::SetBalance { wallet_id, balance } = write
                    && *wallet_id == found.id
                {
                    found.balance = *balance;
                }
            }
        }
        Ok(wallet)
    }

    async fn create_wallet(&mut self, user_id: Uuid) -> Result<Wallet> {
        self.lock(user_id).await;
        let exists = self.staged_wallet(user_id).is_some() || {
            let state = self.state.read().await;
            state.wallet_ids_by_user.contains_key(&user_id)
        };
        if exists {
            return Err(LedgerError::Conflict(
                "user already has a wallet".to_string(),
            ));
        }
        let wallet = Wallet::new(user_id);
        self.staged.push(Write::CreateWallet(wallet.clone()));
        Ok(wallet)
    }

    async fn set_wallet_balance(&mut self, wallet_id: Uuid, balance: Balance) -> Result<()> {
        self.staged.push(Write::SetBalance { wallet_id, balance });
        Ok(())
    }

    async fn insert_ledger_entry(&mut self, entry: NewLedgerEntry) -> Result<()> {
        self.staged.push(Write::InsertEntry(LedgerEntry {
            id: Uuid::new_v4(),
            wallet_id: entry.wallet_id,
            transaction_log_id: entry.transaction_log_id,
            entry_type: entry.entry_type,
            amount: entry.amount,
            balance_before: entry.balance_before,
            balance_after: entry.balance_after,
        }));
        Ok(())
    }

    async fn set_log_status(&mut self, log_id: Uuid, status: TransferStatus) -> Result<()> {
        self.staged.push(Write::SetLogStatus { log_id, status });
        Ok(())
    }

    async fn loan_for_update(&mut self, loan_id: Uuid) -> Result<Option<Loan>> {
        self.lock(loan_id).await;
        let state = self.state.read().await;
        Ok(state.loans.get(&loan_id).cloned())
    }

    async fn insert_accrual(&mut self, accrual: NewInterestAccrual) -> Result<()> {
        let duplicate = self.staged.iter().any(|write| {
            matches!(write, Write::InsertAccrual(staged)
                if staged.loan_id == accrual.loan_id && staged.date == accrual.date)
        }) || {
            let state = self.state.read().await;
            state.accrued_dates.contains(&(accrual.loan_id, accrual.date))
        };
        if duplicate {
            return Err(LedgerError::Conflict(format!(
                "interest already accrued for {}",
                accrual.date
            )));
        }
        self.staged.push(Write::InsertAccrual(InterestAccrual {
            id: Uuid::new_v4(),
            loan_id: accrual.loan_id,
            date: accrual.date,
            daily_rate: accrual.daily_rate,
            principal: accrual.principal,
            interest: accrual.interest,
        }));
        Ok(())
    }

    async fn set_loan_accrued(
        &mut self,
        loan_id: Uuid,
        accrued_interest: Balance,
        last_interest_date: NaiveDate,
    ) -> Result<()> {
        self.staged.push(Write::SetLoanAccrued {
            loan_id,
            accrued_interest,
            last_interest_date,
        });
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let staged = std::mem::take(&mut self.staged);
        let mut state = self.state.write().await;

        // Validate every staged write before applying any, so a constraint
        // violation leaves committed state untouched.
        let mut creating: HashSet<Uuid> = HashSet::new();
        for write in &staged {
            match write {
                Write::CreateWallet(wallet) => {
                    if state.wallet_ids_by_user.contains_key(&wallet.user_id) {
                        return Err(LedgerError::Conflict(
                            "user already has a wallet".to_string(),
                        ));
                    }
                    creating.insert(wallet.id);
                }
                Write::SetBalance { wallet_id, balance } => {
                    if !state.wallets.contains_key(wallet_id) && !creating.contains(wallet_id) {
                        return Err(LedgerError::NotFound("wallet not found".to_string()));
                    }
                    if balance.is_negative() {
                        return Err(LedgerError::Store(
                            "refusing to commit a negative balance".to_string(),
                        ));
                    }
                }
                Write::SetLogStatus { log_id, .. } => {
                    match state.logs.get(log_id) {
                        Some(log) if log.status == TransferStatus::Pending => {}
                        Some(_) => {
                            return Err(LedgerError::Conflict(
                                "transaction log status is already finalized".to_string(),
                            ));
                        }
                        None => {
                            return Err(LedgerError::NotFound(
                                "transaction log not found".to_string(),
                            ));
                        }
                    }
                }
                Write::InsertAccrual(accrual) => {
                    if state.accrued_dates.contains(&(accrual.loan_id, accrual.date)) {
                        return Err(LedgerError::Conflict(format!(
                            "interest already accrued for {}",
                            accrual.date
                        )));
                    }
                }
                Write::SetLoanAccrued { loan_id, .. } => {
                    if !state.loans.contains_key(loan_id) {
                        return Err(LedgerError::NotFound("loan not found".to_string()));
                    }
                }
                Write::InsertEntry(_) => {}
            }
        }

        for write in staged {
            match write {
                Write::CreateWallet(wallet) => {
                    state.wallet_ids_by_user.insert(wallet.user_id, wallet.id);
                    state.wallets.insert(wallet.id, wallet);
                }
                Write::SetBalance { wallet_id, balance } => {
                    if let Some(wallet) = state.wallets.get_mut(&wallet_id) {
                        wallet.balance = balance;
                    }
                }
                Write::InsertEntry(entry) => {
                    state.entries.push(entry);
                }
                Write::SetLogStatus { log_id, status } => {
                    state.transition_log(log_id, status)?;
                }
                Write::InsertAccrual(accrual) => {
                    state.accrued_dates.insert((accrual.loan_id, accrual.date));
                    state.accruals.push(accrual);
                }
                Write::SetLoanAccrued {
                    loan_id,
                    accrued_interest,
                    last_interest_date,
                } => {
                    if let Some(loan) = state.loans.get_mut(&loan_id) {
                        loan.accrued_interest = accrued_interest;
                        loan.last_interest_date = last_interest_date;
                    }
                }
            }
        }
        Ok(())
        // Row lock guards drop here, after the state change is visible.
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        // Staged writes and row locks are discarded on drop.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Amount;
    use rust_decimal_macros::dec;

    fn amount(value: rust_decimal::Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let store = InMemoryLedger::new();
        let user = Uuid::new_v4();

        let mut uow = store.begin().await.unwrap();
        uow.create_wallet(user).await.unwrap();
        assert!(store.find_wallet_by_user(user).await.unwrap().is_none());

        uow.commit().await.unwrap();
        assert!(store.find_wallet_by_user(user).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_dropping_unit_of_work_rolls_back() {
        let store = InMemoryLedger::new();
        let user = Uuid::new_v4();

        {
            let mut uow = store.begin().await.unwrap();
            uow.create_wallet(user).await.unwrap();
            uow.rollback().await.unwrap();
        }
        assert!(store.find_wallet_by_user(user).await.unwrap().is_none());

        // A later unit of work can lock the same row again.
        let mut uow = store.begin().await.unwrap();
        assert!(uow.wallet_for_update(user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_your_own_staged_writes() {
        let store = InMemoryLedger::new();
        let user = Uuid::new_v4();

        let mut uow = store.begin().await.unwrap();
        let wallet = uow.create_wallet(user).await.unwrap();
        uow.set_wallet_balance(wallet.id, Balance::new(dec!(42)))
            .await
            .unwrap();
        let seen = uow.wallet_for_update(user).await.unwrap().unwrap();
        assert_eq!(seen.balance, Balance::new(dec!(42)));
    }

    #[tokio::test]
    async fn test_idempotency_key_is_unique() {
        let store = InMemoryLedger::new();
        let new_log = NewTransactionLog {
            idempotency_key: "key-1".to_string(),
            sender_id: Uuid::new_v4(),
            receiver_id: Uuid::new_v4(),
            amount: amount(dec!(10)),
            reference: "TXN-TEST".to_string(),
        };
        store.create_transaction_log(new_log.clone()).await.unwrap();
        assert!(matches!(
            store.create_transaction_log(new_log).await,
            Err(LedgerError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_log_status_transitions_once() {
        let store = InMemoryLedger::new();
        let log = store
            .create_transaction_log(NewTransactionLog {
                idempotency_key: "key-2".to_string(),
                sender_id: Uuid::new_v4(),
                receiver_id: Uuid::new_v4(),
                amount: amount(dec!(10)),
                reference: "TXN-TEST".to_string(),
            })
            .await
            .unwrap();

        store
            .set_log_status(log.id, TransferStatus::Completed)
            .await
            .unwrap();
        assert!(matches!(
            store.set_log_status(log.id, TransferStatus::Failed).await,
            Err(LedgerError::Conflict(_))
        ));
        let stored = store
            .find_log_by_idempotency_key("key-2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, TransferStatus::Completed);
    }

    #[tokio::test]
    async fn test_accrual_date_is_unique_per_loan() {
        let store = InMemoryLedger::new();
        let loan = store
            .create_loan(NewLoan {
                user_id: Uuid::new_v4(),
                principal: amount(dec!(1000)),
                annual_rate: dec!(10).try_into().unwrap(),
                start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            })
            .await
            .unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let accrual = NewInterestAccrual {
            loan_id: loan.id,
            date,
            daily_rate: dec!(0.0273972603),
            principal: loan.principal,
            interest: Balance::new(dec!(0.2740)),
        };

        let mut uow = store.begin().await.unwrap();
        uow.insert_accrual(accrual.clone()).await.unwrap();
        assert!(matches!(
            uow.insert_accrual(accrual.clone()).await,
            Err(LedgerError::Conflict(_))
        ));
        uow.commit().await.unwrap();

        // And it stays unique against committed state.
        let mut uow = store.begin().await.unwrap();
        assert!(matches!(
            uow.insert_accrual(accrual).await,
            Err(LedgerError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_row_lock_serializes_writers() {
        let store = InMemoryLedger::new();
        let user = Uuid::new_v4();

        let mut setup = store.begin().await.unwrap();
        setup.create_wallet(user).await.unwrap();
        setup.commit().await.unwrap();

        let mut holder = store.begin().await.unwrap();
        holder.wallet_for_update(user).await.unwrap();

        let contender_store = store.clone();
        let contender = tokio::spawn(async move {
            let mut uow = contender_store.begin().await.unwrap();
            uow.wallet_for_update(user).await.unwrap();
            uow.rollback().await.unwrap();
        });

        // The contender cannot make progress while the lock is held.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        holder.rollback().await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), contender)
            .await
            .expect("contender should finish once the lock is released")
            .unwrap();
    }
}
