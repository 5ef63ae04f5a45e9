use super::loan::{InterestAccrual, Loan, LoanStatus};
use super::money::{Amount, Balance, Rate};
use super::transfer::{TransactionLog, TransferStatus};
use super::wallet::{EntryType, LedgerEntry, Wallet};
use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

pub type LedgerStoreRef = Arc<dyn LedgerStore>;
pub type ReferenceSourceRef = Arc<dyn ReferenceSource>;

/// Fields for a new transfer attempt; the store records it as PENDING.
#[derive(Debug, Clone)]
pub struct NewTransactionLog {
    pub idempotency_key: String,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub amount: Amount,
    pub reference: String,
}

#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub wallet_id: Uuid,
    pub transaction_log_id: Uuid,
    pub entry_type: EntryType,
    pub amount: Amount,
    pub balance_before: Balance,
    pub balance_after: Balance,
}

#[derive(Debug, Clone)]
pub struct NewLoan {
    pub user_id: Uuid,
    pub principal: Amount,
    pub annual_rate: Rate,
    pub start_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct NewInterestAccrual {
    pub loan_id: Uuid,
    pub date: NaiveDate,
    pub daily_rate: Decimal,
    pub principal: Amount,
    pub interest: Balance,
}

/// Persistence port for the ledger core.
///
/// Methods on this trait autocommit individually; the two writes that rely on
/// this are the PENDING log insert and the best-effort FAILED mark, which must
/// survive a rolled-back transfer. Everything that mutates shared balances or
/// accrual state goes through a [`UnitOfWork`] obtained from [`begin`].
///
/// [`begin`]: LedgerStore::begin
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Opens an atomic unit of work. All writes issued through the handle
    /// either commit together or roll back together.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;

    async fn find_wallet_by_user(&self, user_id: Uuid) -> Result<Option<Wallet>>;
    async fn all_wallets(&self) -> Result<Vec<Wallet>>;

    async fn find_log_by_idempotency_key(&self, key: &str) -> Result<Option<TransactionLog>>;
    /// Inserts a PENDING log. Fails with `Conflict` if the key is taken.
    async fn create_transaction_log(&self, new_log: NewTransactionLog) -> Result<TransactionLog>;
    /// Transitions a log out of PENDING. A finalized log never transitions
    /// again; attempting to is a `Conflict`.
    async fn set_log_status(&self, log_id: Uuid, status: TransferStatus) -> Result<()>;
    async fn ledger_entries_for_log(&self, log_id: Uuid) -> Result<Vec<LedgerEntry>>;

    async fn create_loan(&self, new_loan: NewLoan) -> Result<Loan>;
    async fn find_loan(&self, loan_id: Uuid) -> Result<Option<Loan>>;
    async fn loans_for_user(&self, user_id: Uuid) -> Result<Vec<Loan>>;
    /// Loan closing belongs to an external collaborator; the port carries the
    /// transition so that collaborator can drive it. ACTIVE -> CLOSED is
    /// terminal.
    async fn set_loan_status(&self, loan_id: Uuid, status: LoanStatus) -> Result<()>;
    /// Accruals for a loan in ascending date order.
    async fn accruals_for_loan(&self, loan_id: Uuid) -> Result<Vec<InterestAccrual>>;
    async fn find_accrual(&self, loan_id: Uuid, date: NaiveDate) -> Result<Option<InterestAccrual>>;
}

/// One atomic unit of work against the ledger store.
///
/// `*_for_update` reads take a row-level write-intent lock that is held until
/// commit or rollback, so concurrent work on the same row serializes behind
/// this handle. Dropping the handle without committing rolls everything back.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Reads a user's wallet, locking the row for the lifetime of this unit
    /// of work.
    async fn wallet_for_update(&mut self, user_id: Uuid) -> Result<Option<Wallet>>;
    async fn create_wallet(&mut self, user_id: Uuid) -> Result<Wallet>;
    async fn set_wallet_balance(&mut self, wallet_id: Uuid, balance: Balance) -> Result<()>;
    async fn insert_ledger_entry(&mut self, entry: NewLedgerEntry) -> Result<()>;
    async fn set_log_status(&mut self, log_id: Uuid, status: TransferStatus) -> Result<()>;

    /// Reads a loan, locking its row for the lifetime of this unit of work.
    async fn loan_for_update(&mut self, loan_id: Uuid) -> Result<Option<Loan>>;
    async fn insert_accrual(&mut self, accrual: NewInterestAccrual) -> Result<()>;
    async fn set_loan_accrued(
        &mut self,
        loan_id: Uuid,
        accrued_interest: Balance,
        last_interest_date: NaiveDate,
    ) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Source of human-readable transfer references.
///
/// Injectable so tests can pin exact reference values instead of the engine
/// reading wall-clock time.
pub trait ReferenceSource: Send + Sync {
    fn next_reference(&self) -> String;
}
