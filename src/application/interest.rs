use crate::domain::loan::{daily_interest, InterestAccrual, Loan, LoanStatus};
use crate::domain::money::{to_fixed, Amount, Balance, Rate, DAILY_RATE_SCALE, MONEY_SCALE};
use crate::domain::ports::{LedgerStoreRef, NewInterestAccrual, NewLoan, UnitOfWork};
use crate::error::{LedgerError, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// One posted day in an accrual report. Rates carry 10 decimal places,
/// interest 4, both as canonical strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyAccrual {
    pub date: NaiveDate,
    pub daily_rate: String,
    pub interest: String,
}

/// Result of posting an accrual range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccrualReport {
    pub loan_id: Uuid,
    pub days_processed: usize,
    pub total_interest_accrued: String,
    pub new_total_accrued_interest: String,
    pub last_interest_date: NaiveDate,
    pub accruals: Vec<DailyAccrual>,
}

/// A loan together with its full accrual history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoanAccruals {
    pub loan: Loan,
    pub accruals: Vec<InterestAccrual>,
}

/// Date-range daily interest computation and its audit trail.
pub struct InterestEngine {
    store: LedgerStoreRef,
}

impl InterestEngine {
    pub fn new(store: LedgerStoreRef) -> Self {
        Self { store }
    }

    /// Opens a loan. Interest starts accruing the day after `start_date`.
    pub async fn create_loan(
        &self,
        user_id: Uuid,
        principal: Amount,
        annual_rate: Rate,
        start_date: NaiveDate,
    ) -> Result<Loan> {
        self.store
            .create_loan(NewLoan {
                user_id,
                principal,
                annual_rate,
                start_date,
            })
            .await
    }

    pub async fn get_loan(&self, loan_id: Uuid, caller_id: Uuid) -> Result<Loan> {
        let loan = self
            .store
            .find_loan(loan_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound("loan not found".to_string()))?;
        owned_by(&loan, caller_id)?;
        Ok(loan)
    }

    pub async fn get_loans(&self, user_id: Uuid) -> Result<Vec<Loan>> {
        self.store.loans_for_user(user_id).await
    }

    pub async fn get_accruals(&self, loan_id: Uuid, caller_id: Uuid) -> Result<LoanAccruals> {
        let loan = self.get_loan(loan_id, caller_id).await?;
        let accruals = self.store.accruals_for_loan(loan_id).await?;
        Ok(LoanAccruals { loan, accruals })
    }

    /// Posts daily interest from the day after the loan's watermark through
    /// `end_date` inclusive. Either the whole range posts or none of it does.
    pub async fn accrue_interest(
        &self,
        loan_id: Uuid,
        caller_id: Uuid,
        end_date: NaiveDate,
    ) -> Result<AccrualReport> {
        let mut uow = self.store.begin().await?;
        match accrue_in(uow.as_mut(), loan_id, caller_id, end_date).await {
            Ok(report) => {
                uow.commit().await?;
                Ok(report)
            }
            Err(err) => {
                let _ = uow.rollback().await;
                Err(err)
            }
        }
    }
}

fn owned_by(loan: &Loan, caller_id: Uuid) -> Result<()> {
    if loan.user_id != caller_id {
        return Err(LedgerError::Forbidden(
            "caller does not own this loan".to_string(),
        ));
    }
    Ok(())
}

async fn accrue_in(
    uow: &mut dyn UnitOfWork,
    loan_id: Uuid,
    caller_id: Uuid,
    end_date: NaiveDate,
) -> Result<AccrualReport> {
    let loan = uow
        .loan_for_update(loan_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound("loan not found".to_string()))?;
    owned_by(&loan, caller_id)?;
    if loan.status != LoanStatus::Active {
        return Err(LedgerError::InvalidState(
            "cannot accrue interest on a closed loan".to_string(),
        ));
    }

    let start_date = loan
        .last_interest_date
        .succ_opt()
        .ok_or_else(|| LedgerError::Validation("accrual date out of range".to_string()))?;
    if start_date > end_date {
        return Err(LedgerError::Validation(format!(
            "interest already accrued up to {}; end date must be after {}",
            loan.last_interest_date, loan.last_interest_date
        )));
    }

    let mut accruals = Vec::new();
    let mut total_interest = Decimal::ZERO;
    let mut date = start_date;
    while date <= end_date {
        let day = daily_interest(loan.principal, loan.annual_rate, date);

        // Rows and the running total carry the exact figures; rounding happens
        // only in the report strings. Summing the exact daily interest over a
        // whole year reproduces principal * rate / 100 with no drift.
        uow.insert_accrual(NewInterestAccrual {
            loan_id,
            date,
            daily_rate: day.daily_rate,
            principal: loan.principal,
            interest: Balance::new(day.interest),
        })
        .await?;

        accruals.push(DailyAccrual {
            date,
            daily_rate: to_fixed(day.daily_rate, DAILY_RATE_SCALE),
            interest: to_fixed(day.interest, MONEY_SCALE),
        });
        total_interest += day.interest;

        date = date
            .succ_opt()
            .ok_or_else(|| LedgerError::Validation("accrual date out of range".to_string()))?;
    }

    let new_accrued = loan.accrued_interest + Balance::new(total_interest);
    uow.set_loan_accrued(loan_id, new_accrued, end_date).await?;

    Ok(AccrualReport {
        loan_id,
        days_processed: accruals.len(),
        total_interest_accrued: to_fixed(total_interest, MONEY_SCALE),
        new_total_accrued_interest: new_accrued.to_canonical(),
        last_interest_date: end_date,
        accruals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::LedgerStore;
    use crate::infrastructure::in_memory::InMemoryLedger;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn active_loan(store: &Arc<InMemoryLedger>, user: Uuid) -> Loan {
        InterestEngine::new(store.clone())
            .create_loan(
                user,
                Amount::new(dec!(100000)).unwrap(),
                Rate::new(dec!(27.5)).unwrap(),
                date(2025, 1, 1),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_two_day_accrual_scenario() {
        let store = Arc::new(InMemoryLedger::new());
        let user = Uuid::new_v4();
        let loan = active_loan(&store, user).await;
        let engine = InterestEngine::new(store.clone());

        let report = engine
            .accrue_interest(loan.id, user, date(2025, 1, 3))
            .await
            .unwrap();

        assert_eq!(report.days_processed, 2);
        // The exact two-day sum is 150.68493150..., reported at 4 dp.
        assert_eq!(report.total_interest_accrued, "150.6849");
        assert_eq!(report.new_total_accrued_interest, "150.6849");
        assert_eq!(report.last_interest_date, date(2025, 1, 3));
        assert_eq!(report.accruals[0].date, date(2025, 1, 2));
        assert_eq!(report.accruals[0].interest, "75.3425");
        assert_eq!(report.accruals[0].daily_rate, "0.0753424658");
        assert_eq!(report.accruals[1].interest, "75.3425");

        let updated = engine.get_loan(loan.id, user).await.unwrap();
        assert_eq!(updated.accrued_interest.to_canonical(), "150.6849");
        assert_eq!(updated.last_interest_date, date(2025, 1, 3));
    }

    #[tokio::test]
    async fn test_watermark_rejects_already_posted_range() {
        let store = Arc::new(InMemoryLedger::new());
        let user = Uuid::new_v4();
        let loan = active_loan(&store, user).await;
        let engine = InterestEngine::new(store.clone());

        engine
            .accrue_interest(loan.id, user, date(2025, 1, 5))
            .await
            .unwrap();

        for end in [date(2025, 1, 5), date(2025, 1, 3), date(2024, 12, 31)] {
            let err = engine.accrue_interest(loan.id, user, end).await.unwrap_err();
            assert!(matches!(err, LedgerError::Validation(_)), "end {end}");
        }

        // The rejected calls posted nothing.
        let accruals = store.accruals_for_loan(loan.id).await.unwrap();
        assert_eq!(accruals.len(), 4);
    }

    #[tokio::test]
    async fn test_accrual_resumes_after_watermark() {
        let store = Arc::new(InMemoryLedger::new());
        let user = Uuid::new_v4();
        let loan = active_loan(&store, user).await;
        let engine = InterestEngine::new(store.clone());

        engine
            .accrue_interest(loan.id, user, date(2025, 1, 3))
            .await
            .unwrap();
        let second = engine
            .accrue_interest(loan.id, user, date(2025, 1, 4))
            .await
            .unwrap();

        assert_eq!(second.days_processed, 1);
        assert_eq!(second.total_interest_accrued, "75.3425");
        // 3 x (27500 / 365) exactly, not a sum of rounded days.
        assert_eq!(second.new_total_accrued_interest, "226.0274");
    }

    #[tokio::test]
    async fn test_year_boundary_switches_day_count() {
        let store = Arc::new(InMemoryLedger::new());
        let user = Uuid::new_v4();
        let engine = InterestEngine::new(store.clone());
        let loan = engine
            .create_loan(
                user,
                Amount::new(dec!(100000)).unwrap(),
                Rate::new(dec!(27.5)).unwrap(),
                date(2023, 12, 30),
            )
            .await
            .unwrap();

        let report = engine
            .accrue_interest(loan.id, user, date(2024, 1, 1))
            .await
            .unwrap();

        assert_eq!(report.days_processed, 2);
        // 2023-12-31 on a 365-day basis, 2024-01-01 on a 366-day basis.
        assert_eq!(report.accruals[0].interest, "75.3425");
        assert_eq!(report.accruals[1].interest, "75.1366");
    }

    #[tokio::test]
    async fn test_closed_loan_rejects_accrual() {
        let store = Arc::new(InMemoryLedger::new());
        let user = Uuid::new_v4();
        let loan = active_loan(&store, user).await;
        let engine = InterestEngine::new(store.clone());

        store
            .set_loan_status(loan.id, LoanStatus::Closed)
            .await
            .unwrap();
        let err = engine
            .accrue_interest(loan.id, user, date(2025, 2, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_ownership_checks() {
        let store = Arc::new(InMemoryLedger::new());
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let loan = active_loan(&store, owner).await;
        let engine = InterestEngine::new(store.clone());

        assert!(matches!(
            engine.get_loan(loan.id, stranger).await,
            Err(LedgerError::Forbidden(_))
        ));
        assert!(matches!(
            engine.accrue_interest(loan.id, stranger, date(2025, 2, 1)).await,
            Err(LedgerError::Forbidden(_))
        ));
        assert!(matches!(
            engine.get_accruals(loan.id, stranger).await,
            Err(LedgerError::Forbidden(_))
        ));
        assert!(matches!(
            engine.get_loan(Uuid::new_v4(), owner).await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_get_accruals_in_date_order() {
        let store = Arc::new(InMemoryLedger::new());
        let user = Uuid::new_v4();
        let loan = active_loan(&store, user).await;
        let engine = InterestEngine::new(store.clone());

        engine
            .accrue_interest(loan.id, user, date(2025, 1, 4))
            .await
            .unwrap();
        let result = engine.get_accruals(loan.id, user).await.unwrap();
        let dates: Vec<NaiveDate> = result.accruals.iter().map(|a| a.date).collect();
        assert_eq!(
            dates,
            vec![date(2025, 1, 2), date(2025, 1, 3), date(2025, 1, 4)]
        );
        assert_eq!(result.loan.id, loan.id);
    }

    #[tokio::test]
    async fn test_loans_for_user() {
        let store = Arc::new(InMemoryLedger::new());
        let user = Uuid::new_v4();
        let engine = InterestEngine::new(store.clone());
        active_loan(&store, user).await;
        active_loan(&store, user).await;
        active_loan(&store, Uuid::new_v4()).await;

        assert_eq!(engine.get_loans(user).await.unwrap().len(), 2);
    }
}
