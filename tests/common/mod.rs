use ledger_core::application::transfer::TransferEngine;
use ledger_core::application::wallet::WalletService;
use ledger_core::domain::money::Amount;
use ledger_core::domain::ports::ReferenceSource;
use ledger_core::infrastructure::in_memory::InMemoryLedger;
use ledger_core::infrastructure::references::SystemReferences;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

pub struct StaticReferences(pub &'static str);

impl ReferenceSource for StaticReferences {
    fn next_reference(&self) -> String {
        self.0.to_string()
    }
}

pub fn amount(value: Decimal) -> Amount {
    Amount::new(value).unwrap()
}

pub fn transfer_engine(store: &Arc<InMemoryLedger>) -> TransferEngine {
    TransferEngine::new(store.clone(), Arc::new(SystemReferences::new()))
}

pub async fn funded_user(store: &Arc<InMemoryLedger>, balance: Decimal) -> Uuid {
    let user = Uuid::new_v4();
    WalletService::new(store.clone())
        .fund_wallet(user, amount(balance))
        .await
        .unwrap();
    user
}
