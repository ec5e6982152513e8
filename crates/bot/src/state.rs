use std::sync::Arc;

use accord_core::Registry;
use accord_db::Database;
use accord_worker::WakeSignal;

#[derive(Clone)]
pub struct BotState {
    pub db: Database,
    pub registry: Arc<Registry>,
    pub wake: WakeSignal,
}

#[cfg(test)]
pub fn test_state() -> (BotState, accord_worker::WakeReceiver) {
    let (wake, receiver) = accord_worker::wake_signal();
    let state = BotState {
        db: Database::memory(),
        registry: Arc::new(Registry::default()),
        wake,
    };
    (state, receiver)
}
