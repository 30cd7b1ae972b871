use analysis_core::{OvertradingState, OvertradingStore};
use async_trait::async_trait;
use dashmap::DashMap;

/// Process-local overtrading store. Each symbol's state sits behind its
/// shard lock, so readers and the execution side never see a torn write.
#[derive(Default)]
pub struct InMemoryOvertradingStore {
    states: DashMap<String, OvertradingState>,
}

impl InMemoryOvertradingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.states.iter().map(|e| e.key().clone()).collect()
    }
}

#[async_trait]
impl OvertradingStore for InMemoryOvertradingStore {
    async fn load(&self, symbol: &str) -> OvertradingState {
        self.states
            .get(symbol)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }

    async fn compare_and_update(
        &self,
        symbol: &str,
        expected_version: u64,
        mut state: OvertradingState,
    ) -> bool {
        let mut entry = self.states.entry(symbol.to_string()).or_default();
        if entry.version != expected_version {
            return false;
        }
        state.version = expected_version + 1;
        *entry = state;
        true
    }

    async fn update(
        &self,
        symbol: &str,
        f: Box<dyn for<'a> FnOnce(&'a mut OvertradingState) + Send>,
    ) -> OvertradingState {
        let mut entry = self.states.entry(symbol.to_string()).or_default();
        let before = entry.version;
        f(entry.value_mut());
        if entry.version == before {
            entry.version += 1;
        }
        entry.value().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::PositionSide;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_load_unknown_symbol_is_default() {
        let store = InMemoryOvertradingStore::new();
        assert_eq!(store.load("AAPL").await, OvertradingState::default());
        assert!(store.symbols().is_empty());
    }

    #[tokio::test]
    async fn test_compare_and_update() {
        let store = InMemoryOvertradingStore::new();
        let mut state = store.load("AAPL").await;
        state.consecutive_losses = 1;

        assert!(store.compare_and_update("AAPL", 0, state.clone()).await);
        // stale writer loses
        assert!(!store.compare_and_update("AAPL", 0, state).await);

        let stored = store.load("AAPL").await;
        assert_eq!(stored.version, 1);
        assert_eq!(stored.consecutive_losses, 1);
    }

    #[tokio::test]
    async fn test_update_records_entries() {
        let store = InMemoryOvertradingStore::new();
        let now = Utc::now();
        let state = store
            .update(
                "MSFT",
                Box::new(move |s| s.record_entry(3, now, Duration::hours(6))),
            )
            .await;
        assert_eq!(state.last_entry_cycle, Some(3));
        assert_eq!(state.version, 1);

        let state = store
            .update("MSFT", Box::new(|s| s.consecutive_losses = 4))
            .await;
        assert_eq!(state.version, 2);
    }

    #[tokio::test]
    async fn test_update_through_trait_object() {
        let store: Arc<dyn OvertradingStore> = Arc::new(InMemoryOvertradingStore::new());
        let now = Utc::now();
        store
            .update(
                "TSLA",
                Box::new(move |s| s.record_entry(1, now, Duration::hours(6))),
            )
            .await;
        let state = store
            .update(
                "TSLA",
                Box::new(|s| s.record_exit(2, -5.0, PositionSide::Short)),
            )
            .await;

        assert_eq!(state.version, 2);
        assert_eq!(state.consecutive_short_losses, 1);
        assert_eq!(store.load("TSLA").await, state);
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_serialized() {
        let store = Arc::new(InMemoryOvertradingStore::new());
        let mut handles = Vec::new();
        for i in 0..32u64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update(
                        "NVDA",
                        Box::new(move |s| s.record_exit(i, -1.0, PositionSide::Long)),
                    )
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let state = store.load("NVDA").await;
        assert_eq!(state.consecutive_losses, 32);
        assert_eq!(state.version, 32);
    }
}
