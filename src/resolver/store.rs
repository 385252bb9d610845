//! Alias table storage
//!
//! The table is shared by every concurrent query. Entries are only ever
//! added; a write is a single map insert so readers never observe a partial
//! entry. Two writers racing on the same key store the same mapping, so the
//! last one simply wins.

use crate::models::{ResolutionCacheEntry, ResolutionTier};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::aliases::SEED_ALIASES;

#[async_trait]
pub trait AliasStore: Send + Sync {
    async fn get(&self, query_key: &str) -> Option<ResolutionCacheEntry>;

    /// All entries in partial-match order: longest key first, ties alphabetical
    async fn entries(&self) -> Vec<ResolutionCacheEntry>;

    async fn insert(&self, entry: ResolutionCacheEntry);

    async fn len(&self) -> usize;
}

/// Process-lifetime alias table, no eviction
pub struct InMemoryAliasStore {
    entries: Arc<RwLock<HashMap<String, ResolutionCacheEntry>>>,
}

impl InMemoryAliasStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Store pre-populated with the static alias table
    pub fn seeded() -> Self {
        Self::with_aliases(SEED_ALIASES.iter().copied())
    }

    pub fn with_aliases<'a>(aliases: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let entries = aliases
            .into_iter()
            .map(|(alias, symbol)| {
                let query_key = alias.trim().to_lowercase();
                let entry = ResolutionCacheEntry {
                    query_key: query_key.clone(),
                    resolved_symbol: symbol.to_string(),
                    tier: ResolutionTier::Exact,
                };
                (query_key, entry)
            })
            .collect();

        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }
}

impl Default for InMemoryAliasStore {
    fn default() -> Self {
        Self::seeded()
    }
}

#[async_trait]
impl AliasStore for InMemoryAliasStore {
    async fn get(&self, query_key: &str) -> Option<ResolutionCacheEntry> {
        let entries = self.entries.read().await;
        entries.get(query_key).cloned()
    }

    async fn entries(&self) -> Vec<ResolutionCacheEntry> {
        let mut items: Vec<ResolutionCacheEntry> = {
            let entries = self.entries.read().await;
            entries.values().cloned().collect()
        };

        items.sort_by(|a, b| {
            b.query_key
                .chars()
                .count()
                .cmp(&a.query_key.chars().count())
                .then_with(|| a.query_key.cmp(&b.query_key))
        });

        items
    }

    async fn insert(&self, entry: ResolutionCacheEntry) {
        let mut entries = self.entries.write().await;
        entries.insert(entry.query_key.clone(), entry);
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
