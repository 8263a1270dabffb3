//! Lookup row fetching with at-most-one-in-flight semantics.
//!
//! The fetcher executes a [`LookupQuery`] against the provider, either inline
//! on the caller's task or on the runtime's worker pool, and publishes the
//! most recent [`FetchResult`] through a `watch` channel. A monotonically
//! increasing generation counter decides which request is current: a newer
//! `update` supersedes an older one, and the older task's result is checked
//! against the counter and dropped before it ever reaches a subscriber.

use crate::search::{SearchParam, WildcardPolicy};
use fieldkit_lookup::{
    inherit_master, ActiveFilter, LookupKey, LookupProvider, LookupQuery, LookupRow,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Immutable snapshot of one completed (or failed) lookup.
///
/// Exactly one of `rows` / `error` is meaningful. Every fetch produces and
/// publishes a fresh snapshot even when the content is unchanged: successive
/// results are deliberately never compared for equality, so the proposal
/// popup reopens on a repeated search.
#[derive(Debug, Clone, Serialize)]
pub struct FetchResult<K> {
    pub rows: Vec<LookupRow<K>>,
    pub search_text: String,
    pub select_current_value: bool,
    pub error: Option<String>,
    /// Generation of the request that produced this snapshot.
    pub generation: u64,
}

impl<K: LookupKey> FetchResult<K> {
    /// Whether the provider returned more rows than the configured limit.
    ///
    /// The fetcher requests `configured + 1` rows, so one surplus row means
    /// "there is more" without a second round trip.
    pub fn overflow(&self, configured_max: usize) -> bool {
        configured_max > 0 && self.rows.len() > configured_max
    }

    /// The rows to present, with the overflow-detection surplus trimmed.
    pub fn visible_rows(&self, configured_max: usize) -> &[LookupRow<K>] {
        if self.overflow(configured_max) {
            &self.rows[..configured_max]
        } else {
            &self.rows
        }
    }
}

/// Per-field fetch configuration.
#[derive(Debug, Clone, Default)]
pub struct FetchConfig {
    /// Row limit presented to the user; 0 means unlimited.
    pub max_row_count: usize,
    pub active: ActiveFilter,
    pub wildcards: WildcardPolicy,
    /// The field's own master value, if it defines one.
    pub master_value: Option<serde_json::Value>,
}

/// Executes lookup queries and publishes the latest result.
pub struct LookupRowFetcher<K: LookupKey> {
    provider: Arc<dyn LookupProvider<K>>,
    config: FetchConfig,
    generation: Arc<AtomicU64>,
    tx: Arc<watch::Sender<Option<FetchResult<K>>>>,
    rx: watch::Receiver<Option<FetchResult<K>>>,
    inherited_master: Mutex<Option<serde_json::Value>>,
}

impl<K: LookupKey> LookupRowFetcher<K> {
    pub fn new(provider: Arc<dyn LookupProvider<K>>, config: FetchConfig) -> Self {
        let (tx, rx) = watch::channel(None);
        Self {
            provider,
            config,
            generation: Arc::new(AtomicU64::new(0)),
            tx: Arc::new(tx),
            rx,
            inherited_master: Mutex::new(None),
        }
    }

    pub fn provider(&self) -> &Arc<dyn LookupProvider<K>> {
        &self.provider
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// The last published result, if any fetch completed yet.
    pub fn last_result(&self) -> Option<FetchResult<K>> {
        self.rx.borrow().clone()
    }

    /// Installs the master value received from an upstream master field.
    ///
    /// Subsequent queries carry it until the next change, unless the field
    /// defines its own master value, which always wins (see
    /// [`inherit_master`]).
    pub fn set_inherited_master(&self, master: Option<serde_json::Value>) {
        *self.inherited_master.lock() = master;
    }

    /// Subscribes to result publication. Each `update` that is not
    /// superseded marks the channel changed, even for identical content.
    pub fn subscribe(&self) -> watch::Receiver<Option<FetchResult<K>>> {
        self.rx.clone()
    }

    /// Executes the query inline and publishes the result before returning.
    pub async fn update(&self, search_text: &str, select_current_value: bool) -> FetchResult<K> {
        let generation = self.next_generation();
        let query = self.build_query(search_text);
        let result = Self::run(
            Arc::clone(&self.provider),
            query,
            search_text.to_string(),
            select_current_value,
            generation,
        )
        .await;
        self.publish(result.clone());
        result
    }

    /// Spawns the query on the worker pool.
    ///
    /// Cancellation is cooperative: the spawned task runs to completion, and
    /// its result is discarded if a newer request bumped the generation in
    /// the meantime.
    pub fn update_in_background(
        &self,
        search_text: &str,
        select_current_value: bool,
    ) -> JoinHandle<()> {
        let generation = self.next_generation();
        let query = self.build_query(search_text);
        let provider = Arc::clone(&self.provider);
        let tx = Arc::clone(&self.tx);
        let counter = Arc::clone(&self.generation);
        let search_text = search_text.to_string();
        tokio::spawn(async move {
            let result =
                Self::run(provider, query, search_text, select_current_value, generation).await;
            if counter.load(Ordering::SeqCst) == generation {
                tx.send_replace(Some(result));
            } else {
                tracing::debug!(generation, "discarding superseded background fetch");
            }
        })
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn publish(&self, result: FetchResult<K>) {
        if self.generation.load(Ordering::SeqCst) == result.generation {
            self.tx.send_replace(Some(result));
        } else {
            tracing::debug!(
                generation = result.generation,
                "discarding superseded fetch result"
            );
        }
    }

    /// Builds the query for a text update: empty or `*` browses everything,
    /// anything else searches by wildcard-normalized text. The row limit is
    /// raised by one for overflow detection, and the master value follows
    /// the inherit-unless-redefined rule.
    fn build_query(&self, search_text: &str) -> LookupQuery<K> {
        let query = match SearchParam::for_text(search_text, &self.config.wildcards) {
            SearchParam::BrowseAll => LookupQuery::by_all(None),
            SearchParam::Text(pattern) => LookupQuery::by_text(pattern),
        };
        let requested_max = if self.config.max_row_count > 0 {
            self.config.max_row_count + 1
        } else {
            0
        };
        let master = {
            let mut inherited = self.inherited_master.lock();
            let master = inherit_master(self.config.master_value.clone(), inherited.take());
            *inherited = master.clone();
            master
        };
        query
            .with_active(self.config.active)
            .with_max_row_count(requested_max)
            .with_master_value(master)
    }

    async fn run(
        provider: Arc<dyn LookupProvider<K>>,
        query: LookupQuery<K>,
        search_text: String,
        select_current_value: bool,
        generation: u64,
    ) -> FetchResult<K> {
        match provider.execute(&query).await {
            Ok(rows) => FetchResult {
                rows,
                search_text,
                select_current_value,
                error: None,
                generation,
            },
            Err(err) => {
                tracing::warn!(%err, %search_text, "lookup provider failed");
                FetchResult {
                    rows: Vec::new(),
                    search_text,
                    select_current_value,
                    error: Some(err.to_string()),
                    generation,
                }
            }
        }
    }
}
