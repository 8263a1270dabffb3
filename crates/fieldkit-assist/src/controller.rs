//! The proposal resolution controller: a smart field's decision core.
//!
//! Converts text edits and programmatic value assignments into a resolved
//! [`LookupRow`] plus committed value, and formats a committed value back
//! into display text. One state machine per field instance:
//!
//! ```text
//!   Idle ──text──► Searching ──single match──► Resolved
//!                      │                          ▲
//!                      └──candidates──► ChooserOpen──accept──┘
//! ```
//!
//! The controller owns no rendering; it publishes property changes as
//! [`FieldEvent`]s that a presentation layer observes.

use crate::chooser::{ChooserContent, TableChooserContent, TreeChooserContent};
use crate::fetcher::{FetchConfig, FetchResult, LookupRowFetcher};
use crate::ResolutionError;
use fieldkit_lookup::{Locality, LookupError, LookupKey, LookupProvider, LookupQuery, LookupRow};
use std::sync::Arc;
use tokio::sync::oneshot;

// ============================================================================
// States, events, outcomes
// ============================================================================

/// Resolution states of a field instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    /// No chooser open, no committed value.
    Idle,
    /// A query is in flight.
    Searching,
    /// Rows fetched, user choosing.
    ChooserOpen,
    /// A row has been accepted and committed as the field value.
    Resolved,
}

/// Property-change notifications for the rendering layer.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldEvent {
    DisplayText(String),
    Tooltip(Option<String>),
    BackgroundColor(Option<String>),
    ForegroundColor(Option<String>),
    Font(Option<String>),
    /// Warning/error status text; `None` clears it.
    Status(Option<String>),
    ChooserOpened { rows: usize },
    ChooserClosed,
}

/// Callback for field events.
pub type FieldEventHandler = Box<dyn Fn(&FieldEvent) + Send + Sync>;

/// Outcome of applying user input or a fetch result.
#[derive(Debug)]
pub enum Resolution<K> {
    /// A row was accepted and committed.
    Accepted(LookupRow<K>),
    /// Several candidates; the chooser is open, user selection required.
    ChooserOpen { rows: usize },
    /// Provider failure; the last good value is retained.
    Failed { message: String },
    /// Nothing changed (input equals the committed text).
    Unchanged,
}

// ============================================================================
// Policy
// ============================================================================

/// Per-field resolution policy.
pub struct ResolutionPolicy<K> {
    custom_text_key: Option<Box<dyn Fn(&str) -> K + Send + Sync>>,
    /// Auto-accept a unique acceptable row without opening the chooser.
    /// Applies uniformly, also when custom free text is permitted.
    pub auto_accept_single_match: bool,
    null_key: Option<Box<dyn Fn(&K) -> bool + Send + Sync>>,
    /// Present candidates as a parent-keyed tree instead of a flat table.
    pub hierarchical: bool,
}

impl<K> Default for ResolutionPolicy<K> {
    fn default() -> Self {
        Self {
            custom_text_key: None,
            auto_accept_single_match: true,
            null_key: None,
            hierarchical: false,
        }
    }
}

impl<K: LookupKey> ResolutionPolicy<K> {
    /// Permits custom free text: when a lookup returns no rows, the verbatim
    /// input becomes the value, with a key built by `make_key`.
    pub fn with_custom_text(
        mut self,
        make_key: impl Fn(&str) -> K + Send + Sync + 'static,
    ) -> Self {
        self.custom_text_key = Some(Box::new(make_key));
        self
    }

    /// Collapses "zero-ish" keys to `None` on validation, so "no value" is
    /// represented uniformly (numeric `0`, empty string) across key types.
    pub fn with_null_key(mut self, is_null: impl Fn(&K) -> bool + Send + Sync + 'static) -> Self {
        self.null_key = Some(Box::new(is_null));
        self
    }

    pub fn hierarchical(mut self) -> Self {
        self.hierarchical = true;
        self
    }

    pub fn allows_custom_text(&self) -> bool {
        self.custom_text_key.is_some()
    }

    fn normalize_key(&self, key: Option<K>) -> Option<K> {
        match (&self.null_key, key) {
            (Some(is_null), Some(key)) if is_null(&key) => None,
            (_, key) => key,
        }
    }
}

// ============================================================================
// Controller
// ============================================================================

#[derive(Debug, Clone, Default)]
struct Decoration {
    tooltip: Option<String>,
    background_color: Option<String>,
    foreground_color: Option<String>,
    font: Option<String>,
}

struct PendingFormat<K> {
    generation: u64,
    rx: oneshot::Receiver<Result<Option<LookupRow<K>>, LookupError>>,
}

/// Field-level controller owning the committed value, the cached accepted
/// row and the chooser reference. All state mutation happens on the owning
/// task; background lookups deliver immutable snapshots.
pub struct ProposalResolutionController<K: LookupKey> {
    fetcher: LookupRowFetcher<K>,
    policy: ResolutionPolicy<K>,
    state: ResolutionState,
    committed_value: Option<K>,
    /// The accepted row; the sentinel empty row when nothing is selected.
    cached_row: LookupRow<K>,
    display_text: String,
    tooltip: Option<String>,
    background_color: Option<String>,
    foreground_color: Option<String>,
    font: Option<String>,
    status: Option<String>,
    /// Fallback decoration: what application code set, never what a row
    /// propagated. Captured as the field's own look at initialization and
    /// updated only through the public setters outside propagation.
    decoration_defaults: Decoration,
    /// Re-entrancy guard: the public decoration setters are also called by
    /// row propagation, which must not loop back into the defaults.
    decorating: bool,
    chooser: Option<ChooserContent<K>>,
    key_lookup_generation: u64,
    pending_format: Option<PendingFormat<K>>,
    handlers: Vec<FieldEventHandler>,
}

impl<K: LookupKey> ProposalResolutionController<K> {
    pub fn new(
        provider: Arc<dyn LookupProvider<K>>,
        fetch_config: FetchConfig,
        policy: ResolutionPolicy<K>,
    ) -> Self {
        Self {
            fetcher: LookupRowFetcher::new(provider, fetch_config),
            policy,
            state: ResolutionState::Idle,
            committed_value: None,
            cached_row: LookupRow::empty(),
            display_text: String::new(),
            tooltip: None,
            background_color: None,
            foreground_color: None,
            font: None,
            status: None,
            decoration_defaults: Decoration::default(),
            decorating: false,
            chooser: None,
            key_lookup_generation: 0,
            pending_format: None,
            handlers: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Observability
    // ------------------------------------------------------------------

    pub fn on_event(&mut self, handler: FieldEventHandler) {
        self.handlers.push(handler);
    }

    fn emit(&self, event: FieldEvent) {
        for handler in &self.handlers {
            handler(&event);
        }
    }

    pub fn state(&self) -> ResolutionState {
        self.state
    }

    pub fn value(&self) -> Option<&K> {
        self.committed_value.as_ref()
    }

    pub fn display_text(&self) -> &str {
        &self.display_text
    }

    pub fn tooltip(&self) -> Option<&str> {
        self.tooltip.as_deref()
    }

    pub fn background_color(&self) -> Option<&str> {
        self.background_color.as_deref()
    }

    pub fn foreground_color(&self) -> Option<&str> {
        self.foreground_color.as_deref()
    }

    pub fn font(&self) -> Option<&str> {
        self.font.as_deref()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// The accepted row, or the sentinel empty row when nothing is selected.
    pub fn current_row(&self) -> &LookupRow<K> {
        &self.cached_row
    }

    pub fn chooser(&self) -> Option<&ChooserContent<K>> {
        self.chooser.as_ref()
    }

    pub fn chooser_mut(&mut self) -> Option<&mut ChooserContent<K>> {
        self.chooser.as_mut()
    }

    pub fn fetcher(&self) -> &LookupRowFetcher<K> {
        &self.fetcher
    }

    // ------------------------------------------------------------------
    // Text entry
    // ------------------------------------------------------------------

    /// Resolves user-typed text into a value.
    ///
    /// Empty input clears the value (the null/zero normalization makes "no
    /// value" uniformly `None`). Input equal to the current committed text
    /// is a no-op. Anything else goes through a text search whose result
    /// decides between auto-accept, chooser and veto.
    pub async fn parse_text(&mut self, input: &str) -> Result<Resolution<K>, ResolutionError> {
        let trimmed = input.trim();
        if self.state == ResolutionState::Resolved && trimmed == self.display_text {
            return Ok(Resolution::Unchanged);
        }
        if trimmed.is_empty() {
            let row = LookupRow::empty();
            self.install_row(row.clone(), String::new());
            return Ok(Resolution::Accepted(row));
        }
        self.state = ResolutionState::Searching;
        let result = self.fetcher.update(trimmed, false).await;
        self.apply_result(&result)
    }

    /// Opens the proposal chooser explicitly (browse gesture). Auto-accept
    /// is skipped: the user asked to choose.
    pub async fn open_proposal_chooser(&mut self) -> Result<Resolution<K>, ResolutionError> {
        self.state = ResolutionState::Searching;
        let result = self.fetcher.update("", true).await;
        if let Some(message) = &result.error {
            self.set_status_internal(Some(message.clone()));
            self.state = self.fallback_state();
            return Ok(Resolution::Failed {
                message: message.clone(),
            });
        }
        let rows = self.open_chooser(&result);
        Ok(Resolution::ChooserOpen { rows })
    }

    /// Applies a completed fetch to the field state. Used by [`parse_text`]
    /// for inline fetches and by owners draining background results.
    ///
    /// [`parse_text`]: Self::parse_text
    pub fn apply_result(
        &mut self,
        result: &FetchResult<K>,
    ) -> Result<Resolution<K>, ResolutionError> {
        if let Some(message) = &result.error {
            // Non-fatal: show the status, keep the last good value.
            self.set_status_internal(Some(message.clone()));
            self.state = self.fallback_state();
            return Ok(Resolution::Failed {
                message: message.clone(),
            });
        }

        let configured_max = self.fetcher.config().max_row_count;
        let visible = result.visible_rows(configured_max);

        if visible.is_empty() {
            if let Some(make_key) = &self.policy.custom_text_key {
                // Custom free text: the verbatim input becomes the value.
                let key = make_key(&result.search_text);
                let row = LookupRow::new(key, result.search_text.clone());
                self.install_row(row.clone(), result.search_text.clone());
                return Ok(Resolution::Accepted(row));
            }
            // Veto: input rejected, previous state retained.
            self.state = self.fallback_state();
            self.set_status_internal(Some(format!(
                "No proposal matches {:?}",
                result.search_text
            )));
            return Err(ResolutionError::NoMatch {
                text: result.search_text.clone(),
            });
        }

        // Browse gestures (select_current_value) and an already open chooser
        // require explicit user selection; only plain text entry may
        // auto-accept a unique match.
        if self.state != ResolutionState::ChooserOpen
            && !result.select_current_value
            && self.policy.auto_accept_single_match
        {
            if let Some(row) = Self::single_acceptable(visible) {
                let row = row.clone();
                let text = row.text.clone();
                self.install_row(row.clone(), text);
                return Ok(Resolution::Accepted(row));
            }
        }

        let rows = self.open_chooser(result);
        Ok(Resolution::ChooserOpen { rows })
    }

    /// The unique acceptable row, when the single-match policy is satisfied:
    /// exactly one row total, or all visible rows disabled except one.
    fn single_acceptable(rows: &[LookupRow<K>]) -> Option<&LookupRow<K>> {
        let mut enabled = rows.iter().filter(|row| row.enabled);
        let first = enabled.next()?;
        if enabled.next().is_some() {
            None
        } else {
            Some(first)
        }
    }

    // ------------------------------------------------------------------
    // Chooser interaction
    // ------------------------------------------------------------------

    /// Commits a row the user selected in the chooser.
    pub fn accept_proposal(&mut self, row: LookupRow<K>) -> Resolution<K> {
        let text = row.text.clone();
        self.install_row(row.clone(), text);
        Resolution::Accepted(row)
    }

    /// Commits the chooser's current selection, if it is acceptable.
    pub fn accept_selected(&mut self) -> Option<Resolution<K>> {
        let row = match self.chooser.as_ref()? {
            ChooserContent::Table(table) => table.accepted_row().cloned(),
            ChooserContent::Tree(tree) => tree.selected_row().filter(|row| row.enabled).cloned(),
        }?;
        Some(self.accept_proposal(row))
    }

    /// Closes the chooser and reverts to the last committed value by
    /// re-formatting it (never by clearing the field).
    pub fn cancel_chooser(&mut self) {
        self.close_chooser();
        let text = self.cached_row.text.clone();
        self.set_display_text_internal(text);
        self.set_status_internal(None);
        self.state = self.fallback_state();
    }

    fn open_chooser(&mut self, result: &FetchResult<K>) -> usize {
        let configured_max = self.fetcher.config().max_row_count;
        let content = if self.policy.hierarchical {
            let mut tree =
                TreeChooserContent::from_rows(result.visible_rows(configured_max).to_vec());
            if result.select_current_value {
                tree.select_key(self.committed_value.clone());
            }
            ChooserContent::Tree(tree)
        } else {
            let mut table = TableChooserContent::new(result.rows.clone(), configured_max);
            if result.select_current_value {
                table.select_key(self.committed_value.as_ref());
            }
            ChooserContent::Table(table)
        };
        let rows = content.row_count();
        self.chooser = Some(content);
        self.state = ResolutionState::ChooserOpen;
        self.emit(FieldEvent::ChooserOpened { rows });
        rows
    }

    fn close_chooser(&mut self) {
        if self.chooser.take().is_some() {
            self.emit(FieldEvent::ChooserClosed);
        }
    }

    // ------------------------------------------------------------------
    // Programmatic value assignment
    // ------------------------------------------------------------------

    /// Assigns a value programmatically: always resolves via a key lookup,
    /// bypassing text search.
    pub async fn set_value(&mut self, key: Option<K>) -> Result<Resolution<K>, ResolutionError> {
        let Some(key) = self.policy.normalize_key(key) else {
            let row = LookupRow::empty();
            self.install_row(row.clone(), String::new());
            return Ok(Resolution::Accepted(row));
        };
        let query = LookupQuery::by_key(key.clone());
        match self.fetcher.provider().execute(&query).await {
            Ok(rows) => {
                let row = match rows.into_iter().next() {
                    Some(row) => row,
                    None => {
                        // Value committed without a backing row; display
                        // stays empty until a row turns up.
                        let mut row = LookupRow::empty();
                        row.key = Some(key);
                        row
                    }
                };
                let text = row.text.clone();
                self.install_row(row.clone(), text);
                Ok(Resolution::Accepted(row))
            }
            Err(err) => {
                tracing::warn!(%err, "key lookup failed during value assignment");
                self.set_status_internal(Some(err.to_string()));
                // The value is committed, but the cached row is left as it
                // was: it no longer matches the committed key, so the next
                // refresh_display_text re-issues the lookup instead of
                // trusting stale text.
                self.committed_value = Some(key);
                self.state = ResolutionState::Resolved;
                Ok(Resolution::Failed {
                    message: err.to_string(),
                })
            }
        }
    }

    /// Installs a value without resolving it (external change, e.g. loaded
    /// from storage). The cached row is invalidated when the key differs;
    /// [`refresh_display_text`] then re-resolves it.
    ///
    /// [`refresh_display_text`]: Self::refresh_display_text
    pub fn assign_value_unresolved(&mut self, key: Option<K>) {
        self.committed_value = self.policy.normalize_key(key);
        self.state = self.fallback_state();
    }

    // ------------------------------------------------------------------
    // Formatting (value → display text)
    // ------------------------------------------------------------------

    /// Formats the committed value into display text.
    ///
    /// Fast path: when the cached row already denotes the committed value,
    /// its text is reused with no lookup issued. Otherwise the cache is
    /// invalidated and a fresh by-key lookup runs: inline for local
    /// providers, as a background job (pending marker, previous text shown
    /// meanwhile) for remote ones.
    pub async fn refresh_display_text(&mut self) {
        if self.cached_row.matches_key(self.committed_value.as_ref()) {
            return;
        }
        let Some(key) = self.committed_value.clone() else {
            self.cached_row = LookupRow::empty();
            self.set_display_text_internal(String::new());
            return;
        };
        match self.fetcher.provider().locality() {
            Locality::Local => {
                let query = LookupQuery::by_key(key);
                match self.fetcher.provider().execute(&query).await {
                    Ok(rows) => {
                        if let Some(row) = rows.into_iter().next() {
                            self.install_format(row);
                        }
                    }
                    Err(err) => {
                        tracing::warn!(%err, "key lookup failed while formatting");
                        self.set_status_internal(Some(err.to_string()));
                    }
                }
            }
            Locality::Remote => self.spawn_key_lookup(key),
        }
    }

    /// At most one background key lookup is outstanding per field; starting
    /// a new one supersedes the prior, whose late result is then discarded
    /// by the generation check.
    fn spawn_key_lookup(&mut self, key: K) {
        self.key_lookup_generation += 1;
        let generation = self.key_lookup_generation;
        let provider = Arc::clone(self.fetcher.provider());
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let query = LookupQuery::by_key(key);
            let outcome = provider
                .execute(&query)
                .await
                .map(|rows| rows.into_iter().next());
            let _ = tx.send(outcome);
        });
        self.pending_format = Some(PendingFormat { generation, rx });
    }

    pub fn has_pending_format(&self) -> bool {
        self.pending_format.is_some()
    }

    /// Installs the result of the pending background key lookup, if it is
    /// still current. Returns whether the display text was updated; on
    /// failure the previously displayed text stays (the failure is logged).
    pub async fn await_pending_format(&mut self) -> bool {
        let Some(pending) = self.pending_format.take() else {
            return false;
        };
        let outcome = match pending.rx.await {
            Ok(outcome) => outcome,
            Err(_) => return false,
        };
        if pending.generation != self.key_lookup_generation {
            tracing::debug!("discarding superseded background key lookup");
            return false;
        }
        match outcome {
            Ok(Some(row)) => {
                if row.matches_key(self.committed_value.as_ref()) {
                    self.install_format(row);
                    true
                } else {
                    tracing::debug!("discarding key lookup for a value that changed meanwhile");
                    false
                }
            }
            Ok(None) => false,
            Err(err) => {
                tracing::warn!(%err, "background key lookup failed");
                false
            }
        }
    }

    fn install_format(&mut self, row: LookupRow<K>) {
        let text = row.text.clone();
        self.cached_row = row.clone();
        self.set_display_text_internal(text);
        self.propagate_decoration(&row);
        self.state = ResolutionState::Resolved;
    }

    // ------------------------------------------------------------------
    // Decoration
    // ------------------------------------------------------------------

    pub fn set_tooltip(&mut self, tooltip: Option<String>) {
        if !self.decorating {
            self.decoration_defaults.tooltip = tooltip.clone();
        }
        if self.tooltip != tooltip {
            self.tooltip = tooltip.clone();
            self.emit(FieldEvent::Tooltip(tooltip));
        }
    }

    pub fn set_background_color(&mut self, color: Option<String>) {
        if !self.decorating {
            self.decoration_defaults.background_color = color.clone();
        }
        if self.background_color != color {
            self.background_color = color.clone();
            self.emit(FieldEvent::BackgroundColor(color));
        }
    }

    pub fn set_foreground_color(&mut self, color: Option<String>) {
        if !self.decorating {
            self.decoration_defaults.foreground_color = color.clone();
        }
        if self.foreground_color != color {
            self.foreground_color = color.clone();
            self.emit(FieldEvent::ForegroundColor(color));
        }
    }

    pub fn set_font(&mut self, font: Option<String>) {
        if !self.decorating {
            self.decoration_defaults.font = font.clone();
        }
        if self.font != font {
            self.font = font.clone();
            self.emit(FieldEvent::Font(font));
        }
    }

    /// Overwrites the field decoration from the row where present, falling
    /// back to the application-set defaults. The guard keeps the setters
    /// from treating propagated values as new defaults.
    fn propagate_decoration(&mut self, row: &LookupRow<K>) {
        if self.decorating {
            return;
        }
        self.decorating = true;
        let defaults = self.decoration_defaults.clone();
        self.set_tooltip(row.tooltip.clone().or(defaults.tooltip));
        self.set_background_color(row.background_color.clone().or(defaults.background_color));
        self.set_foreground_color(row.foreground_color.clone().or(defaults.foreground_color));
        self.set_font(row.font.clone().or(defaults.font));
        self.decorating = false;
    }

    // ------------------------------------------------------------------
    // Committing
    // ------------------------------------------------------------------

    fn install_row(&mut self, row: LookupRow<K>, display: String) {
        self.committed_value = self.policy.normalize_key(row.key.clone());
        self.cached_row = row.clone();
        self.set_display_text_internal(display);
        self.set_status_internal(None);
        self.propagate_decoration(&row);
        self.close_chooser();
        self.state = ResolutionState::Resolved;
    }

    fn set_display_text_internal(&mut self, text: String) {
        if self.display_text != text {
            self.display_text = text.clone();
            self.emit(FieldEvent::DisplayText(text));
        }
    }

    fn set_status_internal(&mut self, status: Option<String>) {
        if self.status != status {
            self.status = status.clone();
            self.emit(FieldEvent::Status(status));
        }
    }

    /// Where to land after a veto, a failure or a cancelled chooser: the
    /// last resolved state when a value or text is committed, else idle.
    fn fallback_state(&self) -> ResolutionState {
        if self.committed_value.is_some() || !self.cached_row.text.is_empty() {
            ResolutionState::Resolved
        } else {
            ResolutionState::Idle
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fieldkit_lookup::StaticLookupProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn cities() -> Vec<LookupRow<String>> {
        vec![
            LookupRow::new("b".to_string(), "Berlin"),
            LookupRow::new("bn".to_string(), "Bern"),
            LookupRow::new("z".to_string(), "Zurich").with_tooltip("Largest Swiss city"),
        ]
    }

    fn controller(
        rows: Vec<LookupRow<String>>,
        policy: ResolutionPolicy<String>,
    ) -> ProposalResolutionController<String> {
        ProposalResolutionController::new(
            Arc::new(StaticLookupProvider::new(rows)),
            FetchConfig::default(),
            policy,
        )
    }

    #[tokio::test]
    async fn unique_match_is_accepted_without_a_chooser() {
        let mut field = controller(cities(), ResolutionPolicy::default());
        let resolution = field.parse_text("zur").await.unwrap();
        assert!(matches!(resolution, Resolution::Accepted(_)));
        assert_eq!(field.state(), ResolutionState::Resolved);
        assert_eq!(field.display_text(), "Zurich");
        assert_eq!(field.value(), Some(&"z".to_string()));
        assert!(field.chooser().is_none());
    }

    #[tokio::test]
    async fn all_but_one_disabled_counts_as_a_unique_match() {
        let rows = vec![
            LookupRow::new("a".to_string(), "Alpha").with_enabled(false),
            LookupRow::new("b".to_string(), "Beta"),
            LookupRow::new("c".to_string(), "Gamma").with_enabled(false),
        ];
        let mut field = controller(rows, ResolutionPolicy::default());
        let resolution = field.parse_text("*a*").await.unwrap();
        assert!(matches!(resolution, Resolution::Accepted(_)));
        assert_eq!(field.display_text(), "Beta");
    }

    #[tokio::test]
    async fn several_matches_open_the_chooser() {
        let mut field = controller(cities(), ResolutionPolicy::default());
        let resolution = field.parse_text("ber").await.unwrap();
        assert!(matches!(resolution, Resolution::ChooserOpen { rows: 2 }));
        assert_eq!(field.state(), ResolutionState::ChooserOpen);

        if let Some(ChooserContent::Table(table)) = field.chooser_mut() {
            table.select(0);
        } else {
            panic!("expected a table chooser");
        }
        let accepted = field.accept_selected().unwrap();
        assert!(matches!(accepted, Resolution::Accepted(_)));
        assert_eq!(field.state(), ResolutionState::Resolved);
        assert_eq!(field.display_text(), "Berlin");
    }

    #[tokio::test]
    async fn no_match_without_custom_text_is_vetoed_and_value_retained() {
        let mut field = controller(cities(), ResolutionPolicy::default());
        field.set_value(Some("b".to_string())).await.unwrap();
        assert_eq!(field.display_text(), "Berlin");

        let err = field.parse_text("xyz").await.unwrap_err();
        assert!(matches!(err, ResolutionError::NoMatch { .. }));
        assert_eq!(field.value(), Some(&"b".to_string()));
        assert_eq!(field.state(), ResolutionState::Resolved);
        assert!(field.status().unwrap().contains("xyz"));
    }

    #[tokio::test]
    async fn no_match_with_custom_text_commits_the_verbatim_input() {
        let policy = ResolutionPolicy::default().with_custom_text(|text| text.to_string());
        let mut field = controller(cities(), policy);
        let resolution = field.parse_text("Freetown").await.unwrap();
        match resolution {
            Resolution::Accepted(row) => {
                assert_eq!(row.key.as_deref(), Some("Freetown"));
                assert_eq!(row.text, "Freetown");
            }
            other => panic!("expected acceptance, got {other:?}"),
        }
        assert_eq!(field.value(), Some(&"Freetown".to_string()));
    }

    #[tokio::test]
    async fn empty_input_clears_the_value() {
        let mut field = controller(cities(), ResolutionPolicy::default());
        field.set_value(Some("b".to_string())).await.unwrap();
        field.parse_text("   ").await.unwrap();
        assert_eq!(field.value(), None);
        assert_eq!(field.display_text(), "");
    }

    #[tokio::test]
    async fn unchanged_input_is_a_no_op() {
        let mut field = controller(cities(), ResolutionPolicy::default());
        field.parse_text("zur").await.unwrap();
        let resolution = field.parse_text("Zurich").await.unwrap();
        assert!(matches!(resolution, Resolution::Unchanged));
    }

    #[tokio::test]
    async fn cancel_reverts_to_the_committed_text() {
        let mut field = controller(cities(), ResolutionPolicy::default());
        field.set_value(Some("bn".to_string())).await.unwrap();
        field.parse_text("ber").await.unwrap();
        assert_eq!(field.state(), ResolutionState::ChooserOpen);
        field.cancel_chooser();
        assert_eq!(field.state(), ResolutionState::Resolved);
        assert_eq!(field.display_text(), "Bern");
        assert_eq!(field.value(), Some(&"bn".to_string()));
    }

    #[tokio::test]
    async fn zero_like_keys_normalize_to_none() {
        let policy: ResolutionPolicy<i64> = ResolutionPolicy::default().with_null_key(|k| *k == 0);
        let mut field = ProposalResolutionController::new(
            Arc::new(StaticLookupProvider::new(vec![LookupRow::new(1, "One")])),
            FetchConfig::default(),
            policy,
        );
        field.set_value(Some(0)).await.unwrap();
        assert_eq!(field.value(), None);
        assert_eq!(field.display_text(), "");
    }

    /// Wraps a provider and counts entry-point invocations, to verify the
    /// formatting fast path never reaches the backend.
    struct CountingProvider {
        inner: StaticLookupProvider<String>,
        calls: AtomicUsize,
        locality: Locality,
    }

    #[async_trait]
    impl LookupProvider<String> for CountingProvider {
        async fn rows_by_key(
            &self,
            query: &LookupQuery<String>,
        ) -> Result<Vec<LookupRow<String>>, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.rows_by_key(query).await
        }
        async fn rows_by_text(
            &self,
            query: &LookupQuery<String>,
        ) -> Result<Vec<LookupRow<String>>, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.rows_by_text(query).await
        }
        async fn rows_by_all(
            &self,
            query: &LookupQuery<String>,
        ) -> Result<Vec<LookupRow<String>>, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.rows_by_all(query).await
        }
        async fn rows_by_parent(
            &self,
            query: &LookupQuery<String>,
        ) -> Result<Vec<LookupRow<String>>, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.rows_by_parent(query).await
        }
        fn locality(&self) -> Locality {
            self.locality
        }
    }

    #[tokio::test]
    async fn formatting_a_cached_value_issues_no_lookup() {
        let provider = Arc::new(CountingProvider {
            inner: StaticLookupProvider::new(cities()),
            calls: AtomicUsize::new(0),
            locality: Locality::Local,
        });
        let mut field = ProposalResolutionController::new(
            provider.clone() as Arc<dyn LookupProvider<String>>,
            FetchConfig::default(),
            ResolutionPolicy::default(),
        );
        field.set_value(Some("z".to_string())).await.unwrap();
        let calls_after_set = provider.calls.load(Ordering::SeqCst);
        assert_eq!(calls_after_set, 1);

        field.refresh_display_text().await;
        field.refresh_display_text().await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), calls_after_set);
        assert_eq!(field.display_text(), "Zurich");
    }

    #[tokio::test]
    async fn external_value_change_reformats_via_key_lookup() {
        let mut field = controller(cities(), ResolutionPolicy::default());
        field.set_value(Some("b".to_string())).await.unwrap();
        assert_eq!(field.display_text(), "Berlin");

        field.assign_value_unresolved(Some("z".to_string()));
        field.refresh_display_text().await;
        assert_eq!(field.display_text(), "Zurich");
        assert_eq!(field.tooltip(), Some("Largest Swiss city"));
    }

    #[tokio::test]
    async fn remote_formatting_shows_old_text_until_the_result_arrives() {
        let provider = Arc::new(CountingProvider {
            inner: StaticLookupProvider::new(cities()),
            calls: AtomicUsize::new(0),
            locality: Locality::Remote,
        });
        let mut field = ProposalResolutionController::new(
            provider as Arc<dyn LookupProvider<String>>,
            FetchConfig::default(),
            ResolutionPolicy::default(),
        );
        field.set_value(Some("b".to_string())).await.unwrap();
        field.assign_value_unresolved(Some("z".to_string()));

        field.refresh_display_text().await;
        assert!(field.has_pending_format());
        assert_eq!(field.display_text(), "Berlin");

        assert!(field.await_pending_format().await);
        assert_eq!(field.display_text(), "Zurich");
    }

    /// Provider whose key lookups fail a configured number of times before
    /// recovering, for cache-invalidation tests around transient outages.
    struct FailOnceProvider {
        inner: StaticLookupProvider<String>,
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl LookupProvider<String> for FailOnceProvider {
        async fn rows_by_key(
            &self,
            query: &LookupQuery<String>,
        ) -> Result<Vec<LookupRow<String>>, LookupError> {
            if self.failures_left.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                n.checked_sub(1)
            }).is_ok()
            {
                return Err(LookupError::provider("backend down"));
            }
            self.inner.rows_by_key(query).await
        }
        async fn rows_by_text(
            &self,
            query: &LookupQuery<String>,
        ) -> Result<Vec<LookupRow<String>>, LookupError> {
            self.inner.rows_by_text(query).await
        }
        async fn rows_by_all(
            &self,
            query: &LookupQuery<String>,
        ) -> Result<Vec<LookupRow<String>>, LookupError> {
            self.inner.rows_by_all(query).await
        }
        async fn rows_by_parent(
            &self,
            query: &LookupQuery<String>,
        ) -> Result<Vec<LookupRow<String>>, LookupError> {
            self.inner.rows_by_parent(query).await
        }
    }

    #[tokio::test]
    async fn failed_assignment_leaves_the_cache_stale_so_formatting_retries() {
        let provider = Arc::new(FailOnceProvider {
            inner: StaticLookupProvider::new(cities()),
            failures_left: AtomicUsize::new(0),
        });
        let mut field = ProposalResolutionController::new(
            provider.clone() as Arc<dyn LookupProvider<String>>,
            FetchConfig::default(),
            ResolutionPolicy::default(),
        );
        field.set_value(Some("b".to_string())).await.unwrap();
        assert_eq!(field.display_text(), "Berlin");

        // The next key lookup fails once, then the backend recovers.
        provider.failures_left.store(1, Ordering::SeqCst);
        let resolution = field.set_value(Some("z".to_string())).await.unwrap();
        assert!(matches!(resolution, Resolution::Failed { .. }));
        assert_eq!(field.value(), Some(&"z".to_string()));
        assert!(field.status().is_some());

        // The cached row still denotes the old value, so the next format
        // pass hits the now-recovered provider instead of the cache.
        field.refresh_display_text().await;
        assert_eq!(field.display_text(), "Zurich");
        assert_eq!(field.tooltip(), Some("Largest Swiss city"));
    }

    #[tokio::test]
    async fn row_decoration_overwrites_and_falls_back_to_defaults() {
        let mut field = controller(cities(), ResolutionPolicy::default());
        field.set_tooltip(Some("Pick a city".to_string()));

        field.set_value(Some("z".to_string())).await.unwrap();
        assert_eq!(field.tooltip(), Some("Largest Swiss city"));

        // A row without decoration falls back to the application default.
        field.set_value(Some("b".to_string())).await.unwrap();
        assert_eq!(field.tooltip(), Some("Pick a city"));
    }

    #[tokio::test]
    async fn events_are_emitted_for_property_changes() {
        let events: Arc<Mutex<Vec<FieldEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let mut field = controller(cities(), ResolutionPolicy::default());
        field.on_event(Box::new(move |event| {
            sink.lock().unwrap().push(event.clone());
        }));

        field.parse_text("ber").await.unwrap();
        field.cancel_chooser();

        let seen = events.lock().unwrap();
        assert!(seen.contains(&FieldEvent::ChooserOpened { rows: 2 }));
        assert!(seen.contains(&FieldEvent::ChooserClosed));
    }

    #[tokio::test]
    async fn browse_gesture_never_auto_accepts() {
        let mut field = controller(
            vec![LookupRow::new("only".to_string(), "Only row")],
            ResolutionPolicy::default(),
        );
        let resolution = field.open_proposal_chooser().await.unwrap();
        assert!(matches!(resolution, Resolution::ChooserOpen { rows: 1 }));
        assert_eq!(field.state(), ResolutionState::ChooserOpen);
    }
}
