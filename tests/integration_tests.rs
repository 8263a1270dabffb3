//! Integration tests for the complete fieldkit pipeline
//!
//! These tests verify end-to-end functionality across crates:
//! - Text entry → fetcher → controller → committed value
//! - Background fetch supersession feeding field state
//! - Hierarchical chooser flows
//! - Data-object registry → serialization → normalization
//!
//! Run with: cargo test --test integration_tests

use std::sync::Arc;

use async_trait::async_trait;
use fieldkit_assist::{
    ChooserContent, FetchConfig, ProposalResolutionController, Resolution, ResolutionPolicy,
    ResolutionState,
};
use fieldkit_dataobject::{
    from_json, to_json_string, DoEntity, DoValue, TypeDescriptor, TypeRegistry,
};
use fieldkit_lookup::{
    LookupError, LookupProvider, LookupQuery, LookupRow, StaticLookupProvider,
};
use tokio::sync::Notify;

// ============================================================================
// Resolution end to end
// ============================================================================

fn swiss_places() -> Vec<LookupRow<String>> {
    vec![
        LookupRow::new("ch".to_string(), "Switzerland"),
        LookupRow::new("zh".to_string(), "Zurich").with_parent_key("ch".to_string()),
        LookupRow::new("be".to_string(), "Bern").with_parent_key("ch".to_string()),
        LookupRow::new("be.city".to_string(), "Bern City").with_parent_key("be".to_string()),
    ]
}

#[tokio::test]
async fn typing_narrowing_and_accepting_commits_the_value() {
    let mut field = ProposalResolutionController::new(
        Arc::new(StaticLookupProvider::new(swiss_places())),
        FetchConfig::default(),
        ResolutionPolicy::default(),
    );

    // "bern" matches Bern and Bern City: chooser opens.
    let resolution = field.parse_text("bern").await.unwrap();
    assert!(matches!(resolution, Resolution::ChooserOpen { rows: 2 }));

    // The user picks the second candidate.
    if let Some(ChooserContent::Table(table)) = field.chooser_mut() {
        table.select(1);
    } else {
        panic!("expected a table chooser");
    }
    field.accept_selected().unwrap();
    assert_eq!(field.state(), ResolutionState::Resolved);
    assert_eq!(field.value(), Some(&"be.city".to_string()));
    assert_eq!(field.display_text(), "Bern City");

    // Narrower input now resolves uniquely without a chooser.
    let resolution = field.parse_text("zur").await.unwrap();
    assert!(matches!(resolution, Resolution::Accepted(_)));
    assert_eq!(field.display_text(), "Zurich");
}

#[tokio::test]
async fn hierarchical_policy_presents_a_tree() {
    let mut field = ProposalResolutionController::new(
        Arc::new(StaticLookupProvider::new(swiss_places())),
        FetchConfig::default(),
        ResolutionPolicy::default().hierarchical(),
    );

    let resolution = field.parse_text("bern").await.unwrap();
    assert!(matches!(resolution, Resolution::ChooserOpen { .. }));
    let Some(ChooserContent::Tree(tree)) = field.chooser() else {
        panic!("expected a tree chooser");
    };
    // Only the matching rows were fetched: Bern roots the subtree and
    // Bern City hangs off it at semantic depth 1.
    let depths: Vec<usize> = tree.visible().iter().map(|(_, depth)| *depth).collect();
    assert_eq!(depths, vec![0, 1]);
}

// ============================================================================
// Background supersession feeding field state
// ============================================================================

/// Provider whose text lookups park until released.
struct GatedProvider {
    gate: Notify,
    rows: Vec<LookupRow<String>>,
}

#[async_trait]
impl LookupProvider<String> for GatedProvider {
    async fn rows_by_key(
        &self,
        query: &LookupQuery<String>,
    ) -> Result<Vec<LookupRow<String>>, LookupError> {
        let key = query.key().expect("by-key query");
        Ok(self
            .rows
            .iter()
            .filter(|row| row.key.as_ref() == Some(key))
            .cloned()
            .collect())
    }

    async fn rows_by_text(
        &self,
        _query: &LookupQuery<String>,
    ) -> Result<Vec<LookupRow<String>>, LookupError> {
        self.gate.notified().await;
        Ok(self.rows.clone())
    }

    async fn rows_by_all(
        &self,
        _query: &LookupQuery<String>,
    ) -> Result<Vec<LookupRow<String>>, LookupError> {
        Ok(self.rows.clone())
    }

    async fn rows_by_parent(
        &self,
        _query: &LookupQuery<String>,
    ) -> Result<Vec<LookupRow<String>>, LookupError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn only_the_newest_fetch_ever_reaches_field_state() {
    let provider = Arc::new(GatedProvider {
        gate: Notify::new(),
        rows: vec![LookupRow::new("slow".to_string(), "Slow result")],
    });
    let mut field = ProposalResolutionController::new(
        provider.clone() as Arc<dyn LookupProvider<String>>,
        FetchConfig::default(),
        ResolutionPolicy::default(),
    );

    // First request parks inside the provider.
    let parked = field.fetcher().update_in_background("slow", false);
    tokio::task::yield_now().await;

    // A programmatic assignment resolves by key, independent of the fetch.
    field.set_value(Some("slow".to_string())).await.unwrap();
    assert_eq!(field.display_text(), "Slow result");

    // The browse fetch below supersedes the parked text fetch.
    let current = field.fetcher().update("", true).await;
    provider.gate.notify_one();
    parked.await.unwrap();

    // The parked result never became the published one.
    let last = field.fetcher().last_result().unwrap();
    assert_eq!(last.generation, current.generation);
    assert!(last.select_current_value);

    // Applying the published snapshot opens the chooser with the committed
    // value preselected.
    field.apply_result(&last).unwrap();
    let Some(ChooserContent::Table(table)) = field.chooser() else {
        panic!("expected a table chooser");
    };
    assert_eq!(table.selected_row().unwrap().text, "Slow result");
}

// ============================================================================
// Data objects end to end
// ============================================================================

#[test]
fn registry_backed_round_trip_with_normalization() {
    let registry = TypeRegistry::new();
    registry
        .register(
            TypeDescriptor::new("core.Roster", "app.Roster")
                .with_version("app-1.2.0")
                .with_declared_order(vec!["name".to_string(), "members".to_string()]),
        )
        .unwrap();

    let mut roster = DoEntity::new("app.Roster")
        .with(
            "members",
            DoValue::Set(vec!["charlie".into(), "alfa".into(), "bravo".into()]),
        )
        .with("name", "night shift")
        .with("aliases", DoValue::List(vec!["c".into(), "a".into()]));
    roster.normalize();

    let json = to_json_string(&roster, Some(&registry)).unwrap();
    // declared attributes first, in declared order; the rest alphabetical
    let name_at = json.find("\"name\"").unwrap();
    let members_at = json.find("\"members\"").unwrap();
    let aliases_at = json.find("\"aliases\"").unwrap();
    assert!(name_at < members_at && members_at < aliases_at);
    assert!(json.contains(r#""_typeVersion":"app-1.2.0""#));
    // the set was sorted, the list kept as authored
    assert!(json.contains(r#"["alfa","bravo","charlie"]"#));
    assert!(json.contains(r#"["c","a"]"#));

    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    let back = from_json(&parsed, Some(&registry)).unwrap();
    assert_eq!(back.type_name(), Some("app.Roster"));
    assert_eq!(
        back.get("name"),
        Some(&DoValue::String("night shift".to_string()))
    );
}

#[test]
fn subclass_replacement_is_transparent_on_the_wire() {
    let registry = TypeRegistry::new();
    registry
        .register(TypeDescriptor::new("core.Fixture", "app.Fixture"))
        .unwrap();
    registry
        .register_replacement("core.Fixture", TypeDescriptor::new("project.FixtureEx", ""))
        .unwrap();

    // Parsing resolves to the replacement...
    let value = serde_json::json!({"_type": "app.Fixture", "x": 1});
    let entity = from_json(&value, Some(&registry)).unwrap();
    // ...while the wire name stays the originally registered one.
    let json = to_json_string(&entity, Some(&registry)).unwrap();
    assert!(json.contains(r#""_type":"app.Fixture""#));
    assert_eq!(
        registry.to_type_name("project.FixtureEx").as_deref(),
        Some("app.Fixture")
    );
}
