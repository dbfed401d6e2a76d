/// Operator coverage through the whole pipeline: text matching, lists,
/// emptiness, dates, history, custom fields, and function operands.
mod common;

use common::*;
use lodestone::handlers::CustomFieldDefinition;
use lodestone::query::messages::keys;
use lodestone::types::{CatalogAllowList, User};
use lodestone::{Clause, Operand, Operator, SearchRequest};
use std::sync::Arc;

fn ids(rig: &SearchRig, clause: &Clause) -> Vec<u64> {
    let mut ids = rig
        .service
        .search(None, clause, &SearchRequest::default())
        .unwrap()
        .ids;
    ids.sort_unstable();
    ids
}

// ============================================================
// Text and identifier matching
// ============================================================

#[test]
fn test_like_matches_word_stems() {
    let rig = rig();
    let clause = Clause::terminal("description", Operator::Like, Operand::text("forming"));
    // Stemming lets "forming" reach "forming" in asset 1's description.
    assert_eq!(ids(&rig, &clause), vec![1]);
}

#[test]
fn test_equals_on_name_is_token_containment_not_substring() {
    let rig = rig();
    assert_eq!(ids(&rig, &Clause::equals("name", "anvil")), vec![1, 2]);
    // "anv" is not a token of any name.
    assert!(ids(&rig, &Clause::equals("name", "anv")).is_empty());
}

#[test]
fn test_multi_word_equality_matches_as_a_phrase() {
    let rig = rig();
    assert_eq!(ids(&rig, &Clause::equals("name", "anvil press")), vec![1]);
    // Same tokens, wrong order: the phrase must not match.
    assert!(ids(&rig, &Clause::equals("name", "press anvil")).is_empty());
}

#[test]
fn test_sku_matches_byte_for_byte() {
    let rig = rig();
    assert_eq!(ids(&rig, &Clause::equals("sku", "W-300")), vec![3]);
    assert!(ids(&rig, &Clause::equals("sku", "w-300")).is_empty());
}

#[test]
fn test_in_list_over_skus() {
    let rig = rig();
    let clause = Clause::terminal(
        "sku",
        Operator::In,
        Operand::texts(["W-100", "G-200", "X-999"]),
    );
    assert_eq!(ids(&rig, &clause), vec![1, 6]);
}

#[test]
fn test_not_in_keeps_the_rest() {
    let rig = rig();
    let clause = Clause::terminal("sku", Operator::NotIn, Operand::texts(["W-100", "G-200"]));
    assert_eq!(ids(&rig, &clause), vec![2, 3, 4, 5, 7, 8]);
}

// ============================================================
// Entity references
// ============================================================

#[test]
fn test_catalog_matches_by_name_or_id() {
    let rig = rig();
    let by_name = ids(&rig, &Clause::equals("catalog", "Gadgets"));
    let by_id = ids(
        &rig,
        &Clause::terminal("catalog", Operator::Equals, Operand::number(2)),
    );
    assert_eq!(by_name, vec![5, 6, 7]);
    assert_eq!(by_name, by_id);
}

#[test]
fn test_manufacturer_name_is_folded_before_lookup() {
    let rig = rig();
    assert_eq!(ids(&rig, &Clause::equals("manufacturer", "acme")), vec![1, 2, 6, 7]);
}

// ============================================================
// Numbers and emptiness
// ============================================================

#[test]
fn test_cost_range_operators_agree_on_boundaries() {
    let rig = rig();
    let below = ids(&rig, &Clause::number("cost", Operator::LessThan, 100));
    let at_most = ids(&rig, &Clause::number("cost", Operator::LessThanEquals, 100));
    assert_eq!(below, vec![2, 6]);
    assert_eq!(at_most, vec![2, 6, 8]);
}

#[test]
fn test_cost_emptiness_both_directions() {
    let rig = rig();
    assert_eq!(ids(&rig, &Clause::is_empty("cost")), vec![7]);
    let nonempty = ids(
        &rig,
        &Clause::terminal("cost", Operator::IsNot, Operand::Empty),
    );
    assert_eq!(nonempty, vec![1, 2, 3, 4, 5, 6, 8]);
}

#[test]
fn test_negated_emptiness_normalizes_to_presence() {
    let rig = rig();
    let negated = ids(&rig, &Clause::negate(Clause::is_empty("cost")));
    let direct = ids(
        &rig,
        &Clause::terminal("cost", Operator::IsNot, Operand::Empty),
    );
    assert_eq!(negated, direct);
}

// ============================================================
// Status and dates
// ============================================================

#[test]
fn test_status_equality_is_case_insensitive() {
    let rig = rig();
    assert_eq!(ids(&rig, &Clause::equals("status", "Discontinued")), vec![6]);
    assert_eq!(ids(&rig, &Clause::equals("status", "discontinued")), vec![6]);
}

#[test]
fn test_unknown_status_value_is_a_validation_error() {
    let rig = rig();
    let outcome = rig
        .service
        .search(
            None,
            &Clause::equals("status", "misplaced"),
            &SearchRequest::default(),
        )
        .unwrap();
    assert_eq!(outcome.total, 0);
    assert!(outcome
        .messages
        .errors()
        .any(|m| m.key == keys::UNKNOWN_STATUS));
}

#[test]
fn test_bare_date_equality_covers_the_whole_day() {
    let rig = rig();
    assert_eq!(ids(&rig, &Clause::equals("created", "2024-01-10")), vec![1]);
}

#[test]
fn test_created_range_selects_a_window() {
    let rig = rig();
    let clause = Clause::and(vec![
        Clause::terminal(
            "created",
            Operator::GreaterThanEquals,
            Operand::text("2024-03-01"),
        ),
        Clause::terminal(
            "created",
            Operator::LessThan,
            Operand::text("2024-05-20"),
        ),
    ]);
    // Created on 03-01, 04-20, 05-02; the 05-20 asset is excluded.
    assert_eq!(ids(&rig, &clause), vec![3, 4, 5]);
}

#[test]
fn test_garbage_date_is_reported_not_searched() {
    let rig = rig();
    let outcome = rig
        .service
        .search(
            None,
            &Clause::equals("created", "soonish"),
            &SearchRequest::default(),
        )
        .unwrap();
    assert_eq!(outcome.total, 0);
    assert!(outcome
        .messages
        .errors()
        .any(|m| m.key == keys::INVALID_DATE));
}

// ============================================================
// History operators
// ============================================================

#[test]
fn test_was_reaches_superseded_values() {
    let rig = rig();
    let clause = Clause::was("status", Operator::Was, Operand::text("pending"));
    assert_eq!(ids(&rig, &clause), vec![3]);
}

#[test]
fn test_was_includes_the_current_value() {
    let rig = rig();
    // Asset 6 is discontinued now but was active; every other asset is active.
    let clause = Clause::was("status", Operator::Was, Operand::text("active"));
    assert_eq!(ids(&rig, &clause), vec![1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn test_was_not_excludes_history_matches() {
    let rig = rig();
    let clause = Clause::was("status", Operator::WasNot, Operand::text("pending"));
    assert_eq!(ids(&rig, &clause), vec![1, 2, 4, 5, 6, 7, 8]);
}

#[test]
fn test_changed_flags_assets_with_history() {
    let rig = rig();
    let changed = ids(&rig, &Clause::changed("status", Operator::Changed));
    let unchanged = ids(&rig, &Clause::changed("status", Operator::NotChanged));
    assert_eq!(changed, vec![3, 6]);
    assert_eq!(unchanged, vec![1, 2, 4, 5, 7, 8]);
}

#[test]
fn test_changed_on_a_field_without_history_is_rejected() {
    let rig = rig();
    let outcome = rig
        .service
        .search(
            None,
            &Clause::changed("sku", Operator::Changed),
            &SearchRequest::default(),
        )
        .unwrap();
    assert_eq!(outcome.total, 0);
    assert!(outcome
        .messages
        .errors()
        .any(|m| m.key == keys::UNSUPPORTED_OPERATOR));
}

// ============================================================
// Custom fields
// ============================================================

#[test]
fn test_custom_field_answers_to_id_form_and_display_name() {
    let rig = rig();
    assert_eq!(ids(&rig, &Clause::equals("cf[7]", "red")), vec![1]);
    assert_eq!(ids(&rig, &Clause::equals("Color", "red")), vec![1]);
    assert_eq!(ids(&rig, &Clause::equals("color", "red")), vec![1]);
}

#[test]
fn test_custom_field_emptiness() {
    let rig = rig();
    // Only assets 1 and 6 carry a Color value.
    assert_eq!(ids(&rig, &Clause::is_empty("cf[7]")), vec![2, 3, 4, 5, 7, 8]);
}

#[test]
fn test_new_custom_field_appears_after_refresh() {
    let rig = rig();
    assert!(rig
        .service
        .registry()
        .get_handlers("cf[9]")
        .is_empty());

    rig.custom_fields.add(CustomFieldDefinition {
        id: 9,
        display_name: "Finish".to_string(),
    });
    rig.service.refresh_fields().unwrap();

    assert_eq!(rig.service.registry().get_handlers("cf[9]").len(), 1);
    // No asset carries the new field yet, so emptiness matches everything.
    assert_eq!(ids(&rig, &Clause::is_empty("cf[9]")).len(), 8);
}

// ============================================================
// Function operands
// ============================================================

#[test]
fn test_visible_catalogs_expands_to_the_grant() {
    let allow = CatalogAllowList::new().grant("quoter", vec![CATALOG_GADGETS]);
    let rig = rig_with(standard_assets(), Arc::new(allow));
    let user = User::new("quoter", "Quinn");
    let clause = Clause::terminal(
        "catalog",
        Operator::In,
        Operand::function("visibleCatalogs", vec![]),
    );

    let mut found = rig
        .service
        .search(Some(&user), &clause, &SearchRequest::default())
        .unwrap()
        .ids;
    found.sort_unstable();
    assert_eq!(found, vec![5, 6, 7]);
}

#[test]
fn test_now_is_an_upper_bound_for_created() {
    let rig = rig();
    let clause = Clause::terminal(
        "created",
        Operator::LessThanEquals,
        Operand::function("now", vec![]),
    );
    assert_eq!(ids(&rig, &clause).len(), 8);
}

#[test]
fn test_current_user_without_a_user_is_an_error() {
    let rig = rig();
    let clause = Clause::terminal(
        "sku",
        Operator::Equals,
        Operand::function("currentUser", vec![]),
    );
    let outcome = rig
        .service
        .search(None, &clause, &SearchRequest::default())
        .unwrap();
    assert_eq!(outcome.total, 0);
    assert!(outcome
        .messages
        .errors()
        .any(|m| m.key == keys::FUNCTION_ANONYMOUS));
}

#[test]
fn test_unknown_function_is_reported_by_name() {
    let rig = rig();
    let clause = Clause::terminal(
        "name",
        Operator::Equals,
        Operand::function("lastQuarter", vec![]),
    );
    let outcome = rig
        .service
        .search(None, &clause, &SearchRequest::default())
        .unwrap();
    assert_eq!(outcome.total, 0);
    let unknown: Vec<_> = outcome
        .messages
        .errors()
        .filter(|m| m.key == keys::UNKNOWN_FUNCTION)
        .collect();
    assert_eq!(unknown.len(), 1);
    assert_eq!(unknown[0].args, vec!["lastQuarter".to_string()]);
}
