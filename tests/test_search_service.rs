/// End-to-end searches through a fully wired stack: clause in, asset ids out.
///
/// Covers the acceptance paths: a structured AND query over catalog and
/// cost, rejection of unknown fields with a diagnostic instead of an error,
/// and indexing of assets with absent optional values.
mod common;

use common::*;
use lodestone::query::messages::keys;
use lodestone::types::User;
use lodestone::{Clause, Operator, SearchRequest, SortOrder};

fn widgets_over_100() -> Clause {
    Clause::and(vec![
        Clause::equals("catalog", "Widgets"),
        Clause::number("cost", Operator::GreaterThan, 100),
    ])
}

// ============================================================
// Structured queries
// ============================================================

#[test]
fn test_catalog_and_cost_conjunction() {
    let rig = rig();
    let outcome = rig
        .service
        .search(None, &widgets_over_100(), &SearchRequest::default())
        .unwrap();

    assert_eq!(outcome.total, 3);
    let mut ids = outcome.ids.clone();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 3, 4]);
    assert!(!outcome.messages.has_errors());
}

#[test]
fn test_boundary_cost_is_excluded_by_strict_greater_than() {
    let rig = rig();
    // Asset 8 sits exactly on 100; >= must include it where > does not.
    let inclusive = Clause::and(vec![
        Clause::equals("catalog", "Widgets"),
        Clause::number("cost", Operator::GreaterThanEquals, 100),
    ]);
    let outcome = rig
        .service
        .search(None, &inclusive, &SearchRequest::default())
        .unwrap();

    assert_eq!(outcome.total, 4);
    assert!(outcome.ids.contains(&8));
}

#[test]
fn test_or_spans_catalogs() {
    let rig = rig();
    let clause = Clause::or(vec![
        Clause::equals("name", "anvil"),
        Clause::equals("catalog", "Gadgets"),
    ]);
    let outcome = rig
        .service
        .search(None, &clause, &SearchRequest::default())
        .unwrap();

    // Anvil Press, Anvil Stand, plus the three Gadgets assets.
    assert_eq!(outcome.total, 5);
}

#[test]
fn test_negation_subtracts_from_the_catalog() {
    let rig = rig();
    let clause = Clause::and(vec![
        Clause::equals("catalog", "Widgets"),
        Clause::negate(Clause::number("cost", Operator::GreaterThan, 100)),
    ]);
    let outcome = rig
        .service
        .search(None, &clause, &SearchRequest::default())
        .unwrap();

    // Widgets whose cost is not over 100: assets 2 and 8.
    let mut ids = outcome.ids.clone();
    ids.sort_unstable();
    assert_eq!(ids, vec![2, 8]);
}

// ============================================================
// Diagnostics instead of failures
// ============================================================

#[test]
fn test_unknown_field_yields_diagnostic_and_no_results() {
    let rig = rig();
    let clause = Clause::equals("warranty", "2 years");
    let outcome = rig
        .service
        .search(None, &clause, &SearchRequest::default())
        .unwrap();

    assert_eq!(outcome.total, 0);
    assert!(outcome.ids.is_empty());
    let errors: Vec<_> = outcome.messages.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].key, keys::UNKNOWN_FIELD);
    assert_eq!(errors[0].args, vec!["warranty".to_string()]);
}

#[test]
fn test_unknown_field_inside_valid_tree_still_rejects() {
    let rig = rig();
    let clause = Clause::and(vec![
        Clause::equals("catalog", "Widgets"),
        Clause::equals("warranty", "2 years"),
    ]);
    let outcome = rig
        .service
        .search(None, &clause, &SearchRequest::default())
        .unwrap();

    assert_eq!(outcome.total, 0);
    assert!(outcome
        .messages
        .errors()
        .any(|m| m.key == keys::UNKNOWN_FIELD));
}

#[test]
fn test_invalid_number_literal_is_reported_per_clause() {
    let rig = rig();
    let clause = Clause::terminal(
        "cost",
        Operator::GreaterThan,
        lodestone::Operand::text("lots"),
    );
    let outcome = rig
        .service
        .search(None, &clause, &SearchRequest::default())
        .unwrap();

    assert_eq!(outcome.total, 0);
    assert!(outcome
        .messages
        .errors()
        .any(|m| m.key == keys::INVALID_NUMBER));
}

#[test]
fn test_empty_group_is_rejected() {
    let rig = rig();
    let outcome = rig
        .service
        .search(None, &Clause::and(vec![]), &SearchRequest::default())
        .unwrap();

    assert_eq!(outcome.total, 0);
    assert!(outcome.messages.has_errors());
}

#[test]
fn test_validation_collects_every_problem_in_one_pass() {
    let rig = rig();
    let clause = Clause::or(vec![
        Clause::equals("warranty", "x"),
        Clause::terminal("cost", Operator::GreaterThan, lodestone::Operand::text("lots")),
    ]);
    let outcome = rig
        .service
        .search(None, &clause, &SearchRequest::default())
        .unwrap();

    assert!(outcome.messages.errors().count() >= 2);
}

// ============================================================
// Absent optional values
// ============================================================

#[test]
fn test_asset_without_manufacturer_is_indexed_and_searchable() {
    let rig = rig();
    let outcome = rig
        .service
        .search(
            None,
            &Clause::equals("name", "plasma"),
            &SearchRequest::default(),
        )
        .unwrap();

    assert_eq!(outcome.ids, vec![4]);
}

#[test]
fn test_manufacturer_emptiness_finds_the_unassigned_asset() {
    let rig = rig();
    let outcome = rig
        .service
        .search(
            None,
            &Clause::is_empty("manufacturer"),
            &SearchRequest::default(),
        )
        .unwrap();

    assert_eq!(outcome.ids, vec![4]);
}

// ============================================================
// Counting and paging
// ============================================================

#[test]
fn test_count_matches_search_total() {
    let rig = rig();
    let clause = widgets_over_100();
    let total = rig.service.count(None, &clause).unwrap();
    let outcome = rig
        .service
        .search(None, &clause, &SearchRequest::default())
        .unwrap();

    assert_eq!(total, 3);
    assert_eq!(total, outcome.total);
}

#[test]
fn test_zero_limit_counts_without_fetching() {
    let rig = rig();
    let outcome = rig
        .service
        .search(None, &widgets_over_100(), &SearchRequest::page(0, 0))
        .unwrap();

    assert_eq!(outcome.total, 3);
    assert!(outcome.ids.is_empty());
}

#[test]
fn test_paging_walks_the_result_set_without_overlap() {
    let rig = rig();
    let clause = Clause::equals("catalog", "Widgets");
    let request = |offset| {
        let mut r = SearchRequest::sorted_by("sku", SortOrder::Asc);
        r.limit = 2;
        r.offset = offset;
        r
    };

    let first = rig.service.search(None, &clause, &request(0)).unwrap();
    let second = rig.service.search(None, &clause, &request(2)).unwrap();
    let third = rig.service.search(None, &clause, &request(4)).unwrap();

    assert_eq!(first.total, 5);
    // W-100, W-200 | W-300, W-400 | W-500
    assert_eq!(first.ids, vec![1, 2]);
    assert_eq!(second.ids, vec![3, 4]);
    assert_eq!(third.ids, vec![8]);
}

#[test]
fn test_offset_past_the_end_is_empty_not_an_error() {
    let rig = rig();
    let outcome = rig
        .service
        .search(
            None,
            &Clause::equals("catalog", "Widgets"),
            &SearchRequest::page(10, 50),
        )
        .unwrap();

    assert_eq!(outcome.total, 5);
    assert!(outcome.ids.is_empty());
}

// ============================================================
// Users
// ============================================================

#[test]
fn test_anonymous_and_named_user_agree_under_open_permissions() {
    let rig = rig();
    let user = User::new("quoter", "Quinn");
    let clause = widgets_over_100();

    let anonymous = rig.service.count(None, &clause).unwrap();
    let named = rig.service.count(Some(&user), &clause).unwrap();
    assert_eq!(anonymous, named);
}
