/// Scope narrowing: which catalogs and manufacturers a clause tree can
/// possibly touch, in both the precise and the coarse variant.
mod common;

use common::*;
use lodestone::types::User;
use lodestone::{Clause, Operand, Operator};

fn catalog(name: &str) -> Clause {
    Clause::equals("catalog", name)
}

fn manufacturer(name: &str) -> Clause {
    Clause::equals("manufacturer", name)
}

fn cost_over(limit: i64) -> Clause {
    Clause::number("cost", Operator::GreaterThan, limit)
}

// ============================================================
// Narrowing per tree shape
// ============================================================

#[test]
fn test_catalog_equality_pins_one_catalog() {
    let rig = rig();
    let context = rig.service.query_context(None, &catalog("Widgets"));
    assert_eq!(context.catalog_ids(), Some(vec![CATALOG_WIDGETS]));
    // The manufacturer dimension stays open.
    assert_eq!(context.manufacturer_ids(), None);
}

#[test]
fn test_catalog_list_unions_ids() {
    let rig = rig();
    let clause = Clause::terminal(
        "catalog",
        Operator::In,
        Operand::texts(["Widgets", "Gadgets"]),
    );
    let context = rig.service.query_context(None, &clause);
    let mut ids = context.catalog_ids().unwrap();
    ids.sort_unstable();
    assert_eq!(ids, vec![CATALOG_WIDGETS, CATALOG_GADGETS]);
}

#[test]
fn test_manufacturer_equality_pins_one_manufacturer() {
    let rig = rig();
    let context = rig.service.query_context(None, &manufacturer("Acme"));
    assert_eq!(context.manufacturer_ids(), Some(vec![MFR_ACME]));
    assert_eq!(context.catalog_ids(), None);
}

#[test]
fn test_conjunction_keeps_the_narrowest_branch() {
    let rig = rig();
    let clause = Clause::and(vec![catalog("Widgets"), cost_over(100)]);
    let context = rig.service.query_context(None, &clause);
    assert_eq!(context.catalog_ids(), Some(vec![CATALOG_WIDGETS]));
}

#[test]
fn test_disjoint_conjunction_narrows_to_nothing() {
    let rig = rig();
    let clause = Clause::and(vec![catalog("Widgets"), catalog("Gadgets")]);
    let context = rig.service.query_context(None, &clause);
    assert!(context.is_none());
}

#[test]
fn test_negation_gives_up_narrowing() {
    let rig = rig();
    let context = rig
        .service
        .query_context(None, &Clause::negate(catalog("Widgets")));
    assert!(context.is_all());
}

#[test]
fn test_unconstrained_fields_do_not_narrow() {
    let rig = rig();
    let context = rig.service.query_context(None, &cost_over(100));
    assert!(context.is_all());
}

#[test]
fn test_mixed_dimension_or_keeps_full_but_coarsens_simple() {
    let rig = rig();
    let clause = Clause::or(vec![catalog("Widgets"), manufacturer("Acme")]);

    let full = rig.service.query_context(None, &clause);
    assert!(!full.is_all());
    // Neither dimension is pinned across every scope.
    assert_eq!(full.catalog_ids(), None);
    assert_eq!(full.manufacturer_ids(), None);

    let simple = rig.service.simple_query_context(None, &clause);
    assert!(simple.is_all());
}

// ============================================================
// Coverage invariant
// ============================================================

#[test]
fn test_simple_always_covers_full() {
    let rig = rig();
    let leaves = || {
        vec![
            catalog("Widgets"),
            catalog("Gadgets"),
            manufacturer("Acme"),
            cost_over(100),
            Clause::negate(catalog("Gadgets")),
            Clause::was("status", Operator::Was, Operand::text("pending")),
            Clause::terminal(
                "catalog",
                Operator::In,
                Operand::texts(["Widgets", "Gadgets"]),
            ),
        ]
    };

    let mut trees = Vec::new();
    for a in leaves() {
        trees.push(a.clone());
        trees.push(Clause::negate(a.clone()));
        for b in leaves() {
            trees.push(Clause::and(vec![a.clone(), b.clone()]));
            trees.push(Clause::or(vec![a.clone(), b.clone()]));
            for c in leaves() {
                trees.push(Clause::or(vec![
                    Clause::and(vec![a.clone(), b.clone()]),
                    c.clone(),
                ]));
                trees.push(Clause::and(vec![
                    Clause::or(vec![a.clone(), b.clone()]),
                    Clause::negate(c.clone()),
                ]));
            }
        }
    }

    for tree in &trees {
        let full = rig.service.query_context(None, tree);
        let simple = rig.service.simple_query_context(None, tree);
        assert!(
            simple.covers(&full),
            "simple must cover full for {}",
            tree
        );
    }
}

// ============================================================
// Caching
// ============================================================

#[test]
fn test_repeat_context_lookups_hit_the_cache() {
    let rig = rig();
    let clause = Clause::and(vec![catalog("Widgets"), cost_over(100)]);

    let (h0, m0) = rig.service.context_cache_stats();
    rig.service.query_context(None, &clause);
    let (h1, m1) = rig.service.context_cache_stats();
    assert_eq!(h1, h0);
    assert_eq!(m1, m0 + 1);

    rig.service.query_context(None, &clause);
    rig.service.simple_query_context(None, &clause);
    let (h2, m2) = rig.service.context_cache_stats();
    assert_eq!(h2, h1 + 2);
    assert_eq!(m2, m1);
}

#[test]
fn test_cache_identity_includes_the_user() {
    let rig = rig();
    let clause = catalog("Widgets");
    let user = User::new("quoter", "Quinn");

    rig.service.query_context(None, &clause);
    let (_, misses_before) = rig.service.context_cache_stats();
    rig.service.query_context(Some(&user), &clause);
    let (_, misses_after) = rig.service.context_cache_stats();
    assert_eq!(misses_after, misses_before + 1);
}

#[test]
fn test_field_refresh_invalidates_cached_contexts() {
    let rig = rig();
    let clause = catalog("Widgets");

    rig.service.query_context(None, &clause);
    rig.service.refresh_fields().unwrap();

    let (_, misses_before) = rig.service.context_cache_stats();
    rig.service.query_context(None, &clause);
    let (_, misses_after) = rig.service.context_cache_stats();
    assert_eq!(misses_after, misses_before + 1);
}
