mod common;

use common::value;
use ezchain_core::{AccountValueCollection, Position, ValueState};
use num_bigint::BigUint;

fn seeded() -> (AccountValueCollection, Vec<ezchain_core::NodeId>) {
    let mut collection = AccountValueCollection::new("acct-1");
    let ids = vec![
        collection.add(value("0x1000", 100), Position::Back),
        collection.add(value("0x2000", 200), Position::Back),
        collection.add(value("0x3000", 300), Position::Back),
    ];
    (collection, ids)
}

#[test]
fn indexes_stay_consistent_across_mutations() {
    let (mut collection, ids) = seeded();
    assert!(collection.validate_indexes());

    collection
        .update_state(ids[0], ValueState::Selected)
        .expect("select first");
    assert!(collection.validate_indexes());

    collection.split(ids[1], 50).expect("split second");
    assert!(collection.validate_indexes());
    assert!(collection.validate_no_overlap());

    collection.remove(ids[2]).expect("remove third");
    assert!(collection.validate_indexes());
    assert_eq!(collection.len(), 3);
}

#[test]
fn state_queries_and_balances_track_transitions() {
    let (mut collection, ids) = seeded();
    assert_eq!(collection.balance(ValueState::Unspent), 600);
    assert_eq!(collection.total_balance(), 600);

    collection
        .update_state(ids[1], ValueState::Selected)
        .expect("select");
    assert_eq!(collection.balance(ValueState::Unspent), 400);
    assert_eq!(collection.balance(ValueState::Selected), 200);
    assert_eq!(collection.by_state(ValueState::Selected).len(), 1);
    assert_eq!(collection.total_balance(), 600);
}

#[test]
fn range_and_intersection_queries_walk_the_list() {
    let (collection, _) = seeded();
    let lo = BigUint::from(0x1050u32);
    let hi = BigUint::from(0x2010u32);
    let hits = collection.by_range(&lo, &hi);
    assert_eq!(hits.len(), 2);

    let probe = value("0x2fff", 2);
    let intersecting = collection.intersecting(&probe);
    assert_eq!(intersecting.len(), 1);
    assert_eq!(intersecting[0].begin_hex(), "0x3000");
}

#[test]
fn begin_lookup_follows_splits() {
    let (mut collection, ids) = seeded();
    let change_id = collection.split(ids[0], 25).expect("split");
    let keep = collection.get(ids[0]).expect("keep half");
    let change = collection.get(change_id).expect("change half");

    assert_eq!(keep.count(), 75);
    assert_eq!(change.count(), 25);
    assert_eq!(collection.node_by_begin(change.begin()), Some(change_id));
    assert_eq!(collection.node_by_begin(keep.begin()), Some(ids[0]));
}

#[test]
fn sorted_by_begin_is_independent_of_list_order() {
    let mut collection = AccountValueCollection::new("acct-1");
    collection.add(value("0x3000", 10), Position::Back);
    collection.add(value("0x1000", 10), Position::Back);
    collection.add(value("0x2000", 10), Position::Front);

    let begins: Vec<String> = collection
        .sorted_by_begin()
        .into_iter()
        .map(|v| v.begin_hex())
        .collect();
    assert_eq!(begins, vec!["0x1000", "0x2000", "0x3000"]);
}

#[test]
fn overlap_validation_detects_a_bad_insert() {
    let (mut collection, _) = seeded();
    assert!(collection.validate_no_overlap());
    collection.add(value("0x1010", 100), Position::Back);
    assert!(!collection.validate_no_overlap());
}

#[test]
fn clear_confirmed_drops_spent_coins_only() {
    let (mut collection, ids) = seeded();
    collection
        .update_state(ids[0], ValueState::Selected)
        .expect("select");
    collection
        .update_state(ids[0], ValueState::LocalCommitted)
        .expect("commit");
    collection
        .update_state(ids[0], ValueState::Confirmed)
        .expect("confirm");

    assert_eq!(collection.clear_confirmed(), 1);
    assert_eq!(collection.len(), 2);
    assert!(collection.get(ids[0]).is_none());
    assert!(collection.validate_indexes());
}

#[test]
fn contains_span_matches_exact_intervals() {
    let (collection, _) = seeded();
    assert!(collection.contains_span(&value("0x2000", 200)));
    assert!(!collection.contains_span(&value("0x2000", 100)));
}
