//! Property tests for bucket canonicalization and windowed counts.

#[path = "../common/mod.rs"]
mod common;

use std::collections::BTreeSet;

use chrono::Duration;
use common::*;
use issuance_limits::bucket::bucket;
use proptest::prelude::*;

const SUFFIXES: &[&str] = &["com", "net", "co.uk", "dyndns.org", "blogspot.com"];

fn label() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,12}"
}

proptest! {
    #[test]
    fn prop_siblings_share_bucket(
        a in label(),
        b in label(),
        registrant in label(),
        suffix in prop::sample::select(SUFFIXES),
    ) {
        let rules = test_suffixes();
        let base = format!("{}.{}", registrant, suffix);
        prop_assume!(!rules.is_public_suffix(&base));
        let left = bucket(&rules, &format!("{}.{}", a, base)).unwrap();
        let right = bucket(&rules, &format!("{}.{}", b, base)).unwrap();
        prop_assert_eq!(&left, &right);
        prop_assert_eq!(left, base);
    }

    #[test]
    fn prop_public_suffix_is_own_bucket(
        l in label(),
        suffix in prop::sample::select(SUFFIXES),
    ) {
        let rules = test_suffixes();
        prop_assert_eq!(bucket(&rules, suffix).unwrap(), suffix);
        let child = format!("{}.{}", l, suffix);
        let child_bucket = bucket(&rules, &child).unwrap();
        prop_assert_ne!(child_bucket.as_str(), suffix);
    }

    #[test]
    fn prop_bucket_is_idempotent(
        labels in prop::collection::vec(label(), 1..4),
        suffix in prop::sample::select(SUFFIXES),
    ) {
        let rules = test_suffixes();
        let name = format!("{}.{}", labels.join("."), suffix);
        let key = bucket(&rules, &name).unwrap();
        prop_assert_eq!(bucket(&rules, &key).unwrap(), key);
    }

    #[test]
    fn prop_one_entry_per_distinct_bucket(
        names in prop::collection::vec(
            (label(), label(), prop::sample::select(SUFFIXES))
                .prop_map(|(leaf, registrant, suffix)| format!("{}.{}.{}", leaf, registrant, suffix)),
            1..12,
        ),
    ) {
        let rules = test_suffixes();
        let expected: BTreeSet<String> =
            names.iter().map(|n| bucket(&rules, n).unwrap()).collect();

        let mut conn = setup_test_db();
        let tx = conn.transaction().unwrap();
        let written = queries::record_issuance(&tx, &rules, &names[..], april_first(), &Cancel::none())
            .unwrap();
        tx.commit().unwrap();

        prop_assert_eq!(&written, &expected);
        prop_assert_eq!(issuance_rows(&conn), expected.len() as i64);
    }

    #[test]
    fn prop_count_matches_events_in_window(
        hours in prop::collection::vec(0i64..48, 0..20),
        from in 0i64..48,
        len in 0i64..48,
    ) {
        let mut conn = setup_test_db();
        for h in &hours {
            order(&mut conn, 1, april_first() + Duration::hours(*h));
            issue(&mut conn, &["example.com"], april_first() + Duration::hours(*h));
        }

        let w = window(
            april_first() + Duration::hours(from),
            april_first() + Duration::hours(from + len),
        );
        let expected = hours.iter().filter(|h| **h >= from && **h < from + len).count() as i64;
        prop_assert_eq!(count_orders(&conn, 1, &w), expected);
        prop_assert_eq!(count_issuances(&conn, "www.example.com", &w), expected);
    }
}
