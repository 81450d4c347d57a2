// Property tests for sort keys, display names, and group classification.
use contactbench::api::{
    RawContact, build_sort_key, classify, group_rank, has_name, normalize,
};
use proptest::prelude::*;

fn names() -> impl Strategy<Value = Option<Vec<String>>> {
    prop::option::of(prop::collection::vec(
        prop_oneof![
            Just(String::new()),
            Just("  ".to_string()),
            "[a-zA-Z ]{0,8}",
            "\\PC{0,6}",
            "[ΑΒΓαβγЖжЯяÉéßØ]{1,4}",
        ],
        0..3,
    ))
}

fn fields() -> impl Strategy<Value = Option<Vec<String>>> {
    prop::option::of(prop::collection::vec("[a-z0-9@+. ]{0,10}", 0..3))
}

prop_compose! {
    fn raw_contact()(
        id in "[a-z0-9]{1,6}",
        given_name in names(),
        family_name in names(),
        org in fields(),
        tel in fields(),
        email in fields(),
    ) -> RawContact {
        let mut raw = RawContact::new(id);
        raw.given_name = given_name;
        raw.family_name = family_name;
        raw.org = org;
        for value in tel.into_iter().flatten() {
            raw = raw.with_tel(value);
        }
        for value in email.into_iter().flatten() {
            raw = raw.with_email(value);
        }
        raw
    }
}

proptest! {
    #[test]
    fn sort_key_is_total_and_deterministic(raw in raw_contact()) {
        let first = build_sort_key(&raw, None);
        let second = build_sort_key(&raw, None);
        prop_assert!(!first.is_empty());
        prop_assert_eq!(first, second);
        let record = normalize(&raw);
        prop_assert_eq!(record.sort_key.len(), 1);
        prop_assert!(!record.order_string().is_empty());
        prop_assert_eq!(normalize(&raw), record);
    }

    #[test]
    fn nameless_contacts_end_with_sentinel(raw in raw_contact()) {
        let record = normalize(&raw);
        if has_name(&raw) {
            prop_assert!(!record.display_name.modified);
        } else {
            prop_assert!(record.display_name.modified);
            prop_assert_eq!(record.display_name.given_name.len(), 1);
            prop_assert!(record.order_string().ends_with('#'));
        }
    }

    #[test]
    fn classification_is_a_ranked_uppercase_letter(raw in raw_contact()) {
        if let Some(letter) = classify(&raw) {
            prop_assert!(group_rank(&letter.to_string()).is_some());
            prop_assert!(!letter.is_lowercase());
        }
    }

    #[test]
    fn same_first_letter_same_group(first in "[a-zA-Zα-ωа-я]", a in "[a-z]{0,5}", b in "[a-z]{0,5}") {
        let left = RawContact::new("1").with_family_name(format!("{first}{a}"));
        let right = RawContact::new("2").with_family_name(format!("{first}{b}"));
        prop_assert_eq!(classify(&left), classify(&right));
    }
}
