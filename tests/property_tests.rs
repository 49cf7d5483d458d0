/// Property-based tests using proptest
/// Tests invariants of normalization, merge and checkpointing for all inputs
use proptest::prelude::*;
use rust_lead_verifier::checkpoint::CheckpointStore;
use rust_lead_verifier::merge::{merge, LeadSet};
use rust_lead_verifier::models::{Lead, VerificationState, VerificationStatus};
use rust_lead_verifier::normalize::{normalize_phone, PhoneRules};
use std::collections::HashSet;

fn field() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some(String::new())),
        Just(Some("   ".to_string())),
        "[A-Za-z ]{1,12}".prop_map(Some),
    ]
}

fn status() -> impl Strategy<Value = VerificationStatus> {
    prop_oneof![
        Just(VerificationStatus::Unverified),
        Just(VerificationStatus::Valid),
        Just(VerificationStatus::Invalid),
        Just(VerificationStatus::NoContactChannel),
    ]
}

fn lead() -> impl Strategy<Value = Lead> {
    (
        prop::option::of(prop::sample::select(vec![
            "+525511112222",
            "+525533334444",
            "+525555556666",
        ])),
        field(),
        field(),
        field(),
        field(),
        field(),
        status(),
    )
        .prop_map(|(phone, name, organization, title, email, neighborhood, status)| {
            let mut lead = Lead {
                phone: phone.map(str::to_string),
                name,
                organization,
                title,
                email,
                neighborhood,
                ..Lead::default()
            };
            if status.is_verified() {
                lead.apply_verification(VerificationState::new(status));
            }
            lead
        })
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn text_fields(lead: &Lead) -> [&Option<String>; 5] {
    [
        &lead.name,
        &lead.organization,
        &lead.title,
        &lead.email,
        &lead.neighborhood,
    ]
}

// Property: merge never degrades known-good fields
proptest! {
    #[test]
    fn merge_never_replaces_populated_fields(existing in lead(), incoming in lead()) {
        let merged = merge(existing.clone(), incoming.clone());
        for ((before, offered), after) in text_fields(&existing)
            .into_iter()
            .zip(text_fields(&incoming))
            .zip(text_fields(&merged))
        {
            if present(before) {
                prop_assert_eq!(after, before);
            } else if present(offered) {
                prop_assert_eq!(after, offered);
            }
        }
    }

    #[test]
    fn merge_adopts_incoming_verification(existing in lead(), incoming in lead()) {
        let merged = merge(existing.clone(), incoming.clone());
        if incoming.verification_status.is_verified() {
            prop_assert_eq!(merged.verification_status, incoming.verification_status);
            prop_assert_eq!(merged.verified_at, incoming.verified_at);
        } else {
            prop_assert_eq!(merged.verification_status, existing.verification_status);
        }
    }

    #[test]
    fn merge_keeps_existing_business_key(existing in lead(), incoming in lead()) {
        let merged = merge(existing.clone(), incoming.clone());
        if existing.business_key().is_some() {
            prop_assert_eq!(merged.business_key(), existing.business_key());
        }
    }
}

// Property: the working set never holds two records with one key
proptest! {
    #[test]
    fn lead_set_has_no_duplicate_keys(leads in prop::collection::vec(lead(), 0..40)) {
        let distinct: HashSet<String> = leads
            .iter()
            .filter_map(|l| l.business_key().map(str::to_string))
            .collect();

        let set = LeadSet::from_leads(leads);
        let keys: Vec<&str> = set.keys().collect();
        let unique: HashSet<&str> = keys.iter().copied().collect();

        prop_assert_eq!(keys.len(), unique.len());
        prop_assert_eq!(keys.len(), distinct.len());
        let output = set.to_vec();
        let keyed = output.iter().filter(|l| l.business_key().is_some()).count();
        prop_assert_eq!(keyed, distinct.len());
    }
}

// Property: checkpoint marking is idempotent
proptest! {
    #[test]
    fn marking_twice_keeps_set_size(keys in prop::collection::vec("\\+52[0-9]{10}", 1..30)) {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CheckpointStore::new(dir.path().join("checkpoint.json"));

        for key in &keys {
            store.mark_processed(key);
        }
        let size = store.len();
        for key in &keys {
            store.mark_processed(key);
        }

        prop_assert_eq!(store.len(), size);
        prop_assert_eq!(size, keys.iter().collect::<HashSet<_>>().len());
    }
}

// Property: phone normalization never panics and yields canonical keys
proptest! {
    #[test]
    fn phone_normalization_never_panics(phone in "\\PC*") {
        let _ = normalize_phone(&phone, &PhoneRules::default());
    }

    #[test]
    fn normalized_keys_are_canonical(phone in "[0-9 ()+-]{0,20}") {
        if let Some(key) = normalize_phone(&phone, &PhoneRules::default()) {
            prop_assert!(key.starts_with("+52"));
            prop_assert!(key[1..].chars().all(|c| c.is_ascii_digit()));
            prop_assert!(key.len() <= 13);
        }
    }

    #[test]
    fn formatting_does_not_change_the_key(area in 10u8..=99u8, number in 10_000_000u32..=99_999_999u32) {
        let rules = PhoneRules::default();
        let plain = normalize_phone(&format!("{}{}", area, number), &rules);
        let formatted = normalize_phone(&format!("+52 ({}) {}-{:04}", area, number / 10_000, number % 10_000), &rules);
        prop_assert_eq!(plain, formatted);
    }
}
