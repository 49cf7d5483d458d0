//! Non-destructive record merge and the deduplicated working set.
//!
//! Two layers:
//!
//! - [`merge`]: field-level fill-empty merge of two records for the same entity.
//!   Verification fields are the exception and always follow the newer outcome.
//! - [`LeadSet`]: the working set the orchestrator mutates. It indexes records by
//!   business key and by normalized name, so it never holds two records with the
//!   same key.

use serde_json::Value;
use std::collections::HashMap;

use crate::models::{is_present, Lead, VerificationState};

/// Merge `incoming` into `existing`.
///
/// Every non-verification field of `existing` that is empty is filled from
/// `incoming`; populated fields are never replaced. The verification triple is
/// taken from `incoming` whenever it carries one.
pub fn merge(mut existing: Lead, incoming: Lead) -> Lead {
    fill_fields(&mut existing, &incoming);
    adopt_verification(&mut existing, &incoming);
    existing
}

/// Fill-empty copy of every non-verification field.
fn fill_fields(target: &mut Lead, donor: &Lead) {
    fill(&mut target.phone, &donor.phone);
    fill(&mut target.name, &donor.name);
    fill(&mut target.organization, &donor.organization);
    fill(&mut target.title, &donor.title);
    fill(&mut target.email, &donor.email);
    fill(&mut target.linkedin, &donor.linkedin);
    fill(&mut target.website, &donor.website);
    fill(&mut target.profile_url, &donor.profile_url);
    fill(&mut target.neighborhood, &donor.neighborhood);
    fill(&mut target.district, &donor.district);
    fill(&mut target.source, &donor.source);
    fill(&mut target.niche, &donor.niche);

    for (key, value) in &donor.extra {
        let missing = target.extra.get(key).map_or(true, is_blank);
        if missing && !is_blank(value) {
            target.extra.insert(key.clone(), value.clone());
        }
    }
}

fn fill(target: &mut Option<String>, donor: &Option<String>) {
    if !is_present(target) && is_present(donor) {
        *target = donor.clone();
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn adopt_verification(target: &mut Lead, source: &Lead) {
    if source.verification_status.is_verified() {
        target.verification_status = source.verification_status;
        target.verified_at = source.verified_at;
        target.verification_inconclusive = source.verification_inconclusive;
    }
}

/// Merge two records with the same business key.
///
/// The more complete record is the primary; the other only fills its gaps.
/// On equal completeness the existing record stays primary.
fn resolve(existing: Lead, incoming: Lead) -> Lead {
    if incoming.completeness() <= existing.completeness() {
        return merge(existing, incoming);
    }
    let mut primary = incoming;
    fill_fields(&mut primary, &existing);
    if !primary.verification_status.is_verified() {
        adopt_verification(&mut primary, &existing);
    }
    primary.phone = existing.phone.or(primary.phone);
    primary
}

/// Deduplicated working set of leads.
///
/// Keyed records keep first-seen order. Keyless records are matched by
/// normalized name: first against keyed records, then among themselves.
#[derive(Debug, Default, Clone)]
pub struct LeadSet {
    keyed: Vec<Lead>,
    by_key: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
    keyless: Vec<Option<Lead>>,
    keyless_by_name: HashMap<String, usize>,
}

impl LeadSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_leads(leads: impl IntoIterator<Item = Lead>) -> Self {
        let mut set = Self::new();
        set.extend(leads);
        set
    }

    pub fn extend(&mut self, leads: impl IntoIterator<Item = Lead>) {
        for lead in leads {
            self.upsert(lead);
        }
    }

    /// Insert a record, merging it into whatever it matches.
    pub fn upsert(&mut self, incoming: Lead) {
        match incoming.business_key().map(str::to_string) {
            Some(key) => self.upsert_keyed(key, incoming),
            None => self.upsert_keyless(incoming),
        }
    }

    fn upsert_keyed(&mut self, key: String, incoming: Lead) {
        let idx = match self.by_key.get(&key) {
            Some(&idx) => {
                let existing = std::mem::take(&mut self.keyed[idx]);
                self.keyed[idx] = resolve(existing, incoming);
                idx
            }
            None => {
                let idx = self.keyed.len();
                self.keyed.push(incoming);
                self.by_key.insert(key, idx);
                idx
            }
        };
        self.index_name(idx);
    }

    /// Register the name of keyed record `idx` and absorb any keyless record
    /// already waiting under that name.
    fn index_name(&mut self, idx: usize) {
        let Some(name) = self.keyed[idx].identity_name() else {
            return;
        };
        if let Some(slot) = self.keyless_by_name.remove(&name) {
            if let Some(orphan) = self.keyless[slot].take() {
                tracing::debug!("Keyless record '{}' absorbed by name", name);
                fill_fields(&mut self.keyed[idx], &orphan);
            }
        }
        self.by_name.entry(name).or_insert(idx);
    }

    fn upsert_keyless(&mut self, incoming: Lead) {
        let Some(name) = incoming.identity_name() else {
            self.keyless.push(Some(incoming));
            return;
        };

        // Key-level verification never comes from a keyless record.
        if let Some(&idx) = self.by_name.get(&name) {
            fill_fields(&mut self.keyed[idx], &incoming);
            return;
        }

        match self.keyless_by_name.get(&name) {
            Some(&slot) => {
                if let Some(existing) = self.keyless[slot].take() {
                    self.keyless[slot] = Some(merge(existing, incoming));
                }
            }
            None => {
                self.keyless_by_name.insert(name, self.keyless.len());
                self.keyless.push(Some(incoming));
            }
        }
    }

    /// Record a verification result for `key`. Returns `false` for unknown keys.
    pub fn apply_verification(&mut self, key: &str, state: VerificationState) -> bool {
        let Some(&idx) = self.by_key.get(key) else {
            return false;
        };
        let existing = std::mem::take(&mut self.keyed[idx]);
        self.keyed[idx] = merge(existing, Lead::verification_update(key, state));
        true
    }

    /// Mark every unverified keyless record as `no-contact-channel`.
    ///
    /// Returns the number of records newly marked.
    pub fn mark_keyless_no_channel(&mut self) -> usize {
        let mut marked = 0;
        for lead in self.keyless.iter_mut().flatten() {
            if !lead.verification_status.is_verified() {
                lead.apply_verification(VerificationState::new(
                    crate::models::VerificationStatus::NoContactChannel,
                ));
                marked += 1;
            }
        }
        marked
    }

    pub fn get(&self, key: &str) -> Option<&Lead> {
        self.by_key.get(key).map(|&idx| &self.keyed[idx])
    }

    /// Business keys in first-seen order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keyed.iter().filter_map(Lead::business_key)
    }

    pub fn keyed_len(&self) -> usize {
        self.keyed.len()
    }

    pub fn keyless_len(&self) -> usize {
        self.keyless.iter().flatten().count()
    }

    pub fn len(&self) -> usize {
        self.keyed_len() + self.keyless_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot for output: keyed records first, then keyless ones.
    pub fn to_vec(&self) -> Vec<Lead> {
        self.keyed
            .iter()
            .chain(self.keyless.iter().flatten())
            .cloned()
            .collect()
    }

    pub fn into_leads(self) -> Vec<Lead> {
        self.keyed
            .into_iter()
            .chain(self.keyless.into_iter().flatten())
            .collect()
    }
}
