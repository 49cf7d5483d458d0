use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::normalize::{clean_text, normalize_email, normalize_name, normalize_phone, PhoneRules};

// ============ Lead ============

/// One candidate contact gathered by an ingestion adapter.
///
/// Field names are the crate's own; the aliases accept the keys written by the
/// legacy Spanish-keyed ingestion adapters so their datasets load unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    /// Business key: canonical phone number once normalized.
    #[serde(default, alias = "telefono", skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Contact person display name.
    #[serde(default, alias = "nombre_contacto", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Organization (clinic, office, company).
    #[serde(default, alias = "empresa", skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    /// Title or role.
    #[serde(default, alias = "cargo", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Secondary contact channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Professional profile link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    /// Site link.
    #[serde(default, alias = "sitio_web", skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    /// Source listing or profile page.
    #[serde(default, alias = "url_perfil", skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
    /// Locality: neighborhood.
    #[serde(default, alias = "colonia", skip_serializing_if = "Option::is_none")]
    pub neighborhood: Option<String>,
    /// Locality: district / borough.
    #[serde(default, alias = "delegacion", skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    /// Origin tag (which adapter produced the record).
    #[serde(default, alias = "fuente", skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Niche / category tag.
    #[serde(default, alias = "nicho", skip_serializing_if = "Option::is_none")]
    pub niche: Option<String>,

    /// Verification state of the business key's primary channel.
    #[serde(default, alias = "whatsapp_estado")]
    pub verification_status: VerificationStatus,
    /// When the current verification state was assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    /// Set when an `invalid` state came from an inconclusive check rather
    /// than a confirmed absence.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub verification_inconclusive: bool,

    /// Adapter-specific fields carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Verification state stored on a lead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationStatus {
    #[default]
    #[serde(rename = "unverified", alias = "pendiente")]
    Unverified,
    #[serde(rename = "valid", alias = "valido")]
    Valid,
    #[serde(rename = "invalid", alias = "invalido")]
    Invalid,
    #[serde(rename = "no-contact-channel", alias = "sin_telefono")]
    NoContactChannel,
}

impl VerificationStatus {
    pub fn is_verified(self) -> bool {
        self != VerificationStatus::Unverified
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::Unverified => "unverified",
            VerificationStatus::Valid => "valid",
            VerificationStatus::Invalid => "invalid",
            VerificationStatus::NoContactChannel => "no-contact-channel",
        }
    }
}

/// A verification result ready to be written onto a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationState {
    pub status: VerificationStatus,
    pub verified_at: DateTime<Utc>,
    pub inconclusive: bool,
}

impl VerificationState {
    pub fn new(status: VerificationStatus) -> Self {
        Self {
            status,
            verified_at: Utc::now(),
            inconclusive: false,
        }
    }

    /// Stored as `invalid`, flagged as inconclusive.
    pub fn inconclusive() -> Self {
        Self {
            status: VerificationStatus::Invalid,
            verified_at: Utc::now(),
            inconclusive: true,
        }
    }
}

impl Lead {
    /// The business key, if the record has a usable one.
    pub fn business_key(&self) -> Option<&str> {
        self.phone.as_deref().filter(|p| !p.is_empty())
    }

    /// Normalized display name used as the secondary identity signal.
    /// Falls back to the organization name when no contact name exists.
    pub fn identity_name(&self) -> Option<String> {
        self.name
            .as_deref()
            .and_then(normalize_name)
            .or_else(|| self.organization.as_deref().and_then(normalize_name))
    }

    /// Count of populated quality fields.
    ///
    /// Derived on demand; only used to break ties when two records disagree.
    pub fn completeness(&self) -> usize {
        [
            &self.organization,
            &self.phone,
            &self.email,
            &self.name,
            &self.title,
            &self.website,
            &self.neighborhood,
            &self.linkedin,
        ]
        .iter()
        .filter(|field| is_present(field))
        .count()
    }

    /// Apply a verification result. Only the verification fields change.
    pub fn apply_verification(&mut self, state: VerificationState) {
        self.verification_status = state.status;
        self.verified_at = Some(state.verified_at);
        self.verification_inconclusive = state.inconclusive;
    }

    /// A record carrying only a business key and a verification result.
    ///
    /// This is what the executor hands to the merge engine.
    pub fn verification_update(key: &str, state: VerificationState) -> Self {
        let mut lead = Lead {
            phone: Some(key.to_string()),
            ..Lead::default()
        };
        lead.apply_verification(state);
        lead
    }

    /// Structural normalization applied when a record enters the pipeline.
    pub fn normalized(mut self, rules: &PhoneRules) -> Self {
        self.phone = self
            .phone
            .as_deref()
            .and_then(|raw| normalize_phone(raw, rules));
        self.email = self.email.as_deref().and_then(normalize_email);
        self.name = clean_text(self.name);
        self.organization = clean_text(self.organization);
        self.title = clean_text(self.title);
        self.linkedin = clean_text(self.linkedin);
        self.website = clean_text(self.website);
        self.profile_url = clean_text(self.profile_url);
        self.neighborhood = clean_text(self.neighborhood);
        self.district = clean_text(self.district);
        self.source = clean_text(self.source);
        self.niche = clean_text(self.niche);
        self
    }
}

/// A field counts as present when it holds non-blank text.
pub fn is_present(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|v| !v.trim().is_empty())
}

// ============ Datasets ============

/// Candidate dataset as produced by an ingestion adapter: either a bare list
/// or an object wrapping the list in a `leads` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LeadDataset {
    Wrapped { leads: Vec<Lead> },
    Bare(Vec<Lead>),
}

impl LeadDataset {
    /// Convert to a vec of leads for uniform processing
    pub fn into_leads(self) -> Vec<Lead> {
        match self {
            LeadDataset::Wrapped { leads } => leads,
            LeadDataset::Bare(leads) => leads,
        }
    }
}

/// The merged, verified dataset written by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputDataset {
    pub metadata: DatasetMetadata,
    pub leads: Vec<Lead>,
}

/// Summary block at the head of the output dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub total_leads: usize,
    /// Records with any verification state, including no-contact-channel.
    pub verified: usize,
    pub valid: usize,
    /// Stored `invalid`, confirmed and inconclusive together.
    pub invalid: usize,
    /// Subset of `invalid` that came from inconclusive checks.
    pub inconclusive: usize,
    pub no_contact_channel: usize,
    pub pending: usize,
    pub validation_rate: String,
    pub run_at: DateTime<Utc>,
    pub run_id: uuid::Uuid,
    pub tool_version: String,
}

/// Tally of verification states over a set of leads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub inconclusive: usize,
    pub no_contact_channel: usize,
    pub pending: usize,
}

impl StatusCounts {
    pub fn from_leads(leads: &[Lead]) -> Self {
        let mut counts = StatusCounts {
            total: leads.len(),
            ..StatusCounts::default()
        };
        for lead in leads {
            match lead.verification_status {
                VerificationStatus::Unverified => counts.pending += 1,
                VerificationStatus::Valid => counts.valid += 1,
                VerificationStatus::Invalid => {
                    counts.invalid += 1;
                    if lead.verification_inconclusive {
                        counts.inconclusive += 1;
                    }
                }
                VerificationStatus::NoContactChannel => counts.no_contact_channel += 1,
            }
        }
        counts
    }

    pub fn verified(&self) -> usize {
        self.total - self.pending
    }

    /// Valid share of records whose channel was actually checked.
    pub fn validation_rate(&self) -> usize {
        self.valid * 100 / (self.valid + self.invalid).max(1)
    }
}

impl DatasetMetadata {
    pub fn from_leads(leads: &[Lead], run_id: uuid::Uuid) -> Self {
        let counts = StatusCounts::from_leads(leads);
        Self {
            total_leads: counts.total,
            verified: counts.verified(),
            valid: counts.valid,
            invalid: counts.invalid,
            inconclusive: counts.inconclusive,
            no_contact_channel: counts.no_contact_channel,
            pending: counts.pending,
            validation_rate: format!("{}%", counts.validation_rate()),
            run_at: Utc::now(),
            run_id,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
