use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{CertificateRecord, ClaimOutcome, RecordStore};
use crate::error::{CertifyError, Result};

pub const CODE_LEN: usize = 8;

/// Collisions in an 8-hex-digit space are rare enough that running out of
/// attempts means something is wrong with the store or the generator.
const MAX_ISSUE_ATTEMPTS: u32 = 16;

type CodeSource = Arc<dyn Fn() -> String + Send + Sync>;

fn code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-F0-9]{8}$").expect("static pattern is valid"))
}

/// Fresh candidate: the leading hex digits of a random UUID, upper-cased.
pub fn generate_code() -> String {
    Uuid::new_v4().simple().to_string()[..CODE_LEN].to_uppercase()
}

/// Trims and upper-cases a user-submitted code.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

pub fn is_valid_code(code: &str) -> bool {
    code_pattern().is_match(code)
}

/// Issues verification codes and resolves them back to records.
#[derive(Clone)]
pub struct VerificationRegistry {
    store: RecordStore,
    source: CodeSource,
    max_attempts: u32,
}

impl VerificationRegistry {
    pub fn new(store: RecordStore) -> Self {
        Self {
            store,
            source: Arc::new(generate_code),
            max_attempts: MAX_ISSUE_ATTEMPTS,
        }
    }

    /// Replaces the candidate generator.
    #[cfg(test)]
    pub fn with_code_source(mut self, source: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.source = Arc::new(source);
        self
    }

    /// Returns the record's code, issuing one if it has none yet. Calling it
    /// again for the same record returns the same code.
    pub async fn issue_code(&self, record_id: i64) -> Result<String> {
        for attempt in 1..=self.max_attempts {
            let candidate = (self.source)();
            if !is_valid_code(&candidate) {
                return Err(CertifyError::Configuration(format!(
                    "code generator produced malformed candidate {candidate:?}"
                )));
            }

            match self.store.claim_verification_code(record_id, &candidate).await? {
                ClaimOutcome::Claimed => {
                    info!(record_id, code = %candidate, attempt, "Verification code issued");
                    return Ok(candidate);
                }
                ClaimOutcome::AlreadyAssigned(existing) => return Ok(existing),
                ClaimOutcome::Collision => {
                    warn!(record_id, code = %candidate, attempt, "Verification code collision, resampling");
                }
            }
        }

        Err(CertifyError::Configuration(format!(
            "no free verification code after {} attempts for record {record_id}",
            self.max_attempts
        )))
    }

    /// Exact, case-insensitive lookup across both tracks.
    pub async fn resolve(&self, raw: &str) -> Result<Option<CertificateRecord>> {
        let code = normalize_code(raw);
        if !is_valid_code(&code) {
            return Ok(None);
        }
        self.store.find_by_code(&code).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{RecordDraft, Track};
    use chrono::NaiveDate;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn draft(track: Track, name: &str) -> RecordDraft {
        RecordDraft {
            track,
            name: name.to_string(),
            email: "someone@example.org".to_string(),
            track_label: "Data Science".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 8, 30).unwrap(),
        }
    }

    /// Hands out `codes` in order, repeating the last one.
    fn scripted(codes: &'static [&'static str]) -> impl Fn() -> String + Send + Sync {
        let next = AtomicUsize::new(0);
        move || {
            let i = next.fetch_add(1, Ordering::SeqCst).min(codes.len() - 1);
            codes[i].to_string()
        }
    }

    #[test]
    fn generated_codes_match_format() {
        for _ in 0..200 {
            let code = generate_code();
            assert!(is_valid_code(&code), "{code}");
        }
    }

    #[test]
    fn normalization_trims_and_uppercases() {
        assert_eq!(normalize_code("  abcdef01\n"), "ABCDEF01");
        assert!(!is_valid_code("ABCDEF0"));
        assert!(!is_valid_code("ABCDEFG1"));
        assert!(!is_valid_code("abcdef01"));
    }

    #[tokio::test]
    async fn issued_codes_are_unique_and_well_formed() {
        let store = RecordStore::open_in_memory().await.unwrap();
        let registry = VerificationRegistry::new(store.clone());

        let mut seen = HashSet::new();
        for i in 0..25 {
            let track = if i % 2 == 0 { Track::Internship } else { Track::Training };
            let record = store.create_record(&draft(track, &format!("Person {i}"))).await.unwrap();
            let code = registry.issue_code(record.id).await.unwrap();
            assert!(is_valid_code(&code));
            assert!(seen.insert(code));
        }
    }

    #[tokio::test]
    async fn issuing_twice_keeps_the_first_code() {
        let store = RecordStore::open_in_memory().await.unwrap();
        let registry = VerificationRegistry::new(store.clone());
        let record = store.create_record(&draft(Track::Internship, "Jordan Lee")).await.unwrap();

        let first = registry.issue_code(record.id).await.unwrap();
        let second = registry.issue_code(record.id).await.unwrap();
        assert_eq!(first, second);
        let stored = store.get_record(record.id).await.unwrap().unwrap();
        assert_eq!(stored.verification_code.as_deref(), Some(first.as_str()));
    }

    #[tokio::test]
    async fn collision_is_resampled() {
        let store = RecordStore::open_in_memory().await.unwrap();
        let a = store.create_record(&draft(Track::Internship, "A")).await.unwrap();
        let b = store.create_record(&draft(Track::Training, "B")).await.unwrap();

        let registry = VerificationRegistry::new(store.clone())
            .with_code_source(scripted(&["AAAAAAAA", "AAAAAAAA", "BBBBBBBB"]));
        assert_eq!(registry.issue_code(a.id).await.unwrap(), "AAAAAAAA");
        assert_eq!(registry.issue_code(b.id).await.unwrap(), "BBBBBBBB");
    }

    #[tokio::test]
    async fn exhausted_code_space_is_a_configuration_error() {
        let store = RecordStore::open_in_memory().await.unwrap();
        let a = store.create_record(&draft(Track::Internship, "A")).await.unwrap();
        let b = store.create_record(&draft(Track::Internship, "B")).await.unwrap();

        let registry = VerificationRegistry::new(store.clone()).with_code_source(|| "CAFEBABE".to_string());
        registry.issue_code(a.id).await.unwrap();
        let err = registry.issue_code(b.id).await.unwrap_err();
        assert!(matches!(err, CertifyError::Configuration(_)));
        let b = store.get_record(b.id).await.unwrap().unwrap();
        assert_eq!(b.verification_code, None);
    }

    #[tokio::test]
    async fn malformed_generator_output_is_refused() {
        let store = RecordStore::open_in_memory().await.unwrap();
        let record = store.create_record(&draft(Track::Internship, "A")).await.unwrap();
        let registry = VerificationRegistry::new(store).with_code_source(|| "lowercase".to_string());
        assert!(matches!(
            registry.issue_code(record.id).await,
            Err(CertifyError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn resolve_finds_either_track_case_insensitively() {
        let store = RecordStore::open_in_memory().await.unwrap();
        let trainee = store.create_record(&draft(Track::Training, "Ana")).await.unwrap();
        let registry = VerificationRegistry::new(store.clone()).with_code_source(|| "0A1B2C3D".to_string());
        registry.issue_code(trainee.id).await.unwrap();

        let found = registry.resolve(" 0a1b2c3d ").await.unwrap().unwrap();
        assert_eq!(found.id, trainee.id);
        assert_eq!(found.track, Track::Training);
    }

    #[tokio::test]
    async fn unknown_codes_resolve_to_nothing() {
        let store = RecordStore::open_in_memory().await.unwrap();
        let record = store.create_record(&draft(Track::Internship, "A")).await.unwrap();
        let registry = VerificationRegistry::new(store).with_code_source(|| "ABCDEF01".to_string());
        registry.issue_code(record.id).await.unwrap();

        assert!(registry.resolve("FFFFFFFF").await.unwrap().is_none());
        assert!(registry.resolve("ABCDEF0").await.unwrap().is_none());
        assert!(registry.resolve("BCDEF01").await.unwrap().is_none());
        assert!(registry.resolve("").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_issuance_settles_on_one_code() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("codes.db").display());
        let store = RecordStore::open(&url).await.unwrap();
        let record = store.create_record(&draft(Track::Training, "Ana")).await.unwrap();
        let registry = VerificationRegistry::new(store.clone());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.issue_code(record.id).await })
            })
            .collect();

        let mut codes = HashSet::new();
        for task in tasks {
            codes.insert(task.await.unwrap().unwrap());
        }
        assert_eq!(codes.len(), 1);
        let stored = store.get_record(record.id).await.unwrap().unwrap();
        assert_eq!(stored.verification_code.as_ref(), codes.iter().next());
    }
}
