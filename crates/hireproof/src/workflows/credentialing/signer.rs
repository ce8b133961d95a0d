use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::domain::CredentialDocument;
use super::evidence::{keys, EvidenceFragment, MatchStatus, PassportReceipt};

type HmacSha256 = Hmac<Sha256>;

/// Redacted projection of a completed credential, safe to expose externally.
///
/// No PII beyond the opaque candidate id, no raw flags, no collector
/// payloads. The field order is the canonical serialization: any holder of
/// the view plus the verifier secret can recompute the hash/signature pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassportView {
    pub credential_id: Uuid,
    pub application_id: String,
    pub candidate_id: String,
    pub job_title: String,
    pub confidence: f64,
    pub match_score: f64,
    pub match_status: MatchStatus,
    pub decision_reason: String,
    pub bias_scope: String,
    pub issued_at: DateTime<Utc>,
}

/// The final signed, immutable credential artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedPassport {
    pub credential_id: Uuid,
    pub hash: String,
    pub signature: String,
    pub public_view: PassportView,
}

impl SignedPassport {
    pub fn receipt(&self) -> PassportReceipt {
        PassportReceipt {
            credential_id: self.credential_id,
            content_hash: self.hash.clone(),
            issued_at: self.public_view.issued_at,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("signing secret is empty")]
    MissingSecret,
    #[error("document is missing {0} evidence")]
    IncompleteEvidence(&'static str),
    #[error("canonical serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Finalizes completed credential documents into signed passports.
pub struct PassportSigner {
    secret: String,
}

impl PassportSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Canonicalize, hash, and sign the document's evidence bundle.
    pub fn issue(&self, document: &CredentialDocument) -> Result<SignedPassport, SigningError> {
        if self.secret.is_empty() {
            return Err(SigningError::MissingSecret);
        }

        let skills = match document.evidence(keys::SKILL).and_then(|r| r.fragment()) {
            Some(EvidenceFragment::Skills(assessment)) => assessment,
            _ => return Err(SigningError::IncompleteEvidence("skill")),
        };
        let matching = match document.evidence(keys::MATCHING).and_then(|r| r.fragment()) {
            Some(EvidenceFragment::Matching(report)) => report,
            _ => return Err(SigningError::IncompleteEvidence("matching")),
        };

        let view = PassportView {
            credential_id: Uuid::new_v4(),
            application_id: document.application_id.0.clone(),
            candidate_id: document.candidate.candidate_id.clone(),
            job_title: document.job.title.clone(),
            confidence: skills.confidence,
            match_score: matching.match_score,
            match_status: matching.match_status,
            decision_reason: matching.decision_reason.clone(),
            bias_scope: matching.bias_scope.label().to_string(),
            issued_at: Utc::now(),
        };

        let hash = content_hash(&view)?;
        let signature = self.sign(&hash);

        Ok(SignedPassport {
            credential_id: view.credential_id,
            hash,
            signature,
            public_view: view,
        })
    }

    /// Recompute the hash/signature pair from the public view and compare in
    /// constant time. Any mutated byte of the view fails verification.
    pub fn verify(&self, view: &PassportView, signature: &str) -> bool {
        let Ok(hash) = content_hash(view) else {
            return false;
        };
        let expected = self.sign(&hash);
        constant_time_eq(signature.as_bytes(), expected.as_bytes())
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PassportArchiveError {
    #[error("passport archive unavailable: {0}")]
    Unavailable(String),
}

/// Durable home for issued passports, keyed by application id. The document
/// only carries the receipt; holders fetch the full signed artifact here.
pub trait PassportArchive: Send + Sync {
    fn store(&self, passport: SignedPassport) -> Result<(), PassportArchiveError>;
    fn fetch(&self, application_id: &str) -> Result<Option<SignedPassport>, PassportArchiveError>;
}

#[derive(Default, Clone)]
pub struct InMemoryPassportArchive {
    passports: Arc<Mutex<HashMap<String, SignedPassport>>>,
}

impl PassportArchive for InMemoryPassportArchive {
    fn store(&self, passport: SignedPassport) -> Result<(), PassportArchiveError> {
        let mut guard = self.passports.lock().expect("passport mutex poisoned");
        guard.insert(passport.public_view.application_id.clone(), passport);
        Ok(())
    }

    fn fetch(&self, application_id: &str) -> Result<Option<SignedPassport>, PassportArchiveError> {
        let guard = self.passports.lock().expect("passport mutex poisoned");
        Ok(guard.get(application_id).cloned())
    }
}

fn content_hash(view: &PassportView) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_vec(view)?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}

/// Constant-time comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::credentialing::domain::{
        ApplicationId, CandidateRef, CredentialDocument, JobRequirement, JobSpec,
    };
    use crate::workflows::credentialing::evidence::{
        BiasAction, BiasScope, EvidenceRecord, MatchReport, SkillAssessment,
    };

    fn completed_document() -> CredentialDocument {
        let mut document = CredentialDocument::new(
            ApplicationId("app-000042".to_string()),
            CandidateRef {
                candidate_id: "cand-42".to_string(),
                resume_key: Some("s3://resumes/cand-42.pdf".to_string()),
                github_login: Some("octocat".to_string()),
                leetcode_handle: None,
                profile_url: None,
            },
            JobSpec {
                title: "Backend Engineer".to_string(),
                requirements: vec![JobRequirement::core("rust")],
            },
        );
        document.record_evidence(
            keys::SKILL,
            EvidenceRecord::Collected(EvidenceFragment::Skills(SkillAssessment {
                confidence: 85.0,
                test_required: false,
                verified_skills: Vec::new(),
                sources_used: vec!["profile".to_string()],
            })),
        );
        document.record_evidence(
            keys::MATCHING,
            EvidenceRecord::Collected(EvidenceFragment::Matching(MatchReport {
                match_score: 91.2,
                match_status: MatchStatus::StrongMatch,
                decision_reason: "STRONG_MATCH at score 91.2".to_string(),
                missing_core_skills: Vec::new(),
                bias_scope: BiasScope::None,
                bias_action: BiasAction::ProceedToMatching,
            })),
        );
        document
    }

    #[test]
    fn sign_verify_round_trip() {
        let signer = PassportSigner::new("unit-secret");
        let passport = signer.issue(&completed_document()).expect("issues");

        assert!(signer.verify(&passport.public_view, &passport.signature));
    }

    #[test]
    fn any_mutated_field_fails_verification() {
        let signer = PassportSigner::new("unit-secret");
        let passport = signer.issue(&completed_document()).expect("issues");

        let mut tampered = passport.public_view.clone();
        tampered.match_score += 0.1;
        assert!(!signer.verify(&tampered, &passport.signature));

        let mut renamed = passport.public_view.clone();
        renamed.decision_reason.push('!');
        assert!(!signer.verify(&renamed, &passport.signature));
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let signer = PassportSigner::new("unit-secret");
        let passport = signer.issue(&completed_document()).expect("issues");

        let other = PassportSigner::new("other-secret");
        assert!(!other.verify(&passport.public_view, &passport.signature));
    }

    #[test]
    fn public_view_redacts_collector_handles() {
        let signer = PassportSigner::new("unit-secret");
        let passport = signer.issue(&completed_document()).expect("issues");

        let serialized = serde_json::to_string(&passport.public_view).expect("serializes");
        assert!(!serialized.contains("octocat"));
        assert!(!serialized.contains("s3://resumes"));
    }

    #[test]
    fn incomplete_documents_are_not_signed() {
        let signer = PassportSigner::new("unit-secret");
        let mut document = completed_document();
        document.evidence.remove(keys::MATCHING);

        match signer.issue(&document) {
            Err(SigningError::IncompleteEvidence("matching")) => {}
            other => panic!("expected incomplete evidence error, got {other:?}"),
        }
    }
}
