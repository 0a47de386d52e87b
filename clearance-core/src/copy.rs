//! §4.5 — Ephemeral copy identities, signed access tokens, and the
//! persisted view-once ledger.

use crate::canonical;
use crate::tier::Tier;
use base64::Engine;
use parking_lot::Mutex;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use subtle::ConstantTimeEq;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyStatus {
    Active,
    Revoked,
    Expired,
    Consumed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPair {
    pub x25519_pub: [u8; 32],
    /// Retained only in the issuing process; never serialized into a
    /// persisted snapshot (the copy store itself is in-memory-only).
    #[serde(skip_serializing)]
    pub x25519_priv: [u8; 32],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EphemeralCopy {
    pub ephemeral_id: String,
    pub original_document_did: String,
    pub recipient_id: String,
    pub recipient_x25519_pub_key: [u8; 32],
    pub clearance_level: Tier,
    pub redacted_section_ids: Vec<String>,
    pub key_pair: KeyPair,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub ttl_ms: i64,
    pub views_allowed: i64,
    pub view_count: i64,
    pub status: CopyStatus,
    #[serde(skip_serializing)]
    pub signing_material: [u8; 32],
    pub revoked_at: Option<chrono::DateTime<chrono::Utc>>,
    pub revocation_reason: Option<String>,
    pub last_viewed_at: Option<chrono::DateTime<chrono::Utc>>,
}

pub const DEFAULT_TTL_MS: i64 = 3_600_000;

impl EphemeralCopy {
    pub fn new(
        original_document_did: &str,
        recipient_id: &str,
        recipient_x25519_pub_key: [u8; 32],
        clearance_level: Tier,
        redacted_section_ids: Vec<String>,
        views_allowed: i64,
        ttl_ms: i64,
    ) -> Self {
        let mut server_secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut server_secret);
        let server_public = x25519_dalek::PublicKey::from(&x25519_dalek::StaticSecret::from(server_secret));

        let mut signing_material = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut signing_material);

        let created_at = chrono::Utc::now();
        let expires_at = created_at + chrono::Duration::milliseconds(ttl_ms);

        Self {
            ephemeral_id: generate_id(),
            original_document_did: original_document_did.to_string(),
            recipient_id: recipient_id.to_string(),
            recipient_x25519_pub_key,
            clearance_level,
            redacted_section_ids,
            key_pair: KeyPair { x25519_pub: *server_public.as_bytes(), x25519_priv: server_secret },
            created_at,
            expires_at,
            ttl_ms,
            views_allowed,
            view_count: 0,
            status: CopyStatus::Active,
            signing_material,
            revoked_at: None,
            revocation_reason: None,
            last_viewed_at: None,
        }
    }

    /// `valid(copy) ≡ now ≤ expiresAt ∧ status == active ∧
    /// (viewsAllowed == -1 ∨ viewCount < viewsAllowed)`.
    pub fn is_valid(&self) -> bool {
        let now = chrono::Utc::now();
        now <= self.expires_at
            && self.status == CopyStatus::Active
            && (self.views_allowed == -1 || self.view_count < self.views_allowed)
    }

    /// Evaluates validity, increments the view counter, and transitions
    /// to `consumed` if that crosses the view-count threshold. Returns
    /// whether the serve was permitted.
    pub fn serve(&mut self) -> bool {
        if !self.is_valid() {
            return false;
        }
        self.view_count += 1;
        self.last_viewed_at = Some(chrono::Utc::now());
        if self.views_allowed != -1 && self.view_count >= self.views_allowed {
            self.status = CopyStatus::Consumed;
        }
        true
    }

    pub fn revoke(&mut self, reason: &str) {
        self.status = CopyStatus::Revoked;
        self.revoked_at = Some(chrono::Utc::now());
        self.revocation_reason = Some(reason.to_string());
    }

    /// Only extends the TTL of a copy that is currently valid.
    pub fn extend_ttl(&mut self, delta_ms: i64) -> bool {
        if !self.is_valid() {
            return false;
        }
        self.expires_at += chrono::Duration::milliseconds(delta_ms);
        true
    }
}

fn generate_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenPayload {
    eph: String,
    doc: String,
    clr: u8,
    exp: i64,
    iat: i64,
}

/// `base64url(payload) || "." || base64url(hmac)`.
pub fn generate_token(copy: &EphemeralCopy) -> String {
    let payload = TokenPayload {
        eph: copy.ephemeral_id.clone(),
        doc: copy.original_document_did.clone(),
        clr: copy.clearance_level.level(),
        exp: copy.expires_at.timestamp(),
        iat: copy.created_at.timestamp(),
    };
    let payload_json = serde_json::to_vec(&payload).expect("token payload always serializes");
    let payload_b64 = b64url(&payload_json);
    let hmac = canonical::hmac_sign(&copy.signing_material, payload_b64.as_bytes());
    format!("{payload_b64}.{}", b64url(hmac.as_bytes()))
}

pub fn verify_token(token: &str, copy: &EphemeralCopy, expected_document_did: &str) -> bool {
    let Some((payload_b64, hmac_b64)) = token.split_once('.') else {
        return false;
    };
    let expected_hmac = canonical::hmac_sign(&copy.signing_material, payload_b64.as_bytes());
    let Ok(given_hmac_bytes) = b64url_decode(hmac_b64) else {
        return false;
    };
    if given_hmac_bytes.ct_eq(expected_hmac.as_bytes()).unwrap_u8() != 1 {
        return false;
    }

    let Ok(payload_bytes) = b64url_decode(payload_b64) else {
        return false;
    };
    let Ok(payload) = serde_json::from_slice::<TokenPayload>(&payload_bytes) else {
        return false;
    };

    payload.eph == copy.ephemeral_id
        && payload.doc == expected_document_did
        && payload.exp * 1000 >= chrono::Utc::now().timestamp_millis()
}

fn b64url(bytes: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn b64url_decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(s)
}

/// Persisted line-oriented, append-only: `(documentDID, requesterId) ->
/// {copyId, accessedAt, clientIp}`. Survives process restart; corrupt
/// lines are skipped with a warning, never fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub document_did: String,
    pub requester_id: String,
    pub copy_id: String,
    pub accessed_at: chrono::DateTime<chrono::Utc>,
    pub client_ip: String,
}

pub struct ViewOnceLedger {
    path: PathBuf,
    entries: Mutex<HashMap<(String, String), LedgerEntry>>,
}

impl ViewOnceLedger {
    pub fn open(path: PathBuf) -> Self {
        let entries = Self::replay(&path);
        Self { path, entries: Mutex::new(entries) }
    }

    fn replay(path: &PathBuf) -> HashMap<(String, String), LedgerEntry> {
        let mut map = HashMap::new();
        let Ok(contents) = std::fs::read_to_string(path) else {
            return map;
        };
        for (line_no, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LedgerEntry>(line) {
                Ok(entry) => {
                    map.insert((entry.document_did.clone(), entry.requester_id.clone()), entry);
                }
                Err(e) => tracing::warn!(line_no, error = %e, "skipping corrupt ledger line"),
            }
        }
        map
    }

    /// Serialized per `(documentDID, requesterId)` via the mutex so
    /// concurrent requests for the same pair observe a strict order and
    /// never race to produce two "first views."
    pub fn record(&self, entry: LedgerEntry) -> std::io::Result<()> {
        let mut entries = self.entries.lock();
        let line = serde_json::to_string(&entry)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{line}")?;
        file.sync_all()?;
        entries.insert((entry.document_did.clone(), entry.requester_id.clone()), entry);
        Ok(())
    }

    pub fn get(&self, document_did: &str, requester_id: &str) -> Option<LedgerEntry> {
        self.entries.lock().get(&(document_did.to_string(), requester_id.to_string())).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_copy() -> EphemeralCopy {
        EphemeralCopy::new("doc-1", "recipient-1", [1u8; 32], Tier::Confidential, vec![], -1, DEFAULT_TTL_MS)
    }

    #[test]
    fn unbounded_views_allowed_until_expiry() {
        let mut copy = sample_copy();
        for _ in 0..50 {
            assert!(copy.serve());
        }
        assert_eq!(copy.status, CopyStatus::Active);
    }

    #[test]
    fn bounded_views_consume_after_threshold() {
        let mut copy = EphemeralCopy::new("doc-1", "recipient-1", [1u8; 32], Tier::Confidential, vec![], 2, DEFAULT_TTL_MS);
        assert!(copy.serve());
        assert!(copy.serve());
        assert_eq!(copy.status, CopyStatus::Consumed);
        assert!(!copy.serve());
    }

    #[test]
    fn revoked_copy_is_never_valid() {
        let mut copy = sample_copy();
        copy.revoke("operator request");
        assert!(!copy.is_valid());
        assert!(!copy.serve());
    }

    #[test]
    fn extend_ttl_only_applies_to_valid_copy() {
        let mut copy = sample_copy();
        let original_expiry = copy.expires_at;
        assert!(copy.extend_ttl(1000));
        assert!(copy.expires_at > original_expiry);

        copy.revoke("test");
        assert!(!copy.extend_ttl(1000));
    }

    #[test]
    fn token_round_trip() {
        let copy = sample_copy();
        let token = generate_token(&copy);
        assert!(verify_token(&token, &copy, "doc-1"));
        assert!(!verify_token(&token, &copy, "wrong-doc"));
    }

    #[test]
    fn tampered_token_fails_verification() {
        let copy = sample_copy();
        let mut token = generate_token(&copy);
        token.push('x');
        assert!(!verify_token(&token, &copy, "doc-1"));
    }

    #[test]
    fn ledger_survives_restart_and_skips_corrupt_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        {
            let ledger = ViewOnceLedger::open(path.clone());
            ledger
                .record(LedgerEntry {
                    document_did: "doc-1".into(),
                    requester_id: "req-1".into(),
                    copy_id: "copy-1".into(),
                    accessed_at: chrono::Utc::now(),
                    client_ip: "127.0.0.1".into(),
                })
                .unwrap();
        }
        // Append a corrupt line directly.
        {
            let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(file, "not valid json").unwrap();
        }
        let reloaded = ViewOnceLedger::open(path);
        assert!(reloaded.get("doc-1", "req-1").is_some());
    }
}
