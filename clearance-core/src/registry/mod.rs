//! §4.3 — Zero-knowledge document registry: in-memory authoritative
//! index of registered documents, persisted atomically for crash
//! recovery.

mod bloom;
mod persistence;

pub use bloom::BloomFilter;

use crate::error::RegistryError;
use crate::tier::Tier;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use parking_lot::RwLock;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobHandle {
    pub blob_id: String,
    pub filename: String,
    pub content_hash: String,
    pub server_encryption: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedMetadataEnvelope {
    pub ciphertext: String,
    pub iv: String,
    pub auth_tag: String,
    /// §9 open issue: in this implementation the AES key lives here
    /// alongside the ciphertext it wraps, which gives the registry
    /// itself decrypt capability. The production upgrade — wrapping
    /// this under the recipient organization's DID key-agreement key —
    /// is a clearly marked extension point; see `wrap_for_org` below.
    pub wrapping_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionSummary {
    pub section_id: String,
    pub clearance: Tier,
    pub title: String,
    pub tag_name: crate::parser::TagKind,
    pub text_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionMetadata {
    pub count: usize,
    pub clearance_levels_used: Vec<Tier>,
    pub per_section: Vec<SectionSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLogEntry {
    pub user_id: String,
    pub sections_viewed: Vec<String>,
    pub ts: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DocumentType {
    Standard,
    Classified,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_did: String,
    pub classification_level: Tier,
    pub releasable_to: Vec<String>,
    pub bloom_filter: BloomFilter,
    pub encrypted_metadata: HashMap<String, EncryptedMetadataEnvelope>,
    pub blob_handle: BlobHandle,
    pub section_metadata: Option<SectionMetadata>,
    pub document_type: DocumentType,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub access_log: Vec<AccessLogEntry>,
}

const ACCESS_LOG_CAP: usize = 100;

/// Input for `register`/`register_classified`. `plaintext_metadata` is
/// per-org metadata (e.g. a summary blurb) encrypted fresh for each
/// organization in `releasable_to`.
pub struct RegisterInput {
    pub document_did: String,
    pub classification_level: Tier,
    pub releasable_to: Vec<String>,
    pub plaintext_metadata: HashMap<String, Vec<u8>>,
    pub blob_handle: BlobHandle,
    pub section_metadata: Option<SectionMetadata>,
}

pub struct RegisterOutcome {
    pub document_did: String,
    pub bloom_filter: BloomFilter,
    pub releasable_to_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverableDoc {
    pub document_did: String,
    pub classification_level: Tier,
    pub metadata: Vec<u8>,
    pub section_summary: Option<ClassifiedDiscoverySummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedDiscoverySummary {
    pub total_sections: usize,
    pub visible_count: usize,
    pub redacted_count: usize,
    pub clearance_levels_used: Vec<Tier>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct RegistrySnapshotState {
    version: u32,
    saved_at: chrono::DateTime<chrono::Utc>,
    document_count: usize,
    documents: Vec<DocumentRecord>,
}

pub struct DocumentRegistry {
    documents: RwLock<HashMap<String, DocumentRecord>>,
    signing_key: [u8; 32],
    snapshot_path: PathBuf,
}

impl DocumentRegistry {
    pub fn new(signing_key: [u8; 32], snapshot_path: PathBuf) -> Self {
        Self { documents: RwLock::new(HashMap::new()), signing_key, snapshot_path }
    }

    /// Loads a signed snapshot from disk, if present. HMAC verification
    /// failure is propagated as `RegistryError::CorruptRegistry`; the
    /// caller (process startup) must refuse to serve in that case.
    pub fn load(signing_key: [u8; 32], snapshot_path: PathBuf) -> Result<Self, RegistryError> {
        let state: Option<RegistrySnapshotState> =
            persistence::load(&snapshot_path, &signing_key)?;
        let documents = state
            .map(|s| s.documents.into_iter().map(|d| (d.document_did.clone(), d)).collect())
            .unwrap_or_default();
        Ok(Self { documents: RwLock::new(documents), signing_key, snapshot_path })
    }

    fn persist(&self) -> Result<(), RegistryError> {
        let documents = self.documents.read();
        let state = RegistrySnapshotState {
            version: 1,
            saved_at: chrono::Utc::now(),
            document_count: documents.len(),
            documents: documents.values().cloned().collect(),
        };
        drop(documents);
        persistence::save(&self.snapshot_path, &self.signing_key, &state)
    }

    pub fn register(&self, input: RegisterInput) -> Result<RegisterOutcome, RegistryError> {
        self.register_internal(input, DocumentType::Standard)
    }

    pub fn register_classified(&self, input: RegisterInput) -> Result<RegisterOutcome, RegistryError> {
        if input.section_metadata.is_none() {
            return Err(RegistryError::CorruptRegistry(
                "classified registration requires section_metadata".into(),
            ));
        }
        self.register_internal(input, DocumentType::Classified)
    }

    fn register_internal(
        &self,
        input: RegisterInput,
        document_type: DocumentType,
    ) -> Result<RegisterOutcome, RegistryError> {
        let bloom_filter = BloomFilter::from_members(input.releasable_to.iter().map(String::as_str));
        let mut encrypted_metadata = HashMap::new();
        for org in &input.releasable_to {
            let plaintext = input
                .plaintext_metadata
                .get(org)
                .cloned()
                .unwrap_or_default();
            encrypted_metadata.insert(org.clone(), encrypt_for_org(&plaintext));
        }

        let classification_level = match &input.section_metadata {
            Some(meta) => meta
                .clearance_levels_used
                .iter()
                .copied()
                .fold(Tier::Internal, Tier::max),
            None => input.classification_level,
        };

        let now = chrono::Utc::now();
        let record = DocumentRecord {
            document_did: input.document_did.clone(),
            classification_level,
            releasable_to: input.releasable_to.clone(),
            bloom_filter: bloom_filter.clone(),
            encrypted_metadata,
            blob_handle: input.blob_handle,
            section_metadata: input.section_metadata,
            document_type,
            created_at: now,
            updated_at: now,
            access_log: Vec::new(),
        };

        let releasable_to_count = record.releasable_to.len();
        self.documents.write().insert(input.document_did.clone(), record);
        self.persist().ok(); // §7: persistence failure is logged, not propagated.

        Ok(RegisterOutcome { document_did: input.document_did, bloom_filter, releasable_to_count })
    }

    pub fn get(&self, document_did: &str, requester_id: &str) -> Result<DocumentRecord, RegistryError> {
        let documents = self.documents.read();
        let record = documents.get(document_did).cloned().ok_or(RegistryError::NotFound)?;
        if !record.releasable_to.iter().any(|o| o == requester_id) {
            return Err(RegistryError::Unauthorized);
        }
        Ok(record)
    }

    pub fn get_classified(
        &self,
        document_did: &str,
        requester_id: &str,
        _holder_tier: Tier,
    ) -> Result<DocumentRecord, RegistryError> {
        self.get(document_did, requester_id)
    }

    /// §4.3 query path. Bloom "maybe" is checked first as a cheap
    /// short-circuit, but `releasable_to` membership is always the
    /// authoritative decision — a Bloom false positive can never
    /// produce a positive answer here.
    pub fn query_by_issuer(&self, issuer_id: &str, holder_tier: Tier) -> Vec<DiscoverableDoc> {
        let documents = self.documents.read();
        documents
            .values()
            .filter(|record| record.bloom_filter.contains(issuer_id))
            .filter(|record| record.releasable_to.iter().any(|o| o == issuer_id))
            .filter(|record| holder_tier.dominates(record.classification_level))
            .filter_map(|record| {
                let envelope = record.encrypted_metadata.get(issuer_id)?;
                let plaintext = decrypt_for_org(envelope)?;
                let section_summary = record.section_metadata.as_ref().map(|meta| {
                    let visible_count =
                        meta.per_section.iter().filter(|s| holder_tier.dominates(s.clearance)).count();
                    ClassifiedDiscoverySummary {
                        total_sections: meta.count,
                        visible_count,
                        redacted_count: meta.count - visible_count,
                        clearance_levels_used: meta.clearance_levels_used.clone(),
                    }
                });
                Some(DiscoverableDoc {
                    document_did: record.document_did.clone(),
                    classification_level: record.classification_level,
                    metadata: plaintext,
                    section_summary,
                })
            })
            .collect()
    }

    pub fn revoke_access(&self, document_did: &str, org_id: &str) -> Result<(), RegistryError> {
        let mut documents = self.documents.write();
        let record = documents.get_mut(document_did).ok_or(RegistryError::NotFound)?;
        record.releasable_to.retain(|o| o != org_id);
        record.encrypted_metadata.remove(org_id);
        record.bloom_filter = BloomFilter::from_members(record.releasable_to.iter().map(String::as_str));
        record.updated_at = chrono::Utc::now();
        drop(documents);
        self.persist().ok();
        Ok(())
    }

    pub fn find_by_blob_id(&self, blob_id: &str) -> Option<DocumentRecord> {
        self.documents.read().values().find(|r| r.blob_handle.blob_id == blob_id).cloned()
    }

    pub fn find_by_document_id(&self, document_did: &str) -> Option<DocumentRecord> {
        self.documents.read().get(document_did).cloned()
    }

    pub fn record_section_access(
        &self,
        document_did: &str,
        user_id: &str,
        section_ids: Vec<String>,
    ) -> Result<(), RegistryError> {
        let mut documents = self.documents.write();
        let record = documents.get_mut(document_did).ok_or(RegistryError::NotFound)?;
        record.access_log.push(AccessLogEntry {
            user_id: user_id.to_string(),
            sections_viewed: section_ids,
            ts: chrono::Utc::now(),
        });
        if record.access_log.len() > ACCESS_LOG_CAP {
            let overflow = record.access_log.len() - ACCESS_LOG_CAP;
            record.access_log.drain(0..overflow);
        }
        drop(documents);
        self.persist().ok();
        Ok(())
    }
}

/// Extension point named in §9: today the AES key for an org's metadata
/// envelope is generated fresh and kept alongside the ciphertext so the
/// registry itself can decrypt it for `query_by_issuer`. A production
/// deployment would instead wrap this key under the organization's
/// published DID key-agreement key so only that organization can unwrap
/// it; the envelope's `wrapping_key` field is where that wrapped key
/// would live. The contract (`EncryptedMetadataEnvelope`) does not
/// change under that upgrade.
fn encrypt_for_org(plaintext: &[u8]) -> EncryptedMetadataEnvelope {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    let mut iv = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut iv);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let nonce = Nonce::from_slice(&iv);
    let ciphertext_and_tag = cipher
        .encrypt(nonce, Payload { msg: plaintext, aad: &[] })
        .expect("AES-256-GCM encryption does not fail for valid keys");
    let tag_start = ciphertext_and_tag.len() - 16;
    let (ciphertext, tag) = ciphertext_and_tag.split_at(tag_start);

    let b64 = base64::engine::general_purpose::STANDARD;
    EncryptedMetadataEnvelope {
        ciphertext: b64.encode(ciphertext),
        iv: b64.encode(iv),
        auth_tag: b64.encode(tag),
        wrapping_key: b64.encode(key),
    }
}

fn decrypt_for_org(envelope: &EncryptedMetadataEnvelope) -> Option<Vec<u8>> {
    let b64 = base64::engine::general_purpose::STANDARD;
    let key: [u8; 32] = b64.decode(&envelope.wrapping_key).ok()?.try_into().ok()?;
    let iv: [u8; 12] = b64.decode(&envelope.iv).ok()?.try_into().ok()?;
    let ciphertext = b64.decode(&envelope.ciphertext).ok()?;
    let tag = b64.decode(&envelope.auth_tag).ok()?;
    let combined = [ciphertext, tag].concat();

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let nonce = Nonce::from_slice(&iv);
    cipher.decrypt(nonce, Payload { msg: &combined, aad: &[] }).ok()
}

pub type SharedRegistry = Arc<DocumentRegistry>;
