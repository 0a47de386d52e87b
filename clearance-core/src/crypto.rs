//! §4.2 — Section encryptor: per-tier master key derivation, per-section
//! AES-256-GCM encryption, key wrapping, and integrity sealing.

use crate::error::CryptoError;
use crate::parser::{ParsedDocument, Section, TagKind};
use crate::tier::Tier;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use hkdf::Hkdf;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

const MASTER_KEY_INFO_PREFIX: &str = "clearance-master-key-";

fn derive_master_key(company_secret: &str, document_title: &str, tier: Tier) -> [u8; 32] {
    let salt = {
        let mut hasher = Sha256::new();
        hasher.update(document_title.as_bytes());
        hasher.finalize()
    };
    let info = format!("{MASTER_KEY_INFO_PREFIX}{}", tier.canonical_name());
    let hk = Hkdf::<Sha256>::new(Some(&salt), company_secret.as_bytes());
    let mut okm = [0u8; 32];
    hk.expand(info.as_bytes(), &mut okm)
        .expect("32 bytes is a valid HKDF-SHA-256 output length");
    okm
}

fn aes_encrypt(key: &[u8; 32], plaintext: &[u8]) -> ([u8; 12], Vec<u8>) {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut iv = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut iv);
    let nonce = Nonce::from_slice(&iv);
    let ciphertext = cipher
        .encrypt(nonce, Payload { msg: plaintext, aad: &[] })
        .expect("AES-256-GCM encryption does not fail for valid keys");
    (iv, ciphertext)
}

fn aes_decrypt(key: &[u8; 32], iv: &[u8; 12], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(iv);
    cipher
        .decrypt(nonce, Payload { msg: ciphertext, aad: &[] })
        .map_err(|_| CryptoError::AuthTagMismatch)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedSection {
    pub section_id: String,
    pub clearance: Tier,
    pub tag_name: TagKind,
    pub title: String,
    pub text_length: usize,
    pub content_hash: String,
    pub ciphertext: String,
    pub iv: String,
    pub auth_tag: String,
    pub encrypted_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrappedSectionKey {
    pub clearance: Tier,
    /// `base64(iv || auth_tag || ciphertext)` of the fresh per-section key,
    /// wrapped under the tier's master key.
    pub encrypted_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyring {
    /// tier -> base64(master key), containing every tier dominated by
    /// the outer map's key tier.
    pub keys: BTreeMap<Tier, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub title: String,
    pub doc_type: String,
    pub author: Option<String>,
    pub created_date: Option<String>,
    pub department: Option<String>,
    pub overall_classification: Tier,
    pub section_count: usize,
    pub source_format: String,
    pub encrypted_at: chrono::DateTime<chrono::Utc>,
    pub algorithm: String,
    pub encryption_version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedPackage {
    pub document_id: String,
    pub metadata: PackageMetadata,
    pub encrypted_sections: Vec<EncryptedSection>,
    pub section_keys: BTreeMap<String, WrappedSectionKey>,
    pub keyring: BTreeMap<Tier, Keyring>,
    pub integrity_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum RedactionReason {
    ClearanceInsufficient,
    DecryptionFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactedSection {
    pub section_id: String,
    pub clearance: Tier,
    pub title: String,
    pub reason: RedactionReason,
}

pub struct DecryptResult {
    pub decrypted: Vec<Section>,
    pub redacted: Vec<RedactedSection>,
}

fn integrity_hash(sections: &[EncryptedSection]) -> String {
    let mut hasher = Sha256::new();
    for s in sections {
        hasher.update(s.section_id.as_bytes());
        hasher.update(s.ciphertext.as_bytes());
        hasher.update(s.auth_tag.as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn b64_decode(s: &str) -> Result<Vec<u8>, CryptoError> {
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|_| CryptoError::AuthTagMismatch)
}

/// Produces an `EncryptedPackage` from a parsed document and a company
/// secret. Every tier present in the document gets its own master key and
/// keyring entry; each section gets a fresh key wrapped under its tier's
/// master key.
pub fn encrypt_document(
    doc: &ParsedDocument,
    document_id: &str,
    company_secret: &str,
) -> Result<EncryptedPackage, CryptoError> {
    let title = &doc.metadata.title;
    let mut master_keys: BTreeMap<Tier, [u8; 32]> = BTreeMap::new();
    for tier in Tier::ALL {
        master_keys.insert(tier, derive_master_key(company_secret, title, tier));
    }

    let mut encrypted_sections = Vec::with_capacity(doc.sections.len());
    let mut section_keys = BTreeMap::new();

    for section in &doc.sections {
        let mut section_key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut section_key);

        let (iv, ciphertext_with_tag) = aes_encrypt(&section_key, &section.content);
        // aes-gcm appends the 16-byte tag to the ciphertext; split it back
        // out so the wire format carries them as named sibling fields.
        let tag_start = ciphertext_with_tag.len() - 16;
        let (ct, tag) = ciphertext_with_tag.split_at(tag_start);

        let master_key = master_keys[&section.clearance];
        let (wrap_iv, wrapped_with_tag) = aes_encrypt(&master_key, &section_key);
        let encrypted_key = b64(&[wrap_iv.as_slice(), &wrapped_with_tag].concat());

        encrypted_sections.push(EncryptedSection {
            section_id: section.section_id.clone(),
            clearance: section.clearance,
            tag_name: section.tag_name,
            title: section.title.clone(),
            text_length: section.text_length,
            content_hash: section.content_hash.clone(),
            ciphertext: b64(ct),
            iv: b64(&iv),
            auth_tag: b64(tag),
            encrypted_at: chrono::Utc::now(),
        });

        section_keys.insert(
            section.section_id.clone(),
            WrappedSectionKey { clearance: section.clearance, encrypted_key },
        );
    }

    let integrity_hash = integrity_hash(&encrypted_sections);

    let mut keyring = BTreeMap::new();
    for holder_tier in Tier::ALL {
        let mut keys = BTreeMap::new();
        for dominated in holder_tier.dominated_tiers() {
            keys.insert(dominated, b64(&master_keys[&dominated]));
        }
        keyring.insert(holder_tier, Keyring { keys });
    }

    Ok(EncryptedPackage {
        document_id: document_id.to_string(),
        metadata: PackageMetadata {
            title: doc.metadata.title.clone(),
            doc_type: doc.metadata.doc_type.clone(),
            author: doc.metadata.author.clone(),
            created_date: doc.metadata.created_date.clone(),
            department: doc.metadata.department.clone(),
            overall_classification: doc.metadata.overall_classification,
            section_count: doc.metadata.section_count,
            source_format: doc.metadata.source_format.clone(),
            encrypted_at: chrono::Utc::now(),
            algorithm: "AES-256-GCM".to_string(),
            encryption_version: 1,
        },
        encrypted_sections,
        section_keys,
        keyring,
        integrity_hash,
    })
}

/// Decrypts every section a holder of `holder_tier` is entitled to;
/// every other section (or one that fails to decrypt) is reported in
/// `redacted`, never silently dropped.
///
/// The branch taken per section depends only on the tier comparison, not
/// on the outcome of any cryptographic operation — holding the
/// constant-time requirement from §4.2 to the dominance check itself.
pub fn decrypt_for_holder(
    package: &EncryptedPackage,
    holder_tier: Tier,
    company_secret: &str,
) -> Result<DecryptResult, CryptoError> {
    if !verify_integrity(package) {
        tracing::warn!("package-wide integrity hash does not match recomputed value; falling back to per-section verification");
    }

    let title = &package.metadata.title;
    let mut master_keys: BTreeMap<Tier, [u8; 32]> = BTreeMap::new();
    for tier in holder_tier.dominated_tiers() {
        master_keys.insert(tier, derive_master_key(company_secret, title, tier));
    }

    let mut decrypted = Vec::new();
    let mut redacted = Vec::new();

    for enc in &package.encrypted_sections {
        let dominated = holder_tier.dominates(enc.clearance);
        if !dominated {
            redacted.push(RedactedSection {
                section_id: enc.section_id.clone(),
                clearance: enc.clearance,
                title: enc.title.clone(),
                reason: RedactionReason::ClearanceInsufficient,
            });
            continue;
        }

        match decrypt_one_section(package, enc, &master_keys) {
            Ok(section) => decrypted.push(section),
            Err(_) => redacted.push(RedactedSection {
                section_id: enc.section_id.clone(),
                clearance: enc.clearance,
                title: enc.title.clone(),
                reason: RedactionReason::DecryptionFailed,
            }),
        }
    }

    Ok(DecryptResult { decrypted, redacted })
}

fn decrypt_one_section(
    package: &EncryptedPackage,
    enc: &EncryptedSection,
    master_keys: &BTreeMap<Tier, [u8; 32]>,
) -> Result<Section, CryptoError> {
    let wrapped = package
        .section_keys
        .get(&enc.section_id)
        .ok_or(CryptoError::AuthTagMismatch)?;
    let master_key = master_keys.get(&enc.clearance).ok_or(CryptoError::KeyDerivationFailed)?;

    let wrapped_blob = b64_decode(&wrapped.encrypted_key)?;
    if wrapped_blob.len() < 12 {
        return Err(CryptoError::AuthTagMismatch);
    }
    let (wrap_iv, wrap_ct_and_tag) = wrapped_blob.split_at(12);
    let wrap_iv: [u8; 12] = wrap_iv.try_into().map_err(|_| CryptoError::AuthTagMismatch)?;
    let section_key_bytes = aes_decrypt(master_key, &wrap_iv, wrap_ct_and_tag)?;
    let section_key: [u8; 32] =
        section_key_bytes.try_into().map_err(|_| CryptoError::AuthTagMismatch)?;

    let iv: [u8; 12] = b64_decode(&enc.iv)?.try_into().map_err(|_| CryptoError::AuthTagMismatch)?;
    let ciphertext = b64_decode(&enc.ciphertext)?;
    let tag = b64_decode(&enc.auth_tag)?;
    let combined = [ciphertext, tag].concat();
    let plaintext = aes_decrypt(&section_key, &iv, &combined)?;

    Ok(Section {
        section_id: enc.section_id.clone(),
        clearance: enc.clearance,
        title: enc.title.clone(),
        tag_name: enc.tag_name,
        text_length: enc.text_length,
        content_hash: enc.content_hash.clone(),
        content: plaintext,
    })
}

/// Recomputes and compares the package's integrity hash.
pub fn verify_integrity(package: &EncryptedPackage) -> bool {
    integrity_hash(&package.encrypted_sections) == package.integrity_hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{DocMetadata, ParsedDocument, Section, TagKind};

    fn sample_doc() -> ParsedDocument {
        let sections = vec![
            Section {
                section_id: "sec-001".into(),
                clearance: Tier::Internal,
                title: "Intro".into(),
                tag_name: TagKind::Block,
                text_length: 11,
                content_hash: crate::parser::content_hash(b"hello world"),
                content: b"hello world".to_vec(),
            },
            Section {
                section_id: "sec-002".into(),
                clearance: Tier::TopSecret,
                title: "Secrets".into(),
                tag_name: TagKind::Block,
                text_length: 9,
                content_hash: crate::parser::content_hash(b"top stuff"),
                content: b"top stuff".to_vec(),
            },
        ];
        ParsedDocument {
            metadata: DocMetadata {
                title: "Sample".into(),
                doc_type: "memo".into(),
                author: None,
                created_date: None,
                department: None,
                overall_classification: Tier::TopSecret,
                section_count: sections.len(),
                source_format: "html".into(),
            },
            sections,
        }
    }

    #[test]
    fn round_trip_for_highest_tier_sees_all() {
        let doc = sample_doc();
        let package = encrypt_document(&doc, "doc-1", "secret").unwrap();
        let result = decrypt_for_holder(&package, Tier::TopSecret, "secret").unwrap();
        assert_eq!(result.redacted.len(), 0);
        assert_eq!(result.decrypted.len(), 2);
        let contents: Vec<Vec<u8>> = result.decrypted.iter().map(|s| s.content.clone()).collect();
        assert!(contents.contains(&b"hello world".to_vec()));
        assert!(contents.contains(&b"top stuff".to_vec()));
    }

    #[test]
    fn low_tier_holder_is_redacted_for_high_sections() {
        let doc = sample_doc();
        let package = encrypt_document(&doc, "doc-1", "secret").unwrap();
        let result = decrypt_for_holder(&package, Tier::Confidential, "secret").unwrap();
        assert_eq!(result.decrypted.len(), 1);
        assert_eq!(result.redacted.len(), 1);
        assert_eq!(result.redacted[0].reason, RedactionReason::ClearanceInsufficient);
    }

    #[test]
    fn tampered_ciphertext_is_redacted_not_dropped() {
        let doc = sample_doc();
        let mut package = encrypt_document(&doc, "doc-1", "secret").unwrap();
        let original_hash = package.integrity_hash.clone();
        package.encrypted_sections[0].ciphertext = b64(b"tampered-bytes-of-wrong-length!!");
        assert_ne!(integrity_hash(&package.encrypted_sections), original_hash);
        assert!(!verify_integrity(&package));

        // The tampered section is redacted; the untouched sibling section
        // still decrypts normally rather than the whole call failing.
        let result = decrypt_for_holder(&package, Tier::TopSecret, "secret").unwrap();
        assert_eq!(result.decrypted.len(), 1);
        assert_eq!(result.decrypted[0].section_id, "sec-002");
        assert_eq!(result.redacted.len(), 1);
        assert_eq!(result.redacted[0].section_id, "sec-001");
        assert_eq!(result.redacted[0].reason, RedactionReason::DecryptionFailed);
    }

    #[test]
    fn wrong_company_secret_redacts_as_decryption_failed() {
        let doc = sample_doc();
        let package = encrypt_document(&doc, "doc-1", "secret").unwrap();
        let result = decrypt_for_holder(&package, Tier::TopSecret, "wrong-secret").unwrap();
        assert_eq!(result.decrypted.len(), 0);
        assert_eq!(result.redacted.len(), 2);
        for r in &result.redacted {
            assert_eq!(r.reason, RedactionReason::DecryptionFailed);
        }
    }

    #[test]
    fn keyring_contains_exactly_dominated_tiers() {
        let doc = sample_doc();
        let package = encrypt_document(&doc, "doc-1", "secret").unwrap();
        let restricted_ring = &package.keyring[&Tier::Restricted];
        assert_eq!(restricted_ring.keys.len(), 3);
        assert!(restricted_ring.keys.contains_key(&Tier::Internal));
        assert!(restricted_ring.keys.contains_key(&Tier::Restricted));
        assert!(!restricted_ring.keys.contains_key(&Tier::TopSecret));
    }

    #[test]
    fn verify_integrity_detects_tamper() {
        let doc = sample_doc();
        let mut package = encrypt_document(&doc, "doc-1", "secret").unwrap();
        assert!(verify_integrity(&package));
        package.encrypted_sections[0].auth_tag = b64(b"0000000000000000");
        assert!(!verify_integrity(&package));
    }
}
