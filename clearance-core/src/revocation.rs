//! §4.6 — Revocation status client: best-effort check of whether a
//! holder's credential has been revoked, via a W3C StatusList2021
//! bitstring. Fail-open by design (§9): transport errors never deny
//! access on their own.

use crate::identity_agent::IdentityAgentClient;
use base64::Engine;
use flate2::read::GzDecoder;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevocationStatus {
    Revoked,
    Valid,
    NotFound,
    CheckFailed,
    InvalidStatusList,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevocationResult {
    pub is_revoked: bool,
    pub status: RevocationStatus,
    pub checked_at: chrono::DateTime<chrono::Utc>,
    pub details: Option<String>,
}

impl RevocationResult {
    fn valid() -> Self {
        Self { is_revoked: false, status: RevocationStatus::Valid, checked_at: chrono::Utc::now(), details: None }
    }

    fn revoked() -> Self {
        Self { is_revoked: true, status: RevocationStatus::Revoked, checked_at: chrono::Utc::now(), details: None }
    }

    fn check_failed(details: impl Into<String>) -> Self {
        Self {
            is_revoked: false,
            status: RevocationStatus::CheckFailed,
            checked_at: chrono::Utc::now(),
            details: Some(details.into()),
        }
    }

    fn not_found() -> Self {
        Self { is_revoked: false, status: RevocationStatus::NotFound, checked_at: chrono::Utc::now(), details: None }
    }
}

struct CacheEntry {
    result: RevocationResult,
    cached_at: Instant,
}

pub struct RevocationClient {
    agent: IdentityAgentClient,
    cache: Mutex<HashMap<(String, String), CacheEntry>>,
    cache_ttl: Duration,
}

impl RevocationClient {
    pub fn new(agent: IdentityAgentClient, cache_ttl: Duration) -> Self {
        Self { agent, cache: Mutex::new(HashMap::new()), cache_ttl }
    }

    pub async fn check(
        &self,
        holder_id: &str,
        issuer_id: &str,
        credential_id: Option<&str>,
    ) -> RevocationResult {
        let cache_key = (holder_id.to_string(), issuer_id.to_string());
        if let Some(entry) = self.cache.lock().get(&cache_key) {
            if entry.cached_at.elapsed() < self.cache_ttl {
                return entry.result.clone();
            }
        }

        let result = self.check_uncached(holder_id, issuer_id, credential_id).await;

        if result.status != RevocationStatus::CheckFailed {
            self.cache.lock().insert(cache_key, CacheEntry { result: result.clone(), cached_at: Instant::now() });
        }
        result
    }

    async fn check_uncached(
        &self,
        holder_id: &str,
        issuer_id: &str,
        credential_id: Option<&str>,
    ) -> RevocationResult {
        let status = match credential_id {
            Some(id) => match self.agent.get_credential_status(id).await {
                Ok(status) => status,
                Err(e) => return RevocationResult::check_failed(e.to_string()),
            },
            None => {
                let records = match self.agent.list_issued_credentials(holder_id, issuer_id).await {
                    Ok(records) => records,
                    Err(e) => return RevocationResult::check_failed(e.to_string()),
                };
                let newest = records
                    .into_iter()
                    .filter(|r| r.credential_type == "SecurityClearance")
                    .filter(|r| r.holder_id == holder_id && r.issuer_id == issuer_id)
                    .max_by_key(|r| r.issued_at);
                let Some(newest) = newest else {
                    return RevocationResult::not_found();
                };
                match self.agent.get_credential_status(&newest.record_id).await {
                    Ok(status) => status,
                    Err(e) => return RevocationResult::check_failed(e.to_string()),
                }
            }
        };

        let (Some(credential), Some(index)) =
            (status.status_list_credential, status.status_list_index)
        else {
            return RevocationResult::not_found();
        };

        match decode_bit(&credential.credential_subject.encoded_list, index) {
            Ok(true) => RevocationResult::revoked(),
            Ok(false) => RevocationResult::valid(),
            Err(e) => RevocationResult {
                is_revoked: false,
                status: RevocationStatus::InvalidStatusList,
                checked_at: chrono::Utc::now(),
                details: Some(e),
            },
        }
    }
}

/// Base64-decodes then gunzips `encoded_list`, and reads the bit at
/// `index` big-endian within its byte (`byte = i/8`, `bit = 7 - i%8`).
fn decode_bit(encoded_list: &str, index: u32) -> Result<bool, String> {
    let compressed = base64::engine::general_purpose::STANDARD
        .decode(encoded_list)
        .map_err(|e| format!("base64 decode failed: {e}"))?;
    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut bitstring = Vec::new();
    decoder.read_to_end(&mut bitstring).map_err(|e| format!("gunzip failed: {e}"))?;

    let byte_index = (index / 8) as usize;
    let bit_index = 7 - (index % 8);
    let byte = bitstring.get(byte_index).ok_or_else(|| "index out of range".to_string())?;
    Ok((byte & (1 << bit_index)) != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip_b64(bits: &[u8]) -> String {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bits).unwrap();
        let compressed = encoder.finish().unwrap();
        base64::engine::general_purpose::STANDARD.encode(compressed)
    }

    #[test]
    fn decodes_revoked_bit() {
        // byte 0 = 0b10000000 -> bit 0 is revoked.
        let encoded = gzip_b64(&[0b1000_0000]);
        assert_eq!(decode_bit(&encoded, 0), Ok(true));
        assert_eq!(decode_bit(&encoded, 1), Ok(false));
    }

    #[test]
    fn decodes_bit_in_second_byte() {
        let encoded = gzip_b64(&[0b0000_0000, 0b0100_0000]);
        assert_eq!(decode_bit(&encoded, 9), Ok(true));
    }

    #[test]
    fn malformed_base64_is_an_error() {
        assert!(decode_bit("not-valid-base64!!", 0).is_err());
    }

    #[tokio::test]
    async fn offline_agent_fails_open() {
        let client = RevocationClient::new(IdentityAgentClient::new(None), Duration::from_secs(60));
        let result = client.check("holder-1", "issuer-1", Some("record-1")).await;
        assert_eq!(result.status, RevocationStatus::CheckFailed);
        assert!(!result.is_revoked);
    }
}
