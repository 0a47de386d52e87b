//! §6 — The IdentityAgent contract, consumed but not implemented by this
//! core: DID resolution, credential offer/status, and connection
//! endpoints belong to the external identity platform. This module
//! gives the core just enough of a client abstraction to resolve a
//! requester's authentication key and query credential/status-list
//! records.

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DidDocument {
    pub id: String,
    /// Multibase-encoded (`z`-prefixed, base58btc) Ed25519 authentication
    /// public key.
    pub authentication: String,
}

impl DidDocument {
    pub fn authentication_key(&self) -> Option<VerifyingKey> {
        let encoded = self.authentication.strip_prefix('z')?;
        let decoded = bs58::decode(encoded).into_vec().ok()?;
        // multicodec ed25519-pub prefix 0xed 0x01
        let bytes = decoded.strip_prefix(&[0xed, 0x01])?;
        VerifyingKey::from_bytes(bytes.try_into().ok()?).ok()
    }
}

/// Builds a test DID document for a given Ed25519 public key, mirroring
/// `did::make_test_did_document` used throughout the corpus's test
/// suites.
pub fn make_test_did_document(did: &str, public_key: &VerifyingKey) -> DidDocument {
    let mut prefixed = vec![0xed, 0x01];
    prefixed.extend_from_slice(public_key.as_bytes());
    DidDocument { id: did.to_string(), authentication: format!("z{}", bs58::encode(prefixed).into_string()) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub record_id: String,
    pub credential_type: String,
    pub holder_id: String,
    pub issuer_id: String,
    pub issued_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialStatus {
    pub status_list_credential: Option<StatusListCredential>,
    pub status_list_index: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusListCredential {
    pub credential_subject: StatusListSubject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusListSubject {
    /// base64-encoded, gzip-compressed bitstring.
    pub encoded_list: String,
}

/// `DidResolver::http()` hits the real IdentityAgent; `static_map` backs
/// unit and integration tests with fixed documents.
pub enum DidResolver {
    Http { client: reqwest::Client, base_url: String },
    StaticMap(HashMap<String, DidDocument>),
}

impl DidResolver {
    pub fn http(base_url: impl Into<String>) -> Self {
        DidResolver::Http { client: reqwest::Client::new(), base_url: base_url.into() }
    }

    pub fn static_map(docs: HashMap<String, DidDocument>) -> Self {
        DidResolver::StaticMap(docs)
    }

    pub async fn resolve(&self, did: &str) -> Option<DidDocument> {
        match self {
            DidResolver::StaticMap(map) => map.get(did).cloned(),
            DidResolver::Http { client, base_url } => {
                let url = format!("{base_url}/dids/{did}");
                let resp = client.get(url).send().await.ok()?;
                resp.json::<DidDocument>().await.ok()
            }
        }
    }
}

/// §6's IdentityAgent contract, consumed as HTTP by the full client but
/// represented here as the operations the core actually calls: fetching
/// a holder's most recent "SecurityClearance" credential record and its
/// status-list pointer. Connection/publication/offer endpoints exist on
/// the real IdentityAgent but are never invoked by this core — they
/// belong to out-of-band provisioning, out of scope per spec §1.
pub struct IdentityAgentClient {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl IdentityAgentClient {
    pub fn new(base_url: Option<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url }
    }

    pub async fn get_credential_status(&self, record_id: &str) -> Result<CredentialStatus, reqwest::Error> {
        let base_url = self.base_url.as_deref().unwrap_or("http://offline.invalid");
        let url = format!("{base_url}/credentials/{record_id}/status");
        self.client.get(url).send().await?.json().await
    }

    /// Bounded to the 100 most-recent entries per §4.6 step 2.
    pub async fn list_issued_credentials(
        &self,
        holder_id: &str,
        issuer_id: &str,
    ) -> Result<Vec<CredentialRecord>, reqwest::Error> {
        let base_url = self.base_url.as_deref().unwrap_or("http://offline.invalid");
        let url = format!("{base_url}/credentials?holder={holder_id}&issuer={issuer_id}&limit=100");
        self.client.get(url).send().await?.json().await
    }

    pub async fn fetch_status_list(&self, url: &str) -> Result<StatusListCredential, reqwest::Error> {
        self.client.get(url).send().await?.json().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    #[test]
    fn did_document_round_trips_authentication_key() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let doc = make_test_did_document("did:example:1", &signing_key.verifying_key());
        let recovered = doc.authentication_key().unwrap();
        assert_eq!(recovered.as_bytes(), signing_key.verifying_key().as_bytes());
    }

    #[tokio::test]
    async fn static_resolver_returns_registered_document() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let doc = make_test_did_document("did:example:1", &signing_key.verifying_key());
        let mut map = HashMap::new();
        map.insert("did:example:1".to_string(), doc);
        let resolver = DidResolver::static_map(map);

        assert!(resolver.resolve("did:example:1").await.is_some());
        assert!(resolver.resolve("did:example:missing").await.is_none());
    }
}
