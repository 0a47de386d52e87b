//! Whole-file atomic-rename persistence for the registry snapshot,
//! HMAC-signed per §4.3: a `{registryState, signature, signedAt}`
//! envelope rather than row-oriented storage.

use crate::canonical;
use crate::error::RegistryError;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
pub struct SignedSnapshot<T> {
    pub registry_state: T,
    pub signature: String,
    pub signed_at: chrono::DateTime<chrono::Utc>,
}

/// Serializes `state`, signs it, and writes it to `path` via
/// write-temp-then-rename so concurrent readers never observe a
/// partially-written file.
pub fn save<T: Serialize>(path: &Path, signing_key: &[u8], state: &T) -> Result<(), RegistryError> {
    let state_value = serde_json::to_value(state)?;
    let canonical_form = canonical::canonicalize_value(&state_value);
    let signature = canonical::hmac_sign(signing_key, canonical_form.as_bytes());
    let envelope = serde_json::json!({
        "registryState": state_value,
        "signature": signature,
        "signedAt": chrono::Utc::now(),
    });
    let bytes = serde_json::to_vec_pretty(&envelope)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Loads and verifies a signed snapshot. HMAC mismatch refuses to load
/// per §7 (`CorruptRegistry`), never silently starting with partial or
/// tampered state.
pub fn load<T: for<'de> Deserialize<'de>>(
    path: &Path,
    signing_key: &[u8],
) -> Result<Option<T>, RegistryError> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(path)?;
    let envelope: serde_json::Value = serde_json::from_slice(&bytes)?;

    let registry_state = envelope
        .get("registryState")
        .cloned()
        .ok_or_else(|| RegistryError::CorruptRegistry("missing registryState".into()))?;
    let signature = envelope
        .get("signature")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RegistryError::CorruptRegistry("missing signature".into()))?;

    let canonical_form = canonical::canonicalize_value(&registry_state);
    if !canonical::hmac_verify(signing_key, canonical_form.as_bytes(), signature) {
        return Err(RegistryError::CorruptRegistry("HMAC signature mismatch".into()));
    }

    let state: T = serde_json::from_value(registry_state)?;
    Ok(Some(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::tempdir;

    // Declared in non-alphabetical order on purpose: a fix that only
    // works because `serde_json::Value`'s map happens to agree with a
    // single-field struct's own order would not actually prove anything.
    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        zeta: u32,
        alpha: u32,
    }

    #[test]
    fn round_trips_and_verifies() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let key = b"signing-key-0123456789abcdef0123";

        save(&path, key, &Sample { zeta: 42, alpha: 7 }).unwrap();
        let loaded: Sample = load(&path, key).unwrap().unwrap();
        assert_eq!(loaded, Sample { zeta: 42, alpha: 7 });
    }

    #[test]
    fn tampered_file_refuses_to_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let key = b"signing-key-0123456789abcdef0123";
        save(&path, key, &Sample { zeta: 1, alpha: 2 }).unwrap();

        let mut raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        raw["registryState"]["zeta"] = serde_json::json!(999);
        std::fs::write(&path, serde_json::to_vec(&raw).unwrap()).unwrap();

        let result: Result<Option<Sample>, RegistryError> = load(&path, key);
        assert!(matches!(result, Err(RegistryError::CorruptRegistry(_))));
    }

    #[test]
    fn missing_file_returns_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let result: Option<Sample> = load(&path, b"key").unwrap();
        assert!(result.is_none());
    }
}
