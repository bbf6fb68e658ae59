//! File-backed key-value store for credentials and session state.
//!
//! Key names mirror what the production portal persists so state files are
//! interchangeable across agent versions. Writes go to disk immediately;
//! there is no write-behind buffering to lose on a crash.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoreData {
    #[serde(rename = "authToken", default, skip_serializing_if = "Option::is_none")]
    auth_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<JsonValue>,
    #[serde(
        rename = "ggwifi_session_token",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    session_token: Option<String>,
    #[serde(
        rename = "ggwifi_voucher_code",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    voucher_code: Option<String>,
    #[serde(
        rename = "device_fingerprint",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    device_fingerprint: Option<String>,
}

/// Persistent store. `open` backs it with a JSON file; `in_memory` keeps
/// everything process-local for tests.
#[derive(Debug)]
pub struct SessionStore {
    path: Option<PathBuf>,
    data: Mutex<StoreData>,
}

impl SessionStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreData::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: Some(path),
            data: Mutex::new(data),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: Mutex::new(StoreData::default()),
        }
    }

    pub fn auth_token(&self) -> Option<String> {
        self.read(|d| d.auth_token.clone())
    }

    pub fn session_token(&self) -> Option<String> {
        self.read(|d| d.session_token.clone())
    }

    pub fn voucher_code(&self) -> Option<String> {
        self.read(|d| d.voucher_code.clone())
    }

    pub fn device_fingerprint(&self) -> Option<String> {
        self.read(|d| d.device_fingerprint.clone())
    }

    pub fn set_auth(&self, token: &str, user: Option<JsonValue>) -> Result<(), StoreError> {
        self.write(|d| {
            d.auth_token = Some(token.to_string());
            d.user = user;
        })
    }

    pub fn set_session(&self, session_token: &str, voucher_code: &str) -> Result<(), StoreError> {
        self.write(|d| {
            d.session_token = Some(session_token.to_string());
            d.voucher_code = Some(voucher_code.to_string());
        })
    }

    pub fn set_device_fingerprint(&self, fingerprint: &str) -> Result<(), StoreError> {
        self.write(|d| d.device_fingerprint = Some(fingerprint.to_string()))
    }

    /// Drop the auth token and user identity, keeping session and device
    /// state. Used on HTTP 401.
    pub fn clear_credentials(&self) -> Result<(), StoreError> {
        debug!("clearing stored credentials");
        self.write(|d| {
            d.auth_token = None;
            d.user = None;
        })
    }

    /// Drop the voucher session, keeping credentials and the fingerprint.
    pub fn clear_session(&self) -> Result<(), StoreError> {
        self.write(|d| {
            d.session_token = None;
            d.voucher_code = None;
        })
    }

    fn read<T>(&self, f: impl FnOnce(&StoreData) -> T) -> T {
        let data = self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&data)
    }

    fn write(&self, f: impl FnOnce(&mut StoreData)) -> Result<(), StoreError> {
        let mut data = self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut data);
        if let Some(path) = &self.path {
            fs::write(path, serde_json::to_vec_pretty(&*data)?)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("portal-state-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn round_trips_through_disk() {
        let path = temp_path();
        {
            let store = SessionStore::open(&path).unwrap();
            store.set_session("tok-1", "AB12CD34").unwrap();
            store.set_device_fingerprint("abc123").unwrap();
        }
        let store = SessionStore::open(&path).unwrap();
        assert_eq!(store.session_token().as_deref(), Some("tok-1"));
        assert_eq!(store.voucher_code().as_deref(), Some("AB12CD34"));
        assert_eq!(store.device_fingerprint().as_deref(), Some("abc123"));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn uses_portal_key_names_on_disk() {
        let path = temp_path();
        let store = SessionStore::open(&path).unwrap();
        store.set_auth("jwt", None).unwrap();
        store.set_session("tok-1", "AB12CD34").unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        let json: JsonValue = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["authToken"], "jwt");
        assert_eq!(json["ggwifi_session_token"], "tok-1");
        assert_eq!(json["ggwifi_voucher_code"], "AB12CD34");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn clear_credentials_keeps_session_state() {
        let store = SessionStore::in_memory();
        store.set_auth("jwt", None).unwrap();
        store.set_session("tok-1", "AB12CD34").unwrap();

        store.clear_credentials().unwrap();
        assert!(store.auth_token().is_none());
        assert_eq!(store.session_token().as_deref(), Some("tok-1"));
    }

    #[test]
    fn missing_file_starts_empty() {
        let store = SessionStore::open(temp_path()).unwrap();
        assert!(store.auth_token().is_none());
        assert!(store.voucher_code().is_none());
    }
}
