use crate::infrastructure::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

const SERVICE_NAME: &str = "plansync";
const SESSION_KEY: &str = "session";

/// Signed-in account. The auth token never appears in debug output.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub owner_id: i64,
    pub auth_token: String,
    pub display_name: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("owner_id", &self.owner_id)
            .field("auth_token", &"<redacted>")
            .field("display_name", &self.display_name)
            .finish()
    }
}

pub trait CredentialStore: Send + Sync {
    fn save_session(&self, session: &Session) -> Result<(), EngineError>;
    fn load_session(&self) -> Result<Option<Session>, EngineError>;
    fn clear_session(&self) -> Result<(), EngineError>;
}

/// Stores the session as a JSON payload in the OS keychain.
pub struct KeychainCredentialStore;

impl KeychainCredentialStore {
    fn entry() -> Result<keyring::Entry, EngineError> {
        keyring::Entry::new(SERVICE_NAME, SESSION_KEY)
            .map_err(|e| EngineError::Credential(format!("keychain unavailable: {e}")))
    }
}

impl CredentialStore for KeychainCredentialStore {
    fn save_session(&self, session: &Session) -> Result<(), EngineError> {
        let payload = serde_json::to_string(session)?;
        Self::entry()?
            .set_password(&payload)
            .map_err(|e| EngineError::Credential(format!("failed to store session: {e}")))
    }

    fn load_session(&self) -> Result<Option<Session>, EngineError> {
        let payload = match Self::entry()?.get_password() {
            Ok(payload) => payload,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(e) => {
                return Err(EngineError::Credential(format!(
                    "failed to read session: {e}"
                )));
            }
        };
        Ok(Some(serde_json::from_str(&payload)?))
    }

    fn clear_session(&self) -> Result<(), EngineError> {
        match Self::entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(EngineError::Credential(format!(
                "failed to clear session: {e}"
            ))),
        }
    }
}

#[derive(Default)]
pub struct InMemoryCredentialStore {
    session: Mutex<Option<Session>>,
}

impl InMemoryCredentialStore {
    pub fn with_session(session: Session) -> Self {
        Self {
            session: Mutex::new(Some(session)),
        }
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn save_session(&self, session: &Session) -> Result<(), EngineError> {
        *self.session.lock().map_err(|_| {
            EngineError::Credential("session store poisoned".into())
        })? = Some(session.clone());
        Ok(())
    }

    fn load_session(&self) -> Result<Option<Session>, EngineError> {
        Ok(self
            .session
            .lock()
            .map_err(|_| EngineError::Credential("session store poisoned".into()))?
            .clone())
    }

    fn clear_session(&self) -> Result<(), EngineError> {
        *self.session.lock().map_err(|_| {
            EngineError::Credential("session store poisoned".into())
        })? = None;
        Ok(())
    }
}
