use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use storage::KeyValueStore;
use tokio::sync::RwLock;

pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Per-session state shared by everything acting for one signed-in user:
/// the bearer credential and the submit in-flight flag.
#[derive(Debug, Default)]
pub struct SessionContext {
    credential: RwLock<Option<String>>,
    submitting: AtomicBool,
}

impl SessionContext {
    pub fn new(credential: Option<String>) -> Self {
        Self {
            credential: RwLock::new(credential.filter(|t| !t.trim().is_empty())),
            submitting: AtomicBool::new(false),
        }
    }

    pub async fn from_store(store: &dyn KeyValueStore) -> Result<Self> {
        let token = store.get_item(ACCESS_TOKEN_KEY).await?;
        Ok(Self::new(token))
    }

    pub async fn credential(&self) -> Option<String> {
        self.credential.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.credential.read().await.is_some()
    }

    pub async fn set_credential(&self, token: Option<String>) {
        *self.credential.write().await = token.filter(|t| !t.trim().is_empty());
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::Acquire)
    }

    /// Claims the submit slot. Returns `None` while another submission
    /// holds it; the slot is released when the guard drops.
    pub fn try_begin_submit(&self) -> Option<SubmitGuard<'_>> {
        self.submitting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SubmitGuard {
                flag: &self.submitting,
            })
    }
}

#[derive(Debug)]
pub struct SubmitGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
