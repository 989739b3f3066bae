//! Capability tokens.
//!
//! A token is a random 32-character alphanumeric string bound to exactly one
//! repository record. Possession of the token is the only credential needed
//! to update that record. Tokens never expire.

use std::sync::Arc;

use rand::distr::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

use crate::store::{KvStore, StoreError};

pub const TOKEN_LENGTH: usize = 32;

const TOKEN_PREFIX: &str = "tokens:";
const TOUCH_PREFIX: &str = "tokens_update:";

/// Source of unix timestamps (seconds).
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Generate a token. Collisions are not checked: 62^32 possibilities.
pub fn generate_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Mint a token for `record_id`, store the binding and touch it.
    pub async fn issue(&self, record_id: Uuid) -> Result<String, StoreError> {
        let token = generate_token();
        self.store
            .set(&format!("{TOKEN_PREFIX}{token}"), &record_id.to_string())
            .await?;
        self.touch(&token).await?;
        tracing::info!(record_id = %record_id, "Token issued");
        Ok(token)
    }

    /// Look up the record a token is bound to.
    pub async fn resolve(&self, token: &str) -> Result<Option<Uuid>, StoreError> {
        let Some(raw) = self.store.get(&format!("{TOKEN_PREFIX}{token}")).await? else {
            return Ok(None);
        };
        match Uuid::parse_str(raw.trim()) {
            Ok(id) => Ok(Some(id)),
            Err(e) => {
                tracing::warn!(error = %e, "Stored token binding is not a UUID");
                Ok(None)
            }
        }
    }

    /// Record activity on a token. The stored timestamp never moves backward.
    /// Returns the timestamp now stored.
    pub async fn touch(&self, token: &str) -> Result<i64, StoreError> {
        let key = format!("{TOUCH_PREFIX}{token}");
        let now = self.clock.now();
        let stored = self
            .store
            .get(&key)
            .await?
            .and_then(|v| v.trim().parse::<i64>().ok());
        let value = stored.map_or(now, |s| s.max(now));
        self.store.set(&key, &value.to_string()).await?;
        Ok(value)
    }

    pub async fn last_touch(&self, token: &str) -> Result<Option<i64>, StoreError> {
        let raw = self.store.get(&format!("{TOUCH_PREFIX}{token}")).await?;
        Ok(raw.and_then(|v| v.trim().parse().ok()))
    }
}

// ---------------------------------------------------------------------------
// Module external-id mappings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingOutcome {
    Recorded,
    /// A mapping already existed and was left untouched.
    AlreadyMapped(String),
}

/// Bidirectional (module, token) <-> external id mapping.
#[derive(Clone)]
pub struct ModuleMappings {
    store: Arc<dyn KvStore>,
}

impl ModuleMappings {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    fn token_key(module: &str, token: &str) -> String {
        format!("modules:{module}:token:{token}")
    }

    fn external_key(module: &str, external_id: &str) -> String {
        format!("modules:{module}:external_id:{external_id}")
    }

    /// Store both directions. An existing mapping for (module, token) is
    /// immutable and is never overwritten.
    pub async fn record(
        &self,
        module: &str,
        token: &str,
        external_id: &str,
    ) -> Result<MappingOutcome, StoreError> {
        if let Some(existing) = self.external_id(module, token).await? {
            return Ok(MappingOutcome::AlreadyMapped(existing));
        }
        self.store
            .set(&Self::token_key(module, token), external_id)
            .await?;
        self.store
            .set(&Self::external_key(module, external_id), token)
            .await?;
        Ok(MappingOutcome::Recorded)
    }

    pub async fn external_id(&self, module: &str, token: &str) -> Result<Option<String>, StoreError> {
        self.store.get(&Self::token_key(module, token)).await
    }

    pub async fn token_for(&self, module: &str, external_id: &str) -> Result<Option<String>, StoreError> {
        self.store.get(&Self::external_key(module, external_id)).await
    }
}
