//! Client store interface and the in-memory reference store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::clock::{Clock, RandomSource, SystemClock, UuidRandom};
use crate::error::{OAuthError, OAuthResult};
use crate::models::{ClientRegistration, OAuthClientInformation};

/// Lookup and optional registration of OAuth clients.
///
/// Any key-value or relational backend can implement this; the protocol
/// handlers only depend on the trait.
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Look up a client by ID.
    async fn get_client(&self, client_id: &str) -> OAuthResult<Option<OAuthClientInformation>>;

    /// Whether [`ClientStore::register_client`] is implemented. Controls
    /// whether `/register` is served.
    fn supports_registration(&self) -> bool {
        false
    }

    /// Persist a newly registered client, assigning an ID if the
    /// registration carries none.
    async fn register_client(
        &self,
        registration: ClientRegistration,
    ) -> OAuthResult<OAuthClientInformation> {
        let _ = registration;
        Err(OAuthError::server("client registration is not supported by this store"))
    }
}

/// In-memory client store following the `RwLock<HashMap>` pattern.
#[derive(Clone)]
pub struct InMemoryClientStore {
    clients: Arc<RwLock<HashMap<String, OAuthClientInformation>>>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
}

impl InMemoryClientStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_sources(Arc::new(SystemClock), Arc::new(UuidRandom))
    }

    /// Create a store using the given clock and random source for IDs.
    #[must_use]
    pub fn with_sources(clock: Arc<dyn Clock>, random: Arc<dyn RandomSource>) -> Self {
        Self { clients: Arc::new(RwLock::new(HashMap::new())), clock, random }
    }

    /// Pre-provision a client, replacing any client with the same ID.
    pub async fn insert(&self, client: OAuthClientInformation) {
        self.clients.write().await.insert(client.client_id.clone(), client);
    }

    /// Number of stored clients.
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Whether the store holds no clients.
    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}

impl Default for InMemoryClientStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryClientStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryClientStore").finish()
    }
}

#[async_trait]
impl ClientStore for InMemoryClientStore {
    async fn get_client(&self, client_id: &str) -> OAuthResult<Option<OAuthClientInformation>> {
        Ok(self.clients.read().await.get(client_id).cloned())
    }

    fn supports_registration(&self) -> bool {
        true
    }

    async fn register_client(
        &self,
        registration: ClientRegistration,
    ) -> OAuthResult<OAuthClientInformation> {
        let client_id = registration.client_id.clone().unwrap_or_else(|| self.random.identifier());
        let client = registration.into_client(client_id, self.clock.now_secs());

        let mut clients = self.clients.write().await;
        if clients.contains_key(&client.client_id) {
            return Err(OAuthError::InvalidClientMetadata(format!(
                "client_id '{}' is already registered",
                client.client_id
            )));
        }
        clients.insert(client.client_id.clone(), client.clone());

        Ok(client)
    }
}
