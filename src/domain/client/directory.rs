use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::StoreError;
use super::value_objects::{Address, Client};

/// Read access to client profiles. Only consulted when a draft is opened
/// and when it is finalized.
#[async_trait]
pub trait ClientDirectory: Send + Sync {
    /// All clients, in registration order
    async fn list_clients(&self) -> Result<Vec<Client>, StoreError>;

    async fn find_client(&self, client_id: Uuid) -> Result<Option<Client>, StoreError>;
}

/// Client profiles held in process memory, kept in registration order.
#[derive(Clone, Default)]
pub struct InMemoryClientDirectory {
    clients: Arc<RwLock<Vec<Client>>>,
}

impl InMemoryClientDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new client or replace the profile with the same id.
    pub async fn upsert(&self, client: Client) {
        let mut clients = self.clients.write().await;
        match clients.iter_mut().find(|c| c.id == client.id) {
            Some(existing) => *existing = client,
            None => clients.push(client),
        }
    }

    pub async fn update_name(&self, client_id: Uuid, name: impl Into<String>) -> bool {
        self.edit(client_id, |c| c.name = name.into()).await
    }

    pub async fn update_address(
        &self,
        client_id: Uuid,
        address: Option<Address>,
        number: impl Into<String>,
    ) -> bool {
        self.edit(client_id, |c| {
            c.address = address;
            c.address_number = number.into();
        })
        .await
    }

    async fn edit(&self, client_id: Uuid, f: impl FnOnce(&mut Client)) -> bool {
        let mut clients = self.clients.write().await;
        match clients.iter_mut().find(|c| c.id == client_id) {
            Some(client) => {
                f(client);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl ClientDirectory for InMemoryClientDirectory {
    async fn list_clients(&self) -> Result<Vec<Client>, StoreError> {
        Ok(self.clients.read().await.clone())
    }

    async fn find_client(&self, client_id: Uuid) -> Result<Option<Client>, StoreError> {
        Ok(self.clients.read().await.iter().find(|c| c.id == client_id).cloned())
    }
}
