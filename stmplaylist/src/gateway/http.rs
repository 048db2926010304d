//! Client HTTP de l'API Streamus

use super::{
    EntityKind, EntityRef, PersistenceGateway, PlaylistDto, PlaylistItemDto, ShareCode,
    ShareableEntityType,
};
use crate::item::EntityId;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Default timeout for HTTP requests (30 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default number of retries for idempotent requests
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Base delay between two attempts (multiplied by the attempt number)
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Passerelle HTTP/JSON
///
/// Chaque requête porte un timeout explicite. Les appels idempotents
/// (mise à jour, suppression, lecture) sont rejoués un nombre borné de fois
/// sur erreur transitoire (timeout, connexion, statut 5xx) ; les créations
/// ne sont jamais rejouées pour ne pas dupliquer d'éléments.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
}

impl HttpGateway {
    /// Create a gateway for the given server URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Create a gateway with a custom reqwest::Client
    ///
    /// Useful for sharing HTTP connection pools or custom proxy settings
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            client,
            base_url,
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(
        &self,
        operation: &str,
        idempotent: bool,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<Response> {
        let attempts = if idempotent { self.max_retries + 1 } else { 1 };
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome = build()
                .timeout(self.timeout)
                .send()
                .await
                .and_then(Response::error_for_status);

            match outcome {
                Ok(response) => return Ok(response),
                Err(e) if attempt < attempts && is_transient(&e) => {
                    tracing::warn!(
                        operation,
                        attempt,
                        "Transient error talking to server, retrying: {}",
                        e
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(e) => {
                    return Err(Error::Persistence(format!("{} failed: {}", operation, e)));
                }
            }
        }
    }

    async fn decode<T: DeserializeOwned>(operation: &str, response: Response) -> Result<T> {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            Error::MalformedRemoteData(format!("{} returned unexpected payload: {}", operation, e))
        })
    }
}

/// Route utilisée pour la mise à jour d'un champ
#[derive(Debug, Clone, PartialEq, Eq)]
enum UpdateRoute {
    /// Action dédiée : `POST Playlist/UpdateTitle` (formulaire)
    PlaylistTitle,
    /// Mise à jour partielle : `PUT {Kind}/{id}` (JSON)
    Partial(String),
}

fn update_route(entity: EntityRef, field: &str) -> UpdateRoute {
    match (entity.kind, field) {
        (EntityKind::Playlist, "title") => UpdateRoute::PlaylistTitle,
        (kind, _) => UpdateRoute::Partial(format!("{}/{}", kind.as_str(), entity.id)),
    }
}

fn is_transient(error: &reqwest::Error) -> bool {
    error.is_timeout()
        || error.is_connect()
        || error.status().is_some_and(|status| status.is_server_error())
}

#[async_trait]
impl PersistenceGateway for HttpGateway {
    async fn create(&self, item: PlaylistItemDto) -> Result<PlaylistItemDto> {
        let url = self.endpoint("PlaylistItem/");
        let response = self
            .send("create playlist item", false, || self.client.post(&url).json(&item))
            .await?;
        Self::decode("create playlist item", response).await
    }

    async fn bulk_create(&self, items: Vec<PlaylistItemDto>) -> Result<Vec<PlaylistItemDto>> {
        let url = self.endpoint("PlaylistItem/CreateMultiple");
        let response = self
            .send("create playlist items", false, || {
                self.client.post(&url).json(&items)
            })
            .await?;
        Self::decode("create playlist items", response).await
    }

    async fn update(&self, entity: EntityRef, field: &str, value: serde_json::Value) -> Result<()> {
        match update_route(entity, field) {
            UpdateRoute::PlaylistTitle => {
                let url = self.endpoint("Playlist/UpdateTitle");
                let title = match &value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let form = [("playlistId", entity.id.to_string()), ("title", title)];
                self.send("update playlist title", true, || {
                    self.client.post(&url).form(&form)
                })
                .await?;
            }
            UpdateRoute::Partial(path) => {
                let url = self.endpoint(&path);
                let mut body = serde_json::Map::new();
                body.insert("id".to_string(), serde_json::json!(entity.id));
                body.insert(field.to_string(), value);
                let body = serde_json::Value::Object(body);
                self.send("update entity", true, || self.client.put(&url).json(&body))
                    .await?;
            }
        }
        Ok(())
    }

    async fn remove(&self, entity: EntityRef) -> Result<()> {
        let url = self.endpoint(&format!("{}/{}", entity.kind.as_str(), entity.id));
        self.send("remove entity", true, || self.client.delete(&url))
            .await?;
        Ok(())
    }

    async fn get_share_code(
        &self,
        entity_type: ShareableEntityType,
        entity_id: EntityId,
    ) -> Result<ShareCode> {
        let url = self.endpoint("ShareCode/GetShareCode");
        let query = [
            ("entityType", entity_type.as_u8().to_string()),
            ("entityId", entity_id.to_string()),
        ];
        let response = self
            .send("get share code", true, || self.client.get(&url).query(&query))
            .await?;
        Self::decode("get share code", response).await
    }

    async fn fetch_playlist(&self, id: EntityId) -> Result<PlaylistDto> {
        let url = self.endpoint(&format!("Playlist/{}", id));
        let response = self
            .send("fetch playlist", true, || self.client.get(&url))
            .await?;
        Self::decode("fetch playlist", response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalised() {
        let gateway = HttpGateway::new("http://localhost:61975");
        assert_eq!(gateway.base_url(), "http://localhost:61975/");
        assert_eq!(
            gateway.endpoint("/PlaylistItem/CreateMultiple"),
            "http://localhost:61975/PlaylistItem/CreateMultiple"
        );
    }

    #[test]
    fn test_update_routes() {
        let id = EntityId::new_v4();
        assert_eq!(
            update_route(EntityRef::playlist(id), "title"),
            UpdateRoute::PlaylistTitle
        );
        assert_eq!(
            update_route(EntityRef::playlist_item(id), "sequence"),
            UpdateRoute::Partial(format!("PlaylistItem/{}", id))
        );
        assert_eq!(
            update_route(EntityRef::playlist(id), "active"),
            UpdateRoute::Partial(format!("Playlist/{}", id))
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_persistence_error() {
        // Port 9 (discard) sur localhost : connexion refusée immédiatement
        let gateway = HttpGateway::new("http://127.0.0.1:9/")
            .with_timeout(Duration::from_millis(200))
            .with_max_retries(0);

        let result = gateway
            .update(EntityRef::playlist(EntityId::new_v4()), "title", "x".into())
            .await;
        assert!(matches!(result, Err(Error::Persistence(_))));
    }
}
