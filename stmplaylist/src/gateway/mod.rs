//! Passerelle de persistance vers le serveur distant
//!
//! Le serveur est vu comme un service CRUD opaque. Deux implémentations :
//! - [`HttpGateway`] : client HTTP/JSON vers l'API Streamus
//! - [`MemoryGateway`] : stockage en mémoire (tests, mode hors-ligne)

mod http;
mod memory;

pub use http::HttpGateway;
pub use memory::{GatewayCall, MemoryGateway};

use crate::item::{nil_as_none, EntityId};
use crate::video::Video;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type d'entité persistée
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Playlist,
    PlaylistItem,
}

impl EntityKind {
    /// Segment de route côté serveur
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Playlist => "Playlist",
            EntityKind::PlaylistItem => "PlaylistItem",
        }
    }
}

/// Référence typée vers une entité persistée
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: EntityId,
}

impl EntityRef {
    pub fn playlist(id: EntityId) -> Self {
        Self {
            kind: EntityKind::Playlist,
            id,
        }
    }

    pub fn playlist_item(id: EntityId) -> Self {
        Self {
            kind: EntityKind::PlaylistItem,
            id,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind.as_str(), self.id)
    }
}

/// Types d'entités pouvant être partagées par code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ShareableEntityType {
    PlaylistItem = 0,
    Playlist = 1,
    Folder = 2,
}

impl ShareableEntityType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl Serialize for ShareableEntityType {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for ShareableEntityType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match u8::deserialize(deserializer)? {
            0 => Ok(ShareableEntityType::PlaylistItem),
            1 => Ok(ShareableEntityType::Playlist),
            2 => Ok(ShareableEntityType::Folder),
            other => Err(serde::de::Error::custom(format!(
                "unknown shareable entity type {}",
                other
            ))),
        }
    }
}

/// Code de partage d'une entité
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareCode {
    #[serde(default, with = "nil_as_none")]
    pub id: Option<EntityId>,
    pub entity_type: ShareableEntityType,
    #[serde(default, with = "nil_as_none")]
    pub entity_id: Option<EntityId>,
    pub short_id: String,
    #[serde(default)]
    pub url_friendly_entity_title: String,
}

impl ShareCode {
    /// Lien public : `{base}share/{shortId}/{urlFriendlyEntityTitle}`
    pub fn url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        if self.url_friendly_entity_title.is_empty() {
            format!("{}/share/{}", base, self.short_id)
        } else {
            format!(
                "{}/share/{}/{}",
                base, self.short_id, self.url_friendly_entity_title
            )
        }
    }
}

/// Élément de playlist tel qu'échangé avec le serveur
///
/// `sequence` est absent lors d'une création groupée : le serveur attribue
/// alors l'ordre par défaut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItemDto {
    #[serde(default, with = "nil_as_none")]
    pub id: Option<EntityId>,
    #[serde(default, with = "nil_as_none")]
    pub playlist_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<f64>,
    #[serde(default)]
    pub title: String,
    pub video: Video,
}

fn default_playlist_sequence() -> f64 {
    -1.0
}

fn default_playlist_title() -> String {
    crate::playlist::DEFAULT_PLAYLIST_TITLE.to_string()
}

/// Playlist telle qu'échangée avec le serveur
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistDto {
    #[serde(default, with = "nil_as_none")]
    pub id: Option<EntityId>,
    #[serde(default, with = "nil_as_none")]
    pub folder_id: Option<EntityId>,
    #[serde(default = "default_playlist_title")]
    pub title: String,
    #[serde(default)]
    pub items: Vec<PlaylistItemDto>,
    #[serde(default)]
    pub active: bool,
    #[serde(default = "default_playlist_sequence")]
    pub sequence: f64,
}

/// Service de persistance distant
///
/// Toutes les opérations peuvent échouer ; les appelants ne considèrent
/// jamais ces échecs comme fatals pour l'état en mémoire.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Crée un élément, retourne la version du serveur (avec identifiant)
    async fn create(&self, item: PlaylistItemDto) -> Result<PlaylistItemDto>;

    /// Crée plusieurs éléments en un seul appel
    async fn bulk_create(&self, items: Vec<PlaylistItemDto>) -> Result<Vec<PlaylistItemDto>>;

    /// Met à jour un champ d'une entité
    async fn update(&self, entity: EntityRef, field: &str, value: serde_json::Value) -> Result<()>;

    /// Supprime une entité
    async fn remove(&self, entity: EntityRef) -> Result<()>;

    /// Récupère (ou crée) le code de partage d'une entité
    async fn get_share_code(
        &self,
        entity_type: ShareableEntityType,
        entity_id: EntityId,
    ) -> Result<ShareCode>;

    /// Charge une playlist complète
    async fn fetch_playlist(&self, id: EntityId) -> Result<PlaylistDto>;
}
