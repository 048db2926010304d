//! MemoryGateway : passerelle en mémoire

use super::{
    EntityKind, EntityRef, PersistenceGateway, PlaylistDto, PlaylistItemDto, ShareCode,
    ShareableEntityType,
};
use crate::item::EntityId;
use crate::sequence::SEQUENCE_STEP;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Appel reçu par la passerelle, pour inspection
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    Create { sequence: Option<f64> },
    BulkCreate { count: usize },
    Update { entity: EntityRef, field: String, value: serde_json::Value },
    Remove { entity: EntityRef },
    GetShareCode { entity_type: ShareableEntityType, entity_id: EntityId },
    FetchPlaylist { id: EntityId },
}

#[derive(Default)]
struct MemoryState {
    playlists: HashMap<EntityId, PlaylistDto>,
    items: HashMap<EntityId, PlaylistItemDto>,
    fields: HashMap<(EntityRef, String), serde_json::Value>,
    calls: Vec<GatewayCall>,
    failing: bool,
}

impl MemoryState {
    fn next_sequence(&self, playlist_id: Option<EntityId>) -> f64 {
        let last = self
            .items
            .values()
            .filter(|item| item.playlist_id == playlist_id)
            .filter_map(|item| item.sequence)
            .fold(0.0, f64::max);
        last + SEQUENCE_STEP
    }

    fn store(&mut self, mut item: PlaylistItemDto) -> PlaylistItemDto {
        let id = EntityId::new_v4();
        item.id = Some(id);
        if item.sequence.is_none() {
            item.sequence = Some(self.next_sequence(item.playlist_id));
        }
        self.items.insert(id, item.clone());
        item
    }
}

/// Passerelle en mémoire
///
/// Attribue des identifiants v4, ordonne les créations groupées à la suite
/// des éléments connus, enregistre chaque appel et peut simuler des pannes.
#[derive(Default)]
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fait échouer (ou réussir à nouveau) tous les appels suivants
    pub fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }

    /// Enregistre une playlist consultable par `fetch_playlist`
    pub fn insert_playlist(&self, playlist: PlaylistDto) -> Option<EntityId> {
        let id = playlist.id?;
        let mut state = self.state();
        for item in &playlist.items {
            if let Some(item_id) = item.id {
                state.items.insert(item_id, item.clone());
            }
        }
        state.playlists.insert(id, playlist);
        Some(id)
    }

    /// Historique des appels
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state().calls.clone()
    }

    /// Nombre d'appels reçus
    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    /// Dernière valeur écrite pour un champ
    pub fn field(&self, entity: EntityRef, field: &str) -> Option<serde_json::Value> {
        self.state().fields.get(&(entity, field.to_string())).cloned()
    }

    /// Élément stocké
    pub fn item(&self, id: EntityId) -> Option<PlaylistItemDto> {
        self.state().items.get(&id).cloned()
    }

    fn begin(&self, call: GatewayCall) -> Result<MutexGuard<'_, MemoryState>> {
        let mut state = self.state();
        state.calls.push(call);
        if state.failing {
            return Err(Error::Persistence("memory gateway is failing".to_string()));
        }
        Ok(state)
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn create(&self, item: PlaylistItemDto) -> Result<PlaylistItemDto> {
        let mut state = self.begin(GatewayCall::Create {
            sequence: item.sequence,
        })?;
        Ok(state.store(item))
    }

    async fn bulk_create(&self, items: Vec<PlaylistItemDto>) -> Result<Vec<PlaylistItemDto>> {
        let mut state = self.begin(GatewayCall::BulkCreate { count: items.len() })?;
        Ok(items.into_iter().map(|item| state.store(item)).collect())
    }

    async fn update(&self, entity: EntityRef, field: &str, value: serde_json::Value) -> Result<()> {
        let mut state = self.begin(GatewayCall::Update {
            entity,
            field: field.to_string(),
            value: value.clone(),
        })?;

        if entity.kind == EntityKind::PlaylistItem && field == "sequence" {
            if let Some(item) = state.items.get_mut(&entity.id) {
                item.sequence = value.as_f64();
            }
        }
        state.fields.insert((entity, field.to_string()), value);
        Ok(())
    }

    async fn remove(&self, entity: EntityRef) -> Result<()> {
        let mut state = self.begin(GatewayCall::Remove { entity })?;
        let removed = match entity.kind {
            EntityKind::PlaylistItem => state.items.remove(&entity.id).is_some(),
            EntityKind::Playlist => state.playlists.remove(&entity.id).is_some(),
        };
        if removed {
            Ok(())
        } else {
            Err(Error::NotFound(entity.to_string()))
        }
    }

    async fn get_share_code(
        &self,
        entity_type: ShareableEntityType,
        entity_id: EntityId,
    ) -> Result<ShareCode> {
        let state = self.begin(GatewayCall::GetShareCode {
            entity_type,
            entity_id,
        })?;

        let title = state
            .playlists
            .get(&entity_id)
            .map(|p| p.title.to_lowercase().replace(' ', "-"))
            .unwrap_or_default();

        Ok(ShareCode {
            id: Some(EntityId::new_v4()),
            entity_type,
            entity_id: Some(entity_id),
            short_id: entity_id.as_uuid().simple().to_string()[..8].to_string(),
            url_friendly_entity_title: title,
        })
    }

    async fn fetch_playlist(&self, id: EntityId) -> Result<PlaylistDto> {
        let state = self.begin(GatewayCall::FetchPlaylist { id })?;
        let mut playlist = state
            .playlists
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("playlist {}", id)))?;

        // Les éléments ajoutés depuis l'enregistrement font partie de la playlist
        playlist.items = state
            .items
            .values()
            .filter(|item| item.playlist_id == Some(id))
            .cloned()
            .collect();
        Ok(playlist)
    }
}
