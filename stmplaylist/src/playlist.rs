//! Playlist : collection ordonnée + synchronisation avec le serveur
//!
//! Politique générale :
//! - les ajouts sont confirmés avant d'entrer dans la collection
//!   (rien n'est inséré localement si le serveur refuse) ;
//! - les déplacements sont appliqués localement puis enregistrés
//!   immédiatement ;
//! - le titre est enregistré après une période de calme
//!   ([`DebouncedFieldSync`]).
//!
//! Tout échec distant est journalisé, notifié aux observateurs
//! ([`PlaylistEventKind::Failed`]) puis retourné à l'appelant. Aucun n'est
//! rejoué automatiquement.

use crate::display::{format_display_info, DisplayLabels};
use crate::events::{Observers, PlaylistEvent, PlaylistEventKind};
use crate::gateway::{
    EntityRef, PersistenceGateway, PlaylistDto, PlaylistItemDto, ShareCode, ShareableEntityType,
};
use crate::item::{EntityId, PlaylistItem};
use crate::items::{ItemsSummary, PlaylistItems};
use crate::sync::{DebouncedFieldSync, SyncSettings};
use crate::video::Video;
use crate::{Error, Result};
use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Titre d'une playlist qui n'en a pas encore
pub const DEFAULT_PLAYLIST_TITLE: &str = "New Playlist";

/// Une playlist et ses éléments
///
/// Un seul propriétaire par instance : toutes les mutations passent par
/// `&mut self`, ce qui garantit qu'une clé de séquence n'est jamais
/// calculée sur une liste de clés périmée.
pub struct Playlist {
    id: Option<EntityId>,
    folder_id: Option<EntityId>,
    title: String,
    active: bool,
    sequence: f64,
    items: PlaylistItems,
    items_token: Option<u64>,
    labels: DisplayLabels,
    gateway: Arc<dyn PersistenceGateway>,
    sync: DebouncedFieldSync,
    observers: Observers,
}

impl std::fmt::Debug for Playlist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Playlist")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("items", &self.items.len())
            .finish()
    }
}

impl Playlist {
    /// Crée une playlist vide, pas encore connue du serveur
    pub fn new(gateway: Arc<dyn PersistenceGateway>, settings: SyncSettings) -> Self {
        let observers = Observers::new();
        let sync = DebouncedFieldSync::new(gateway.clone(), settings, observers.clone());
        let mut playlist = Self {
            id: None,
            folder_id: None,
            title: DEFAULT_PLAYLIST_TITLE.to_string(),
            active: false,
            sequence: -1.0,
            items: PlaylistItems::new(),
            items_token: None,
            labels: DisplayLabels::default(),
            gateway,
            sync,
            observers,
        };
        playlist.attach_items_callback();
        playlist
    }

    /// Construit une playlist à partir de la représentation du serveur
    pub fn from_dto(
        dto: PlaylistDto,
        gateway: Arc<dyn PersistenceGateway>,
        settings: SyncSettings,
    ) -> Result<Self> {
        let items = dto
            .items
            .into_iter()
            .map(PlaylistItem::try_from)
            .collect::<Result<Vec<_>>>()?;

        let mut playlist = Self::new(gateway, settings);
        playlist.id = dto.id;
        playlist.folder_id = dto.folder_id;
        playlist.title = dto.title;
        playlist.active = dto.active;
        playlist.sequence = dto.sequence;
        playlist.items = PlaylistItems::from_items(items);
        playlist.attach_items_callback();

        tracing::debug!(
            playlist_id = ?playlist.id,
            items = playlist.items.len(),
            "Playlist loaded: {}",
            playlist.display_info()
        );
        Ok(playlist)
    }

    /// Charge une playlist depuis le serveur
    pub async fn fetch(
        id: EntityId,
        gateway: Arc<dyn PersistenceGateway>,
        settings: SyncSettings,
    ) -> Result<Self> {
        let dto = gateway.fetch_playlist(id).await.inspect_err(|e| {
            tracing::error!(playlist_id = %id, "Error fetching playlist: {}", e);
        })?;
        Self::from_dto(dto, gateway, settings)
    }

    /// Recharge les éléments depuis le serveur
    pub async fn refresh(&mut self) -> Result<()> {
        let id = self.require_id("refresh")?;
        let dto = match self.gateway.fetch_playlist(id).await {
            Ok(dto) => dto,
            Err(e) => return Err(self.report_failure("fetch playlist", e)),
        };

        let items = dto
            .items
            .into_iter()
            .map(PlaylistItem::try_from)
            .collect::<Result<Vec<_>>>()?;
        self.items.reset(items);
        Ok(())
    }

    // ========================================================================
    // Accesseurs
    // ========================================================================

    pub fn id(&self) -> Option<EntityId> {
        self.id
    }

    pub fn folder_id(&self) -> Option<EntityId> {
        self.folder_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn sequence(&self) -> f64 {
        self.sequence
    }

    pub fn items(&self) -> &PlaylistItems {
        &self.items
    }

    pub fn item_by_id(&self, id: EntityId) -> Option<&PlaylistItem> {
        self.items.get(id)
    }

    /// Nombre d'éléments et durée totale
    pub fn summary(&self) -> ItemsSummary {
        self.items.summary()
    }

    /// Texte de résumé, toujours dérivé du contenu courant
    pub fn display_info(&self) -> String {
        format_display_info(&self.items.summary(), &self.labels)
    }

    /// Remplace les libellés du texte de résumé
    pub fn set_labels(&mut self, labels: DisplayLabels) {
        self.labels = labels;
        self.attach_items_callback();
    }

    pub fn observers(&self) -> &Observers {
        &self.observers
    }

    /// Souscrit aux évènements de la playlist
    pub fn subscribe(&self) -> broadcast::Receiver<PlaylistEvent> {
        self.observers.subscribe()
    }

    /// Synchronisation différée utilisée par la playlist
    pub fn field_sync(&self) -> &DebouncedFieldSync {
        &self.sync
    }

    // ========================================================================
    // Éléments
    // ========================================================================

    /// Ajoute une vidéo à une position donnée
    ///
    /// La clé est calculée avant l'appel au serveur ; l'élément n'entre dans
    /// la collection qu'une fois la création confirmée. Des clés voisines
    /// trop serrées sont renumérotées (et enregistrées) avant le calcul.
    pub async fn add_item_at_index(
        &mut self,
        video: Arc<Video>,
        index: usize,
    ) -> Result<PlaylistItem> {
        let index = index.min(self.items.len());
        self.rebalance_and_persist(None).await;
        let key = self.items.sequence_for_index(index);
        let draft = PlaylistItem::new(self.id, video, key);

        let created = match self.gateway.create(draft.to_dto(true)).await {
            Ok(dto) => dto,
            Err(e) => return Err(self.report_failure("create playlist item", e)),
        };

        let mut item = match self.confirmed(created, Some(key)) {
            Ok(item) => item,
            Err(e) => return Err(self.report_failure("create playlist item", e)),
        };
        // Le contenu reste celui que l'on a envoyé (partagé avec l'appelant)
        item.video = draft.video;

        tracing::debug!(
            playlist_id = ?self.id,
            item_id = ?item.id,
            sequence = item.sequence,
            "Playlist item added at index {}",
            index
        );
        self.items.add(item.clone());
        self.rebalance_and_persist(None).await;

        Ok(self.refreshed(item))
    }

    /// Ajoute une vidéo en fin de playlist
    pub async fn add_item(&mut self, video: Arc<Video>) -> Result<PlaylistItem> {
        let end = self.items.len();
        self.add_item_at_index(video, end).await
    }

    /// Ajoute plusieurs vidéos en un seul appel
    ///
    /// Une seule vidéo emprunte le chemin d'ajout unitaire. Sinon les
    /// éléments partent sans clé : le serveur attribue l'ordre par défaut.
    pub async fn add_items(&mut self, mut videos: Vec<Arc<Video>>) -> Result<Vec<PlaylistItem>> {
        if videos.len() <= 1 {
            return match videos.pop() {
                Some(video) => self.add_item(video).await.map(|item| vec![item]),
                None => Ok(Vec::new()),
            };
        }

        let requested = videos.len();
        let drafts: Vec<PlaylistItemDto> = videos
            .iter()
            .map(|video| PlaylistItem::new(self.id, video.clone(), 0.0).to_dto(false))
            .collect();

        let created = match self.gateway.bulk_create(drafts).await {
            Ok(created) => created,
            Err(e) => return Err(self.report_failure("create playlist items", e)),
        };

        if created.len() != requested {
            let e = Error::MalformedRemoteData(format!(
                "bulk create returned {} items for {} requested",
                created.len(),
                requested
            ));
            return Err(self.report_failure("create playlist items", e));
        }

        let items = match created
            .into_iter()
            .map(|dto| self.confirmed(dto, None))
            .collect::<Result<Vec<_>>>()
        {
            Ok(items) => items,
            Err(e) => return Err(self.report_failure("create playlist items", e)),
        };

        tracing::debug!(playlist_id = ?self.id, count = items.len(), "Playlist items added");
        self.items.add_multiple(items.clone());
        self.rebalance_and_persist(None).await;

        Ok(items.into_iter().map(|item| self.refreshed(item)).collect())
    }

    /// Déplace un élément pour qu'il se retrouve à `index`
    ///
    /// Le déplacement est appliqué localement puis la nouvelle clé est
    /// enregistrée immédiatement. Un échec d'enregistrement ne défait pas
    /// le déplacement local.
    pub async fn move_item_to_index(&mut self, id: EntityId, index: usize) -> Result<f64> {
        let index = index.min(self.items.len().saturating_sub(1));
        if self.items.get(id).is_none() {
            return Err(Error::NotFound(format!("playlist item {}", id)));
        }

        // La clé de l'élément déplacé est de toute façon réécrite plus bas
        self.rebalance_and_persist(Some(id)).await;
        self.items.move_to(id, index)?;
        self.rebalance_and_persist(Some(id)).await;

        let key = self
            .items
            .get(id)
            .map(|item| item.sequence)
            .ok_or_else(|| Error::NotFound(format!("playlist item {}", id)))?;

        match self
            .gateway
            .update(EntityRef::playlist_item(id), "sequence", json!(key))
            .await
        {
            Ok(()) => {
                tracing::debug!(item_id = %id, sequence = key, "Playlist item moved");
                self.notify(PlaylistEventKind::Synced {
                    field: Some("sequence".to_string()),
                });
                Ok(key)
            }
            Err(e) => Err(self.report_failure("save playlist item sequence", e)),
        }
    }

    /// Supprime un élément (après accord du serveur)
    pub async fn remove_item(&mut self, id: EntityId) -> Result<PlaylistItem> {
        if self.items.get(id).is_none() {
            return Err(Error::NotFound(format!("playlist item {}", id)));
        }

        if let Err(e) = self.gateway.remove(EntityRef::playlist_item(id)).await {
            return Err(self.report_failure("remove playlist item", e));
        }

        let removed = self.items.remove(id)?;
        tracing::debug!(item_id = %id, "Playlist item removed");
        self.notify(PlaylistEventKind::Synced { field: None });
        Ok(removed)
    }

    // ========================================================================
    // Champs de la playlist
    // ========================================================================

    /// Change le titre ; l'enregistrement est différé
    pub fn set_title(&mut self, title: impl Into<String>) {
        let title = title.into();
        if title == self.title {
            return;
        }
        self.title = title;

        match self.id {
            Some(id) => {
                self.sync
                    .schedule_write(EntityRef::playlist(id), "title", json!(self.title));
            }
            None => {
                tracing::debug!("Title of unsaved playlist changed, nothing to sync");
            }
        }
    }

    /// Récupère le code de partage de la playlist
    pub async fn share_code(&self) -> Result<ShareCode> {
        let id = self.require_id("share")?;
        match self
            .gateway
            .get_share_code(ShareableEntityType::Playlist, id)
            .await
        {
            Ok(code) => {
                self.notify(PlaylistEventKind::Synced { field: None });
                Ok(code)
            }
            Err(e) => Err(self.report_failure("get share code", e)),
        }
    }

    /// Détache la playlist : les écritures en attente sont abandonnées
    pub fn destroy(&mut self) {
        match self.id {
            Some(id) => {
                self.sync.cancel_entity(EntityRef::playlist(id));
            }
            None => self.sync.cancel_all(),
        }
        if let Some(token) = self.items_token.take() {
            self.items.unregister_callback(token);
        }
        tracing::debug!(playlist_id = ?self.id, "Playlist destroyed");
    }

    // ========================================================================
    // Interne
    // ========================================================================

    fn attach_items_callback(&mut self) {
        if let Some(token) = self.items_token.take() {
            self.items.unregister_callback(token);
        }

        let observers = self.observers.clone();
        let labels = self.labels.clone();
        let entity = self.id.map(EntityRef::playlist);
        let token = self.items.register_callback(move |change, summary| {
            observers.notify(PlaylistEvent {
                entity,
                kind: PlaylistEventKind::ItemsChanged {
                    change: change.clone(),
                    summary: *summary,
                    display_info: format_display_info(summary, &labels),
                },
            });
        });
        self.items_token = Some(token);
    }

    /// Élément confirmé par le serveur
    fn confirmed(
        &self,
        mut dto: PlaylistItemDto,
        fallback_key: Option<f64>,
    ) -> Result<PlaylistItem> {
        if dto.sequence.is_none() {
            dto.sequence = fallback_key;
        }
        if dto.playlist_id.is_none() {
            dto.playlist_id = self.id;
        }
        PlaylistItem::try_from(dto)
    }

    /// Version courante d'un élément (sa clé a pu être renumérotée)
    fn refreshed(&self, item: PlaylistItem) -> PlaylistItem {
        item.id
            .and_then(|id| self.items.get(id).cloned())
            .unwrap_or(item)
    }

    /// Renumérote si nécessaire et enregistre les clés modifiées
    ///
    /// `skip` est enregistré par l'appelant lui-même.
    async fn rebalance_and_persist(&mut self, skip: Option<EntityId>) {
        let changed: Vec<(EntityId, f64)> = self
            .items
            .rebalance_if_needed()
            .into_iter()
            .filter(|(id, _)| Some(*id) != skip)
            .collect();
        if changed.is_empty() {
            return;
        }

        let gateway = self.gateway.clone();
        let results = join_all(changed.iter().map(|(id, key)| {
            gateway.update(EntityRef::playlist_item(*id), "sequence", json!(key))
        }))
        .await;

        for ((id, _), result) in changed.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!(item_id = %id, "Rebalanced sequence not saved");
                self.report_failure("save rebalanced sequence", e);
            }
        }
    }

    fn require_id(&self, operation: &str) -> Result<EntityId> {
        self.id.ok_or_else(|| {
            Error::NotFound(format!("cannot {} a playlist without identifier", operation))
        })
    }

    fn notify(&self, kind: PlaylistEventKind) {
        self.observers.notify(PlaylistEvent {
            entity: self.id.map(EntityRef::playlist),
            kind,
        });
    }

    /// Journalise et notifie un échec distant, puis le rend à l'appelant
    fn report_failure(&self, operation: &str, error: Error) -> Error {
        tracing::error!(playlist_id = ?self.id, "Error during {}: {}", operation, error);
        self.notify(PlaylistEventKind::Failed {
            operation: operation.to_string(),
            error: error.to_string(),
        });
        error
    }
}
