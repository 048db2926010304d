//! Identifiants d'entités et éléments de playlist

use crate::gateway::PlaylistItemDto;
use crate::video::Video;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Identifiant attribué par le serveur
///
/// Le GUID nul (`00000000-0000-0000-0000-000000000000`) n'est jamais un
/// identifiant valide : il signifie « pas encore d'identifiant ».
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Génère un identifiant aléatoire (v4)
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Convertit un UUID, `None` pour le GUID nul
    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        if uuid.is_nil() {
            None
        } else {
            Some(Self(uuid))
        }
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for EntityId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let uuid = Uuid::parse_str(s.trim())
            .map_err(|e| Error::MalformedRemoteData(format!("invalid identifier '{}': {}", s, e)))?;
        Self::from_uuid(uuid)
            .ok_or_else(|| Error::MalformedRemoteData("nil identifier".to_string()))
    }
}

/// (Dé)sérialisation serde d'un `Option<EntityId>` où le GUID nul vaut `None`
///
/// À utiliser avec `#[serde(default, with = "crate::item::nil_as_none")]`.
pub mod nil_as_none {
    use super::EntityId;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use uuid::Uuid;

    pub fn serialize<S>(value: &Option<EntityId>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(id) => id.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<EntityId>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => {
                let uuid = Uuid::parse_str(s).map_err(serde::de::Error::custom)?;
                Ok(EntityId::from_uuid(uuid))
            }
        }
    }
}

/// Un élément d'une playlist
///
/// L'identifiant reste `None` tant que le serveur n'a pas confirmé la
/// création (ou s'il a renvoyé le GUID nul).
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistItem {
    pub id: Option<EntityId>,
    pub playlist_id: Option<EntityId>,
    pub sequence: f64,
    pub title: String,
    pub video: Arc<Video>,
}

impl PlaylistItem {
    /// Crée un élément local, non identifié
    pub fn new(playlist_id: Option<EntityId>, video: Arc<Video>, sequence: f64) -> Self {
        Self {
            id: None,
            playlist_id,
            sequence,
            title: video.title.clone(),
            video,
        }
    }

    /// Durée du contenu en secondes
    pub fn duration(&self) -> u64 {
        self.video.duration
    }

    /// Représentation envoyée au serveur
    pub(crate) fn to_dto(&self, with_sequence: bool) -> PlaylistItemDto {
        PlaylistItemDto {
            id: self.id,
            playlist_id: self.playlist_id,
            sequence: with_sequence.then_some(self.sequence),
            title: self.title.clone(),
            video: (*self.video).clone(),
        }
    }
}

impl TryFrom<PlaylistItemDto> for PlaylistItem {
    type Error = Error;

    fn try_from(dto: PlaylistItemDto) -> Result<Self> {
        let sequence = dto.sequence.ok_or_else(|| {
            Error::MalformedRemoteData(format!("playlist item '{}' has no sequence", dto.title))
        })?;
        if !sequence.is_finite() {
            return Err(Error::MalformedRemoteData(format!(
                "playlist item '{}' has a non finite sequence",
                dto.title
            )));
        }

        Ok(Self {
            id: dto.id,
            playlist_id: dto.playlist_id,
            sequence,
            title: dto.title,
            video: Arc::new(dto.video),
        })
    }
}
