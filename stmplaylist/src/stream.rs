//! File de lecture (stream) et pondération du mode aléatoire

use crate::video::Video;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static STREAM_ITEM_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Élément de la file de lecture
///
/// Purement local : jamais persisté.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamItem {
    pub id: String,
    pub video: Arc<Video>,
    pub title: String,
    pub selected: bool,
    /// Lu récemment : défavorisé par le tirage aléatoire
    pub played_recently: bool,
}

impl StreamItem {
    pub fn new(video: Arc<Video>) -> Self {
        let n = STREAM_ITEM_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("streamItem_{}", n),
            title: video.title.clone(),
            video,
            selected: false,
            played_recently: false,
        }
    }
}

/// File de lecture
#[derive(Debug, Default)]
pub struct Stream {
    items: Vec<StreamItem>,
}

impl Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[StreamItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Vrai si un contenu est disponible pour le lecteur
    pub fn has_content(&self) -> bool {
        !self.items.is_empty()
    }

    /// Ajoute une vidéo en fin de file, retourne l'identifiant de l'élément
    pub fn push(&mut self, video: Arc<Video>) -> String {
        let item = StreamItem::new(video);
        let id = item.id.clone();
        self.items.push(item);
        id
    }

    pub fn remove(&mut self, id: &str) -> Option<StreamItem> {
        let index = self.items.iter().position(|item| item.id == id)?;
        Some(self.items.remove(index))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn selected(&self) -> Option<&StreamItem> {
        self.items.iter().find(|item| item.selected)
    }

    /// Sélectionne un élément (et désélectionne les autres)
    ///
    /// L'élément sélectionné devient « lu récemment ». Quand tous les
    /// éléments le sont, les marques sont remises à zéro (sauf pour
    /// l'élément courant).
    pub fn select(&mut self, id: &str) -> Option<&StreamItem> {
        let index = self.items.iter().position(|item| item.id == id)?;

        for (i, item) in self.items.iter_mut().enumerate() {
            item.selected = i == index;
        }
        self.items[index].played_recently = true;

        if self.items.iter().all(|item| item.played_recently) {
            tracing::debug!(items = self.items.len(), "Every stream item played, resetting");
            for (i, item) in self.items.iter_mut().enumerate() {
                item.played_recently = i == index;
            }
        }

        self.items.get(index)
    }

    /// Tire l'élément suivant en privilégiant ceux qui n'ont pas été lus récemment
    pub fn random_next<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&StreamItem> {
        let fresh: Vec<&StreamItem> = self
            .items
            .iter()
            .filter(|item| !item.played_recently && !item.selected)
            .collect();

        if !fresh.is_empty() {
            return Some(fresh[rng.random_range(0..fresh.len())]);
        }

        let others: Vec<&StreamItem> = self.items.iter().filter(|item| !item.selected).collect();
        if others.is_empty() {
            return self.items.first();
        }
        Some(others[rng.random_range(0..others.len())])
    }
}
