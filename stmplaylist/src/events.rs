//! Évènements émis par les playlists et la synchronisation différée

use crate::gateway::EntityRef;
use crate::items::{ItemsChange, ItemsSummary};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Évènement émis par une playlist ou sa synchronisation
#[derive(Debug, Clone)]
pub struct PlaylistEvent {
    /// Entité concernée, si elle a déjà un identifiant
    pub entity: Option<EntityRef>,
    pub kind: PlaylistEventKind,
}

/// Variantes d'évènements playlist.
#[derive(Debug, Clone)]
pub enum PlaylistEventKind {
    /// La collection a changé ; résumé et texte recalculés.
    ItemsChanged {
        change: ItemsChange,
        summary: ItemsSummary,
        display_info: String,
    },
    /// Le serveur a confirmé une écriture (champ précis ou création/suppression).
    Synced { field: Option<String> },
    /// Une opération distante a échoué ; l'état local est conservé.
    Failed { operation: String, error: String },
}

type Callback = Arc<dyn Fn(&PlaylistEvent) + Send + Sync>;

struct ObserversInner {
    callbacks: RwLock<HashMap<u64, Callback>>,
    cb_counter: AtomicU64,
    event_tx: broadcast::Sender<PlaylistEvent>,
}

/// Registre d'observateurs partagé
///
/// Les callbacks sont appelés de façon synchrone, dans l'ordre de
/// l'opération qui émet l'évènement. Les abonnés `broadcast` reçoivent
/// la même séquence de façon asynchrone.
#[derive(Clone)]
pub struct Observers {
    inner: Arc<ObserversInner>,
}

impl Default for Observers {
    fn default() -> Self {
        Self::new()
    }
}

impl Observers {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ObserversInner {
                callbacks: RwLock::new(HashMap::new()),
                cb_counter: AtomicU64::new(1),
                event_tx: broadcast::channel(256).0,
            }),
        }
    }

    /// Enregistre un callback d'évènement.
    ///
    /// Retourne un jeton (u64) pour désenregistrer plus tard.
    pub fn register_callback<F>(&self, cb: F) -> u64
    where
        F: Fn(&PlaylistEvent) + Send + Sync + 'static,
    {
        let token = self.inner.cb_counter.fetch_add(1, Ordering::Relaxed);
        self.inner
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token, Arc::new(cb));
        token
    }

    /// Désenregistre un callback via son jeton.
    pub fn unregister_callback(&self, token: u64) {
        self.inner
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&token);
    }

    /// Souscrit au flux d'évènements.
    pub fn subscribe(&self) -> broadcast::Receiver<PlaylistEvent> {
        self.inner.event_tx.subscribe()
    }

    pub(crate) fn notify(&self, event: PlaylistEvent) {
        // Copie des callbacks : un callback peut (dés)enregistrer sans interblocage
        let callbacks: Vec<Callback> = self
            .inner
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        for cb in callbacks {
            cb(&event);
        }

        // Diffusion via canal interne (ignoré si aucun abonné)
        let _ = self.inner.event_tx.send(event);
    }
}
