//! Synchronisation différée des champs légers (titre, ...)
//!
//! Une rafale de modifications d'un même champ ne produit qu'une seule
//! écriture distante, portant la dernière valeur, une fois la période de
//! calme écoulée.

use crate::events::{Observers, PlaylistEvent, PlaylistEventKind};
use crate::gateway::{EntityRef, PersistenceGateway};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Période de calme par défaut avant l'écriture d'un champ
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(2000);

/// Réglages de synchronisation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub quiet_period: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            quiet_period: DEFAULT_QUIET_PERIOD,
        }
    }
}

type FieldKey = (EntityRef, String);

/// Écriture en attente (au plus une par couple entité/champ)
struct PendingWrite {
    value: serde_json::Value,
    generation: u64,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct PendingTable {
    writes: HashMap<FieldKey, PendingWrite>,
    generation: u64,
}

/// Coalesce les écritures de champs derrière une période de calme
///
/// Doit être utilisé depuis un runtime Tokio : chaque écriture programmée
/// arme un minuteur (`tokio::spawn`). Détruire l'instance annule toutes les
/// écritures encore en attente.
pub struct DebouncedFieldSync {
    gateway: Arc<dyn PersistenceGateway>,
    quiet_period: Duration,
    pending: Arc<Mutex<PendingTable>>,
    observers: Observers,
}

fn lock(pending: &Mutex<PendingTable>) -> MutexGuard<'_, PendingTable> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DebouncedFieldSync {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        settings: SyncSettings,
        observers: Observers,
    ) -> Self {
        Self {
            gateway,
            quiet_period: settings.quiet_period,
            pending: Arc::new(Mutex::new(PendingTable::default())),
            observers,
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// Programme l'écriture d'un champ
    ///
    /// Si une écriture est déjà en attente pour ce champ, sa valeur est
    /// remplacée et son minuteur relancé. Hors d'un runtime Tokio, rien
    /// n'est programmé : l'échec est notifié aux observateurs.
    pub fn schedule_write(&self, entity: EntityRef, field: &str, value: serde_json::Value) {
        let key: FieldKey = (entity, field.to_string());
        let mut table = lock(&self.pending);

        table.generation += 1;
        let generation = table.generation;

        if let Some(previous) = table.writes.remove(&key) {
            previous.timer.abort();
            tracing::trace!(%entity, field, "Restarting debounce timer");
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                drop(table);
                tracing::warn!(%entity, field, "No tokio runtime, field not saved: {}", e);
                self.observers.notify(PlaylistEvent {
                    entity: Some(entity),
                    kind: PlaylistEventKind::Failed {
                        operation: format!("update {}", field),
                        error: e.to_string(),
                    },
                });
                return;
            }
        };

        let timer = runtime.spawn(Self::fire(
            key.clone(),
            generation,
            self.quiet_period,
            self.pending.clone(),
            self.gateway.clone(),
            self.observers.clone(),
        ));

        table.writes.insert(
            key,
            PendingWrite {
                value,
                generation,
                timer,
            },
        );
    }

    async fn fire(
        key: FieldKey,
        generation: u64,
        quiet_period: Duration,
        pending: Arc<Mutex<PendingTable>>,
        gateway: Arc<dyn PersistenceGateway>,
        observers: Observers,
    ) {
        tokio::time::sleep(quiet_period).await;

        // L'écriture en attente est retirée quelle que soit l'issue
        let value = {
            let mut table = lock(&pending);
            match table.writes.get(&key) {
                Some(write) if write.generation == generation => {
                    table.writes.remove(&key).map(|write| write.value)
                }
                _ => None,
            }
        };
        let Some(value) = value else {
            return;
        };

        let (entity, field) = key;
        match gateway.update(entity, &field, value).await {
            Ok(()) => {
                tracing::debug!(%entity, field = %field, "Field synced");
                observers.notify(PlaylistEvent {
                    entity: Some(entity),
                    kind: PlaylistEventKind::Synced { field: Some(field) },
                });
            }
            Err(e) => {
                tracing::error!(%entity, field = %field, "Error saving field: {}", e);
                observers.notify(PlaylistEvent {
                    entity: Some(entity),
                    kind: PlaylistEventKind::Failed {
                        operation: format!("update {}", field),
                        error: e.to_string(),
                    },
                });
            }
        }
    }

    /// Annule les écritures en attente d'une entité (entité détruite)
    pub fn cancel_entity(&self, entity: EntityRef) -> usize {
        let mut table = lock(&self.pending);
        let keys: Vec<FieldKey> = table
            .writes
            .keys()
            .filter(|(e, _)| *e == entity)
            .cloned()
            .collect();

        for key in &keys {
            if let Some(write) = table.writes.remove(key) {
                write.timer.abort();
            }
        }
        if !keys.is_empty() {
            tracing::debug!(%entity, cancelled = keys.len(), "Cancelled pending writes");
        }
        keys.len()
    }

    /// Annule toutes les écritures en attente
    pub fn cancel_all(&self) {
        let mut table = lock(&self.pending);
        for (_, write) in table.writes.drain() {
            write.timer.abort();
        }
    }

    /// Nombre d'écritures en attente
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).writes.len()
    }

    /// Valeur en attente pour un champ
    pub fn pending_value(&self, entity: EntityRef, field: &str) -> Option<serde_json::Value> {
        lock(&self.pending)
            .writes
            .get(&(entity, field.to_string()))
            .map(|write| write.value.clone())
    }
}

impl Drop for DebouncedFieldSync {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
