//! PlaylistItems : collection ordonnée par clé de séquence

use crate::item::{EntityId, PlaylistItem};
use crate::sequence;
use crate::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Résumé dérivé d'une collection (jamais stocké comme source de vérité)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ItemsSummary {
    pub count: usize,
    pub total_duration_secs: u64,
}

/// Calcule le résumé d'une liste d'éléments (fonction pure)
pub fn summary_of(items: &[PlaylistItem]) -> ItemsSummary {
    ItemsSummary {
        count: items.len(),
        total_duration_secs: items.iter().map(PlaylistItem::duration).sum(),
    }
}

/// Nature d'un changement de la collection
#[derive(Debug, Clone, PartialEq)]
pub enum ItemsChange {
    /// Un élément ajouté
    Added,
    /// Plusieurs éléments ajoutés en une fois
    AddedMultiple(usize),
    /// Un élément retiré
    Removed(EntityId),
    /// Contenu entièrement remplacé
    Reset,
    /// Un élément a changé de position
    Moved(EntityId),
    /// Toutes les clés ont été renumérotées
    Rebalanced,
}

type ItemsCallback = Arc<dyn Fn(&ItemsChange, &ItemsSummary) + Send + Sync>;

/// Collection d'éléments triée par clé de séquence croissante
///
/// L'ordre ne dépend jamais de l'ordre d'insertion : après chaque mutation
/// la collection est re-triée (tri stable, les égalités gardent l'ordre
/// courant). Chaque changement d'appartenance notifie de façon synchrone
/// les callbacks enregistrés avec le nouveau résumé.
#[derive(Default)]
pub struct PlaylistItems {
    items: Vec<PlaylistItem>,
    callbacks: HashMap<u64, ItemsCallback>,
    cb_counter: u64,
}

impl std::fmt::Debug for PlaylistItems {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaylistItems")
            .field("items", &self.items)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl PlaylistItems {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construit une collection à partir d'éléments déjà munis de clés
    pub fn from_items(items: Vec<PlaylistItem>) -> Self {
        let mut collection = Self {
            items,
            ..Self::default()
        };
        collection.sort();
        collection
    }

    /// Enregistre un callback de changement, retourne un jeton
    pub fn register_callback<F>(&mut self, cb: F) -> u64
    where
        F: Fn(&ItemsChange, &ItemsSummary) + Send + Sync + 'static,
    {
        self.cb_counter += 1;
        self.callbacks.insert(self.cb_counter, Arc::new(cb));
        self.cb_counter
    }

    /// Désenregistre un callback via son jeton
    pub fn unregister_callback(&mut self, token: u64) {
        self.callbacks.remove(&token);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlaylistItem> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[PlaylistItem] {
        &self.items
    }

    /// Élément à une position donnée
    pub fn at(&self, index: usize) -> Option<&PlaylistItem> {
        self.items.get(index)
    }

    /// Élément par identifiant
    pub fn get(&self, id: EntityId) -> Option<&PlaylistItem> {
        self.items.iter().find(|item| item.id == Some(id))
    }

    /// Position d'un élément par identifiant
    pub fn position(&self, id: EntityId) -> Option<usize> {
        self.items.iter().position(|item| item.id == Some(id))
    }

    /// Clés courantes, dans l'ordre
    pub fn keys(&self) -> Vec<f64> {
        self.items.iter().map(|item| item.sequence).collect()
    }

    /// Clé qu'aurait un élément inséré à `index`
    pub fn sequence_for_index(&self, index: usize) -> f64 {
        sequence::sequence_for_index(&self.keys(), index)
    }

    /// Résumé courant
    pub fn summary(&self) -> ItemsSummary {
        summary_of(&self.items)
    }

    /// Insère un élément à la position demandée en lui attribuant sa clé
    ///
    /// Des clés trop serrées (ou égales) sont d'abord renumérotées, sinon le
    /// milieu calculé ne tomberait pas entre ses voisins. Ces clés ne sont
    /// pas retournées : `Playlist` renumérote et persiste avant d'insérer.
    pub fn insert_at(&mut self, mut item: PlaylistItem, index: usize) -> f64 {
        self.respace();
        item.sequence = self.sequence_for_index(index);
        let key = item.sequence;
        self.items.push(item);
        self.sort();
        self.notify(ItemsChange::Added);
        key
    }

    /// Ajoute un élément en conservant la clé qu'il porte déjà
    pub fn add(&mut self, item: PlaylistItem) {
        self.items.push(item);
        self.sort();
        self.notify(ItemsChange::Added);
    }

    /// Ajoute plusieurs éléments, une seule notification
    pub fn add_multiple(&mut self, items: Vec<PlaylistItem>) {
        let count = items.len();
        if count == 0 {
            return;
        }
        self.items.extend(items);
        self.sort();
        self.notify(ItemsChange::AddedMultiple(count));
    }

    /// Déplace un élément pour qu'il se retrouve à `index`
    ///
    /// Les voisins sont calculés sur la collection privée de l'élément
    /// déplacé : `index` est donc sa position finale. Retourne la nouvelle clé.
    pub fn move_to(&mut self, id: EntityId, index: usize) -> Result<f64> {
        let position = self
            .position(id)
            .ok_or_else(|| Error::NotFound(format!("playlist item {}", id)))?;

        let mut item = self.items.remove(position);
        self.respace();
        item.sequence = self.sequence_for_index(index);
        let key = item.sequence;

        self.items.push(item);
        self.sort();
        self.notify(ItemsChange::Moved(id));
        Ok(key)
    }

    /// Retire un élément par identifiant
    pub fn remove(&mut self, id: EntityId) -> Result<PlaylistItem> {
        let position = self
            .position(id)
            .ok_or_else(|| Error::NotFound(format!("playlist item {}", id)))?;

        let removed = self.items.remove(position);
        self.notify(ItemsChange::Removed(id));
        Ok(removed)
    }

    /// Remplace tout le contenu
    pub fn reset(&mut self, items: Vec<PlaylistItem>) {
        self.items = items;
        self.sort();
        self.notify(ItemsChange::Reset);
    }

    /// Renumérote toutes les clés si deux voisines sont devenues trop proches
    ///
    /// Retourne les éléments identifiés dont la clé a changé, à persister.
    pub fn rebalance_if_needed(&mut self) -> Vec<(EntityId, f64)> {
        if !sequence::needs_rebalance(&self.keys()) {
            return Vec::new();
        }

        let changed = self.respace();
        self.notify(ItemsChange::Rebalanced);
        changed
    }

    /// Renumérotation sans notification
    fn respace(&mut self) -> Vec<(EntityId, f64)> {
        if !sequence::needs_rebalance(&self.keys()) {
            return Vec::new();
        }

        let fresh = sequence::rebalanced_keys(self.items.len());
        let mut changed = Vec::new();
        for (item, key) in self.items.iter_mut().zip(fresh) {
            if item.sequence != key {
                item.sequence = key;
                if let Some(id) = item.id {
                    changed.push((id, key));
                }
            }
        }

        tracing::debug!(
            items = self.items.len(),
            changed = changed.len(),
            "Rebalanced sequence keys"
        );
        changed
    }

    fn sort(&mut self) {
        self.items
            .sort_by(|a, b| a.sequence.total_cmp(&b.sequence));
    }

    fn notify(&self, change: ItemsChange) {
        if self.callbacks.is_empty() {
            return;
        }
        let summary = self.summary();
        for cb in self.callbacks.values() {
            cb(&change, &summary);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::SEQUENCE_STEP;
    use crate::video::Video;
    use std::sync::Mutex;

    fn item(title: &str, duration: u64) -> PlaylistItem {
        let mut item = PlaylistItem::new(None, Arc::new(Video::new(title, title, duration)), 0.0);
        item.id = Some(EntityId::new_v4());
        item
    }

    fn titles(items: &PlaylistItems) -> Vec<String> {
        items.iter().map(|i| i.title.clone()).collect()
    }

    #[test]
    fn test_insert_at_orders_by_key() {
        let mut items = PlaylistItems::new();
        assert_eq!(items.insert_at(item("a", 60), 0), 10_000.0);
        assert_eq!(items.insert_at(item("b", 60), 0), 5_000.0);
        assert_eq!(items.insert_at(item("c", 60), 2), 20_000.0);
        assert_eq!(items.insert_at(item("d", 60), 1), 7_500.0);

        assert_eq!(titles(&items), ["b", "d", "a", "c"]);
    }

    #[test]
    fn test_move_to_uses_final_position() {
        let mut items = PlaylistItems::new();
        for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
            items.insert_at(item(name, 10), i);
        }
        let a = items.at(0).unwrap().id.unwrap();

        // a : [b, c, d] puis index 2 → entre c et d
        let key = items.move_to(a, 2).unwrap();
        assert_eq!(key, 35_000.0);
        assert_eq!(titles(&items), ["b", "c", "a", "d"]);

        let d = items.at(3).unwrap().id.unwrap();
        items.move_to(d, 0).unwrap();
        assert_eq!(titles(&items), ["d", "b", "c", "a"]);
    }

    #[test]
    fn test_move_unknown_is_not_found() {
        let mut items = PlaylistItems::new();
        assert!(matches!(
            items.move_to(EntityId::new_v4(), 0),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            items.remove(EntityId::new_v4()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_summary_is_restored_after_add_then_remove() {
        let mut items = PlaylistItems::new();
        items.insert_at(item("a", 120), 0);
        items.insert_at(item("b", 30), 1);
        let before = items.summary();
        assert_eq!(before, items.summary());

        let extra = item("c", 999);
        let extra_id = extra.id.unwrap();
        items.insert_at(extra, 1);
        assert_eq!(items.summary().count, 3);

        items.remove(extra_id).unwrap();
        assert_eq!(items.summary(), before);
        assert_eq!(
            before,
            ItemsSummary {
                count: 2,
                total_duration_secs: 150
            }
        );
    }

    #[test]
    fn test_callbacks_receive_fresh_summary() {
        let seen: Arc<Mutex<Vec<(ItemsChange, ItemsSummary)>>> = Arc::default();
        let mut items = PlaylistItems::new();
        let sink = seen.clone();
        let token = items.register_callback(move |change, summary| {
            sink.lock().unwrap().push((change.clone(), *summary));
        });

        items.add_multiple(vec![item("a", 10), item("b", 20)]);
        items.reset(vec![]);
        items.unregister_callback(token);
        items.add(item("c", 5));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, ItemsChange::AddedMultiple(2));
        assert_eq!(seen[0].1.total_duration_secs, 30);
        assert_eq!(seen[1].0, ItemsChange::Reset);
        assert_eq!(seen[1].1.count, 0);
    }

    #[test]
    fn test_equal_keys_keep_stable_order() {
        let mut first = item("first", 1);
        first.sequence = 10_000.0;
        let mut second = item("second", 1);
        second.sequence = 10_000.0;

        let items = PlaylistItems::from_items(vec![first, second]);
        assert_eq!(titles(&items), ["first", "second"]);
    }

    fn with_key(title: &str, key: f64) -> PlaylistItem {
        let mut item = item(title, 1);
        item.sequence = key;
        item
    }

    #[test]
    fn test_insert_between_equal_keys() {
        let mut items =
            PlaylistItems::from_items(vec![with_key("a", 10_000.0), with_key("b", 10_000.0)]);

        let key = items.insert_at(item("x", 1), 1);

        assert_eq!(key, 15_000.0);
        assert_eq!(titles(&items), ["a", "x", "b"]);
    }

    #[test]
    fn test_move_between_equal_keys() {
        let mut items = PlaylistItems::from_items(vec![
            with_key("a", 10_000.0),
            with_key("b", 10_000.0),
            with_key("c", 10_000.0),
        ]);
        let c = items.at(2).unwrap().id.unwrap();

        items.move_to(c, 1).unwrap();
        assert_eq!(titles(&items), ["a", "c", "b"]);
    }

    #[test]
    fn test_rebalance_rewrites_crowded_keys() {
        let mut items = PlaylistItems::new();
        items.insert_at(item("tail", 1), 0);
        // Préfixes successifs, sans la renumérotation faite par insert_at
        let mut key = SEQUENCE_STEP;
        let mut heads = Vec::new();
        for _ in 0..40 {
            key /= 2.0;
            heads.push(with_key("head", key));
        }
        items.add_multiple(heads);
        assert!(sequence::needs_rebalance(&items.keys()));

        let changed = items.rebalance_if_needed();
        assert_eq!(changed.len(), 41);
        assert_eq!(items.keys(), sequence::rebalanced_keys(41));
        assert_eq!(items.at(40).unwrap().title, "tail");

        // Une seconde passe n'a plus rien à faire
        assert!(items.rebalance_if_needed().is_empty());
    }
}
