//! Allocation des clés de séquence fractionnaires
//!
//! Chaque élément d'une collection porte une clé réelle. L'ordre de la
//! collection est celui des clés croissantes, ce qui permet d'insérer ou de
//! déplacer un élément en ne touchant qu'une seule clé : on prend le milieu
//! de ses deux voisins.

/// Pas entre deux clés consécutives lors d'un ajout en fin de collection
pub const SEQUENCE_STEP: f64 = 10_000.0;

/// Écart minimal toléré entre deux clés voisines avant renumérotation
pub const REBALANCE_THRESHOLD: f64 = SEQUENCE_STEP * 1e-9;

/// Calcule la clé nécessaire pour se trouver à `index` parmi `keys`
///
/// `keys` doit être trié par ordre croissant. Un `index` supérieur à la
/// longueur est traité comme un ajout en fin.
///
/// - collection vide : `SEQUENCE_STEP`
/// - en fin : dernière clé + `SEQUENCE_STEP`
/// - en tête : milieu entre 0 et la première clé
/// - sinon : milieu entre `keys[index - 1]` et `keys[index]`
pub fn sequence_for_index(keys: &[f64], index: usize) -> f64 {
    let Some(&last) = keys.last() else {
        return SEQUENCE_STEP;
    };

    if index >= keys.len() {
        return last + SEQUENCE_STEP;
    }

    let high = keys[index];
    let low = if index > 0 { keys[index - 1] } else { 0.0 };

    (low + high) / 2.0
}

/// Indique si les clés sont trop serrées pour garantir un milieu distinct
///
/// La borne basse implicite 0 (utilisée pour une insertion en tête) est
/// prise en compte comme voisine de la première clé.
pub fn needs_rebalance(keys: &[f64]) -> bool {
    let mut previous = 0.0;
    for &key in keys {
        if !key.is_finite() || key - previous < REBALANCE_THRESHOLD {
            return true;
        }
        previous = key;
    }
    false
}

/// Clés régulièrement espacées pour `len` éléments : `(i + 1) * SEQUENCE_STEP`
pub fn rebalanced_keys(len: usize) -> Vec<f64> {
    (1..=len).map(|i| i as f64 * SEQUENCE_STEP).collect()
}
