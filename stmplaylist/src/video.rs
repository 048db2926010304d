//! Video : contenu partagé entre les éléments de playlist et les vues

use serde::{Deserialize, Serialize};

/// Contenu lisible référencé par un élément
///
/// Les éléments ne possèdent pas la vidéo : ils en détiennent une
/// référence partagée (`Arc<Video>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    /// Identifiant chez le fournisseur (ex : identifiant YouTube)
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    /// Durée en secondes
    pub duration: u64,
}

impl Video {
    pub fn new(id: impl Into<String>, title: impl Into<String>, duration: u64) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            author: String::new(),
            duration,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }
}
