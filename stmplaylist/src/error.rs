//! Types d'erreurs pour stmplaylist

/// Erreurs de gestion de playlist
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Opération sur un identifiant absent de la collection
    #[error("Not found: {0}")]
    NotFound(String),

    /// Échec réseau ou refus du serveur
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Réponse du serveur inattendue
    #[error("Malformed remote data: {0}")]
    MalformedRemoteData(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Type Result spécialisé pour stmplaylist
pub type Result<T> = std::result::Result<T, Error>;
