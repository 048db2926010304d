//! # stmplaylist - Playlists ordonnées synchronisées avec un serveur distant
//!
//! Cette crate fournit :
//! - Des clés de séquence fractionnaires (insertion/déplacement sans renumérotation)
//! - Une collection triée avec résumé dérivé (nombre, durée totale)
//! - Une synchronisation différée des champs légers (titre)
//! - Une passerelle de persistance (HTTP ou mémoire)
//! - La file de lecture (stream) et son tirage aléatoire pondéré
//!
//! # Architecture
//!
//! - **Playlist** : agrégat propriétaire de ses éléments, seul point de mutation
//! - **PlaylistItems** : collection triée par clé, notifie chaque changement
//! - **DebouncedFieldSync** : une écriture par (entité, champ) après une période de calme
//! - **PersistenceGateway** : service CRUD distant, vu comme opaque
//!
//! # Exemple d'utilisation
//!
//! ```no_run
//! use std::sync::Arc;
//! use stmplaylist::{MemoryGateway, Playlist, SyncSettings, Video};
//!
//! # tokio_test::block_on(async {
//! let gateway = Arc::new(MemoryGateway::new());
//! let mut playlist = Playlist::new(gateway, SyncSettings::default());
//!
//! playlist.add_item(Arc::new(Video::new("dQw4w9WgXcQ", "Song", 212))).await?;
//! playlist.add_item_at_index(Arc::new(Video::new("9bZkp7q19f0", "Intro", 30)), 0).await?;
//!
//! println!("{}", playlist.display_info());
//! # Ok::<(), stmplaylist::Error>(())
//! # }).unwrap();
//! ```

mod display;
mod error;
mod events;
mod item;
mod items;
mod playlist;
mod stream;
mod sync;
mod video;

pub mod gateway;
pub mod sequence;

#[cfg(feature = "stmconfig")]
mod config_ext;

// Réexports publics
pub use display::{format_display_info, format_duration, DisplayLabels};
pub use error::{Error, Result};
pub use events::{Observers, PlaylistEvent, PlaylistEventKind};
pub use gateway::{
    EntityKind, EntityRef, GatewayCall, HttpGateway, MemoryGateway, PersistenceGateway,
    PlaylistDto, PlaylistItemDto, ShareCode, ShareableEntityType,
};
pub use item::{nil_as_none, EntityId, PlaylistItem};
pub use items::{summary_of, ItemsChange, ItemsSummary, PlaylistItems};
pub use playlist::{Playlist, DEFAULT_PLAYLIST_TITLE};
pub use stream::{Stream, StreamItem};
pub use sync::{DebouncedFieldSync, SyncSettings, DEFAULT_QUIET_PERIOD};
pub use video::Video;

#[cfg(feature = "stmconfig")]
pub use config_ext::PlaylistConfigExt;
