//! HLS manifest handling
//!
//! [`parser`] decodes one playlist document without networking;
//! [`resolver`] walks master playlists through a [`Session`](crate::app::session::Session)
//! and produces the segment groupings stored in `Formats::manifest_data`.

pub mod parser;
pub mod resolver;

pub use parser::{check_downloadable, parse, MediaPlaylist, Playlist, Variant};
pub use resolver::{resolve, resolve_document};
