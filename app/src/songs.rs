//! Song extraction from tip messages.

use showrunner_core::TrackId;

/// Finds requested songs in free text.
pub trait SongExtractor: Send + Sync {
    /// Returns at most `count` tracks requested in `message`, in order.
    fn extract(&self, message: &str, count: usize) -> Vec<TrackId>;
}

/// Recognises Spotify track URIs (`spotify:track:<id>`) and links
/// (`https://open.spotify.com/track/<id>?si=...`).
///
/// Every match becomes a `spotify:track:<id>` [`TrackId`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SpotifyLinkExtractor;

const URI_PREFIX: &str = "spotify:track:";
const LINK_MARKER: &str = "open.spotify.com/";

fn track_id(candidate: &str) -> Option<&str> {
    let id = candidate
        .split(|c: char| !c.is_ascii_alphanumeric())
        .next()
        .unwrap_or_default();
    (!id.is_empty()).then_some(id)
}

fn parse_token(token: &str) -> Option<TrackId> {
    let rest = if let Some(rest) = token.find(URI_PREFIX).map(|at| &token[at + URI_PREFIX.len()..]) {
        rest
    } else {
        let path = &token[token.find(LINK_MARKER)? + LINK_MARKER.len()..];
        // Localised links look like `/intl-de/track/<id>`.
        let at = path.find("track/")?;
        &path[at + "track/".len()..]
    };
    track_id(rest).map(|id| TrackId::new(format!("{URI_PREFIX}{id}")))
}

impl SongExtractor for SpotifyLinkExtractor {
    fn extract(&self, message: &str, count: usize) -> Vec<TrackId> {
        message
            .split_whitespace()
            .filter_map(parse_token)
            .take(count)
            .collect()
    }
}
