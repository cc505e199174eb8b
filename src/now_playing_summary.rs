//! Plain-text rendering of a resolved track for notifications and terminals.

use crate::track_record::TrackRecord;

/// Renders up to three lines: title, `on <album> (<year>)` and `by <artist>`.
///
/// Unknown fields are left out. A year without an album is not shown.
pub fn summary_text(record: &TrackRecord) -> String {
    let mut lines = Vec::with_capacity(3);
    if let Some(title) = record.title.as_deref() {
        lines.push(title.to_string());
    }
    if let Some(album) = record.album.as_deref() {
        match record.year.as_ref() {
            Some(year) => lines.push(format!("on {album} ({year})")),
            None => lines.push(format!("on {album}")),
        }
    }
    if let Some(artist) = record.artist.as_deref() {
        lines.push(format!("by {artist}"));
    }
    lines.join("\n")
}
