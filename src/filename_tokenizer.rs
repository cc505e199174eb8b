//! Best-effort artist/album/title attribution from "Artist - Album - 01. Title" style filenames.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::track_record::SourceFields;

/// Abbreviations whose trailing ". " must not be treated as a separator.
const PROTECTED_ABBREVIATIONS: [&str; 7] = ["Mr. ", "Mrs. ", "Dr. ", "Jr. ", "Sr. ", "Vol. ", "Ep. "];

const MAX_EXTENSION_CHARS: usize = 5;

static SEPARATOR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s?\.\s+|\s?-\s+|\s+-\s?").expect("separator pattern is valid"));
static TRACK_NUMBER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2}$").expect("track number pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilenameField {
    Artist,
    Album,
    Title,
}

fn placeholder(index: usize) -> String {
    format!("\u{E000}{index}\u{E001}")
}

fn strip_extension(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((stem, extension))
            if !stem.is_empty()
                && !extension.is_empty()
                && extension.len() <= MAX_EXTENSION_CHARS
                && extension.chars().all(|ch| ch.is_ascii_alphanumeric()) =>
        {
            stem
        }
        _ => filename,
    }
}

/// Splits a bare filename into ordered, trimmed chunks.
pub fn tokenize(filename: &str) -> Vec<String> {
    let mut protected = strip_extension(filename).to_string();
    for (index, abbreviation) in PROTECTED_ABBREVIATIONS.iter().enumerate() {
        protected = protected.replace(abbreviation, &placeholder(index));
    }

    SEPARATOR_PATTERN
        .split(&protected)
        .map(|chunk| {
            let mut restored = chunk.to_string();
            for (index, abbreviation) in PROTECTED_ABBREVIATIONS.iter().enumerate() {
                restored = restored.replace(&placeholder(index), abbreviation);
            }
            restored.trim().to_string()
        })
        .filter(|chunk| !chunk.is_empty())
        .collect()
}

/// Attributes tokenized filename chunks to artist, album and title.
///
/// Chunks are right-aligned against `[artist, album, title]`: title takes the last
/// chunk, album is the first field dropped when chunks run short, and surplus
/// leading chunks are discarded.
pub fn fields_from_filename(filename: &str) -> SourceFields {
    let mut chunks = tokenize(filename);
    if let Some(position) = chunks
        .iter()
        .position(|chunk| TRACK_NUMBER_PATTERN.is_match(chunk))
    {
        chunks.remove(position);
    }

    let mut fields = vec![FilenameField::Artist, FilenameField::Album, FilenameField::Title];
    if fields.len() > chunks.len() {
        fields.retain(|field| *field != FilenameField::Album);
    }
    if chunks.len() > fields.len() {
        chunks.drain(..chunks.len() - fields.len());
    }

    let mut found = SourceFields::default();
    for (field, chunk) in fields.iter().rev().zip(chunks.into_iter().rev()) {
        match field {
            FilenameField::Artist => found.artist = Some(chunk),
            FilenameField::Album => found.album = Some(chunk),
            FilenameField::Title => found.title = Some(chunk),
        }
    }
    found
}
