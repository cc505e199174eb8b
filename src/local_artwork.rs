//! Conventional cover-image lookup next to a track, climbing out of disc subfolders.

use std::path::{Path, PathBuf};

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

/// Candidate basenames, checked in order.
pub const COVER_FILE_STEMS: [&str; 14] = [
    "cover",
    "Cover",
    "front",
    "Front",
    "folder",
    "Folder",
    "thumb",
    "Thumb",
    "album",
    "Album",
    "albumart",
    "AlbumArt",
    "albumartsmall",
    "AlbumArtSmall",
];

/// Candidate image extensions, checked in order for each basename.
pub const COVER_FILE_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff", "svg"];

/// Folders named after the audio format they hold, e.g. `Album/flac/01.flac`.
const FORMAT_FOLDER_NAMES: [&str; 6] = ["mp3", "m4a", "flac", "wma", "ogg", "opus"];

pub const DEFAULT_MAX_ASCENT: usize = 3;

static DISC_FOLDER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(disc|disk|cd|dvd|set|vol(ume)?)[\s._-]*\d+")
        .expect("disc folder pattern is valid")
});

/// Returns the first conventionally named image file directly inside `folder`.
pub fn find_cover_in_folder(folder: &Path) -> Option<PathBuf> {
    COVER_FILE_STEMS.iter().find_map(|stem| {
        COVER_FILE_EXTENSIONS
            .iter()
            .map(|extension| folder.join(format!("{stem}.{extension}")))
            .find(|candidate| candidate.is_file())
    })
}

fn folder_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.trim().to_string())
}

fn is_disc_or_format_folder(name: &str, track_extension: Option<&str>) -> bool {
    let lowered = name.to_ascii_lowercase();
    DISC_FOLDER_PATTERN.is_match(&lowered)
        || FORMAT_FOLDER_NAMES.contains(&lowered.as_str())
        || track_extension.is_some_and(|extension| lowered == extension)
}

/// Locates local cover artwork for `track_path`.
///
/// The track's own folder is always searched. The walk then climbs one level at a
/// time, but only out of a disc/format folder or into a folder whose name marks
/// it as part of the same album split (a disc/format name, or the starting folder's
/// own name repeated). It never climbs above `root_boundary` and stops after
/// `max_ascent` levels.
pub fn find_local_artwork(
    track_path: &Path,
    root_boundary: Option<&Path>,
    max_ascent: usize,
) -> Option<PathBuf> {
    let start_folder = track_path.parent()?;
    let start_name = folder_name(start_folder);
    let track_extension = track_path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| extension.to_ascii_lowercase());

    let mut current = start_folder.to_path_buf();
    for level in 0..=max_ascent {
        if let Some(found) = find_cover_in_folder(&current) {
            debug!(
                "Local artwork found at {} ({} level(s) above track folder)",
                found.display(),
                level
            );
            return Some(found);
        }

        if level == max_ascent {
            break;
        }
        if root_boundary.is_some_and(|root| current == root || !current.starts_with(root)) {
            break;
        }
        let Some(parent) = current.parent().map(Path::to_path_buf) else {
            break;
        };
        if root_boundary.is_some_and(|root| !parent.starts_with(root)) {
            break;
        }

        let leaving_split_folder = folder_name(&current)
            .is_some_and(|name| is_disc_or_format_folder(&name, track_extension.as_deref()));
        let entering_split_folder = folder_name(&parent).is_some_and(|name| {
            is_disc_or_format_folder(&name, track_extension.as_deref())
                || start_name
                    .as_deref()
                    .is_some_and(|start| name.eq_ignore_ascii_case(start))
        });
        if !leaving_split_folder && !entering_split_folder {
            break;
        }
        current = parent;
    }

    None
}
