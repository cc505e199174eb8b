//! Tag and embedded-picture reader backed by `lofty`, with a `symphonia` fallback.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use lofty::config::{ParseOptions, ParsingMode};
use lofty::file::{FileType, TaggedFile, TaggedFileExt};
use lofty::picture::PictureType;
use lofty::prelude::Accessor;
use lofty::probe::Probe;
use lofty::tag::{ItemKey, Tag};
use log::{debug, warn};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{
    MetadataOptions, MetadataRevision, StandardTagKey, StandardVisualKey, Value as SymphoniaValue,
};
use symphonia::core::probe::Hint;

use crate::track_record::SourceFields;

/// Picture-type codes in preference order: front cover, other icon, 32x32 icon,
/// other, illustration.
pub const PICTURE_TYPE_PRIORITY: [u8; 5] = [3, 2, 1, 0, 18];

/// Everything the resolver needs from a track's metadata container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    pub mime_type: Option<String>,
    pub fields: SourceFields,
    pub album_artist: Option<String>,
    pub embedded_picture: Option<Vec<u8>>,
}

/// Capability for reading tags from one audio file.
///
/// Readers are best-effort: a container that cannot be parsed yields an empty set.
pub trait TagReader {
    fn read_tags(&self, path: &Path) -> TagSet;
}

/// Default reader covering every container `lofty` and `symphonia` understand.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerTagReader;

impl TagReader for ContainerTagReader {
    fn read_tags(&self, path: &Path) -> TagSet {
        if let Some(tags) = read_tag_set_with_lofty(path) {
            return tags;
        }

        match read_tag_set_with_symphonia(path) {
            Some(tags) => {
                debug!(
                    "Metadata read recovered via symphonia fallback for {}",
                    path.display()
                );
                tags
            }
            None => {
                warn!(
                    "Metadata read failed for {} in both lofty and symphonia paths",
                    path.display()
                );
                TagSet::default()
            }
        }
    }
}

/// Returns the bytes of the highest-priority picture, judged by picture-type code.
pub fn pick_prioritized_picture<'a, I>(pictures: I) -> Option<Vec<u8>>
where
    I: IntoIterator<Item = (u8, &'a [u8])>,
{
    let pictures: Vec<(u8, &[u8])> = pictures
        .into_iter()
        .filter(|(_, data)| !data.is_empty())
        .collect();
    PICTURE_TYPE_PRIORITY.iter().find_map(|wanted| {
        pictures
            .iter()
            .find(|(code, _)| code == wanted)
            .map(|(_, data)| data.to_vec())
    })
}

fn first_non_empty_value<F>(primary_tag: Option<&Tag>, tags: &[Tag], extractor: F) -> Option<String>
where
    F: FnMut(&Tag) -> Option<String>,
{
    primary_tag
        .into_iter()
        .chain(tags.iter())
        .filter_map(extractor)
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn mime_type_for_file_type(file_type: FileType) -> Option<&'static str> {
    match file_type {
        FileType::Mpeg => Some("audio/mpeg"),
        FileType::Mp4 => Some("audio/mp4"),
        FileType::Flac => Some("audio/flac"),
        FileType::Vorbis | FileType::Speex => Some("audio/ogg"),
        FileType::Opus => Some("audio/opus"),
        FileType::Wav => Some("audio/wav"),
        FileType::Aiff => Some("audio/aiff"),
        FileType::Aac => Some("audio/aac"),
        FileType::WavPack => Some("audio/wavpack"),
        FileType::Ape => Some("audio/ape"),
        _ => None,
    }
}

fn mime_type_for_extension(path: &Path) -> Option<String> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match extension.as_str() {
        "mp3" => "audio/mpeg",
        "m4a" | "m4b" | "mp4" => "audio/mp4",
        "flac" => "audio/flac",
        "ogg" | "oga" => "audio/ogg",
        "opus" => "audio/opus",
        "wav" => "audio/wav",
        "wma" => "audio/x-ms-wma",
        _ => return None,
    };
    Some(mime.to_string())
}

const STRICT_MAX_JUNK_BYTES: usize = 1024;
const SNIFFED_MAX_JUNK_BYTES: usize = 64 * 1024;

fn tag_parse_options(parsing_mode: ParsingMode, max_junk_bytes: usize) -> ParseOptions {
    ParseOptions::new()
        .read_properties(false)
        .read_cover_art(true)
        .parsing_mode(parsing_mode)
        .max_junk_bytes(max_junk_bytes)
}

fn probe_by_extension(path: &Path) -> lofty::error::Result<TaggedFile> {
    Probe::open(path)?
        .options(tag_parse_options(ParsingMode::BestAttempt, STRICT_MAX_JUNK_BYTES))
        .read()
}

/// Ignores the extension and tolerates a long junk run between tag and audio.
fn probe_by_content(path: &Path) -> lofty::error::Result<TaggedFile> {
    Probe::new(BufReader::new(File::open(path)?))
        .options(tag_parse_options(ParsingMode::Relaxed, SNIFFED_MAX_JUNK_BYTES))
        .guess_file_type()?
        .read()
}

fn read_tagged_file(path: &Path) -> Option<TaggedFile> {
    let by_extension_error = match probe_by_extension(path) {
        Ok(tagged_file) => return Some(tagged_file),
        Err(error) => error,
    };

    match probe_by_content(path) {
        Ok(tagged_file) => {
            debug!(
                "lofty: {} read after content sniffing (extension probe: {by_extension_error})",
                path.display()
            );
            Some(tagged_file)
        }
        Err(error) => {
            debug!(
                "lofty: {} unreadable (extension probe: {by_extension_error}; content probe: {error})",
                path.display()
            );
            None
        }
    }
}

fn read_tag_set_with_lofty(path: &Path) -> Option<TagSet> {
    let tagged_file = read_tagged_file(path)?;
    let primary_tag = tagged_file.primary_tag();
    let tags = tagged_file.tags();

    let title = first_non_empty_value(primary_tag, tags, |tag| {
        tag.title().map(|value| value.into_owned())
    });
    let artist = first_non_empty_value(primary_tag, tags, |tag| {
        tag.artist().map(|value| value.into_owned())
    });
    let album = first_non_empty_value(primary_tag, tags, |tag| {
        tag.album().map(|value| value.into_owned())
    });
    let date = first_non_empty_value(primary_tag, tags, |tag| {
        tag.get_string(ItemKey::RecordingDate)
            .or_else(|| tag.get_string(ItemKey::ReleaseDate))
            .or_else(|| tag.get_string(ItemKey::OriginalReleaseDate))
            .or_else(|| tag.get_string(ItemKey::Year))
            .map(str::to_string)
    });
    let album_artist = first_non_empty_value(primary_tag, tags, |tag| {
        tag.get_string(ItemKey::AlbumArtist).map(str::to_string)
    });

    let embedded_picture = primary_tag
        .into_iter()
        .chain(tags.iter())
        .find_map(|tag| {
            pick_prioritized_picture(
                tag.pictures()
                    .iter()
                    .map(|picture| (picture_type_code(picture.pic_type()), picture.data())),
            )
        });

    Some(TagSet {
        mime_type: mime_type_for_file_type(tagged_file.file_type())
            .map(str::to_string)
            .or_else(|| mime_type_for_extension(path)),
        fields: SourceFields::from_values(title, artist, album, date),
        album_artist,
        embedded_picture,
    })
}

fn picture_type_code(picture_type: PictureType) -> u8 {
    match picture_type {
        PictureType::Other => 0,
        PictureType::Icon => 1,
        PictureType::OtherIcon => 2,
        PictureType::CoverFront => 3,
        PictureType::Illustration => 18,
        other => other.as_u8(),
    }
}

fn visual_usage_code(usage: Option<StandardVisualKey>) -> u8 {
    match usage {
        None => 0,
        Some(StandardVisualKey::FileIcon) => 1,
        Some(StandardVisualKey::OtherIcon) => 2,
        Some(StandardVisualKey::FrontCover) => 3,
        Some(StandardVisualKey::BackCover) => 4,
        Some(StandardVisualKey::Illustration) => 18,
        Some(_) => u8::MAX,
    }
}

fn open_symphonia_probe(path: &Path) -> Option<symphonia::core::probe::ProbeResult> {
    let file = File::open(path).ok()?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .ok()
}

fn set_if_empty(target: &mut Option<String>, value: &str) -> bool {
    let trimmed = value.trim();
    if target.is_none() && !trimmed.is_empty() {
        *target = Some(trimmed.to_string());
        true
    } else {
        false
    }
}

fn symphonia_value_to_string(value: &SymphoniaValue) -> String {
    value.to_string().trim().to_string()
}

fn apply_symphonia_tag(tags: &mut TagSet, tag: &symphonia::core::meta::Tag) -> bool {
    let value = symphonia_value_to_string(&tag.value);
    if value.is_empty() {
        return false;
    }

    let fields = &mut tags.fields;
    let updated = match tag.std_key {
        Some(StandardTagKey::TrackTitle) => set_if_empty(&mut fields.title, &value),
        Some(StandardTagKey::Artist) => set_if_empty(&mut fields.artist, &value),
        Some(StandardTagKey::Album) => set_if_empty(&mut fields.album, &value),
        Some(StandardTagKey::AlbumArtist) => set_if_empty(&mut tags.album_artist, &value),
        Some(StandardTagKey::Date)
        | Some(StandardTagKey::ReleaseDate)
        | Some(StandardTagKey::OriginalDate) => set_if_empty(&mut fields.date, &value),
        _ => false,
    };
    if updated {
        return true;
    }

    // Raw container keys for tags symphonia does not map to a standard key.
    match tag.key.trim() {
        "TIT2" | "©nam" | "Title" => set_if_empty(&mut fields.title, &value),
        "TPE1" | "©ART" | "Author" => set_if_empty(&mut fields.artist, &value),
        "TALB" | "©alb" | "WM/AlbumTitle" => set_if_empty(&mut fields.album, &value),
        "TPE2" | "aART" | "WM/AlbumArtist" => set_if_empty(&mut tags.album_artist, &value),
        "TDRC" | "TYER" | "©day" | "WM/Year" => set_if_empty(&mut fields.date, &value),
        other => match other.to_ascii_uppercase().as_str() {
            "TITLE" => set_if_empty(&mut fields.title, &value),
            "ARTIST" => set_if_empty(&mut fields.artist, &value),
            "ALBUM" => set_if_empty(&mut fields.album, &value),
            "ALBUMARTIST" | "ALBUM_ARTIST" | "ALBUM ARTIST" => {
                set_if_empty(&mut tags.album_artist, &value)
            }
            "DATE" | "YEAR" => set_if_empty(&mut fields.date, &value),
            _ => false,
        },
    }
}

fn apply_symphonia_revision(tags: &mut TagSet, revision: &MetadataRevision) {
    for tag in revision.tags() {
        apply_symphonia_tag(tags, tag);
    }
    if tags.embedded_picture.is_none() {
        tags.embedded_picture = pick_prioritized_picture(
            revision
                .visuals()
                .iter()
                .map(|visual| (visual_usage_code(visual.usage), &visual.data[..])),
        );
    }
}

fn read_tag_set_with_symphonia(path: &Path) -> Option<TagSet> {
    let mut probed = open_symphonia_probe(path)?;
    let mut tags = TagSet {
        mime_type: mime_type_for_extension(path),
        ..TagSet::default()
    };

    if let Some(probe_meta) = probed.metadata.get() {
        if let Some(revision) = probe_meta.current() {
            apply_symphonia_revision(&mut tags, revision);
        }
    }

    while !probed.format.metadata().is_latest() {
        let _ = probed.format.metadata().pop();
    }
    if let Some(revision) = probed.format.metadata().current() {
        apply_symphonia_revision(&mut tags, revision);
    }

    if tags.fields.is_empty() && tags.embedded_picture.is_none() {
        None
    } else {
        Some(tags)
    }
}
