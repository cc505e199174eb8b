//! Track metadata resolution pipeline.
//!
//! Sources are consulted in a fixed order (tags, filename, embedded/local artwork,
//! remote search) and each may only fill fields left unknown by earlier ones. The
//! remote stage is the exception: when it selects a candidate, artist, album, date and
//! artwork are all replaced by that candidate's values together.

use std::fs::File;
use std::path::{Path, PathBuf};

use log::{debug, info};
use thiserror::Error;

use crate::filename_tokenizer::fields_from_filename;
use crate::local_artwork::{find_local_artwork, DEFAULT_MAX_ASCENT};
use crate::metadata::metadata_tags::TagReader;
use crate::normalize::{normalize_album, normalize_date};
use crate::remote::{RemoteContext, RemoteLookup, RemoteQuery};
use crate::track_record::{Artwork, SourceFields, TrackRecord};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("track file {} is unreadable: {reason}", .path.display())]
    Unreadable { path: PathBuf, reason: String },
}

/// Static inputs for local lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverSettings {
    /// Local artwork search never climbs above this folder.
    pub music_directory: Option<PathBuf>,
    pub artwork_search_depth: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            music_directory: None,
            artwork_search_depth: DEFAULT_MAX_ASCENT,
        }
    }
}

/// Resolves one track at a time, keeping remote session state between tracks.
pub struct MetadataResolver {
    tag_reader: Box<dyn TagReader>,
    remote: Option<RemoteLookup>,
    remote_context: RemoteContext,
    settings: ResolverSettings,
}

fn fill_gap(target: &mut Option<String>, value: Option<String>, field: &str, source: &str) -> bool {
    if target.is_some() {
        return false;
    }
    let Some(value) = value else {
        return false;
    };
    debug!("{field} = '{value}' (from {source})");
    *target = Some(value);
    true
}

fn ensure_readable(path: &Path) -> Result<(), ResolveError> {
    let unreadable = |reason: String| ResolveError::Unreadable {
        path: path.to_path_buf(),
        reason,
    };
    let metadata = std::fs::metadata(path).map_err(|err| unreadable(err.to_string()))?;
    if !metadata.is_file() {
        return Err(unreadable("not a regular file".to_string()));
    }
    File::open(path).map_err(|err| unreadable(err.to_string()))?;
    Ok(())
}

fn remote_query_for(fields: &SourceFields) -> Option<RemoteQuery> {
    let artist = fields.artist.clone()?;
    if let Some(album) = fields.album.clone() {
        return Some(RemoteQuery::Album { artist, album });
    }
    fields
        .title
        .clone()
        .map(|title| RemoteQuery::Track { artist, title })
}

impl MetadataResolver {
    pub fn new(
        tag_reader: Box<dyn TagReader>,
        remote: Option<RemoteLookup>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            tag_reader,
            remote,
            remote_context: RemoteContext::default(),
            settings,
        }
    }

    pub fn remote_disabled(&self) -> bool {
        self.remote.is_none() || self.remote_context.disabled
    }

    /// Resolves the record for `track_path`.
    ///
    /// Fails only when the file itself cannot be read; every missing or malformed
    /// source just leaves its fields unknown.
    pub fn resolve(&mut self, track_path: &Path) -> Result<TrackRecord, ResolveError> {
        ensure_readable(track_path)?;
        debug!("Resolving metadata for {}", track_path.display());

        let tags = self.tag_reader.read_tags(track_path);
        let mut fields = SourceFields::default();
        fill_gap(&mut fields.title, tags.fields.title, "title", "tags");
        fill_gap(&mut fields.artist, tags.fields.artist, "artist", "tags");
        fill_gap(&mut fields.album, tags.fields.album, "album", "tags");
        fill_gap(&mut fields.date, tags.fields.date, "date", "tags");

        Self::fill_from_filename(&mut fields, track_path);

        let mut artwork = self.local_artwork(track_path, tags.embedded_picture);

        if fields.album.is_none() || artwork.is_none() {
            self.apply_remote(&mut fields, &mut artwork);
        }

        Ok(TrackRecord {
            title: fields.title,
            artist: fields.artist,
            album: fields.album.map(|album| normalize_album(&album)),
            year: fields.date.map(|date| normalize_date(&date)),
            artwork,
        })
    }

    fn fill_from_filename(fields: &mut SourceFields, track_path: &Path) {
        if !fields.missing_identity() {
            return;
        }
        let Some(filename) = track_path.file_name().and_then(|name| name.to_str()) else {
            return;
        };

        let parsed = fields_from_filename(filename);
        fill_gap(&mut fields.title, parsed.title, "title", "filename");
        fill_gap(&mut fields.artist, parsed.artist, "artist", "filename");
        if fill_gap(&mut fields.album, parsed.album, "album", "filename") {
            if let Some(stale) = fields.date.take() {
                debug!("date '{stale}' cleared: album now comes from the filename");
            }
        }
    }

    fn local_artwork(&self, track_path: &Path, embedded: Option<Vec<u8>>) -> Option<Artwork> {
        if let Some(data) = embedded {
            debug!("artwork = embedded picture ({} bytes)", data.len());
            return Some(Artwork::Embedded { data });
        }

        find_local_artwork(
            track_path,
            self.settings.music_directory.as_deref(),
            self.settings.artwork_search_depth,
        )
        .map(|path| {
            debug!("artwork = {}", path.display());
            Artwork::LocalFile { path }
        })
    }

    fn apply_remote(&mut self, fields: &mut SourceFields, artwork: &mut Option<Artwork>) {
        let Some(remote) = self.remote.as_ref() else {
            return;
        };
        let Some(query) = remote_query_for(fields) else {
            debug!("Remote lookup skipped: artist plus album or title required");
            return;
        };

        let Some(selected) = remote.lookup(&mut self.remote_context, &query) else {
            debug!("{}: no usable candidate", remote.provider_name());
            return;
        };

        info!(
            "{}: selected '{}' by '{}' ({})",
            remote.provider_name(),
            selected.album,
            selected.artist,
            selected.release_date
        );
        fields.artist = Some(selected.artist);
        fields.album = Some(selected.album);
        fields.date = Some(selected.release_date);
        *artwork = Some(Artwork::RemoteUrl {
            url: selected.image_url,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::{MetadataResolver, ResolveError, ResolverSettings};
    use crate::metadata::metadata_tags::{TagReader, TagSet};
    use crate::remote::tests::{candidate, ScriptedProvider, ScriptedState};
    use crate::remote::{CandidateRecord, RemoteError, RemoteLookup, RemoteQuery};
    use crate::track_record::{Artwork, ReleaseYear, SourceFields, TrackRecord};
    use std::cell::RefCell;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::rc::Rc;
    use std::time::{SystemTime, UNIX_EPOCH};

    struct FixedTags(TagSet);

    impl TagReader for FixedTags {
        fn read_tags(&self, _path: &Path) -> TagSet {
            self.0.clone()
        }
    }

    fn tags(title: Option<&str>, artist: Option<&str>, album: Option<&str>, date: Option<&str>) -> TagSet {
        TagSet {
            fields: SourceFields::from_values(
                title.map(str::to_string),
                artist.map(str::to_string),
                album.map(str::to_string),
                date.map(str::to_string),
            ),
            ..TagSet::default()
        }
    }

    struct Fixture {
        root: PathBuf,
    }

    impl Fixture {
        fn new(name: &str) -> Self {
            let nonce = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("system time should be valid")
                .as_nanos();
            let root = std::env::temp_dir().join(format!("nowplaying_resolver_{name}_{nonce}"));
            fs::create_dir_all(&root).expect("fixture root should be creatable");
            Self { root }
        }

        fn file(&self, relative: &str) -> PathBuf {
            let path = self.root.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("fixture dir should be creatable");
            }
            fs::write(&path, b"fixture").expect("fixture file should be writable");
            path
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.root);
        }
    }

    fn resolver_with_remote(
        fixture: &Fixture,
        tag_set: TagSet,
        results: Vec<Result<Vec<CandidateRecord>, RemoteError>>,
    ) -> (MetadataResolver, Rc<RefCell<ScriptedState>>) {
        let state = Rc::new(RefCell::new(ScriptedState::default()));
        state.borrow_mut().search_results.extend(results);
        let provider = ScriptedProvider {
            state: Rc::clone(&state),
            needs_token: false,
        };
        let resolver = MetadataResolver::new(
            Box::new(FixedTags(tag_set)),
            Some(RemoteLookup::new(Box::new(provider))),
            ResolverSettings {
                music_directory: Some(fixture.root.clone()),
                ..ResolverSettings::default()
            },
        );
        (resolver, state)
    }

    fn artist_candidate(artist: &str, album: &str, date: &str) -> CandidateRecord {
        CandidateRecord {
            artist: Some(artist.to_string()),
            ..candidate(album, "album", date)
        }
    }

    #[test]
    fn test_tags_and_track_search_resolve_full_record() {
        let fixture = Fixture::new("dre");
        let track = fixture.file("Dr. Dre/02 - Still D.R.E..mp3");
        let (mut resolver, state) = resolver_with_remote(
            &fixture,
            tags(Some("Still D.R.E."), Some("Dr. Dre"), None, None),
            vec![Ok(vec![CandidateRecord {
                image_url: Some("https://img.example/2001.jpg".to_string()),
                ..artist_candidate("Dr. Dre", "2001", "1999-11-16")
            }])],
        );

        let record = resolver.resolve(&track).expect("track should resolve");
        assert_eq!(
            record,
            TrackRecord {
                title: Some("Still D.R.E.".to_string()),
                artist: Some("Dr. Dre".to_string()),
                album: Some("2001".to_string()),
                year: Some(ReleaseYear::Year(1999)),
                artwork: Some(Artwork::RemoteUrl {
                    url: "https://img.example/2001.jpg".to_string()
                }),
            }
        );
        assert_eq!(
            state.borrow().queries[0].0,
            RemoteQuery::Track {
                artist: "Dr. Dre".to_string(),
                title: "Still D.R.E.".to_string(),
            }
        );
    }

    #[test]
    fn test_filename_only_title_skips_remote_lookup() {
        let fixture = Fixture::new("unknown");
        let track = fixture.file("Unknown.mp3");
        let (mut resolver, state) = resolver_with_remote(&fixture, TagSet::default(), Vec::new());

        let record = resolver.resolve(&track).expect("track should resolve");
        assert_eq!(
            record,
            TrackRecord {
                title: Some("Unknown".to_string()),
                ..TrackRecord::default()
            }
        );
        assert!(state.borrow().queries.is_empty());
    }

    #[test]
    fn test_complete_local_record_is_normalized_without_remote_lookup() {
        let fixture = Fixture::new("abbey");
        let track = fixture.file("01 Come Together.flac");
        let mut tag_set = tags(
            Some("Come Together"),
            Some("The Beatles"),
            Some("Abbey Road (2009 Remaster)"),
            Some("1969-09-26"),
        );
        tag_set.embedded_picture = Some(vec![1, 2, 3]);
        let (mut resolver, state) = resolver_with_remote(&fixture, tag_set, Vec::new());

        let record = resolver.resolve(&track).expect("track should resolve");
        assert_eq!(record.album.as_deref(), Some("Abbey Road"));
        assert_eq!(record.year, Some(ReleaseYear::Year(1969)));
        assert_eq!(record.artwork, Some(Artwork::Embedded { data: vec![1, 2, 3] }));
        assert!(state.borrow().queries.is_empty());
    }

    #[test]
    fn test_filename_album_clears_tag_date() {
        let fixture = Fixture::new("filename_album");
        let track = fixture.file("Pixies - Doolittle - 07. Monkey Gone to Heaven.mp3");
        let mut resolver = MetadataResolver::new(
            Box::new(FixedTags(tags(None, None, None, Some("2004")))),
            None,
            ResolverSettings::default(),
        );

        let record = resolver.resolve(&track).expect("track should resolve");
        assert_eq!(record.artist.as_deref(), Some("Pixies"));
        assert_eq!(record.album.as_deref(), Some("Doolittle"));
        assert_eq!(record.title.as_deref(), Some("Monkey Gone to Heaven"));
        assert_eq!(record.year, None);
    }

    #[test]
    fn test_filename_fills_gaps_without_overwriting_tags() {
        let fixture = Fixture::new("gap_fill");
        let track = fixture.file("Wrong Artist - Surfer Rosa - 03. Wrong Title.mp3");
        let mut resolver = MetadataResolver::new(
            Box::new(FixedTags(tags(Some("Where Is My Mind?"), Some("Pixies"), None, None))),
            None,
            ResolverSettings::default(),
        );

        let record = resolver.resolve(&track).expect("track should resolve");
        assert_eq!(record.title.as_deref(), Some("Where Is My Mind?"));
        assert_eq!(record.artist.as_deref(), Some("Pixies"));
        assert_eq!(record.album.as_deref(), Some("Surfer Rosa"));
    }

    #[test]
    fn test_tag_album_keeps_tag_date_and_unparsed_text() {
        let fixture = Fixture::new("unparsed_date");
        let track = fixture.file("track.mp3");
        let mut tag_set = tags(Some("Song"), Some("Artist"), Some("Record"), Some("unknown"));
        tag_set.embedded_picture = Some(vec![9]);
        let (mut resolver, _state) = resolver_with_remote(&fixture, tag_set, Vec::new());

        let record = resolver.resolve(&track).expect("track should resolve");
        assert_eq!(record.year, Some(ReleaseYear::Unparsed("unknown".to_string())));
    }

    #[test]
    fn test_embedded_picture_wins_over_local_file() {
        let fixture = Fixture::new("embedded_first");
        let track = fixture.file("Album/01 - Song.mp3");
        fixture.file("Album/cover.jpg");
        let mut tag_set = tags(Some("Song"), Some("Artist"), Some("Album"), None);
        tag_set.embedded_picture = Some(vec![7, 7]);
        let (mut resolver, _state) = resolver_with_remote(&fixture, tag_set, Vec::new());

        let record = resolver.resolve(&track).expect("track should resolve");
        assert_eq!(record.artwork, Some(Artwork::Embedded { data: vec![7, 7] }));
    }

    #[test]
    fn test_remote_hit_replaces_album_date_and_local_artwork_together() {
        let fixture = Fixture::new("atomic_remote");
        let track = fixture.file("Album/CD1/01 - Song.mp3");
        fixture.file("Album/cover.jpg");
        let (mut resolver, state) = resolver_with_remote(
            &fixture,
            tags(Some("Song"), Some("The Band"), None, Some("2015-01-01")),
            vec![Ok(vec![
                candidate("The Best of The Band", "album", "1976"),
                candidate("Music From Big Pink", "album", "1968-07-01"),
            ])],
        );

        let record = resolver.resolve(&track).expect("track should resolve");
        assert_eq!(record.album.as_deref(), Some("Music From Big Pink"));
        assert_eq!(record.year, Some(ReleaseYear::Year(1968)));
        assert_eq!(
            record.artwork,
            Some(Artwork::RemoteUrl {
                url: "https://img.example/Music_From_Big_Pink.jpg".to_string()
            })
        );
        assert!(matches!(
            state.borrow().queries[0].0,
            RemoteQuery::Track { .. }
        ));
    }

    #[test]
    fn test_known_album_without_artwork_uses_album_query_and_replaces_group() {
        let fixture = Fixture::new("album_query");
        let track = fixture.file("Big Pink/04 - The Weight.mp3");
        let (mut resolver, state) = resolver_with_remote(
            &fixture,
            tags(Some("The Weight"), Some("The_Band"), Some("Big Pink"), Some("2000")),
            vec![Ok(vec![candidate("Music From Big Pink", "album", "1968-07-01")])],
        );

        let record = resolver.resolve(&track).expect("track should resolve");
        assert_eq!(
            record,
            TrackRecord {
                title: Some("The Weight".to_string()),
                artist: Some("The Band".to_string()),
                album: Some("Music From Big Pink".to_string()),
                year: Some(ReleaseYear::Year(1968)),
                artwork: Some(Artwork::RemoteUrl {
                    url: "https://img.example/Music_From_Big_Pink.jpg".to_string()
                }),
            }
        );

        let state = state.borrow();
        assert_eq!(state.queries.len(), 1);
        assert_eq!(
            state.queries[0].0,
            RemoteQuery::Album {
                artist: "The_Band".to_string(),
                album: "Big Pink".to_string(),
            }
        );
    }

    #[test]
    fn test_remote_miss_keeps_local_sources() {
        let fixture = Fixture::new("remote_miss");
        let track = fixture.file("Album/01 - Song.mp3");
        fixture.file("Album/folder.png");
        let (mut resolver, state) = resolver_with_remote(
            &fixture,
            tags(Some("Song"), Some("Artist"), None, Some("2001")),
            vec![Err(RemoteError::Transport("offline".to_string()))],
        );

        let record = resolver.resolve(&track).expect("track should resolve");
        assert_eq!(record.album, None);
        assert_eq!(record.year, Some(ReleaseYear::Year(2001)));
        assert_eq!(
            record.artwork,
            Some(Artwork::LocalFile {
                path: fixture.root.join("Album").join("folder.png")
            })
        );
        assert!(matches!(
            state.borrow().queries[0].0,
            RemoteQuery::Track { .. }
        ));
    }

    #[test]
    fn test_unreadable_track_is_an_error() {
        let fixture = Fixture::new("unreadable");
        let mut resolver = MetadataResolver::new(
            Box::new(FixedTags(TagSet::default())),
            None,
            ResolverSettings::default(),
        );

        let missing = fixture.root.join("missing.mp3");
        assert!(matches!(
            resolver.resolve(&missing),
            Err(ResolveError::Unreadable { .. })
        ));
        assert!(matches!(
            resolver.resolve(&fixture.root),
            Err(ResolveError::Unreadable { .. })
        ));
    }

    #[test]
    fn test_readable_file_without_any_metadata_yields_empty_record() {
        let fixture = Fixture::new("empty");
        let track = fixture.file("01.mp3");
        let mut resolver = MetadataResolver::new(
            Box::new(FixedTags(TagSet::default())),
            None,
            ResolverSettings::default(),
        );

        assert_eq!(resolver.resolve(&track).ok(), Some(TrackRecord::default()));
        assert!(resolver.remote_disabled());
    }
}
