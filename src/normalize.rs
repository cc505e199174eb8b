//! Final clean-up of resolved album names and release dates.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::track_record::ReleaseYear;

static TRAILING_EDITION_QUALIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\s*[\(\[][^\(\)\[\]]*\b(edition|remaster|remastered|deluxe|release|version|reissue)\b[^\(\)\[\]]*[\)\]]\s*$",
    )
    .expect("edition qualifier pattern is valid")
});

static RELEASE_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\D)((?:19|20)\d{2})(?:\D|$)").expect("release year pattern is valid")
});

/// Strips trailing "(2009 Remaster)" / "[Deluxe Edition]" style qualifiers.
///
/// Only qualifiers at the very end are removed, repeatedly, so a stacked
/// "(Deluxe Edition) [Remastered]" goes too. Mid-string parentheticals stay.
/// A name made only of a qualifier is returned unchanged.
pub fn normalize_album(album: &str) -> String {
    let mut cleaned = album.trim().to_string();
    loop {
        let next = TRAILING_EDITION_QUALIFIER
            .replace(&cleaned, "")
            .trim_end()
            .to_string();
        if next == cleaned || next.is_empty() {
            break;
        }
        cleaned = next;
    }
    cleaned
}

/// Reduces a date string to its year.
///
/// The first standalone four-digit run in 1900..=2099 wins ("1969-09-26",
/// "26/09/1969", "released 2003"). Text without one is kept as-is.
pub fn normalize_date(date: &str) -> ReleaseYear {
    let trimmed = date.trim();
    let year = RELEASE_YEAR
        .captures(trimmed)
        .and_then(|captures| captures.get(1))
        .and_then(|found| found.as_str().parse::<u16>().ok());

    match year {
        Some(year) => ReleaseYear::Year(year),
        None => ReleaseYear::Unparsed(trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_album, normalize_date};
    use crate::track_record::ReleaseYear;

    #[test]
    fn test_normalize_album_strips_trailing_remaster() {
        assert_eq!(normalize_album("Abbey Road (2009 Remaster)"), "Abbey Road");
        assert_eq!(normalize_album("Rumours [Remastered]"), "Rumours");
        assert_eq!(normalize_album("Nevermind (DELUXE EDITION)"), "Nevermind");
    }

    #[test]
    fn test_normalize_album_strips_stacked_qualifiers() {
        assert_eq!(
            normalize_album("Live at Leeds (Deluxe Edition) [2001 Remaster] "),
            "Live at Leeds"
        );
    }

    #[test]
    fn test_normalize_album_keeps_mid_string_and_unrelated_parentheticals() {
        assert_eq!(
            normalize_album("(What's the Story) Morning Glory?"),
            "(What's the Story) Morning Glory?"
        );
        assert_eq!(
            normalize_album("Songs (Remastered) for Swinging Lovers"),
            "Songs (Remastered) for Swinging Lovers"
        );
        assert_eq!(normalize_album("Help! (Soundtrack)"), "Help! (Soundtrack)");
    }

    #[test]
    fn test_normalize_album_keeps_qualifier_only_name() {
        assert_eq!(normalize_album("(Deluxe Edition)"), "(Deluxe Edition)");
    }

    #[test]
    fn test_normalize_album_is_idempotent() {
        for album in [
            "Abbey Road (2009 Remaster)",
            "Live at Leeds (Deluxe Edition) [2001 Remaster]",
            "(Deluxe Edition)",
            "Kind of Blue",
        ] {
            let once = normalize_album(album);
            assert_eq!(normalize_album(&once), once);
        }
    }

    #[test]
    fn test_normalize_date_extracts_year() {
        assert_eq!(normalize_date("1969-09-26"), ReleaseYear::Year(1969));
        assert_eq!(normalize_date("26/09/1969"), ReleaseYear::Year(1969));
        assert_eq!(normalize_date("released 2003-04-01"), ReleaseYear::Year(2003));
        assert_eq!(normalize_date("1999"), ReleaseYear::Year(1999));
    }

    #[test]
    fn test_normalize_date_keeps_unparseable_text() {
        assert_eq!(
            normalize_date("unknown"),
            ReleaseYear::Unparsed("unknown".to_string())
        );
        assert_eq!(normalize_date("99"), ReleaseYear::Unparsed("99".to_string()));
        assert_eq!(
            normalize_date("0000-00-00"),
            ReleaseYear::Unparsed("0000-00-00".to_string())
        );
    }

    #[test]
    fn test_normalize_date_ignores_numbers_outside_release_years() {
        assert_eq!(
            normalize_date("Track 1234"),
            ReleaseYear::Unparsed("Track 1234".to_string())
        );
        assert_eq!(
            normalize_date("Catalog 5012"),
            ReleaseYear::Unparsed("Catalog 5012".to_string())
        );
        assert_eq!(
            normalize_date("19690926"),
            ReleaseYear::Unparsed("19690926".to_string())
        );
        assert_eq!(normalize_date("Cat. 5012, 1987"), ReleaseYear::Year(1987));
    }
}
