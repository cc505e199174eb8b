//! Audio-container metadata access.

pub(crate) mod metadata_tags;
