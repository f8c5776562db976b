//! Ephemeral build tags.
//!
//! Each unique build context is built under a throwaway tag of lowercase
//! letters before being retagged to the canonical `app/service` images.

use rack_common::constants::BUILD_TAG_LENGTH;
use rack_common::types::ImageTag;
use uuid::Uuid;

/// Returns a fresh random tag of [`BUILD_TAG_LENGTH`] lowercase letters.
#[must_use]
pub fn ephemeral() -> ImageTag {
    let bytes = Uuid::new_v4().into_bytes();
    let tag: String = bytes
        .iter()
        .take(BUILD_TAG_LENGTH)
        .map(|b| char::from(b'a' + b % 26))
        .collect();
    ImageTag::new(tag)
}

/// Returns whether `tag` has the shape of an ephemeral build tag.
#[must_use]
pub fn is_ephemeral(tag: &str) -> bool {
    tag.len() == BUILD_TAG_LENGTH && tag.bytes().all(|b| b.is_ascii_lowercase())
}
