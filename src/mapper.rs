//! Addressing: the pure function mapping `(object_id, extent_tag?)` to a
//! backend path (spec.md §4.5).

use sha1::{Digest, Sha1};

/// POSIX path length limit the mapper truncates to.
pub const MAX_PATH_BYTES: usize = 255;

/// `clean` replaces every byte outside `[A-Za-z0-9._-]` with `_`.
fn clean(input: &str) -> String {
    input
        .bytes()
        .map(|b| {
            let is_allowed = b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-');
            if is_allowed {
                b as char
            } else {
                '_'
            }
        })
        .collect()
}

/// Compute the backend path for `object_id`, optionally scoped by
/// `extent_tag`. Round-trip is not required: the caller stores the exact
/// address this returns.
pub fn map_path(object_id: &str, extent_tag: Option<&str>) -> String {
    let mut hasher = Sha1::new();
    hasher.update(object_id.as_bytes());
    hasher.update([0u8]);
    if let Some(tag) = extent_tag {
        hasher.update(tag.as_bytes());
    }
    let digest = hasher.finalize();
    let (h0, h1, h2, h3) = (digest[0], digest[1], digest[2], digest[3]);

    let prefix = format!("{h0:02x}/{h1:02x}/{h0:02x}{h1:02x}{h2:02x}{h3:02x}_");
    let suffix = extent_tag
        .map(|tag| format!(".{}", clean(tag)))
        .unwrap_or_default();

    let budget = MAX_PATH_BYTES
        .saturating_sub(prefix.len())
        .saturating_sub(suffix.len());
    let cleaned_id = clean(object_id);
    let tail = truncate_to_byte_budget(&cleaned_id, budget);

    format!("{prefix}{tail}{suffix}")
}

/// Truncate `s` to at most `budget` bytes without splitting a UTF-8
/// character (all output of `clean` is ASCII, so this is exact).
fn truncate_to_byte_budget(s: &str, budget: usize) -> &str {
    if s.len() <= budget {
        s
    } else {
        &s[..budget]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_has_two_level_fanout_and_prefix() {
        let path = map_path("my-object", None);
        let parts: Vec<&str> = path.split('/').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 2);
        assert_eq!(parts[1].len(), 2);
        assert!(parts[2].starts_with(&parts[0]));
        assert!(parts[2][2..].starts_with(parts[1]));
    }

    #[test]
    fn disallowed_characters_are_cleaned() {
        let path = map_path("my object/with:bad*chars", None);
        assert!(!path.contains(' '));
        assert!(!path.contains(':'));
        assert!(!path.contains('*'));
    }

    #[test]
    fn tag_is_appended_after_delimiter() {
        let path = map_path("obj", Some("data.0"));
        assert!(path.ends_with(".data.0"));
    }

    #[test]
    fn path_never_exceeds_posix_limit() {
        let long_id: String = std::iter::repeat('a').take(1000).collect();
        let path = map_path(&long_id, Some("parity.0"));
        assert!(path.len() <= MAX_PATH_BYTES);
    }

    #[test]
    fn distinct_ids_collide_only_after_truncation() {
        let a = map_path("object-one", Some("data.0"));
        let b = map_path("object-two", Some("data.0"));
        assert_ne!(a, b);
    }

    #[test]
    fn same_id_and_tag_map_identically() {
        let a = map_path("object-one", Some("data.0"));
        let b = map_path("object-one", Some("data.0"));
        assert_eq!(a, b);
    }
}
