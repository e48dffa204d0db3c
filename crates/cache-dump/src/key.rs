//! Decomposition of composite keys into tag, path and revision.
//!
//! A key looks like `[tag]/path/segments[@revision]`. The tag is everything
//! before the first `/` of a key that does not start with `/`, the revision is
//! everything after the last `@` of the remaining path.
use std::borrow::Cow;

/// Replacement for delimiter characters found inside emitted fields.
pub const ESCAPE: char = '#';

/// Replace every `delimiter` in `s` with [`ESCAPE`]. Borrows when there is
/// nothing to replace.
pub fn escape(s: &str, delimiter: char) -> Cow<'_, str> {
    if s.contains(delimiter) {
        Cow::Owned(
            s.chars()
                .map(|c| if c == delimiter { ESCAPE } else { c })
                .collect(),
        )
    } else {
        Cow::Borrowed(s)
    }
}

fn escape_comma(s: &str) -> String {
    escape(s, ',').into_owned()
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodedKey {
    pub tag: String,
    pub path: String,
    pub revision: String,
}

/// Prefix filters applied while decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyFilter {
    pub path: String,
    pub revision: String,
}

impl KeyFilter {
    pub fn new(path: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            revision: revision.into(),
        }
    }

    /// A literal `/` matches every path, including ones without a leading
    /// slash. The empty filter matches everything through the prefix test.
    fn accepts_path(&self, remainder: &str) -> bool {
        self.path == "/" || remainder.starts_with(self.path.as_str())
    }

    fn accepts_revision(&self, revision: &str) -> bool {
        self.revision.is_empty() || revision.starts_with(self.revision.as_str())
    }
}

/// Split `key` into its tag and the remainder that holds path and revision.
///
/// The tag keeps its raw form; commas are replaced by [`decode`].
pub fn split_tag(key: &str) -> (&str, &str) {
    if !key.starts_with('/') {
        if let Some(i) = key.find('/').filter(|&i| i > 0) {
            return (&key[..i], &key[i..]);
        }
    }
    ("", key)
}

/// Split `remainder` at its last `@` into path and revision. An `@` at index 0
/// does not count as a revision marker.
pub fn split_revision(remainder: &str) -> (&str, &str) {
    match remainder.rfind('@').filter(|&i| i > 0) {
        Some(i) => (&remainder[..i], &remainder[i + 1..]),
        None => (remainder, ""),
    }
}

/// Decompose `key`, returning `None` when `filter` discards it.
///
/// Commas in every part are replaced with [`ESCAPE`]. The path filter is
/// matched against the raw remainder, the revision filter against the escaped
/// revision.
pub fn decode(key: &str, filter: &KeyFilter) -> Option<DecodedKey> {
    let (tag, remainder) = split_tag(key);
    if !filter.accepts_path(remainder) {
        return None;
    }

    let (path, revision) = split_revision(remainder);
    let revision = escape_comma(revision);
    if !filter.accepts_revision(&revision) {
        return None;
    }

    Some(DecodedKey {
        tag: escape_comma(tag),
        path: escape_comma(path),
        revision,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unfiltered(key: &str) -> DecodedKey {
        decode(key, &KeyFilter::default()).unwrap()
    }

    #[test]
    fn tag_extraction() {
        assert_eq!(split_tag("abc/def"), ("abc", "/def"));
        assert_eq!(split_tag("/def"), ("", "/def"));
        assert_eq!(split_tag("abc"), ("", "abc"));
        assert_eq!(split_tag(""), ("", ""));
        assert_eq!(split_tag("a/b/c"), ("a", "/b/c"));
    }

    #[test]
    fn revision_extraction() {
        assert_eq!(split_revision("/a/b@r1"), ("/a/b", "r1"));
        assert_eq!(split_revision("/a/b"), ("/a/b", ""));
        assert_eq!(split_revision("@r1"), ("@r1", ""));
        assert_eq!(split_revision("/a@x@y"), ("/a@x", "y"));
        assert_eq!(split_revision("/a@"), ("/a", ""));
    }

    #[test]
    fn full_decomposition() {
        assert_eq!(
            unfiltered("1/foo/bar@r7"),
            DecodedKey {
                tag: "1".into(),
                path: "/foo/bar".into(),
                revision: "r7".into(),
            }
        );
        assert_eq!(
            unfiltered("/foo"),
            DecodedKey {
                tag: "".into(),
                path: "/foo".into(),
                revision: "".into(),
            }
        );
    }

    #[test]
    fn slash_filter_keeps_everything() {
        let filter = KeyFilter::new("/", "");
        for key in ["abc", "@r1", "x/y@z", "/a/b", ""] {
            assert!(decode(key, &filter).is_some(), "{key} was discarded");
        }
    }

    #[test]
    fn empty_filter_differs_from_slash_prefix() {
        let empty = KeyFilter::default();
        assert!(decode("abc", &empty).is_some());
        // "abc" has no tag, so its remainder does not start with "/"
        let slash_prefix = KeyFilter::new("/a", "");
        assert!(decode("abc", &slash_prefix).is_none());
        assert!(decode("t/abc", &slash_prefix).is_some());
    }

    #[test]
    fn path_filter_is_case_sensitive_prefix() {
        let filter = KeyFilter::new("/foo", "");
        assert!(decode("1/foo/bar", &filter).is_some());
        assert!(decode("1/foobar", &filter).is_some());
        assert!(decode("1/Foo/bar", &filter).is_none());
        assert!(decode("/zzz", &filter).is_none());
    }

    #[test]
    fn path_filter_sees_the_revision_too() {
        let filter = KeyFilter::new("/a@r", "");
        assert!(decode("/a@r1", &filter).is_some());
    }

    #[test]
    fn revision_filter() {
        let filter = KeyFilter::new("", "r");
        assert_eq!(decode("1/foo@r7", &filter).unwrap().revision, "r7");
        assert!(decode("1/foo@x7", &filter).is_none());
        assert!(decode("1/foo", &filter).is_none());
    }

    #[test]
    fn commas_become_hashes() {
        let d = unfiltered("a,b/c,d@e,f");
        assert_eq!(d.tag, "a#b");
        assert_eq!(d.path, "/c#d");
        assert_eq!(d.revision, "e#f");
    }

    #[test]
    fn revision_filter_matches_escaped_revision() {
        let filter = KeyFilter::new("", "e#");
        assert!(decode("/c@e,f", &filter).is_some());
        let filter = KeyFilter::new("", "e,");
        assert!(decode("/c@e,f", &filter).is_none());
    }

    #[test]
    fn escape_borrows_clean_input() {
        assert!(matches!(escape("abc", '|'), Cow::Borrowed("abc")));
        assert_eq!(escape("a|b|c", '|'), "a#b#c");
        assert_eq!(escape("a,b", '|'), "a,b");
    }
}
