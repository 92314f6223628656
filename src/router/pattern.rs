/// One segment of a normalized route pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Segment {
    Static(Box<str>),
    Param(Box<str>),
    Wildcard,
}

/// A parsed, normalized route pattern - the segment sequence `register`
/// inserts into the radix tree.
#[derive(Clone, Debug)]
pub(crate) struct Pattern {
    pub(crate) raw: Box<str>,
    pub(crate) segments: Vec<Segment>,
}

impl Pattern {
    /// Parses and normalizes `path` into a [`Pattern`].
    ///
    /// Leading `/` is optional; trailing `/` is trimmed unless `path` is
    /// exactly `/`. `:name` denotes a named one-segment parameter; a bare
    /// `*` as the last segment denotes a wildcard. Segments are lowercased
    /// when `case_sensitive` is `false`.
    pub(crate) fn parse(path: &str, case_sensitive: bool) -> Result<Self, &'static str> {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let trimmed = if trimmed.len() > 1 {
            trimmed.strip_suffix('/').unwrap_or(trimmed)
        } else {
            trimmed
        };

        let mut segments = Vec::new();
        if !trimmed.is_empty() {
            let parts: Vec<&str> = trimmed.split('/').collect();
            let last = parts.len() - 1;
            for (i, part) in parts.into_iter().enumerate() {
                if part.is_empty() {
                    return Err("empty path segment");
                }
                let segment = if part == "*" {
                    if i != last {
                        return Err("wildcard must be the final segment");
                    }
                    Segment::Wildcard
                } else if let Some(name) = part.strip_prefix(':') {
                    if name.is_empty() {
                        return Err("named parameter is missing a name");
                    }
                    Segment::Param(normalize(name, case_sensitive).into())
                } else {
                    Segment::Static(normalize(part, case_sensitive).into())
                };
                segments.push(segment);
            }
        }

        let raw = normalize_path(trimmed, case_sensitive).into();
        Ok(Pattern { raw, segments })
    }

    /// Splits a lookup path into its normalized segments. An empty/root
    /// path yields no segments.
    pub(crate) fn split_path(path: &str, case_sensitive: bool) -> Vec<String> {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let trimmed = if trimmed.len() > 1 {
            trimmed.strip_suffix('/').unwrap_or(trimmed)
        } else {
            trimmed
        };
        if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed
                .split('/')
                .map(|s| normalize(s, case_sensitive))
                .collect()
        }
    }
}

fn normalize(segment: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        segment.to_owned()
    } else {
        segment.to_lowercase()
    }
}

fn normalize_path(trimmed: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        format!("/{trimmed}")
    } else {
        format!("/{}", trimmed.to_lowercase())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_static() {
        let p = Pattern::parse("/users", true).unwrap();
        assert_eq!(p.segments, vec![Segment::Static("users".into())]);
    }

    #[test]
    fn parse_param() {
        let p = Pattern::parse("/users/:id", true).unwrap();
        assert_eq!(
            p.segments,
            vec![
                Segment::Static("users".into()),
                Segment::Param("id".into())
            ]
        );
    }

    #[test]
    fn parse_wildcard() {
        let p = Pattern::parse("/a/*", true).unwrap();
        assert_eq!(
            p.segments,
            vec![Segment::Static("a".into()), Segment::Wildcard]
        );
    }

    #[test]
    fn wildcard_must_be_last() {
        assert!(Pattern::parse("/a/*/b", true).is_err());
    }

    #[test]
    fn empty_segment_rejected() {
        assert!(Pattern::parse("/a//b", true).is_err());
    }

    #[test]
    fn trailing_slash_ignored() {
        let a = Pattern::parse("/users/", true).unwrap();
        let b = Pattern::parse("/users", true).unwrap();
        assert_eq!(a.segments, b.segments);
    }

    #[test]
    fn case_insensitive_normalizes() {
        let p = Pattern::parse("/Users/:ID", false).unwrap();
        assert_eq!(
            p.segments,
            vec![
                Segment::Static("users".into()),
                Segment::Param("id".into())
            ]
        );
    }
}
