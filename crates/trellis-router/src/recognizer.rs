//! Path pattern recognition.
//!
//! Patterns are `/`-separated segments: static text (matched without regard
//! to case), `:name` parameters, `:name?` optional parameters and a
//! `*name` wildcard that swallows one or more remaining segments.
//!
//! When several patterns match, the most specific wins. Segments are
//! compared left to right with static text ranking above parameters and
//! parameters above wildcards; the first registered pattern wins a full tie.

use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
    OptionalParam(String),
    Star(String),
}

impl Segment {
    fn parse(text: &str) -> Self {
        if let Some(name) = text.strip_prefix(':') {
            match name.strip_suffix('?') {
                Some(name) => Self::OptionalParam(name.to_string()),
                None => Self::Param(name.to_string()),
            }
        } else if let Some(name) = text.strip_prefix('*') {
            Self::Star(name.to_string())
        } else {
            Self::Static(text.to_lowercase())
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Static(_) => 3,
            Self::Param(_) | Self::OptionalParam(_) => 2,
            Self::Star(_) => 1,
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledPattern<T> {
    path: String,
    segments: Vec<Segment>,
    handler: T,
}

/// A successful recognition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizedRoute<T> {
    /// The handler registered with the pattern.
    pub handler: T,
    /// The pattern that matched.
    pub pattern: String,
    /// Extracted parameters.
    pub params: BTreeMap<String, String>,
    /// The part of the path before any wildcard, with a trailing `/` when a
    /// wildcard follows.
    pub matching: String,
}

/// Recognizes paths against registered patterns.
#[derive(Debug, Clone)]
pub struct RouteRecognizer<T> {
    patterns: Vec<CompiledPattern<T>>,
}

impl<T> Default for RouteRecognizer<T> {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct Attempt {
    params: BTreeMap<String, String>,
    ranks: Vec<u8>,
    before_star: Option<usize>,
}

impl<T: Clone> RouteRecognizer<T> {
    /// An empty recognizer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pattern.
    pub fn add(&mut self, pattern: &str, handler: T) {
        let segments = split(pattern).into_iter().map(Segment::parse).collect();
        self.patterns.push(CompiledPattern {
            path: pattern.to_string(),
            segments,
            handler,
        });
    }

    /// Number of registered patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether no pattern is registered.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The most specific match for `path`, if any.
    pub fn recognize(&self, path: &str) -> Option<RecognizedRoute<T>> {
        let path = path.split('?').next().unwrap_or_default();
        let parts = split(path);

        let mut best: Option<(&CompiledPattern<T>, Attempt)> = None;
        for pattern in &self.patterns {
            let mut attempt = Attempt::default();
            if !match_segments(&pattern.segments, &parts, 0, &mut attempt) {
                continue;
            }
            let better = match &best {
                None => true,
                Some((_, current)) => {
                    compare_ranks(&attempt.ranks, &current.ranks) == Ordering::Greater
                }
            };
            if better {
                best = Some((pattern, attempt));
            }
        }

        best.map(|(pattern, attempt)| {
            let matching = match attempt.before_star {
                Some(count) => parts[..count]
                    .iter()
                    .map(|part| format!("{part}/"))
                    .collect(),
                None => parts.join("/"),
            };
            RecognizedRoute {
                handler: pattern.handler.clone(),
                pattern: pattern.path.clone(),
                params: attempt.params,
                matching,
            }
        })
    }
}

fn split(path: &str) -> Vec<&str> {
    path.split('/').filter(|part| !part.is_empty()).collect()
}

fn compare_ranks(a: &[u8], b: &[u8]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        match x.cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

fn match_segments(
    segments: &[Segment],
    parts: &[&str],
    consumed: usize,
    attempt: &mut Attempt,
) -> bool {
    let Some((segment, rest)) = segments.split_first() else {
        return parts.is_empty();
    };

    match segment {
        Segment::Static(text) => {
            let Some((part, tail)) = parts.split_first() else {
                return false;
            };
            if part.to_lowercase() != *text {
                return false;
            }
            attempt.ranks.push(segment.rank());
            if match_segments(rest, tail, consumed + 1, attempt) {
                return true;
            }
            attempt.ranks.pop();
            false
        }
        Segment::Param(name) => {
            let Some((part, tail)) = parts.split_first() else {
                return false;
            };
            take_param(name, part, segment.rank(), rest, tail, consumed, attempt)
        }
        Segment::OptionalParam(name) => {
            if let Some((part, tail)) = parts.split_first()
                && take_param(name, part, segment.rank(), rest, tail, consumed, attempt)
            {
                return true;
            }
            match_segments(rest, parts, consumed, attempt)
        }
        Segment::Star(name) => {
            for taken in (1..=parts.len()).rev() {
                attempt.ranks.extend(std::iter::repeat_n(segment.rank(), taken));
                attempt.params.insert(name.clone(), parts[..taken].join("/"));
                attempt.before_star = Some(consumed);
                if match_segments(rest, &parts[taken..], consumed + taken, attempt) {
                    return true;
                }
                attempt.ranks.truncate(attempt.ranks.len() - taken);
                attempt.params.remove(name);
                attempt.before_star = None;
            }
            false
        }
    }
}

fn take_param(
    name: &str,
    part: &str,
    rank: u8,
    rest: &[Segment],
    tail: &[&str],
    consumed: usize,
    attempt: &mut Attempt,
) -> bool {
    attempt.ranks.push(rank);
    attempt.params.insert(name.to_string(), part.to_string());
    if match_segments(rest, tail, consumed + 1, attempt) {
        return true;
    }
    attempt.ranks.pop();
    attempt.params.remove(name);
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_wildcard_extraction() {
        let mut recognizer = RouteRecognizer::new();
        recognizer.add("/users", "list");
        recognizer.add("/users/:id", "user");
        recognizer.add("/users/:id/*rest", "nested");

        let found = recognizer.recognize("users/42/edit/now").unwrap();
        assert_eq!(found.handler, "nested");
        assert_eq!(found.params.get("id").map(String::as_str), Some("42"));
        assert_eq!(found.params.get("rest").map(String::as_str), Some("edit/now"));
        assert_eq!(found.matching, "users/42/");

        let found = recognizer.recognize("users/42").unwrap();
        assert_eq!(found.handler, "user");
        assert!(!found.params.contains_key("rest"));
        assert_eq!(recognizer.recognize("/users").unwrap().handler, "list");
    }

    #[test]
    fn test_static_beats_param_beats_star() {
        let mut recognizer = RouteRecognizer::new();
        recognizer.add("*all", "star");
        recognizer.add("users/:id", "param");
        recognizer.add("users/new", "static");

        assert_eq!(recognizer.recognize("users/new").unwrap().handler, "static");
        assert_eq!(recognizer.recognize("users/7").unwrap().handler, "param");
        assert_eq!(recognizer.recognize("other/7").unwrap().handler, "star");
    }

    #[test]
    fn test_optional_param() {
        let mut recognizer = RouteRecognizer::new();
        recognizer.add("posts/:page?", "posts");

        let without = recognizer.recognize("posts").unwrap();
        assert!(without.params.is_empty());
        let with = recognizer.recognize("/posts/3").unwrap();
        assert_eq!(with.params.get("page").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_static_is_case_insensitive_and_query_ignored() {
        let mut recognizer = RouteRecognizer::new();
        recognizer.add("Home", 1);
        assert_eq!(recognizer.recognize("home?tab=1").unwrap().handler, 1);
        assert!(recognizer.recognize("homes").is_none());
    }

    #[test]
    fn test_empty_pattern_matches_empty_path() {
        let mut recognizer = RouteRecognizer::new();
        recognizer.add("", "root");
        assert_eq!(recognizer.recognize("").unwrap().handler, "root");
        assert!(recognizer.recognize("x").is_none());
    }

    #[test]
    fn test_first_registered_wins_tie() {
        let mut recognizer = RouteRecognizer::new();
        recognizer.add(":a", "first");
        recognizer.add(":b", "second");
        assert_eq!(recognizer.recognize("x").unwrap().handler, "first");
    }

    proptest! {
        #[test]
        fn prop_star_collects_tail(
            head in proptest::collection::vec("[a-z]{1,6}", 1..4),
            tail in proptest::collection::vec("[a-z0-9]{1,6}", 1..5),
        ) {
            let mut recognizer = RouteRecognizer::new();
            recognizer.add(&format!("{}/*rest", head.join("/")), ());

            let path = format!("{}/{}", head.join("/"), tail.join("/"));
            let found = recognizer.recognize(&path).unwrap();

            prop_assert_eq!(found.params.get("rest").cloned(), Some(tail.join("/")));
            prop_assert_eq!(found.matching, format!("{}/", head.join("/")));
        }

        #[test]
        fn prop_static_route_wins(segments in proptest::collection::vec("[a-z]{1,6}", 1..5)) {
            let mut recognizer = RouteRecognizer::new();
            let params: Vec<String> = (0..segments.len()).map(|i| format!(":p{i}")).collect();
            recognizer.add(&params.join("/"), "param");
            recognizer.add(&segments.join("/"), "static");

            prop_assert_eq!(recognizer.recognize(&segments.join("/")).unwrap().handler, "static");
        }
    }
}
