use crate::CrawlError;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

/// Separator used to join the tags of an AND-group into an output key
pub const TAG_SEPARATOR: &str = "_AND_";

/// One crawl unit: a non-empty set of hashtags
///
/// A target with one tag is a plain hashtag crawl; more than one tag forms an
/// AND-group where every emitted post must carry all of them. Tags are stored
/// lower-cased, without a leading `#`, sorted and deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    tags: Vec<String>,
}

impl Target {
    /// Builds a target from raw tag strings
    ///
    /// # Returns
    ///
    /// * `Ok(Target)` - At least one valid tag was given
    /// * `Err(CrawlError::InvalidTarget)` - A tag was empty or malformed, or no tags were given
    pub fn new<I, S>(tags: I) -> Result<Self, CrawlError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized = BTreeSet::new();
        for raw in tags {
            normalized.insert(normalize_tag(raw.as_ref())?);
        }

        if normalized.is_empty() {
            return Err(CrawlError::InvalidTarget(
                "a target needs at least one hashtag".to_string(),
            ));
        }

        Ok(Self {
            tags: normalized.into_iter().collect(),
        })
    }

    /// Builds a single-tag target
    pub fn single(tag: &str) -> Result<Self, CrawlError> {
        Self::new([tag])
    }

    /// Parses a target from one line of user input
    ///
    /// Tags separated by `+`, `,` or whitespace form an AND-group, so
    /// `food+pizza`, `#food, #pizza` and `food pizza` are the same target.
    pub fn parse(line: &str) -> Result<Self, CrawlError> {
        let parts: Vec<&str> = line
            .split(|c: char| c == '+' || c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .collect();
        Self::new(parts)
    }

    /// Returns the tags in ascending order
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns the number of tags
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Returns true if the target has no tags, which construction rules out
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Returns true if this target requires more than one tag
    pub fn is_and_group(&self) -> bool {
        self.tags.len() > 1
    }

    /// Returns true if the given (normalized) tag is part of this target
    pub fn contains(&self, tag: &str) -> bool {
        self.tags.binary_search_by(|t| t.as_str().cmp(tag)).is_ok()
    }

    /// Derived output key: tags sorted ascending, joined with `_AND_`
    pub fn key(&self) -> String {
        self.tags.join(TAG_SEPARATOR)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.tags.iter().map(|t| format!("#{}", t)).collect();
        write!(f, "{}", rendered.join(" + "))
    }
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\w+$").expect("tag pattern is valid"))
}

/// Normalizes a hashtag: trims, strips leading `#` and lower-cases
///
/// Only word characters are accepted, the same class caption hashtags are
/// extracted with. The tag ends up in request paths and file names, so
/// anything else (`/`, `.`, `?`, an inner `#`) is rejected.
pub fn normalize_tag(raw: &str) -> Result<String, CrawlError> {
    let tag = raw.trim().trim_start_matches('#').trim().to_lowercase();
    if tag.is_empty() {
        return Err(CrawlError::InvalidTarget(format!("empty hashtag '{}'", raw)));
    }
    if !tag_pattern().is_match(&tag) {
        return Err(CrawlError::InvalidTarget(format!(
            "hashtag '{}' may only contain letters, digits and underscores",
            raw.trim()
        )));
    }
    Ok(tag)
}

/// Parses a target list, one target per line
///
/// Blank lines and lines starting with `#` followed by a space (or nothing)
/// are skipped, so `# comment` is a comment while `#food` is a hashtag.
/// Targets repeated in the list are kept once, in first-seen order.
pub fn parse_target_list(content: &str) -> Result<Vec<Target>, CrawlError> {
    let mut targets: Vec<Target> = Vec::new();

    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line == "#" || line.starts_with("# ") || line.starts_with("//") {
            continue;
        }

        let target = Target::parse(line).map_err(|e| match e {
            CrawlError::InvalidTarget(message) => {
                CrawlError::InvalidTarget(format!("line {}: {}", number + 1, message))
            }
            other => other,
        })?;
        if !targets.contains(&target) {
            targets.push(target);
        }
    }

    Ok(targets)
}
