use std::collections::HashSet;

use htmlescape::decode_html;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use textwrap::{Options, WordSeparator, WrapAlgorithm};

pub const ELLIPSIS: char = '\u{2026}';

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(?:#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z][a-zA-Z0-9]{1,31});").unwrap());
static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?([a-zA-Z][a-zA-Z0-9]*)\b[^>]*>").unwrap());
static TAG_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-zA-Z][a-zA-Z0-9]*").unwrap());

/// Tag names that survive cleanup. Accepts `<p><a>` as well as `p, a`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedTags(HashSet<String>);

impl AllowedTags {
    pub fn parse(list: &str) -> Self {
        Self(
            TAG_NAME
                .find_iter(list)
                .map(|m| m.as_str().to_lowercase())
                .collect(),
        )
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(&tag.to_lowercase())
    }
}

/// How HTML in a teaser is treated.
#[derive(Debug, Clone, Copy)]
pub enum TeaserPolicy<'a> {
    /// Remove every tag, then cut at a word boundary when longer than
    /// `truncate` characters. Zero disables truncation.
    Strip { truncate: usize },
    /// Keep the listed tags, never truncate.
    AllowList(&'a AllowedTags),
}

/// Cleans a feed description into teaser text.
pub fn normalize_teaser(raw: &str, policy: TeaserPolicy<'_>) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let collapsed = WHITESPACE.replace_all(raw, " ");
    let decoded = decode_entities(&collapsed);

    match policy {
        TeaserPolicy::Strip { truncate } => {
            let plain = strip_tags(&decoded, None);
            truncate_at_word(plain.trim(), truncate)
        }
        TeaserPolicy::AllowList(allowed) => strip_tags(&decoded, Some(allowed)),
    }
}

/// Cleans full item content for a body block: entities decoded, tags outside
/// the allow-list removed, whitespace left alone.
pub fn clean_body(raw: &str, allowed: &AllowedTags) -> String {
    strip_tags(&decode_entities(raw), Some(allowed))
}

/// Decodes named and numeric entities. Unknown entities are kept verbatim.
pub fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures| {
            let entity = &caps[0];
            decode_html(entity).unwrap_or_else(|_| entity.to_string())
        })
        .into_owned()
}

/// Removes HTML tags and comments, keeping tags named in `allowed`.
pub fn strip_tags(html: &str, allowed: Option<&AllowedTags>) -> String {
    let without_comments = COMMENT.replace_all(html, "");
    TAG.replace_all(&without_comments, |caps: &Captures| match allowed {
        Some(allowed) if allowed.contains(&caps[1]) => caps[0].to_string(),
        _ => String::new(),
    })
    .into_owned()
}

/// Keeps the first line of a greedy word wrap at `limit` columns and appends
/// an ellipsis. Words are never split, so a first word longer than the limit
/// is kept whole.
pub fn truncate_at_word(text: &str, limit: usize) -> String {
    if limit == 0 || text.chars().count() <= limit {
        return text.to_string();
    }

    let options = Options::new(limit)
        .break_words(false)
        .word_separator(WordSeparator::AsciiSpace)
        .wrap_algorithm(WrapAlgorithm::FirstFit);
    let lines = textwrap::wrap(text, options);
    let first = lines.first().map(|line| line.trim_end()).unwrap_or_default();

    format!("{first}{ELLIPSIS}")
}

/// Lowercase, dash separated form of `text` for use in aliases and filenames.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for ch in decode_entities(text).chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}
