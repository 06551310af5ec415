//! Image tag handling in paper descriptions.
//!
//! Descriptions reference figures with `<img relative/path.png>` tags. The
//! tags are rewritten to absolute paths before the text is shared with any
//! agent, and split into text/image segments for multimodal requests.

use std::sync::LazyLock;

use regex::Regex;

static IMG_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<img\s+([^<>]*?)\s*>").unwrap());

/// Piece of a description, in order of appearance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Image(&'a str),
}

/// Replace the path inside every image tag with `resolve(path)`.
pub fn rewrite_image_tags<F>(text: &str, mut resolve: F) -> String
where
    F: FnMut(&str) -> String,
{
    IMG_TAG_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            format!("<img {}>", resolve(&caps[1]))
        })
        .into_owned()
}

/// Paths referenced by image tags.
pub fn image_paths(text: &str) -> Vec<&str> {
    IMG_TAG_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .collect()
}

/// Split text into text and image segments. Empty text segments are skipped.
pub fn split_image_tags(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut cursor = 0;
    for caps in IMG_TAG_RE.captures_iter(text) {
        let (Some(whole), Some(path)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > cursor {
            segments.push(Segment::Text(&text[cursor..whole.start()]));
        }
        segments.push(Segment::Image(path.as_str()));
        cursor = whole.end();
    }
    if cursor < text.len() {
        segments.push(Segment::Text(&text[cursor..]));
    }
    segments
}
