//! Turns a raw assistant reply into ordered reply segments.
//!
//! Completion text may embed images as markdown `![alt](url)` markers. Those
//! are cut out into image segments so a channel can send real media, with
//! the surrounding text preserved in order. Content blocks that are not
//! text pass through opaquely.

use mostrador_core::domain::reply::ReplySegment;

use crate::assistant::{AssistantReply, ContentItem};

pub fn render_reply(reply: &AssistantReply) -> Vec<ReplySegment> {
    let mut segments = Vec::new();
    for item in &reply.content {
        match item {
            ContentItem::Text { value } => split_image_markers(value, &mut segments),
            ContentItem::Other { kind, text } => segments.push(ReplySegment::Opaque {
                kind: kind.clone(),
                content: text.clone(),
            }),
        }
    }
    segments
}

/// Splits `text` on `![alt](url)` markers. The alt may be empty, the url
/// must not be. Anything that only looks like a marker stays text.
fn split_image_markers(text: &str, segments: &mut Vec<ReplySegment>) {
    let mut emitted = 0;
    let mut cursor = 0;

    while let Some(found) = text[cursor..].find("![") {
        let start = cursor + found;
        match parse_marker(&text[start..]) {
            Some(marker) => {
                if start > emitted {
                    segments.push(ReplySegment::text(&text[emitted..start]));
                }
                segments.push(ReplySegment::image(marker.url, marker.alt));
                emitted = start + marker.len;
                cursor = emitted;
            }
            // "![" without a well-formed tail; skip past it and keep
            // scanning.
            None => cursor = start + 2,
        }
    }

    if emitted < text.len() {
        segments.push(ReplySegment::text(&text[emitted..]));
    }
}

struct Marker<'a> {
    alt: &'a str,
    url: &'a str,
    len: usize,
}

// `candidate` starts with "![". Returns the parsed marker or None when the
// bracket structure never closes.
fn parse_marker(candidate: &str) -> Option<Marker<'_>> {
    let alt_end = candidate.find(']')?;
    let alt = &candidate[2..alt_end];

    let rest = &candidate[alt_end + 1..];
    if !rest.starts_with('(') {
        return None;
    }
    let url_end = rest.find(')')?;
    let url = &rest[1..url_end];
    if url.is_empty() {
        return None;
    }

    Some(Marker { alt, url, len: alt_end + 1 + url_end + 1 })
}
