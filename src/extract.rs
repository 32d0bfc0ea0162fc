use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use url::Url;

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{FrameSelection, SequenceType};

static ANCHOR_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
        .expect("anchor regex")
});
static PRE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<pre[^>]*>(.*?)</pre\s*>").expect("pre regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex"));
static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").expect("entity regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentLink {
    pub url: Url,
    pub segment_name: String,
}

/// Collects GENElect segment links from a listing page, in page order.
///
/// A link qualifies when its `query` parameter reads `<frame code> <segment>`,
/// the code matches `frame`, and the segment belongs to `sequence_type`'s
/// locus. The first link per segment wins.
pub fn extract_links(
    html: &str,
    page_url: &Url,
    sequence_type: SequenceType,
    frame: FrameSelection,
    sink: &dyn ProgressSink,
) -> Vec<SegmentLink> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for caps in ANCHOR_HREF.captures_iter(html) {
        let Some(raw) = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)) else {
            continue;
        };
        let href = decode_entities(raw.as_str().trim());
        let Ok(url) = page_url.join(&href) else {
            sink.event(ProgressEvent::debug(format!("extract.skip unparsable href={href}")));
            continue;
        };
        let Some(query) = url
            .query_pairs()
            .find(|(key, _)| key == "query")
            .map(|(_, value)| value.into_owned())
        else {
            continue;
        };
        let Some((code, segment)) = query.trim().split_once(char::is_whitespace) else {
            continue;
        };
        let segment = segment.trim();
        if code != frame.query_code() || !segment.starts_with(sequence_type.locus_prefix()) {
            continue;
        }
        if !is_safe_segment_name(segment) {
            sink.event(ProgressEvent::warn(format!(
                "skipping link with unusable segment name {segment:?}"
            )));
            continue;
        }
        if !seen.insert(segment.to_string()) {
            continue;
        }
        links.push(SegmentLink {
            url,
            segment_name: segment.to_string(),
        });
    }

    links
}

/// Returns the first `<pre>` block that holds FASTA text, tags stripped and
/// entities decoded.
pub fn extract_fasta(html: &str) -> Option<String> {
    PRE_BLOCK.captures_iter(html).find_map(|caps| {
        let inner = caps.get(1)?.as_str();
        let stripped = TAG.replace_all(inner, "");
        let text = decode_entities(&stripped);
        let text = text.trim();
        text.contains('>').then(|| text.to_string())
    })
}

fn is_safe_segment_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}

pub fn decode_entities(text: &str) -> Cow<'_, str> {
    ENTITY.replace_all(text, |caps: &Captures<'_>| {
        let name = &caps[1];
        let decoded = if let Some(hex) = name
            .strip_prefix("#x")
            .or_else(|| name.strip_prefix("#X"))
        {
            u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
        } else if let Some(dec) = name.strip_prefix('#') {
            dec.parse::<u32>().ok().and_then(char::from_u32)
        } else {
            match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => None,
            }
        };
        decoded
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    })
}
