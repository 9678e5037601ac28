//! The default markdown [`FormatReader`] (§4.1).
//!
//! Frontmatter is a leading `---`-delimited YAML block. Reserved keys `id`,
//! `title`, `tags` are lifted out; everything else is copied verbatim into
//! `properties`. The body is scanned for wiki-links via pulldown-cmark's
//! streaming event API with `ENABLE_WIKILINKS`; links inside fenced code
//! blocks or inline code spans never reach the event stream as link events,
//! so they're excluded for free.

use std::collections::BTreeMap;

use pulldown_cmark::{Event, LinkType, Options, Parser, Tag};
use serde_json::Value as JsonValue;
use serde_yaml::Value as YamlValue;

use crate::error::RouxError;

use super::{FormatReader, ParsedFile};

pub static MARKDOWN_READER: MarkdownReader = MarkdownReader;

pub struct MarkdownReader;

fn md_options() -> Options {
    let mut opts = Options::empty();
    opts.insert(Options::ENABLE_WIKILINKS);
    opts.insert(Options::ENABLE_TABLES);
    opts.insert(Options::ENABLE_STRIKETHROUGH);
    opts.insert(Options::ENABLE_TASKLISTS);
    opts.insert(Options::ENABLE_FOOTNOTES);
    opts
}

/// Split `raw` into `(frontmatter_yaml, body)`. Returns `None` frontmatter
/// if there's no leading `---` block, or if it's malformed (per §4.1,
/// malformed frontmatter never fails parsing — it just falls back to empty).
fn split_frontmatter(raw: &str) -> (Option<&str>, &str) {
    let Some(rest) = raw.strip_prefix("---") else {
        return (None, raw);
    };
    // allow an optional newline right after the opening fence
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    let Some(end) = rest.find("\n---") else {
        return (None, raw);
    };
    let frontmatter = &rest[..end];
    let after_fence = &rest[end + 4..];
    let body = after_fence.strip_prefix('\n').unwrap_or(after_fence);
    (Some(frontmatter), body)
}

fn yaml_to_json(value: YamlValue) -> JsonValue {
    serde_json::to_value(value).unwrap_or(JsonValue::Null)
}

fn json_to_yaml(value: &JsonValue) -> YamlValue {
    serde_yaml::to_value(value).unwrap_or(YamlValue::Null)
}

fn extract_wikilinks(body: &str) -> Vec<String> {
    let parser = Parser::new_ext(body, md_options());
    let mut targets = Vec::new();
    let mut seen = std::collections::BTreeSet::new();
    for event in parser {
        if let Event::Start(Tag::Link {
            link_type: LinkType::WikiLink { .. },
            dest_url,
            ..
        }) = event
        {
            let target = dest_url.into_string();
            if seen.insert(target.clone()) {
                targets.push(target);
            }
        }
    }
    targets
}

impl FormatReader for MarkdownReader {
    fn parse(&self, raw: &[u8]) -> Result<ParsedFile, RouxError> {
        let text = String::from_utf8_lossy(raw);
        let (frontmatter_src, body) = split_frontmatter(&text);

        let mut id = None;
        let mut title = None;
        let mut tags = Vec::new();
        let mut properties = BTreeMap::new();

        if let Some(fm) = frontmatter_src {
            if let Ok(YamlValue::Mapping(map)) = serde_yaml::from_str::<YamlValue>(fm) {
                for (key, value) in map {
                    let Some(key) = key.as_str() else { continue };
                    match key {
                        "id" => {
                            id = value.as_str().map(|s| s.to_string());
                        }
                        "title" => {
                            title = value.as_str().map(|s| s.to_string());
                        }
                        "tags" => {
                            if let YamlValue::Sequence(seq) = &value {
                                tags = seq
                                    .iter()
                                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                                    .collect();
                            }
                        }
                        other => {
                            properties.insert(other.to_string(), yaml_to_json(value));
                        }
                    }
                }
            }
            // malformed frontmatter: fields stay empty, body preserved verbatim
        }

        let raw_link_targets = extract_wikilinks(body);

        Ok(ParsedFile {
            id,
            title,
            tags,
            properties,
            content: body.to_string(),
            raw_link_targets,
        })
    }

    fn write_id(&self, raw: &[u8], id: &str) -> Result<Vec<u8>, RouxError> {
        let text = String::from_utf8_lossy(raw);
        let (frontmatter_src, body) = split_frontmatter(&text);

        let mut map = match frontmatter_src {
            Some(fm) => match serde_yaml::from_str::<YamlValue>(fm) {
                Ok(YamlValue::Mapping(m)) => m,
                _ => serde_yaml::Mapping::new(),
            },
            None => serde_yaml::Mapping::new(),
        };
        map.insert(YamlValue::String("id".to_string()), YamlValue::String(id.to_string()));

        let new_fm = serde_yaml::to_string(&YamlValue::Mapping(map))?;
        let new_fm = new_fm.trim_end();
        Ok(format!("---\n{new_fm}\n---\n{body}").into_bytes())
    }
}

/// Serialize a [`super::ParsedFile`]'s reserved fields back into a
/// frontmatter block, used by node creation (§4.8.4).
pub fn render_frontmatter(
    id: &str,
    title: &str,
    tags: &[String],
    properties: &BTreeMap<String, JsonValue>,
) -> Result<String, RouxError> {
    let mut map = serde_yaml::Mapping::new();
    map.insert(YamlValue::String("id".to_string()), YamlValue::String(id.to_string()));
    map.insert(
        YamlValue::String("title".to_string()),
        YamlValue::String(title.to_string()),
    );
    if !tags.is_empty() {
        map.insert(
            YamlValue::String("tags".to_string()),
            YamlValue::Sequence(tags.iter().map(|t| YamlValue::String(t.clone())).collect()),
        );
    }
    for (k, v) in properties {
        map.insert(YamlValue::String(k.clone()), json_to_yaml(v));
    }
    let body = serde_yaml::to_string(&YamlValue::Mapping(map))?;
    Ok(body.trim_end().to_string())
}
