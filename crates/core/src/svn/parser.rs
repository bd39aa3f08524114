//! Parsers for SVN XML output.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::{EntryStatus, InfoEntry, NodeKind, PropertyRecord, StatusEntry};
use crate::errors::SvnError;

/// One `<path>` element of `svn diff --summarize --xml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvnDiffEntry {
    pub item: EntryStatus,
    pub props: EntryStatus,
    pub kind: NodeKind,
    pub path: String,
}

pub fn parse_svn_info(xml: &str) -> Result<Vec<InfoEntry>, SvnError> {
    debug!("parsing svn info XML ({} bytes)", xml.len());
    let mut entries = Vec::new();
    for part in xml.split("<entry").skip(1) {
        let entry_xml = match part.find("</entry>") {
            Some(pos) => &part[..pos],
            None => part,
        };
        let header = match entry_xml.find('>') {
            Some(pos) => &entry_xml[..pos],
            None => continue,
        };
        let url = extract_tag_content(entry_xml, "url")
            .ok_or_else(|| SvnError::XmlParseError("missing <url> in svn info".into()))?;
        let root_url = extract_tag_content(entry_xml, "root").unwrap_or_default();
        let path = extract_attr_from_str(header, "path").map(|p| xml_unescape(&p)).unwrap_or_default();
        let kind = extract_attr_from_str(header, "kind")
            .map(|k| NodeKind::from_attr(&k))
            .unwrap_or(NodeKind::Unknown);
        let revision = extract_attr_from_str(header, "revision").and_then(|s| s.parse::<i64>().ok());
        let last_changed = extract_attribute(entry_xml, "commit", "revision")
            .and_then(|s| s.parse::<i64>().ok());
        let copy_from_url = extract_tag_content(entry_xml, "copy-from-url");
        let copy_from_rev = extract_tag_content(entry_xml, "copy-from-rev")
            .and_then(|s| s.parse::<i64>().ok());
        entries.push(InfoEntry {
            path,
            url,
            root_url,
            kind,
            revision,
            last_changed,
            copy_from_url,
            copy_from_rev,
        });
    }
    if entries.is_empty() {
        return Err(SvnError::XmlParseError("no <entry> in svn info".into()));
    }
    debug!(count = entries.len(), "parsed svn info entries");
    Ok(entries)
}

pub fn parse_svn_status(xml: &str) -> Result<Vec<StatusEntry>, SvnError> {
    debug!("parsing svn status XML ({} bytes)", xml.len());
    if !xml.contains("<status") {
        return Err(SvnError::XmlParseError("missing <status> element".into()));
    }
    let mut entries = Vec::new();
    for part in xml.split("<entry").skip(1) {
        let entry_xml = match part.find("</entry>") {
            Some(pos) => &part[..pos],
            None => continue,
        };
        let header = match entry_xml.find('>') {
            Some(pos) => &entry_xml[..pos],
            None => continue,
        };
        let path = match extract_attr_from_str(header, "path") {
            Some(p) => xml_unescape(&p),
            None => {
                warn!("skipping svn status entry without a path attribute");
                continue;
            }
        };
        let wc = element_header(entry_xml, "wc-status").unwrap_or_default();
        let repos = element_header(entry_xml, "repos-status").unwrap_or_default();
        let wc_status = extract_tag_block(entry_xml, "wc-status").unwrap_or_default();

        let mut entry = StatusEntry::new(
            PathBuf::from(path),
            status_attr(&wc, "item"),
            status_attr(&wc, "props"),
        );
        entry.revision = extract_attr_from_str(&wc, "revision").and_then(|s| s.parse::<i64>().ok());
        entry.last_changed = extract_attribute(&wc_status, "commit", "revision")
            .and_then(|s| s.parse::<i64>().ok());
        entry.copied = flag_attr(&wc, "copied");
        entry.switched = flag_attr(&wc, "switched");
        entry.tree_conflicted = flag_attr(&wc, "tree-conflicted");
        entry.locked = wc_status.contains("<lock");
        entry.repos_text_status = status_attr(&repos, "item");
        entry.repos_prop_status = status_attr(&repos, "props");
        if let Some(kind) = extract_attr_from_str(header, "kind") {
            entry.node_kind = NodeKind::from_attr(&kind);
        }
        entries.push(entry);
    }
    debug!(count = entries.len(), "parsed svn status entries");
    Ok(entries)
}

pub fn parse_svn_diff_summarize(xml: &str) -> Result<Vec<SvnDiffEntry>, SvnError> {
    debug!("parsing svn diff --summarize XML ({} bytes)", xml.len());
    let mut entries = Vec::new();
    for part in xml.split("<path ").skip(1) {
        let fragment = match part.find("</path>") {
            Some(pos) => &part[..pos],
            None => continue,
        };
        let (attrs, body) = match fragment.find('>') {
            Some(pos) => (&fragment[..pos], fragment[pos + 1..].trim()),
            None => continue,
        };
        let item = status_attr(attrs, "item");
        let props = status_attr(attrs, "props");
        let kind = extract_attr_from_str(attrs, "kind")
            .map(|k| NodeKind::from_attr(&k))
            .unwrap_or(NodeKind::Unknown);
        entries.push(SvnDiffEntry {
            item,
            props,
            kind,
            path: xml_unescape(body),
        });
    }
    debug!(count = entries.len(), "parsed svn diff entries");
    Ok(entries)
}

pub fn parse_svn_proplist(xml: &str) -> Result<Vec<PropertyRecord>, SvnError> {
    debug!("parsing svn proplist XML ({} bytes)", xml.len());
    if !xml.contains("<properties") {
        return Err(SvnError::XmlParseError("missing <properties> element".into()));
    }
    let mut props = Vec::new();
    for part in xml.split("<property").skip(1) {
        if part.starts_with('>') || part.starts_with("ies") {
            continue;
        }
        let (attrs, rest) = match part.find('>') {
            Some(pos) => (&part[..pos], &part[pos + 1..]),
            None => continue,
        };
        let Some(name) = extract_attr_from_str(attrs, "name") else {
            continue;
        };
        let value = if attrs.trim_end().ends_with('/') {
            String::new()
        } else {
            match rest.find("</property>") {
                Some(end) => xml_unescape(&rest[..end]),
                None => continue,
            }
        };
        props.push(PropertyRecord {
            name: xml_unescape(&name),
            value,
        });
    }
    debug!(count = props.len(), "parsed svn properties");
    Ok(props)
}

fn status_attr(attrs: &str, name: &str) -> EntryStatus {
    extract_attr_from_str(attrs, name)
        .map(|v| EntryStatus::from_item(&v))
        .unwrap_or(EntryStatus::None)
}

fn flag_attr(attrs: &str, name: &str) -> bool {
    extract_attr_from_str(attrs, name).as_deref() == Some("true")
}

/// Attribute text of the first `<tag ...>` element.
fn element_header(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}", tag);
    let start_pos = xml.find(&open)?;
    let after_tag = &xml[start_pos + open.len()..];
    let tag_end = after_tag.find('>')?;
    Some(after_tag[..tag_end].to_string())
}

/// Raw inner text of the first `<tag ...>...</tag>` element.
fn extract_tag_block(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);
    let start_pos = xml.find(&open)?;
    let after_open = &xml[start_pos + open.len()..];
    let content_start = after_open.find('>')? + 1;
    let content = &after_open[content_start..];
    let end_pos = content.find(&close).unwrap_or(0);
    Some(content[..end_pos].to_string())
}

fn extract_tag_content(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);
    let mut search_from = 0;
    while let Some(rel_pos) = xml[search_from..].find(&open) {
        let start_pos = search_from + rel_pos;
        let after_open = &xml[start_pos + open.len()..];
        // Next char must be '>' or whitespace, otherwise <url> would match <urlencoded>.
        if let Some(ch) = after_open.chars().next() {
            if ch != '>' && !ch.is_ascii_whitespace() {
                search_from = start_pos + open.len();
                continue;
            }
        }
        let content_start = match after_open.find('>') {
            Some(pos) => pos + 1,
            None => return None,
        };
        let content = &after_open[content_start..];
        let end_pos = content.find(&close)?;
        return Some(xml_unescape(content[..end_pos].trim()));
    }
    None
}

/// Unescape numeric character references and the standard XML entities.
fn xml_unescape(s: &str) -> String {
    decode_char_refs(s)
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Decode `&#NN;` and `&#xHH;`. Malformed references are kept verbatim.
fn decode_char_refs(s: &str) -> String {
    if !s.contains("&#") {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("&#") {
        out.push_str(&rest[..start]);
        let candidate = &rest[start + 2..];
        let decoded = candidate.find(';').and_then(|end| {
            let body = &candidate[..end];
            let code = match body.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => body.parse::<u32>().ok()?,
            };
            char::from_u32(code).map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &candidate[end + 1..];
            }
            None => {
                out.push_str("&#");
                rest = candidate;
            }
        }
    }
    out.push_str(rest);
    out
}

fn extract_attribute(xml: &str, tag: &str, attr: &str) -> Option<String> {
    let header = element_header(xml, tag)?;
    extract_attr_from_str(&header, attr)
}

fn extract_attr_from_str(s: &str, attr: &str) -> Option<String> {
    let pattern_dq = format!(" {}=\"", attr);
    let padded = format!(" {}", s.replace(['\n', '\r', '\t'], " "));
    if let Some(pos) = padded.find(&pattern_dq) {
        let after = &padded[pos + pattern_dq.len()..];
        let end = after.find('"')?;
        return Some(after[..end].to_string());
    }
    let pattern_sq = format!(" {}='", attr);
    if let Some(pos) = padded.find(&pattern_sq) {
        let after = &padded[pos + pattern_sq.len()..];
        let end = after.find('\'')?;
        return Some(after[..end].to_string());
    }
    None
}
