use dd_common::types::{DisplayEntry, EnvironmentRef, UNGROUPED};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::icon::icon_url;

/// Parse the static bookmark list, a JSON array of
/// `{name, url, icon?, group?}`. Invalid entries are skipped one by one;
/// a value that is not an array yields no bookmarks at all.
pub fn parse_bookmarks(raw: &str) -> Vec<DisplayEntry> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    let items = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items,
        Ok(_) => {
            warn!("Bookmark configuration is not a JSON array, ignoring it");
            return Vec::new();
        }
        Err(e) => {
            warn!("Bookmark configuration is not valid JSON, ignoring it: {e}");
            return Vec::new();
        }
    };

    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let entry = bookmark_entry(item);
            if entry.is_none() {
                warn!(index, "Skipping bookmark without name or url");
            }
            entry
        })
        .collect()
}

fn bookmark_entry(item: &Value) -> Option<DisplayEntry> {
    let field = |key: &str| {
        item.get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let name = field("name")?;
    let url = field("url")?;
    let icon = field("icon");

    Some(DisplayEntry {
        id: bookmark_id(name, url),
        display_name: name.to_string(),
        group: field("group").unwrap_or(UNGROUPED).to_string(),
        environment_ref: EnvironmentRef::bookmark(),
        url: url.to_string(),
        icon: icon.map(String::from),
        icon_url: icon_url(icon, name),
        image: String::new(),
    })
}

/// Stable across restarts for the same `(name, url)`.
fn bookmark_id(name: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update([0u8]);
    hasher.update(url.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("bookmark-{}", &digest[..16])
}
