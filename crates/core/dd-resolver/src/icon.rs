use dd_common::types::UNGROUPED;

pub const ICON_CDN: &str = "https://cdn.jsdelivr.net/gh/walkxcode/dashboard-icons/png";

const FALLBACK_ICON: &str = "docker";

const IMAGE_EXTENSIONS: &[&str] = &[".png", ".svg", ".webp", ".jpg", ".jpeg", ".gif", ".ico"];

/// Icon URL for an entry: a full URL label is used verbatim, otherwise the
/// label (minus image extension) or the display name is turned into a CDN slug.
pub fn icon_url(icon_label: Option<&str>, display_name: &str) -> String {
    if let Some(label) = icon_label.filter(|l| is_absolute_url(l)) {
        return label.to_string();
    }

    let base = icon_label.map(strip_image_extension).unwrap_or(display_name);
    let base = if base.trim().eq_ignore_ascii_case(UNGROUPED) {
        FALLBACK_ICON
    } else {
        base
    };

    let mut slug = sanitize_icon_name(base);
    if slug.is_empty() {
        slug = FALLBACK_ICON.to_string();
    }
    format!("{ICON_CDN}/{slug}.png")
}

/// Lower-case, collapse whitespace/underscore runs into one hyphen, and drop
/// everything outside `[a-z0-9-]`.
pub fn sanitize_icon_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_separator = false;

    for c in raw.chars().flat_map(char::to_lowercase) {
        if c.is_whitespace() || c == '_' {
            if !in_separator {
                out.push('-');
                in_separator = true;
            }
            continue;
        }
        in_separator = false;
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
            out.push(c);
        }
    }
    out
}

fn is_absolute_url(value: &str) -> bool {
    let lower = value.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn strip_image_extension(name: &str) -> &str {
    for ext in IMAGE_EXTENSIONS {
        let Some(cut) = name.len().checked_sub(ext.len()) else {
            continue;
        };
        if name.is_char_boundary(cut) && name[cut..].eq_ignore_ascii_case(ext) {
            return &name[..cut];
        }
    }
    name
}
