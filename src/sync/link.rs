//! Links between List items and issues, stored in the List item's title.
//!
//! A linked title starts with a markdown link to the issue,
//! `[DX-12](https://acme.atlassian.net/browse/DX-12) Fix bug`. Only that
//! leading position is recognised, so link-like text elsewhere in a title never
//! creates a link.

use regex::Regex;
use std::sync::LazyLock;

static PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[([A-Z][A-Z0-9_]+-\d+)\]\((https?://[^)\s]+)\) ?")
        .expect("link prefix pattern is valid")
});

/// Reads and writes the counterpart key embedded in item text.
pub trait LinkCodec: Send + Sync {
    /// The embedded issue key, if the text carries a marker at its anchor.
    fn extract(&self, text: &str) -> Option<String>;
    /// The text without its marker.
    fn strip<'a>(&self, text: &'a str) -> &'a str;
    /// The text with its marker set to `key`, replacing any existing marker.
    fn embed(&self, text: &str, key: &str) -> String;
}

/// Embeds a markdown link to the issue at the start of the title.
pub struct TitleLinkCodec {
    base_url: String,
}

impl TitleLinkCodec {
    /// `base_url` is the issue tracker's site root without a trailing slash.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Length of the marker at the start of `text`, including the single
    /// separating space, when one is present.
    fn marker_len(text: &str) -> Option<(usize, &str)> {
        let caps = PREFIX.captures(text)?;
        let key = caps.get(1)?.as_str();
        let url = caps.get(2)?.as_str();
        if !url.ends_with(&format!("/browse/{key}")) {
            return None;
        }
        Some((caps.get(0)?.end(), key))
    }
}

impl LinkCodec for TitleLinkCodec {
    fn extract(&self, text: &str) -> Option<String> {
        Self::marker_len(text).map(|(_, key)| key.to_string())
    }

    fn strip<'a>(&self, text: &'a str) -> &'a str {
        match Self::marker_len(text) {
            Some((len, _)) => &text[len..],
            None => text,
        }
    }

    fn embed(&self, text: &str, key: &str) -> String {
        let rest = self.strip(text);
        let link = format!("[{key}]({}/browse/{key})", self.base_url);
        if rest.is_empty() {
            link
        } else {
            format!("{link} {rest}")
        }
    }
}
