//! provider link recognition and normalization for mega, google drive and pcloud
//!
//! nothing in here fails loudly, unknown shapes come back as `None` and the universal resolver
//! hands the original link back so playback can still try it
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::database::catalog::Provider;

const MEGA_HOSTS: &[&str] = &["mega.nz", "mega.co.nz"];
const DRIVE_HOSTS: &[&str] = &["drive.google.com", "googledrive.com"];
const PCLOUD_HOSTS: &[&str] = &[
    "pcloud.com",
    "my.pcloud.com",
    "e.pcloud.com",
    "u.pcloud.link",
    "e.pcloud.link",
    "pcloud.link",
    "filedn.com",
    "filedn.eu",
];
// these serve the raw file so an html5 <video> can play them
const PCLOUD_DIRECT_HOSTS: &[&str] = &["filedn.com", "filedn.eu"];

static MEGA_MODERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"mega\.(?:co\.)?nz/(file|folder|embed)/([A-Za-z0-9_-]+)(?:#([A-Za-z0-9_-]+))?")
        .expect("static mega regex")
});

// https://mega.nz/#!id!key and https://mega.nz/#F!id!key
static MEGA_LEGACY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"mega\.(?:co\.)?nz/#(F?)!([A-Za-z0-9_-]+)!([A-Za-z0-9_-]+)")
        .expect("static mega legacy regex")
});

static DRIVE_FILE_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/file/d/([A-Za-z0-9_-]+)").expect("static drive regex"));

static DRIVE_ID_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[?&]id=([A-Za-z0-9_-]+)").expect("static drive id regex"));

static DRIVE_FOLDER_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/folders/([A-Za-z0-9_-]+)").expect("static drive folder regex"));

static DRIVE_SHORT_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/d/([A-Za-z0-9_-]+)").expect("static drive short regex"));

static BARE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static bare id regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MegaLinkKind {
    File,
    Folder,
    Embed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MegaLink {
    pub kind: MegaLinkKind,
    pub id: String,
    pub key: Option<String>,
}

/// how the player is expected to consume a resolved url
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// plain file url, fine for an html5 video element
    Direct,
    /// has to go in an iframe
    Embed,
    /// internal /stream/?token= redirect
    Tokenized,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedLink {
    pub url: String,
    pub kind: StreamKind,
}

/// host of the link, lowercased, tolerating links pasted without a scheme
fn host_of(link: &str) -> Option<String> {
    let trimmed = link.trim();
    let parsed = url::Url::parse(trimmed)
        .or_else(|_| url::Url::parse(&format!("https://{}", trimmed)))
        .ok()?;
    parsed.host_str().map(|h| h.to_ascii_lowercase())
}

fn host_matches(host: &str, candidates: &[&str]) -> bool {
    candidates
        .iter()
        .any(|c| host == *c || host.ends_with(&format!(".{}", c)))
}

pub fn detect_provider(link: &str) -> Option<Provider> {
    let host = host_of(link)?;

    if host_matches(&host, MEGA_HOSTS) {
        Some(Provider::Mega)
    } else if host_matches(&host, DRIVE_HOSTS) {
        Some(Provider::Gdrive)
    } else if host_matches(&host, PCLOUD_HOSTS) {
        Some(Provider::Pcloud)
    } else {
        None
    }
}

pub fn parse_mega_link(link: &str) -> Option<MegaLink> {
    if let Some(caps) = MEGA_MODERN.captures(link) {
        let kind = match &caps[1] {
            "file" => MegaLinkKind::File,
            "folder" => MegaLinkKind::Folder,
            _ => MegaLinkKind::Embed,
        };
        return Some(MegaLink {
            kind,
            id: caps[2].to_string(),
            key: caps.get(3).map(|k| k.as_str().to_string()),
        });
    }

    MEGA_LEGACY.captures(link).map(|caps| MegaLink {
        kind: if caps[1].is_empty() {
            MegaLinkKind::File
        } else {
            MegaLinkKind::Folder
        },
        id: caps[2].to_string(),
        key: Some(caps[3].to_string()),
    })
}

/// a playable mega file needs both the id and the decryption key
pub fn is_mega_file_link(link: &str) -> bool {
    matches!(
        parse_mega_link(link),
        Some(MegaLink {
            kind: MegaLinkKind::File | MegaLinkKind::Embed,
            key: Some(_),
            ..
        })
    )
}

pub fn is_mega_folder_link(link: &str) -> bool {
    link.contains("mega.nz/folder/") || link.contains("mega.co.nz/folder/") || link.contains("#F!")
}

/// (id, key) of a playable mega file
pub fn mega_id_and_key(link: &str) -> Option<(String, String)> {
    match parse_mega_link(link)? {
        MegaLink {
            kind: MegaLinkKind::File | MegaLinkKind::Embed,
            id,
            key: Some(key),
        } => Some((id, key)),
        _ => None,
    }
}

pub fn build_mega_url(id: &str, key: &str) -> String {
    format!("https://mega.nz/file/{}#{}", id, key)
}

pub fn mega_embed_url(id: &str, key: &str) -> String {
    format!("https://mega.nz/embed/{}#{}", id, key)
}

pub fn extract_drive_file_id(link: &str) -> Option<String> {
    DRIVE_FILE_PATH
        .captures(link)
        .or_else(|| DRIVE_ID_PARAM.captures(link))
        .map(|caps| caps[1].to_string())
}

/// accepts a folder url, an `id=` link, a `/d/` link or a bare id
pub fn extract_drive_folder_id(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if BARE_ID.is_match(input) {
        return Some(input.to_string());
    }

    DRIVE_FOLDER_PATH
        .captures(input)
        .or_else(|| DRIVE_ID_PARAM.captures(input))
        .or_else(|| DRIVE_SHORT_PATH.captures(input))
        .map(|caps| caps[1].to_string())
}

pub fn build_drive_url(file_id: &str) -> String {
    format!("https://drive.google.com/file/d/{}/view", file_id)
}

pub fn drive_preview_url(file_id: &str) -> String {
    format!("https://drive.google.com/file/d/{}/preview", file_id)
}

pub fn is_pcloud_link(link: &str) -> bool {
    host_of(link).is_some_and(|host| host_matches(&host, PCLOUD_HOSTS))
}

pub fn is_pcloud_direct_link(link: &str) -> bool {
    host_of(link).is_some_and(|host| host_matches(&host, PCLOUD_DIRECT_HOSTS))
}

pub fn build_pcloud_url(code: &str) -> String {
    format!("https://u.pcloud.link/publink/show?code={}", code)
}

/// best playable url for the provider, falls back to the raw link on anything unexpected
pub fn universal_stream_url(link: &str, provider: Provider) -> ResolvedLink {
    let fallback = || ResolvedLink {
        url: link.to_string(),
        kind: StreamKind::Embed,
    };

    match provider {
        Provider::Mega => match mega_id_and_key(link) {
            Some((id, key)) => ResolvedLink {
                url: mega_embed_url(&id, &key),
                kind: StreamKind::Embed,
            },
            None => {
                warn!("mega link without id/key, passing it through: {}", link);
                fallback()
            }
        },
        Provider::Gdrive => match extract_drive_file_id(link) {
            Some(id) => ResolvedLink {
                url: drive_preview_url(&id),
                kind: StreamKind::Embed,
            },
            None => {
                warn!("drive link without a file id, passing it through: {}", link);
                fallback()
            }
        },
        // share links are not rewritten, they only work embedded
        Provider::Pcloud if is_pcloud_direct_link(link) => ResolvedLink {
            url: link.to_string(),
            kind: StreamKind::Direct,
        },
        Provider::Pcloud => fallback(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_suffix_does_not_match_lookalikes() {
        assert!(host_matches("www.mega.nz", MEGA_HOSTS));
        assert!(!host_matches("notmega.nz", MEGA_HOSTS));
    }

    #[test]
    fn schemeless_links_still_have_a_host() {
        assert_eq!(host_of("mega.nz/file/abc#def").as_deref(), Some("mega.nz"));
        assert_eq!(host_of("   "), None);
    }
}
