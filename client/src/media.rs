//! Media source classification.
//!
//! Which adapter drives a video is decided purely from its URL: file
//! extensions select native playback, hostnames select one of the embedded
//! backends.

use std::fmt;

use url::Url;

/// Extensions the native media element can play directly
const NATIVE_EXTENSIONS: &[&str] = &["mp4", "webm", "ogg", "ogv", "m4v", "mov"];

const YOUTUBE_HOSTS: &[&str] = &["youtube.com", "youtu.be", "youtube-nocookie.com"];

pub const OBRUT_HOSTS: &[&str] = &["obrut.show", "wparty.space", "hdvb.to", "kinobox.tv"];

/// Player.js hosts used for classification. The obrut.show CDN also speaks
/// Player.js but is classified as an obrut embed.
pub const PLAYERJS_HOSTS: &[&str] = &["short.gy", "cdnmovies.net", "vibix.me"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Plain video file played by a native media element
    NativeFile,
    /// YouTube, controlled through the embedded player SDK
    YouTube,
    /// Obrut-family frame speaking the `{api: ...}` message protocol
    ObrutEmbed,
    /// Frame speaking the Player.js `{method, value}` protocol
    PlayerJsEmbed,
    /// Third-party embed with no known control surface
    Unrecognized,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MediaKind::NativeFile => "native",
            MediaKind::YouTube => "youtube",
            MediaKind::ObrutEmbed => "obrut",
            MediaKind::PlayerJsEmbed => "playerjs",
            MediaKind::Unrecognized => "unrecognized",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource {
    pub url: String,
    pub kind: MediaKind,
}

impl MediaSource {
    /// Classify a URL. An empty URL means "no video".
    pub fn from_url(url: &str) -> Option<Self> {
        let url = url.trim();
        if url.is_empty() {
            return None;
        }
        Some(Self {
            url: url.to_string(),
            kind: classify(url),
        })
    }
}

/// Pure classification of a media URL
pub fn classify(url: &str) -> MediaKind {
    let parsed = Url::parse(url.trim()).ok();

    if let Some(host) = parsed.as_ref().and_then(|u| u.host_str()) {
        if host_in(host, YOUTUBE_HOSTS) {
            return MediaKind::YouTube;
        }
        if host_in(host, OBRUT_HOSTS) {
            return MediaKind::ObrutEmbed;
        }
        if host_in(host, PLAYERJS_HOSTS) {
            return MediaKind::PlayerJsEmbed;
        }
    }

    let path = match &parsed {
        Some(u) => u.path().to_string(),
        // Relative or bare paths are still playable files
        None => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };
    if has_native_extension(&path) {
        return MediaKind::NativeFile;
    }

    MediaKind::Unrecognized
}

/// Exact host or any subdomain of one of `domains`
pub fn host_in(host: &str, domains: &[&str]) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    domains.iter().any(|domain| {
        host == *domain
            || host
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

fn has_native_extension(path: &str) -> bool {
    let file = path.rsplit('/').next().unwrap_or(path);
    match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => NATIVE_EXTENSIONS
            .iter()
            .any(|allowed| ext.eq_ignore_ascii_case(allowed)),
        _ => false,
    }
}

/// Extract the 11-character video id from any of the usual YouTube URL shapes
pub fn youtube_video_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?;
    if !host_in(host, YOUTUBE_HOSTS) {
        return None;
    }

    let mut segments = parsed.path_segments()?.filter(|s| !s.is_empty());
    let candidate = if host_in(host, &["youtu.be"]) {
        segments.next().map(str::to_string)
    } else {
        match segments.next() {
            Some("watch") => parsed
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned()),
            Some("embed" | "shorts" | "live" | "v") => segments.next().map(str::to_string),
            _ => None,
        }
    }?;

    is_video_id(&candidate).then_some(candidate)
}

fn is_video_id(candidate: &str) -> bool {
    candidate.len() == 11
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_extension_and_host() {
        assert_eq!(classify("https://cdn.example.com/films/a.MP4"), MediaKind::NativeFile);
        assert_eq!(classify("/static/trailer.webm?t=3"), MediaKind::NativeFile);
        assert_eq!(
            classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            MediaKind::YouTube
        );
        assert_eq!(classify("https://youtu.be/dQw4w9WgXcQ"), MediaKind::YouTube);
        assert_eq!(
            classify("https://api.obrut.show/embed/movie/42"),
            MediaKind::ObrutEmbed
        );
        assert_eq!(classify("https://kinobox.tv/embed/1"), MediaKind::ObrutEmbed);
        assert_eq!(
            classify("https://player.cdnmovies.net/embed/9"),
            MediaKind::PlayerJsEmbed
        );
        assert_eq!(classify("https://vimeo.com/12345"), MediaKind::Unrecognized);
        assert_eq!(classify("https://example.com/watch"), MediaKind::Unrecognized);
    }

    #[test]
    fn lookalike_hosts_are_not_trusted() {
        assert!(!host_in("evilyoutube.com", YOUTUBE_HOSTS));
        assert!(!host_in("obrut.show.attacker.net", OBRUT_HOSTS));
        assert!(host_in("M.YouTube.com", YOUTUBE_HOSTS));
    }

    #[test]
    fn empty_url_means_no_source() {
        assert!(MediaSource::from_url("").is_none());
        assert!(MediaSource::from_url("   ").is_none());
        let source = MediaSource::from_url(" https://a.b/c.ogg ").unwrap();
        assert_eq!(source.url, "https://a.b/c.ogg");
        assert_eq!(source.kind, MediaKind::NativeFile);
    }

    #[test]
    fn extracts_youtube_ids() {
        assert_eq!(
            youtube_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=10").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            youtube_video_id("https://youtu.be/dQw4w9WgXcQ?si=abc").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            youtube_video_id("https://youtube.com/shorts/dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            youtube_video_id("https://www.youtube-nocookie.com/embed/dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(youtube_video_id("https://www.youtube.com/watch?v=short"), None);
        assert_eq!(youtube_video_id("https://example.com/watch?v=dQw4w9WgXcQ"), None);
    }
}
