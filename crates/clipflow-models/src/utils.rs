//! URL helpers.

use url::Url;

/// Host family of a source URL, used to group acquisition statistics.
///
/// `www.` and `m.` prefixes are stripped and `youtu.be` folds into
/// `youtube.com`. Unparseable URLs map to `unknown`.
pub fn url_family(raw: &str) -> String {
    let Ok(parsed) = Url::parse(raw.trim()) else {
        return "unknown".to_string();
    };
    let Some(host) = parsed.host_str() else {
        return "unknown".to_string();
    };

    let host = host.to_lowercase();
    let host = host
        .strip_prefix("www.")
        .or_else(|| host.strip_prefix("m."))
        .unwrap_or(&host);

    match host {
        "youtu.be" | "music.youtube.com" => "youtube.com".to_string(),
        "vm.tiktok.com" => "tiktok.com".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_family() {
        assert_eq!(url_family("https://www.youtube.com/watch?v=abc"), "youtube.com");
        assert_eq!(url_family("https://youtu.be/abc"), "youtube.com");
        assert_eq!(url_family("https://m.youtube.com/shorts/abc"), "youtube.com");
        assert_eq!(url_family("https://www.tiktok.com/@u/video/1"), "tiktok.com");
        assert_eq!(url_family("not a url"), "unknown");
    }
}
