/// URL decomposition used by preference rules and status pushes
use serde::{Deserialize, Serialize};

/// The pieces of a page URL that preference rules are matched against
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedUrl {
    pub domain: String,
    pub directory: String,
    pub url: String,
}

/// Split a URL into domain and directory
///
/// Algorithm:
/// 1. Split the URL on "/"
/// 2. The third segment (after "scheme:" and the empty segment) is the domain,
///    port included
/// 3. With more than four segments the last one is dropped to form the
///    directory; otherwise the directory is the whole URL
///
/// Examples:
/// - http://example.com/a/b.html → domain "example.com", directory "http://example.com/a"
/// - http://example.com/page → domain "example.com", directory "http://example.com/page"
/// - "" or "not a url" → empty domain and directory
pub fn parse_url(url: &str) -> ParsedUrl {
    let mut parsed = ParsedUrl {
        url: url.to_string(),
        ..ParsedUrl::default()
    };

    if !url.contains("://") {
        return parsed;
    }

    let mut segments: Vec<&str> = url.split('/').collect();

    if segments.len() > 2 {
        parsed.domain = segments[2].to_string();
    }

    if segments.len() > 4 {
        segments.pop();
    }

    parsed.directory = segments.join("/");
    parsed
}
