const PASS_THROUGH_PREFIXES: [&str; 5] = ["blob:", "data:", "http://", "https://", "//"];

pub fn is_absolute_url(url: &str) -> bool {
    PASS_THROUGH_PREFIXES
        .iter()
        .any(|prefix| url.starts_with(prefix))
}

/// `base_url + path + url` for relative urls; absolute urls pass through.
pub fn resolve_url(base_url: &str, path: &str, url: &str) -> String {
    if is_absolute_url(url) {
        return url.to_string();
    }
    format!("{base_url}{path}{url}")
}

/// Lowercased extension without the dot, ignoring query and fragment.
pub fn url_extension(url: &str) -> Option<String> {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let file_name = without_query.rsplit('/').next().unwrap_or(without_query);
    let (_, extension) = file_name.rsplit_once('.')?;
    if extension.is_empty() {
        return None;
    }
    Some(extension.to_ascii_lowercase())
}

/// First candidate whose extension is supported. `blob:` and `data:` urls are
/// accepted as-is.
pub fn pick_supported_url<'a>(candidates: &'a [String], supported: &[String]) -> Option<&'a str> {
    candidates.iter().map(String::as_str).find(|candidate| {
        if candidate.starts_with("blob:") || candidate.starts_with("data:") {
            return true;
        }
        url_extension(candidate).is_some_and(|extension| {
            supported
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(&extension))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_urls_get_base_and_path() {
        assert_eq!(
            resolve_url("https://cdn.example/", "img/", "a.png"),
            "https://cdn.example/img/a.png"
        );
        assert_eq!(resolve_url("", "", "a.png"), "a.png");
    }

    #[test]
    fn absolute_urls_pass_through() {
        for url in [
            "http://x/a.png",
            "https://x/a.png",
            "//x/a.png",
            "data:image/png;base64,AAAA",
            "blob:abc",
        ] {
            assert_eq!(resolve_url("base/", "path/", url), url);
        }
    }

    #[test]
    fn extension_ignores_query_and_case() {
        assert_eq!(url_extension("music/Theme.OGG?v=3"), Some("ogg".to_string()));
        assert_eq!(url_extension("dir.v2/readme"), None);
        assert_eq!(url_extension("trailing."), None);
    }

    #[test]
    fn first_supported_candidate_wins() {
        let candidates = vec![
            "a.aac".to_string(),
            "a.mp3".to_string(),
            "a.ogg".to_string(),
        ];
        let supported = vec!["ogg".to_string(), "mp3".to_string()];
        assert_eq!(pick_supported_url(&candidates, &supported), Some("a.mp3"));
        assert_eq!(pick_supported_url(&candidates[..1], &supported), None);
    }
}
