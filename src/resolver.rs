//! Proxy URL resolution for stored files.
//!
//! The browser cannot fetch bucket objects directly (CORS), so anything that lives in
//! cloud storage is rewritten to the backend's streaming proxy at
//! `<base>/api/upload/proxy/<encoded key>`. Local uploads and external links pass through.

use url::Url;

const PROXY_PATH: &str = "/api/upload/proxy/";

fn present(s: Option<&str>) -> Option<&str> {
  s.map(str::trim).filter(|s| !s.is_empty())
}

pub fn proxy_url(proxy_base: &str, storage_key: &str) -> String {
  format!(
    "{}{}{}",
    proxy_base.trim_end_matches('/'),
    PROXY_PATH,
    urlencoding::encode(storage_key)
  )
}

/// Storage key of a bucket or CDN URL, or None if the URL is not cloud storage.
pub fn storage_key_of(url: &str) -> Option<String> {
  let parsed = Url::parse(url).ok()?;
  let host = parsed.host_str()?.to_ascii_lowercase();
  let is_s3 = host.ends_with("amazonaws.com") && host.split('.').any(|label| label == "s3" || label.starts_with("s3-"));
  let is_cdn = host.ends_with("cloudfront.net");
  if !is_s3 && !is_cdn {
    return None;
  }
  let path = parsed.path().trim_start_matches('/');
  if path.is_empty() {
    return None;
  }
  let key = urlencoding::decode(path).map(|k| k.into_owned()).unwrap_or_else(|_| path.to_string());
  Some(key)
}

/// URL the browser should load for a stored file.
///
/// The storage key wins whenever it is given; otherwise cloud URLs are converted to their
/// key, and everything else is returned unchanged. Never fails.
pub fn resolve_url(proxy_base: &str, url: Option<&str>, storage_key: Option<&str>) -> String {
  let url = present(url);
  if let Some(key) = present(storage_key) {
    return proxy_url(proxy_base, key);
  }
  let Some(url) = url else {
    return String::new();
  };
  if let Some(key) = storage_key_of(url) {
    return proxy_url(proxy_base, &key);
  }
  // Local uploads (`http://localhost...`, `/uploads/...`) and external links alike.
  url.to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  const BASE: &str = "https://lms.example.org";

  #[test]
  fn nothing_given_resolves_to_empty() {
    assert_eq!(resolve_url(BASE, None, None), "");
    assert_eq!(resolve_url(BASE, Some("  "), Some("")), "");
  }

  #[test]
  fn key_and_bucket_url_reach_the_same_proxy_url() {
    let by_key = resolve_url(BASE, None, Some("k1"));
    let by_url = resolve_url(BASE, Some("https://bucket.s3.amazonaws.com/k1"), None);
    assert_eq!(by_key, "https://lms.example.org/api/upload/proxy/k1");
    assert_eq!(by_key, by_url);
  }

  #[test]
  fn storage_key_takes_precedence_over_url() {
    let out = resolve_url(BASE, Some("https://example.com/page"), Some("resources/a b.pdf"));
    assert_eq!(out, "https://lms.example.org/api/upload/proxy/resources%2Fa%20b.pdf");
  }

  #[test]
  fn cdn_and_regional_bucket_urls_are_proxied() {
    let cdn = resolve_url(BASE, Some("https://d111.cloudfront.net/videos/intro.mp4?sig=1"), None);
    assert_eq!(cdn, proxy_url(BASE, "videos/intro.mp4"));
    let regional = resolve_url(BASE, Some("https://bucket.s3.eu-west-1.amazonaws.com/docs/x%20y.pdf"), None);
    assert_eq!(regional, proxy_url(BASE, "docs/x y.pdf"));
  }

  #[test]
  fn local_and_external_links_pass_through() {
    assert_eq!(resolve_url(BASE, Some("http://localhost:5000/uploads/a.pdf"), None), "http://localhost:5000/uploads/a.pdf");
    assert_eq!(resolve_url(BASE, Some("/uploads/a.pdf"), None), "/uploads/a.pdf");
    assert_eq!(resolve_url(BASE, Some("https://youtube.com/watch?v=1"), None), "https://youtube.com/watch?v=1");
  }
}
