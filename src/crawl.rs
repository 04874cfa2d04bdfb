//! Discovers data files by walking the HTML directory listings of the remote server.

use std::{collections::HashSet, sync::OnceLock};

use regex::Regex;
use reqwest::Url;
use tracing::debug;

use crate::{
    download::Fetch,
    error::{Error, Result},
    source::{CrawlMode, SourceDescriptor},
};

/// Decides which listing entries are data files, which are skipped and which are descended into.
#[derive(Debug, Clone, Default)]
pub struct CrawlFilter {
    /// Suffix marking a terminal file, e.g. `.grib2.bz2`.
    pub extension: String,
    /// A terminal file is kept only if it contains one of these (ignored when empty).
    pub require_any: Vec<String>,
    /// A terminal file containing any of these is dropped.
    pub reject: Vec<String>,
    /// Entries containing any of these are neither listed nor descended into.
    pub exclude: Vec<String>,
}

impl CrawlFilter {
    pub fn is_excluded(&self, href: &str) -> bool {
        href == "../"
            || href == ".."
            || href.starts_with('/')
            || href.starts_with('?')
            || href.contains("://")
            || self.exclude.iter().any(|token| href.contains(token.as_str()))
    }

    pub fn is_terminal(&self, href: &str) -> bool {
        href.ends_with(&self.extension)
    }

    pub fn accepts(&self, href: &str) -> bool {
        self.is_terminal(href)
            && (self.require_any.is_empty()
                || self.require_any.iter().any(|token| href.contains(token.as_str())))
            && !self.reject.iter().any(|token| href.contains(token.as_str()))
    }
}

fn href_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']+)["']"#).expect("valid href pattern")
    })
}

/// Returns the `href` targets of all anchors in document order.
pub fn extract_links(html: &str) -> Vec<String> {
    href_pattern()
        .captures_iter(html)
        .map(|caps| caps[1].trim().to_string())
        .collect()
}

fn directory_url(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

async fn fetch_listing(fetcher: &dyn Fetch, url: &str) -> Result<Vec<String>> {
    let body = fetcher.fetch(url).await.map_err(|e| Error::Crawl {
        url: url.to_string(),
        source: Box::new(e),
    })?;

    Ok(extract_links(&String::from_utf8_lossy(&body)))
}

/// Lists the files directly below `base_url`.
pub async fn crawl_flat(
    fetcher: &dyn Fetch,
    base_url: &str,
    filter: &CrawlFilter,
) -> Result<Vec<String>> {
    let base = directory_url(base_url);
    let links = fetch_listing(fetcher, &base).await?;

    Ok(links
        .into_iter()
        .filter(|href| !filter.is_excluded(href) && !href.ends_with('/'))
        .filter(|href| filter.accepts(href))
        .map(|href| format!("{base}{href}"))
        .collect())
}

/// Walks the listing tree below `base_url` depth first and returns every accepted
/// terminal file in discovery order.
///
/// Directory links are resolved against their listing and normalised, so `./` or
/// `../grib/` land on a directory already walked. Directories outside `base_url`
/// are never entered.
pub async fn crawl_recursive(
    fetcher: &dyn Fetch,
    base_url: &str,
    filter: &CrawlFilter,
) -> Result<Vec<String>> {
    let base = Url::parse(&directory_url(base_url))
        .map_err(|e| Error::Config(format!("invalid base URL `{base_url}`: {e}")))?;
    let mut files = Vec::new();
    let mut visited = HashSet::from([base.as_str().to_string()]);

    // One entry per open directory: its URL and the links not yet looked at.
    let mut stack = vec![(base.clone(), fetch_listing(fetcher, base.as_str()).await?.into_iter())];

    while let Some((dir, links)) = stack.last_mut() {
        let Some(href) = links.next() else {
            stack.pop();
            continue;
        };

        if filter.is_excluded(&href) {
            continue;
        }

        let Ok(mut url) = dir.join(&href) else {
            debug!(dir = %dir, href = %href, "ignoring unresolvable link");
            continue;
        };

        if filter.is_terminal(&href) {
            if filter.accepts(&href) {
                files.push(url.to_string());
            }
            continue;
        }

        if !href.ends_with('/') {
            debug!(url = %url, "ignoring non-directory entry");
            continue;
        }

        url.set_query(None);
        url.set_fragment(None);
        if !url.as_str().starts_with(base.as_str()) {
            debug!(url = %url, "ignoring directory outside the crawl root");
            continue;
        }
        if !visited.insert(url.as_str().to_string()) {
            continue;
        }

        let children = fetch_listing(fetcher, url.as_str()).await?;
        stack.push((url, children.into_iter()));
    }

    Ok(files)
}

/// Crawls a source in the mode its descriptor asks for.
pub async fn crawl(fetcher: &dyn Fetch, source: &SourceDescriptor) -> Result<Vec<String>> {
    match source.crawl_mode {
        CrawlMode::Flat => crawl_flat(fetcher, &source.base_url, &source.filter).await,
        CrawlMode::Recursive => crawl_recursive(fetcher, &source.base_url, &source.filter).await,
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::testing::FakeFetcher;

    fn listing(hrefs: &[&str]) -> String {
        let anchors: Vec<String> = hrefs
            .iter()
            .map(|h| format!("<a href=\"{h}\">{h}</a>"))
            .collect();
        format!("<html><body><pre>{}</pre></body></html>", anchors.join("\n"))
    }

    fn grib_filter() -> CrawlFilter {
        CrawlFilter {
            extension: ".grib2.bz2".to_string(),
            require_any: vec!["single-level".to_string()],
            reject: vec!["_org_".to_string()],
            exclude: vec!["latest".to_string()],
        }
    }

    #[test]
    fn should_extract_links_in_order() {
        let html = r#"<a href="../">../</a>
<A HREF='a/'>a/</A> <a class="x" href="b.csv">b</a>"#;
        assert_eq!(extract_links(html), vec!["../", "a/", "b.csv"]);
    }

    #[test]
    fn should_apply_filter() {
        let filter = grib_filter();
        assert!(filter.is_excluded("../"));
        assert!(filter.is_excluded("latest/"));
        assert!(filter.is_excluded("?C=M;O=A"));
        assert!(filter.accepts("file_single-level_regular.grib2.bz2"));
        assert!(!filter.accepts("file_model-level_regular.grib2.bz2"));
        assert!(!filter.accepts("file_single-level_org_x.grib2.bz2"));
        assert!(!filter.is_terminal("subdir/"));
    }

    #[tokio::test]
    async fn should_list_one_file_and_recurse_into_subdir() {
        let fetcher = FakeFetcher::new()
            .with(
                "https://host/grib/",
                listing(&["../", "subdir/", "file_single-level_regular.grib2.bz2"]),
            )
            .with(
                "https://host/grib/subdir/",
                listing(&["../", "b_single-level_x.grib2.bz2"]),
            );

        let files = crawl_recursive(&fetcher, "https://host/grib/", &grib_filter())
            .await
            .unwrap();

        assert_eq!(
            files,
            vec![
                "https://host/grib/subdir/b_single-level_x.grib2.bz2",
                "https://host/grib/file_single-level_regular.grib2.bz2",
            ]
        );
        assert_eq!(fetcher.requests(), 2);
    }

    #[tokio::test]
    async fn should_not_revisit_a_directory() {
        let fetcher = FakeFetcher::new()
            .with("https://host/a/", listing(&["b/", "b/"]))
            .with("https://host/a/b/", listing(&["../", "x_single-level.grib2.bz2"]));

        let files = crawl_recursive(&fetcher, "https://host/a", &grib_filter())
            .await
            .unwrap();

        assert_eq!(files, vec!["https://host/a/b/x_single-level.grib2.bz2"]);
        assert_eq!(fetcher.requests(), 2);
    }

    #[tokio::test]
    async fn should_treat_dot_segment_links_as_visited() {
        let fetcher = FakeFetcher::new()
            .with(
                "https://host/weather/grib/",
                listing(&["./", "../grib/", "sub/", "a_single-level.grib2.bz2"]),
            )
            .with(
                "https://host/weather/grib/sub/",
                listing(&["./", "../", "../../", "../sub/", "b_single-level.grib2.bz2"]),
            );

        let files = crawl_recursive(&fetcher, "https://host/weather/grib/", &grib_filter())
            .await
            .unwrap();

        assert_eq!(
            files,
            vec![
                "https://host/weather/grib/sub/b_single-level.grib2.bz2",
                "https://host/weather/grib/a_single-level.grib2.bz2",
            ]
        );
        assert_eq!(fetcher.requests(), 2);
    }

    #[tokio::test]
    async fn should_fail_whole_crawl_when_a_subdir_fails() {
        let fetcher = FakeFetcher::new().with("https://host/a/", listing(&["missing/"]));

        let err = crawl_recursive(&fetcher, "https://host/a/", &grib_filter())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Crawl { ref url, .. } if url == "https://host/a/missing/"));
    }

    #[tokio::test]
    async fn should_list_flat_files_only() {
        let filter = CrawlFilter {
            extension: ".csv".to_string(),
            ..CrawlFilter::default()
        };
        let fetcher = FakeFetcher::new().with(
            "https://host/poi/",
            listing(&["../", "old/", "10708-BEOB.csv", "README.txt", "10384-BEOB.csv"]),
        );

        let files = crawl_flat(&fetcher, "https://host/poi/", &filter).await.unwrap();

        assert_eq!(
            files,
            vec!["https://host/poi/10708-BEOB.csv", "https://host/poi/10384-BEOB.csv"]
        );
    }
}
