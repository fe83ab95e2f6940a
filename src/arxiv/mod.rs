// arXiv paper search over the public Atom API


use anyhow::{Context, Result, anyhow};
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ArxivConfig;

/// A paper returned by a paper search, in relevance order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paper {
    pub title: String,
    pub authors: Vec<String>,
    pub summary: String,
    pub url: String,
}

impl Paper {
    /// Render as the `Title/Authors/Summary/URL` block used in prompts
    #[inline]
    pub fn to_context_block(&self) -> String {
        format!(
            "Title: {}\nAuthors: {}\nSummary: {}\nURL: {}\n",
            self.title,
            self.authors.join(", "),
            self.summary,
            self.url
        )
    }
}

/// Join papers into a single context text
#[inline]
pub fn format_papers(papers: &[Paper]) -> String {
    papers
        .iter()
        .map(Paper::to_context_block)
        .collect::<Vec<_>>()
        .join("\n---\n")
}

pub trait PaperSearch {
    fn search(&self, query: &str, max_results: usize) -> Result<Vec<Paper>>;
}

impl<T: PaperSearch + ?Sized> PaperSearch for &T {
    #[inline]
    fn search(&self, query: &str, max_results: usize) -> Result<Vec<Paper>> {
        (**self).search(query, max_results)
    }
}

impl<T: PaperSearch + ?Sized> PaperSearch for Box<T> {
    #[inline]
    fn search(&self, query: &str, max_results: usize) -> Result<Vec<Paper>> {
        (**self).search(query, max_results)
    }
}

#[derive(Debug, Clone)]
pub struct ArxivClient {
    base_url: Url,
    agent: ureq::Agent,
}

impl ArxivClient {
    #[inline]
    pub fn new(config: &ArxivConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid arXiv endpoint: {}", config.base_url))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .build()
            .into();

        Ok(Self { base_url, agent })
    }

    /// Full query URL for `query`, sorted by relevance
    #[inline]
    pub fn query_url(&self, query: &str, max_results: usize) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair("search_query", &format!("all:{}", query))
            .append_pair("start", "0")
            .append_pair("max_results", &max_results.to_string())
            .append_pair("sortBy", "relevance")
            .append_pair("sortOrder", "descending");
        url
    }
}

impl PaperSearch for ArxivClient {
    #[inline]
    fn search(&self, query: &str, max_results: usize) -> Result<Vec<Paper>> {
        let url = self.query_url(query, max_results);
        debug!("Searching arXiv: {}", url);

        let body = self
            .agent
            .get(url.as_str())
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| anyhow!("arXiv request failed: {}", e))?;

        let papers = parse_feed(&body)?;
        info!("arXiv returned {} papers for '{}'", papers.len(), query);
        Ok(papers)
    }
}

/// Parse an arXiv Atom feed into papers, keeping feed order
#[inline]
pub fn parse_feed(feed: &str) -> Result<Vec<Paper>> {
    let document = Html::parse_document(feed);

    let entry_selector = selector("entry")?;
    let id_selector = selector("id")?;
    let title_selector = selector("title")?;
    let summary_selector = selector("summary")?;
    let author_selector = selector("author name")?;
    let pdf_link_selector = selector(r#"link[title="pdf"]"#)?;

    let mut papers = Vec::new();

    for entry in document.select(&entry_selector) {
        let id = first_text(entry, &id_selector).unwrap_or_default();
        let title = first_text(entry, &title_selector).unwrap_or_default();
        let summary = first_text(entry, &summary_selector).unwrap_or_default();

        // The API reports bad queries as a single entry pointing at its error docs
        if id.contains("/api/errors") {
            return Err(anyhow!("arXiv API error: {}", summary));
        }

        if title.is_empty() {
            warn!("Skipping arXiv entry without a title: {}", id);
            continue;
        }

        let authors = entry
            .select(&author_selector)
            .map(collapsed_text)
            .filter(|name| !name.is_empty())
            .collect();

        let url = entry
            .select(&pdf_link_selector)
            .find_map(|link| link.value().attr("href"))
            .map_or(id, str::to_string);

        papers.push(Paper {
            title,
            authors,
            summary,
            url,
        });
    }

    Ok(papers)
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Failed to create CSS selector {}: {:?}", css, e))
}

fn first_text(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
    element.select(selector).next().map(collapsed_text)
}

/// Element text with runs of whitespace (including feed line wrapping) collapsed
fn collapsed_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
