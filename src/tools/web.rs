//! `scrape_website_text`: fetch a live page and return its readable text

use super::Tool;
use crate::error::ComplianceError;
use crate::models::ToolOutput;
use crate::normalizer::truncate_chars;
use crate::Result;
use reqwest::Client;
use scraper::{Html, Node};
use std::time::Duration;
use tracing::{info, warn};

/// Official notices put the substance near the top; keep the head of the page.
pub const WEB_TEXT_BUDGET: usize = 4000;

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Government portals often reject clients that do not look like a browser.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

const SKIPPED_ELEMENTS: [&str; 5] = ["script", "style", "nav", "header", "footer"];

pub struct WebFetchTool {
    client: Client,
}

impl WebFetchTool {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(BROWSER_USER_AGENT)
            .build()?;

        Ok(Self { client })
    }

    /// GET the page and extract text; any fault is reported in the returned string.
    pub async fn fetch(&self, url: &str) -> String {
        match self.fetch_html(url).await {
            Ok(html) => truncate_chars(&extract_readable_text(&html), WEB_TEXT_BUDGET),
            Err(detail) => {
                warn!(url = %url, error = %detail, "Web fetch failed");
                format!("Failed to scrape the website {}. Error: {}", url, detail)
            }
        }
    }

    async fn fetch_html(&self, url: &str) -> Result<String> {
        let response = self.client.get(url.trim()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ComplianceError::Tool(format!("HTTP {}", status)));
        }

        Ok(response.text().await?)
    }
}

#[async_trait::async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &'static str {
        "scrape_website_text"
    }

    fn description(&self) -> &'static str {
        "Scrapes the readable text content from a given live URL (e.g., Anatel or FCC website). Use this ONLY when you need real-time data or if the PDF database doesn't have the answer."
    }

    fn parameter(&self) -> &'static str {
        "url"
    }

    fn parameter_description(&self) -> &'static str {
        "Absolute http(s) URL of the page to read"
    }

    async fn invoke(&self, argument: &str) -> ToolOutput {
        info!(url = %argument, "Fetching live web page");
        ToolOutput::text(self.fetch(argument).await)
    }
}

/// Text of the document minus script/style/nav/header/footer, one fragment per line.
pub fn extract_readable_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::new();

    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };

        let skipped = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map_or(false, |el| SKIPPED_ELEMENTS.contains(&el.name()))
        });
        if skipped {
            continue;
        }

        raw.push_str(text);
        raw.push('\n');
    }

    collapse_whitespace(&raw)
}

/// Trim each line, split runs separated by double spaces, drop empty fragments.
fn collapse_whitespace(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .flat_map(|line| line.split("  "))
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
