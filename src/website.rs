// src/website.rs
use crate::config::{Config, Thresholds};
use crate::fetch::{FetchClient, FetchOptions, Request};
use crate::models::{AnalysisResult, Analyzer, Finding, WarningFlag};
use crate::validator;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

static COMMENTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static SCRIPTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>").expect("valid regex"));
static STYLES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style\b.*?</style\s*>").expect("valid regex"));
static NOSCRIPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<noscript\b.*?</noscript\s*>").expect("valid regex"));
static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static ENTITIES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").expect("valid regex"));

#[derive(Debug, Deserialize)]
struct ClassifierResponse {
    #[serde(rename = "confidenceScore", alias = "score")]
    score: f64,
}

/// Visible text of an HTML page: markup, scripts, styles and comments
/// removed, entities decoded, whitespace collapsed, cut at `limit` chars.
pub fn extract_text(html: &str, limit: usize) -> String {
    let text = COMMENTS.replace_all(html, " ");
    let text = SCRIPTS.replace_all(&text, " ");
    let text = STYLES.replace_all(&text, " ");
    let text = NOSCRIPT.replace_all(&text, " ");
    let text = TAGS.replace_all(&text, " ");
    let text = ENTITIES.replace_all(&text, |caps: &Captures| decode_entity(&caps[1], &caps[0]));

    let mut out = String::new();
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out.chars().take(limit).collect()
}

fn decode_entity(name: &str, raw: &str) -> String {
    let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(dec) = name.strip_prefix('#') {
        dec.parse().ok()
    } else {
        match name {
            "amp" => Some('&' as u32),
            "lt" => Some('<' as u32),
            "gt" => Some('>' as u32),
            "quot" => Some('"' as u32),
            "apos" => Some('\'' as u32),
            "nbsp" => Some(' ' as u32),
            _ => None,
        }
    };
    code.and_then(char::from_u32)
        .map(String::from)
        .unwrap_or_else(|| raw.to_string())
}

/// Scores a token's website for machine-generated content.
#[derive(Debug, Clone)]
pub struct WebsiteAnalyzer {
    client: FetchClient,
    classifier_url: String,
    api_key: String,
    page_opts: FetchOptions,
    api_opts: FetchOptions,
    text_limit: usize,
    min_content_length: usize,
    thresholds: Thresholds,
}

impl WebsiteAnalyzer {
    pub fn new(client: FetchClient, cfg: &Config) -> Self {
        Self {
            client,
            classifier_url: cfg.endpoints.classifier_url.clone(),
            api_key: cfg.api_keys.classifier.clone(),
            page_opts: cfg.page_fetch(),
            api_opts: cfg.api_fetch(),
            text_limit: cfg.report_text_truncation_limit,
            min_content_length: cfg.min_content_length,
            thresholds: cfg.thresholds,
        }
    }

    pub async fn analyze(&self, url: &str) -> AnalysisResult {
        if !validator::validate(url) {
            info!("Website {:?} failed validation, skipping", url);
            return AnalysisResult::invalid_input(Analyzer::Website, format!("invalid url: {url:?}"));
        }
        let url = url.trim();

        let html = match self.client.fetch_text(&Request::get(url), &self.page_opts).await {
            Ok(html) => html,
            Err(e) => {
                warn!("Could not fetch website {}: {}", url, e);
                return AnalysisResult::from_fetch_error(Analyzer::Website, &e);
            }
        };

        let text = extract_text(&html, self.text_limit);
        if text.chars().count() < self.min_content_length {
            warn!("No meaningful content found on: {}", url);
            return AnalysisResult::degraded(Analyzer::Website, "insufficient content");
        }

        let req = Request::post_json(&self.classifier_url, json!({ "text": text }))
            .rapidapi_key(&self.api_key);
        let score = match self
            .client
            .fetch_json::<ClassifierResponse>(&req, &self.api_opts)
            .await
        {
            Ok(resp) if (0.0..=1.0).contains(&resp.score) => resp.score,
            Ok(resp) => {
                warn!("Classifier score {} out of range for {}", resp.score, url);
                return AnalysisResult::unavailable(
                    Analyzer::Website,
                    format!("classifier score {} outside [0, 1]", resp.score),
                );
            }
            Err(e) => {
                warn!("AI detection failed for {}: {}", url, e);
                return AnalysisResult::from_fetch_error(Analyzer::Website, &e);
            }
        };

        info!("AI content detection score for {}: {:.2}", url, score);

        let mut flags = Vec::new();
        if score > self.thresholds.ai_content_score {
            warn!("Website {} appears to be AI-generated (score: {:.2})", url, score);
            flags.push(WarningFlag::AiGeneratedContent);
        }
        AnalysisResult::ok(Analyzer::Website, Finding::AiContent { score }, flags)
    }
}
