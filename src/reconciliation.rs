// 🔗 DOI reconciliation
// Fills in missing persistent identifiers by fuzzy-matching entries against
// the Crossref metadata service: the first candidate with an exact
// author-count match and a close enough title wins. Conflicting identifiers
// are reported, never overwritten.

use crate::database::{Database, Entry, Value};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, info, warn};

// ============================================================================
// EDIT DISTANCE
// ============================================================================

/// Classic Levenshtein distance: unit cost for insert, delete and
/// substitute, case-sensitive, over chars. Two-row dynamic programming.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let m = a_chars.len();
    let n = b_chars.len();

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a_chars[i - 1] != b_chars[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

// ============================================================================
// METADATA SOURCE
// ============================================================================

/// The free-text query sent to the metadata service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataQuery {
    pub author: String,
    pub title: String,
    pub container_title: Option<String>,
}

impl MetadataQuery {
    /// The exact URL attempted, URL-encoded; also what gets logged when no
    /// candidate matches.
    pub fn url(&self) -> String {
        let mut url = format!(
            "https://api.crossref.org/works?query.author={}&query.title={}",
            urlencoding::encode(&self.author),
            urlencoding::encode(&self.title),
        );
        if let Some(container) = &self.container_title {
            url.push_str("&query.container-title=");
            url.push_str(&urlencoding::encode(container));
        }
        url
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateAuthor {
    #[serde(default)]
    pub given: Option<String>,
    #[serde(default)]
    pub family: Option<String>,
}

/// One candidate record, in the service's response order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateWork {
    #[serde(default)]
    pub author: Vec<CandidateAuthor>,

    #[serde(default)]
    pub title: Vec<String>,

    #[serde(rename = "DOI", default)]
    pub doi: String,
}

/// Seam over the metadata service, so the matching logic is testable
/// without a network.
pub trait MetadataSource {
    fn search(&self, query: &MetadataQuery) -> Result<Vec<CandidateWork>>;
}

// ============================================================================
// CROSSREF CLIENT
// ============================================================================

#[derive(Deserialize)]
struct CrossrefResponse {
    message: CrossrefMessage,
}

#[derive(Deserialize)]
struct CrossrefMessage {
    #[serde(default)]
    items: Vec<CandidateWork>,
}

/// Blocking Crossref client: one GET per query, a request timeout, and
/// nothing else (no retry, no backoff, no caching).
pub struct CrossrefClient {
    http: reqwest::blocking::Client,
}

impl CrossrefClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("bibcurate/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building crossref client")?;
        Ok(CrossrefClient { http })
    }
}

impl MetadataSource for CrossrefClient {
    fn search(&self, query: &MetadataQuery) -> Result<Vec<CandidateWork>> {
        let url = query.url();
        let response: CrossrefResponse = self
            .http
            .get(&url)
            .send()
            .with_context(|| format!("querying {url}"))?
            .error_for_status()
            .with_context(|| format!("querying {url}"))?
            .json()
            .context("decoding crossref response")?;
        Ok(response.message.items)
    }
}

// ============================================================================
// OUTCOMES & REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconcileOutcome {
    /// DOI found and written into the entry
    Assigned { doi: String },

    /// Entry already carried the matched DOI
    Confirmed { doi: String },

    /// Entry carries a different DOI than the match; left for human review
    Conflict { existing: String, found: String },

    /// No candidate passed the matching predicate
    NoMatch { query_url: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Per-entry outcomes, in scan order (entry key textual form)
    pub results: Vec<(String, ReconcileOutcome)>,
    pub scanned: usize,
    pub assigned: usize,
    pub confirmed: usize,
    pub conflicts: usize,
    pub unmatched: usize,
    pub reconciled_at: DateTime<Utc>,
}

impl ReconcileReport {
    pub fn summary(&self) -> String {
        format!(
            "Scanned {} entries: {} DOIs assigned, {} confirmed, {} conflicts, {} unmatched",
            self.scanned, self.assigned, self.confirmed, self.conflicts, self.unmatched
        )
    }
}

// ============================================================================
// DOI RECONCILER
// ============================================================================

pub struct DoiReconciler {
    /// Also re-check entries that already carry a DOI
    pub check_known: bool,

    /// Restrict the pass to one conference/category when set
    pub category_filter: Option<String>,

    /// Categories holding self-archived preprints; never reconciled
    pub preprint_categories: Vec<String>,

    /// Maximum accepted title edit distance (default: 4)
    pub max_title_distance: usize,
}

impl DoiReconciler {
    pub fn new() -> Self {
        DoiReconciler {
            check_known: false,
            category_filter: None,
            preprint_categories: vec!["EPRINT".to_string()],
            max_title_distance: 4,
        }
    }

    /// Scan `db` in entry order, one blocking lookup per entry needing
    /// reconciliation, and assign missing DOIs in place. Keys are never
    /// altered by this pass. A failing lookup aborts the pass.
    pub fn reconcile(
        &self,
        db: &mut Database,
        source: &dyn MetadataSource,
    ) -> Result<ReconcileReport> {
        let abbrevs = db.abbrevs.clone();
        let mut report = ReconcileReport {
            results: Vec::new(),
            scanned: 0,
            assigned: 0,
            confirmed: 0,
            conflicts: 0,
            unmatched: 0,
            reconciled_at: Utc::now(),
        };

        for (key, entry) in db.entries.iter_mut() {
            if self.preprint_categories.contains(&key.category) {
                continue;
            }
            if let Some(filter) = &self.category_filter {
                if &key.category != filter {
                    continue;
                }
            }
            if entry.fields.contains_key("doi") && !self.check_known {
                continue;
            }

            report.scanned += 1;
            info!(key = %key, "searching DOI");

            let query = build_query(entry, &abbrevs);
            let candidates = source
                .search(&query)
                .with_context(|| format!("DOI lookup for {key}"))?;

            let outcome = match self.matching_doi(entry, &abbrevs, &candidates) {
                None => {
                    warn!(key = %key, tried = %query.url(), "cannot find DOI");
                    report.unmatched += 1;
                    ReconcileOutcome::NoMatch {
                        query_url: query.url(),
                    }
                }
                Some(doi) => match entry.expanded("doi", &abbrevs) {
                    Some(existing) if existing != doi => {
                        error!(key = %key, expected = %existing, got = %doi, "DOI conflict");
                        report.conflicts += 1;
                        ReconcileOutcome::Conflict {
                            existing,
                            found: doi,
                        }
                    }
                    Some(_) => {
                        info!(key = %key, doi = %doi, "matched known DOI");
                        report.confirmed += 1;
                        ReconcileOutcome::Confirmed { doi }
                    }
                    None => {
                        info!(key = %key, doi = %doi, "found DOI");
                        entry.fields.insert("doi".to_string(), Value::text(&doi));
                        report.assigned += 1;
                        ReconcileOutcome::Assigned { doi }
                    }
                },
            };

            report.results.push((key.to_string(), outcome));
        }

        Ok(report)
    }

    /// First candidate, in response order, whose author count equals the
    /// entry's resolved author count and whose closest title is within the
    /// distance bound. No secondary ranking.
    fn matching_doi(
        &self,
        entry: &Entry,
        abbrevs: &HashMap<String, String>,
        candidates: &[CandidateWork],
    ) -> Option<String> {
        let entry_title = entry.expanded("title", abbrevs).unwrap_or_default();
        let author_count = entry.author_count(abbrevs);

        candidates
            .iter()
            .find(|item| {
                item.author.len() == author_count
                    && item
                        .title
                        .iter()
                        .map(|t| levenshtein(t, &entry_title))
                        .min()
                        .is_some_and(|d| d <= self.max_title_distance)
            })
            .map(|item| item.doi.clone())
    }
}

impl Default for DoiReconciler {
    fn default() -> Self {
        Self::new()
    }
}

fn build_query(entry: &Entry, abbrevs: &HashMap<String, String>) -> MetadataQuery {
    MetadataQuery {
        author: entry.first_author_name(abbrevs),
        title: entry.expanded("title", abbrevs).unwrap_or_default(),
        container_title: entry.expanded("booktitle", abbrevs),
    }
}

// ============================================================================
// TESTS
// ============================================================================
