#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/fincalc/fincalc/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! SEC EDGAR source adapter.
//!
//! Serves XBRL company facts from the EDGAR API:
//!
//! - CIK (Central Index Key) lookup from ticker symbols
//! - Company facts per taxonomy concept, with accession-number provenance
//! - Fiscal period mapping from the `fy`/`fp` metadata on each fact
//!
//! Rate limiting and retries are handled by the fact store that owns the
//! adapter; this crate only speaks HTTP and maps the response shape.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use fincalc_core::{
    ConceptId, EngineError, Fact, FilingRef, PeriodKey, Result, SourceAdapter, Ticker,
};

/// SEC EDGAR API base URL.
const EDGAR_BASE_URL: &str = "https://data.sec.gov";

/// SEC company tickers URL.
const COMPANY_TICKERS_URL: &str = "https://www.sec.gov/files/company_tickers.json";

/// How long a downloaded company-facts document is reused before refetching.
///
/// One calculation touches several concepts of the same entity; reusing the
/// document keeps that a single download.
const DOCUMENT_REUSE: Duration = Duration::from_secs(60);

/// SEC EDGAR source adapter.
///
/// The SEC requires an identifying user agent of the form
/// `"AppName/Version (contact@email.com)"`.
#[derive(Debug)]
pub struct EdgarAdapter {
    client: reqwest::Client,
    ciks: RwLock<Option<Arc<HashMap<String, String>>>>,
    documents: RwLock<HashMap<Ticker, (Instant, Arc<CompanyFactsResponse>)>>,
}

impl EdgarAdapter {
    /// Creates an adapter with a default HTTP client and the given user agent.
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| EngineError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client))
    }

    /// Creates an adapter over a pre-configured client.
    ///
    /// The client must already carry an SEC-compliant user agent.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            ciks: RwLock::new(None),
            documents: RwLock::new(HashMap::new()),
        }
    }

    /// Looks up a company's CIK from its ticker symbol.
    ///
    /// Returns the CIK as a zero-padded 10-digit string. The ticker table is
    /// downloaded once and reused.
    pub async fn cik_for(&self, ticker: &Ticker) -> Result<String> {
        if let Some(table) = self.ciks.read().await.as_ref() {
            return table
                .get(ticker.as_str())
                .cloned()
                .ok_or_else(|| EngineError::EntityNotFound(ticker.to_string()));
        }

        debug!("Fetching company ticker table");
        let response = self
            .client
            .get(COMPANY_TICKERS_URL)
            .send()
            .await
            .map_err(|e| EngineError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(EngineError::Network(format!(
                "failed to fetch company tickers: HTTP {}",
                response.status()
            )));
        }
        let raw: HashMap<String, CompanyTickerInfo> = response
            .json()
            .await
            .map_err(|e| EngineError::Parse(format!("company tickers: {e}")))?;

        let table: HashMap<String, String> = raw
            .into_values()
            .map(|info| (info.ticker.to_uppercase(), format!("{:0>10}", info.cik_str)))
            .collect();
        let table = Arc::new(table);
        *self.ciks.write().await = Some(Arc::clone(&table));

        table
            .get(ticker.as_str())
            .cloned()
            .ok_or_else(|| EngineError::EntityNotFound(ticker.to_string()))
    }

    /// Downloads (or reuses) the full company-facts document for an entity.
    async fn company_facts(&self, ticker: &Ticker) -> Result<Arc<CompanyFactsResponse>> {
        if let Some((fetched, doc)) = self.documents.read().await.get(ticker) {
            if fetched.elapsed() < DOCUMENT_REUSE {
                return Ok(Arc::clone(doc));
            }
        }

        let cik = self.cik_for(ticker).await?;
        let url = format!("{EDGAR_BASE_URL}/api/xbrl/companyfacts/CIK{cik}.json");

        debug!(%ticker, %url, "Fetching company facts");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::Network(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(EngineError::EntityNotFound(ticker.to_string()));
        }
        if !response.status().is_success() {
            return Err(EngineError::Network(format!(
                "failed to fetch company facts for CIK {cik}: HTTP {}",
                response.status()
            )));
        }

        let doc: CompanyFactsResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Parse(format!("company facts: {e}")))?;
        let doc = Arc::new(doc);
        self.documents
            .write()
            .await
            .insert(ticker.clone(), (Instant::now(), Arc::clone(&doc)));
        Ok(doc)
    }
}

#[async_trait]
impl SourceAdapter for EdgarAdapter {
    fn name(&self) -> &str {
        "edgar"
    }

    fn description(&self) -> &str {
        "SEC EDGAR XBRL company facts from 10-K and 10-Q filings"
    }

    async fn fetch_all_facts(&self, ticker: &Ticker, concept: &ConceptId) -> Result<Vec<Fact>> {
        let doc = self.company_facts(ticker).await?;
        let facts = facts_for_concept(&doc, ticker, concept, self.name());
        debug!(%ticker, %concept, count = facts.len(), "Mapped EDGAR facts");
        Ok(facts)
    }
}

/// Extracts every usable fact for one concept from a company-facts document.
///
/// Only facts from 10-K and 10-Q filings with complete fiscal metadata are
/// kept; anything else cannot be period-aligned and is skipped with a log
/// line rather than guessed at.
fn facts_for_concept(
    doc: &CompanyFactsResponse,
    ticker: &Ticker,
    concept: &ConceptId,
    source: &str,
) -> Vec<Fact> {
    let mut out = Vec::new();

    // US-GAAP first, DEI for share counts and the like.
    for taxonomy in ["us-gaap", "dei"] {
        let Some(tag_facts) = doc
            .facts
            .get(taxonomy)
            .and_then(|tags| tags.get(concept.as_str()))
        else {
            continue;
        };
        let Some(units) = &tag_facts.units else {
            continue;
        };

        for (unit, values) in units {
            for value in values {
                match mapped_fact(value, concept, unit, source) {
                    Some(fact) => out.push(fact),
                    None => {
                        warn!(
                            %ticker,
                            %concept,
                            end = %value.end,
                            form = value.form.as_deref().unwrap_or("?"),
                            "Skipping fact without usable fiscal metadata"
                        );
                    }
                }
            }
        }
    }

    out
}

fn mapped_fact(value: &FactValue, concept: &ConceptId, unit: &str, source: &str) -> Option<Fact> {
    let form = value.form.as_deref()?;
    if form != "10-K" && form != "10-Q" {
        return None;
    }
    let accn = value.accn.as_deref()?;
    let fy = value.fy?;
    let fp = value.fp.as_deref()?;
    let end_date = NaiveDate::parse_from_str(&value.end, "%Y-%m-%d").ok()?;

    let period = match fp {
        "FY" => PeriodKey::annual(fy, end_date),
        quarter => {
            let q = quarter.strip_prefix('Q')?.parse::<u8>().ok()?;
            if !(1..=4).contains(&q) {
                return None;
            }
            PeriodKey::quarterly(fy, q, end_date)
        }
    };

    Some(Fact {
        concept: concept.clone(),
        value: value.val,
        unit: unit.to_string(),
        currency: currency_of(unit),
        period,
        filing_ref: FilingRef::new(accn),
        source_adapter: source.to_string(),
    })
}

/// EDGAR unit keys are ISO currency codes for monetary facts ("USD", "EUR")
/// and unit names ("shares", "pure") otherwise.
fn currency_of(unit: &str) -> String {
    if unit.len() == 3 && unit.chars().all(|c| c.is_ascii_uppercase()) {
        unit.to_string()
    } else {
        String::new()
    }
}

// =============================================================================
// SEC API response types
// =============================================================================

/// Company ticker information from the SEC ticker table.
#[derive(Debug, Deserialize)]
struct CompanyTickerInfo {
    /// CIK as a number (the SEC serves it as an integer).
    cik_str: u64,
    /// Ticker symbol.
    ticker: String,
}

/// Response from the EDGAR company facts API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompanyFactsResponse {
    /// Facts organized by taxonomy and tag.
    facts: HashMap<String, HashMap<String, TagFacts>>,
}

/// Facts reported under one XBRL tag.
#[derive(Debug, Deserialize)]
struct TagFacts {
    /// Values grouped by unit (USD, shares, pure).
    units: Option<HashMap<String, Vec<FactValue>>>,
}

/// One reported value with its filing metadata.
#[derive(Debug, Clone, Deserialize)]
struct FactValue {
    /// End date of the period, `YYYY-MM-DD`.
    end: String,
    /// Reported value.
    val: f64,
    /// Accession number of the filing.
    #[serde(default)]
    accn: Option<String>,
    /// Fiscal year.
    #[serde(default)]
    fy: Option<i32>,
    /// Fiscal period ("FY", "Q1".."Q4").
    #[serde(default)]
    fp: Option<String>,
    /// Form type ("10-K", "10-Q", ...).
    #[serde(default)]
    form: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> CompanyFactsResponse {
        serde_json::from_str(
            r#"{
                "facts": {
                    "us-gaap": {
                        "Revenues": {
                            "units": {
                                "USD": [
                                    {
                                        "end": "2024-09-28",
                                        "val": 1060000000.0,
                                        "accn": "0000320193-24-000123",
                                        "fy": 2024,
                                        "fp": "Q3",
                                        "form": "10-Q"
                                    },
                                    {
                                        "end": "2023-12-30",
                                        "val": 3900000000.0,
                                        "accn": "0000320193-24-000006",
                                        "fy": 2023,
                                        "fp": "FY",
                                        "form": "10-K"
                                    },
                                    {
                                        "end": "2024-03-30",
                                        "val": 950000000.0,
                                        "accn": "0000320193-24-000050",
                                        "fy": 2024,
                                        "fp": "Q1",
                                        "form": "8-K"
                                    },
                                    {
                                        "end": "2024-06-29",
                                        "val": 990000000.0
                                    }
                                ]
                            }
                        },
                        "CommonStockSharesOutstanding": {
                            "units": {
                                "shares": [
                                    {
                                        "end": "2024-09-28",
                                        "val": 15000000.0,
                                        "accn": "0000320193-24-000123",
                                        "fy": 2024,
                                        "fp": "Q3",
                                        "form": "10-Q"
                                    }
                                ]
                            }
                        }
                    }
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn maps_quarterly_and_annual_facts() {
        let doc = sample_document();
        let facts = facts_for_concept(
            &doc,
            &Ticker::new("ACME"),
            &ConceptId::new("Revenues"),
            "edgar",
        );

        // The 8-K fact and the metadata-free fact are skipped.
        assert_eq!(facts.len(), 2);

        let quarterly = facts.iter().find(|f| f.period.fiscal_quarter.is_some()).unwrap();
        assert_eq!(quarterly.value, 1_060_000_000.0);
        assert_eq!(quarterly.period.label(), "2024-Q3");
        assert_eq!(quarterly.filing_ref.as_str(), "0000320193-24-000123");
        assert_eq!(quarterly.unit, "USD");
        assert_eq!(quarterly.currency, "USD");

        let annual = facts.iter().find(|f| f.period.fiscal_quarter.is_none()).unwrap();
        assert_eq!(annual.period.label(), "2023-FY");
    }

    #[test]
    fn share_counts_have_no_currency() {
        let doc = sample_document();
        let facts = facts_for_concept(
            &doc,
            &Ticker::new("ACME"),
            &ConceptId::new("CommonStockSharesOutstanding"),
            "edgar",
        );
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].unit, "shares");
        assert!(facts[0].currency.is_empty());
    }

    #[test]
    fn unknown_concept_yields_no_facts() {
        let doc = sample_document();
        let facts = facts_for_concept(
            &doc,
            &Ticker::new("ACME"),
            &ConceptId::new("Nonexistent"),
            "edgar",
        );
        assert!(facts.is_empty());
    }

    #[test]
    fn currency_detection() {
        assert_eq!(currency_of("USD"), "USD");
        assert_eq!(currency_of("EUR"), "EUR");
        assert_eq!(currency_of("shares"), "");
        assert_eq!(currency_of("pure"), "");
    }

    #[test]
    fn cik_padding() {
        let padded = format!("{:0>10}", 320_193_u64);
        assert_eq!(padded, "0000320193");
    }
}
