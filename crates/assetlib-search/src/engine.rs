use crate::{tokenize, SearchIndexEntry};
use assetlib_core::{Asset, AssetCategory, AssetId, AssetStatus, SearchSettings, TagMatch};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Flat bonus when the whole query appears in the content blob.
pub const PHRASE_BONUS: f64 = 5.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Relevance,
    Created,
    Updated,
    Rating,
    Downloads,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchQuery {
    pub query: Option<String>,
    pub category: Option<AssetCategory>,
    pub tags: Vec<String>,
    pub tag_match: TagMatch,
    pub status: Option<AssetStatus>,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    /// Falls back to the configured default limit
    pub limit: Option<usize>,
    pub offset: usize,
}

impl SearchQuery {
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: AssetCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I, tag_match: TagMatch) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self.tag_match = tag_match;
        self
    }

    pub fn with_status(mut self, status: AssetStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn sorted(mut self, sort_by: SortBy, sort_order: SortOrder) -> Self {
        self.sort_by = sort_by;
        self.sort_order = sort_order;
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    fn normalized_text(&self) -> Option<String> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub asset_id: AssetId,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    /// Matches before pagination
    pub total: usize,
    /// Category counts over every match, before pagination
    pub facets: BTreeMap<AssetCategory, usize>,
}

/// In-memory relevance index keyed by asset id.
pub struct SearchEngine {
    entries: RwLock<HashMap<AssetId, SearchIndexEntry>>,
    settings: SearchSettings,
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self::new(SearchSettings::default())
    }
}

impl SearchEngine {
    pub fn new(settings: SearchSettings) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            settings,
        }
    }

    pub fn index(&self, asset: &Asset) {
        let entry = SearchIndexEntry::from_asset(asset);
        debug!(asset_id = %asset.id, tokens = entry.tokens.len(), "indexed asset");
        self.entries.write().insert(asset.id.clone(), entry);
    }

    pub fn remove(&self, id: &str) -> bool {
        self.entries.write().remove(id).is_some()
    }

    pub fn rebuild<'a, I>(&self, assets: I)
    where
        I: IntoIterator<Item = &'a Asset>,
    {
        let rebuilt: HashMap<AssetId, SearchIndexEntry> = assets
            .into_iter()
            .map(|a| (a.id.clone(), SearchIndexEntry::from_asset(a)))
            .collect();
        debug!(entries = rebuilt.len(), "search index rebuilt");
        *self.entries.write() = rebuilt;
    }

    pub fn entry(&self, id: &str) -> Option<SearchIndexEntry> {
        self.entries.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn search(&self, query: &SearchQuery) -> SearchResults {
        let entries = self.entries.read();
        let text = query.normalized_text();
        let query_tokens = text.as_deref().map(tokenize).unwrap_or_default();

        let mut matched: Vec<(&SearchIndexEntry, f64)> = entries
            .values()
            .filter(|e| passes_filters(e, query))
            .filter_map(|e| match &text {
                None => Some((e, 1.0)),
                Some(text) => {
                    let score = score_entry(e, text, &query_tokens);
                    (score > 0.0).then_some((e, score))
                }
            })
            .collect();

        matched.sort_by(|a, b| {
            let ord = compare(a, b, query.sort_by);
            let ord = match query.sort_order {
                SortOrder::Desc => ord.reverse(),
                SortOrder::Asc => ord,
            };
            ord.then_with(|| a.0.asset_id.cmp(&b.0.asset_id))
        });

        let mut facets = BTreeMap::new();
        for (entry, _) in &matched {
            *facets.entry(entry.metadata.category).or_insert(0) += 1;
        }

        let total = matched.len();
        let limit = query.limit.unwrap_or(self.settings.default_limit);
        let hits = matched
            .into_iter()
            .skip(query.offset)
            .take(limit)
            .map(|(entry, score)| SearchHit {
                asset_id: entry.asset_id.clone(),
                score,
                highlight: text
                    .as_deref()
                    .and_then(|t| highlight(entry.display_text(), t, self.settings.highlight_window)),
            })
            .collect();

        SearchResults {
            hits,
            total,
            facets,
        }
    }

    /// Indexed tokens starting with `prefix`, most frequent first.
    pub fn suggest(&self, prefix: &str, limit: usize) -> Vec<String> {
        let prefix = prefix.trim().to_lowercase();
        if prefix.is_empty() {
            return Vec::new();
        }

        let entries = self.entries.read();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for entry in entries.values() {
            for token in entry.distinct_tokens() {
                if token.starts_with(&prefix) {
                    *counts.entry(token.as_str()).or_insert(0) += entry.frequency(token);
                }
            }
        }

        let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
            .into_iter()
            .take(limit)
            .map(|(token, _)| token.to_string())
            .collect()
    }
}

fn passes_filters(entry: &SearchIndexEntry, query: &SearchQuery) -> bool {
    if let Some(category) = query.category {
        if entry.metadata.category != category {
            return false;
        }
    }
    if let Some(status) = query.status {
        if entry.metadata.status != status {
            return false;
        }
    }
    query.tag_match.matches(&entry.metadata.tags, &query.tags)
}

/// Sum of token frequency, doubled when the token also occurs in the
/// content blob, plus the phrase bonus, divided by the query token count.
fn score_entry(entry: &SearchIndexEntry, text: &str, query_tokens: &[String]) -> f64 {
    let mut score = 0.0;
    for token in query_tokens {
        let frequency = entry.frequency(token) as f64;
        let boost = if entry.content_blob.contains(token.as_str()) {
            2.0
        } else {
            1.0
        };
        score += frequency * boost;
    }
    if entry.content_blob.contains(text) {
        score += PHRASE_BONUS;
    }
    score / query_tokens.len().max(1) as f64
}

fn compare(
    a: &(&SearchIndexEntry, f64),
    b: &(&SearchIndexEntry, f64),
    sort_by: SortBy,
) -> Ordering {
    let (ma, mb) = (&a.0.metadata, &b.0.metadata);
    match sort_by {
        SortBy::Relevance => a.1.total_cmp(&b.1),
        SortBy::Created => ma.created.cmp(&mb.created),
        SortBy::Updated => ma.updated.cmp(&mb.updated),
        SortBy::Rating => ma.rating.total_cmp(&mb.rating),
        SortBy::Downloads => ma.downloads.cmp(&mb.downloads),
    }
}

/// `window` characters either side of the first case-insensitive
/// occurrence of `needle`, cut from `haystack` with its casing intact.
pub fn highlight(haystack: &str, needle: &str, window: usize) -> Option<String> {
    let (start, end) = find_ignore_case(haystack, &needle.to_lowercase())?;

    let from = haystack[..start]
        .char_indices()
        .rev()
        .nth(window.saturating_sub(1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let from = if window == 0 { start } else { from };

    let to = haystack[end..]
        .char_indices()
        .nth(window)
        .map(|(i, _)| end + i)
        .unwrap_or(haystack.len());

    Some(haystack[from..to].to_string())
}

/// Byte range in `haystack` whose lower-cased form equals `needle`.
fn find_ignore_case(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    if needle.is_empty() {
        return None;
    }
    for (start, _) in haystack.char_indices() {
        let mut lowered = String::new();
        for (offset, c) in haystack[start..].char_indices() {
            lowered.extend(c.to_lowercase());
            if lowered.len() >= needle.len() {
                if lowered == needle {
                    return Some((start, start + offset + c.len_utf8()));
                }
                break;
            }
            if !needle.starts_with(lowered.as_str()) {
                break;
            }
        }
    }
    None
}
