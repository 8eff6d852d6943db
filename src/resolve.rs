//! Best-effort mapping from an exported title string to a VNDB id.
//!
//! Exported titles are noisy: punctuation, bracketed edition tags, bolted-on
//! subtitles. The resolver runs an ordered fallback chain over the two
//! search endpoints and, per endpoint, retries with truncated forms of the
//! title before giving up on it. No caching — the rate limiter bounds the
//! total search traffic anyway.

use crate::vndb::{VndbClient, VndbError};

/// Longest prefix/suffix used when a title contains no symbol to cut at.
const TRUNCATE_FALLBACK_CHARS: usize = 20;

/// Resolves one or two candidate titles to a VNDB id.
pub struct TitleResolver<'a> {
    client: &'a VndbClient,
}

impl<'a> TitleResolver<'a> {
    pub fn new(client: &'a VndbClient) -> Self {
        Self { client }
    }

    /// Walk the fallback chain, stopping at the first hit:
    ///
    /// 1. `vn` search: primary title exact, then its truncations
    /// 2. `vn` search: alternate title exact, then its truncations
    /// 3. `release` search (following the release → vn indirection): same
    ///    order of candidates
    ///
    /// Truncations are computed once per title and reused for both
    /// endpoints. Returns `None` only after the whole chain came up empty.
    pub async fn resolve(
        &self,
        title: &str,
        title_alt: Option<&str>,
    ) -> Result<Option<String>, VndbError> {
        let candidates = candidate_terms(title, title_alt);

        for terms in &candidates {
            for term in terms {
                if let Some(hit) = self.client.search_vn(term).await? {
                    tracing::debug!(title, term = %term, id = %hit.id, "resolved via vn search");
                    return Ok(Some(hit.id));
                }
            }
        }

        for terms in &candidates {
            for term in terms {
                if let Some(hit) = self.client.search_release(term).await? {
                    tracing::debug!(title, term = %term, id = %hit.id, "resolved via release search");
                    return Ok(Some(hit.id));
                }
            }
        }

        tracing::debug!(title, "exhausted all search fallbacks");
        Ok(None)
    }
}

/// Per-title search term lists: the exact title followed by its leading and
/// trailing truncations. Empty titles, duplicate alternates and truncations
/// that add nothing over the exact form are dropped.
fn candidate_terms(title: &str, title_alt: Option<&str>) -> Vec<Vec<String>> {
    let mut candidates = Vec::new();
    let mut push = |t: &str| {
        let t = t.trim();
        if !t.is_empty() {
            candidates.push(search_terms(t));
        }
    };
    push(title);
    if let Some(alt) = title_alt {
        if alt.trim() != title.trim() {
            push(alt);
        }
    }
    candidates
}

fn search_terms(title: &str) -> Vec<String> {
    let mut terms = vec![title.to_string()];
    let (leading, trailing) = truncate_title(title);
    for truncated in [leading, trailing] {
        if !truncated.is_empty() && truncated != title && !terms.contains(&truncated) {
            terms.push(truncated);
        }
    }
    terms
}

fn is_symbol(c: char) -> bool {
    !c.is_alphanumeric() && c != '_' && !c.is_whitespace()
}

/// Leading and trailing truncations of a noisy title.
///
/// Leading: the run of characters before the first symbol. Trailing: the
/// last symbol-free run. A title with no symbol at all falls back to its
/// first and last 20 characters. Both are whitespace-trimmed and may come
/// out empty (e.g. a title that starts with a bracket).
pub(crate) fn truncate_title(title: &str) -> (String, String) {
    if !title.chars().any(is_symbol) {
        let count = title.chars().count();
        let leading: String = title.chars().take(TRUNCATE_FALLBACK_CHARS).collect();
        let trailing: String = title
            .chars()
            .skip(count.saturating_sub(TRUNCATE_FALLBACK_CHARS))
            .collect();
        return (
            leading.trim().to_string(),
            trailing.trim().to_string(),
        );
    }

    let mut segments = title.split(is_symbol);
    let leading = segments.next().unwrap_or_default();
    let trailing = title
        .split(is_symbol)
        .filter(|s| !s.trim().is_empty())
        .last()
        .unwrap_or_default();

    (leading.trim().to_string(), trailing.trim().to_string())
}
