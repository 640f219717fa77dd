//! Semantic retrieval of member messages

use std::sync::Arc;

use tracing::debug;
use tracing::warn;

use crate::embeddings::check_dimension;
use crate::embeddings::Embedder;
use crate::errors::Result;
use crate::index::IndexMatch;
use crate::index::MetadataFilter;
use crate::index::VectorIndex;
use crate::models::Message;
use crate::models::RetrievedContextItem;
use crate::normalize::canonical_form;

/// Author shown for index entries without a member name
const UNKNOWN_MEMBER: &str = "Unknown member";

/// Embeds questions and searches the message index
pub struct SemanticRetriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    candidate_k: usize,
}

impl SemanticRetriever {
    /// Create a new retriever
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            index,
            embedder,
            candidate_k: 0,
        }
    }

    /// Ask the index for at least `candidate_k` neighbours before cutting to `top_k`
    #[must_use]
    pub fn with_candidate_k(mut self, candidate_k: usize) -> Self {
        self.candidate_k = candidate_k;
        self
    }

    /// Top-`top_k` messages for `question`, most similar first.
    ///
    /// With `member_filter`, only that member's messages are returned: the
    /// index is queried with an equality filter and anything else it sends
    /// back is dropped.
    pub async fn retrieve(
        &self,
        question: &str,
        member_filter: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<RetrievedContextItem>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed(question).await?;
        check_dimension(&vector, self.embedder.dimension())?;

        let filter = member_filter.map(MetadataFilter::member);
        let query_k = top_k.max(self.candidate_k);
        debug!(
            "Querying {} index: k={}, filter={:?}",
            self.index.name(),
            query_k,
            filter.as_ref().map(|f| f.value.as_str())
        );

        let matches = self.index.query(&vector, query_k, filter.as_ref()).await?;
        let received = matches.len();

        let mut items: Vec<RetrievedContextItem> = matches
            .into_iter()
            .filter_map(to_context_item)
            .filter(|item| match &filter {
                Some(filter) if item.message.member_name != filter.value => {
                    warn!(
                        "Index returned message {} from {} for a {} filter; dropped",
                        item.message.id, item.message.member_name, filter.value
                    );
                    false
                }
                _ => true,
            })
            .collect();

        items.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        items.truncate(top_k);

        debug!("Retrieved {} of {} matches", items.len(), received);
        Ok(items)
    }
}

fn to_context_item(hit: IndexMatch) -> Option<RetrievedContextItem> {
    let Some(text) = hit.text() else {
        debug!("Match {} has no text; skipped", hit.id);
        return None;
    };
    let message = Message {
        member_name: hit
            .member_name()
            .map_or_else(|| UNKNOWN_MEMBER.to_string(), canonical_form),
        timestamp: hit.timestamp(),
        text: text.to_string(),
        embedding: Vec::new(),
        id: hit.id.clone(),
    };
    Some(RetrievedContextItem {
        message,
        similarity_score: hit.score,
    })
}
