//! Search command handler.

use citewise_core::config::AppConfig;
use citewise_knowledge::{ChunkFilter, QaEngine};
use clap::Args;

/// Show the chunks retrieval ranks for a question
#[derive(Args, Debug)]
pub struct SearchCommand {
    /// Query text
    pub query: String,

    /// Number of chunks to return
    #[arg(short = 'k', long, default_value = "5")]
    pub top_k: usize,

    /// Only search this category (e.g. fees, calendar, policies)
    #[arg(long)]
    pub category: Option<String>,

    /// Only search this source document
    #[arg(long)]
    pub document: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        let filter = ChunkFilter {
            category: self.category.clone(),
            source_document: self.document.clone(),
        };
        let filter = (filter != ChunkFilter::default()).then_some(filter);

        let engine = QaEngine::from_workspace(config).await?;
        let candidates = engine.search(&self.query, filter.as_ref(), self.top_k).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&candidates)?);
            return Ok(());
        }

        if candidates.is_empty() {
            println!("No relevant chunks found.");
            return Ok(());
        }

        for (i, candidate) in candidates.iter().enumerate() {
            let chunk = &candidate.chunk;
            let location = match &chunk.page_or_section {
                Some(section) => format!("{} | {}", chunk.source_document, section),
                None => chunk.source_document.clone(),
            };
            println!(
                "{}. {} [{}] score {:.3} (semantic {:.3}, keyword {:.3})",
                i + 1,
                location,
                chunk.category,
                candidate.rerank_score.unwrap_or(candidate.fused_score),
                candidate.semantic_score,
                candidate.keyword_score
            );
            println!("   {}", chunk.preview());
        }
        Ok(())
    }
}
