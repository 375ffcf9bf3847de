//! Documents command handler.

use citewise_core::config::AppConfig;
use citewise_knowledge::QaEngine;
use clap::Args;

/// List indexed documents
#[derive(Args, Debug)]
pub struct DocumentsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl DocumentsCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        let engine = QaEngine::from_workspace(config).await?;
        let documents = engine.list_documents()?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&documents)?);
            return Ok(());
        }

        if documents.is_empty() {
            println!("No documents indexed. Use 'citewise index' to add chunk files.");
            return Ok(());
        }

        for doc in &documents {
            let indexed = doc
                .last_indexed
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{:<40} {:<12} {:>5} chunks  {}",
                doc.source_document, doc.category, doc.chunk_count, indexed
            );
        }
        let total: usize = documents.iter().map(|d| d.chunk_count).sum();
        println!("{} documents, {} chunks", documents.len(), total);
        Ok(())
    }
}
