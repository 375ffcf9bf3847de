//! Index command handler.
//!
//! Reads chunk records (one JSON object per line) from `.jsonl` files and
//! writes them to the workspace index.

use anyhow::Context;
use citewise_core::config::AppConfig;
use citewise_knowledge::{ChunkRecord, QaEngine};
use clap::Args;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const CHUNK_FILE_EXTENSION: &str = "jsonl";

/// Index chunk files (JSON lines)
#[derive(Args, Debug)]
pub struct IndexCommand {
    /// Chunk files or directories containing them
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Drop every chunk already indexed for these documents first
    #[arg(long)]
    pub replace: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IndexCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        let files = chunk_files(&self.paths)?;
        if files.is_empty() {
            anyhow::bail!("No .{} files found in {:?}", CHUNK_FILE_EXTENSION, self.paths);
        }

        let mut records = Vec::new();
        for file in &files {
            let parsed = read_records(file)?;
            tracing::info!(file = ?file, records = parsed.len(), "Read chunk file");
            records.extend(parsed);
        }

        let engine = QaEngine::from_workspace(config).await?;
        let (removed, indexed) = if self.replace {
            engine.replace_records(records).await?
        } else {
            (0, engine.index_records(records).await?)
        };
        let documents = engine.list_documents()?.len();

        if self.json {
            let output = serde_json::json!({
                "files": files.len(),
                "chunks": indexed,
                "removed": removed,
                "documents": documents,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            if self.replace {
                println!("Removed {} stale chunks", removed);
            }
            println!(
                "Indexed {} chunks from {} files ({} documents in the index)",
                indexed,
                files.len(),
                documents
            );
        }
        Ok(())
    }
}

/// Expand the given paths into chunk files, sorted for a stable order.
fn chunk_files(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
        } else if path.is_dir() {
            for entry in WalkDir::new(path).follow_links(false) {
                let entry = entry.with_context(|| format!("Failed to walk {:?}", path))?;
                let is_chunk_file = entry
                    .path()
                    .extension()
                    .is_some_and(|ext| ext == CHUNK_FILE_EXTENSION);
                if entry.file_type().is_file() && is_chunk_file {
                    files.push(entry.into_path());
                }
            }
        } else {
            anyhow::bail!("Path does not exist: {:?}", path);
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn read_records(path: &Path) -> anyhow::Result<Vec<ChunkRecord>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    parse_records(&content).with_context(|| format!("Invalid chunk file {:?}", path))
}

fn parse_records(content: &str) -> anyhow::Result<Vec<ChunkRecord>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}", i + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_records_skips_blank_lines() {
        let content = r#"{"text": "Last day to drop: July 15", "source_document": "calendar.pdf", "category": "calendar"}

{"id": "fees-1", "text": "MBA fee", "source_document": "fees.pdf", "category": "fees", "sequence_index": 1}
"#;
        let records = parse_records(content).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, None);
        assert_eq!(records[1].id.as_deref(), Some("fees-1"));
        assert_eq!(records[1].sequence_index, 1);
    }

    #[test]
    fn test_parse_error_names_the_line() {
        let content = "{\"text\": \"ok\", \"source_document\": \"a\", \"category\": \"b\"}\nnot json\n";
        let err = parse_records(content).unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));
    }

    #[test]
    fn test_chunk_files_walks_directories() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("a.jsonl"), "").unwrap();
        fs::write(dir.path().join("nested/b.jsonl"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let files = chunk_files(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension().unwrap() == "jsonl"));
    }

    #[test]
    fn test_replace_flag() {
        #[derive(clap::Parser)]
        struct Cli {
            #[command(flatten)]
            index: IndexCommand,
        }

        let cli = Cli::try_parse_from(["index", "--replace", "chunks/"]).unwrap();
        assert!(cli.index.replace);
        assert_eq!(cli.index.paths, vec![PathBuf::from("chunks/")]);

        let cli = Cli::try_parse_from(["index", "chunks/"]).unwrap();
        assert!(!cli.index.replace);
    }

    #[test]
    fn test_missing_path_is_an_error() {
        assert!(chunk_files(&[PathBuf::from("/definitely/not/here")]).is_err());
    }
}
