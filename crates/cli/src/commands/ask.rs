//! Ask command handler.
//!
//! Answers a question from the indexed documents, optionally streaming the
//! answer as it is generated.

use anyhow::{bail, Context};
use citewise_core::config::AppConfig;
use citewise_knowledge::{Answer, AnswerEvent, CitationStyle, HistoryTurn, QaEngine};
use clap::{Args, ValueEnum};
use futures::StreamExt;
use std::io::Write;
use std::path::{Path, PathBuf};

/// How citations are printed under the answer.
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum StyleArg {
    #[default]
    Standard,
    Mla,
    Apa,
}

impl From<StyleArg> for CitationStyle {
    fn from(style: StyleArg) -> Self {
        match style {
            StyleArg::Standard => CitationStyle::Standard,
            StyleArg::Mla => CitationStyle::Mla,
            StyleArg::Apa => CitationStyle::Apa,
        }
    }
}

/// Answer a question from the indexed documents
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Earlier turns of the conversation: a JSON array of {"question", "answer"}
    #[arg(long)]
    pub history: Option<PathBuf>,

    /// Print the answer as it is generated
    #[arg(long)]
    pub stream: bool,

    /// Citation style
    #[arg(long, value_enum, default_value_t = StyleArg::Standard)]
    pub style: StyleArg,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        let question = self.question()?;
        let history = match &self.history {
            Some(path) => load_history(path)?,
            None => Vec::new(),
        };
        tracing::debug!(turns = history.len(), "Loaded conversation history");

        let engine = QaEngine::from_workspace(config).await?;

        let answer = if self.stream && !self.json {
            self.stream_answer(&engine, &question, &history).await?
        } else {
            let answer = engine.answer_question(&question, &history).await?;
            if !self.json {
                println!("{}", answer.text);
            }
            answer
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&answer)?);
        } else {
            self.print_sources(&answer);
        }
        Ok(())
    }

    async fn stream_answer(
        &self,
        engine: &QaEngine,
        question: &str,
        history: &[HistoryTurn],
    ) -> anyhow::Result<Answer> {
        let mut stream = engine.stream_answer(question, history).await?;
        let mut stdout = std::io::stdout();
        let mut printed = String::new();

        while let Some(event) = stream.next().await {
            match event? {
                AnswerEvent::Token(token) => {
                    print!("{}", token);
                    stdout.flush().ok();
                    printed.push_str(&token);
                }
                AnswerEvent::Completed(answer) => {
                    // Fallback and disclaimer text never pass through the token stream.
                    if printed.is_empty() {
                        println!("{}", answer.text);
                    } else if let Some(rest) = answer.text.strip_prefix(printed.trim()) {
                        println!("{}", rest);
                    } else {
                        println!("\n\n{}", answer.text);
                    }
                    return Ok(answer);
                }
            }
        }

        bail!("Answer stream ended without a final answer")
    }

    fn print_sources(&self, answer: &Answer) {
        if answer.citations.is_empty() {
            return;
        }
        let style = CitationStyle::from(self.style);
        println!();
        println!("Sources:");
        for citation in &answer.citations {
            println!("  [{}] {}", citation.rank, citation.format(style));
        }
    }

    fn question(&self) -> anyhow::Result<String> {
        let question = match (&self.question, &self.file) {
            (Some(question), _) => question.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read question from {:?}", path))?,
            (None, None) => bail!("No question provided"),
        };

        let question = question.trim();
        if question.is_empty() {
            bail!("Question is empty");
        }
        Ok(question.to_string())
    }
}

fn load_history(path: &Path) -> anyhow::Result<Vec<HistoryTurn>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history from {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid history file {:?}", path))
}
