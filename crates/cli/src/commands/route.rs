//! Route command handler.
//!
//! Shows the intent and parameters a question is routed to, without
//! opening the index.

use citewise_core::config::AppConfig;
use citewise_knowledge::{EngineConfig, FunctionRegistry, IntentRouter};
use clap::Args;

/// Show how a question would be routed
#[derive(Args, Debug)]
pub struct RouteCommand {
    /// Question to classify
    pub question: Option<String>,

    /// List the structured functions instead
    #[arg(long, conflicts_with = "question")]
    pub functions: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl RouteCommand {
    pub fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        if self.functions {
            let engine_config = EngineConfig::for_app(config)?;
            let functions = FunctionRegistry::standard(&engine_config).describe();

            if self.json {
                println!("{}", serde_json::to_string_pretty(&functions)?);
            } else {
                for function in functions {
                    println!("{}: {}", function.name, function.description);
                    for param in function.parameters {
                        let required = if param.required { "required" } else { "optional" };
                        println!("    {} ({}) {}", param.name, required, param.description);
                    }
                }
            }
            return Ok(());
        }

        let Some(question) = &self.question else {
            anyhow::bail!("No question provided");
        };
        let intent = IntentRouter::new().route(question);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&intent)?);
        } else {
            println!("{}", intent.kind);
            for (name, value) in &intent.parameters {
                println!("  {} = {}", name, value);
            }
        }
        Ok(())
    }
}
