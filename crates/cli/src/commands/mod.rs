//! Command handlers for the Citewise CLI.

pub mod ask;
pub mod documents;
pub mod index;
pub mod route;
pub mod search;

pub use ask::AskCommand;
pub use documents::DocumentsCommand;
pub use index::IndexCommand;
pub use route::RouteCommand;
pub use search::SearchCommand;
