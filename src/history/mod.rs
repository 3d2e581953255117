mod functions;
mod memory;

pub use functions::FunctionsHistoryStore;
pub use memory::MemoryHistoryStore;

use async_trait::async_trait;
use log::info;
use std::error::Error;
use std::sync::Arc;
use crate::cli::Args;
use crate::error::HistoryError;
use crate::models::{ RawTurn, Role };

/// The authoritative conversation log.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Appends a turn and returns the id the store assigned to it.
    async fn append_turn(
        &self,
        conversation_id: &str,
        user_id: &str,
        role: Role,
        content: &str
    ) -> Result<Option<String>, HistoryError>;

    /// Up to `max_turns` turns created within the last `lookback_minutes`.
    async fn list_turns(
        &self,
        conversation_id: &str,
        max_turns: usize,
        lookback_minutes: u64
    ) -> Result<Vec<RawTurn>, HistoryError>;
}

pub fn create_history_store(
    args: &Args
) -> Result<Arc<dyn HistoryStore>, Box<dyn Error + Send + Sync>> {
    match args.history_type.to_lowercase().as_str() {
        "functions" => {
            let store = FunctionsHistoryStore::new(args)?;
            Ok(Arc::new(store))
        }
        "memory" => Ok(Arc::new(MemoryHistoryStore::new())),
        _ =>
            Err(
                Box::new(
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("Unsupported history store type: {}", args.history_type)
                    )
                )
            ),
    }
}

pub fn initialize_history_store(
    args: &Args
) -> Result<Arc<dyn HistoryStore>, Box<dyn Error + Send + Sync>> {
    info!(
        "Conversation turns will be stored in: {} at {}",
        args.history_type,
        args.functions_url().unwrap_or("process memory")
    );
    create_history_store(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn unknown_store_type_is_rejected() {
        let args = Args::parse_from(["edu-turns", "--history-type", "sqlite"]);
        assert!(create_history_store(&args).is_err());
    }

    #[test]
    fn functions_store_requires_base_url() {
        let args = Args::parse_from(["edu-turns", "--history-type", "functions"]);
        assert!(create_history_store(&args).is_err());
    }

    #[test]
    fn memory_store_needs_no_configuration() {
        let args = Args::parse_from(["edu-turns", "--history-type", "memory"]);
        assert!(create_history_store(&args).is_ok());
    }
}
