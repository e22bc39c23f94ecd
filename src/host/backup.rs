//! Backup helper invoked after the application backup.

use crate::errors::Result;
use crate::host::command::{Command, CommandRunner};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Ships or rotates backups once the application has written one
#[async_trait]
pub trait BackupHelper: Send + Sync {
    async fn backup(&self) -> Result<()>;
}

/// Runs a configured helper command
pub struct CommandBackupHelper {
    commands: Arc<dyn CommandRunner>,
    argv: Vec<String>,
}

impl CommandBackupHelper {
    #[must_use]
    pub fn new(commands: Arc<dyn CommandRunner>, argv: Vec<String>) -> Self {
        Self { commands, argv }
    }
}

#[async_trait]
impl BackupHelper for CommandBackupHelper {
    async fn backup(&self) -> Result<()> {
        let Some((program, args)) = self.argv.split_first() else {
            info!("No backup helper configured, skipping");
            return Ok(());
        };
        self.commands
            .run(&Command::new(program.clone()).args(args.iter().cloned()))
            .await?;
        Ok(())
    }
}
