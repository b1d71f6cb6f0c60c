use crate::cache::CommandCache;
use crate::cancel::CancelToken;
use crate::error::CollectError;
use crate::runner::{CommandLine, CommandRunner, Os};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Runner, cache, platform and cancel token bound together for one run.
#[derive(Clone)]
pub struct CommandExecutor {
    runner: Arc<dyn CommandRunner>,
    cache: Arc<CommandCache>,
    os: Os,
    default_timeout: Duration,
    cancel: CancelToken,
}

impl CommandExecutor {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        cache: Arc<CommandCache>,
        os: Os,
        default_timeout: Duration,
        cancel: CancelToken,
    ) -> Self {
        Self {
            runner,
            cache,
            os,
            default_timeout,
            cancel,
        }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub async fn run(&self, cmd: &CommandLine) -> Result<String, CollectError> {
        self.run_with_timeout(cmd, self.default_timeout).await
    }

    /// Serves from the cache when possible. Only successful output is cached.
    pub async fn run_with_timeout(
        &self,
        cmd: &CommandLine,
        timeout: Duration,
    ) -> Result<String, CollectError> {
        self.cancel.check()?;
        let key = cmd.to_string();
        if let Some(hit) = self.cache.get(&key, self.os) {
            debug!(command = %key, "command cache hit");
            return Ok(hit);
        }

        let output = self.runner.run(cmd, timeout, &self.cancel).await?;
        debug!(
            command = %key,
            elapsed_ms = output.duration.as_millis() as u64,
            "command finished"
        );
        self.cache.put(&key, self.os, output.text.clone());
        Ok(output.text)
    }
}
