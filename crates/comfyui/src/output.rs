//! Finding and downloading a finished job's output.
//!
//! The executor does not tell us synchronously when a job is done or what
//! it named the file. Each [`OutputLocator`] is one way of finding out;
//! they are tried in order and the first hit wins. [`poll_output`] repeats
//! that under a [`RetryPolicy`].

use async_trait::async_trait;
use atelier_core::naming::candidate_filenames;
use tokio_util::sync::CancellationToken;

use crate::api::{history_outputs, ComfyUIApi, ComfyUIApiError, OutputFile};
use crate::retry::{retry_until, RetryOutcome, RetryPolicy};

/// Counters tried by [`FilenamePatternLocator::default`].
pub const DEFAULT_MAX_COUNTER: u32 = 4;

/// What we know about the job whose output we are looking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputQuery {
    pub prompt_id: String,
    pub filename_prefix: String,
}

/// A downloaded output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedOutput {
    pub file: OutputFile,
    pub bytes: Vec<u8>,
    /// Name of the locator that found it.
    pub located_by: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Ready(LocatedOutput),
    /// Nothing showed up in time; the job may still finish later.
    TimedOut { attempts: u32 },
    Cancelled,
}

#[async_trait]
pub trait OutputLocator: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when this strategy found nothing (yet).
    async fn locate(
        &self,
        api: &ComfyUIApi,
        query: &OutputQuery,
    ) -> Result<Option<LocatedOutput>, ComfyUIApiError>;
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Reads `/history/{prompt_id}` and downloads the first saved image,
/// preferring one that carries our prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryLocator;

#[async_trait]
impl OutputLocator for HistoryLocator {
    fn name(&self) -> &'static str {
        "history"
    }

    async fn locate(
        &self,
        api: &ComfyUIApi,
        query: &OutputQuery,
    ) -> Result<Option<LocatedOutput>, ComfyUIApiError> {
        let history = api.get_history(&query.prompt_id).await?;
        let files = history_outputs(&history, &query.prompt_id);
        let Some(file) = files
            .iter()
            .find(|f| f.filename.starts_with(&query.filename_prefix))
            .or_else(|| files.first())
        else {
            return Ok(None);
        };

        Ok(api.view_file(file).await?.map(|bytes| LocatedOutput {
            file: file.clone(),
            bytes,
            located_by: self.name(),
        }))
    }
}

/// Asks `/view` for every name the save node could have produced for
/// our prefix.
#[derive(Debug, Clone, Copy)]
pub struct FilenamePatternLocator {
    pub max_counter: u32,
}

impl Default for FilenamePatternLocator {
    fn default() -> Self {
        Self {
            max_counter: DEFAULT_MAX_COUNTER,
        }
    }
}

#[async_trait]
impl OutputLocator for FilenamePatternLocator {
    fn name(&self) -> &'static str {
        "filename_pattern"
    }

    async fn locate(
        &self,
        api: &ComfyUIApi,
        query: &OutputQuery,
    ) -> Result<Option<LocatedOutput>, ComfyUIApiError> {
        for name in candidate_filenames(&query.filename_prefix, self.max_counter) {
            let file = OutputFile::output(&name);
            if let Some(bytes) = api.view_file(&file).await? {
                return Ok(Some(LocatedOutput {
                    file,
                    bytes,
                    located_by: self.name(),
                }));
            }
        }
        Ok(None)
    }
}

/// History first, then filename probing.
pub fn default_locators(max_counter: u32) -> Vec<Box<dyn OutputLocator>> {
    vec![
        Box::new(HistoryLocator),
        Box::new(FilenamePatternLocator { max_counter }),
    ]
}

// ---------------------------------------------------------------------------
// Locate / poll
// ---------------------------------------------------------------------------

/// Try each locator in order; stop at the first hit.
///
/// A failing locator is logged and skipped. The call only fails when
/// every locator failed.
pub async fn locate_output(
    api: &ComfyUIApi,
    locators: &[Box<dyn OutputLocator>],
    query: &OutputQuery,
) -> Result<Option<LocatedOutput>, ComfyUIApiError> {
    let mut last_error = None;
    let mut any_answered = false;

    for locator in locators {
        match locator.locate(api, query).await {
            Ok(Some(found)) => {
                tracing::info!(
                    prompt_id = %query.prompt_id,
                    locator = locator.name(),
                    filename = %found.file.filename,
                    bytes = found.bytes.len(),
                    "Output located",
                );
                return Ok(Some(found));
            }
            Ok(None) => any_answered = true,
            Err(e) => {
                tracing::debug!(
                    prompt_id = %query.prompt_id,
                    locator = locator.name(),
                    error = %e,
                    "Output locator failed",
                );
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) if !any_answered => Err(e),
        _ => Ok(None),
    }
}

/// Poll until an output shows up, the policy is exhausted, or `cancel`
/// fires.
pub async fn poll_output(
    api: &ComfyUIApi,
    locators: &[Box<dyn OutputLocator>],
    query: &OutputQuery,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> PollOutcome {
    let outcome = retry_until(policy, cancel, "poll_output", |_| {
        locate_output(api, locators, query)
    })
    .await;
    match outcome {
        RetryOutcome::Ready(found) => PollOutcome::Ready(found),
        RetryOutcome::Exhausted { attempts } => {
            tracing::warn!(
                prompt_id = %query.prompt_id,
                attempts,
                "Output not found in time, check back later",
            );
            PollOutcome::TimedOut { attempts }
        }
        RetryOutcome::Cancelled => PollOutcome::Cancelled,
    }
}
