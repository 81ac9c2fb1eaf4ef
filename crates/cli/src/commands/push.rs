// Push command: tag and push every reference for every namespace
//
// Design Decision: One work item per namespace. Within a namespace the
// references are processed in order and the first failing command ends that
// namespace; other namespaces are unaffected.
// Design Decision: Ctrl-C cancels cooperatively. Running commands finish,
// no new command or retry starts. A second Ctrl-C exits immediately.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use regseed_fanout::reliability::retry_if;
use regseed_fanout::{summarize, ActionFailure, Outcome, RetryPolicy, RunSummary, WorkerPoolError};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::SeedConfig;
use crate::output::{print_table_header, print_table_row, OutputFormat};
use crate::reference::ImageReference;
use crate::tool::{CommandOutput, ImageTool, ToolError};

/// Conventional exit status for a process stopped by SIGINT
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// The two tool invocations made per reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Tag,
    Push,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Tag => f.write_str("tag"),
            Step::Push => f.write_str("push"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PushError {
    #[error("{step} {reference} failed: {source}")]
    Command {
        reference: String,
        step: Step,
        pushed: Vec<String>,
        #[source]
        source: ToolError,
    },

    #[error("cancelled after pushing {} reference(s)", .pushed.len())]
    Cancelled { pushed: Vec<String> },
}

/// Why a single step gave up
#[derive(Error, Debug)]
enum StepError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceStatus {
    Succeeded,
    Failed,
}

/// Result for one namespace
#[derive(Debug, Clone, Serialize)]
pub struct NamespaceReport {
    pub namespace: String,
    pub status: NamespaceStatus,
    pub pushed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Captured stdout of the failing command
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_output: Option<String>,
}

impl NamespaceReport {
    fn from_outcome(namespace: String, outcome: Outcome<Vec<String>, PushError>) -> Self {
        let failed = |pushed: Vec<String>, error: String| NamespaceReport {
            namespace: namespace.clone(),
            status: NamespaceStatus::Failed,
            pushed,
            failed_step: None,
            failed_reference: None,
            error: Some(error),
            tool_output: None,
        };

        match outcome {
            Outcome::Success(pushed) => NamespaceReport {
                namespace: namespace.clone(),
                status: NamespaceStatus::Succeeded,
                pushed,
                failed_step: None,
                failed_reference: None,
                error: None,
                tool_output: None,
            },
            Outcome::Failure(ActionFailure::Error(error)) => {
                let message = error.to_string();
                match error {
                    PushError::Command {
                        reference,
                        step,
                        pushed,
                        source,
                    } => NamespaceReport {
                        failed_step: Some(step),
                        failed_reference: Some(reference),
                        tool_output: match source {
                            ToolError::NonZeroExit { stdout, .. } if !stdout.is_empty() => {
                                Some(stdout)
                            }
                            _ => None,
                        },
                        ..failed(pushed, message)
                    },
                    PushError::Cancelled { pushed } => failed(pushed, message),
                }
            }
            Outcome::Failure(failure) => failed(vec![], failure.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == NamespaceStatus::Succeeded
    }
}

/// Result of a whole push run
#[derive(Debug, Clone, Serialize)]
pub struct PushReport {
    pub source_image: String,
    pub namespaces: Vec<NamespaceReport>,
    pub summary: RunSummary,
}

struct SeedContext {
    config: SeedConfig,
    tool: ImageTool,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl SeedContext {
    async fn run_step(
        &self,
        step: Step,
        reference: &ImageReference,
    ) -> Result<CommandOutput, StepError> {
        retry_if(
            &self.retry,
            move |attempt| async move {
                if self.cancel.is_cancelled() {
                    return Err(StepError::Cancelled);
                }
                debug!(%step, %reference, attempt, "Running step");
                let output = match step {
                    Step::Tag => self.tool.tag(&self.config.source_image, reference).await?,
                    Step::Push => self.tool.push(reference).await?,
                };
                Ok(output)
            },
            |error| {
                !self.cancel.is_cancelled()
                    && matches!(error, StepError::Tool(source) if source.is_retryable())
            },
        )
        .await
    }
}

#[instrument(skip_all, fields(namespace = %namespace))]
async fn seed_namespace(ctx: Arc<SeedContext>, namespace: String) -> Result<Vec<String>, PushError> {
    info!("Seeding namespace");

    let mut pushed = Vec::new();

    for reference in ctx.config.references(&namespace) {
        for step in [Step::Tag, Step::Push] {
            match ctx.run_step(step, &reference).await {
                Ok(output) => {
                    debug!(
                        %step,
                        %reference,
                        elapsed_ms = output.elapsed.as_millis() as u64,
                        stdout = %output.stdout,
                        "Step finished"
                    );
                }
                Err(StepError::Tool(source)) if ctx.cancel.is_cancelled() => {
                    warn!(%step, %reference, error = %source, "Step failed after interrupt");
                    warn!(pushed = pushed.len(), "Cancelled before completing namespace");
                    return Err(PushError::Cancelled { pushed });
                }
                Err(StepError::Cancelled) => {
                    warn!(pushed = pushed.len(), "Cancelled before completing namespace");
                    return Err(PushError::Cancelled { pushed });
                }
                Err(StepError::Tool(source)) => {
                    return Err(PushError::Command {
                        reference: reference.to_string(),
                        step,
                        pushed,
                        source,
                    });
                }
            }
        }

        pushed.push(reference.to_string());
    }

    info!(pushed = pushed.len(), "Namespace seeded");
    Ok(pushed)
}

/// Seed every configured namespace and collect a report
pub async fn execute(
    config: &SeedConfig,
    cancel: CancellationToken,
) -> Result<PushReport, WorkerPoolError> {
    info!(
        namespaces = ?config.namespaces,
        registry = %config.registry,
        source_image = %config.source_image,
        repositories = ?config.repositories(),
        concurrency = config.concurrency,
        "Starting push"
    );

    let ctx = Arc::new(SeedContext {
        config: config.clone(),
        tool: ImageTool::from_config(config),
        retry: config.retry_policy(),
        cancel,
    });

    let outcomes = regseed_fanout::run(
        config.namespaces.clone(),
        config.concurrency,
        move |namespace| seed_namespace(Arc::clone(&ctx), namespace),
    )
    .await?;

    let summary = summarize(&outcomes);
    let namespaces = config
        .namespaces
        .iter()
        .cloned()
        .zip(outcomes)
        .map(|(namespace, outcome)| NamespaceReport::from_outcome(namespace, outcome))
        .collect();

    Ok(PushReport {
        source_image: config.source_image.clone(),
        namespaces,
        summary,
    })
}

/// Run the push command; returns whether every namespace succeeded
pub async fn run(config: SeedConfig, output: OutputFormat, quiet: bool) -> Result<bool> {
    let cancel = CancellationToken::new();

    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if cancel.is_cancelled() {
                    error!("Interrupted again, exiting");
                    std::process::exit(INTERRUPTED_EXIT_CODE);
                }
                warn!("Interrupted, waiting for running commands to finish (Ctrl-C again to exit)");
                cancel.cancel();
            }
        }
    });

    let report = execute(&config, cancel).await;
    interrupt.abort();
    let report = report?;

    print_report(&report, output, quiet)?;

    Ok(report.summary.all_succeeded())
}

fn print_report(report: &PushReport, output: OutputFormat, quiet: bool) -> Result<()> {
    if !output.is_text() {
        return output.print_value(report);
    }

    if !quiet {
        print_table_header(&[("NAMESPACE", 20), ("STATUS", 10), ("PUSHED", 8), ("ERROR", 60)]);
        for ns in &report.namespaces {
            let status = if ns.is_success() { "ok" } else { "failed" };
            let pushed = ns.pushed.len().to_string();
            let error = ns.error.as_deref().unwrap_or("-");
            print_table_row(&[(&ns.namespace, 20), (status, 10), (&pushed, 8), (error, 60)]);
        }
        println!();
        println!(
            "Seeded {}/{} namespaces ({} failed)",
            report.summary.succeeded, report.summary.total, report.summary.failed
        );
    }

    for ns in report.namespaces.iter().filter(|ns| !ns.is_success()) {
        if let Some(error) = &ns.error {
            eprintln!("{}: {}", ns.namespace, error);
        }
    }

    Ok(())
}
