//! The mining pipeline: propose ideas, generate artifacts, execute them,
//! and repair failures within a bounded retry budget.
//!
//! Every idea ends in exactly one terminal status and exactly one ledger
//! row. The retry budget bounds executions per idea at `max_retries + 1`;
//! an idea whose generation step yields nothing is never executed at all.

use crate::artifact::ArtifactLoader;
use crate::collaborator::{Collaborator, Idea};
use crate::config::SeedTask;
use crate::errors::LedgerError;
use crate::ledger::{AuditRecord, DELETED_SENTINEL, LedgerRecorder, TerminalStatus};
use crate::runner::FactorRunner;
use anyhow::Result;
use tracing::{error, info, warn};

/// Terminal outcome of one processed idea.
#[derive(Debug, Clone)]
pub struct IdeaReport {
    /// Unique artifact name, or the idea's own name when no artifact was
    /// ever assigned one.
    pub factor_name: String,
    pub status: TerminalStatus,
    /// Path recorded in the ledger: a real path for retained artifacts,
    /// the deleted sentinel for failures, empty for generation failures.
    pub code_path: String,
    /// How many times the artifact was actually executed.
    pub executions: u32,
}

/// Counts across one full run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MiningSummary {
    pub ideas: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub generation_failed: usize,
}

impl MiningSummary {
    fn tally(&mut self, status: TerminalStatus) {
        self.ideas += 1;
        match status {
            TerminalStatus::Success => self.succeeded += 1,
            TerminalStatus::Fail => self.failed += 1,
            TerminalStatus::GenCodeFail => self.generation_failed += 1,
        }
    }
}

impl std::fmt::Display for MiningSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ideas processed: {} succeeded, {} failed, {} produced no code",
            self.ideas, self.succeeded, self.failed, self.generation_failed
        )
    }
}

/// Drives one collaborator through a list of seed tasks.
pub struct MiningPipeline<C: Collaborator> {
    collaborator: C,
    loader: ArtifactLoader,
    runner: FactorRunner,
    recorder: LedgerRecorder,
    max_retries: u32,
}

impl<C: Collaborator> MiningPipeline<C> {
    pub fn new(
        collaborator: C,
        loader: ArtifactLoader,
        runner: FactorRunner,
        recorder: LedgerRecorder,
        max_retries: u32,
    ) -> Self {
        Self {
            collaborator,
            loader,
            runner,
            recorder,
            max_retries,
        }
    }

    /// Process every task sequentially. Ledger write failures abort the
    /// run; a ledger that cannot record outcomes makes them unauditable.
    pub async fn run(&mut self, tasks: &[SeedTask]) -> Result<MiningSummary> {
        let mut summary = MiningSummary::default();
        if tasks.is_empty() {
            warn!("no seed tasks configured; nothing to do");
            return Ok(summary);
        }

        for task in tasks {
            info!(seed = %task.idea, variations = task.variations, "expanding seed idea");
            let ideas = self.collaborator.propose(&task.idea, task.variations).await;
            if ideas.is_empty() {
                error!(seed = %task.idea, "no usable ideas proposed, skipping seed");
                continue;
            }

            for idea in &ideas {
                if !idea.is_complete() {
                    warn!(name = %idea.name, "skipping incomplete idea");
                    continue;
                }
                info!(factor = %idea.name, "processing idea");
                let report = self.process_idea(idea).await;
                self.record_outcome(&task.idea, idea, &report)?;
                summary.tally(report.status);
            }
        }
        Ok(summary)
    }

    /// Take one idea to a terminal status.
    ///
    /// The artifact name assigned by the first load is pinned for every
    /// later attempt, so repairs overwrite in place and never leave
    /// half-repaired siblings behind. Abandoned artifacts are deleted.
    async fn process_idea(&mut self, idea: &Idea) -> IdeaReport {
        let generated = self
            .collaborator
            .generate_code(idea)
            .await
            .filter(|code| !code.trim().is_empty());
        let Some(mut code) = generated else {
            error!(factor = %idea.name, "collaborator produced no code");
            return IdeaReport {
                factor_name: idea.name.clone(),
                status: TerminalStatus::GenCodeFail,
                code_path: String::new(),
                executions: 0,
            };
        };

        let mut pinned: Option<String> = None;
        let mut executions = 0u32;

        for attempt in 0..=self.max_retries {
            let diagnostic = match self.loader.load(&code, &idea.name, pinned.as_deref()) {
                Ok(loaded) => {
                    pinned = Some(loaded.unique_name.clone());
                    executions += 1;
                    let outcome =
                        self.runner
                            .run(self.loader.host(), &loaded.unit, &loaded.unique_name);
                    if outcome.ok {
                        info!(factor = %loaded.unique_name, attempt, "factor succeeded");
                        return IdeaReport {
                            factor_name: loaded.unique_name,
                            status: TerminalStatus::Success,
                            code_path: loaded.storage_path.display().to_string(),
                            executions,
                        };
                    }
                    warn!(
                        factor = %loaded.unique_name,
                        attempt,
                        detail = %outcome.detail,
                        "execution failed"
                    );
                    outcome.detail
                }
                Err(err) => {
                    if let Some(name) = err.assigned_name() {
                        pinned = Some(name.to_string());
                    }
                    warn!(factor = %idea.name, attempt, error = %err, "artifact failed to load");
                    format!("The code could not be compiled or bound: {err}")
                }
            };

            if attempt == self.max_retries {
                break;
            }
            // The repair prompt must name the pinned artifact, not the
            // original idea: the runner expects the factor column to match
            // the unique name the first load assigned.
            let mut repair_idea = idea.clone();
            if let Some(name) = &pinned {
                repair_idea.name = name.clone();
            }
            match self
                .collaborator
                .repair_code(&code, &diagnostic, &repair_idea)
                .await
            {
                Some(fixed) => code = fixed,
                None => {
                    error!(factor = %idea.name, "collaborator returned no repair, abandoning");
                    break;
                }
            }
        }

        let factor_name = pinned.clone().unwrap_or_else(|| idea.name.clone());
        if let Some(name) = &pinned {
            if let Err(err) = self.loader.discard(name) {
                warn!(factor = %name, error = %err, "failed to delete abandoned artifact");
            }
        }
        IdeaReport {
            factor_name,
            status: TerminalStatus::Fail,
            code_path: DELETED_SENTINEL.to_string(),
            executions,
        }
    }

    fn record_outcome(
        &self,
        seed: &str,
        idea: &Idea,
        report: &IdeaReport,
    ) -> Result<(), LedgerError> {
        self.recorder.record(&AuditRecord {
            provider: self.collaborator.label().to_string(),
            seed_idea: seed.to_string(),
            factor_name: report.factor_name.clone(),
            status: report.status,
            code_path: report.code_path.clone(),
            formula: idea.formula.clone().unwrap_or_default(),
            description: idea.description.clone(),
        })
    }
}
