use crate::config::{Assignment, BenchConfig};
use crate::profile::ImpairmentProfile;
use crate::reducer::{reduce_samples, BenchSummary};
use crate::repository::ResultRepository;
use crate::result::MixedReport;
use crate::runner::{CancellationFlag, RunBudget, TestRunner};
use crate::sweep::types::{SweepProgress, SweepReport};
use crate::testspec::TestSpec;
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Runs every assignment across a fleet
///
/// One task per machine; a machine's runs happen strictly one after another
/// in VPN, profile, test order.
pub struct BenchmarkSweep {
    runner: TestRunner,
    profiles: Arc<Vec<ImpairmentProfile>>,
    tests: Arc<Vec<TestSpec>>,
    budget: RunBudget,
    repository: Option<ResultRepository>,
    progress: Arc<RwLock<SweepProgress>>,
}

struct MachinePlan {
    run_id: String,
    runner: TestRunner,
    profiles: Arc<Vec<ImpairmentProfile>>,
    tests: Arc<Vec<TestSpec>>,
    budget: RunBudget,
    repository: Option<ResultRepository>,
    progress: Arc<RwLock<SweepProgress>>,
}

impl BenchmarkSweep {
    pub fn new(
        runner: TestRunner,
        profiles: Vec<ImpairmentProfile>,
        tests: Vec<TestSpec>,
        budget: RunBudget,
    ) -> Self {
        Self {
            runner,
            profiles: Arc::new(profiles),
            tests: Arc::new(tests),
            budget,
            repository: None,
            progress: Arc::new(RwLock::new(SweepProgress::default())),
        }
    }

    pub fn from_config(config: &BenchConfig, runner: TestRunner) -> Self {
        Self::new(
            runner,
            config.profiles.clone(),
            config.tests.clone(),
            config.budgets.run_budget(),
        )
    }

    /// Persist every outcome as it is produced
    pub fn with_repository(mut self, repository: ResultRepository) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Flag that stops the sweep from starting new runs
    pub fn cancellation(&self) -> CancellationFlag {
        self.runner.cancellation()
    }

    pub fn progress(&self) -> SweepProgress {
        *self.progress.read()
    }

    pub async fn run(&self, assignments: Vec<Assignment>) -> SweepReport {
        let run_id = Uuid::new_v4().to_string();
        let per_assignment = self.profiles.len() * self.tests.len();

        let mut by_machine: BTreeMap<String, Vec<Assignment>> = BTreeMap::new();
        for assignment in assignments {
            by_machine
                .entry(assignment.machine.name.clone())
                .or_default()
                .push(assignment);
        }

        *self.progress.write() = SweepProgress {
            planned: by_machine.values().map(Vec::len).sum::<usize>() * per_assignment,
            ..Default::default()
        };
        tracing::info!(
            run_id = %run_id,
            machines = by_machine.len(),
            planned = self.progress().planned,
            "starting benchmark sweep"
        );

        let handles: Vec<_> = by_machine
            .into_iter()
            .map(|(machine, assignments)| {
                let plan = MachinePlan {
                    run_id: run_id.clone(),
                    runner: self.runner.clone(),
                    profiles: self.profiles.clone(),
                    tests: self.tests.clone(),
                    budget: self.budget,
                    repository: self.repository.clone(),
                    progress: self.progress.clone(),
                };
                (machine, tokio::spawn(plan.run(assignments)))
            })
            .collect();

        let (machines, tasks): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let mut reports = Vec::new();
        for (machine, joined) in machines.into_iter().zip(join_all(tasks).await) {
            match joined {
                Ok(machine_reports) => reports.extend(machine_reports),
                Err(e) => tracing::error!(machine = %machine, "machine task aborted: {e}"),
            }
        }

        let progress = self.progress();
        let cancelled = self.cancellation().is_cancelled();
        tracing::info!(
            run_id = %run_id,
            completed = progress.completed,
            failed = progress.failed,
            skipped = progress.skipped,
            cancelled,
            "benchmark sweep finished"
        );

        SweepReport {
            run_id,
            reports,
            progress,
            cancelled,
        }
    }
}

impl MachinePlan {
    async fn run(self, assignments: Vec<Assignment>) -> Vec<MixedReport<BenchSummary>> {
        let cancel = self.runner.cancellation();
        let mut reports = Vec::new();

        for assignment in &assignments {
            for profile in self.profiles.iter() {
                for spec in self.tests.iter() {
                    if cancel.is_cancelled() {
                        self.progress.write().skipped += 1;
                        continue;
                    }

                    let result = self
                        .runner
                        .run(spec, &assignment.vpn, &assignment.machine, profile, &self.budget)
                        .await
                        .and_then(|raw| reduce_samples(&raw));

                    // An abandoned run says nothing about the VPN; keep any stored outcome
                    if result.is_cancelled() {
                        self.progress.write().skipped += 1;
                        continue;
                    }

                    let report = MixedReport::new(
                        assignment.machine.name.clone(),
                        assignment.vpn.clone(),
                        profile.name.clone(),
                        spec.kind,
                        result,
                    );

                    if let Some(repository) = &self.repository {
                        if let Err(e) = repository.save_for_run(&self.run_id, &report).await {
                            tracing::warn!(
                                "Failed to persist {}/{}/{}: {}",
                                report.machine_name,
                                report.vpn_name,
                                report.profile_name,
                                e
                            );
                        }
                    }

                    {
                        let mut progress = self.progress.write();
                        progress.completed += 1;
                        if report.result.is_err() {
                            progress.failed += 1;
                        }
                    }
                    reports.push(report);
                }
            }
        }

        reports
    }
}
