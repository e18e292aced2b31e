//! Suite runner: one fresh browser context per scenario, bounded parallelism

use std::path::PathBuf;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::E2eResult;
use crate::page::PageFactory;
use crate::scenario::{run_scenario, Scenario, ScenarioResult};
use crate::wait::Timeouts;

/// Configuration for the suite runner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Root URL of the app under test
    pub base_url: String,

    pub timeouts: Timeouts,

    /// Scenarios in flight at once; each one owns its own browser context
    pub parallelism: usize,

    /// Master seed for identity generation (None = random)
    pub seed: Option<u64>,

    /// Output directory for results
    pub output_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeouts: Timeouts::default(),
            parallelism: 4,
            seed: None,
            output_dir: PathBuf::from("test-results"),
        }
    }
}

/// Result of running all scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    /// Master seed; pass it back with `--seed` to replay the same identities
    pub seed: u64,
    pub generated_at: String,
    pub results: Vec<ScenarioResult>,
}

impl SuiteResult {
    pub fn success(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &ScenarioResult> {
        self.results.iter().filter(|r| !r.success)
    }
}

/// Runs scenarios against pages produced by `F`
pub struct ScenarioRunner<F: PageFactory> {
    factory: F,
    config: RunnerConfig,
}

impl<F: PageFactory> ScenarioRunner<F> {
    pub fn new(factory: F, config: RunnerConfig) -> Self {
        Self { factory, config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Run one scenario in a fresh browser context
    pub async fn run_one(&self, scenario: &Scenario, seed: u64) -> ScenarioResult {
        let page = match self.factory.new_page(scenario.viewport).await {
            Ok(page) => page,
            Err(e) => {
                error!("Could not open a browser context for {}: {}", scenario.name, e);
                return ScenarioResult::not_started(scenario, seed, &e);
            }
        };

        run_scenario(page, scenario, &self.config.base_url, &self.config.timeouts, seed).await
    }

    /// Run a list of scenarios, reporting them in input order
    pub async fn run_all(&self, scenarios: &[Scenario]) -> SuiteResult {
        let start = Instant::now();
        let master_seed = self.config.seed.unwrap_or_else(rand::random);
        let mut seeds = StdRng::seed_from_u64(master_seed);

        info!(
            "Running {} scenario(s) against {} (seed {}, parallelism {})...",
            scenarios.len(),
            self.config.base_url,
            master_seed,
            self.config.parallelism
        );

        let planned: Vec<(&Scenario, u64)> = scenarios.iter().map(|s| (s, seeds.gen())).collect();

        let results: Vec<ScenarioResult> = stream::iter(planned)
            .map(|(scenario, seed)| async move {
                let result = self.run_one(scenario, seed).await;
                if result.success {
                    info!("✓ {} ({} ms)", result.name, result.duration_ms);
                } else {
                    error!(
                        "✗ {} - {}",
                        result.name,
                        result.error.as_deref().unwrap_or("unknown error")
                    );
                }
                result
            })
            .buffered(self.config.parallelism.max(1))
            .collect()
            .await;

        let passed = results.iter().filter(|r| r.success).count();
        let failed = results.len() - passed;
        let duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!("Scenario Results: {} passed, {} failed ({} ms)", passed, failed, duration_ms);

        SuiteResult {
            total: results.len(),
            passed,
            failed,
            duration_ms,
            seed: master_seed,
            generated_at: chrono::Utc::now().to_rfc3339(),
            results,
        }
    }

    /// Write suite results to JSON file
    pub fn write_results(&self, results: &SuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        debug!("Wrote {} result(s)", results.results.len());
        info!("Results written to: {}", path.display());
        Ok(path)
    }
}
