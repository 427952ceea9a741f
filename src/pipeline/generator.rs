use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::{PunitoError, Result};
use crate::ingest::read_class_file;
use crate::llm::ChatModel;
use crate::models::Bundle;
use crate::pipeline::layout::RunLayout;
use crate::pipeline::{initial_vars, run_stages, Stage};
use crate::postprocess::finalize;
use crate::prompts::PromptLibrary;
use crate::slicing::plan_class;

/// Outcome of one class-level generation run.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub class_name: String,
    pub class_dir: PathBuf,
    pub test_class: PathBuf,
    pub merged_class: PathBuf,
    pub bundles: usize,
    /// `(public method, dependency)` of bundles whose stages failed.
    pub failed: Vec<(String, String)>,
    pub elapsed: String,
}

/// Plans a class, runs every bundle through the stages on a bounded pool,
/// then merges and deduplicates the fragments.
pub struct TestsGenerator {
    model: Arc<dyn ChatModel>,
    library: Arc<PromptLibrary>,
    stages: Arc<Vec<Stage>>,
    concurrency: usize,
    test_suffix: String,
    test_example: Arc<String>,
    output_dir: PathBuf,
}

struct BundleJob {
    bundle: Bundle,
    dir: PathBuf,
}

impl TestsGenerator {
    pub fn new(model: Arc<dyn ChatModel>, config: &Config) -> Result<Self> {
        let generation = &config.settings.generation;
        generation.validate()?;
        Ok(Self {
            model,
            library: Arc::new(PromptLibrary::new(config.prompts_dir())),
            stages: Arc::new(generation.stages()?),
            concurrency: generation.concurrency,
            test_suffix: generation.test_suffix.clone(),
            test_example: Arc::new(config.test_example()?),
            output_dir: config.output_dir(),
        })
    }

    /// Generate a test class for the `.java` file at `path`.
    pub async fn generate(&self, path: &Path) -> Result<GenerationReport> {
        let started = Instant::now();
        let class = read_class_file(path)?;
        let plan = plan_class(&class)?;
        let layout = RunLayout::start(&self.output_dir, &class.class_name);
        info!(
            class = %class.class_name,
            bundles = plan.bundle_count(),
            run = %layout.run_dir.display(),
            "starting generation"
        );

        let jobs: Vec<BundleJob> = plan
            .bundles()
            .into_iter()
            .map(|bundle| BundleJob {
                dir: layout.bundle_dir(&bundle.target, &bundle.dependency),
                bundle,
            })
            .collect();
        let bundles = jobs.len();

        let (fragments, failed) = self.dispatch(jobs).await;
        if fragments.is_empty() {
            error!(class = %class.class_name, "no bundle produced tests");
            return Err(PunitoError::NoFragments {
                class: class.class_name,
            });
        }

        let texts: Vec<String> = fragments.into_iter().map(|(_, text)| text).collect();
        // The class name must match the file the merged tests are written to.
        let test_class_name = format!("{}{}", class.class_name, self.test_suffix);
        let finalized = finalize(&test_class_name, &texts)?;
        let merged_class = layout.merged_class_path(&self.test_suffix);
        let test_class = layout.test_class_path(&self.test_suffix);
        tokio::fs::create_dir_all(layout.class_dir()).await?;
        tokio::fs::write(&merged_class, &finalized.merged).await?;
        tokio::fs::write(&test_class, &finalized.deduplicated).await?;

        let elapsed = format_elapsed(started.elapsed());
        info!(
            class = %class.class_name,
            failed = failed.len(),
            path = %test_class.display(),
            "tests generated in {elapsed}"
        );
        Ok(GenerationReport {
            class_name: class.class_name,
            class_dir: layout.class_dir(),
            test_class,
            merged_class,
            bundles,
            failed,
            elapsed,
        })
    }

    /// Run every job, at most `concurrency` at a time. Returns the fragments
    /// ordered by (public method, dependency) and the keys of failed jobs.
    async fn dispatch(
        &self,
        jobs: Vec<BundleJob>,
    ) -> (Vec<((String, String), String)>, Vec<(String, String)>) {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set = JoinSet::new();

        for job in jobs {
            let semaphore = Arc::clone(&semaphore);
            let model = Arc::clone(&self.model);
            let library = Arc::clone(&self.library);
            let stages = Arc::clone(&self.stages);
            let test_example = Arc::clone(&self.test_example);
            join_set.spawn(async move {
                let key = (job.bundle.target.clone(), job.bundle.dependency.clone());
                let result = async {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| PunitoError::Other("worker pool closed".into()))?;
                    debug!(target_method = %key.0, dependency = %key.1, "bundle started");
                    let vars = initial_vars(
                        &job.bundle.target,
                        &job.bundle.dependency,
                        &job.bundle.source,
                        &test_example,
                    );
                    run_stages(model.as_ref(), &library, &stages, vars, &job.dir).await
                }
                .await;
                (key, result)
            });
        }

        let mut fragments = Vec::new();
        let mut failed = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((key, Ok(text))) => {
                    debug!(target_method = %key.0, dependency = %key.1, "bundle finished");
                    fragments.push((key, text));
                }
                Ok((key, Err(e))) => {
                    error!(target_method = %key.0, dependency = %key.1, error = %e, "bundle failed");
                    failed.push(key);
                }
                Err(e) => error!(error = %e, "bundle task aborted"),
            }
        }
        fragments.sort_by(|a, b| a.0.cmp(&b.0));
        failed.sort();
        (fragments, failed)
    }
}

/// Render a duration as `1 h 2 min 3.456 sec`, omitting leading zero units.
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs_f64();
    let hours = (total / 3600.0).floor();
    let minutes = ((total - hours * 3600.0) / 60.0).floor();
    let seconds = total - hours * 3600.0 - minutes * 60.0;
    if hours > 0.0 {
        format!("{hours:.0} h {minutes:.0} min {seconds:.3} sec")
    } else if minutes > 0.0 {
        format!("{minutes:.0} min {seconds:.3} sec")
    } else {
        format!("{seconds:.3} sec")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::ScriptedModel;
    use tempfile::TempDir;

    const ACCOUNT: &str = "\
package bank;

public class Account {
    private int balance;

    public void deposit(int amount) {
        validate(amount);
        balance += amount;
    }

    public void withdraw(int amount) {
        validate(amount);
        balance -= amount;
    }

    private void validate(int amount) {
        if (amount <= 0) {
            throw new IllegalArgumentException();
        }
    }
}
";

    const FRAGMENT: &str = "\
```java
import org.junit.jupiter.api.Test;
import org.mockito.InjectMocks;

public class AccountMockitoTest {
    @InjectMocks
    private Account account;

    @Test
    void depositsPositiveAmount() {
        // given
        int amount = 5;
        // when
        account.deposit(amount);
        // then
        assertEquals(5, account.getBalance());
    }
}
```";

    fn setup(stages: &[&str]) -> (TempDir, Config, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let class_path = tmp.path().join("Account.java");
        std::fs::write(&class_path, ACCOUNT).unwrap();
        let mut config = Config::new(tmp.path());
        config.settings.generation.stages = stages.iter().map(|s| (*s).to_string()).collect();
        config.settings.generation.concurrency = 2;
        (tmp, config, class_path)
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(Duration::from_millis(3456)), "3.456 sec");
        assert_eq!(format_elapsed(Duration::from_millis(62_500)), "1 min 2.500 sec");
        assert_eq!(
            format_elapsed(Duration::from_millis(3_723_456)),
            "1 h 2 min 3.456 sec"
        );
    }

    #[tokio::test]
    async fn generates_merged_and_deduplicated_classes() {
        let (_tmp, config, class_path) = setup(&["tests"]);
        let model = Arc::new(ScriptedModel::new(FRAGMENT));
        let generator = TestsGenerator::new(model.clone(), &config).unwrap();

        let report = generator.generate(&class_path).await.unwrap();

        // deposit/validate, deposit/deposit, withdraw/validate, withdraw/withdraw
        assert_eq!(report.bundles, 4);
        assert!(report.failed.is_empty());
        assert_eq!(model.calls.lock().unwrap().len(), 4);

        let merged = std::fs::read_to_string(&report.merged_class).unwrap();
        let deduplicated = std::fs::read_to_string(&report.test_class).unwrap();
        assert!(report.test_class.ends_with("Account/AccountMockitoTest.java"));
        assert_eq!(merged.matches("void depositsPositiveAmount").count(), 1);
        assert!(deduplicated.contains("@InjectMocks"));
        assert!(deduplicated.contains("public class AccountMockitoTest {"));
        assert!(report
            .class_dir
            .join("tests_per_public_function/deposit/validate/initial_validate.java")
            .is_file());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn at_most_concurrency_bundles_run_at_once() {
        let (_tmp, config, class_path) = setup(&["tests"]);
        let model = Arc::new(ScriptedModel::new(FRAGMENT).with_delay(Duration::from_millis(50)));
        let generator = TestsGenerator::new(model.clone(), &config).unwrap();

        let report = generator.generate(&class_path).await.unwrap();

        assert_eq!(report.bundles, 4);
        assert_eq!(model.calls.lock().unwrap().len(), 4);
        // setup() configures a pool of two workers.
        assert_eq!(model.peak.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_bundles_are_isolated() {
        let (_tmp, config, class_path) = setup(&["tests"]);
        // Only the withdraw bundles carry `balance -= amount`.
        let model = Arc::new(ScriptedModel::new(FRAGMENT).failing_on("balance -= amount"));
        let generator = TestsGenerator::new(model, &config).unwrap();

        let report = generator.generate(&class_path).await.unwrap();
        assert_eq!(
            report.failed,
            vec![
                ("withdraw".to_string(), "validate".to_string()),
                ("withdraw".to_string(), "withdraw".to_string()),
            ]
        );
        assert!(report.test_class.is_file());
    }

    #[tokio::test]
    async fn every_bundle_failing_is_an_error() {
        let (_tmp, config, class_path) = setup(&["tests"]);
        let model = Arc::new(ScriptedModel::new(FRAGMENT).failing_on("Account"));
        let generator = TestsGenerator::new(model, &config).unwrap();

        let err = generator.generate(&class_path).await.unwrap_err();
        assert!(matches!(err, PunitoError::NoFragments { ref class } if class == "Account"));
    }
}
