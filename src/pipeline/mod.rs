//! LLM stage sequencing for one bundle, plus the class-level worker pool.

pub mod generator;
pub mod layout;

pub use generator::{format_elapsed, GenerationReport, TestsGenerator};
pub use layout::RunLayout;

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::error::{PunitoError, Result};
use crate::llm::{transcript, ChatModel};
use crate::prompts::PromptLibrary;

/// One LLM step applied to a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Plan,
    Tests,
    Review,
    Refine,
}

impl Stage {
    /// Every stage in pipeline order.
    pub const ALL: [Stage; 4] = [Stage::Plan, Stage::Tests, Stage::Review, Stage::Refine];

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Tests => "tests",
            Self::Review => "review",
            Self::Refine => "refine",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.name() == name.trim())
            .ok_or_else(|| {
                PunitoError::Config(format!(
                    "unknown stage '{name}', expected one of: plan, tests, review, refine"
                ))
            })
    }

    /// Parse a configured stage list. Stages may be skipped but not reordered.
    pub fn parse_list(names: &[String]) -> Result<Vec<Self>> {
        if names.is_empty() {
            return Err(PunitoError::Config("at least one stage is required".into()));
        }
        let stages = names
            .iter()
            .map(|n| Self::parse(n))
            .collect::<Result<Vec<_>>>()?;
        if stages.windows(2).any(|w| w[0].order() >= w[1].order()) {
            return Err(PunitoError::Config(format!(
                "stages must follow plan, tests, review, refine without repeats: {}",
                names.join(", ")
            )));
        }
        Ok(stages)
    }

    fn order(self) -> usize {
        self as usize
    }

    /// Template rendered for this stage.
    #[must_use]
    pub fn prompt_name(&self) -> &'static str {
        match self {
            Self::Plan => "planner_prompt",
            Self::Tests => "tester_prompt",
            Self::Review => "reviewer_prompt",
            Self::Refine => "refiner_prompt",
        }
    }

    /// Placeholder under which later stages see this stage's output.
    #[must_use]
    pub fn output_key(&self) -> &'static str {
        match self {
            Self::Plan => "tests_plan",
            Self::Tests => "initial_tests",
            Self::Review => "tests_review",
            Self::Refine => "refined_tests",
        }
    }

    #[must_use]
    pub fn file_name(&self, tested: &str) -> String {
        match self {
            Self::Plan => format!("plan_{tested}.txt"),
            Self::Tests => format!("initial_{tested}.java"),
            Self::Review => format!("review_{tested}.txt"),
            Self::Refine => format!("refined_{tested}.java"),
        }
    }
}

/// Placeholders known before any stage has run.
#[must_use]
pub fn initial_vars(
    execution_function: &str,
    tested_function: &str,
    source_code: &str,
    test_example: &str,
) -> HashMap<String, String> {
    let mut vars = HashMap::from([
        ("execution_function_name".to_string(), execution_function.to_string()),
        ("tested_function_name".to_string(), tested_function.to_string()),
        ("source_code".to_string(), source_code.to_string()),
        ("test_example".to_string(), test_example.to_string()),
    ]);
    // Skipped stages render as empty text in later templates.
    for stage in Stage::ALL {
        vars.insert(stage.output_key().to_string(), String::new());
    }
    vars
}

/// Run `stages` in order for one bundle, writing every output and its prompt
/// transcript under `dir`. Returns the output of the last stage.
pub async fn run_stages(
    model: &dyn ChatModel,
    library: &PromptLibrary,
    stages: &[Stage],
    mut vars: HashMap<String, String>,
    dir: &Path,
) -> Result<String> {
    let tested = vars
        .get("tested_function_name")
        .cloned()
        .ok_or_else(|| PunitoError::Other("tested_function_name is not set".into()))?;
    let prompts_dir = dir.join(layout::PROMPTS_DIR);
    tokio::fs::create_dir_all(&prompts_dir).await?;

    let mut last = String::new();
    for stage in stages {
        let template = library.load(stage.prompt_name())?;
        let messages = template.render(&vars)?;
        let file_name = stage.file_name(&tested);
        tokio::fs::write(
            prompts_dir.join(format!("{}_{file_name}", stage.prompt_name())),
            transcript(&messages),
        )
        .await?;

        debug!(stage = stage.name(), tested = %tested, "running stage");
        let output = model.complete(&messages).await?;
        tokio::fs::write(dir.join(&file_name), &output).await?;

        vars.insert(stage.output_key().to_string(), output.clone());
        last = output;
    }
    Ok(last)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::error::{PunitoError, Result};
    use crate::llm::{ChatMessage, ChatModel};

    /// Answers every request with a fixed reply and records the conversations.
    pub struct ScriptedModel {
        reply: String,
        fail_when_user_contains: Option<String>,
        delay: Option<Duration>,
        in_flight: AtomicUsize,
        /// Highest number of requests answered at the same time.
        pub peak: AtomicUsize,
        pub calls: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedModel {
        pub fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                fail_when_user_contains: None,
                delay: None,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Hold every request open for `delay` before answering.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn failing_on(mut self, needle: &str) -> Self {
            self.fail_when_user_contains = Some(needle.to_string());
            self
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            self.calls.lock().unwrap().push(messages.to_vec());
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if let Some(needle) = &self.fail_when_user_contains {
                if messages.iter().any(|m| m.content.contains(needle.as_str())) {
                    return Err(PunitoError::Llm("scripted failure".into()));
                }
            }
            Ok(self.reply.clone())
        }
    }
}
