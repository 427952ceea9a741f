// Inherit lint configuration from lib.rs for consistency
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::items_after_statements,
    clippy::too_many_lines,
    clippy::fn_params_excessive_bools,
    clippy::needless_pass_by_value
)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use punito::cli::commands::{Cli, Command};
use punito::cli::output::{self, ChunkEntry, DedupeOutput, MergeOutput};
use punito::config::{Config, UserSettings};
use punito::ingest::read_class_file;
use punito::llm::OpenAiCompatibleClient;
use punito::pipeline::layout::{current_version, RunLayout, PER_FUNCTION_DIR};
use punito::pipeline::TestsGenerator;
use punito::postprocess::{self, class_dir_in_run, collect_fragments, latest_run_dir};
use punito::slicing::{format_plan, method_context, plan_files};

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{}", output::format_error(&e));
        std::process::exit(1);
    }
}

/// Logs go to stderr; stdout carries command output.
fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn run(cli: Cli) -> CmdResult {
    let config_path = cli.config;
    match cli.command {
        Command::Generate { file } => cmd_generate(config_path.as_deref(), &file),
        Command::Chunk { files, text } => cmd_chunk(&files, text),
        Command::Context { file, method } => cmd_context(&file, &method),
        Command::Merge { dir, class, out } => cmd_merge(
            config_path.as_deref(),
            dir.as_deref(),
            class.as_deref(),
            out.as_deref(),
        ),
        Command::Dedupe { file, in_place } => cmd_dedupe(&file, in_place),
        Command::Init { force } => cmd_init(config_path.as_deref(), force),
    }
}

type CmdResult = Result<(), Box<dyn std::fmt::Display>>;

fn map_err(e: impl std::fmt::Display + 'static) -> Box<dyn std::fmt::Display> {
    Box::new(e.to_string())
}

fn get_config(path: Option<&Path>) -> Result<Config, Box<dyn std::fmt::Display>> {
    match path {
        Some(path) => Ok(Config::from_file(path)),
        None => Config::from_cwd().map_err(map_err),
    }
}

fn cmd_generate(config_path: Option<&Path>, file: &Path) -> CmdResult {
    let config = get_config(config_path)?;
    let client = OpenAiCompatibleClient::from_settings(&config.settings.llm).map_err(map_err)?;
    let generator = TestsGenerator::new(Arc::new(client), &config).map_err(map_err)?;

    let rt = tokio::runtime::Runtime::new().map_err(map_err)?;
    let report = rt
        .block_on(generator.generate(file))
        .map_err(map_err)?;
    println!("{}", output::format_json(&report));
    Ok(())
}

fn cmd_chunk(files: &[PathBuf], text: bool) -> CmdResult {
    let mut results = plan_files(files);

    // A single class prints its plan directly and fails loudly.
    if results.len() == 1 {
        let (_, plan) = results.remove(0);
        let plan = plan.map_err(map_err)?;
        if text {
            println!("{}", format_plan(&plan));
        } else {
            println!("{}", output::format_json(&plan));
        }
        return Ok(());
    }

    if text {
        for (path, plan) in results {
            println!("// {}", path.display());
            match plan {
                Ok(plan) => println!("{}", format_plan(&plan)),
                Err(e) => println!("// error: {e}"),
            }
        }
    } else {
        let entries: Vec<_> = results
            .into_iter()
            .map(|(path, plan)| {
                let file = path.display().to_string();
                match plan {
                    Ok(plan) => ChunkEntry {
                        file,
                        plan: Some(plan),
                        error: None,
                    },
                    Err(e) => ChunkEntry {
                        file,
                        plan: None,
                        error: Some(e.to_string()),
                    },
                }
            })
            .collect();
        println!("{}", output::format_json(&entries));
    }
    Ok(())
}

fn cmd_context(file: &Path, method: &str) -> CmdResult {
    let class = read_class_file(file).map_err(map_err)?;
    let context = method_context(&class, method).map_err(map_err)?;
    println!("{context}");
    Ok(())
}

fn cmd_merge(
    config_path: Option<&Path>,
    dir: Option<&Path>,
    class: Option<&str>,
    out: Option<&Path>,
) -> CmdResult {
    let config = get_config(config_path)?;
    let class_dir = match dir {
        Some(dir) if dir.join(PER_FUNCTION_DIR).is_dir() => dir.to_path_buf(),
        Some(run_dir) => class_dir_in_run(run_dir, class).map_err(map_err)?,
        None => {
            let run_dir =
                latest_run_dir(&config.output_dir(), current_version()).map_err(map_err)?;
            class_dir_in_run(&run_dir, class).map_err(map_err)?
        }
    };
    let class_name = class_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| map_err(format!("invalid class directory {}", class_dir.display())))?;

    let fragments = collect_fragments(&class_dir).map_err(map_err)?;
    info!(class = %class_name, fragments = fragments.len(), "merging stored fragments");
    let texts: Vec<String> = fragments.into_iter().map(|f| f.text).collect();

    let suffix = &config.settings.generation.test_suffix;
    let finalized =
        postprocess::finalize(&format!("{class_name}{suffix}"), &texts).map_err(map_err)?;

    let layout = RunLayout {
        run_dir: class_dir
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf),
        class_name: class_name.clone(),
    };
    let test_class = match out {
        Some(out) => out.to_path_buf(),
        None => {
            std::fs::write(layout.merged_class_path(suffix), &finalized.merged)
                .map_err(map_err)?;
            layout.test_class_path(suffix)
        }
    };
    std::fs::write(&test_class, &finalized.deduplicated).map_err(map_err)?;

    println!(
        "{}",
        output::format_json(&MergeOutput {
            class_dir: class_dir.display().to_string(),
            fragments: texts.len(),
            test_class: test_class.display().to_string(),
        })
    );
    Ok(())
}

fn cmd_dedupe(file: &Path, in_place: bool) -> CmdResult {
    let source = std::fs::read_to_string(file).map_err(map_err)?;
    let groups = postprocess::find_duplicates(&source).map_err(map_err)?;
    let cleaned = postprocess::remove_duplicates(&source).map_err(map_err)?;

    if in_place {
        std::fs::write(file, &cleaned).map_err(map_err)?;
        println!(
            "{}",
            output::format_json(&DedupeOutput {
                file: file.display().to_string(),
                removed: groups,
            })
        );
    } else {
        print!("{cleaned}");
    }
    Ok(())
}

fn cmd_init(config_path: Option<&Path>, force: bool) -> CmdResult {
    let mut config = get_config(config_path)?;
    if config.config_path.exists() && !force {
        return Err(map_err(format!(
            "{} already exists (use --force to overwrite)",
            config.config_path.display()
        )));
    }
    config.settings = UserSettings::default();
    config.save_settings().map_err(map_err)?;
    println!(
        "{}",
        output::format_json(&serde_json::json!({ "config": config.config_path.display().to_string() }))
    );
    Ok(())
}
