use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use chrono::{DateTime, Local};
use tokio::io::AsyncReadExt;
use tracing::info;

use crate::cli::args::{ConfigAction, ConfigArgs, HistoryArgs, InitArgs, OutputFormat, RunArgs};
use crate::config::loader::get_config_path;
use crate::config::types::RunletConfig;
use crate::engine::{Engine, ExecutionRequest, ExecutionResult};
use crate::error::{Result, RunletError};
use crate::recorder::HistoryRecorder;
use crate::runner::{available_runners, Language};

// ============================================================================
// Execution
// ============================================================================

/// Execute one snippet and print the result envelope
pub async fn run(args: RunArgs, config: RunletConfig, format: OutputFormat) -> Result<()> {
    let source = read_source(&args.file).await?;
    let language = match args.language {
        Some(language) => language,
        None => infer_language(&args.file)?,
    };

    let stdin = match (&args.stdin, &args.stdin_file) {
        (Some(value), _) => Some(value.clone()),
        (None, Some(path)) => Some(tokio::fs::read_to_string(path).await?),
        (None, None) => None,
    };

    let mut request = ExecutionRequest::new(language, source);
    if let Some(stdin) = stdin {
        request = request.with_stdin(stdin);
    }
    if let Some(timeout_ms) = args.timeout_ms {
        request = request.with_timeout_ms(timeout_ms);
    }
    if let Some(memory_limit_mb) = args.memory_limit_mb {
        request = request.with_memory_limit_bytes(memory_limit_mb * 1024 * 1024);
    }

    info!(language = %language, "Submitting snippet");

    let mut engine = Engine::new(config);
    if !args.no_record {
        engine = engine.with_recorder(Arc::new(HistoryRecorder::new()));
    }

    let result = engine.submit(request).await;
    output_result(&result, format);

    Ok(())
}

async fn read_source(file: &Path) -> Result<String> {
    if file == Path::new("-") {
        let mut source = String::new();
        tokio::io::stdin().read_to_string(&mut source).await?;
        Ok(source)
    } else {
        Ok(tokio::fs::read_to_string(file).await?)
    }
}

fn infer_language(file: &Path) -> Result<Language> {
    file.extension()
        .and_then(|extension| extension.to_str())
        .and_then(Language::from_extension)
        .ok_or_else(|| {
            RunletError::Config(format!(
                "cannot infer language from {}; pass --language",
                file.display()
            ))
        })
}

fn output_result(result: &ExecutionResult, format: OutputFormat) {
    match format {
        OutputFormat::Text => {
            print!("{}", result.stdout);
            if !result.stderr.is_empty() {
                eprint!("{}", result.stderr);
                if !result.stderr.ends_with('\n') {
                    eprintln!();
                }
            }
            if let Some(value) = &result.return_value {
                println!("=> {}", value);
            }
            eprintln!(
                "[{}] {} in {} ms, peak {} bytes",
                result.id,
                result.termination_reason,
                result.duration_ms,
                result.peak_memory_bytes
            );
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(result).unwrap_or_default()
            );
        }
    }
}

// ============================================================================
// Introspection
// ============================================================================

/// List supported languages and whether their runtime resolves
pub async fn languages(config: RunletConfig, format: OutputFormat) -> Result<()> {
    let runners = available_runners(&config.runtimes);

    match format {
        OutputFormat::Text => {
            for info in runners {
                if info.available {
                    println!(
                        "{:<12} available  {}",
                        info.language,
                        info.runtime.unwrap_or_default()
                    );
                } else {
                    println!(
                        "{:<12} missing    {}",
                        info.language,
                        info.unavailable_reason.unwrap_or_default()
                    );
                }
            }
        }
        OutputFormat::Json => {
            let entries: Vec<_> = runners
                .iter()
                .map(|info| {
                    serde_json::json!({
                        "language": info.language,
                        "available": info.available,
                        "runtime": info.runtime,
                        "reason": info.unavailable_reason,
                    })
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&entries).unwrap_or_default()
            );
        }
    }

    Ok(())
}

/// Show recently recorded execution results
pub async fn history(args: HistoryArgs, format: OutputFormat) -> Result<()> {
    let recorder = HistoryRecorder::new();
    let entries = recorder.recent(args.limit).await?;

    match format {
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No recorded executions");
                return Ok(());
            }
            for entry in entries {
                let when: DateTime<Local> =
                    DateTime::from(UNIX_EPOCH + Duration::from_secs(entry.recorded_at));
                println!(
                    "{}  {:<10} {:<20} {:>6} ms  {}",
                    when.format("%Y-%m-%d %H:%M:%S"),
                    entry.result.id,
                    entry.result.termination_reason,
                    entry.result.duration_ms,
                    summarize(&entry.result)
                );
            }
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&entries).unwrap_or_default()
            );
        }
    }

    Ok(())
}

fn summarize(result: &ExecutionResult) -> String {
    if let Some(value) = &result.return_value {
        return format!("=> {}", truncate(value, 40));
    }
    let line = result
        .stdout
        .lines()
        .chain(result.stderr.lines())
        .next()
        .unwrap_or("");
    truncate(line, 40)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

// ============================================================================
// Config Commands
// ============================================================================

/// Write a default configuration file
pub async fn init(args: InitArgs) -> Result<()> {
    let path = get_config_path();

    if path.exists() && !args.force {
        return Err(RunletError::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let rendered = toml::to_string_pretty(&RunletConfig::default())
        .map_err(|e| RunletError::Config(e.to_string()))?;
    tokio::fs::write(&path, rendered).await?;

    println!("Wrote {}", path.display());
    Ok(())
}

/// Show or locate the configuration
pub async fn config(args: ConfigArgs, config: RunletConfig) -> Result<()> {
    match args.action {
        ConfigAction::Show => {
            let rendered =
                toml::to_string_pretty(&config).map_err(|e| RunletError::Config(e.to_string()))?;
            println!("{}", rendered);
        }
        ConfigAction::Path => {
            println!("{}", get_config_path().display());
        }
    }
    Ok(())
}
