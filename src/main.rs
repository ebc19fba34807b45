//! medrecommend: Disease and medicine prediction
//!
//! Main entry point for the interactive terminal application.

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use medrecommend::adapters::json_store::JsonRecordStore;
use medrecommend::domain::{QueryInput, RankedLabel};
use medrecommend::{PredictionOutcome, Predictor, PredictorConfig, TrainingConfig};

const DEFAULT_DATA_PATH: &str = "output.json";
const DEFAULT_LOG_FILE: &str = "medrecommend.log";

fn init_logging() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    // Logs must not interleave with the prompts on an interactive terminal.
    // Default behavior:
    // - interactive TTY: log to a file
    // - non-interactive: log to stderr
    let log_mode = std::env::var("MEDRECOMMEND_LOG_MODE").unwrap_or_else(|_| "auto".to_string());

    let use_file = match log_mode.as_str() {
        "file" => true,
        "stderr" => false,
        // auto
        _ => io::stdout().is_terminal(),
    };

    let (writer, guard) = if use_file {
        let log_file = std::env::var("MEDRECOMMEND_LOG_FILE")
            .unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string());

        if let Some(parent) = std::path::Path::new(&log_file).parent() {
            // Best-effort: don't fail startup just because the directory is missing.
            let _ = std::fs::create_dir_all(parent);
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .with_context(|| format!("Failed to open log file {log_file}"))?;
        tracing_appender::non_blocking(file)
    } else {
        tracing_appender::non_blocking(io::stderr())
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(writer))
        .init();

    Ok(guard)
}

/// Print `label` and read one trimmed line; `None` on end of input.
fn prompt<B: BufRead>(input: &mut B, label: &str) -> Result<Option<String>> {
    print!("{label}");
    io::stdout().flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn print_ranked(title: &str, labels: &[RankedLabel], empty_message: &str) {
    println!("{title}:");
    if labels.is_empty() {
        println!("  {empty_message}");
    }
    for label in labels {
        println!("  - {} (Confidence: {}%)", label.name, label.confidence);
    }
}

fn main() -> Result<()> {
    let _guard = init_logging()?;
    tracing::info!("Starting medrecommend...");

    let data_path =
        std::env::var("MEDRECOMMEND_DATA_PATH").unwrap_or_else(|_| DEFAULT_DATA_PATH.to_string());
    let store = JsonRecordStore::new(&data_path);

    println!("Training models from {data_path}...");
    let predictor = Predictor::from_store(
        &store,
        TrainingConfig::from_env_or_default(),
        PredictorConfig::from_env_or_default(),
    )
    .with_context(|| format!("Failed to train from {data_path}"))?;

    let report = predictor.report();
    let accuracies = predictor.model_accuracies();
    println!(
        "Trained on {} records ({} rejected), {} diseases, {} medicines",
        report.records_used,
        report.records_rejected,
        report.n_diseases,
        report.n_medicines
    );
    match (accuracies.disease_model, accuracies.medicine_model) {
        (Some(disease), Some(medicine)) => {
            println!("Disease model accuracy: {disease}%");
            println!("Medicine model accuracy: {medicine}%");
        }
        _ => println!("Too few records to measure model accuracy"),
    }
    println!("Medicine ranking: {}", predictor.config().medicine_policy);

    let stdin = io::stdin();
    let mut input = stdin.lock();

    loop {
        println!();
        let Some(age) = prompt(&mut input, "Age: ")? else { break };
        let Some(gender) = prompt(&mut input, "Gender (M/F): ")? else { break };
        let Some(symptoms) = prompt(&mut input, "Symptoms (comma-separated): ")? else { break };
        let Some(cause) = prompt(&mut input, "Cause: ")? else { break };

        let query = QueryInput {
            age: Some(Value::String(age)),
            gender,
            symptoms,
            cause,
        };

        match predictor.predict_input(&query) {
            PredictionOutcome::Ready(prediction) => {
                println!();
                print_ranked(
                    "Predicted Diseases",
                    &prediction.diseases,
                    "No diseases predicted with high confidence",
                );
                print_ranked(
                    "Recommended Medicines",
                    &prediction.medicines,
                    "No medicines recommended with high confidence",
                );
            }
            PredictionOutcome::Failed(failure) => println!("Error: {failure}"),
        }

        let again = prompt(&mut input, "\nMake another prediction? (y/n): ")?;
        if !again.is_some_and(|a| a.eq_ignore_ascii_case("y")) {
            break;
        }
    }

    tracing::info!("medrecommend shutdown complete.");
    Ok(())
}
