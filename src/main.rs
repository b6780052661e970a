//! Tarjama - translated, watermarked subtitles for online videos
//!
//! Fetches a video, transcribes its speech, translates the transcript and
//! burns the translation into a new copy of the video.

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing::{info, warn, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tarjama::cli::{Args, Commands, RunOptions};
use tarjama::config::Config;
use tarjama::manifest::RunManifest;
use tarjama::progress::{ConsoleReporter, ProgressReporter};
use tarjama::workflow::{CancelToken, Workflow};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    setup_logging(args.verbose)?;
    info!("Starting Tarjama");

    let mut config = Config::load(args.config.as_deref())?;

    match args.command {
        Commands::Run { url, options } => {
            apply_run_options(&mut config, &options);
            let workflow = build_workflow(config)?;
            workflow.check_availability().await?;
            let reporter = ConsoleReporter::new(&url);

            match workflow.run_with(&url, &reporter, options.resume).await {
                Ok(report) => {
                    println!("Output video: {}", report.artifacts.output_video.display());
                }
                Err(e) => {
                    eprintln!("{}", e);
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Commands::Batch { urls, jobs, options } => {
            apply_run_options(&mut config, &options);
            let workflow = build_workflow(config)?;
            workflow.check_availability().await?;
            let group = ConsoleReporter::group();

            let results = workflow
                .run_batch_with(&urls, jobs, options.resume, |url| {
                    Box::new(ConsoleReporter::in_group(&group, url)) as Box<dyn ProgressReporter>
                })
                .await;

            let mut failures = 0;
            for (url, result) in urls.iter().zip(&results) {
                match result {
                    Ok(report) => println!("{}: {}", url, report.artifacts.output_video.display()),
                    Err(e) => {
                        failures += 1;
                        eprintln!("{}: {}", url, e);
                    }
                }
            }
            println!("{} of {} runs succeeded", results.len() - failures, results.len());
            if failures > 0 {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Fetch { url, output_dir } => {
            let workflow = build_workflow(config)?;
            let path = workflow.fetch(&url, &output_dir).await?;
            println!("{}", path.display());
        }
        Commands::Transcribe { input, output, language } => {
            if let Some(language) = language {
                config.transcriber.source_language = language;
            }
            let workflow = build_workflow(config)?;
            let transcript = workflow.transcribe(&input, &output).await?;
            println!("Wrote {} cues to {}", transcript.len(), output.display());
        }
        Commands::Translate { input, output, target_lang } => {
            if let Some(language) = target_lang {
                config.translate.target_language = language;
            }
            let workflow = build_workflow(config)?;
            let translation = workflow.translate(&input, &output).await?;
            println!("Wrote {} cues to {}", translation.len(), output.display());
        }
        Commands::Embed { video, subtitles, output } => {
            let workflow = build_workflow(config)?;
            let path = workflow.embed(&video, &subtitles, &output).await?;
            println!("{}", path.display());
        }
        Commands::InitConfig { path, force } => {
            if path.exists() && !force {
                eprintln!("{} already exists; pass --force to overwrite it", path.display());
                return Ok(ExitCode::FAILURE);
            }
            Config::default().save_to_file(&path)?;
            println!("Wrote default configuration to {}", path.display());
        }
        Commands::Runs { dir } => {
            let runs = RunManifest::find_all(&dir);
            if runs.is_empty() {
                println!("No runs found under {}", dir.display());
            } else {
                println!("{:<20} {:<14} {:<12} {}", "Created", "Last stage", "Languages", "Source");
                println!("{}", "-".repeat(80));
                for (_, run) in runs {
                    let last = run
                        .last_completed()
                        .map(|stage| stage.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:<20} {:<14} {:<12} {}",
                        run.created_at.format("%Y-%m-%d %H:%M:%S"),
                        last,
                        format!("{}->{}", run.source_language, run.target_language),
                        run.source_url
                    );
                }
            }
        }
    }

    info!("Tarjama finished");
    Ok(ExitCode::SUCCESS)
}

fn apply_run_options(config: &mut Config, options: &RunOptions) {
    if let Some(dir) = &options.output_dir {
        config.pipeline.output_dir = dir.clone();
    }
    if let Some(language) = &options.source_lang {
        config.transcriber.source_language = language.clone();
    }
    if let Some(language) = &options.target_lang {
        config.translate.target_language = language.clone();
    }
}

/// Workflow whose cancel token is tripped by Ctrl-C
fn build_workflow(config: Config) -> Result<Workflow> {
    let cancel = CancelToken::new();
    let workflow = Workflow::from_config(config)?.with_cancel_token(cancel.clone());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; stopping after the current stage");
            cancel.cancel();
        }
    });

    Ok(workflow)
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = std::env::current_dir()?.join(".tarjama").join("log");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = rolling::daily(&log_dir, "tarjama.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("tarjama.log").display()
    );

    Ok(())
}
