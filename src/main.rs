use anyhow::Result;
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use video_summarizer::cli::GenerateArgs;
use video_summarizer::config::resolve_credential;
use video_summarizer::{
    output, utils, ArtifactKind, ArtifactRequest, Cli, Commands, Config, CredentialStore,
    FileCredentialStore, OutputFormat, Pipeline, RequestContext, SummarizerError,
};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load().await?,
    };

    if let Some((kind, args)) = cli.command.generate() {
        let save = matches!(cli.command, Commands::Transcript { save: true, .. });
        return generate(&cli, &config, kind, args, save).await;
    }

    if let Commands::Config { show, init, set_key } = &cli.command {
        configure(&config, *show, *init, set_key.as_deref())?;
    }

    Ok(ExitCode::SUCCESS)
}

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose {
        "video_summarizer=debug"
    } else {
        "video_summarizer=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn configure(config: &Config, show: bool, init: bool, set_key: Option<&str>) -> Result<()> {
    if let Some(key) = set_key {
        if key.trim().is_empty() {
            anyhow::bail!("API key must not be empty");
        }
        let store = FileCredentialStore::default_location()?;
        store.save_api_key(key)?;
        println!("API key saved to: {}", store.path().display());
    }

    if init {
        let path = Config::config_path()?;
        if path.exists() {
            println!("Config file already exists: {}", path.display());
        } else {
            Config::default().save(&path)?;
            println!("Config file written to: {}", path.display());
        }
    }

    if show || (!init && set_key.is_none()) {
        config.display();
    }

    Ok(())
}

async fn generate(
    cli: &Cli,
    config: &Config,
    kind: ArtifactKind,
    args: &GenerateArgs,
    save: bool,
) -> Result<ExitCode> {
    let request = ArtifactRequest::new(kind, &args.url);

    // Nothing touches the network for a link we cannot parse
    if let Err(err) = request.reference.require_id() {
        return Ok(report_failure(kind, &err));
    }

    let format = match args.format {
        Some(format) => format,
        None => config.app.output_format()?,
    };

    let missing_deps = utils::check_dependencies(&config.video.yt_dlp_path).await;
    if !missing_deps.is_empty() {
        eprintln!("{}", style("Dependency check warnings:").yellow());
        for dep in missing_deps {
            eprintln!("   • {}", dep);
        }
    }

    let credential = if kind.prompt_id().is_some() {
        let store = FileCredentialStore::default_location()?;
        resolve_credential(args.api_key.as_deref(), &store)?
    } else {
        None
    };

    let ctx = RequestContext::new(credential);
    let pipeline = Pipeline::from_config(config)?;

    let progress = if cli.quiet {
        ProgressBar::hidden()
    } else {
        let progress = ProgressBar::new_spinner();
        progress.set_style(
            ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
        );
        progress.enable_steady_tick(Duration::from_millis(120));
        progress
    };
    progress.set_message(format!("Generating {}...", kind.label()));

    let result = pipeline.run(&ctx, &request).await;
    progress.finish_and_clear();

    let report = match result {
        Ok(report) => report,
        Err(err) => {
            tracing::debug!(request_id = %ctx.request_id, "Pipeline failed: {}", err);
            return Ok(report_failure(kind, &err));
        }
    };

    if save {
        let title = report.reference.title.as_deref();
        let video_id = report.reference.require_id()?;
        let path = PathBuf::from(utils::transcript_filename(title, video_id));
        output::save_to_file(&report, &path, OutputFormat::Text).await?;
        println!("Transcript saved to: {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    match &args.output {
        Some(path) => {
            output::save_to_file(&report, path, format).await?;
            println!("{} saved to: {}", capitalize(kind.label()), path.display());
        }
        None => output::print_to_console(&report, format)?,
    }

    Ok(ExitCode::SUCCESS)
}

fn report_failure(kind: ArtifactKind, err: &SummarizerError) -> ExitCode {
    eprintln!(
        "{} Could not produce {}: {}",
        style("Error:").red().bold(),
        kind.label(),
        err.user_message()
    );
    ExitCode::FAILURE
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
