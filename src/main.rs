use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use std::path::Path;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use caption_scribe::cli::{Cli, Commands};
use caption_scribe::config::Config;
use caption_scribe::download::{DownloadMode, DownloadRequest, Downloader};
use caption_scribe::pipeline::{load_template, PipelineOptions, ScriptPipeline, DEFAULT_SCRIPT_TEMPLATE};
use caption_scribe::{extract_video_id, output, utils, ScribeError};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; logs go to stderr so stdout carries only results
    let default_filter = if cli.verbose {
        "caption_scribe=debug,scribe=debug"
    } else {
        "caption_scribe=info,scribe=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::VideoId { url } => {
            let id = extract_video_id(&url);
            if id.is_empty() {
                return Err(ScribeError::InvalidVideoUrl(url).into());
            }
            println!("{}", id);
        }
        Commands::Fetch {
            url,
            translate,
            script,
            template,
            format,
            output,
        } => {
            let config = Config::load().await?;
            let template = if script {
                load_template(template.as_deref(), &config)?
            } else {
                DEFAULT_SCRIPT_TEMPLATE.to_string()
            };
            let options = PipelineOptions {
                translate,
                script,
                template,
            };

            let pipeline = ScriptPipeline::new(config)?.quiet(cli.quiet);

            tracing::info!("Starting caption fetch for URL: {}", url);
            let report = pipeline.run_from_url(&url, &options).await?;

            match output {
                Some(path) => {
                    output::save_to_file(&report, &path, &format).await?;
                    println!("Report saved to: {}", path.display());
                }
                None => {
                    output::print_to_console(&report, &format)?;
                }
            }
        }
        Commands::Translate { input, output } => {
            let text = read_non_empty(input.as_deref())?;
            let config = Config::load().await?;
            let pipeline = ScriptPipeline::new(config)?.quiet(cli.quiet);

            let options = PipelineOptions {
                translate: true,
                script: false,
                ..PipelineOptions::default()
            };
            let report = pipeline.run_from_text(&text, &options).await?;
            emit(report.translation.unwrap_or_default(), output.as_deref())?;
        }
        Commands::Script {
            input,
            template,
            output,
        } => {
            let text = read_non_empty(input.as_deref())?;
            let config = Config::load().await?;
            let template = load_template(template.as_deref(), &config)?;
            let pipeline = ScriptPipeline::new(config)?.quiet(cli.quiet);

            let options = PipelineOptions {
                translate: false,
                script: true,
                template,
            };
            let report = pipeline.run_from_text(&text, &options).await?;
            emit(report.script.unwrap_or_default(), output.as_deref())?;
        }
        Commands::Download {
            urls,
            start,
            end,
            audio,
            output_dir,
        } => {
            let mode = if audio { DownloadMode::Audio } else { DownloadMode::Video };
            let mut requests = Vec::with_capacity(urls.len());
            for url in &urls {
                let url = utils::validate_and_normalize_url(url)?;
                let request = DownloadRequest::new(url)
                    .range(start.clone(), end.clone())
                    .mode(mode);
                // Reject bad times before anything is spawned
                request.section()?;
                requests.push(request);
            }

            let config = Config::load().await?;

            let missing_deps = utils::check_dependencies(&config.download.yt_dlp_path).await;
            if !missing_deps.is_empty() {
                eprintln!("{}", style("Dependency check warnings:").yellow());
                for dep in missing_deps {
                    eprintln!("   • {}", dep);
                }
                eprintln!("   (Continuing anyway - tools may be available)");
            }

            fs_err::create_dir_all(&output_dir)?;
            let downloader = Downloader::from_config(&config.download);

            let started = Instant::now();
            let results = downloader.download_many(&requests).await;
            let total = results.len();
            let mut failed = 0;

            for (url, result) in results {
                match result {
                    Ok(media) => {
                        let path = output_dir.join(&media.file_name);
                        fs_err::write(&path, &media.bytes)?;
                        println!(
                            "{} {} ({}) -> {}",
                            style("✓").green(),
                            media.display_name,
                            utils::format_file_size(media.size()),
                            path.display()
                        );
                    }
                    Err(e) => {
                        failed += 1;
                        eprintln!("{} {}: {}", style("✗").red(), url, e);
                    }
                }
            }

            tracing::info!(
                "Finished {} download(s) in {}",
                total,
                utils::format_duration(started.elapsed().as_secs_f64())
            );

            if failed > 0 {
                anyhow::bail!("{} of {} downloads failed", failed, total);
            }
        }
        Commands::Config { show } => {
            let config = Config::load().await?;
            if show {
                config.display();
            } else {
                config.interactive_setup().await?;
            }
        }
    }

    Ok(())
}

/// Read manual input and refuse blank text before touching config or the network
fn read_non_empty(path: Option<&Path>) -> Result<String> {
    let text = utils::read_text_input(path)?;
    if text.trim().is_empty() {
        return Err(ScribeError::EmptyInput).context("Provide English text in a file or on stdin");
    }
    Ok(text)
}

fn emit(content: String, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            fs_err::write(path, content)?;
            println!("Saved to: {}", path.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}
