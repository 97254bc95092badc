mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use cli::{Cli, Commands};
use dvx_av::{probe_file, DownmuxPipeline, ToolRegistry};
use dvx_core::media::derived_path;
use dvx_core::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "dovimux=trace,dvx_core=trace,dvx_av=trace,dvx_tasks=trace".to_string()
        } else {
            "dovimux=info,dvx_core=info,dvx_av=info,dvx_tasks=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Probe { file, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_command(&file, json, cli.config.as_deref()))
        }
        Commands::Downmux { input } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(downmux_command(&input, cli.config.as_deref()))
        }
        Commands::Remux { input } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(remux_command(&input, cli.config.as_deref()))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("dovimux {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load(config_path: Option<&Path>) -> Arc<Config> {
    Arc::new(Config::load_or_default(config_path))
}

/// A token that fires on Ctrl-C. Must be called inside a tokio runtime.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let signaled = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, canceling");
            signaled.cancel();
        }
    });
    token
}

async fn probe_command(file: &Path, json: bool, config_path: Option<&Path>) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = load(config_path);
    let tools = ToolRegistry::discover(&config.tools);
    let cancel = cancel_on_ctrl_c();

    let result = probe_file(&tools, file, &config.log_dir, &cancel).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("File: {}", result.path.display());
    println!("Container: {}", result.container);
    println!("\nStreams: {}", result.streams.len());
    for s in &result.streams {
        print!("  [{}] {} {}", s.index, s.kind, s.codec);
        if let Some(lang) = &s.language {
            print!(" ({lang})");
        }
        if let Some(profile) = s.dv_profile {
            print!(
                " - Dolby Vision profile {profile}.{}",
                s.dv_version_major.unwrap_or(0)
            );
        }
        println!();
    }

    match result.dovi_video() {
        Some(v) if v.dv_profile == Some(7) => {
            println!("\nProfile 7: needs downmux to 8.1 before remuxing")
        }
        Some(_) => println!("\nEligible for direct remux"),
        None => println!("\nNo Dolby Vision video stream"),
    }

    Ok(())
}

async fn downmux_command(input: &Path, config_path: Option<&Path>) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {:?}", input);
    }

    let config = load(config_path);
    let tools = ToolRegistry::discover(&config.tools);
    let cancel = cancel_on_ctrl_c();

    let probed = probe_file(&tools, input, &config.log_dir, &cancel).await?;
    match probed.dovi_video().and_then(|v| v.dv_profile) {
        Some(7) => {}
        Some(p) => anyhow::bail!("Expected a Profile 7 source, found profile {p}"),
        None => anyhow::bail!("No Dolby Vision video stream in {:?}", input),
    }

    let pipeline = DownmuxPipeline::new(tools, &config);
    let tag = &uuid::Uuid::new_v4().to_string()[..8];
    let artifact = pipeline.run(input, tag, &cancel).await?;

    println!("Profile 8.1 artifact: {}", artifact.display());
    Ok(())
}

async fn remux_command(input: &Path, config_path: Option<&Path>) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {:?}", input);
    }

    let config = load(config_path);
    let tools = ToolRegistry::discover(&config.tools);
    let cancel = cancel_on_ctrl_c();

    let probed = probe_file(&tools, input, &config.log_dir, &cancel).await?;
    let Some(video) = probed.dovi_video() else {
        anyhow::bail!("No Dolby Vision video stream in {:?}", input);
    };
    let profile7 = video.dv_profile == Some(7);

    let final_path = derived_path(input);
    if final_path.exists() {
        anyhow::bail!("Output already exists: {:?}", final_path);
    }

    std::fs::create_dir_all(&config.temp_dir)?;
    let tag = uuid::Uuid::new_v4().to_string();
    let tag = &tag[..8];
    let temp_path = config.temp_dir.join(format!("{tag}.mp4"));

    let artifact = if profile7 {
        if !config.downmux_enabled {
            anyhow::bail!("Profile 7 source, but downmuxing is disabled in config");
        }
        println!("Profile 7 source: downmuxing to 8.1 first");
        let pipeline = DownmuxPipeline::new(tools.clone(), &config);
        Some(pipeline.run(input, tag, &cancel).await?)
    } else {
        None
    };

    let job = match &artifact {
        Some(artifact) => {
            dvx_av::RemuxJob::with_substituted_video(artifact, input, &temp_path)
        }
        None => dvx_av::RemuxJob::direct(input, &temp_path),
    };

    let log_path = config.log_dir.join(format!("ffmpeg_remux_{tag}.log"));
    let remux_result =
        dvx_av::run_remux(&tools, &job, &probed.streams, &log_path, &cancel).await;

    if let Some(artifact) = &artifact {
        let _ = std::fs::remove_file(artifact);
    }

    if let Err(e) = remux_result {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e.into());
    }

    std::fs::rename(&temp_path, &final_path)?;
    println!("Remuxed to {}", final_path.display());
    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path);
    let tools = ToolRegistry::discover(&config.tools);

    let mut missing = false;
    println!("External tools:");
    for info in tools.check_all() {
        if info.available {
            let path = info
                .path
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            match info.version {
                Some(version) => println!("  {:10} OK  {version} ({path})", info.name),
                None => println!("  {:10} OK  ({path})", info.name),
            }
        } else {
            missing = true;
            println!("  {:10} MISSING", info.name);
        }
    }

    if missing {
        anyhow::bail!("Some required tools are missing");
    }
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)?;
            Config::from_json(&contents)?
        }
        None => Config::default(),
    };

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("Configuration is valid");
    } else {
        println!("Configuration parsed with {} warning(s):", warnings.len());
        for warning in &warnings {
            println!("  - {warning}");
        }
    }
    Ok(())
}
