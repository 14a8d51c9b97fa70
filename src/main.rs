use clap::Parser;
use log::{error, info, warn};
use netlens::configuration::Config;
use netlens::engine::CaptureEngine;
use netlens::web_interface::WebServer;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "netlens")]
#[command(version = "0.1.0")]
#[command(about = "A network activity capture and correlation engine")]
struct Args {
    /// Path to the TOML configuration file; defaults apply when omitted
    config_file: Option<PathBuf>,

    /// NDJSON event log to replay before reading stdin
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Do not read events from stdin
    #[arg(long, action = clap::ArgAction::SetTrue)]
    no_stdin: bool,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    println!(
        "
███╗   ██╗███████╗████████╗██╗     ███████╗███╗   ██╗███████╗
████╗  ██║██╔════╝╚══██╔══╝██║     ██╔════╝████╗  ██║██╔════╝
██╔██╗ ██║█████╗     ██║   ██║     █████╗  ██╔██╗ ██║███████╗
██║╚██╗██║██╔══╝     ██║   ██║     ██╔══╝  ██║╚██╗██║╚════██║
██║ ╚████║███████╗   ██║   ███████╗███████╗██║ ╚████║███████║
╚═╝  ╚═══╝╚══════╝   ╚═╝   ╚══════╝╚══════╝╚═╝  ╚═══╝╚══════╝
==============================================================
        Network activity capture and correlation engine
==============================================================
"
    );

    let args = Args::parse();

    let config = match &args.config_file {
        Some(path) => {
            info!("importing configuration from {:?}", path);
            match Config::from_file(path) {
                Ok(config) => config,
                Err(e) => {
                    error!("unable to import configuration: {}, exiting...", e);
                    std::process::exit(1);
                }
            }
        }
        None => {
            info!("no configuration file given, using defaults");
            Config::default()
        }
    };

    let (engine, handle) = CaptureEngine::new(&config.engine);
    let engine_task = tokio::spawn(engine.run());

    let web_task = if config.web.enabled {
        let server_handle = handle.clone();
        let web_settings = config.web.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = WebServer::new(server_handle).start(&web_settings).await {
                error!("web interface failed to start: {}", e);
            }
        }))
    } else {
        None
    };

    if let Some(path) = &args.replay {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => {
                let mut accepted = 0usize;
                for line in contents.lines() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if handle.ingest_json(line) {
                        accepted += 1;
                    }
                }
                info!("replayed {} events from {:?}", accepted, path);
            }
            Err(e) => warn!("unable to read replay file {:?}: {}", path, e),
        }
    }

    if !args.no_stdin {
        info!("reading NDJSON events from stdin");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if !line.trim().is_empty() {
                        handle.ingest_json(&line);
                    }
                }
                Ok(None) => {
                    info!("stdin closed");
                    break;
                }
                Err(e) => {
                    warn!("stdin read error: {}", e);
                    break;
                }
            }
        }
    }

    match web_task {
        // Keep serving the captured history after the feed ends.
        Some(task) => {
            let _ = task.await.map_err(|e| {
                error!("error joining the web interface task: {:?}", e);
            });
        }
        None => {
            handle.shutdown();
            let _ = engine_task.await.map_err(|e| {
                error!("error joining the engine task: {:?}", e);
            });
        }
    }
}
