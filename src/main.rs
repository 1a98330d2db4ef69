use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use log::{debug, info, LevelFilter};
use mimalloc::MiMalloc;
use tokio::io::{AsyncBufReadExt, BufReader};

use visearch_lib::config::{self, Config, ConfigState};
use visearch_lib::state::{ChipRegion, SearchStatus};
use visearch_lib::workflow::View;
use visearch_lib::WorkflowController;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const HELP: &str = "\
commands:
  status                              refresh backend readiness
  upload <file> [file..]              upload query chips
  region <image> <x> <y> <w> <h>      cut a chip from a server-side image
  chips                               list uploaded chips
  remove <chip_id>                    drop a chip
  load [index_dir]                    load an index directory
  tab <upload|search|results>         switch view
  search <class> [top_k] [sim] [nms]  run a search
  results                             show the current results
  export [team]                       write a submission file
  preview <chip_id> <out>             save a chip preview
  help | quit";

fn get_app_data_dir() -> PathBuf {
    let base = std::env::var("APPDATA")
        .or_else(|_| std::env::var("XDG_DATA_HOME"))
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            format!("{}/.local/share", home)
        });
    PathBuf::from(base).join("com.visearch.app")
}

fn mark(flag: bool) -> &'static str {
    if flag {
        "✓"
    } else {
        "✗"
    }
}

fn status_line(status: &SearchStatus) -> String {
    let mut line = format!(
        "Embedder: {}  Index: {}",
        mark(status.embedder_loaded),
        mark(status.index_loaded)
    );
    if let Some(size) = status.index_size {
        line.push_str(&format!("  ({} vectors)", size));
    }
    if let Some(device) = &status.device {
        line.push_str(&format!("  device={}", device));
    }
    line
}

fn arg<T: std::str::FromStr>(args: &[&str], i: usize, name: &str) -> Result<Option<T>> {
    match args.get(i) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a number, got '{}'", name, raw)),
    }
}

fn required<T: std::str::FromStr>(args: &[&str], i: usize, name: &str) -> Result<T> {
    arg(args, i, name)?.ok_or_else(|| anyhow!("missing {}", name))
}

async fn dispatch(ctrl: &WorkflowController, config: &ConfigState, line: &str) -> Result<bool> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some((&cmd, args)) = parts.split_first() else {
        return Ok(true);
    };
    debug!("command: {} {:?}", cmd, args);

    match cmd {
        "quit" | "exit" => return Ok(false),
        "help" => println!("{}", HELP),
        "status" => println!("{}", status_line(&ctrl.refresh_status().await)),
        "upload" => {
            let files: Vec<PathBuf> = args.iter().map(PathBuf::from).collect();
            for outcome in ctrl.upload(&files).await? {
                match outcome {
                    Ok(chip) => println!("+ {} ({})", chip.chip_id, chip.filename),
                    Err(e) => println!("! {}", e),
                }
            }
        }
        "region" => {
            let region = ChipRegion {
                image_path: args.first().map(|s| s.to_string()).unwrap_or_default(),
                x: required(args, 1, "x")?,
                y: required(args, 2, "y")?,
                width: required(args, 3, "width")?,
                height: required(args, 4, "height")?,
            };
            let chip = ctrl.extract_chip(&region).await?;
            println!("+ {} ({})", chip.chip_id, chip.filename);
        }
        "chips" => {
            let chips = ctrl.chips();
            println!("Uploaded Chips ({})", chips.len());
            for chip in chips {
                println!("  {}  {}  {}", chip.chip_id, chip.filename, chip.preview_path());
            }
        }
        "remove" => {
            let id = args.first().ok_or_else(|| anyhow!("missing chip id"))?;
            if !ctrl.remove_chip(id) {
                println!("no chip {}", id);
            }
        }
        "load" => {
            let dir = match args.first() {
                Some(d) => d.to_string(),
                None => config.config.lock().await.index_dir.clone().unwrap_or_default(),
            };
            let loaded = ctrl.load_index(&dir).await?;
            println!("Index loaded: {} vectors", loaded.total_vectors);
            config.config.lock().await.index_dir = Some(dir);
            config.save().await.map_err(|e| anyhow!(e))?;
            println!("{}", status_line(&ctrl.status().status));
        }
        "tab" => {
            let view = args
                .first()
                .and_then(|v| View::parse(v))
                .ok_or_else(|| anyhow!("usage: tab <upload|search|results>"))?;
            let state = ctrl.select(view)?;
            println!("view: {:?}", state.view);
        }
        "search" => {
            let class_name = args.first().copied().unwrap_or_default();
            let mut params = ctrl.parameters(class_name);
            if let Some(top_k) = arg(args, 1, "top_k")? {
                params.top_k = top_k;
            }
            if let Some(sim) = arg(args, 2, "similarity_threshold")? {
                params.similarity_threshold = sim;
            }
            if let Some(nms) = arg(args, 3, "nms_threshold")? {
                params.nms_threshold = nms;
            }
            println!("Searching...");
            let result = ctrl.search(&params).await?;
            println!("{}", result.summary());
        }
        "results" => {
            let view = ctrl.results_view()?;
            println!("{}", view.summary);
            for row in &view.rows {
                println!(
                    "  {:<28} {:<16} [{}, {}, {}, {}]  {} ({})",
                    row.target_filename,
                    row.class_name,
                    row.bbox[0],
                    row.bbox[1],
                    row.bbox[2],
                    row.bbox[3],
                    row.score,
                    row.tier.label()
                );
            }
            if view.total_count > view.rows.len() {
                println!("  ... {} more not shown", view.total_count - view.rows.len());
            }
        }
        "export" => {
            let artifact = ctrl.export(args.first().copied()).await?;
            println!(
                "Saved {} detections to {}{}",
                artifact.detections,
                artifact.path.display(),
                artifact
                    .server_filename
                    .map(|n| format!(" (server name {})", n))
                    .unwrap_or_default()
            );
        }
        "preview" => {
            let id = args.first().ok_or_else(|| anyhow!("missing chip id"))?;
            let out = args.get(1).ok_or_else(|| anyhow!("missing output path"))?;
            let bytes = ctrl.preview(id).await?;
            tokio::fs::write(out, &bytes)
                .await
                .with_context(|| format!("writing {}", out))?;
            println!("wrote {} bytes to {}", bytes.len(), out);
        }
        other => println!("unknown command '{}', try help", other),
    }
    Ok(true)
}

/// Starts the logger before anything else logs. Without `RUST_LOG` output is
/// held at info until the configured level is known. Returns whether
/// `RUST_LOG` was set.
fn init_logging() -> bool {
    let env_override = std::env::var_os("RUST_LOG").is_some();
    env_logger::Builder::new()
        .filter_level(LevelFilter::Trace)
        .parse_default_env()
        .init();
    if !env_override {
        log::set_max_level(LevelFilter::Info);
    }
    env_override
}

/// `RUST_LOG` wins over the configured level.
fn apply_config_level(config: &Config, env_override: bool) {
    if !env_override {
        log::set_max_level(config.log_filter());
    }
}

async fn run(ctrl: WorkflowController, config: ConfigState) -> Result<()> {
    println!("Visual Search ({})", ctrl.endpoint());
    println!("{}", status_line(&ctrl.refresh_status().await));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match dispatch(&ctrl, &config, &line).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => println!("error: {}", e),
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let env_override = init_logging();

    // ── Config ──
    let config_path = match std::env::var("VISEARCH_CONFIG") {
        Ok(p) => PathBuf::from(p),
        Err(_) => {
            let dir = get_app_data_dir();
            std::fs::create_dir_all(&dir).ok();
            dir.join("config.json")
        }
    };
    let mut config = config::load_config(&config_path);
    if let Ok(base) = std::env::var("VISEARCH_API_BASE") {
        config.api_base = base;
    }

    apply_config_level(&config, env_override);
    info!("config at {:?}, backend {}", config_path, config.api_base);

    // ── Tokio runtime ──
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    let ctrl = WorkflowController::from_config(&config);
    let config_state = ConfigState::new(config, config_path);
    runtime.block_on(run(ctrl, config_state))
}
