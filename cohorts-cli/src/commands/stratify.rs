//! Stratify a population from a JSON request file.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use cohorts_core::{StratificationEngine, StratificationRequest, StratificationResponse};
use tracing::info;

use crate::config::ConfigLoader;
use crate::output;

/// Stratify arguments.
#[derive(Args, Debug)]
pub struct StratifyArgs {
    /// JSON request file (`-` reads stdin)
    pub request: PathBuf,

    /// Write the full JSON response to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the full JSON response instead of a summary
    #[arg(long)]
    pub json: bool,
}

/// Run stratify command.
pub fn run(args: StratifyArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    let engine = StratificationEngine::new(config.engine);
    let response = stratify(&engine, &args.request)?;

    if let Some(path) = &args.output {
        let json = serde_json::to_string_pretty(&response)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "response written");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        output::print_stratification(&response);
    }
    Ok(())
}

/// Read a request and run it through `engine`.
pub(crate) fn stratify(
    engine: &StratificationEngine,
    path: &Path,
) -> Result<StratificationResponse> {
    let request = read_request(path)?;
    info!(rows = request.rows.len(), "stratifying");
    Ok(engine.run(request)?)
}

pub(crate) fn read_request(path: &Path) -> Result<StratificationRequest> {
    let contents = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    };
    serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
}
