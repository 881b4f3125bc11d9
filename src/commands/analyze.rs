use crate::cli;
use crate::config::{load_config, load_config_from, NarrowscopeConfig};
use crate::io::{self, create_writer, AnalysisReport, OutputFormat};
use crate::narrowing::{analyze_listing, RiskPolicy};
use anyhow::{Context, Result};
use std::path::PathBuf;

pub struct AnalyzeConfig {
    pub listings: Vec<PathBuf>,
    pub format: Option<cli::OutputFormat>,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

pub fn handle_analyze(config: AnalyzeConfig) -> Result<()> {
    let settings = match &config.config {
        Some(path) => load_config_from(path)
            .with_context(|| format!("Loading {}", path.display()))?,
        None => load_config(),
    };
    let format = resolve_format(config.format, &settings);
    let report = analyze_listings(&config.listings, &settings)?;

    let mut writer = create_writer(format, config.output.as_deref())?;
    writer.write_report(&report)?;
    log::info!(
        "Analyzed {} method(s), {} finding(s)",
        report.methods,
        report.findings.len()
    );
    Ok(())
}

/// Runs the detector over every listing, in the order given.
pub fn analyze_listings(paths: &[PathBuf], settings: &NarrowscopeConfig) -> Result<AnalysisReport> {
    let policy = RiskPolicy::from_config(&settings.risk).context("Building risk policy")?;
    let mut report = AnalysisReport::default();
    for path in paths {
        let listing = io::read_listing(path)?;
        let findings = analyze_listing(&listing, &policy)
            .with_context(|| format!("Analyzing {}", path.display()))?;
        report.listings += 1;
        report.methods += listing.methods.len();
        report.findings.extend(findings);
    }
    Ok(report)
}

/// Command line first, then the configuration file, then terminal.
fn resolve_format(flag: Option<cli::OutputFormat>, settings: &NarrowscopeConfig) -> OutputFormat {
    flag.map(OutputFormat::from)
        .or_else(|| {
            settings
                .output
                .as_ref()
                .and_then(|o| o.format.as_deref())
                .and_then(OutputFormat::from_config)
        })
        .unwrap_or(OutputFormat::Terminal)
}
