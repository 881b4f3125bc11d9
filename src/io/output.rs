use crate::core::Finding;
use colored::*;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Terminal,
}

impl OutputFormat {
    /// Parses the `[output] format` setting.
    pub fn from_config(value: &str) -> Option<Self> {
        match value {
            "json" => Some(Self::Json),
            "terminal" => Some(Self::Terminal),
            _ => None,
        }
    }
}

/// Everything one run found.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct AnalysisReport {
    pub listings: usize,
    pub methods: usize,
    pub findings: Vec<Finding>,
}

pub trait OutputWriter {
    fn write_report(&mut self, report: &AnalysisReport) -> anyhow::Result<()>;
}

pub struct JsonWriter<W: Write> {
    writer: W,
}

impl<W: Write> JsonWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> OutputWriter for JsonWriter<W> {
    fn write_report(&mut self, report: &AnalysisReport) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(report)?;
        self.writer.write_all(json.as_bytes())?;
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }
}

pub struct TerminalWriter<W: Write> {
    writer: W,
}

impl<W: Write> TerminalWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    fn write_header(&mut self, report: &AnalysisReport) -> anyhow::Result<()> {
        writeln!(self.writer, "{}", "Scope Narrowing Report".bold().blue())?;
        writeln!(self.writer, "{}", "======================".blue())?;
        writeln!(
            self.writer,
            "  Listings: {}  Methods: {}",
            report.listings, report.methods
        )?;
        writeln!(self.writer)?;
        Ok(())
    }

    fn write_finding(&mut self, finding: &Finding) -> anyhow::Result<()> {
        let location = match &finding.class {
            Some(class) => format!("{}.{}", class, finding.method),
            None => finding.method.clone(),
        };
        writeln!(
            self.writer,
            "{} {} {}",
            "•".yellow(),
            location.bold(),
            format!("@{}", finding.address).dimmed()
        )?;
        writeln!(self.writer, "    {}", finding.message)?;
        Ok(())
    }
}

impl<W: Write> OutputWriter for TerminalWriter<W> {
    fn write_report(&mut self, report: &AnalysisReport) -> anyhow::Result<()> {
        self.write_header(report)?;
        for finding in &report.findings {
            self.write_finding(finding)?;
        }
        if report.findings.is_empty() {
            writeln!(self.writer, "{}", "No bloated assignment scopes found".green())?;
        } else {
            writeln!(self.writer)?;
            writeln!(
                self.writer,
                "{}",
                format!("{} assignment(s) could move into a narrower scope", report.findings.len())
                    .yellow()
            )?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Writer for `format`, to `output` when given and stdout otherwise.
pub fn create_writer(
    format: OutputFormat,
    output: Option<&Path>,
) -> anyhow::Result<Box<dyn OutputWriter>> {
    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(std::io::stdout()),
    };
    Ok(match format {
        OutputFormat::Json => Box::new(JsonWriter::new(sink)),
        OutputFormat::Terminal => Box::new(TerminalWriter::new(sink)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> AnalysisReport {
        AnalysisReport {
            listings: 1,
            methods: 3,
            findings: vec![
                Finding::new("run", 4, 2, Some("count".into()), (7, 19)).with_class("com/acme/Job")
            ],
        }
    }

    #[test]
    fn test_json_writer_emits_findings() {
        let mut buffer = Vec::new();
        JsonWriter::new(&mut buffer).write_report(&report()).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(value["methods"], 3);
        assert_eq!(value["findings"][0]["local"], "count");
        assert_eq!(value["findings"][0]["scope_start"], 7);
    }

    #[test]
    fn test_terminal_writer_lists_findings() {
        colored::control::set_override(false);
        let mut buffer = Vec::new();
        TerminalWriter::new(&mut buffer).write_report(&report()).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("com/acme/Job.run @4"));
        assert!(text.contains("assignment to `count`"));
        assert!(text.contains("1 assignment(s)"));
    }

    #[test]
    fn test_terminal_writer_empty_report() {
        colored::control::set_override(false);
        let mut buffer = Vec::new();
        TerminalWriter::new(&mut buffer)
            .write_report(&AnalysisReport::default())
            .unwrap();
        assert!(String::from_utf8(buffer)
            .unwrap()
            .contains("No bloated assignment scopes found"));
    }

    #[test]
    fn test_format_from_config() {
        assert_eq!(OutputFormat::from_config("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_config("xml"), None);
    }
}
