use std::io::IsTerminal;
use std::path::Path;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use nativebridge_host::MarkerStatus;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
pub struct StatusReport<'a> {
    pub marker: &'a str,
    #[serde(flatten)]
    pub status: MarkerStatus,
    pub version: &'static str,
    pub build_target: &'static str,
}

impl<'a> StatusReport<'a> {
    pub fn new(marker: &'a Path, status: MarkerStatus) -> StatusReport<'a> {
        StatusReport {
            marker: marker.to_str().unwrap_or("<non-utf8 path>"),
            status,
            version: env!("CARGO_PKG_VERSION"),
            build_target: option_env!("NATIVEBRIDGE_BUILD_TARGET").unwrap_or("unknown"),
        }
    }

    fn state(&self) -> &'static str {
        match self.status {
            MarkerStatus::Absent => "absent",
            MarkerStatus::Live { .. } => "live",
            MarkerStatus::Stale { .. } => "stale",
            MarkerStatus::Invalid => "invalid",
        }
    }

    fn pid(&self) -> String {
        self.status
            .pid()
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| "-".to_string())
    }
}

pub fn print_status(report: &StatusReport<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["STATE", "PID", "MARKER", "VERSION"])
                .add_row(vec![
                    report.state().to_string(),
                    report.pid(),
                    report.marker.to_string(),
                    report.version.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "state={} pid={} marker={} version={} target={}",
                report.state(),
                report.pid(),
                report.marker,
                report.version,
                report.build_target
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_report_flattens_marker_state() {
        let report = StatusReport::new(Path::new("/tmp/x.pid"), MarkerStatus::Live { pid: 42 });
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["state"], "live");
        assert_eq!(value["pid"], 42);
        assert_eq!(value["marker"], "/tmp/x.pid");
    }

    #[test]
    fn absent_marker_has_no_pid() {
        let report = StatusReport::new(Path::new("/tmp/x.pid"), MarkerStatus::Absent);
        assert_eq!(report.state(), "absent");
        assert_eq!(report.pid(), "-");
        let value = serde_json::to_value(&report).unwrap();
        assert!(value.get("pid").is_none());
    }
}
