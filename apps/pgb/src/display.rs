//! Output rendering and formatting

use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use pgb_step::validation::FormValidation;
use pgb_step::ValidationReport;
use pgb_types::{BuildReport, Platform, PlatformStatus, RemoteApp};
use std::io;

/// Output renderer for CLI results
#[derive(Clone)]
pub struct OutputRenderer {
    /// Use JSON output format
    json_output: bool,
    colors_enabled: bool,
}

impl OutputRenderer {
    /// Create new output renderer
    pub fn new(json_output: bool, colors_enabled: bool) -> Self {
        Self {
            json_output,
            colors_enabled,
        }
    }

    fn table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        if !self.colors_enabled {
            table.force_no_tty();
        }
        table
    }

    fn status_cell(&self, status: PlatformStatus) -> Cell {
        let cell = Cell::new(status.to_string());
        if !self.colors_enabled {
            return cell;
        }
        match status {
            PlatformStatus::Complete => cell.fg(Color::Green),
            PlatformStatus::Error => cell.fg(Color::Red),
            PlatformStatus::Pending | PlatformStatus::Skipped => cell.fg(Color::Yellow),
            PlatformStatus::Unrequested => cell,
        }
    }

    /// Render the result of `pgb run`
    pub fn render_build_report(&self, report: &BuildReport) -> io::Result<()> {
        if self.json_output {
            println!(
                "{}",
                serde_json::to_string(report).map_err(io::Error::other)?
            );
            return Ok(());
        }

        let mut table = self.table();
        table.set_header(vec![
            Cell::new("Platform").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
            Cell::new("Artifact").add_attribute(Attribute::Bold),
        ]);
        for result in &report.platforms {
            let artifact = report
                .artifacts
                .iter()
                .find(|a| a.platform == result.platform)
                .map_or_else(
                    || result.message.clone().unwrap_or_else(|| "-".to_string()),
                    |a| a.path.display().to_string(),
                );
            table.add_row(vec![
                Cell::new(result.platform.to_string()),
                self.status_cell(result.status),
                Cell::new(artifact),
            ]);
        }
        println!("{table}");
        Ok(())
    }

    /// Render the remote state of an app for `pgb status`
    pub fn render_remote_app(&self, app: &RemoteApp) -> io::Result<()> {
        if self.json_output {
            println!("{}", serde_json::to_string(app).map_err(io::Error::other)?);
            return Ok(());
        }

        println!(
            "App {} {} {}",
            app.id,
            app.title.as_deref().unwrap_or("-"),
            app.version.as_deref().unwrap_or("")
        );
        let mut table = self.table();
        table.set_header(vec![
            Cell::new("Platform").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
            Cell::new("Message").add_attribute(Attribute::Bold),
        ]);
        for platform in Platform::ALL {
            table.add_row(vec![
                Cell::new(platform.to_string()),
                self.status_cell(app.platform_status(platform)),
                Cell::new(app.platform_error(platform).unwrap_or("")),
            ]);
        }
        println!("{table}");
        Ok(())
    }

    /// Render the field checks of `pgb check`
    pub fn render_validation(&self, report: &ValidationReport) -> io::Result<()> {
        if self.json_output {
            let checks: Vec<serde_json::Value> = report
                .checks
                .iter()
                .map(|c| {
                    let (level, message) = match &c.result {
                        FormValidation::Ok => ("ok", None),
                        FormValidation::Warning(m) => ("warning", Some(m)),
                        FormValidation::Error(m) => ("error", Some(m)),
                    };
                    serde_json::json!({ "field": c.field, "level": level, "message": message })
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string(&checks).map_err(io::Error::other)?
            );
            return Ok(());
        }

        let mut table = self.table();
        table.set_header(vec![
            Cell::new("Field").add_attribute(Attribute::Bold),
            Cell::new("Result").add_attribute(Attribute::Bold),
            Cell::new("Message").add_attribute(Attribute::Bold),
        ]);
        for check in &report.checks {
            let (label, color) = match check.result {
                FormValidation::Ok => ("ok", Color::Green),
                FormValidation::Warning(_) => ("warning", Color::Yellow),
                FormValidation::Error(_) => ("error", Color::Red),
            };
            let cell = if self.colors_enabled {
                Cell::new(label).fg(color)
            } else {
                Cell::new(label)
            };
            table.add_row(vec![
                Cell::new(check.field),
                cell,
                Cell::new(check.result.message().unwrap_or("")),
            ]);
        }
        println!("{table}");
        Ok(())
    }
}
