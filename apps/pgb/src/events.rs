//! Event handling and progress display

use console::Style;
use pgb_events::{AppEvent, GeneralEvent, ProvisionEvent, RemoteEvent, StepEvent};
use pgb_types::PlatformStatus;
use tracing::Level;

/// Event handler for progress display and user feedback
pub struct EventHandler {
    colors_enabled: bool,
    json_output: bool,
    debug_enabled: bool,
}

impl EventHandler {
    /// Create new event handler
    pub fn new(colors_enabled: bool, json_output: bool, debug_enabled: bool) -> Self {
        Self {
            colors_enabled,
            json_output,
            debug_enabled,
        }
    }

    /// Handle incoming event
    pub fn handle_event(&mut self, event: AppEvent) {
        trace_event(&event);

        if self.json_output {
            match event.to_json_line() {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!("failed to serialize event: {e}"),
            }
            return;
        }

        match event {
            AppEvent::General(general) => self.handle_general(general),
            AppEvent::Step(step) => self.handle_step(step),
            AppEvent::Provision(provision) => self.handle_provision(provision),
            AppEvent::Remote(remote) => self.handle_remote(remote),
        }
    }

    fn handle_general(&self, event: GeneralEvent) {
        match event {
            GeneralEvent::Warning { message, context } => {
                self.show_warning(&message);
                if let Some(context) = context {
                    self.show_detail(&context);
                }
            }
            GeneralEvent::Error { message, details } => {
                self.show_error(&message);
                if let Some(details) = details {
                    self.show_detail(&details);
                }
            }
            GeneralEvent::DebugLog { message, .. } => {
                if self.debug_enabled {
                    self.show_detail(&message);
                }
            }
        }
    }

    fn handle_step(&self, event: StepEvent) {
        match event {
            StepEvent::Started { app_id, workspace } => match app_id {
                Some(id) => self.show_status(&format!(
                    "Building app {id} from {}",
                    workspace.display()
                )),
                None => self.show_status(&format!(
                    "Building a new app from {}",
                    workspace.display()
                )),
            },
            StepEvent::OverrideApplied { name, version } => {
                self.show_status(&format!("Using name '{name}' version '{version}'"));
            }
            StepEvent::KeysUnlocking { platforms } => {
                let names: Vec<String> = platforms.iter().map(ToString::to_string).collect();
                self.show_status(&format!("🔑 Unlocking signing keys for {}", names.join(", ")));
            }
            StepEvent::Completed {
                app_id,
                duration,
                artifacts,
            } => {
                self.show_success(&format!(
                    "✅ Built app {app_id} in {:.1}s ({artifacts} artifact{})",
                    duration.as_secs_f64(),
                    if artifacts == 1 { "" } else { "s" }
                ));
            }
            StepEvent::Failed { failure, .. } => {
                self.show_error(&format!("❌ Build step failed: {}", failure.message));
                if let Some(hint) = failure.hint {
                    self.show_detail(&hint);
                }
            }
            StepEvent::Cancelled { .. } => self.show_warning("Build step cancelled"),
        }
    }

    fn handle_provision(&self, event: ProvisionEvent) {
        match event {
            ProvisionEvent::Started => self.show_status("Creating a new app on the build service"),
            ProvisionEvent::AppCreated { app_id } => {
                self.show_success(&format!("Created app {app_id}"));
            }
            ProvisionEvent::Failed { failure } => {
                self.show_error(&format!("Could not create app: {}", failure.message));
            }
        }
    }

    fn handle_remote(&self, event: RemoteEvent) {
        match event {
            RemoteEvent::ArchiveCreated { files, bytes } => {
                self.show_status(&format!("📦 Packed {files} files ({})", format_bytes(bytes)));
            }
            RemoteEvent::UploadStarted { app_id, bytes } => {
                self.show_status(&format!(
                    "⬆️  Uploading {} to app {app_id}",
                    format_bytes(bytes)
                ));
            }
            RemoteEvent::UploadCompleted { .. } => self.show_status("Upload complete"),
            RemoteEvent::KeyUnlocked { platform, key_id } => {
                self.show_status(&format!("Unlocked {platform} key {key_id}"));
            }
            RemoteEvent::BuildQueued { app_id } => {
                self.show_status(&format!("🔨 Build queued for app {app_id}"));
            }
            RemoteEvent::PlatformStatusChanged { platform, status } => match status {
                PlatformStatus::Complete => self.show_success(&format!("{platform}: complete")),
                PlatformStatus::Error => self.show_error(&format!("{platform}: error")),
                PlatformStatus::Skipped => self.show_warning(&format!("{platform}: skipped")),
                _ => self.show_status(&format!("{platform}: {status}")),
            },
            RemoteEvent::PollWaiting { attempt, pending } => {
                if self.debug_enabled {
                    let names: Vec<String> = pending.iter().map(ToString::to_string).collect();
                    self.show_detail(&format!(
                        "poll {attempt}: waiting for {}",
                        names.join(", ")
                    ));
                }
            }
            RemoteEvent::ArtifactDownloaded {
                platform,
                path,
                size,
            } => {
                self.show_success(&format!(
                    "📥 {platform} → {} ({})",
                    path.display(),
                    format_bytes(size)
                ));
            }
        }
    }

    fn style(&self, style: Style) -> Style {
        if self.colors_enabled {
            style
        } else {
            Style::new()
        }
    }

    fn show_status(&self, message: &str) {
        println!("{message}");
    }

    fn show_success(&self, message: &str) {
        println!("{}", self.style(Style::new().green()).apply_to(message));
    }

    fn show_warning(&self, message: &str) {
        eprintln!(
            "{} {message}",
            self.style(Style::new().yellow().bold()).apply_to("warning:")
        );
    }

    fn show_error(&self, message: &str) {
        eprintln!("{}", self.style(Style::new().red().bold()).apply_to(message));
    }

    fn show_detail(&self, message: &str) {
        eprintln!("  {}", self.style(Style::new().dim()).apply_to(message));
    }
}

/// Mirror the event into the tracing log at its level
fn trace_event(event: &AppEvent) {
    let level = event.log_level();
    if level == Level::ERROR {
        tracing::error!(?event);
    } else if level == Level::WARN {
        tracing::warn!(?event);
    } else if level == Level::INFO {
        tracing::info!(?event);
    } else {
        tracing::debug!(?event);
    }
}

/// Human-readable byte count
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
