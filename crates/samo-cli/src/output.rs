//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag), one object per line when streaming
//! - Quiet mode for scripting (--quiet flag)

use chrono::DateTime;
use serde_json::json;

use samo_core::{Cache, ClientEvent, Config, Entry, Stats, Update};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print one event from a watched client
    pub fn print_event(&self, event: &ClientEvent) {
        match event {
            ClientEvent::Message(update) => self.print_update(update),
            ClientEvent::Error(message) => match self.format {
                OutputFormat::Json => {
                    println!("{}", json!({"event": "error", "message": message}));
                }
                _ => eprintln!("! {}", message),
            },
            other => {
                let name = event_name(other);
                match self.format {
                    OutputFormat::Human => eprintln!("· {}", name),
                    OutputFormat::Json => println!("{}", json!({"event": name})),
                    OutputFormat::Quiet => {}
                }
            }
        }
    }

    /// Print a cache or time update
    pub fn print_update(&self, update: &Update) {
        match (self.format, update) {
            (OutputFormat::Human, Update::Cache(cache)) => self.print_cache(cache),
            (OutputFormat::Human, Update::Time(time)) => {
                println!("{} ({})", format_timestamp(*time), time);
            }
            (OutputFormat::Json, Update::Cache(cache)) => {
                println!("{}", json!({"event": "message", "cache": cache}));
            }
            (OutputFormat::Json, Update::Time(time)) => {
                println!("{}", json!({"event": "message", "time": time}));
            }
            (OutputFormat::Quiet, Update::Cache(cache)) => {
                for entry in cache.entries() {
                    println!("{}", entry.index);
                }
            }
            (OutputFormat::Quiet, Update::Time(time)) => println!("{}", time),
        }
    }

    /// Print a cache (single entry or list)
    pub fn print_cache(&self, cache: &Cache) {
        match self.format {
            OutputFormat::Human => match cache {
                Cache::Entry(entry) if entry.is_empty() => println!("(empty)"),
                Cache::Entry(entry) => println!("{}", entry_line(entry)),
                Cache::Collection(entries) => {
                    for entry in entries {
                        println!("{}", entry_line(entry));
                    }
                    println!("{} entr{}", entries.len(), if entries.len() == 1 { "y" } else { "ies" });
                }
            },
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(cache).unwrap_or_default());
            }
            OutputFormat::Quiet => {
                for entry in cache.entries() {
                    println!("{}", entry.index);
                }
            }
        }
    }

    /// Print server statistics
    pub fn print_stats(&self, stats: &Stats) {
        match self.format {
            OutputFormat::Human => {
                if stats.keys.is_empty() {
                    println!("No keys found.");
                    return;
                }
                for key in &stats.keys {
                    println!("{}", key);
                }
                println!("\n{} key(s)", stats.keys.len());
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(stats).unwrap_or_default());
            }
            OutputFormat::Quiet => {
                for key in &stats.keys {
                    println!("{}", key);
                }
            }
        }
    }

    /// Print the effective configuration
    pub fn print_config(&self, config: &Config, path: &str) {
        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(config).unwrap_or_default());
            }
            OutputFormat::Quiet => {
                println!("{}", config.address.as_deref().unwrap_or_default());
            }
            OutputFormat::Human => {
                println!("Configuration:");
                println!(
                    "  address:               {}",
                    config.address.as_deref().unwrap_or("(not set)")
                );
                println!("  tls:                   {}", config.tls);
                println!(
                    "  protocols:             {}",
                    if config.protocols.is_empty() {
                        "(none)".to_string()
                    } else {
                        config.protocols.join(", ")
                    }
                );
                println!("  reconnect_interval_ms: {}", config.reconnect_interval_ms);
                println!("  open_timeout_ms:       {}", config.open_timeout_ms);
                println!("  resume_poll_ms:        {}", config.resume_poll_ms);
                println!("  log_level:             {}", config.log_level);
                println!();
                println!("Config file: {}", path);
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => eprintln!("{}", msg),
            OutputFormat::Json | OutputFormat::Quiet => {}
        }
    }
}

fn event_name(event: &ClientEvent) -> &'static str {
    match event {
        ClientEvent::Open => "open",
        ClientEvent::Close => "close",
        ClientEvent::Connecting => "connecting",
        ClientEvent::Message(_) => "message",
        ClientEvent::Error(_) => "error",
        ClientEvent::Frozen => "frozen",
        ClientEvent::Resume => "resume",
    }
}

/// One line per entry: index, created, updated, data
fn entry_line(entry: &Entry) -> String {
    let index = if entry.index.is_empty() {
        "-"
    } else {
        entry.index.as_str()
    };
    format!(
        "{} | {} | {} | {}",
        truncate(index, 20),
        format_timestamp(entry.created),
        format_timestamp(entry.updated),
        truncate(&entry.data.to_string(), 60)
    )
}

/// Server timestamps are nanoseconds since the epoch; zero means unset
fn format_timestamp(nanos: i64) -> String {
    if nanos == 0 {
        return "-".to_string();
    }
    DateTime::from_timestamp_nanos(nanos)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}
