//! Tracing subscriber setup.
//!
//! Events are classified into a [`Record`] once and then rendered twice:
//! coloured for the console and timestamped plain text for the log file.
//! Runner events on [`COMMAND_TARGET`] carry `command`, `code` and `stderr`
//! fields and get their own layout, so a failed step shows the command line,
//! its exit status and the captured stderr indented below it.
use std::fmt::{self, Write as _};
use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::sync::Mutex;

use tracing::Level;
use tracing::field::{Field, Visit};

use super::utils::{format_utc_datetime, format_utc_time, log_file_path, strip_ansi};
use super::{COMMAND_TARGET, RUNNING, STAGE_TARGET};

/// Fields of an event that the renderers use.
#[derive(Debug, Default)]
struct Fields {
    message: String,
    command: Option<String>,
    code: Option<i64>,
    stderr: Option<String>,
}

impl Visit for Fields {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let text = format!("{value:?}");
        match field.name() {
            "message" => self.message = text,
            "command" => self.command = Some(text),
            "stderr" => self.stderr = Some(text),
            _ => {}
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "command" => self.command = Some(value.to_string()),
            "stderr" => self.stderr = Some(value.to_string()),
            _ => {}
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if field.name() == "code" {
            self.code = Some(value);
        }
    }
}

/// A classified event.
#[derive(Debug, PartialEq, Eq)]
enum Record {
    Stage(String),
    Running(String),
    Failed {
        command: String,
        status: String,
        stderr: Vec<String>,
    },
    Plain(Level, String),
}

impl Record {
    fn from_event(event: &tracing::Event<'_>) -> Self {
        let metadata = event.metadata();
        let mut fields = Fields::default();
        event.record(&mut fields);
        Self::classify(*metadata.level(), metadata.target(), fields)
    }

    fn classify(level: Level, target: &str, fields: Fields) -> Self {
        match (target, fields.command) {
            (STAGE_TARGET, _) => Self::Stage(fields.message),
            (COMMAND_TARGET, Some(command)) if fields.message == RUNNING => {
                Self::Running(command)
            }
            (COMMAND_TARGET, Some(command)) => {
                let status = match fields.code {
                    Some(code) if code >= 0 => format!("exit {code}"),
                    Some(_) => "killed".to_string(),
                    None => fields.message,
                };
                let stderr = fields
                    .stderr
                    .map(|s| s.lines().map(str::to_string).collect())
                    .unwrap_or_default();
                Self::Failed {
                    command,
                    status,
                    stderr,
                }
            }
            (_, _) => Self::Plain(level, fields.message),
        }
    }

    /// Plain-text lines for the log file, without timestamps.
    fn file_lines(&self) -> Vec<String> {
        match self {
            Self::Stage(msg) => vec![format!("==> {msg}")],
            Self::Running(command) => vec![format!("    $ {command}")],
            Self::Failed {
                command,
                status,
                stderr,
            } => std::iter::once(format!("    [failed] {command} ({status})"))
                .chain(stderr.iter().map(|l| format!("        | {l}")))
                .collect(),
            Self::Plain(level, msg) => {
                let tag = match *level {
                    Level::ERROR => "[error] ",
                    Level::WARN => "[warn] ",
                    Level::INFO => "",
                    _ => "[debug] ",
                };
                vec![format!("    {tag}{msg}")]
            }
        }
    }

    /// Coloured console text, one or more newline-terminated lines.
    fn console_text(&self) -> String {
        let mut out = String::new();
        match self {
            Self::Stage(msg) => {
                writeln!(out, "\x1b[1;34m==>\x1b[0m \x1b[1m{msg}\x1b[0m").ok();
            }
            Self::Running(command) => {
                writeln!(out, "  \x1b[2m$ {command}\x1b[0m").ok();
            }
            Self::Failed {
                command,
                status,
                stderr,
            } => {
                writeln!(out, "  \x1b[2m\u{2717} {command} ({status})\x1b[0m").ok();
                for line in stderr {
                    writeln!(out, "  \x1b[2m    \u{2502} {line}\x1b[0m").ok();
                }
            }
            Self::Plain(Level::ERROR, msg) => {
                writeln!(out, "\x1b[31mERROR\x1b[0m {msg}").ok();
            }
            Self::Plain(Level::WARN, msg) => {
                writeln!(out, "\x1b[33mWARN\x1b[0m  {msg}").ok();
            }
            Self::Plain(Level::INFO, msg) => {
                writeln!(out, "  {msg}").ok();
            }
            Self::Plain(_, msg) => {
                writeln!(out, "  \x1b[2m{msg}\x1b[0m").ok();
            }
        }
        out
    }
}

/// A [`tracing_subscriber::Layer`] that appends every event to the log file,
/// timestamped and with ANSI codes stripped.
#[derive(Debug)]
pub(super) struct FileLayer {
    file: Mutex<fs::File>,
}

impl FileLayer {
    /// Open the log file for `command` under the cache directory.
    pub(super) fn new(command: &str) -> Option<Self> {
        Self::at(&log_file_path(command)?)
    }

    /// Truncate `path`, write a run header, and open it for appending.
    pub(super) fn at(path: &Path) -> Option<Self> {
        let header = format!(
            "# provision {} run started {} UTC\n",
            crate::cli::VERSION,
            format_utc_datetime(),
        );
        fs::write(path, header).ok()?;
        let file = fs::OpenOptions::new().append(true).open(path).ok()?;
        Some(Self {
            file: Mutex::new(file),
        })
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for FileLayer {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let record = Record::from_event(event);
        let ts = format_utc_time();
        if let Ok(mut f) = self.file.lock() {
            for line in record.file_lines() {
                writeln!(f, "[{ts}] {}", strip_ansi(&line)).ok();
            }
        }
    }
}

/// Console [`FormatEvent`](tracing_subscriber::fmt::FormatEvent) for
/// provision output.
struct ProvisionFormatter;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for ProvisionFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        writer.write_str(&Record::from_event(event).console_text())
    }
}

/// Initialise the global [`tracing`] subscriber.
///
/// Warnings and errors go to stderr, everything else to stdout; the console
/// shows `debug` (including every command run) only when `verbose` is set.
/// The file layer always records `debug` and above in
/// `$XDG_CACHE_HOME/provision/<command>.log`.
/// Must be called once at program startup, before any logging.
pub fn init_subscriber(verbose: bool, command: &str) {
    use tracing_subscriber::fmt::writer::MakeWriterExt as _;
    use tracing_subscriber::{
        Layer as _, filter::LevelFilter, fmt, layer::SubscriberExt as _,
        util::SubscriberInitExt as _,
    };

    let console_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let make_writer = std::io::stderr
        .with_max_level(Level::WARN)
        .and(std::io::stdout.with_min_level(Level::INFO));

    let console_layer = fmt::layer()
        .event_format(ProvisionFormatter)
        .with_writer(make_writer)
        .with_filter(console_level);

    let file_layer = FileLayer::new(command).map(|l| l.with_filter(LevelFilter::DEBUG));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::io;
    use std::sync::Arc;

    use tracing_subscriber::layer::SubscriberExt as _;

    use super::*;

    fn fields(message: &str) -> Fields {
        Fields {
            message: message.to_string(),
            ..Fields::default()
        }
    }

    #[test]
    fn stage_target_is_a_stage() {
        let record = Record::classify(Level::INFO, STAGE_TARGET, fields("Setting up configs"));
        assert_eq!(record, Record::Stage("Setting up configs".to_string()));
        assert_eq!(record.file_lines(), vec!["==> Setting up configs"]);
    }

    #[test]
    fn failed_command_shows_status_and_indented_stderr() {
        let record = Record::classify(
            Level::DEBUG,
            COMMAND_TARGET,
            Fields {
                message: "failed".to_string(),
                command: Some("apt install -y git".to_string()),
                code: Some(100),
                stderr: Some("E: Unable to locate package\nE: second".to_string()),
            },
        );
        assert_eq!(
            record.file_lines(),
            vec![
                "    [failed] apt install -y git (exit 100)",
                "        | E: Unable to locate package",
                "        | E: second",
            ]
        );
    }

    #[test]
    fn negative_code_reads_as_killed() {
        let record = Record::classify(
            Level::DEBUG,
            COMMAND_TARGET,
            Fields {
                message: "failed".to_string(),
                command: Some("sleep 9".to_string()),
                code: Some(-1),
                stderr: None,
            },
        );
        assert_eq!(record.file_lines(), vec!["    [failed] sleep 9 (killed)"]);
    }

    #[test]
    fn command_target_without_command_is_plain() {
        let record = Record::classify(Level::WARN, COMMAND_TARGET, fields("empty"));
        assert_eq!(record, Record::Plain(Level::WARN, "empty".to_string()));
        assert_eq!(record.file_lines(), vec!["    [warn] empty"]);
    }

    #[test]
    fn file_layer_renders_runner_events() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("run.log");
        let layer = FileLayer::at(&path).unwrap();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!(target: COMMAND_TARGET, command = "ls /nope", "running");
            tracing::debug!(
                target: COMMAND_TARGET,
                command = "ls /nope",
                code = 2_i64,
                stderr = "ls: cannot access '/nope'",
                "failed"
            );
        });

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# provision "));
        assert!(text.contains("]     $ ls /nope\n"));
        assert!(text.contains("]     [failed] ls /nope (exit 2)\n"));
        assert!(text.contains("]         | ls: cannot access '/nope'\n"));
    }

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn console_formatter_colours_levels() {
        let buf = Buffer::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::registry().with(
            tracing_subscriber::fmt::layer()
                .event_format(ProvisionFormatter)
                .with_writer(move || writer.clone()),
        );

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("disk almost full");
            tracing::info!(target: STAGE_TARGET, "Installing system packages");
        });

        let out = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(
            strip_ansi(&out),
            "WARN  disk almost full\n==> Installing system packages\n"
        );
    }
}
