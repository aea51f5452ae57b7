use std::env;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use log::{LevelFilter, debug, info};
use serde_json::Value;

use threadfeed::config::{APP_NAME, AppConfig, AppPaths, load_config, write_default_config};
use threadfeed::session::{RegistryOptions, ThreadRegistry};
use threadfeed::transcript::{JsonlTranscriptStore, TranscriptStore, read_transcript_file};
use threadfeed::{SequentialIds, replay_transcript};
use threadfeed_protocol::{FeedBody, FeedItem};

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn async_replay(ctx: RuntimeContext, cmd: ReplayCommand) -> Result<()> {
    handle_replay(&ctx, cmd).await
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging()?;
    debug!("resolved paths: {}", ctx.paths);

    match cli.command {
        Command::Replay(cmd) => async_replay(ctx, cmd),
        Command::Init(cmd) => handle_init(&ctx, cmd),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Completions { shell } => handle_completions(shell),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Threadfeed - rebuild agent conversation feeds from stream transcripts.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
    /// Output machine readable JSON
    #[arg(long, global = true, conflicts_with = "yaml")]
    json: bool,
    /// Output machine readable YAML
    #[arg(long, global = true)]
    yaml: bool,
    /// Disable ANSI colors in output
    #[arg(long = "no-color", global = true, conflicts_with = "color")]
    no_color: bool,
    /// Control color output (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorOption::Auto, global = true)]
    color: ColorOption,
    /// Do not change anything on disk
    #[arg(long = "dry-run", global = true)]
    dry_run: bool,
    /// Assume "yes" for interactive prompts
    #[arg(short = 'y', long = "yes", alias = "force", global = true)]
    assume_yes: bool,
    /// Emit additional diagnostics for troubleshooting
    #[arg(long = "diagnostics", global = true)]
    diagnostics: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorOption {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rebuild a thread's feed from its transcript
    Replay(ReplayCommand),
    /// Create config directories and default files
    Init(InitCommand),
    /// Inspect and manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
struct ReplayCommand {
    /// Thread whose stored transcript to replay
    #[arg(value_name = "THREAD_ID", required_unless_present = "file")]
    thread_id: Option<String>,
    /// Replay a JSONL transcript file instead of the store
    #[arg(long, value_name = "PATH", conflicts_with = "thread_id")]
    file: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct InitCommand {
    /// Recreate configuration even if it already exists
    #[arg(long = "force")]
    force: bool,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Output the effective configuration
    Show,
    /// Print the resolved config file path
    Path,
    /// Regenerate the default configuration file
    Reset,
}

#[derive(Debug)]
struct RuntimeContext {
    common: CommonOpts,
    paths: AppPaths,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let paths = AppPaths::discover(common.config.clone())?;
        let config = load_config(&paths.config_file, false)?;
        let paths = paths.apply_overrides(&config)?;
        Ok(Self {
            common,
            paths,
            config,
        })
    }

    fn init_logging(&self) -> Result<()> {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        if self.common.quiet {
            log::set_max_level(LevelFilter::Off);
            return Ok(());
        }

        let level = match self.effective_log_level() {
            LevelFilter::Off => "off",
            LevelFilter::Error => "error",
            LevelFilter::Warn => "warn",
            LevelFilter::Info => "info",
            LevelFilter::Debug => "debug",
            LevelFilter::Trace => "trace",
        };

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("threadfeed={level}")));

        let file_layer = match &self.config.logging.file {
            Some(path) => {
                let file = open_log_file(Path::new(path))?;
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(Mutex::new(file))
                        .with_ansi(false),
                )
            }
            None => None,
        };

        // Logs go to stderr so replay output on stdout stays clean.
        if self.common.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
                .try_init()
                .ok();
        } else {
            let force_color = matches!(self.common.color, ColorOption::Always)
                || env::var_os("FORCE_COLOR").is_some();
            let disable_color = self.common.no_color
                || matches!(self.common.color, ColorOption::Never)
                || env::var_os("NO_COLOR").is_some()
                || (!force_color && !io::stderr().is_terminal());

            tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(io::stderr)
                        .with_ansi(!disable_color)
                        .with_target(self.common.diagnostics)
                        .with_file(self.common.diagnostics)
                        .with_line_number(self.common.diagnostics),
                )
                .try_init()
                .ok();
        }

        // Also init env_logger for compatibility with log crate users
        let mut builder = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(self.config.logging.level.as_str()),
        );
        builder.filter_level(self.effective_log_level());
        builder.try_init().ok();

        Ok(())
    }

    fn effective_log_level(&self) -> LevelFilter {
        if self.common.trace {
            LevelFilter::Trace
        } else if self.common.debug {
            LevelFilter::Debug
        } else {
            match self.common.verbose {
                0 => self
                    .config
                    .logging
                    .level
                    .parse()
                    .unwrap_or(LevelFilter::Info),
                1 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }

    fn ensure_directories(&self) -> Result<()> {
        if self.common.dry_run {
            info!(
                "dry-run: would ensure data dir {} and transcripts dir {}",
                self.paths.data_dir.display(),
                self.paths.transcripts_dir.display()
            );
            return Ok(());
        }

        for dir in [&self.paths.data_dir, &self.paths.transcripts_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating directory {}", dir.display()))?;
        }
        Ok(())
    }
}

fn open_log_file(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))
}

/// Session options for the CLI; sequential ids keep repeated replays stable.
fn replay_options(config: &AppConfig) -> RegistryOptions {
    RegistryOptions {
        ids: Arc::new(SequentialIds::new("item")),
        ..config.feed.registry_options()
    }
}

async fn handle_replay(ctx: &RuntimeContext, cmd: ReplayCommand) -> Result<()> {
    let options = replay_options(&ctx.config);
    let items = match (&cmd.file, &cmd.thread_id) {
        (Some(path), _) => {
            let entries = read_transcript_file(path)
                .await
                .with_context(|| format!("reading transcript file {}", path.display()))?;
            info!("replaying {} transcript entries", entries.len());
            replay_transcript(&entries, &options.reducer())
        }
        (None, Some(thread_id)) => {
            let store: Arc<dyn TranscriptStore> =
                Arc::new(JsonlTranscriptStore::new(&ctx.paths.transcripts_dir));
            let mut registry = ThreadRegistry::new(store, options);
            let session = registry
                .open(thread_id)
                .await
                .with_context(|| format!("opening thread {thread_id}"))?;
            session.feed().snapshot()
        }
        (None, None) => return Err(anyhow!("either THREAD_ID or --file is required")),
    };

    let output = if ctx.common.json {
        serde_json::to_string_pretty(&items).context("serializing feed to JSON")?
    } else if ctx.common.yaml {
        serde_yaml::to_string(&items).context("serializing feed to YAML")?
    } else {
        items.iter().map(render_item).collect::<Vec<_>>().join("\n")
    };

    println!("{output}");
    Ok(())
}

fn render_item(item: &FeedItem) -> String {
    match &item.body {
        FeedBody::Message { role, text } => format!("[{role}] {text}"),
        FeedBody::Reasoning { mode, text } => format!("[{mode}] {text}"),
        FeedBody::Tool {
            status,
            name,
            args,
            result,
        } => {
            let mut line = format!("[tool:{status}] {name}");
            if let Some(args) = args {
                line.push(' ');
                line.push_str(&compact(args));
            }
            if let Some(result) = result {
                line.push_str(" -> ");
                line.push_str(&compact(result));
            }
            line
        }
        FeedBody::Todos { items } => format!("[todos] {} items", items.len()),
        FeedBody::Log { line } => format!("[log] {line}"),
        FeedBody::Error {
            message,
            code,
            source,
        } => {
            let mut line = format!("[error] {message}");
            if let Some(code) = code {
                line.push_str(&format!(" (code {code})"));
            }
            if let Some(source) = source {
                line.push_str(&format!(" from {source}"));
            }
            line
        }
        FeedBody::System { line } => format!("[system] {line}"),
    }
}

fn compact(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn handle_init(ctx: &RuntimeContext, cmd: InitCommand) -> Result<()> {
    if ctx.paths.config_file.exists() && !(cmd.force || ctx.common.assume_yes) {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            ctx.paths.config_file.display()
        ));
    }

    ctx.ensure_directories()?;

    if ctx.common.dry_run {
        info!(
            "dry-run: would write default config to {}",
            ctx.paths.config_file.display()
        );
        return Ok(());
    }

    write_default_config(&ctx.paths.config_file)
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            if ctx.common.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&ctx.config)
                        .context("serializing config to JSON")?
                );
            } else if ctx.common.yaml {
                println!(
                    "{}",
                    serde_yaml::to_string(&ctx.config).context("serializing config to YAML")?
                );
            } else {
                println!("{:#?}", ctx.config);
            }
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", ctx.paths.config_file.display());
            Ok(())
        }
        ConfigCommand::Reset => {
            if ctx.common.dry_run {
                info!(
                    "dry-run: would reset config at {}",
                    ctx.paths.config_file.display()
                );
                return Ok(());
            }
            write_default_config(&ctx.paths.config_file)
        }
    }
}

fn handle_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use threadfeed::IdSource;
    use threadfeed_protocol::{Role, ToolStatus};

    #[test]
    fn test_cli_parses_replay() {
        let cli = Cli::try_parse_from(["threadfeed", "replay", "thread-1", "--json"]).unwrap();
        assert!(cli.common.json);
        match cli.command {
            Command::Replay(cmd) => assert_eq!(cmd.thread_id.as_deref(), Some("thread-1")),
            other => panic!("unexpected command: {other:?}"),
        }

        assert!(Cli::try_parse_from(["threadfeed", "replay"]).is_err());
        assert!(Cli::try_parse_from(["threadfeed", "replay", "--file", "t.jsonl"]).is_ok());
    }

    #[test]
    fn test_replay_options_follow_feed_config() {
        let mut config = AppConfig::default();
        config.feed.max_items = 3;
        config.feed.unknown_preview_chars = 8;
        let options = replay_options(&config);
        assert_eq!(options.max_items, 3);
        assert_eq!(options.preview_chars, 8);
        assert_eq!(options.ids.new_id(), "item-1");
    }

    #[test]
    fn test_open_log_file_creates_parent() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("logs").join("threadfeed.log");
        open_log_file(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_render_item() {
        let message = FeedItem::new(
            "1",
            "ts",
            FeedBody::Message {
                role: Role::User,
                text: "hi".to_string(),
            },
        );
        assert_eq!(render_item(&message), "[user] hi");

        let tool = FeedItem::new(
            "2",
            "ts",
            FeedBody::Tool {
                status: ToolStatus::Done,
                name: "bash".to_string(),
                args: Some(json!({"cmd": "ls"})),
                result: Some(json!("a b")),
            },
        );
        assert_eq!(render_item(&tool), r#"[tool:done] bash {"cmd":"ls"} -> a b"#);
    }
}
