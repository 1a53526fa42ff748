//! CLI entry point for `mailshell`.

use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};

use mailshell::config::{self, Config};
use mailshell::model::Header;
use mailshell::parser::render;
use mailshell::parser::Body;

#[derive(Parser)]
#[command(name = "mailshell", version, about = "Decode and display mail messages in the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Render HTML in-process instead of running html_to_text_cmd
    #[arg(long, global = true)]
    builtin_render: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the readable text of a message
    View {
        #[arg(value_name = "FILE")]
        path: PathBuf,
        /// Prefer the rendered HTML part over the plain-text part
        #[arg(long)]
        html: bool,
    },
    /// List the MIME parts of a message
    Parts {
        #[arg(value_name = "FILE")]
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Show the decoded header fields of a message
    Headers {
        #[arg(value_name = "FILE")]
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Show the configuration in effect
    Config {
        /// Write the current configuration to the config file
        #[arg(long)]
        save: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = config::load_config();
    if cli.builtin_render {
        config.render.builtin = true;
    }

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::View { path, html } => cmd_view(&path, html, &config),
        Commands::Parts { path, json } => cmd_parts(&path, json, &config),
        Commands::Headers { path, json } => cmd_headers(&path, json),
        Commands::Config { save } => cmd_config(&config, save),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_file = config::log_file_path(config);
    let log_dir = config::cache_dir(config);
    let file_name = log_file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "mailshell.log".into());

    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, file_name);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

fn read_message(path: &Path) -> anyhow::Result<Vec<u8>> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    std::fs::read(path).map_err(|e| mailshell::error::MailError::io(path, e).into())
}

fn load_body(path: &Path, config: &Config) -> anyhow::Result<Body> {
    let raw = read_message(path)?;
    Ok(Body::new(raw, render::renderer_from_config(&config.render)))
}

/// Print the text of a message.
fn cmd_view(path: &Path, html: bool, config: &Config) -> anyhow::Result<()> {
    let body = load_body(path, config)?;
    let text = if html {
        body.text_html()
    } else {
        body.text_plain()
    };
    if body.has_unknown_charset() {
        eprintln!("warning: message uses an unsupported charset, shown undecoded");
    }
    println!("{text}");
    Ok(())
}

/// List the decoded parts of a message.
fn cmd_parts(path: &Path, json: bool, config: &Config) -> anyhow::Result<()> {
    use humansize::{format_size, BINARY};

    let body = load_body(path, config)?;

    if json {
        let items: Vec<serde_json::Value> = body
            .parts()
            .iter()
            .map(|(index, part)| {
                serde_json::json!({
                    "index": index,
                    "mime_type": part.mime_type,
                    "charset": part.charset,
                    "size": part.data.len(),
                    "filename": part.filename,
                    "content_id": part.content_id,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    println!();
    println!(
        "  {:>5}  {:<28} {:<12} {:>10}  {}",
        "INDEX", "TYPE", "CHARSET", "SIZE", "NAME"
    );
    for (index, part) in body.parts() {
        println!(
            "  {:>5}  {:<28} {:<12} {:>10}  {}",
            index,
            part.mime_type,
            part.charset,
            format_size(part.data.len(), BINARY),
            part.filename.as_deref().unwrap_or("")
        );
    }
    println!();
    Ok(())
}

/// Print the decoded header fields of a message.
fn cmd_headers(path: &Path, json: bool) -> anyhow::Result<()> {
    let header = Header::parse(read_message(path)?);

    if json {
        println!("{}", serde_json::to_string_pretty(&header)?);
        return Ok(());
    }

    println!("  {:<12} {}", "From:", header.from);
    if !header.to.is_empty() {
        println!("  {:<12} {}", "To:", header.to.join(", "));
    }
    if !header.cc.is_empty() {
        println!("  {:<12} {}", "Cc:", header.cc.join(", "));
    }
    if let Some(date) = header.date {
        println!("  {:<12} {}", "Date:", date.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!("  {:<12} {}", "Subject:", header.subject);
    if !header.message_id.is_empty() {
        println!("  {:<12} {}", "Message-ID:", header.message_id);
    }
    Ok(())
}

/// Show (and optionally persist) the configuration in effect.
fn cmd_config(config: &Config, save: bool) -> anyhow::Result<()> {
    if save {
        config::save_config(config)?;
    }
    match config::config_file_path() {
        Some(path) => println!("# {}", path.display()),
        None => println!("# no config location available"),
    }
    println!("# log file: {}", config::log_file_path(config).display());
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailshell", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}
