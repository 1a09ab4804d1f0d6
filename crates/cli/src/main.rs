mod commands;
mod load;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Form flow engine toolchain.
#[derive(Parser)]
#[command(name = "formflow", version, about = "Form flow engine toolchain")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Engine settings file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Run in preview mode regardless of the settings file
    #[arg(long, global = true)]
    preview: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a form definition and report problems
    Check {
        /// Path to the form definition (.json, .yaml or .yml)
        definition: PathBuf,
    },

    /// Render one page of a form as a view model
    Render {
        /// Path to the form definition
        definition: PathBuf,
        /// Page path to render, e.g. /full-name
        #[arg(long)]
        path: String,
        /// Saved answer state to render against
        #[arg(long)]
        state: Option<PathBuf>,
        /// Iteration number for a repeated page
        #[arg(long)]
        num: Option<usize>,
    },

    /// Submit answers page by page from the start page to the end of the form
    Walk {
        /// Path to the form definition
        definition: PathBuf,
        /// Answers keyed by page path; an array answers successive iterations
        #[arg(long)]
        answers: PathBuf,
        /// Give up after this many page submissions
        #[arg(long, default_value = "200")]
        max_steps: usize,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let mut options = match load::engine_options(cli.config.as_deref()) {
        Ok(options) => options,
        Err(msg) => {
            report_error(&msg, cli.output, cli.quiet);
            process::exit(1);
        }
    };
    if cli.preview {
        options.preview_mode = true;
    }

    let result = match cli.command {
        Commands::Check { definition } => {
            commands::check::cmd_check(&definition, options, cli.output, cli.quiet)
        }
        Commands::Render {
            definition,
            path,
            state,
            num,
        } => {
            commands::render::cmd_render(
                commands::render::RenderArgs {
                    definition: &definition,
                    path: &path,
                    state: state.as_deref(),
                    num,
                },
                options,
                cli.output,
                cli.quiet,
            )
            .await
        }
        Commands::Walk {
            definition,
            answers,
            max_steps,
        } => {
            commands::walk::cmd_walk(
                &definition,
                &answers,
                max_steps,
                options,
                cli.output,
                cli.quiet,
            )
            .await
        }
    };

    if let Err(msg) = result {
        report_error(&msg, cli.output, cli.quiet);
        process::exit(1);
    }
}

/// Log to stderr, filtered by `FORMFLOW_LOG` (default `warn`).
fn init_tracing() {
    let filter = EnvFilter::try_from_env("FORMFLOW_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Report an error message in the appropriate format.
pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
