mod commands;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use commands::{Context, EXIT_FAILURE, EXIT_METADATA_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "mason",
    version,
    about = "Test, build, sign and publish packages described by metadata.json"
)]
struct Cli {
    /// Path to the metadata file.
    #[arg(long, default_value = "metadata.json", global = true)]
    metadata: PathBuf,

    /// Branch to check out after fetching the package.
    #[arg(short, long, default_value = "", global = true)]
    branch: String,

    /// Work in this directory instead of a temporary one (left in place afterwards).
    #[arg(short, long, global = true)]
    workdir: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Args)]
struct PipelineArgs {
    /// Skip running the test suite.
    #[arg(short, long, default_value_t = false)]
    skip_tests: bool,

    /// Comma-separated build targets to leave out (e.g. "darwin/amd64,linux/386").
    #[arg(long, default_value = "")]
    skip_targets: String,

    /// Test timeout, passed through to the test runner.
    #[arg(short, long, default_value = "")]
    timeout: String,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check out the package, run prep commands and tests.
    Test {
        /// Test timeout, passed through to the test runner.
        #[arg(short, long, default_value = "")]
        timeout: String,
    },
    /// Test and build every target, collecting artifacts into the current directory.
    Build {
        #[command(flatten)]
        args: PipelineArgs,
    },
    /// Test, build and sign, collecting artifacts and signatures into the current directory.
    Sign {
        #[command(flatten)]
        args: PipelineArgs,
    },
    /// Test, build, sign and upload artifacts to their publish targets.
    Publish {
        #[command(flatten)]
        args: PipelineArgs,
        /// Skip the build and publish the declared targets from the current directory.
        #[arg(long, default_value_t = false)]
        skip_build: bool,
    },
    /// Verify the detached signature `<file>.asc` of a file.
    Verify {
        file: PathBuf,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

impl PipelineArgs {
    fn into_options(self, cli_branch: &str, workdir: Option<PathBuf>) -> mason_core::RunOptions {
        mason_core::RunOptions {
            branch: cli_branch.to_owned(),
            workdir,
            skip_tests: self.skip_tests,
            skip_targets: self.skip_targets,
            timeout: self.timeout,
        }
    }
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("MASON_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let ctx = Context {
        metadata_path: cli.metadata,
        json: cli.json,
    };
    let branch = cli.branch;
    let workdir = cli.workdir;

    let result = match cli.command {
        Commands::Test { timeout } => commands::test::run(
            &ctx,
            &mason_core::RunOptions {
                branch,
                workdir,
                timeout,
                ..mason_core::RunOptions::default()
            },
        ),
        Commands::Build { args } => {
            commands::build::run(&ctx, &args.into_options(&branch, workdir))
        }
        Commands::Sign { args } => commands::sign::run(&ctx, &args.into_options(&branch, workdir)),
        Commands::Publish { args, skip_build } => {
            commands::publish::run(&ctx, &args.into_options(&branch, workdir), skip_build)
        }
        Commands::Verify { file } => commands::verify::run(&ctx, &file),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("metadata error:")
                || msg.starts_with("user config error:")
                || msg.starts_with("language error:")
            {
                EXIT_METADATA_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
