use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use perch_browser::{CopyOptions, DEFAULT_BOOKMARK_LIMIT};
use perch_cli::{OutputFormat, Session, commands};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "perch")]
#[command(author, version, long_about = None)]
#[command(
    about = "Find installed browsers and manage their profiles",
    long_about = "Perch discovers Chromium and Firefox browsers on this machine, lists their \
                  profiles, and duplicates, renames, hides or deletes them with undo."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the config file
    #[arg(short, long, global = true, env = "PERCH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "pretty")]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// List the browser rules in force
    Rules,

    /// Try a custom browser rule without saving it
    ValidateRule {
        /// JSON file holding one rule definition
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Detect browsers and profiles and save the result
    Scan,

    /// Print the executable path of a browser
    Locate {
        /// Browser id (chrome, edge, firefox, ...)
        browser: String,

        /// Use this executable if it exists
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// List a browser's profiles
    Profiles {
        /// Browser id
        browser: String,

        /// Include avatar images as data URIs
        #[arg(long)]
        avatar: bool,
    },

    /// Copy a profile under a new name
    Duplicate {
        /// Browser id
        browser: String,

        /// Profile to copy (folder name, or path for Firefox)
        profile: String,

        /// Name for the copy
        name: String,

        /// Copy bookmarks (Chromium)
        #[arg(long)]
        bookmarks: bool,

        /// Copy extensions (Chromium)
        #[arg(long)]
        extensions: bool,

        /// Copy history (Chromium)
        #[arg(long)]
        history: bool,

        /// Copy cookies and site storage (Chromium)
        #[arg(long)]
        site_data: bool,
    },

    /// Change a profile's display name
    Rename {
        /// Browser id
        browser: String,

        /// Profile to rename
        profile: String,

        /// New name
        name: String,
    },

    /// Move profiles to the trash
    Delete {
        /// Browser id
        browser: String,

        /// Profiles to delete
        #[arg(required = true)]
        profiles: Vec<String>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,

        /// Leave trashed data on disk instead of purging it
        #[arg(long)]
        keep_trash: bool,
    },

    /// Hide profiles from listings
    Hide {
        /// Browser id
        browser: String,

        /// Profiles to hide
        #[arg(required = true)]
        profiles: Vec<String>,
    },

    /// Show how much disk space a profile uses
    Size {
        /// Browser id
        browser: String,

        /// Profile to measure
        profile: String,
    },

    /// List a Chromium profile's bookmarks
    Bookmarks {
        /// Browser id
        browser: String,

        /// Profile to read
        profile: String,

        /// Maximum number of bookmarks
        #[arg(long, default_value_t = DEFAULT_BOOKMARK_LIMIT)]
        limit: usize,
    },

    /// Open a URL or file in a browser profile
    Open {
        /// Browser id
        browser: String,

        /// URL or local file
        target: Option<String>,

        /// Profile to open with
        #[arg(short, long)]
        profile: Option<String>,

        /// Print the command line instead of running it
        #[arg(long)]
        dry_run: bool,
    },

    /// Generate shell completion scripts
    #[command(after_help = "SUPPORTED SHELLS:\n  bash, zsh, fish, powershell, elvish\n\n\
                            INSTALLATION:\n  perch completion bash >> ~/.bashrc\n  \
                            perch completion zsh > ~/.zfunc/_perch")]
    Completion {
        /// Shell to generate for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    let format = cli.format;
    if let Commands::Completion { shell } = cli.command {
        return commands::completion::execute(shell, &mut Cli::command());
    }

    let mut session = Session::open(cli.config)?;
    match cli.command {
        Commands::Rules => commands::rules::list(&session, format),
        Commands::ValidateRule { file } => commands::rules::validate(&session, &file, format),
        Commands::Scan => commands::scan::execute(&mut session, format),
        Commands::Locate { browser, path } => {
            commands::locate::execute(&session, &browser, path.as_deref(), format)
        }
        Commands::Profiles { browser, avatar } => {
            commands::profiles::list(&session, &browser, avatar, format)
        }
        Commands::Duplicate {
            browser,
            profile,
            name,
            bookmarks,
            extensions,
            history,
            site_data,
        } => {
            let options = CopyOptions {
                bookmarks,
                extensions,
                history,
                site_data,
            };
            commands::profiles::duplicate(&mut session, &browser, &profile, &name, &options, format)
        }
        Commands::Rename {
            browser,
            profile,
            name,
        } => commands::profiles::rename(&mut session, &browser, &profile, &name),
        Commands::Delete {
            browser,
            profiles,
            yes,
            keep_trash,
        } => commands::delete::execute(&mut session, &browser, &profiles, yes, keep_trash, format),
        Commands::Hide { browser, profiles } => {
            commands::profiles::hide(&mut session, &browser, &profiles)
        }
        Commands::Size { browser, profile } => {
            commands::size::execute(&mut session, &browser, &profile, format)
        }
        Commands::Bookmarks {
            browser,
            profile,
            limit,
        } => commands::bookmarks::execute(&session, &browser, &profile, limit, format),
        Commands::Open {
            browser,
            target,
            profile,
            dry_run,
        } => commands::open::execute(
            &mut session,
            &browser,
            profile.as_deref(),
            target.as_deref().unwrap_or(""),
            dry_run,
        ),
        Commands::Completion { .. } => Ok(()),
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("perch=debug,perch_core=debug,perch_browser=debug")
    } else {
        EnvFilter::new("perch=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}
