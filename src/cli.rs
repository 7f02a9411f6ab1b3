//! Argument parsing and dispatch. The legacy subcommand aliases
//! (`install`/`tool`/`src`/`examples`/`doc`/`list`) forward to their
//! current-name equivalents after printing a one-line deprecation warning,
//! matching upstream's own name migration from `aqt install` to
//! `aqt install-qt`.

use std::path::PathBuf;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "aqtr", version, about = "An unofficial command-line installer for the Qt SDK")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to a YAML settings file overriding the compiled-in defaults.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install a Qt SDK.
    InstallQt(InstallQtArgs),
    /// Install a standalone tool (e.g. tools_ifw).
    InstallTool(InstallToolArgs),
    /// Install Qt sources.
    InstallSrc(InstallSdeArgs),
    /// Install Qt examples.
    InstallExample(InstallSdeArgs),
    /// Install Qt documentation.
    InstallDoc(InstallSdeArgs),
    /// List available Qt versions.
    ListQt(ListQtArgs),
    /// List available tool folders or variants.
    ListTool(ListToolArgs),
    /// List available source packages.
    ListSrc(ListSdeArgs),
    /// List available example packages.
    ListExample(ListSdeArgs),
    /// List available documentation packages.
    ListDoc(ListSdeArgs),

    #[command(hide = true)]
    Install(InstallQtArgs),
    #[command(hide = true)]
    Tool(InstallToolArgs),
    #[command(hide = true)]
    Src(InstallSdeArgs),
    #[command(hide = true)]
    Examples(InstallSdeArgs),
    #[command(hide = true)]
    Doc(InstallSdeArgs),
    #[command(hide = true)]
    List(ListQtArgs),
}

impl Command {
    /// Collapses legacy aliases into their current-name equivalent,
    /// warning once. Returns the canonical command to dispatch on.
    pub fn canonicalize(self) -> Command {
        match self {
            Command::Install(args) => {
                warn!("'install' is deprecated, use 'install-qt' instead");
                Command::InstallQt(args)
            }
            Command::Tool(args) => {
                warn!("'tool' is deprecated, use 'install-tool' instead");
                Command::InstallTool(args)
            }
            Command::Src(args) => {
                warn!("'src' is deprecated, use 'install-src' instead");
                Command::InstallSrc(args)
            }
            Command::Examples(args) => {
                warn!("'examples' is deprecated, use 'install-example' instead");
                Command::InstallExample(args)
            }
            Command::Doc(args) => {
                warn!("'doc' is deprecated, use 'install-doc' instead");
                Command::InstallDoc(args)
            }
            Command::List(args) => {
                warn!("'list' is deprecated, use 'list-qt' instead");
                Command::ListQt(args)
            }
            other => other,
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct InstallQtArgs {
    pub host: String,
    pub target: String,
    pub qt_version: String,
    pub arch: Option<String>,

    #[arg(short = 'm', long, num_args = 0..)]
    pub modules: Option<Vec<String>>,

    #[arg(short = 'O', long)]
    pub outputdir: Option<Utf8PathBuf>,

    #[arg(short = 'b', long)]
    pub base: Option<String>,

    #[arg(short = 'E', long)]
    pub external: Option<PathBuf>,

    #[arg(long)]
    pub archives: Option<Vec<String>>,

    #[arg(long)]
    pub noarchives: bool,

    #[arg(long)]
    pub keep: bool,

    #[arg(long)]
    pub timeout: Option<u64>,

    #[arg(long)]
    pub autodesktop: bool,
}

#[derive(clap::Args, Debug)]
pub struct InstallToolArgs {
    pub host: String,
    pub tool_name: String,
    /// The exact tool variant to install, e.g. `qt.tools.ifw.41`.
    pub variant: String,
    /// When given, must match the catalog's `fullVersion` for `variant` exactly.
    pub version: Option<String>,

    #[arg(short = 'O', long)]
    pub outputdir: Option<Utf8PathBuf>,

    #[arg(short = 'b', long)]
    pub base: Option<String>,

    #[arg(short = 'E', long)]
    pub external: Option<PathBuf>,

    /// Routes through the non-redistributable CI mirror used by the
    /// commercial online-installer flow. Credential pass-through only; the
    /// commercial driver itself is out of scope for this build.
    #[arg(long)]
    pub internal: bool,
}

#[derive(clap::Args, Debug)]
pub struct InstallSdeArgs {
    pub host: String,
    pub target: String,
    pub qt_version: String,

    #[arg(short = 'm', long, num_args = 0..)]
    pub modules: Option<Vec<String>>,

    #[arg(short = 'O', long)]
    pub outputdir: Option<Utf8PathBuf>,

    #[arg(short = 'b', long)]
    pub base: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ListQtArgs {
    pub host: String,
    pub target: Option<String>,
    pub filter: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ListToolArgs {
    pub host: String,
    pub tool_name: Option<String>,
    #[arg(long)]
    pub long: bool,
}

#[derive(clap::Args, Debug)]
pub struct ListSdeArgs {
    pub host: String,
    pub target: String,
    pub qt_version: String,
}
