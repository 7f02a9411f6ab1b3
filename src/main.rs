mod archive_id;
mod cli;
mod error;
mod http;
mod installer;
mod listing;
mod logging;
mod metadata;
mod module_map;
mod patcher;
mod resolver;
mod settings;
mod updates;
mod version;

use std::{process::ExitCode, str::FromStr, sync::Arc};

use camino::Utf8PathBuf;
use clap::Parser;
use cli::{Cli, Command};
use tracing::error;
use url::Url;

use crate::{
    archive_id::Host,
    error::AqtError,
    http::HttpClient,
    logging::Verbosity,
    resolver::ResolveRequest,
    version::Version,
};

fn main() -> ExitCode {
    color_eyre::install().ok();
    install_panic_hook();

    let cli = Cli::parse();
    let verbosity = if cli.quiet {
        Verbosity::Quiet
    } else if cli.verbose {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    };
    logging::init(verbosity);

    let settings = match settings::Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(err) => {
            error!(%err, "failed to load settings");
            return ExitCode::from(1);
        }
    };
    settings::init(settings);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            error!(%err, "failed to start async runtime");
            return ExitCode::from(254);
        }
    };

    match runtime.block_on(run(cli.command.canonicalize())) {
        Ok(()) => ExitCode::from(0),
        Err(err) => {
            error!("{err}");
            if let Some(suggestion) = err.suggestion() {
                eprintln!("suggestion: {suggestion}");
            }
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

/// Chains onto `color_eyre`'s panic hook so an unhandled panic still prints
/// its report, then exits `254` instead of the default `101` — matching the
/// "unhandled exception" exit code documented for this CLI.
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_hook(info);
        eprintln!("This is a bug in aqtr. Please file a report with the command you ran.");
        std::process::exit(254);
    }));
}

fn parse_host(s: &str) -> Result<Host, AqtError> {
    match s {
        "windows" => Ok(Host::Windows),
        "mac" => Ok(Host::Mac),
        "linux" => Ok(Host::Linux),
        other => Err(AqtError::CliInput(format!("unknown host '{other}'"))),
    }
}

async fn run(command: Command) -> Result<(), AqtError> {
    let settings = settings::get();

    let client = Arc::new(
        HttpClient::new(
            settings.connection_timeout(),
            settings.response_timeout(),
            settings.max_retries_on_connection,
            settings.max_retries_for_hash,
            settings.trusted_mirrors.clone(),
            settings.blacklist.clone(),
        )
        .map_err(|err| AqtError::CliInput(format!("failed to build http client: {err}")))?,
    );

    match command {
        Command::InstallQt(args) => install_qt(&client, settings, args).await,
        Command::InstallTool(args) => install_tool(&client, settings, args).await,
        Command::InstallSrc(args) => install_sde(&client, settings, resolver::SrcDocFlavor::Src, args).await,
        Command::InstallExample(args) => install_sde(&client, settings, resolver::SrcDocFlavor::Examples, args).await,
        Command::InstallDoc(args) => install_sde(&client, settings, resolver::SrcDocFlavor::Doc, args).await,
        Command::ListQt(args) => list_qt(&client, settings, args).await,
        Command::ListTool(args) => list_tool(&client, settings, args).await,
        Command::ListSrc(args) => list_sde(&client, settings, resolver::SrcDocFlavor::Src, args).await,
        Command::ListExample(args) => list_sde(&client, settings, resolver::SrcDocFlavor::Examples, args).await,
        Command::ListDoc(args) => list_sde(&client, settings, resolver::SrcDocFlavor::Doc, args).await,
        // `canonicalize` rewrites every legacy alias into one of the variants above.
        other => unreachable!("legacy alias not canonicalized: {other:?}"),
    }
}

async fn install_qt(
    client: &HttpClient,
    settings: &settings::Settings,
    args: cli::InstallQtArgs,
) -> Result<(), AqtError> {
    let host = parse_host(&args.host)?;
    let version = Version::parse(&args.qt_version)
        .map_err(|err| AqtError::CliInput(err.to_string()))?;

    let arch = args
        .arch
        .or_else(|| default_arch(host, &args.target))
        .ok_or_else(|| AqtError::CliInput("a target architecture is required".to_owned()))?;

    if !settings.is_known_qt_combination(&args.host, &args.target, &arch) {
        tracing::warn!(
            "specified target combination is not in the known-good list: {} {} {}",
            args.host, args.target, arch
        );
    }

    let modules = args.modules.clone().unwrap_or_default();
    let all_extra = modules.iter().any(|m| m == "all");

    let base_url = match &args.base {
        Some(base) => Url::from_str(base).map_err(|_| AqtError::CliInput(format!("invalid mirror url '{base}'")))?,
        None => settings.base_url.clone(),
    };

    let packages = resolver::resolve_qt(
        client,
        ResolveRequest {
            host,
            target: &args.target,
            version: &version,
            arch: &arch,
            modules: &modules,
            subarchives: args.archives.as_deref(),
            all_extra,
            include_base: !args.noarchives,
            base_url: &base_url,
        },
    )
    .await?;

    let output_dir = args.outputdir.unwrap_or_else(|| Utf8PathBuf::from("."));

    let options = Arc::new(installer::InstallOptions {
        concurrency: settings.concurrency,
        max_retries_on_connection: settings.max_retries_on_connection,
        max_retries_on_checksum_error: settings.max_retries_on_checksum_error,
        keep_archives: args.keep || settings.always_keep_archives,
        archive_download_location: settings.archive_download_location.clone().map(Into::into),
        external_7z: args.external,
    });

    installer::install(Arc::new(client.clone()), packages, output_dir.clone(), options)
        .await
        .map_err(|err| AqtError::CliInput(err.to_string()))?;

    let desktop_arch_dir = if patcher::is_mobile_or_wasm_arch(&arch) {
        Some(lookup_desktop_arch_dir(client, &base_url, host, &version).await?)
    } else {
        None
    };

    let target_config = patcher::TargetConfig {
        version,
        target: args.target,
        arch,
        os_name: host,
    };
    patcher::patch(&output_dir, &target_config, desktop_arch_dir.as_deref())
        .map_err(|err| AqtError::Updater {
            path: output_dir.clone().into_std_path_buf(),
            source: std::io::Error::other(err.to_string()),
        })?;

    Ok(())
}

/// Locates the desktop Qt of the same `version` so a mobile/wasm install's
/// `qmake` wrapper and `target_qt.conf` can point at the host toolchain.
async fn lookup_desktop_arch_dir(
    client: &HttpClient,
    base_url: &Url,
    host: Host,
    version: &Version,
) -> Result<String, AqtError> {
    let factory = metadata::MetadataFactory::new(client, base_url);
    let archs = factory
        .fetch_architectures(host, "desktop", version)
        .await
        .map_err(|err| AqtError::CliInput(err.to_string()))?;

    let chosen = match default_arch(host, "desktop") {
        Some(preferred) if archs.contains(&preferred) => preferred,
        _ => archs.into_iter().next().ok_or_else(|| {
            AqtError::CliInput(format!(
                "no desktop Qt {version} installation found to host this mobile/wasm build's qmake"
            ))
        })?,
    };

    Ok(crate::archive_id::QtRepoProperty::get_arch_dir(host, &chosen, version))
}

async fn install_tool(
    client: &HttpClient,
    settings: &settings::Settings,
    args: cli::InstallToolArgs,
) -> Result<(), AqtError> {
    let host = parse_host(&args.host)?;

    let base_url = match &args.base {
        Some(base) => Url::from_str(base).map_err(|_| AqtError::CliInput(format!("invalid mirror url '{base}'")))?,
        None if args.internal => settings
            .fallbacks
            .first()
            .cloned()
            .unwrap_or_else(|| settings.base_url.clone()),
        None => settings.base_url.clone(),
    };

    let packages = resolver::resolve_tool(
        client,
        host,
        &args.tool_name,
        &args.variant,
        args.version.as_deref(),
        &base_url,
    )
    .await?;

    let output_dir = args.outputdir.unwrap_or_else(|| Utf8PathBuf::from("."));

    let options = Arc::new(installer::InstallOptions {
        concurrency: settings.concurrency,
        max_retries_on_connection: settings.max_retries_on_connection,
        max_retries_on_checksum_error: settings.max_retries_on_checksum_error,
        keep_archives: settings.always_keep_archives,
        archive_download_location: settings.archive_download_location.clone().map(Into::into),
        external_7z: args.external,
    });

    installer::install(Arc::new(client.clone()), packages, output_dir, options)
        .await
        .map_err(|err| AqtError::CliInput(err.to_string()))?;

    // Tool installs carry no qmake of their own; nothing to patch.
    Ok(())
}

async fn install_sde(
    client: &HttpClient,
    settings: &settings::Settings,
    flavor: resolver::SrcDocFlavor,
    args: cli::InstallSdeArgs,
) -> Result<(), AqtError> {
    let host = parse_host(&args.host)?;
    let version =
        Version::parse(&args.qt_version).map_err(|err| AqtError::CliInput(err.to_string()))?;

    let modules = args.modules.clone().unwrap_or_default();
    let all_extra = modules.iter().any(|m| m == "all");

    let base_url = match &args.base {
        Some(base) => Url::from_str(base).map_err(|_| AqtError::CliInput(format!("invalid mirror url '{base}'")))?,
        None => settings.base_url.clone(),
    };

    let packages = resolver::resolve_src_doc_examples(
        client,
        host,
        &args.target,
        &version,
        flavor,
        &modules,
        all_extra,
        &base_url,
    )
    .await?;

    let output_dir = args.outputdir.unwrap_or_else(|| Utf8PathBuf::from("."));

    let options = Arc::new(installer::InstallOptions {
        concurrency: settings.concurrency,
        max_retries_on_connection: settings.max_retries_on_connection,
        max_retries_on_checksum_error: settings.max_retries_on_checksum_error,
        keep_archives: settings.always_keep_archives,
        archive_download_location: settings.archive_download_location.clone().map(Into::into),
        external_7z: None,
    });

    installer::install(Arc::new(client.clone()), packages, output_dir, options)
        .await
        .map_err(|err| AqtError::CliInput(err.to_string()))?;

    // Sources/docs/examples carry no qmake either; nothing to patch.
    Ok(())
}

async fn list_qt(
    client: &HttpClient,
    settings: &settings::Settings,
    args: cli::ListQtArgs,
) -> Result<(), AqtError> {
    let host = parse_host(&args.host)?;
    let target = args.target.as_deref().unwrap_or("desktop");
    let factory = metadata::MetadataFactory::new(client, &settings.base_url);
    let versions = factory
        .fetch_versions(host, target, "")
        .await
        .map_err(|err| AqtError::CliInput(err.to_string()))?;

    let versions = match &args.filter {
        Some(spec) => {
            let spec = version::Spec::from_str(spec).map_err(|err| AqtError::CliInput(err.to_string()))?;
            versions.filter(&spec)
        }
        None => versions,
    };

    listing::print_versions(&versions);
    Ok(())
}

async fn list_tool(
    client: &HttpClient,
    settings: &settings::Settings,
    args: cli::ListToolArgs,
) -> Result<(), AqtError> {
    let host = parse_host(&args.host)?;
    let factory = metadata::MetadataFactory::new(client, &settings.base_url);

    match &args.tool_name {
        None => {
            let tools = factory
                .fetch_tools(host)
                .await
                .map_err(|err| AqtError::CliInput(err.to_string()))?;
            listing::print_tool_folder_names(&tools);
        }
        Some(tool_name) => {
            let updates = factory
                .fetch_tool_variants(host, tool_name)
                .await
                .map_err(|err| AqtError::CliInput(err.to_string()))?;
            if args.long {
                let width = terminal_width();
                listing::print_tool_long_listing(&updates, width);
            } else {
                let names: Vec<String> = updates.iter().map(|pkg| pkg.name.clone()).collect();
                listing::print_plain_list(&names);
            }
        }
    }
    Ok(())
}

async fn list_sde(
    client: &HttpClient,
    settings: &settings::Settings,
    flavor: resolver::SrcDocFlavor,
    args: cli::ListSdeArgs,
) -> Result<(), AqtError> {
    let host = parse_host(&args.host)?;
    let version =
        Version::parse(&args.qt_version).map_err(|err| AqtError::CliInput(err.to_string()))?;
    let factory = metadata::MetadataFactory::new(client, &settings.base_url);

    // Upstream only breaks `doc`/`examples` down into modules; `src` has no
    // module breakdown, only a flat archive listing.
    if matches!(flavor, resolver::SrcDocFlavor::Src) {
        let archives = factory
            .fetch_sde_archives(host, &args.target, &version, flavor, None)
            .await
            .map_err(|err| AqtError::CliInput(err.to_string()))?;
        listing::print_plain_list(&archives);
    } else {
        let modules = factory
            .fetch_sde_modules(host, &args.target, &version, flavor)
            .await
            .map_err(|err| AqtError::CliInput(err.to_string()))?;
        listing::print_plain_list(&modules);
    }
    Ok(())
}

/// Best-effort terminal column width, used to pick the long/narrow tool
/// listing layout. `None` when stdout isn't a tty (e.g. piped output).
fn terminal_width() -> Option<usize> {
    std::env::var("COLUMNS").ok().and_then(|s| s.parse().ok())
}

fn default_arch(host: Host, target: &str) -> Option<String> {
    match (host, target) {
        (Host::Linux, "desktop") => Some("gcc_64".to_owned()),
        (Host::Mac, "desktop") => Some("clang_64".to_owned()),
        (Host::Mac, "ios") => Some("ios".to_owned()),
        _ => None,
    }
}
