use std::path::{Path, PathBuf};

use ocio_toolkit::catalog::ColorspaceCatalog;
use ocio_toolkit::report::ReportedResult;
use ocio_toolkit::session::ToolSession;
use ocio_toolkit::settings::{SettingsOverlay, ToolkitSettings};
use ocio_toolkit::tooling::{BakeParams, LutFormat, OverwriteDecision, ToolKind, ToolRequest};
use serde_json::json;
use tracing::level_filters::LevelFilter;
use tracing::warn;
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> CliResult<()> {
    init_tracing();

    let cli_args = std::env::args().skip(1).collect::<Vec<_>>();
    let (global, rest) = parse_global_cli_args(cli_args.as_slice())?;
    let Some((command, command_args)) = rest.split_first() else {
        print_usage();
        return Ok(());
    };

    let ok = match command.as_str() {
        "colorspaces" => run_colorspaces_cli(&global, command_args)?,
        "validate" => run_validate_cli(&global, command_args).await?,
        "bake" => run_bake_cli(&global, command_args).await?,
        "formats" => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "ok": true,
                    "formats": LutFormat::ALL
                }))?
            );
            true
        }
        "-h" | "--help" | "help" => {
            print_usage();
            true
        }
        unknown => {
            return Err(std::io::Error::other(format!(
                "Unknown command: {unknown}\n\nUse --help for usage."
            ))
            .into());
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct GlobalCliArgs {
    settings_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ColorspacesCliArgs {
    config: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ValidateCliArgs {
    config: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct BakeCliArgs {
    config: Option<String>,
    input_space: Option<String>,
    output_space: Option<String>,
    format: Option<String>,
    shaper_size: Option<String>,
    output: Option<String>,
    overwrite: bool,
    timeout_secs: Option<u64>,
}

fn parse_global_cli_args(args: &[String]) -> CliResult<(GlobalCliArgs, Vec<String>)> {
    let mut global = GlobalCliArgs::default();
    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--settings" => {
                let Some(value) = args.get(i + 1) else {
                    return Err(std::io::Error::other("Missing value for --settings").into());
                };
                global.settings_path = Some(PathBuf::from(value));
                i += 2;
            }
            _ => break,
        }
    }
    Ok((global, args[i..].to_vec()))
}

fn parse_colorspaces_cli_args(args: &[String]) -> CliResult<ColorspacesCliArgs> {
    let mut parsed = ColorspacesCliArgs::default();
    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> CliResult<String> {
            let Some(value) = args.get(idx + 1) else {
                return Err(std::io::Error::other(format!("Missing value for {flag}")).into());
            };
            Ok(value.clone())
        };

        match flag {
            "--config" => {
                parsed.config = Some(needs_value(i)?);
                i += 2;
            }
            unknown => return Err(unknown_argument(unknown)),
        }
    }
    Ok(parsed)
}

fn parse_validate_cli_args(args: &[String]) -> CliResult<ValidateCliArgs> {
    let mut parsed = ValidateCliArgs::default();
    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> CliResult<String> {
            let Some(value) = args.get(idx + 1) else {
                return Err(std::io::Error::other(format!("Missing value for {flag}")).into());
            };
            Ok(value.clone())
        };

        match flag {
            "--config" => {
                parsed.config = Some(needs_value(i)?);
                i += 2;
            }
            "--timeout" => {
                parsed.timeout_secs = Some(parse_timeout_secs(needs_value(i)?.as_str())?);
                i += 2;
            }
            unknown => return Err(unknown_argument(unknown)),
        }
    }
    Ok(parsed)
}

fn parse_bake_cli_args(args: &[String]) -> CliResult<BakeCliArgs> {
    let mut parsed = BakeCliArgs::default();
    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> CliResult<String> {
            let Some(value) = args.get(idx + 1) else {
                return Err(std::io::Error::other(format!("Missing value for {flag}")).into());
            };
            Ok(value.clone())
        };

        match flag {
            "--config" => {
                parsed.config = Some(needs_value(i)?);
                i += 2;
            }
            "--inputspace" => {
                parsed.input_space = Some(needs_value(i)?);
                i += 2;
            }
            "--outputspace" => {
                parsed.output_space = Some(needs_value(i)?);
                i += 2;
            }
            "--format" => {
                parsed.format = Some(needs_value(i)?);
                i += 2;
            }
            "--shapersize" => {
                parsed.shaper_size = Some(needs_value(i)?);
                i += 2;
            }
            "--output" => {
                parsed.output = Some(needs_value(i)?);
                i += 2;
            }
            "--overwrite" => {
                parsed.overwrite = true;
                i += 1;
            }
            "--timeout" => {
                parsed.timeout_secs = Some(parse_timeout_secs(needs_value(i)?.as_str())?);
                i += 2;
            }
            unknown => return Err(unknown_argument(unknown)),
        }
    }
    Ok(parsed)
}

fn parse_timeout_secs(raw: &str) -> CliResult<u64> {
    raw.trim().parse::<u64>().map_err(|_| {
        std::io::Error::other(format!("--timeout expects whole seconds, got '{raw}'")).into()
    })
}

fn unknown_argument(unknown: &str) -> Box<dyn std::error::Error> {
    std::io::Error::other(format!(
        "Unknown argument: {unknown}\n\nUse --help for usage."
    ))
    .into()
}

fn wants_help(args: &[String]) -> bool {
    args.iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"))
}

fn load_settings(global: &GlobalCliArgs, timeout_secs: Option<u64>) -> CliResult<ToolkitSettings> {
    let base_dir = std::env::current_dir()?;
    let settings_path = global
        .settings_path
        .clone()
        .or_else(|| std::env::var_os("OCIO_TOOLKIT_SETTINGS").map(PathBuf::from));
    let cli = SettingsOverlay {
        timeout_secs,
        ..SettingsOverlay::default()
    };
    Ok(ToolkitSettings::load(
        base_dir.as_path(),
        settings_path.as_deref(),
        &cli,
    )?)
}

fn resolve_config_arg(explicit: Option<String>, settings: &ToolkitSettings) -> String {
    explicit
        .filter(|v| !v.trim().is_empty())
        .or_else(|| {
            settings
                .default_config
                .as_deref()
                .map(|p| p.display().to_string())
        })
        .unwrap_or_default()
}

fn run_colorspaces_cli(global: &GlobalCliArgs, args: &[String]) -> CliResult<bool> {
    if wants_help(args) {
        print_colorspaces_usage();
        return Ok(true);
    }
    let parsed = parse_colorspaces_cli_args(args)?;
    let settings = load_settings(global, None)?;
    let config = resolve_config_arg(parsed.config, &settings);
    if config.is_empty() {
        return Err(std::io::Error::other(
            "Missing config: pass --config or set OCIO / OCIO_CONFIG_PATH",
        )
        .into());
    }

    let catalog = ColorspaceCatalog::load(Path::new(config.as_str()))?;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "ok": true,
            "config": catalog.source_path().display().to_string(),
            "colorspaces": catalog.names(),
        }))?
    );
    Ok(true)
}

async fn run_validate_cli(global: &GlobalCliArgs, args: &[String]) -> CliResult<bool> {
    if wants_help(args) {
        print_validate_usage();
        return Ok(true);
    }
    let parsed = parse_validate_cli_args(args)?;
    let settings = load_settings(global, parsed.timeout_secs)?;
    let session = ToolSession::from_settings(&settings);
    let request = ToolRequest::validate(resolve_config_arg(parsed.config, &settings))
        .with_timeout(settings.timeout);

    let result = session.run(&request).await?;
    print_result(ToolKind::Validate, &result)?;
    Ok(result.is_success())
}

async fn run_bake_cli(global: &GlobalCliArgs, args: &[String]) -> CliResult<bool> {
    if wants_help(args) {
        print_bake_usage();
        return Ok(true);
    }
    let parsed = parse_bake_cli_args(args)?;
    let settings = load_settings(global, parsed.timeout_secs)?;
    let session = ToolSession::from_settings(&settings);
    let config = resolve_config_arg(parsed.config, &settings);

    if !config.is_empty() {
        if let Err(error) = session.load_catalog(Path::new(config.as_str())) {
            warn!(config = config.as_str(), error = %error, "colorspace catalog unavailable; names will not be checked");
        }
    }

    let overwrite = if parsed.overwrite {
        OverwriteDecision::Confirmed
    } else {
        OverwriteDecision::Undecided
    };
    let request = ToolRequest::bake(BakeParams {
        config,
        input_space: parsed.input_space.unwrap_or_default(),
        output_space: parsed.output_space.unwrap_or_default(),
        format: parsed.format.unwrap_or_default(),
        shaper_size: parsed.shaper_size,
        output: parsed.output.unwrap_or_default(),
    })
    .with_timeout(settings.timeout)
    .with_overwrite(overwrite);

    let result = session.run(&request).await?;
    print_result(ToolKind::Bake, &result)?;
    Ok(result.is_success())
}

fn print_result(tool: ToolKind, result: &ReportedResult) -> CliResult<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "ok": result.is_success(),
            "tool": tool,
            "classification": result.classification,
            "exit_status": result.exit_status,
            "display_text": result.display_text,
            "audit_line": result.audit_line,
        }))?
    );
    Ok(())
}

fn print_usage() {
    eprintln!(concat!(
        "Usage:\n",
        "  ocio-toolkit [--settings PATH] <command> [flags]\n\n",
        "Commands:\n",
        "  colorspaces   list colorspaces declared by a config\n",
        "  validate      run ociocheck against a config\n",
        "  bake          run ociobakelut to produce a LUT\n",
        "  formats       list supported LUT formats\n\n",
        "Settings default to ./ocio_toolkit.toml (or OCIO_TOOLKIT_SETTINGS) when present.\n"
    ));
}

fn print_colorspaces_usage() {
    eprintln!(concat!(
        "Usage:\n",
        "  ocio-toolkit colorspaces [--config PATH]\n\n",
        "Defaults:\n",
        "  --config defaults to $OCIO, then $OCIO_CONFIG_PATH, then settings default_config\n"
    ));
}

fn print_validate_usage() {
    eprintln!(concat!(
        "Usage:\n",
        "  ocio-toolkit validate [--config PATH] [--timeout SECS]\n"
    ));
}

fn print_bake_usage() {
    eprintln!(
        concat!(
            "Usage:\n",
            "  ocio-toolkit bake [--config PATH] --inputspace NAME --outputspace NAME ",
            "--format FORMAT --output PATH [--shapersize N] [--overwrite] [--timeout SECS]\n\n",
            "Formats: flame, 3dl, cube, spi1d, csp, houdini\n",
            "Relative --output paths resolve under $LUT_LOCATION when set.\n",
            "Existing outputs are only replaced with --overwrite.\n"
        )
    );
}
