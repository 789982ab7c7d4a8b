//! Command-line interface for endpoint-extractor.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use crate::config::{self, loader::YAML_CONFIG_FILE, ExtractorConfig, OutputFormat};
use crate::extract::{self, detect_framework, ExtractOptions};
use crate::model::Framework;
use crate::report;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Static HTTP endpoint and authentication inventory for TypeScript services.
///
/// Reads a Fastify or NestJS project without running it and reports every
/// endpoint with its parameters and whether it requires authentication.
#[derive(Parser)]
#[command(name = "endpoint-extractor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract endpoints from a project
    Extract(ExtractArgs),
    /// Print the framework a project uses
    Detect(DetectArgs),
    /// Write a default extractor.config.yaml
    Init(InitArgs),
}

/// Arguments for the extract command.
#[derive(Parser)]
pub struct ExtractArgs {
    /// Project root (directory containing package.json)
    #[arg(default_value = ".")]
    pub root: PathBuf,

    /// Framework to extract for (default: detect from package.json)
    #[arg(long)]
    pub framework: Option<Framework>,

    /// Entry file, relative to the project root
    #[arg(long)]
    pub entry: Option<PathBuf>,

    /// Config file layered over the project's own configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format: yaml or json
    #[arg(short, long)]
    pub format: Option<OutputFormat>,

    /// Infer response shapes from handlers
    #[arg(long)]
    pub extract_responses: bool,

    /// Nesting depth for rendered response types
    #[arg(long)]
    pub response_depth: Option<usize>,

    /// Auth middleware names, replacing the configured list
    #[arg(long, value_delimiter = ',')]
    pub auth_middlewares: Option<Vec<String>>,

    /// Exit non-zero when any endpoint is public or unclassified
    #[arg(long)]
    pub fail_on_public: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Arguments for the detect command.
#[derive(Parser)]
pub struct DetectArgs {
    /// Project root
    #[arg(default_value = ".")]
    pub root: PathBuf,
}

/// Arguments for the init command.
#[derive(Parser)]
pub struct InitArgs {
    /// Directory to write the config file into
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `--verbose`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .try_init();
}

/// Apply command-line overrides on top of the loaded configuration.
fn apply_overrides(mut config: ExtractorConfig, args: &ExtractArgs) -> ExtractorConfig {
    if let Some(format) = args.format {
        config.common.output_format = format;
    }
    if args.extract_responses {
        config.common.extract_responses = true;
    }
    if let Some(depth) = args.response_depth {
        config.common.response_depth = depth.max(1);
    }
    if let Some(names) = &args.auth_middlewares {
        config.fastify.auth.middleware_names = names
            .iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
    }
    config
}

/// Run the extract command.
pub fn run_extract(args: &ExtractArgs) -> anyhow::Result<i32> {
    let root = match args.root.canonicalize() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: cannot access path {:?}: {}", args.root, e);
            return Ok(EXIT_ERROR);
        }
    };

    let config = match config::load(&root, args.config.as_deref()) {
        Ok(c) => apply_overrides(c, args),
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };
    if let Err(e) = config::validate(&config) {
        eprintln!("Error: {}", e);
        return Ok(EXIT_ERROR);
    }

    let format = config.common.output_format;
    let options = ExtractOptions::new(root, config).with_entry(args.entry.clone());
    let result = match extract::run(&options, args.framework) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    match &args.output {
        Some(path) => {
            report::write_report(&result, format, path)?;
            eprintln!("Wrote {}", path.display());
        }
        None => print!("{}", report::render(&result, format)?),
    }
    eprint!("{}", report::summary(&result));

    let unauthenticated = result.total_endpoints() - result.auth_required_count();
    if args.fail_on_public && unauthenticated > 0 {
        Ok(EXIT_FAILED)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

/// Run the detect command.
pub fn run_detect(args: &DetectArgs) -> anyhow::Result<i32> {
    let detection = match detect_framework(&args.root) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    match detection.framework {
        Some(framework) => {
            println!(
                "{} (confidence {:.2}, matched: {})",
                framework,
                detection.confidence,
                detection.matched.join(", ")
            );
            Ok(EXIT_SUCCESS)
        }
        None => {
            println!("none");
            Ok(EXIT_FAILED)
        }
    }
}

/// Run the init command.
pub fn run_init(args: &InitArgs) -> anyhow::Result<i32> {
    let output = args.dir.join(YAML_CONFIG_FILE);
    if output.exists() && !args.force {
        eprintln!("Error: file already exists: {}", output.display());
        eprintln!("Use --force to overwrite it");
        return Ok(EXIT_ERROR);
    }

    if !args.dir.as_os_str().is_empty() && args.dir != Path::new(".") {
        std::fs::create_dir_all(&args.dir)?;
    }
    std::fs::write(&output, default_config_yaml()?)?;

    println!("Created {}", output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit {} to match your project's auth conventions", output.display());
    println!("  2. Run: endpoint-extractor extract {}", args.dir.display());

    Ok(EXIT_SUCCESS)
}

/// The built-in defaults as a YAML document.
pub fn default_config_yaml() -> anyhow::Result<String> {
    Ok(serde_yaml::to_string(&ExtractorConfig::default())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_extract_flags() {
        let cli = parse(&[
            "endpoint-extractor",
            "extract",
            "app",
            "--framework",
            "nestjs",
            "--format",
            "json",
            "--auth-middlewares",
            "checkSession, verifyJWT",
            "--fail-on-public",
        ]);
        let Commands::Extract(args) = cli.command else {
            panic!("expected extract");
        };
        assert_eq!(args.root, PathBuf::from("app"));
        assert_eq!(args.framework, Some(Framework::NestJs));
        assert_eq!(args.format, Some(OutputFormat::Json));
        assert!(args.fail_on_public);

        let config = apply_overrides(ExtractorConfig::default(), &args);
        assert_eq!(
            config.fastify.auth.middleware_names,
            vec!["checkSession".to_string(), "verifyJWT".to_string()]
        );
        assert_eq!(config.common.output_format, OutputFormat::Json);
    }

    #[test]
    fn test_rejects_unknown_framework() {
        assert!(Cli::try_parse_from(["endpoint-extractor", "extract", ".", "--framework", "koa"]).is_err());
    }

    #[test]
    fn test_default_config_round_trips() {
        let yaml = default_config_yaml().unwrap();
        let parsed: ExtractorConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, ExtractorConfig::default());
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let temp = tempfile::TempDir::new().unwrap();
        let args = InitArgs {
            dir: temp.path().to_path_buf(),
            force: false,
        };
        assert_eq!(run_init(&args).unwrap(), EXIT_SUCCESS);
        assert!(temp.path().join(YAML_CONFIG_FILE).exists());
        assert_eq!(run_init(&args).unwrap(), EXIT_ERROR);

        let forced = InitArgs {
            dir: temp.path().to_path_buf(),
            force: true,
        };
        assert_eq!(run_init(&forced).unwrap(), EXIT_SUCCESS);
    }
}
