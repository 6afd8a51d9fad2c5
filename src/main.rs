use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;
use webp_picture::chain::Chain;
use webp_picture::config::{self, CONFIG_FILE_NAME};
use webp_picture::convert::ConvertEvent;
use webp_picture::imaging::{CapabilityProvider, UnavailableProvider, builtin_provider};
use webp_picture::output;
use webp_picture::plugin::{BundleAsset, ResolvedConfig, WebpPicturePlugin};
use webp_picture::serve::{DevServer, StaticFiles};

/// Shared flag for commands that encode images.
#[derive(clap::Args, Clone)]
struct EncoderArgs {
    /// Run without a WebP encoder; conversion and previews are skipped
    #[arg(long)]
    no_transcode: bool,
}

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "webp-picture")]
#[command(about = "Serve WebP through <picture> for a static site")]
#[command(long_about = "\
Serve WebP through <picture> for a static site

HTML is rewritten so every PNG/JPEG image gains a WebP <source>, and every
PNG/JPEG in the build output gets a .webp twin next to it:

  <img src=\"img/hero.jpg\">
  → <picture><source srcset=\"img/hero.webp\" type=\"image/webp\"/><img src=\"img/hero.jpg\"></picture>

  dist/img/hero.jpg  →  dist/img/hero.webp

Conversion is incremental: a fingerprint store (cache_file) remembers what
was encoded with which options. The dev server transcodes .webp requests on
the fly from the originals under the project root and public/.

Run 'webp-picture gen-config' to generate a documented webp-picture.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Project root
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Build output directory, relative to the root
    #[arg(long, default_value = "dist", global = true)]
    out_dir: PathBuf,

    /// Config file (default: <root>/webp-picture.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug diagnostics to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert images in the output directory to WebP
    Convert(EncoderArgs),
    /// Rewrite HTML files in place (default: every .html in the output directory)
    Rewrite {
        files: Vec<PathBuf>,
    },
    /// Rewrite the output directory's HTML, then convert its images
    Build(EncoderArgs),
    /// Development server with just-in-time WebP previews
    Serve {
        #[arg(long, default_value_t = 5173)]
        port: u16,
        #[command(flatten)]
        encoder: EncoderArgs,
    },
    /// Print a stock webp-picture.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Command::Convert(encoder) => {
            let plugin = make_plugin(&cli, config::Command::Build, encoder)?;
            let (tx, printer) = spawn_printer();
            let report = plugin.convert_output(Some(tx))?;
            printer.join().map_err(|_| "output thread panicked")?;
            println!("Images: {}", report.stats);
        }
        Command::Rewrite { files } => {
            let plugin = make_plugin(
                &cli,
                config::Command::Build,
                &EncoderArgs { no_transcode: true },
            )?;
            let out_dir = plugin.out_dir();
            let targets = if files.is_empty() {
                html_files(&out_dir)
            } else {
                files.clone()
            };
            let mut changed = Vec::new();
            for path in &targets {
                let html = std::fs::read_to_string(path)?;
                let rewritten = plugin.transform_index_html(&html);
                if rewritten.as_ref() != html.as_str() {
                    std::fs::write(path, rewritten.as_bytes())?;
                    changed.push(path.clone());
                }
            }
            output::print_rewrite_output(&changed, targets.len() - changed.len(), &out_dir);
        }
        Command::Build(encoder) => {
            let plugin = make_plugin(&cli, config::Command::Build, encoder)?;
            let out_dir = plugin.out_dir();
            if !out_dir.is_dir() {
                return Err(format!("output directory not found: {}", out_dir.display()).into());
            }

            println!("==> Rewriting HTML in {}", out_dir.display());
            let paths = html_files(&out_dir);
            let mut assets = paths
                .iter()
                .map(|path| {
                    Ok(BundleAsset {
                        file_name: path
                            .strip_prefix(&out_dir)
                            .unwrap_or(path)
                            .to_string_lossy()
                            .into_owned(),
                        source: std::fs::read_to_string(path)?,
                    })
                })
                .collect::<std::io::Result<Vec<_>>>()?;
            let originals: Vec<String> = assets.iter().map(|a| a.source.clone()).collect();
            plugin.generate_bundle(&mut assets);
            let mut changed = Vec::new();
            for ((path, asset), original) in paths.iter().zip(&assets).zip(&originals) {
                if asset.source != *original {
                    std::fs::write(path, &asset.source)?;
                    changed.push(path.clone());
                }
            }
            output::print_rewrite_output(&changed, paths.len() - changed.len(), &out_dir);

            println!("==> Converting images");
            let (tx, printer) = spawn_printer();
            let report = plugin.write_bundle(Some(tx));
            printer.join().map_err(|_| "output thread panicked")?;
            if let Some(report) = report {
                println!("Images: {}", report.stats);
            }
            println!("==> Build complete: {}", out_dir.display());
        }
        Command::Serve { port, encoder } => {
            let plugin = make_plugin(&cli, config::Command::Serve, encoder)?;
            let preview = plugin.middleware();
            let has_preview = preview.is_some() && !encoder.no_transcode;

            let mut chain = Chain::new();
            if let Some(interceptor) = preview {
                chain = chain.with(interceptor);
            }
            chain = chain.with(StaticFiles::new(&cli.root, plugin.rewrite_options()));

            let addr = SocketAddr::from(([127, 0, 0, 1], *port));
            let server = DevServer::bind(addr, chain)?;
            output::print_serve_banner(server.addr(), &cli.root, has_preview);
            server.run()?;
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load `--config`, or `webp-picture.toml` in the root when present.
fn load_plugin_config(cli: &Cli) -> Result<config::PluginConfig, Box<dyn std::error::Error>> {
    match &cli.config {
        Some(path) if !path.exists() => {
            Err(format!("config file not found: {}", path.display()).into())
        }
        Some(path) => Ok(config::load_config(path)?),
        None => Ok(config::load_config(&cli.root.join(CONFIG_FILE_NAME))?),
    }
}

fn make_plugin(
    cli: &Cli,
    command: config::Command,
    encoder: &EncoderArgs,
) -> Result<WebpPicturePlugin, Box<dyn std::error::Error>> {
    let plugin_config = load_plugin_config(cli)?;
    let provider: Arc<dyn CapabilityProvider> = if encoder.no_transcode {
        Arc::new(UnavailableProvider::new("disabled by --no-transcode"))
    } else {
        Arc::new(builtin_provider())
    };
    let mut plugin = WebpPicturePlugin::new(plugin_config, provider);
    plugin.config_resolved(ResolvedConfig {
        command,
        root: cli.root.clone(),
        out_dir: cli.out_dir.clone(),
    });
    Ok(plugin)
}

/// Print conversion events as they arrive, on a separate thread.
fn spawn_printer() -> (
    std::sync::mpsc::Sender<ConvertEvent>,
    std::thread::JoinHandle<()>,
) {
    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_convert_event(&event) {
                println!("{}", line);
            }
        }
    });
    (tx, printer)
}

/// Every `.html` file under `dir`, sorted.
fn html_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("html"))
        })
        .collect();
    files.sort();
    files
}
