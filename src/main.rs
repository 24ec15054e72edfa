use clap::{Parser, Subcommand};
use media_sizer::cache::DimensionCache;
use media_sizer::config;
use media_sizer::output;
use media_sizer::pipeline::{self, BuildOptions};
use media_sizer::probe::{FsProbe, MediaProbe, is_image_path};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "media-sizer")]
#[command(about = "Add intrinsic width and height to media in rendered HTML")]
#[command(long_about = "\
Add intrinsic width and height to media in rendered HTML

Runs after a static site generator has written its pages. Every .html file
under the output directory is rewritten in place:

  <p><a href=\"big.png\"><img src=\"small.png\"></a></p>
      → <a href=\"big.png\" class=\"media-container\"><img src=\"small.png\" width=.. height=..></a>

  <p><video src=\"/media/clip.mp4\"></video></p>
      → <video src=\"/media/clip.mp4\" width=\"1920\" height=\"1080\"></video>

Sizes are read from the files themselves and remembered in a store
(.mediasizecache by default) so later builds skip the disk.

Production mode (CI=true by default, or --production) leaves images unsized
for a downstream asset pipeline. Videos are always sized.

Run 'media-sizer gen-config' to generate a documented media-sizer.toml.")]
#[command(version = env!("MEDIA_SIZER_VERSION"))]
struct Cli {
    /// Rendered site directory
    #[arg(long, default_value = "dist", global = true)]
    output: PathBuf,

    /// Config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Show debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Size and restructure media in every page under the output directory
    Build {
        /// Ignore the store: probe everything and do not write it back
        #[arg(long)]
        no_cache: bool,
        /// Force production mode regardless of the environment
        #[arg(long)]
        production: bool,
    },
    /// Print the dimensions of media files
    Probe {
        /// Image or video files
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Inspect or reset the dimension store
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Print a stock media-sizer.toml with all options documented
    GenConfig,
}

#[derive(Subcommand)]
enum CacheAction {
    /// List stored references and their sizes
    List,
    /// Delete the store
    Clear,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Build {
            no_cache,
            production,
        } => {
            let site_config = config::load_config(&cli.config)?;
            init_thread_pool(&site_config.processing);
            let options =
                BuildOptions::from_config(&site_config, &cli.output, !no_cache, production);

            println!("==> Sizing media in {}", cli.output.display());
            if options.transform.production {
                println!("    production mode: images left unsized");
            }
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_build_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let result = pipeline::build(&options, Some(tx));
            printer.join().ok();
            output::print_build_summary(&result?);
        }
        Command::Probe { paths } => {
            let site_config = config::load_config(&cli.config)?;
            let probe = FsProbe::new(site_config.probe.video_timeout());
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()?;
            for path in &paths {
                let result = if is_image_path(path) {
                    probe.probe_image(path)
                } else {
                    runtime.block_on(probe.probe_video(path))
                };
                println!("{}", output::format_probe_line(path, &result));
            }
            runtime.shutdown_timeout(probe.video_timeout());
        }
        Command::Cache { action } => {
            let site_config = config::load_config(&cli.config)?;
            let store = PathBuf::from(&site_config.store);
            match action {
                CacheAction::List => {
                    let cache = DimensionCache::load(&store)?;
                    output::print_cache_list(&cache.entries());
                }
                CacheAction::Clear => {
                    if store.exists() {
                        std::fs::remove_file(&store)?;
                        println!("Removed {}", store.display());
                    } else {
                        println!("No store at {}", store.display());
                    }
                }
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Warnings go to stderr so they never mix with page output.
fn init_logging(verbose: bool) {
    let default = if verbose {
        "media_sizer=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
