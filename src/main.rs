//! nestcap: timed frame capture for Nest and Dropcam cameras.
//!
//! Usage:
//!   nestcap run [OPTIONS]       Run the capture loop
//!   nestcap list-cameras        List cameras visible to the account
//!   nestcap events <CAMERA>     Print recent motion events for a camera

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nestcap::config::{self, Config, FileConfig, Overrides};
use nestcap::nest::{CameraClient, SessionClient};
use nestcap::scheduler::CaptureScheduler;

/// Parse a non-negative integer argument.
fn parse_u64(s: &str) -> Result<u64, String> {
    s.parse::<u64>()
        .map_err(|_| format!("'{}' is not a valid non-negative number", s))
}

/// Parse a UNIX timestamp argument.
fn parse_timestamp(s: &str) -> Result<i64, String> {
    s.parse::<i64>()
        .map_err(|_| format!("'{}' is not a valid UNIX timestamp", s))
}

#[derive(Parser)]
#[command(
    name = "nestcap",
    version,
    about = "Timed frame capture for Nest and Dropcam cameras",
    long_about = "Logs in to the vendor account, then captures a JPEG frame from each \
configured camera on a timer, keeping a bounded number of frames per camera.",
    after_help = "EXAMPLES:\n    \
    nestcap run\n    \
    nestcap run --num-frames 3 --delay 30\n    \
    nestcap run -n porch,garage -o /var/frames\n    \
    nestcap list-cameras\n    \
    nestcap events porch --start 1756100000\n\n\
CONFIG FILE (YAML or JSON, default ./nestcap.conf):\n    \
    user: me@example.com\n    \
    passwd: secret\n    \
    delay: 600\n    \
    maxFrames: 10\n    \
    outPath: /tmp/imgs\n    \
    cameras:\n      \
    porch: <camera uuid>"
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file (default: ./nestcap.conf)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the capture loop
    #[command(after_help = "Captures one frame per camera per round, sleeping \
--delay seconds between rounds. With --num-frames 0 (the default) the loop \
runs until killed. Each camera keeps at most --max-frames frames; the oldest \
is evicted first.")]
    Run {
        /// Account user (NESTCAP_USER also works)
        #[arg(short, long)]
        user: Option<String>,

        /// Account password (NESTCAP_PASSWD also works)
        #[arg(short, long)]
        passwd: Option<String>,

        /// Seconds to sleep between capture rounds
        #[arg(short, long, value_parser = parse_u64)]
        delay: Option<u64>,

        /// Number of rounds to run (0 = run until killed)
        #[arg(short = 'f', long, value_parser = parse_u64)]
        num_frames: Option<u64>,

        /// Frames retained per camera
        #[arg(short, long, value_parser = parse_u64)]
        max_frames: Option<u64>,

        /// Base directory for captured frames
        #[arg(short, long)]
        out_path: Option<PathBuf>,

        /// Capture only these configured cameras (comma separated)
        #[arg(short, long, value_delimiter = ',')]
        names: Option<Vec<String>>,
    },

    /// List cameras visible to the account
    ListCameras {
        /// Account user (NESTCAP_USER also works)
        #[arg(short, long)]
        user: Option<String>,

        /// Account password (NESTCAP_PASSWD also works)
        #[arg(short, long)]
        passwd: Option<String>,
    },

    /// Print recent motion events for one camera as JSON
    Events {
        /// Configured camera name
        camera: String,

        /// Start of the window as a UNIX timestamp (default: one hour ago)
        #[arg(short, long, value_parser = parse_timestamp)]
        start: Option<i64>,

        /// End of the window as a UNIX timestamp (default: now)
        #[arg(short, long, value_parser = parse_timestamp)]
        end: Option<i64>,

        /// Account user (NESTCAP_USER also works)
        #[arg(short, long)]
        user: Option<String>,

        /// Account password (NESTCAP_PASSWD also works)
        #[arg(short, long)]
        passwd: Option<String>,
    },
}

/// Load variables from a `.env` file if one exists.
fn load_env() {
    let _ = dotenv::dotenv();
}

/// Route `log` output to stderr. `--verbose` lowers the filter to debug;
/// `RUST_LOG` overrides both.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// Fill missing credentials from the environment. Sits below the config
/// file, which in turn sits below the CLI flags.
fn apply_env_credentials(file: &mut FileConfig) {
    if file.user.is_none() {
        file.user = std::env::var(config::USER_ENV).ok();
    }
    if file.passwd.is_none() {
        file.passwd = std::env::var(config::PASSWD_ENV).ok();
    }
}

/// Load the config file and merge in environment credentials.
fn load_file_config(path: Option<&Path>) -> Result<FileConfig, String> {
    let mut file = FileConfig::load_or_default(path).map_err(|e| e.to_string())?;
    apply_env_credentials(&mut file);
    Ok(file)
}

/// Pick credentials from CLI flags, then the (env-merged) config file.
fn resolve_credentials(
    file: &FileConfig,
    user: Option<String>,
    passwd: Option<String>,
) -> Result<(String, String), String> {
    let user = user
        .or_else(|| file.user.clone())
        .ok_or_else(|| "missing required option 'user'".to_string())?;
    let passwd = passwd
        .or_else(|| file.passwd.clone())
        .ok_or_else(|| "missing required option 'passwd'".to_string())?;
    Ok((user, passwd))
}

#[allow(clippy::too_many_arguments)]
fn run_capture(
    config_path: Option<PathBuf>,
    user: Option<String>,
    passwd: Option<String>,
    delay: Option<u64>,
    num_frames: Option<u64>,
    max_frames: Option<u64>,
    out_path: Option<PathBuf>,
    names: Option<Vec<String>>,
) -> Result<(), String> {
    let file = load_file_config(config_path.as_deref())?;
    let overrides = Overrides {
        delay,
        num_frames,
        max_frames,
        out_path,
        user,
        passwd,
    };
    let config = Config::resolve(file, overrides).map_err(|e| e.to_string())?;
    let selection = config
        .select_cameras(names.as_deref())
        .map_err(|e| e.to_string())?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to create async runtime: {}", e))?;

    rt.block_on(async {
        let scheduler = CaptureScheduler::initialize(&config, &selection)
            .await
            .map_err(|e| e.to_string())?;
        scheduler.run().await;
        Ok(())
    })
}

fn run_list_cameras(
    config_path: Option<PathBuf>,
    user: Option<String>,
    passwd: Option<String>,
) -> Result<(), String> {
    let file = load_file_config(config_path.as_deref())?;
    let (user, passwd) = resolve_credentials(&file, user, passwd)?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to create async runtime: {}", e))?;

    rt.block_on(async {
        let session = SessionClient::new().map_err(|e| e.to_string())?;
        let creds = session.login(&user, &passwd).await.map_err(|e| e.to_string())?;
        let cameras = session
            .visible_cameras(&creds)
            .await
            .map_err(|e| e.to_string())?;

        if cameras.is_empty() {
            println!("No cameras visible to this account.");
            return Ok(());
        }

        println!("{:<24} {:<40} {:>8} {}", "NAME", "UUID", "ID", "STATUS");
        for camera in &cameras {
            let id = camera.id.map_or_else(|| "-".to_string(), |v| v.to_string());
            let status = match camera.is_online {
                Some(true) => "online",
                Some(false) => "offline",
                None => "unknown",
            };
            println!("{:<24} {:<40} {:>8} {}", camera.name, camera.uuid, id, status);
        }
        Ok(())
    })
}

fn run_events(
    config_path: Option<PathBuf>,
    camera: String,
    start: Option<i64>,
    end: Option<i64>,
    user: Option<String>,
    passwd: Option<String>,
) -> Result<(), String> {
    let file = load_file_config(config_path.as_deref())?;
    let overrides = Overrides {
        user,
        passwd,
        ..Overrides::default()
    };
    let config = Config::resolve(file, overrides).map_err(|e| e.to_string())?;
    let target = config
        .select_cameras(Some(std::slice::from_ref(&camera)))
        .map_err(|e| e.to_string())?
        .into_iter()
        .next()
        .ok_or_else(|| format!("unrecognized camera '{}'", camera))?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to create async runtime: {}", e))?;

    rt.block_on(async {
        let session = SessionClient::new().map_err(|e| e.to_string())?;
        let creds = session
            .login(&config.user, &config.passwd)
            .await
            .map_err(|e| e.to_string())?;
        let visible = session
            .visible_cameras(&creds)
            .await
            .map_err(|e| e.to_string())?;
        let info = visible
            .into_iter()
            .find(|c| c.uuid == target.uuid)
            .ok_or_else(|| format!("camera '{}' is not visible to this account", target.name))?;

        let client = CameraClient::new(info, Arc::new(creds)).map_err(|e| e.to_string())?;
        let start = start.unwrap_or_else(|| chrono::Utc::now().timestamp() - 3600);
        let events = client.events(start, end).await.map_err(|e| e.to_string())?;

        println!(
            "{}",
            serde_json::to_string_pretty(&events).map_err(|e| e.to_string())?
        );
        Ok(())
    })
}

fn main() {
    load_env();
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config_path = cli.config.clone();

    let result = match cli.command {
        Some(Commands::Run {
            user,
            passwd,
            delay,
            num_frames,
            max_frames,
            out_path,
            names,
        }) => run_capture(
            config_path,
            user,
            passwd,
            delay,
            num_frames,
            max_frames,
            out_path,
            names,
        ),
        Some(Commands::ListCameras { user, passwd }) => {
            run_list_cameras(config_path, user, passwd)
        }
        Some(Commands::Events {
            camera,
            start,
            end,
            user,
            passwd,
        }) => run_events(config_path, camera, start, end, user, passwd),
        None => {
            println!("nestcap v{}", env!("CARGO_PKG_VERSION"));
            println!("Timed frame capture for Nest and Dropcam cameras");
            println!();
            println!("Commands:");
            println!("  run              Run the capture loop");
            println!("  list-cameras     List cameras visible to the account");
            println!("  events <CAMERA>  Print recent motion events for a camera");
            println!();
            println!("Run 'nestcap --help' for more details.");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
