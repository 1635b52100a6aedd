use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use frs_core::FaceSummary;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "frs", about = "Face recognition system CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the face in front of the camera
    Register {
        /// Name to store the face under
        name: String,
        /// Leave the preview camera running afterwards
        #[arg(long)]
        keep_camera: bool,
    },
    /// Control continuous recognition
    Recognize {
        #[command(subcommand)]
        action: RecognizeAction,
    },
    /// Manage stored faces
    Faces {
        #[command(subcommand)]
        action: FacesAction,
    },
    /// Face store connection settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show daemon status
    Status,
}

#[derive(Subcommand)]
enum RecognizeAction {
    Start,
    Stop,
    /// Print recognized names as they change (Ctrl-C to exit)
    Watch {
        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 250)]
        interval_ms: u64,
    },
    /// Save the current overlay (boxes drawn by the last tick) as a PNG
    Snapshot {
        /// Output file
        path: PathBuf,
    },
}

#[derive(Subcommand)]
enum FacesAction {
    /// List stored faces, newest first
    List,
    /// Delete a stored face by ID
    Delete { id: String },
    /// Reload the daemon's registered set
    Refresh,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Save a new project URL and access key
    Set {
        /// Project URL, e.g. https://your-project.supabase.co
        #[arg(long)]
        url: String,
        #[arg(long)]
        key: String,
    },
    Show,
}

#[zbus::proxy(
    interface = "org.frs.Recognition1",
    default_service = "org.frs.Recognition1",
    default_path = "/org/frs/Recognition1"
)]
trait Frs {
    async fn start_camera(&self) -> zbus::Result<()>;
    async fn stop_camera(&self) -> zbus::Result<()>;
    async fn register(&self, name: &str) -> zbus::Result<String>;
    async fn start_recognition(&self) -> zbus::Result<()>;
    async fn stop_recognition(&self) -> zbus::Result<()>;
    async fn recognized_names(&self) -> zbus::Result<Vec<String>>;
    async fn overlay(&self) -> zbus::Result<Vec<u8>>;
    async fn list_faces(&self) -> zbus::Result<String>;
    async fn delete_face(&self, id: &str) -> zbus::Result<()>;
    async fn refresh_faces(&self) -> zbus::Result<u32>;
    async fn save_config(&self, endpoint_url: &str, access_key: &str) -> zbus::Result<()>;
    async fn show_config(&self) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = zbus::Connection::session()
        .await
        .context("cannot connect to the session bus")?;
    let proxy = FrsProxy::new(&conn).await?;
    tracing::debug!("connected to frsd");

    match cli.command {
        Commands::Register { name, keep_camera } => {
            proxy.start_camera().await.context("frsd: start camera")?;
            let result = proxy.register(&name).await;
            if !keep_camera {
                proxy.stop_camera().await?;
            }
            let record: FaceSummary = serde_json::from_str(&result.context("frsd: register")?)?;
            println!("Face registered for {} ({})", record.name, record.id);
        }
        Commands::Recognize { action } => match action {
            RecognizeAction::Start => {
                proxy.start_recognition().await.context("frsd: start recognition")?;
                println!("Recognition started");
            }
            RecognizeAction::Stop => {
                proxy.stop_recognition().await?;
                println!("Recognition stopped");
            }
            RecognizeAction::Watch { interval_ms } => watch(&proxy, interval_ms).await?,
            RecognizeAction::Snapshot { path } => {
                let png = proxy.overlay().await.context("frsd: overlay")?;
                std::fs::write(&path, png).with_context(|| format!("writing {}", path.display()))?;
                println!("Overlay saved to {}", path.display());
            }
        },
        Commands::Faces { action } => match action {
            FacesAction::List => {
                let faces: Vec<FaceSummary> = serde_json::from_str(&proxy.list_faces().await?)?;
                if faces.is_empty() {
                    println!("No faces registered");
                }
                for face in faces {
                    println!(
                        "{}  {:<24} {}",
                        face.id,
                        face.name,
                        face.created_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
            FacesAction::Delete { id } => {
                proxy.delete_face(&id).await?;
                println!("Deleted {id}");
            }
            FacesAction::Refresh => {
                let count = proxy.refresh_faces().await?;
                println!("{count} registered faces");
            }
        },
        Commands::Config { action } => match action {
            ConfigAction::Set { url, key } => {
                proxy.save_config(&url, &key).await.context("frsd: save config")?;
                println!("Configuration saved");
            }
            ConfigAction::Show => {
                let config: serde_json::Value = serde_json::from_str(&proxy.show_config().await?)?;
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        },
        Commands::Status => {
            let status: serde_json::Value = serde_json::from_str(&proxy.status().await?)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}

/// Print the recognized names whenever they change.
async fn watch(proxy: &FrsProxy<'_>, interval_ms: u64) -> Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(10)));
    let mut last: Option<Vec<String>> = None;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let names = proxy.recognized_names().await?;
                if last.as_ref() != Some(&names) {
                    if names.is_empty() {
                        println!("(no one recognized)");
                    } else {
                        println!("{}", names.join(", "));
                    }
                    last = Some(names);
                }
            }
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}
