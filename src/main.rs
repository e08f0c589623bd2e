use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use rfplayer_rs::rfp::mock::{MockConnector, MockTransport};
use rfplayer_rs::rfp::transport::Connector;
use rfplayer_rs::rfp::{ClientEvent, Completion};
use rfplayer_rs::{
    init_logger, log_info, DongleClient, LogSink, RfpConfig, RfpManager, SerialConnector,
    StaticRegistry,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "rfplayer-cli")]
#[command(about = "CLI tool for RFPlayer RFP1000 dongles")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Talk to a scripted in-memory dongle instead of a serial port
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the dongle and print its identification
    Hello { port: String },
    /// Print the formatted dongle status
    Status { port: String },
    /// Send a raw command
    Send {
        port: String,
        command: String,
        /// Wait for the correlated reply
        #[arg(short, long)]
        reply: bool,
    },
    /// PING the dongle
    Ping { port: String },
    /// Print decoded frames until Ctrl-C
    Listen { port: String },
    /// Run the manager on a device catalogue until Ctrl-C
    Run {
        #[arg(short, long)]
        devices: PathBuf,
    },
}

type Events = mpsc::UnboundedReceiver<(String, ClientEvent)>;

fn connector(mock: bool) -> Arc<dyn Connector> {
    if mock {
        Arc::new(MockConnector::new(MockTransport::rfp1000()))
    } else {
        Arc::new(SerialConnector)
    }
}

async fn open_client(
    config: &RfpConfig,
    port: &str,
    connector: Arc<dyn Connector>,
) -> anyhow::Result<(DongleClient, Events)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let client = DongleClient::new(
        "cli",
        port,
        config.serial.clone(),
        config.engine.clone(),
        connector,
        tx,
    );
    client
        .open()
        .await
        .with_context(|| format!("cannot open RFP1000 on {port}"))?;
    Ok((client, rx))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => RfpConfig::from_file(path)
            .with_context(|| format!("cannot load configuration {}", path.display()))?,
        None => RfpConfig::default(),
    };
    let connector = connector(cli.mock);

    match cli.command {
        Commands::Hello { port } => {
            let (client, _events) = open_client(&config, &port, connector).await?;
            println!("{}", client.ident());
            client.shutdown().await;
        }
        Commands::Status { port } => {
            let (client, _events) = open_client(&config, &port, connector).await?;
            let deadline = tokio::time::Instant::now() + config.engine.request_timeout;
            while client.format_status()["systemStatus"].is_string()
                && tokio::time::Instant::now() < deadline
            {
                tokio::time::sleep(config.engine.poll_interval).await;
            }
            println!("{}", serde_json::to_string_pretty(&client.infos())?);
            client.shutdown().await;
        }
        Commands::Send {
            port,
            command,
            reply,
        } => {
            let (client, _events) = open_client(&config, &port, connector).await?;
            if reply {
                let (completion, rx) = Completion::channel();
                client.submit(&command, true, Some(completion))?;
                let message = rx
                    .await
                    .context("dongle closed before replying")?
                    .with_context(|| format!("no reply to {command}"))?;
                println!("{}", serde_json::to_string_pretty(&message.into_value())?);
            } else {
                client.send_line(&command)?;
                tokio::time::sleep(config.engine.poll_interval * 2).await;
                log_info(&format!("Sent {command}"));
            }
            client.shutdown().await;
        }
        Commands::Ping { port } => {
            let (client, _events) = open_client(&config, &port, connector).await?;
            let alive = client.ping().await;
            client.shutdown().await;
            if !alive {
                bail!("no PONG from {port}");
            }
            println!("PONG");
        }
        Commands::Listen { port } => {
            let (client, mut events) = open_client(&config, &port, connector).await?;
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    event = events.recv() => match event {
                        Some((_, ClientEvent::Frame { message, received_at })) => {
                            println!("{received_at} {message}");
                        }
                        Some((_, ClientEvent::Text { text, received_at })) => {
                            println!("{received_at} {text}");
                        }
                        Some(_) => {}
                        None => break,
                    }
                }
            }
            client.shutdown().await;
        }
        Commands::Run { devices } => {
            let registry = StaticRegistry::from_file(&devices)
                .with_context(|| format!("cannot load devices {}", devices.display()))?;
            let manager = RfpManager::new(config, Arc::new(registry), Arc::new(LogSink), connector);
            manager.refresh_from_registry().await;
            log_info(&format!("Managing {} dongle(s)", manager.client_ids().len()));
            tokio::signal::ctrl_c().await?;
            manager.shutdown().await;
        }
    }

    Ok(())
}
