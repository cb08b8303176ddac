//! Command-line WebSocket tool: pipe stdin/stdout through a connection, or
//! serve echo/ticker handlers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use wsframe::{upgrade, Config, Connection, OpCode, NORMAL_CLOSURE};

#[derive(Parser)]
#[command(name = "wscat", about = "WebSocket cat", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to a ws:// URL; stdin goes out as Text frames, received
    /// frames go to stdout.
    Client {
        /// The ws:// URL to dial.
        url: String,
    },
    /// Listen for upgrades and serve every connection with a handler.
    Server {
        /// Address to listen on.
        #[arg(long, default_value = "127.0.0.1:8080")]
        listen: String,
        /// Per-connection handler.
        #[arg(long, value_enum, default_value_t = Handler::Echo)]
        handler: Handler,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Handler {
    /// Write every received chunk back.
    Echo,
    /// Write a Text frame once per second.
    Ticker,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match Cli::parse().command {
        Command::Client { url } => client_run(&url).await,
        Command::Server { listen, handler } => server_run(&listen, handler).await,
    }
}

async fn client_run(url: &str) -> anyhow::Result<()> {
    let (addr, host, path) = upgrade::split_url(url)?;
    let stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("dial {addr}"))?;
    let conn = Arc::new(upgrade::connect(stream, &host, &path, Config::new()).await?);
    info!(%addr, %path, "connection established");

    let outbound = {
        let conn = Arc::clone(&conn);
        tokio::spawn(async move {
            let mut stdin = tokio::io::stdin();
            let mut buf = [0u8; 4096];
            loop {
                let n = stdin.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                conn.write_frame(&buf[..n], OpCode::Text, true).await?;
            }
            conn.close_with_status(NORMAL_CLOSURE, "").await
        })
    };

    let mut stdout = tokio::io::stdout();
    let mut buf = [0u8; 4096];
    loop {
        let n = conn.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        stdout.write_all(&buf[..n]).await?;
        stdout.flush().await?;
    }

    outbound.abort();
    conn.close().await.ok();
    Ok(())
}

async fn server_run(listen: &str, handler: Handler) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("listen on {listen}"))?;
    info!(addr = %listener.local_addr()?, "listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        tokio::spawn(async move {
            let conn = match upgrade::accept(stream, Config::new()).await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(%peer, error = %e, "handshake failed");
                    return;
                }
            };
            info!(%peer, "connection established");
            let result = match handler {
                Handler::Echo => echo(&conn).await,
                Handler::Ticker => ticker(&conn).await,
            };
            if let Err(e) = result {
                if !e.is_closed() {
                    error!(%peer, error = %e, "handler failed");
                }
            }
            conn.close().await.ok();
            info!(%peer, "connection done");
        });
    }
}

async fn echo(conn: &Connection<TcpStream>) -> wsframe::Result<()> {
    let mut buf = [0u8; 4096];
    loop {
        let n = conn.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        conn.write(&buf[..n]).await?;
    }
}

async fn ticker(conn: &Connection<TcpStream>) -> wsframe::Result<()> {
    let done = CancellationToken::new();

    // Drain incoming frames so pings keep getting answered; a close or a
    // transport error stops the ticks.
    let drain = done.clone();
    let tick_loop = async {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        let mut n = 0u64;
        loop {
            interval.tick().await;
            if done.is_cancelled() {
                return Ok(());
            }
            conn.write_frame(format!("tick {n}").as_bytes(), OpCode::Text, true)
                .await?;
            n += 1;
        }
    };
    let drain_loop = async {
        let mut buf = [0u8; 1024];
        loop {
            match conn.read_with(&mut buf, &drain).await {
                Ok(0) | Err(_) => {
                    drain.cancel();
                    return Ok::<(), wsframe::Error>(());
                }
                Ok(_) => {}
            }
        }
    };

    let (tick_res, _) = tokio::join!(tick_loop, drain_loop);
    tick_res
}
