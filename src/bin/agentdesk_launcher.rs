//! Starts the MCP tool servers and the backend as child processes.
//!
//! Usage: `agentdesk-launcher [--check-ports] [--with-chat]`
//!
//! Children are looked up next to the launcher executable. Ctrl+C (or the console chat
//! exiting, with `--with-chat`) stops all of them.

use agentdesk::config::load_dotenv;
use std::error::Error;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::{Child, Command};

const SERVICES: [(&str, &str); 4] = [
    ("LocalTime MCP Server", "localtime-mcp"),
    ("Search MCP Server", "search-mcp"),
    ("SQL MCP Server", "sqldb-mcp"),
    ("Backend Server", "agentdesk-server"),
];

const STARTUP_GRACE: Duration = Duration::from_secs(3);

fn binary(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}{}", name, std::env::consts::EXE_SUFFIX))
}

fn backend_port() -> u16 {
    std::env::var("AGENTDESK_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8091)
}

/// Ports that cannot be bound right now.
fn busy_ports(ports: &[u16]) -> Vec<u16> {
    ports
        .iter()
        .copied()
        .filter(|port| TcpListener::bind(("0.0.0.0", *port)).is_err())
        .collect()
}

async fn stop_all(children: &mut Vec<(&'static str, Child)>) {
    println!("\nStopping all services...");
    for (name, child) in children.iter_mut() {
        match child.try_wait() {
            Ok(Some(_)) => {}
            _ => match child.kill().await {
                Ok(()) => println!("✓ Stopped {}", name),
                Err(e) => println!("✗ Could not stop {}: {}", name, e),
            },
        }
    }
    children.clear();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    load_dotenv();
    agentdesk::init_logger();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let check_ports = args.iter().any(|a| a == "--check-ports");
    let with_chat = args.iter().any(|a| a == "--with-chat");

    let exe = std::env::current_exe()?;
    let dir = exe.parent().ok_or("launcher has no parent directory")?;
    println!("Launching services from {}", dir.display());
    println!("{}", "=".repeat(50));

    if check_ports {
        let busy = busy_ports(&[8087, 8088, 8089, backend_port()]);
        if busy.is_empty() {
            println!("No active processes found on the service ports.");
        } else {
            for port in busy {
                println!("  Port {} is already in use", port);
            }
        }
    }

    let mut children: Vec<(&'static str, Child)> = Vec::new();
    for (name, bin) in SERVICES {
        println!("Starting {}...", name);
        match Command::new(binary(dir, bin)).kill_on_drop(true).spawn() {
            Ok(child) => {
                println!("✓ {} started (PID: {})", name, child.id().unwrap_or_default());
                children.push((name, child));
            }
            Err(e) => println!("✗ Failed to start {}: {}", name, e),
        }
    }

    println!("\nWaiting for services to initialize...");
    tokio::time::sleep(STARTUP_GRACE).await;

    println!("\n{}", "=".repeat(50));
    println!("All services started!");

    if with_chat {
        let mut chat = Command::new(binary(dir, "agentdesk-chat"))
            .arg(format!("http://localhost:{}", backend_port()))
            .kill_on_drop(true)
            .spawn()?;
        tokio::select! {
            status = chat.wait() => log::info!("console chat exited: {:?}", status),
            _ = tokio::signal::ctrl_c() => {
                let _ = chat.kill().await;
            }
        }
    } else {
        println!("Press Ctrl+C to stop all services.");
        tokio::signal::ctrl_c().await?;
    }

    stop_all(&mut children).await;
    Ok(())
}
