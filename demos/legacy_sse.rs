//! Legacy SSE walkthrough against a live MCP server.
//!
//! Demonstrates:
//! - Opening the event stream and waiting for the endpoint
//! - The `initialize` handshake
//! - Listing tools
//! - A single tool call with progress
//! - Parallel tool calls with per-call progress
//!
//! Usage:
//!   cargo run --example legacy_sse
//!   cargo run --example legacy_sse -- --debug
//!   MCP_SSE_URL=http://host:5050/mcp/sse MCP_ACCESS_TOKEN=... cargo run --example legacy_sse

// ============================================================================
// Imports
// ============================================================================

use anyhow::Context;
use mcp_stream_client::{
    ClientInfo, HttpTransport, ProgressUpdate, RequestOptions, Session, ToolCall,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_SSE_URL: &str = "http://localhost:5050/mcp/sse";

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let debug = std::env::args().any(|a| a == "--debug");
    init_logging(debug);

    if let Err(e) = run().await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    println!("=== Legacy SSE Walkthrough ===\n");

    let sse_url = std::env::var("MCP_SSE_URL").unwrap_or_else(|_| DEFAULT_SSE_URL.to_owned());
    let mut transport = HttpTransport::new();
    if let Ok(token) = std::env::var("MCP_ACCESS_TOKEN") {
        transport = transport.with_access_token(token);
    }

    let session = Session::builder().legacy_sse(&sse_url).build(transport)?;

    // ========================================================================
    // 1. Connect
    // ========================================================================

    println!("[1] Connecting to {sse_url}...");
    session.open().await.context("opening event stream")?;
    if let Some(endpoint) = session.endpoint() {
        println!("    ✓ Endpoint: {endpoint}\n");
    }

    // ========================================================================
    // 2. Initialize
    // ========================================================================

    println!("[2] Initializing...");
    let init = session
        .initialize(ClientInfo::new("browser-client", "1.0.0"))
        .await?;
    let server = init
        .pointer("/serverInfo/name")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    println!("    ✓ Server: {server}\n");

    // ========================================================================
    // 3. List Tools
    // ========================================================================

    println!("[3] Listing tools...");
    let tools = session.list_tools().await?;
    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    println!("    ✓ Tools: {}\n", names.join(", "));

    // ========================================================================
    // 4. Single Tool Call
    // ========================================================================

    println!("[4] Single tool call...");
    let result = session
        .call_tool(
            "toolA",
            json!({"hostName": "device01", "commands": ["show version", "show interfaces"]}),
            RequestOptions::new().on_progress(|p| print_progress("Device01", &p)),
        )
        .await?;
    println!("    ✓ Result: {result}\n");

    // ========================================================================
    // 5. Parallel Tool Calls
    // ========================================================================

    println!("[5] Parallel tool calls...");
    let calls = [
        ("Router-A", "router-a", json!(["show version", "show ip route"])),
        ("Switch-B", "switch-b", json!(["show vlan", "show mac-address-table"])),
        ("Firewall-C", "firewall-c", json!(["show access-lists"])),
    ]
    .into_iter()
    .map(|(label, host, commands)| {
        ToolCall::new("toolA", json!({"hostName": host, "commands": commands})).with_options(
            RequestOptions::new().on_progress(move |p| print_progress(label, &p)),
        )
    })
    .collect();

    for outcome in session.call_tools_parallel(calls).await {
        match &outcome.result {
            Ok(_) => println!("    ✓ [{}] {}: success", outcome.index, outcome.name),
            Err(e) => println!("    ✗ [{}] {}: {e}", outcome.index, outcome.name),
        }
    }

    println!("\n    Status: {:?}", session.status());
    session.close();
    println!("\n=== Done ===");
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn init_logging(debug: bool) {
    let filter = if debug {
        "mcp_stream_client=debug"
    } else {
        "mcp_stream_client=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

fn print_progress(label: &str, progress: &ProgressUpdate) {
    let percentage = progress
        .percentage
        .map_or_else(|| "?".to_owned(), |p| p.to_string());
    let message = progress.message.as_deref().unwrap_or("");
    println!("    [{label}] {percentage}% - {message}");
}
