use axum::{
    Router,
    extract::Extension,
    routing::{get, post},
};
use bitmap_node::config::NodeConfig;
use bitmap_node::metrics::TracingTimerSink;
use bitmap_node::rpc::dispatch::Dispatcher;
use bitmap_node::rpc::handlers::{ENDPOINT_PING, handle_ping};
use bitmap_node::rpc::hold::Hold;
use bitmap_node::rpc::ping::PingService;
use bitmap_node::rpc::types::ProcessId;
use bitmap_node::storage::chunked::ChunkedBitmapStore;
use bitmap_node::storage::handlers::{handle_fetch_bitmap, handle_store_bitmap};
use bitmap_node::storage::memory::MemoryColumnStore;
use bitmap_node::storage::protocol::{ENDPOINT_BITMAP_GET, ENDPOINT_BITMAP_STORE};
use bitmap_node::storage::schema::schema_statements;
use bitmap_node::transport::udp::UdpTransport;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

fn usage(program: &str) -> ! {
    eprintln!(
        "Usage: {} --bind <addr:port> [--id <uuid>] [--peer <uuid>@<addr:port>]... [--config <file>] [--print-schema]",
        program
    );
    eprintln!("Example: {} --bind 127.0.0.1:5000", program);
    eprintln!(
        "Example: {} --bind 127.0.0.1:5001 --peer 7d5c...@127.0.0.1:5000",
        program
    );
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut bind_addr: Option<SocketAddr> = None;
    let mut local_id: Option<ProcessId> = None;
    let mut peers: Vec<(ProcessId, SocketAddr)> = vec![];
    let mut config_path: Option<PathBuf> = None;
    let mut print_schema = false;

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--bind", Some(v)) => {
                bind_addr = Some(v.parse()?);
                i += 2;
            }
            ("--id", Some(v)) => {
                local_id = Some(v.parse()?);
                i += 2;
            }
            ("--peer", Some(v)) => {
                let (id, addr) = v
                    .split_once('@')
                    .ok_or_else(|| anyhow::anyhow!("--peer expects <uuid>@<addr:port>"))?;
                peers.push((id.parse()?, addr.parse()?));
                i += 2;
            }
            ("--config", Some(v)) => {
                config_path = Some(PathBuf::from(v));
                i += 2;
            }
            ("--print-schema", _) => {
                print_schema = true;
                i += 1;
            }
            _ => {
                i += 1;
            }
        }
    }

    let config = NodeConfig::load(config_path.as_deref())?;

    if print_schema {
        for statement in schema_statements(&config.keyspace) {
            println!("{}", statement);
        }
        return Ok(());
    }

    let Some(bind_addr) = bind_addr else {
        usage(&args[0]);
    };
    let local_id = local_id.unwrap_or_default();

    tracing::info!("Starting node {} on {}", local_id, bind_addr);

    // 1. Backend session. The node does not start without one.
    let backend = Arc::new(MemoryColumnStore::connect(&config)?);
    tracing::info!(
        "Batch thresholds: window {:?}, {} rows (every store commits immediately)",
        config.batch_time_window(),
        config.batch_max_size
    );
    let store = Arc::new(ChunkedBitmapStore::new(
        backend,
        Arc::new(TracingTimerSink),
        &config,
    ));

    // 2. Transport and dispatch:
    let (transport, inbound) = UdpTransport::bind(bind_addr).await?;
    for (peer_id, peer_addr) in peers {
        transport.add_peer(peer_id, peer_addr);
    }

    let hold = Arc::new(Hold::new());
    let dispatcher = Arc::new(Dispatcher::new(local_id, transport.clone(), hold.clone()));
    tokio::spawn(dispatcher.run(inbound));

    let ping = Arc::new(
        PingService::new(local_id, transport.clone(), hold.clone())
            .with_timeout(config.ping_timeout()),
    );

    // 3. HTTP Router:
    let app = Router::new()
        .route(ENDPOINT_PING, get(handle_ping))
        .route(ENDPOINT_BITMAP_GET, get(handle_fetch_bitmap))
        .route(ENDPOINT_BITMAP_STORE, post(handle_store_bitmap))
        .layer(Extension(ping))
        .layer(Extension(store.clone()));

    // 4. Stats reporter:
    let stats_hold = hold.clone();
    let stats_transport = transport.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(5));

        loop {
            interval.tick().await;
            tracing::info!(
                "Node stats: {} known peers, {} pending requests",
                stats_transport.peer_count(),
                stats_hold.pending()
            );
        }
    });

    // 5. Start HTTP server:
    let http_addr = SocketAddr::new(bind_addr.ip(), bind_addr.port() + 1000);
    tracing::info!("HTTP server listening on {}", http_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    store.close().await;
    tracing::info!("Node {} stopped", local_id);
    Ok(())
}
