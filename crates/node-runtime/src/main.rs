//! # QuorumLedger node
//!
//! Startup sequence:
//!
//! 1. Initialize telemetry and load the environment configuration.
//! 2. Build the node identity (derived from `CRYPTO_SECRET` when set).
//! 3. Bootstrap the consensus peer — a master restores its persisted chain
//!    and starts fresh consensus state; a joiner starts unsynchronized.
//! 4. Spawn the runner task, dial the bootstrap peers, start the gateway.
//! 5. Run until the gateway fails or the engine shuts itself down.

use anyhow::{Context, Result};
use node_runtime::{bootstrap, config::NodeConfig, gateway, runner::Runner, telemetry};
use ql_consensus::Peer;
use ql_ledger::{ChainStore, JsonFileStore};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    let config = NodeConfig::from_env().context("loading configuration")?;
    let identity = config.identity().context("building node identity")?;
    info!(
        master = config.master,
        port = config.port,
        key = %identity.public_key_hex(),
        "starting node"
    );

    if let Some(dir) = config.db_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating data directory {}", dir.display()))?;
    }
    let mut store = JsonFileStore::new(&config.db_path);

    let mut peer = if config.master {
        Peer::bootstrap(identity, config.peer_config())?
    } else {
        Peer::joining(identity, config.peer_config(), config.peers.len())?
    };
    if config.master {
        match store.load()? {
            Some(chain) => {
                peer.restore(chain).context("restoring persisted chain")?;
                info!(
                    chain_len = peer.blockchain().len(),
                    path = %config.db_path.display(),
                    "chain restored"
                );
            }
            None => {
                // Seed the document with the genesis chain so later appends
                // always extend a full, loadable chain.
                store.replace(peer.blockchain().chain())?;
                info!("no persisted chain, starting from genesis");
            }
        }
    }

    let (runner, handle) = Runner::new(peer, Box::new(store), config.master);
    let runner_task = tokio::spawn(runner.run());

    bootstrap::connect_all(&handle, &config.peers)
        .await
        .context("connecting to bootstrap peers")?;

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "gateway listening");
    let server = axum::serve(listener, gateway::router(handle));

    tokio::select! {
        result = server => result.context("gateway server failed")?,
        result = runner_task => {
            result.context("runner task panicked")??;
            warn!("runner stopped, shutting down");
        }
    }
    Ok(())
}
