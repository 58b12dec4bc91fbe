//! The anneal node: wires the scheduler, mempool, block builder, turbine
//! propagator, and consensus pipeline together and runs them.

mod config;
mod keystore;
mod net;
mod peers;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anneal_block_assembly::{leader_loop, LeaderLoopContext};
use anneal_chain_types::Block;
use anneal_consensus::{build_consensus_task, ConsensusContext, ConsensusHandle};
use anneal_executor::Executor;
use anneal_ledger::LedgerState;
use anneal_mempool::Mempool;
use anneal_params::Params;
use anneal_primitives::Keypair;
use anneal_scheduler::{now_ns, LeaderScheduler, SlotClock, ValidatorRegistry};
use anneal_turbine::{
    broadcast_block, shred_receive_task, ReassemblyBuffers, ReceiveContext, TurbineTree,
};
use clap::Parser;
use eyre::Context;
use tokio::{net::UdpSocket, sync::mpsc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::{config::NodeConfig, net::UdpGossip};

#[derive(Debug, Parser)]
#[command(name = "anneal-node", about = "annealing-scheduled blockchain node")]
struct Args {
    /// Path to the TOML node config.
    #[arg(long, default_value = "anneal.toml")]
    config: PathBuf,

    /// Generate a signing key at the given path and exit.
    #[arg(long)]
    generate_key: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(err) = run(args) {
        error!(?err, "node exited with error");
        std::process::exit(1);
    }
}

fn run(args: Args) -> eyre::Result<()> {
    if let Some(path) = args.generate_key {
        let keypair = keystore::generate_keypair(&path)?;
        info!(key = %keypair.public_key(), path = %path.display(), "generated signing key");
        return Ok(());
    }

    let config = NodeConfig::load(&args.config)?;
    let params = Arc::new(config.params());
    params.validate().wrap_err("invalid params")?;

    let keypair = Arc::new(keystore::load_keypair(&config.key_path)?);
    info!(key = %keypair.public_key(), "node identity loaded");

    let runtime = tokio::runtime::Runtime::new().wrap_err("starting runtime")?;
    runtime.block_on(run_node(config, params, keypair))
}

async fn run_node(
    config: NodeConfig,
    params: Arc<Params>,
    keypair: Arc<Keypair>,
) -> eyre::Result<()> {
    // ledger state from genesis
    let genesis = config.genesis_config()?;
    let ledger = LedgerState::from_genesis(&genesis);
    info!(hash = %ledger.head().hash, "genesis block ready");

    // validator registry from the peer directory
    let registry = Arc::new(ValidatorRegistry::new());
    let loaded = peers::load_peers(&config.peers_path, &registry)?;
    info!(validators = loaded, "peer directory loaded");

    let clock = SlotClock::new(genesis.timestamp_ns, params.slot_duration);
    let scheduler = Arc::new(
        LeaderScheduler::new(
            params.clone(),
            ledger.epoch_seed(),
            registry.clone(),
            clock,
            now_ns(),
        )
        .wrap_err("building initial leader schedules")?,
    );

    let executor = Arc::new(Executor::new(params.executor_workers));
    let mempool = Arc::new(Mempool::new(params.clone(), ledger.clone()));

    // network plumbing
    let socket = Arc::new(
        UdpSocket::bind(config.listen_addr)
            .await
            .wrap_err_with(|| format!("binding {}", config.listen_addr))?,
    );
    info!(addr = %config.listen_addr, "listening");
    let gossip = Arc::new(UdpGossip::new(
        socket.clone(),
        registry.clone(),
        keypair.public_key(),
    ));

    // consensus pipeline
    let (consensus_handle, consensus_task) = build_consensus_task(ConsensusContext {
        params: params.clone(),
        keypair: keypair.clone(),
        scheduler: scheduler.clone(),
        ledger: ledger.clone(),
        executor: executor.clone(),
        vote_sink: gossip.clone(),
    });
    tokio::spawn(consensus_task);

    // turbine receive path: shreds in, reconstructed blocks out
    let (shred_tx, shred_rx) = mpsc::channel(1024);
    let (reconstructed_tx, reconstructed_rx) = mpsc::channel(16);
    tokio::spawn(shred_receive_task(
        ReceiveContext {
            params: params.clone(),
            scheduler: scheduler.clone(),
            buffers: Arc::new(ReassemblyBuffers::new()),
            local_key: keypair.public_key(),
            sink: gossip.clone(),
            block_tx: reconstructed_tx,
        },
        shred_rx,
    ));
    tokio::spawn(forward_reconstructed(
        reconstructed_rx,
        consensus_handle.clone(),
    ));

    // leader side: build blocks, verify them locally, and broadcast
    let (built_tx, built_rx) = mpsc::channel(4);
    tokio::spawn(leader_loop(LeaderLoopContext {
        params: params.clone(),
        keypair: keypair.clone(),
        scheduler: scheduler.clone(),
        ledger: ledger.clone(),
        mempool: mempool.clone(),
        executor: executor.clone(),
        block_tx: built_tx,
    }));
    tokio::spawn(fan_out_built_blocks(
        built_rx,
        consensus_handle.clone(),
        gossip.clone(),
        scheduler.clone(),
        params.clone(),
        keypair.clone(),
    ));

    // inbound datagrams
    tokio::spawn(net::listener_task(
        socket,
        params.clone(),
        clock,
        shred_tx,
        consensus_handle,
        mempool,
    ));

    // keep the directory eventually consistent
    tokio::spawn(peers::peer_refresh_task(
        config.peers_path.clone(),
        registry,
        Duration::from_secs(30),
    ));

    // finalized-head subscription, surfaced in the log
    let mut head_rx = ledger.subscribe();
    tokio::spawn(async move {
        while head_rx.changed().await.is_ok() {
            let head = *head_rx.borrow_and_update();
            info!(height = head.height, slot = head.slot, hash = %head.hash, "finalized head advanced");
        }
    });

    tokio::signal::ctrl_c().await.wrap_err("waiting for ctrl-c")?;
    info!("shutting down");
    Ok(())
}

/// Blocks reconstructed by turbine go straight into verification.
async fn forward_reconstructed(
    mut reconstructed_rx: mpsc::Receiver<Block>,
    consensus: ConsensusHandle,
) {
    while let Some(block) = reconstructed_rx.recv().await {
        if consensus.deliver_block(block).await.is_err() {
            error!("consensus channel closed, stopping reconstruction forwarder");
            return;
        }
    }
}

/// Locally built blocks are verified (and voted on) by this node like any
/// other, and shredded out to the network.
async fn fan_out_built_blocks(
    mut built_rx: mpsc::Receiver<Block>,
    consensus: ConsensusHandle,
    gossip: Arc<UdpGossip>,
    scheduler: Arc<LeaderScheduler>,
    params: Arc<Params>,
    keypair: Arc<Keypair>,
) {
    while let Some(block) = built_rx.recv().await {
        let tree = TurbineTree::new(
            scheduler.registry().stake_ordered(),
            &keypair.public_key(),
            params.turbine_fanout,
        );
        if let Err(err) = broadcast_block(&block, &keypair, &tree, &params, gossip.as_ref()).await {
            error!(?err, "failed to broadcast built block");
        }
        if consensus.deliver_block(block).await.is_err() {
            error!("consensus channel closed, stopping block fan-out");
            return;
        }
    }
}
