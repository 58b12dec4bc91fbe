use std::{net::SocketAddr, sync::Arc};

use anneal_chain_types::{Shred, Transaction, Vote};
use anneal_consensus::{ConsensusHandle, VoteSink};
use anneal_mempool::Mempool;
use anneal_params::Params;
use anneal_primitives::{CodecError, Decodable, Encodable, PublicKey, Reader, Writer};
use anneal_scheduler::{now_ns, SlotClock, ValidatorRegistry};
use anneal_turbine::ShredSink;
use async_trait::async_trait;
use tokio::{net::UdpSocket, sync::mpsc, time::timeout};
use tracing::{debug, trace, warn};

/// Everything that travels over the node's UDP socket.
#[derive(Debug)]
pub enum WireMessage {
    Shred(Shred),
    Vote(Vote),
    /// Transaction ingress.
    Transaction(Transaction),
}

impl Encodable for WireMessage {
    fn encode(&self, w: &mut Writer) {
        match self {
            WireMessage::Shred(shred) => {
                w.put_u8(0);
                shred.encode(w);
            }
            WireMessage::Vote(vote) => {
                w.put_u8(1);
                vote.encode(w);
            }
            WireMessage::Transaction(tx) => {
                w.put_u8(2);
                tx.encode(w);
            }
        }
    }
}

impl Decodable for WireMessage {
    fn decode(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        match r.u8()? {
            0 => Ok(WireMessage::Shred(Shred::decode(r)?)),
            1 => Ok(WireMessage::Vote(Vote::decode(r)?)),
            2 => Ok(WireMessage::Transaction(Transaction::decode(r)?)),
            tag => Err(CodecError::InvalidTag {
                ty: "wire message",
                tag,
            }),
        }
    }
}

/// UDP implementation of the shred and vote transports.
pub struct UdpGossip {
    socket: Arc<UdpSocket>,
    registry: Arc<ValidatorRegistry>,
    local_key: PublicKey,
}

impl std::fmt::Debug for UdpGossip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UdpGossip({})", self.local_key)
    }
}

impl UdpGossip {
    pub fn new(socket: Arc<UdpSocket>, registry: Arc<ValidatorRegistry>, local_key: PublicKey) -> Self {
        Self {
            socket,
            registry,
            local_key,
        }
    }

    async fn send(&self, to: SocketAddr, msg: &WireMessage) {
        let bytes = msg.to_wire_bytes();
        if let Err(err) = self.socket.send_to(&bytes, to).await {
            warn!(%to, ?err, "udp send failed");
        }
    }
}

#[async_trait]
impl ShredSink for UdpGossip {
    async fn send_shred(&self, to: SocketAddr, shred: &Shred) {
        trace!(%to, index = shred.index, "sending shred");
        self.send(to, &WireMessage::Shred(shred.clone())).await;
    }
}

#[async_trait]
impl VoteSink for UdpGossip {
    async fn broadcast_vote(&self, vote: &Vote) {
        for record in self.registry.stake_ordered() {
            if record.key == self.local_key {
                continue;
            }
            self.send(record.address, &WireMessage::Vote(*vote)).await;
        }
    }
}

/// Inbound datagram loop: decode and dispatch shreds, votes, and
/// transactions. Reads use the fast-path timeout so the task stays
/// responsive to shutdown.
pub async fn listener_task(
    socket: Arc<UdpSocket>,
    params: Arc<Params>,
    clock: SlotClock,
    shred_tx: mpsc::Sender<Shred>,
    consensus: ConsensusHandle,
    mempool: Arc<Mempool>,
) {
    let mut buf = vec![0u8; 65_536];
    loop {
        let received = match timeout(params.net_read_timeout, socket.recv_from(&mut buf)).await {
            Err(_) => continue, // read timeout, poll again
            Ok(Err(err)) => {
                warn!(?err, "udp recv failed");
                continue;
            }
            Ok(Ok((len, from))) => (len, from),
        };
        let (len, from) = received;

        match WireMessage::from_wire_bytes(&buf[..len]) {
            Ok(WireMessage::Shred(shred)) => {
                if shred_tx.send(shred).await.is_err() {
                    warn!("shred channel closed, stopping listener");
                    return;
                }
            }
            Ok(WireMessage::Vote(vote)) => {
                let outcome = consensus.submit_vote(vote).await;
                debug!(%from, ?outcome, slot = vote.slot, "vote received");
            }
            Ok(WireMessage::Transaction(tx)) => {
                let (slot, _) = clock.slot_at(now_ns());
                let outcome = mempool.submit(tx, slot);
                debug!(%from, ?outcome, "transaction received");
            }
            Err(err) => {
                debug!(%from, ?err, "undecodable datagram dropped");
            }
        }
    }
}
