use anneal_chain_types::{Block, Shred, ShredKind};
use anneal_params::Params;
use anneal_primitives::{CodecError, Decodable, Encodable, Keypair};
use reed_solomon_erasure::galois_16::ReedSolomon;
use thiserror::Error;

/// Shredding and reconstruction failures.
#[derive(Debug, Error)]
pub enum TurbineError {
    #[error("erasure coding: {0}")]
    Erasure(#[from] reed_solomon_erasure::Error),
    #[error("shred set is empty")]
    NoShreds,
    #[error("shreds disagree on block geometry")]
    InconsistentGeometry,
    #[error("not enough shreds: have {have}, need {need}")]
    NotEnoughShreds { have: usize, need: usize },
    #[error("reconstructed stream too short for its length frame")]
    BadFrame,
    #[error("block decode: {0}")]
    Decode(#[from] CodecError),
}

/// The wide-symbol code works on two-byte elements, so payloads convert
/// to and from `[u8; 2]` shards around every code operation. Payload
/// sizes are even (the default is 1280).
fn to_elements(bytes: &[u8]) -> Vec<[u8; 2]> {
    bytes.chunks(2).map(|pair| [pair[0], pair[1]]).collect()
}

fn from_elements(elems: &[[u8; 2]]) -> Vec<u8> {
    elems.iter().flatten().copied().collect()
}

/// Shred a block into signed data and recovery shreds.
///
/// The canonical block bytes are framed with a `u64` length prefix, padded
/// to a whole number of fixed-size payloads, and split into data shreds;
/// recovery shreds are Reed–Solomon parity over the same payloads at the
/// configured redundancy ratio. Any `total_data` of the combined set
/// reconstruct the block. The code runs over GF(2^16), so even very large
/// blocks stay inside one code word.
pub fn make_shreds(
    block: &Block,
    keypair: &Keypair,
    params: &Params,
) -> Result<Vec<Shred>, TurbineError> {
    let payload_len = params.shred_payload_len;
    let block_bytes = block.to_wire_bytes();
    let block_hash = block.hash();

    // length frame so reconstruction knows where the block ends inside
    // the padded final payload
    let mut stream = Vec::with_capacity(8 + block_bytes.len());
    stream.extend_from_slice(&(block_bytes.len() as u64).to_le_bytes());
    stream.extend_from_slice(&block_bytes);
    let data_count = stream.len().div_ceil(payload_len);
    stream.resize(data_count * payload_len, 0);

    let recovery_count = params.shred_recovery_count(data_count);
    let mut shards: Vec<Vec<[u8; 2]>> = stream.chunks(payload_len).map(to_elements).collect();
    shards.extend(
        std::iter::repeat_with(|| vec![[0u8; 2]; payload_len / 2]).take(recovery_count),
    );

    let rs = ReedSolomon::new(data_count, recovery_count)?;
    rs.encode(&mut shards)?;

    let mut shreds = Vec::with_capacity(shards.len());
    for (index, shard) in shards.into_iter().enumerate() {
        let payload = from_elements(&shard);
        let kind = if index < data_count {
            ShredKind::Data
        } else {
            ShredKind::Recovery
        };
        let mut shred = Shred {
            kind,
            block_hash,
            index: index as u32,
            total_data: data_count as u32,
            total_recovery: recovery_count as u32,
            payload,
            producer_signature: Default::default(),
        };
        shred.sign(keypair);
        shreds.push(shred);
    }
    Ok(shreds)
}

/// Rebuild a block from any sufficient subset of its shreds.
///
/// Missing shards are recovered through the erasure code when at least
/// `total_data` distinct shreds are present.
pub fn reassemble_block(shreds: &[&Shred]) -> Result<Block, TurbineError> {
    let first = shreds.first().ok_or(TurbineError::NoShreds)?;
    let data_count = first.total_data as usize;
    let recovery_count = first.total_recovery as usize;
    let total = data_count + recovery_count;

    if shreds.iter().any(|s| {
        s.block_hash != first.block_hash
            || s.total_data != first.total_data
            || s.total_recovery != first.total_recovery
            || s.index as usize >= total
    }) {
        return Err(TurbineError::InconsistentGeometry);
    }

    let mut shards: Vec<Option<Vec<[u8; 2]>>> = vec![None; total];
    for shred in shreds {
        shards[shred.index as usize] = Some(to_elements(&shred.payload));
    }
    let have = shards.iter().filter(|s| s.is_some()).count();
    if have < data_count {
        return Err(TurbineError::NotEnoughShreds {
            have,
            need: data_count,
        });
    }

    let rs = ReedSolomon::new(data_count, recovery_count)?;
    rs.reconstruct(&mut shards)?;

    let mut stream = Vec::new();
    for shard in shards.into_iter().take(data_count) {
        stream.extend_from_slice(&from_elements(&shard.expect("reconstructed data shard")));
    }

    if stream.len() < 8 {
        return Err(TurbineError::BadFrame);
    }
    let block_len = u64::from_le_bytes(stream[..8].try_into().expect("8 bytes")) as usize;
    if stream.len() < 8 + block_len {
        return Err(TurbineError::BadFrame);
    }
    Ok(Block::from_wire_bytes(&stream[8..8 + block_len])?)
}
