use anneal_primitives::{CodecError, Decodable, Encodable, Hash32, Reader, Writer};

/// One entry of the PoH hash chain.
///
/// The chain invariant is `entry[i].hash = H(entry[i-1].hash || digest)`
/// where `digest` is the ingested transaction digest, or empty for a tick.
/// The sequence index is the entry's position within the slot's chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PohEntry {
    /// Running chain value at this entry.
    pub hash: Hash32,
    /// Digest of the transaction mixed in, `None` for a tick.
    pub digest: Option<Hash32>,
}

impl PohEntry {
    pub fn is_tick(&self) -> bool {
        self.digest.is_none()
    }
}

impl Encodable for PohEntry {
    fn encode(&self, w: &mut Writer) {
        w.put_hash(&self.hash);
        match &self.digest {
            None => w.put_u8(0),
            Some(digest) => {
                w.put_u8(1);
                w.put_hash(digest);
            }
        }
    }
}

impl Decodable for PohEntry {
    fn decode(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let hash = r.hash()?;
        let digest = match r.u8()? {
            0 => None,
            1 => Some(r.hash()?),
            tag => return Err(CodecError::InvalidTag { ty: "poh flag", tag }),
        };
        Ok(Self { hash, digest })
    }
}
