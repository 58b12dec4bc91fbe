use anneal_primitives::{
    CodecError, CryptoError, Decodable, Encodable, Hash32, Keypair, PublicKey, Reader, Signature,
    Writer,
};

/// Whether a shred carries block bytes or erasure-code recovery bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShredKind {
    Data,
    Recovery,
}

impl ShredKind {
    pub fn as_u8(&self) -> u8 {
        match self {
            ShredKind::Data => 0,
            ShredKind::Recovery => 1,
        }
    }

    pub fn from_u8(tag: u8) -> Result<Self, CodecError> {
        match tag {
            0 => Ok(ShredKind::Data),
            1 => Ok(ShredKind::Recovery),
            tag => Err(CodecError::InvalidTag {
                ty: "shred kind",
                tag,
            }),
        }
    }
}

/// A fixed-size fragment of a serialized block.
///
/// Data shreds index `0..total_data`; recovery shreds continue at
/// `total_data..total_data + total_recovery`. Any `total_data` of the
/// combined set reconstruct the block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shred {
    pub kind: ShredKind,
    pub block_hash: Hash32,
    pub index: u32,
    pub total_data: u32,
    pub total_recovery: u32,
    /// Shard bytes; at most the configured payload size (1280).
    pub payload: Vec<u8>,
    pub producer_signature: Signature,
}

impl Shred {
    /// Bytes the producer signs: header plus payload.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(self.payload.len() + 80);
        self.encode_unsigned(&mut w);
        w.into_vec()
    }

    fn encode_unsigned(&self, w: &mut Writer) {
        w.put_u8(self.kind.as_u8());
        w.put_hash(&self.block_hash);
        w.put_u32(self.index);
        w.put_u32(self.total_data);
        w.put_u32(self.total_recovery);
        w.put_u16(self.payload.len() as u16);
        w.put_bytes(&self.payload);
    }

    pub fn sign(&mut self, keypair: &Keypair) {
        self.producer_signature = keypair.sign(&self.signing_bytes());
    }

    pub fn verify_signature(&self, producer: &PublicKey) -> Result<(), CryptoError> {
        producer.verify(&self.signing_bytes(), &self.producer_signature)
    }
}

impl Encodable for Shred {
    fn encode(&self, w: &mut Writer) {
        self.encode_unsigned(w);
        w.put_bytes(self.producer_signature.as_bytes());
    }
}

impl Decodable for Shred {
    fn decode(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let kind = ShredKind::from_u8(r.u8()?)?;
        let block_hash = r.hash()?;
        let index = r.u32()?;
        let total_data = r.u32()?;
        let total_recovery = r.u32()?;
        let payload_len = r.u16()? as usize;
        let payload = r.bytes(payload_len)?.to_vec();
        let producer_signature = Signature::from_bytes(r.array::<64>()?);
        Ok(Self {
            kind,
            block_hash,
            index,
            total_data,
            total_recovery,
            payload,
            producer_signature,
        })
    }
}
