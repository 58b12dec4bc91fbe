use anneal_primitives::{
    sha256, CodecError, CryptoError, Decodable, Encodable, Hash32, Keypair, PublicKey, Reader,
    Signature, Writer,
};

use crate::{poh::PohEntry, transaction::Transaction};

/// A produced block.
///
/// Immutable once signed; the vote set collected at finalization is stored
/// alongside the block by the ledger, not inside it, so the canonical wire
/// bytes never change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Strictly increasing height, parent height + 1.
    pub height: u64,
    /// Hash of the parent block's wire bytes.
    pub parent_hash: Hash32,
    /// Producer public key; must match the leader schedule for `slot`.
    pub producer: PublicKey,
    pub slot: u64,
    pub timestamp_ns: u64,
    /// Ordered transactions, the order the PoH chain locks in.
    pub transactions: Vec<Transaction>,
    /// Full PoH sequence for the slot, seeded from `parent_hash`.
    pub poh: Vec<PohEntry>,
    /// Executor output over `transactions` applied to the parent state.
    pub state_root: Hash32,
    /// Producer signature over all preceding fields.
    pub signature: Signature,
}

impl Block {
    /// Bytes the producer signs: the full canonical encoding minus the
    /// signature.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.encode_unsigned(&mut w);
        w.into_vec()
    }

    fn encode_unsigned(&self, w: &mut Writer) {
        w.put_u64(self.height);
        w.put_hash(&self.parent_hash);
        w.put_bytes(self.producer.as_bytes());
        w.put_u64(self.slot);
        w.put_u64(self.timestamp_ns);
        w.put_u32(self.transactions.len() as u32);
        for tx in &self.transactions {
            w.put_var_bytes(&tx.to_wire_bytes());
        }
        w.put_u32(self.poh.len() as u32);
        for entry in &self.poh {
            entry.encode(w);
        }
        w.put_hash(&self.state_root);
    }

    /// Sign the assembled fields with the producer key.
    pub fn sign(&mut self, keypair: &Keypair) {
        self.signature = keypair.sign(&self.signing_bytes());
    }

    /// Verify the producer signature.
    pub fn verify_signature(&self) -> Result<(), CryptoError> {
        self.producer.verify(&self.signing_bytes(), &self.signature)
    }

    /// The block hash: SHA-256 of the complete canonical encoding,
    /// signature included. Used as parent linkage, PoH seed for the next
    /// slot, and the shred/vote block reference.
    pub fn hash(&self) -> Hash32 {
        sha256(&self.to_wire_bytes())
    }
}

impl Encodable for Block {
    fn encode(&self, w: &mut Writer) {
        self.encode_unsigned(w);
        w.put_bytes(self.signature.as_bytes());
    }
}

impl Decodable for Block {
    fn decode(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let height = r.u64()?;
        let parent_hash = r.hash()?;
        let producer = PublicKey::from_bytes(r.array::<33>()?);
        let slot = r.u64()?;
        let timestamp_ns = r.u64()?;
        let tx_count = r.u32()? as usize;
        let mut transactions = Vec::with_capacity(tx_count.min(1024));
        for _ in 0..tx_count {
            let raw = r.var_bytes()?;
            transactions.push(Transaction::from_wire_bytes(raw)?);
        }
        let poh_count = r.u32()? as usize;
        let mut poh = Vec::with_capacity(poh_count.min(65_536));
        for _ in 0..poh_count {
            poh.push(PohEntry::decode(r)?);
        }
        let state_root = r.hash()?;
        let signature = Signature::from_bytes(r.array::<64>()?);
        Ok(Self {
            height,
            parent_hash,
            producer,
            slot,
            timestamp_ns,
            transactions,
            poh,
            state_root,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use anneal_primitives::Keypair;

    use super::*;
    use crate::transaction::TxKind;

    fn make_block(keypair: &Keypair, tx_count: usize) -> Block {
        let transactions: Vec<_> = (0..tx_count)
            .map(|i| {
                Transaction::new_signed(
                    keypair,
                    Keypair::generate().public_key(),
                    10 + i as u64,
                    TxKind::Transfer,
                    i as u128,
                    5,
                    Hash32::new([9; 32]),
                )
            })
            .collect();
        let poh = transactions
            .iter()
            .map(|tx| PohEntry {
                hash: Hash32::new([4; 32]),
                digest: Some(tx.digest()),
            })
            .collect();
        let mut block = Block {
            height: 3,
            parent_hash: Hash32::new([1; 32]),
            producer: keypair.public_key(),
            slot: 12,
            timestamp_ns: 77,
            transactions,
            poh,
            state_root: Hash32::new([2; 32]),
            signature: Signature::default(),
        };
        block.sign(keypair);
        block
    }

    #[test]
    fn serialize_deserialize_serialize_is_identity() {
        let kp = Keypair::generate();
        let block = make_block(&kp, 3);
        let bytes = block.to_wire_bytes();
        let back = Block::from_wire_bytes(&bytes).unwrap();
        assert_eq!(back, block);
        assert_eq!(back.to_wire_bytes(), bytes);
        assert_eq!(back.hash(), block.hash());
    }

    #[test]
    fn signature_covers_every_field() {
        let kp = Keypair::generate();
        let block = make_block(&kp, 1);
        block.verify_signature().unwrap();

        let mut tampered = block.clone();
        tampered.state_root = Hash32::new([0xff; 32]);
        assert!(tampered.verify_signature().is_err());

        let mut tampered = block;
        tampered.slot += 1;
        assert!(tampered.verify_signature().is_err());
    }

    #[test]
    fn empty_block_round_trips() {
        let kp = Keypair::generate();
        let block = make_block(&kp, 0);
        let back = Block::from_wire_bytes(&block.to_wire_bytes()).unwrap();
        assert!(back.transactions.is_empty());
        assert_eq!(back, block);
    }
}
