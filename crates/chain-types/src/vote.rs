use anneal_primitives::{
    CodecError, CryptoError, Decodable, Encodable, Hash32, Keypair, PublicKey, Reader, Signature,
    Writer,
};

/// A validator's attestation that it re-executed a block and got the same
/// state root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vote {
    pub validator: PublicKey,
    pub slot: u64,
    pub block_hash: Hash32,
    /// The state root the voter computed locally.
    pub state_root: Hash32,
    pub signature: Signature,
}

impl Vote {
    pub fn new_signed(keypair: &Keypair, slot: u64, block_hash: Hash32, state_root: Hash32) -> Self {
        let mut vote = Self {
            validator: keypair.public_key(),
            slot,
            block_hash,
            state_root,
            signature: Signature::default(),
        };
        vote.signature = keypair.sign(&vote.signing_bytes());
        vote
    }

    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(105);
        self.encode_unsigned(&mut w);
        w.into_vec()
    }

    fn encode_unsigned(&self, w: &mut Writer) {
        w.put_bytes(self.validator.as_bytes());
        w.put_u64(self.slot);
        w.put_hash(&self.block_hash);
        w.put_hash(&self.state_root);
    }

    pub fn verify_signature(&self) -> Result<(), CryptoError> {
        self.validator.verify(&self.signing_bytes(), &self.signature)
    }
}

impl Encodable for Vote {
    fn encode(&self, w: &mut Writer) {
        self.encode_unsigned(w);
        w.put_bytes(self.signature.as_bytes());
    }
}

impl Decodable for Vote {
    fn decode(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let validator = PublicKey::from_bytes(r.array::<33>()?);
        let slot = r.u64()?;
        let block_hash = r.hash()?;
        let state_root = r.hash()?;
        let signature = Signature::from_bytes(r.array::<64>()?);
        Ok(Self {
            validator,
            slot,
            block_hash,
            state_root,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_and_verify() {
        let kp = Keypair::generate();
        let vote = Vote::new_signed(&kp, 9, Hash32::new([1; 32]), Hash32::new([2; 32]));
        vote.verify_signature().unwrap();
        let back = Vote::from_wire_bytes(&vote.to_wire_bytes()).unwrap();
        assert_eq!(back, vote);
    }

    #[test]
    fn forged_voter_fails() {
        let kp = Keypair::generate();
        let mut vote = Vote::new_signed(&kp, 9, Hash32::new([1; 32]), Hash32::new([2; 32]));
        vote.validator = Keypair::generate().public_key();
        assert!(vote.verify_signature().is_err());
    }
}
