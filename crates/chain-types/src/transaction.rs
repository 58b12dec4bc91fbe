use anneal_primitives::{
    sha256, CodecError, CryptoError, Decodable, Encodable, Hash32, Keypair, PublicKey, Reader,
    Signature, Writer,
};
use thiserror::Error;

use crate::account::stake_pool_key;

/// Transaction kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    Transfer,
    Stake,
    Unstake,
    Exchange,
}

impl TxKind {
    pub fn as_u8(&self) -> u8 {
        match self {
            TxKind::Transfer => 0,
            TxKind::Stake => 1,
            TxKind::Unstake => 2,
            TxKind::Exchange => 3,
        }
    }

    pub fn from_u8(tag: u8) -> Result<Self, CodecError> {
        match tag {
            0 => Ok(TxKind::Transfer),
            1 => Ok(TxKind::Stake),
            2 => Ok(TxKind::Unstake),
            3 => Ok(TxKind::Exchange),
            tag => Err(CodecError::InvalidTag { ty: "tx kind", tag }),
        }
    }
}

/// A signed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub sender: PublicKey,
    pub receiver: PublicKey,
    pub amount: u64,
    pub kind: TxKind,
    /// Unique id; duplicates within the blockhash window are rejected.
    pub id: u128,
    pub timestamp_ns: u64,
    /// Must resolve to a block within the last
    /// [`blockhash_window_slots`](anneal_params::Params::blockhash_window_slots)
    /// slots.
    pub recent_blockhash: Hash32,
    pub signature: Signature,
}

/// Why a transaction failed signature validation.
#[derive(Debug, Error)]
pub enum TxError {
    #[error("bad signature: {0}")]
    BadSignature(#[from] CryptoError),
}

impl Transaction {
    /// Build and sign a transaction with the sender keypair.
    pub fn new_signed(
        keypair: &Keypair,
        receiver: PublicKey,
        amount: u64,
        kind: TxKind,
        id: u128,
        timestamp_ns: u64,
        recent_blockhash: Hash32,
    ) -> Self {
        let mut tx = Self {
            sender: keypair.public_key(),
            receiver,
            amount,
            kind,
            id,
            timestamp_ns,
            recent_blockhash,
            signature: Signature::default(),
        };
        tx.signature = keypair.sign(&tx.signing_bytes());
        tx
    }

    /// The bytes the sender signs: every field except the signature.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.encode_unsigned(&mut w);
        w.into_vec()
    }

    fn encode_unsigned(&self, w: &mut Writer) {
        w.put_bytes(self.sender.as_bytes());
        w.put_bytes(self.receiver.as_bytes());
        w.put_u64(self.amount);
        w.put_u8(self.kind.as_u8());
        w.put_u128(self.id);
        w.put_u64(self.timestamp_ns);
        w.put_hash(&self.recent_blockhash);
    }

    /// Verify the sender's signature over the payload.
    pub fn verify_signature(&self) -> Result<(), TxError> {
        self.sender
            .verify(&self.signing_bytes(), &self.signature)?;
        Ok(())
    }

    /// Digest ingested into the PoH chain for this transaction.
    pub fn digest(&self) -> Hash32 {
        sha256(&self.to_wire_bytes())
    }

    /// The (debit, credit) account pair this transaction moves `amount`
    /// between. Stake flows route through the reserved stake pool account.
    pub fn effective_transfer(&self) -> (PublicKey, PublicKey) {
        match self.kind {
            TxKind::Transfer | TxKind::Exchange => (self.sender, self.receiver),
            TxKind::Stake => (self.sender, stake_pool_key()),
            TxKind::Unstake => (stake_pool_key(), self.sender),
        }
    }
}

impl Encodable for Transaction {
    fn encode(&self, w: &mut Writer) {
        self.encode_unsigned(w);
        w.put_bytes(self.signature.as_bytes());
    }
}

impl Decodable for Transaction {
    fn decode(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let sender = PublicKey::from_bytes(r.array::<33>()?);
        let receiver = PublicKey::from_bytes(r.array::<33>()?);
        let amount = r.u64()?;
        let kind = TxKind::from_u8(r.u8()?)?;
        let id = r.u128()?;
        let timestamp_ns = r.u64()?;
        let recent_blockhash = r.hash()?;
        let signature = Signature::from_bytes(r.array::<64>()?);
        Ok(Self {
            sender,
            receiver,
            amount,
            kind,
            id,
            timestamp_ns,
            recent_blockhash,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use anneal_primitives::Keypair;

    use super::*;

    fn make_tx(kind: TxKind) -> (Keypair, Transaction) {
        let kp = Keypair::generate();
        let receiver = Keypair::generate().public_key();
        let tx = Transaction::new_signed(&kp, receiver, 25, kind, 7, 1_000, Hash32::ZERO);
        (kp, tx)
    }

    #[test]
    fn signature_verifies() {
        let (_, tx) = make_tx(TxKind::Transfer);
        tx.verify_signature().unwrap();
    }

    #[test]
    fn tampered_amount_fails_verification() {
        let (_, mut tx) = make_tx(TxKind::Transfer);
        tx.amount += 1;
        assert!(tx.verify_signature().is_err());
    }

    #[test]
    fn wire_round_trip() {
        let (_, tx) = make_tx(TxKind::Exchange);
        let bytes = tx.to_wire_bytes();
        let back = Transaction::from_wire_bytes(&bytes).unwrap();
        assert_eq!(back, tx);
        assert_eq!(back.to_wire_bytes(), bytes);
    }

    #[test]
    fn stake_routes_through_pool() {
        let (kp, tx) = make_tx(TxKind::Stake);
        assert_eq!(tx.effective_transfer(), (kp.public_key(), stake_pool_key()));
        let (kp, tx) = make_tx(TxKind::Unstake);
        assert_eq!(tx.effective_transfer(), (stake_pool_key(), kp.public_key()));
    }

    #[test]
    fn unknown_kind_tag_rejected() {
        assert!(matches!(
            TxKind::from_u8(9),
            Err(CodecError::InvalidTag { tag: 9, .. })
        ));
    }
}
