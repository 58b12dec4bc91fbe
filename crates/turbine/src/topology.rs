use anneal_chain_types::ValidatorRecord;
use anneal_primitives::{sha256, PublicKey};

/// The stake-ordered distribution tree for one block.
///
/// The producing leader is the root and is excluded from the node list;
/// the first `fanout` remaining validators (by descending stake) form
/// layer 1, and each node at position `i` forwards to positions
/// `(i+1)*fanout .. (i+2)*fanout`. Depth is logarithmic in the validator
/// count.
#[derive(Debug, Clone)]
pub struct TurbineTree {
    nodes: Vec<ValidatorRecord>,
    fanout: usize,
}

impl TurbineTree {
    /// Build the tree for a block produced by `leader`. `validators` must
    /// already be stake-ordered (the registry's ordering).
    pub fn new(validators: Vec<ValidatorRecord>, leader: &PublicKey, fanout: usize) -> Self {
        let nodes = validators
            .into_iter()
            .filter(|rec| rec.key != *leader)
            .collect();
        Self {
            nodes,
            fanout: fanout.max(1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Layer 1: the validators the leader sends to directly.
    pub fn layer1(&self) -> &[ValidatorRecord] {
        &self.nodes[..self.fanout.min(self.nodes.len())]
    }

    /// The layer-1 validator responsible for a shred index: the hash of
    /// the index modulo the layer size. Different indices spread across
    /// different validators, so the leader uploads each byte once.
    pub fn root_target(&self, shred_index: u32) -> Option<&ValidatorRecord> {
        let layer = self.layer1();
        if layer.is_empty() {
            return None;
        }
        let digest = sha256(&shred_index.to_le_bytes());
        let draw = u64::from_le_bytes(digest.as_bytes()[..8].try_into().expect("8 bytes"));
        Some(&layer[(draw % layer.len() as u64) as usize])
    }

    /// The children `key` forwards received shreds to, empty for leaves
    /// and for keys outside the tree.
    pub fn children_of(&self, key: &PublicKey) -> &[ValidatorRecord] {
        let Some(pos) = self.nodes.iter().position(|rec| rec.key == *key) else {
            return &[];
        };
        let start = (pos + 1) * self.fanout;
        if start >= self.nodes.len() {
            return &[];
        }
        let end = (start + self.fanout).min(self.nodes.len());
        &self.nodes[start..end]
    }
}

#[cfg(test)]
mod tests {
    use anneal_primitives::Keypair;

    use super::*;

    fn validators(n: usize) -> Vec<ValidatorRecord> {
        let mut out: Vec<_> = (0..n)
            .map(|i| {
                ValidatorRecord::new(
                    Keypair::generate().public_key(),
                    1_000 - i as u64,
                    format!("127.0.0.1:{}", 10_000 + i).parse().unwrap(),
                )
            })
            .collect();
        out.sort_by(|a, b| b.stake.cmp(&a.stake));
        out
    }

    #[test]
    fn leader_is_excluded() {
        let vals = validators(5);
        let leader = vals[2].key;
        let tree = TurbineTree::new(vals, &leader, 2);
        assert_eq!(tree.len(), 4);
        assert!(tree.children_of(&leader).is_empty());
    }

    #[test]
    fn every_non_layer1_node_has_exactly_one_parent() {
        let vals = validators(23);
        let leader = Keypair::generate().public_key();
        let fanout = 3;
        let tree = TurbineTree::new(vals.clone(), &leader, fanout);

        let mut seen = vec![0usize; tree.len()];
        for rec in tree.layer1() {
            let pos = vals.iter().position(|v| v.key == rec.key).unwrap();
            seen[pos] += 1;
        }
        for parent in &vals {
            for child in tree.children_of(&parent.key) {
                let pos = vals.iter().position(|v| v.key == child.key).unwrap();
                seen[pos] += 1;
            }
        }
        assert!(seen.iter().all(|&count| count == 1), "coverage: {seen:?}");
    }

    #[test]
    fn root_target_is_deterministic_and_in_layer1() {
        let vals = validators(10);
        let leader = Keypair::generate().public_key();
        let tree = TurbineTree::new(vals, &leader, 4);
        for index in 0..50u32 {
            let a = tree.root_target(index).unwrap().key;
            let b = tree.root_target(index).unwrap().key;
            assert_eq!(a, b);
            assert!(tree.layer1().iter().any(|rec| rec.key == a));
        }
    }

    #[test]
    fn empty_tree_has_no_targets() {
        let leader = Keypair::generate().public_key();
        let tree = TurbineTree::new(vec![], &leader, 4);
        assert!(tree.root_target(0).is_none());
    }
}
