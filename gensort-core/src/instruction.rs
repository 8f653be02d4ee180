//! Instructions: genome segments with a packed canonical form and a
//! lazily-decompressed working form.

use rand::Rng;

use gensort_machine::op;

use crate::codec;
use crate::mutation::Mutation;

/// One segment of a unit's genome.
///
/// Whichever of `packed`/`raw` was touched last is the source of truth;
/// the other is dropped and rebuilt on demand. `initial_op_set` is the
/// packed form at creation, kept for forensics and never updated.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub id: u64,
    pub unit_id: u64,
    pub age: u64,
    pub initial_op_set: Vec<u8>,
    packed: Option<Vec<u8>>,
    raw: Option<Vec<u8>>,
    /// Mutations applied in this generation; history lives in the store.
    pub mutations: Vec<Mutation>,
}

impl Instruction {
    /// Synthesize from `op_set_count` prefabs drawn uniformly from the
    /// catalog.
    pub fn random<R: Rng + ?Sized>(op_set_count: u64, rng: &mut R) -> Self {
        let mut ops = Vec::new();
        for _ in 0..op_set_count {
            let prefab = op::PREFAB_OPSETS[rng.gen_range(0..op::PREFAB_OPSETS.len())];
            ops.extend_from_slice(prefab.as_bytes());
        }
        Self::from_ops(&ops)
    }

    /// Build from a literal op sequence.
    pub fn from_ops(ops: &[u8]) -> Self {
        let packed = codec::pack(ops);
        Self {
            id: 0,
            unit_id: 0,
            age: 0,
            initial_op_set: packed.clone(),
            packed: Some(packed),
            raw: None,
            mutations: Vec::new(),
        }
    }

    /// Rehydrate from stored rows.
    pub fn from_stored(id: u64, unit_id: u64, age: u64, initial_op_set: Vec<u8>, packed: Vec<u8>) -> Self {
        Self {
            id,
            unit_id,
            age,
            initial_op_set,
            packed: Some(packed),
            raw: None,
            mutations: Vec::new(),
        }
    }

    /// The working form, decompressing and caching on first access.
    pub fn ops(&mut self) -> &[u8] {
        self.ensure_raw();
        self.raw.as_deref().unwrap()
    }

    /// Mutable working form. Marks the packed form stale.
    pub fn ops_mut(&mut self) -> &mut Vec<u8> {
        self.ensure_raw();
        self.packed = None;
        self.raw.as_mut().unwrap()
    }

    /// Length of the working form without forcing a second copy.
    pub fn ops_len(&mut self) -> usize {
        self.ops().len()
    }

    pub fn ensure_raw(&mut self) {
        if self.raw.is_none() {
            let packed = self
                .packed
                .as_deref()
                .expect("instruction has neither packed nor raw ops");
            self.raw = Some(codec::unpack(packed));
        }
    }

    /// Repack if a mutation invalidated the canonical form. Required
    /// before any persistence.
    pub fn ensure_packed(&mut self) {
        if self.packed.is_none() {
            let raw = self
                .raw
                .as_deref()
                .expect("instruction has neither packed nor raw ops");
            self.packed = Some(codec::pack(raw));
        }
    }

    /// The canonical packed bytes; call [`Self::ensure_packed`] first
    /// when a mutation may have run.
    pub fn packed(&self) -> Option<&[u8]> {
        self.packed.as_deref()
    }

    /// Child copy for mitosis: same genome, fresh identity, one more
    /// year on the clock, no mutation history.
    pub fn clone_for_child(&self) -> Self {
        Self {
            id: 0,
            unit_id: 0,
            age: self.age + 1,
            initial_op_set: self.initial_op_set.clone(),
            packed: self.packed.clone(),
            raw: self.raw.clone(),
            mutations: Vec::new(),
        }
    }
}
