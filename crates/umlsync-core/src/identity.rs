//! Identity Map: bidirectional durable <-> canvas id table for one session.
//!
//! Two hash maps kept in lockstep. Every mutation touches both directions
//! or neither, so a lookup in one direction never finds an entry the other
//! direction has forgotten.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::ids::{CanvasId, DurableId};

/// Canvas ids of the three members of an intermediate construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstructIds {
    pub direct_link: CanvasId,
    pub dashed_link: CanvasId,
    pub intermediate_class: CanvasId,
}

impl ConstructIds {
    pub fn members(&self) -> [CanvasId; 3] {
        [self.direct_link, self.dashed_link, self.intermediate_class]
    }
}

/// Value side of an Identity Map entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Single(CanvasId),
    Construct(ConstructIds),
}

impl Binding {
    /// The canvas id the durable id itself stands for.
    ///
    /// For a construct this is the direct link.
    pub fn primary(&self) -> CanvasId {
        match self {
            Binding::Single(id) => *id,
            Binding::Construct(ids) => ids.direct_link,
        }
    }

    fn canvas_ids(&self) -> Vec<CanvasId> {
        match self {
            Binding::Single(id) => vec![*id],
            Binding::Construct(ids) => ids.members().to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("durable id {0} is already bound")]
    AlreadyBound(DurableId),
    #[error("canvas id {canvas} is already bound to {durable}")]
    CanvasAlreadyBound { canvas: CanvasId, durable: DurableId },
    #[error("construct members must be three distinct canvas ids")]
    IncompleteConstruct,
}

#[derive(Debug, Default, Clone)]
pub struct IdentityMap {
    forward: HashMap<DurableId, Binding>,
    reverse: HashMap<CanvasId, DurableId>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a class or a simple link
    pub fn bind(&mut self, durable: DurableId, canvas: CanvasId) -> Result<(), IdentityError> {
        self.insert(durable, Binding::Single(canvas))
    }

    /// Bind all three members of a construct under the association id
    pub fn bind_construct(&mut self, association: DurableId, ids: ConstructIds) -> Result<(), IdentityError> {
        let [a, b, c] = ids.members();
        if a == b || b == c || a == c {
            return Err(IdentityError::IncompleteConstruct);
        }
        self.insert(association, Binding::Construct(ids))
    }

    fn insert(&mut self, durable: DurableId, binding: Binding) -> Result<(), IdentityError> {
        if self.forward.contains_key(&durable) {
            return Err(IdentityError::AlreadyBound(durable));
        }
        let canvas_ids = binding.canvas_ids();
        if let Some((canvas, owner)) = canvas_ids
            .iter()
            .find_map(|c| self.reverse.get(c).map(|d| (*c, d.clone())))
        {
            return Err(IdentityError::CanvasAlreadyBound { canvas, durable: owner });
        }

        debug!(%durable, ?binding, "bind");
        for canvas in canvas_ids {
            self.reverse.insert(canvas, durable.clone());
        }
        self.forward.insert(durable, binding);
        Ok(())
    }

    /// Durable id for a canvas element; construct members resolve to the
    /// association id.
    pub fn durable_of(&self, canvas: CanvasId) -> Option<&DurableId> {
        self.reverse.get(&canvas)
    }

    pub fn ephemeral_of(&self, durable: &DurableId) -> Option<CanvasId> {
        self.forward.get(durable).map(Binding::primary)
    }

    pub fn binding(&self, durable: &DurableId) -> Option<&Binding> {
        self.forward.get(durable)
    }

    pub fn construct_of(&self, association: &DurableId) -> Option<ConstructIds> {
        match self.forward.get(association)? {
            Binding::Construct(ids) => Some(*ids),
            Binding::Single(_) => None,
        }
    }

    /// Remove an entry in both directions, returning what it was bound to
    pub fn unbind(&mut self, durable: &DurableId) -> Option<Binding> {
        let binding = self.forward.remove(durable)?;
        for canvas in binding.canvas_ids() {
            self.reverse.remove(&canvas);
        }
        debug!(%durable, "unbind");
        Some(binding)
    }

    /// True when `association` has a complete composite entry
    pub fn is_ready(&self, association: &DurableId) -> bool {
        self.construct_of(association).is_some()
    }

    pub fn contains(&self, durable: &DurableId) -> bool {
        self.forward.contains_key(durable)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DurableId, &Binding)> {
        self.forward.iter()
    }

    pub fn clear(&mut self) {
        self.forward.clear();
        self.reverse.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn construct_ids() -> ConstructIds {
        ConstructIds {
            direct_link: CanvasId::new(),
            dashed_link: CanvasId::new(),
            intermediate_class: CanvasId::new(),
        }
    }

    #[test]
    fn bind_and_lookup_both_ways() {
        let mut map = IdentityMap::new();
        let canvas = CanvasId::new();
        map.bind("c1".into(), canvas).unwrap();

        assert_eq!(map.ephemeral_of(&"c1".into()), Some(canvas));
        assert_eq!(map.durable_of(canvas), Some(&DurableId::from("c1")));
    }

    #[test]
    fn unbind_removes_both_directions() {
        let mut map = IdentityMap::new();
        let canvas = CanvasId::new();
        map.bind("c1".into(), canvas).unwrap();
        assert_eq!(map.unbind(&"c1".into()), Some(Binding::Single(canvas)));

        assert_eq!(map.ephemeral_of(&"c1".into()), None);
        assert_eq!(map.durable_of(canvas), None);
        assert!(map.is_empty());
        assert_eq!(map.unbind(&"c1".into()), None);
    }

    #[test]
    fn rebinding_is_refused() {
        let mut map = IdentityMap::new();
        let canvas = CanvasId::new();
        map.bind("c1".into(), canvas).unwrap();

        assert_eq!(
            map.bind("c1".into(), CanvasId::new()),
            Err(IdentityError::AlreadyBound("c1".into()))
        );
        assert!(matches!(
            map.bind("c2".into(), canvas),
            Err(IdentityError::CanvasAlreadyBound { .. })
        ));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn construct_members_resolve_to_association() {
        let mut map = IdentityMap::new();
        let ids = construct_ids();
        map.bind_construct("assoc".into(), ids).unwrap();

        for member in ids.members() {
            assert_eq!(map.durable_of(member), Some(&DurableId::from("assoc")));
        }
        assert_eq!(map.ephemeral_of(&"assoc".into()), Some(ids.direct_link));
        assert!(map.is_ready(&"assoc".into()));
        assert_eq!(map.len(), 1);

        map.unbind(&"assoc".into());
        for member in ids.members() {
            assert_eq!(map.durable_of(member), None);
        }
        assert!(!map.is_ready(&"assoc".into()));
    }

    #[test]
    fn partial_construct_is_refused() {
        let mut map = IdentityMap::new();
        let shared = CanvasId::new();
        let ids = ConstructIds {
            direct_link: shared,
            dashed_link: shared,
            intermediate_class: CanvasId::new(),
        };
        assert_eq!(
            map.bind_construct("assoc".into(), ids),
            Err(IdentityError::IncompleteConstruct)
        );
        assert!(map.is_empty());
    }

    #[test]
    fn single_binding_is_not_a_ready_construct() {
        let mut map = IdentityMap::new();
        map.bind("l1".into(), CanvasId::new()).unwrap();
        assert!(!map.is_ready(&"l1".into()));
        assert_eq!(map.construct_of(&"l1".into()), None);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Bind(u8),
        Unbind(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![(0u8..16).prop_map(Op::Bind), (0u8..16).prop_map(Op::Unbind)]
    }

    proptest! {
        #[test]
        fn bijection_holds_under_any_sequence(ops in proptest::collection::vec(op(), 0..64)) {
            let mut map = IdentityMap::new();
            let mut unbound = Vec::new();

            for op in ops {
                match op {
                    Op::Bind(n) => {
                        let durable = DurableId::new(format!("d{n}"));
                        let _ = map.bind(durable, CanvasId::new());
                    }
                    Op::Unbind(n) => {
                        let durable = DurableId::new(format!("d{n}"));
                        if let Some(binding) = map.unbind(&durable) {
                            unbound.push((durable, binding.primary()));
                        }
                    }
                }
            }

            for (durable, binding) in map.iter() {
                let canvas = binding.primary();
                prop_assert_eq!(map.durable_of(canvas), Some(durable));
                prop_assert_eq!(map.ephemeral_of(durable), Some(canvas));
            }
            for (durable, canvas) in unbound {
                prop_assert_eq!(map.durable_of(canvas), None);
                if let Some(current) = map.ephemeral_of(&durable) {
                    prop_assert_ne!(current, canvas);
                }
            }
        }
    }
}
