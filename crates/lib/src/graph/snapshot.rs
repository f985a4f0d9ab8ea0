//! Detaching graph content into plain values.

use crate::{
    graph::{
        NodeArena, NodeId,
        node::{Items, NodeKind, Slot},
    },
    value::{List, Map, Object, Value},
};

impl NodeArena {
    /// Copies the content of a node into a [`Value`].
    ///
    /// References become [`Value::Reference`] of the target's identity. Tombstones are
    /// kept when `keep_tombstones` is set, which is what documents need; copies made to
    /// seed a derived graph drop them.
    pub fn snapshot(&self, node: NodeId, keep_tombstones: bool) -> Value {
        let Ok(n) = self.get(node) else {
            return Value::Null;
        };
        match &n.kind {
            NodeKind::Member(m) => self.snapshot_slot(&m.slot, keep_tombstones),
            NodeKind::Object(o) => {
                let mut object = Object::new(&o.type_name);
                object.set_id(o.identity);
                for member in &o.members {
                    if let Ok(Some(m)) = self.get(*member).map(|n| n.as_member()) {
                        object.set(&m.name, self.snapshot_slot(&m.slot, keep_tombstones));
                    }
                }
                Value::Object(object)
            }
            NodeKind::Collection(c) => {
                let mut ids = c.ids.clone();
                if !keep_tombstones {
                    ids.clear_deleted();
                }
                match &c.items {
                    Items::Sequence(items) => Value::List(List::from_parts(
                        items
                            .iter()
                            .map(|slot| self.snapshot_slot(slot, keep_tombstones))
                            .collect(),
                        ids,
                    )),
                    Items::Dictionary(entries) => Value::Map(Map::from_parts(
                        entries
                            .iter()
                            .map(|(key, slot)| {
                                (key.clone(), self.snapshot_slot(slot, keep_tombstones))
                            })
                            .collect(),
                        ids,
                    )),
                }
            }
        }
    }

    /// Copies the content of one slot.
    pub fn snapshot_slot(&self, slot: &Slot, keep_tombstones: bool) -> Value {
        match slot {
            Slot::Owned(target) => self.snapshot(*target, keep_tombstones),
            Slot::Reference(target) => self
                .get(*target)
                .ok()
                .and_then(|n| n.identity())
                .map(Value::Reference)
                .unwrap_or(Value::Null),
            scalar => scalar.scalar_value().unwrap_or(Value::Null),
        }
    }
}
