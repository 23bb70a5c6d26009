//! Ordered collections of registry nodes

use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::debug;

use super::{Node, NodeRef, ObjId, Registry};
use crate::error::{CoreError, Result};
use crate::undo::Command;

/// A named, ordered sequence of variables and objects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseCollection {
    name: String,
    items: Vec<NodeRef>,
}

impl BaseCollection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn items(&self) -> &[NodeRef] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    // Index past the end appends.
    pub(crate) fn insert_at(&mut self, index: usize, item: NodeRef) {
        let index = index.min(self.items.len());
        self.items.insert(index, item);
    }

    pub(crate) fn remove_at(&mut self, index: usize) -> Result<NodeRef> {
        self.check_index(index)?;
        Ok(self.items.remove(index))
    }

    pub(crate) fn set_at(&mut self, index: usize, item: NodeRef) -> Result<NodeRef> {
        self.check_index(index)?;
        Ok(std::mem::replace(&mut self.items[index], item))
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.items.len() {
            Ok(())
        } else {
            Err(CoreError::IndexOutOfRange {
                index,
                len: self.items.len(),
            })
        }
    }
}

impl Registry {
    /// Register a collection holding `items`
    pub fn create_collection(&mut self, name: &str, items: Vec<NodeRef>) -> Result<ObjId> {
        for item in &items {
            self.check_node(*item)?;
        }
        let id = ObjId(self.next_id());
        debug!(id = %id, name, len = items.len(), "registered collection");
        self.nodes.insert(
            id,
            Node::Collection(BaseCollection {
                name: name.to_string(),
                items,
            }),
        );
        Ok(id)
    }

    pub fn collection(&self, id: ObjId) -> Result<&BaseCollection> {
        match self.node(id)? {
            Node::Collection(c) => Ok(c),
            Node::Object(o) => Err(CoreError::ObjectNotFound(format!(
                "{id} ('{}') is not a collection",
                o.name()
            ))),
        }
    }

    pub(crate) fn collection_mut(&mut self, id: ObjId) -> Result<&mut BaseCollection> {
        match self.nodes.get_mut(&id) {
            Some(Node::Collection(c)) => Ok(c),
            Some(Node::Object(_)) => Err(CoreError::ObjectNotFound(format!("{id} is not a collection"))),
            None => Err(CoreError::ObjectNotFound(id.to_string())),
        }
    }

    /// Insert `item` before `index`; an index past the end appends
    ///
    /// # Returns
    ///
    /// The position the item landed at
    pub fn insert(&mut self, collection: ObjId, index: usize, item: NodeRef) -> Result<usize> {
        self.check_acyclic(collection, item)?;
        let coll = self.collection_mut(collection)?;
        let index = index.min(coll.len());
        coll.insert_at(index, item);
        self.stack.push(Command::Insert {
            collection,
            index,
            item,
        });
        Ok(index)
    }

    pub fn push(&mut self, collection: ObjId, item: NodeRef) -> Result<usize> {
        self.insert(collection, usize::MAX, item)
    }

    pub fn remove(&mut self, collection: ObjId, index: usize) -> Result<NodeRef> {
        let item = self.collection_mut(collection)?.remove_at(index)?;
        self.stack.push(Command::Remove {
            collection,
            index,
            item,
        });
        Ok(item)
    }

    /// Overwrite the item at `index`, returning the old one
    pub fn set_item(&mut self, collection: ObjId, index: usize, item: NodeRef) -> Result<NodeRef> {
        self.check_acyclic(collection, item)?;
        let old = self.collection_mut(collection)?.set_at(index, item)?;
        self.stack.push(Command::SetItem {
            collection,
            index,
            old,
            new: item,
        });
        Ok(old)
    }

    pub fn item(&self, collection: ObjId, index: usize) -> Result<NodeRef> {
        let coll = self.collection(collection)?;
        coll.items().get(index).copied().ok_or(CoreError::IndexOutOfRange {
            index,
            len: coll.len(),
        })
    }

    pub fn items(&self, collection: ObjId) -> Result<&[NodeRef]> {
        Ok(self.collection(collection)?.items())
    }

    pub fn collection_len(&self, collection: ObjId) -> Result<usize> {
        Ok(self.collection(collection)?.len())
    }

    /// Register a new collection holding `range` of an existing one; the
    /// items are shared, not copied
    pub fn slice(&mut self, collection: ObjId, range: Range<usize>) -> Result<ObjId> {
        let coll = self.collection(collection)?;
        let len = coll.len();
        let items = coll
            .items()
            .get(range.clone())
            .ok_or(CoreError::IndexOutOfRange {
                index: range.end,
                len,
            })?
            .to_vec();
        let name = coll.name().to_string();
        self.create_collection(&name, items)
    }

    /// All items whose name is `name`
    pub fn find_by_name(&self, collection: ObjId, name: &str) -> Result<Vec<NodeRef>> {
        let mut found = Vec::new();
        for item in self.items(collection)? {
            if self.node_name(*item)? == name {
                found.push(*item);
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{RegistryConfig, VarId};
    use crate::variables::Parameter;

    fn params(registry: &mut Registry, names: &[&str]) -> Vec<VarId> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| registry.add_parameter(Parameter::new(name, i as f64)))
            .collect()
    }

    fn refs(ids: &[VarId]) -> Vec<NodeRef> {
        ids.iter().copied().map(NodeRef::from).collect()
    }

    #[test]
    fn test_insert_remove_set() {
        let mut registry = Registry::new();
        let p = params(&mut registry, &["a", "b", "c", "d"]);
        let coll = registry
            .create_collection("peaks", vec![p[0].into(), p[1].into()])
            .unwrap();

        assert_eq!(registry.insert(coll, 1, p[2].into()).unwrap(), 1);
        assert_eq!(registry.insert(coll, 99, p[3].into()).unwrap(), 3);
        assert_eq!(
            registry.items(coll).unwrap(),
            refs(&[p[0], p[2], p[1], p[3]])
        );

        assert_eq!(registry.remove(coll, 0).unwrap(), NodeRef::Variable(p[0]));
        assert_eq!(registry.set_item(coll, 0, p[0].into()).unwrap(), NodeRef::Variable(p[2]));
        assert_eq!(registry.item(coll, 0).unwrap(), NodeRef::Variable(p[0]));
        assert_eq!(registry.collection_len(coll).unwrap(), 3);

        assert!(matches!(
            registry.item(coll, 3),
            Err(CoreError::IndexOutOfRange { index: 3, len: 3 })
        ));
        assert!(registry.remove(coll, 7).is_err());
    }

    #[test]
    fn test_slice_and_find() {
        let mut registry = Registry::new();
        let p = params(&mut registry, &["a", "b", "a"]);
        let obj = registry.create_object("a", vec![]).unwrap();
        let coll = registry
            .create_collection("all", vec![p[0].into(), p[1].into(), p[2].into(), obj.into()])
            .unwrap();

        assert_eq!(registry.find_by_name(coll, "a").unwrap().len(), 3);
        let sub = registry.slice(coll, 1..3).unwrap();
        assert_eq!(registry.items(sub).unwrap(), refs(&[p[1], p[2]]));
        assert!(registry.slice(coll, 2..9).is_err());
        assert_eq!(registry.get_parameters(sub.into()).unwrap(), vec![p[1], p[2]]);
    }

    #[test]
    fn test_collection_undo() {
        let mut registry = Registry::with_config(RegistryConfig::default().with_undo(true));
        let p = params(&mut registry, &["a", "b"]);
        let coll = registry.create_collection("items", vec![p[0].into()]).unwrap();

        registry.push(coll, p[1].into()).unwrap();
        registry.remove(coll, 0).unwrap();
        assert_eq!(registry.items(coll).unwrap(), refs(&[p[1]]));

        registry.undo().unwrap();
        assert_eq!(registry.items(coll).unwrap(), refs(&[p[0], p[1]]));
        registry.undo().unwrap();
        assert_eq!(registry.items(coll).unwrap(), refs(&[p[0]]));
        registry.redo().unwrap();
        assert_eq!(registry.collection_len(coll).unwrap(), 2);
    }

    #[test]
    fn test_object_is_not_collection() {
        let mut registry = Registry::new();
        let obj = registry.create_object("obj", vec![]).unwrap();
        assert!(registry.collection(obj).is_err());
        let coll = registry.create_collection("coll", vec![]).unwrap();
        assert!(registry.object(coll).is_err());
        assert!(registry.collection(coll).unwrap().is_empty());
    }
}
