//! Named component containers
//!
//! A [`BaseObj`] maps keys to components in insertion order. Components are
//! references into the registry, so the same parameter may appear in several
//! objects; parameter discovery deduplicates them.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use super::{Node, NodeRef, ObjId, Registry, VarId, Variable};
use crate::constraints::ConstraintId;
use crate::error::{CoreError, Result};
use crate::undo::Command;

/// A named object with keyed components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseObj {
    name: String,
    components: Vec<(String, NodeRef)>,
}

impl BaseObj {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Components in insertion order
    pub fn components(&self) -> &[(String, NodeRef)] {
        &self.components
    }

    pub fn get(&self, key: &str) -> Option<NodeRef> {
        self.components
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, node)| *node)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(|(k, _)| k.as_str())
    }

    fn put(&mut self, key: &str, node: NodeRef) -> Option<NodeRef> {
        match self.components.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => Some(std::mem::replace(&mut entry.1, node)),
            None => {
                self.components.push((key.to_string(), node));
                None
            }
        }
    }

    fn take(&mut self, key: &str) -> Option<NodeRef> {
        let index = self.components.iter().position(|(k, _)| k == key)?;
        Some(self.components.remove(index).1)
    }
}

impl Registry {
    /// Register an object built from `components`
    ///
    /// # Errors
    ///
    /// * `DuplicateComponent` if a key appears twice
    /// * `VariableNotFound` / `ObjectNotFound` for unknown components
    ///
    /// # Examples
    ///
    /// ```
    /// use easycore::objects::Registry;
    /// use easycore::variables::Parameter;
    ///
    /// let mut registry = Registry::new();
    /// let amplitude = registry.add_parameter(Parameter::new("amplitude", 1.0));
    /// let phase = registry.add_parameter(Parameter::new("phase", 0.0));
    /// let sine = registry
    ///     .create_object("sine", vec![("amplitude", amplitude.into()), ("phase", phase.into())])
    ///     .unwrap();
    /// assert_eq!(registry.get_parameters(sine.into()).unwrap(), vec![amplitude, phase]);
    /// ```
    pub fn create_object(&mut self, name: &str, components: Vec<(&str, NodeRef)>) -> Result<ObjId> {
        let mut object = BaseObj {
            name: name.to_string(),
            components: Vec::with_capacity(components.len()),
        };
        for (key, node) in components {
            self.check_node(node)?;
            if object.get(key).is_some() {
                return Err(CoreError::DuplicateComponent(key.to_string()));
            }
            object.components.push((key.to_string(), node));
        }
        let id = ObjId(self.next_id());
        debug!(id = %id, name, "registered object");
        self.nodes.insert(id, Node::Object(object));
        Ok(id)
    }

    pub fn object(&self, id: ObjId) -> Result<&BaseObj> {
        match self.node(id)? {
            Node::Object(o) => Ok(o),
            Node::Collection(c) => Err(CoreError::ObjectNotFound(format!(
                "{id} ('{}') is a collection",
                c.name()
            ))),
        }
    }

    fn object_mut(&mut self, id: ObjId) -> Result<&mut BaseObj> {
        match self.nodes.get_mut(&id) {
            Some(Node::Object(o)) => Ok(o),
            Some(Node::Collection(_)) => Err(CoreError::ObjectNotFound(format!("{id} is a collection"))),
            None => Err(CoreError::ObjectNotFound(id.to_string())),
        }
    }

    /// An object or collection
    pub fn node(&self, id: ObjId) -> Result<&Node> {
        self.nodes
            .get(&id)
            .ok_or_else(|| CoreError::ObjectNotFound(id.to_string()))
    }

    /// Name of any node
    pub fn node_name(&self, node: NodeRef) -> Result<&str> {
        match node {
            NodeRef::Variable(id) => Ok(self.variable(id)?.name()),
            NodeRef::Object(id) => Ok(self.node(id)?.name()),
        }
    }

    pub(crate) fn check_node(&self, node: NodeRef) -> Result<()> {
        match node {
            NodeRef::Variable(id) => self.variable(id).map(|_| ()),
            NodeRef::Object(id) => self.node(id).map(|_| ()),
        }
    }

    // Adding `node` under `parent` must not make `parent` its own descendant.
    pub(crate) fn check_acyclic(&self, parent: ObjId, node: NodeRef) -> Result<()> {
        self.check_node(node)?;
        let mut stack = vec![node];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            let NodeRef::Object(id) = current else {
                continue;
            };
            if id == parent {
                return Err(CoreError::InvalidValue(format!(
                    "adding {node} to {parent} would create a cycle"
                )));
            }
            if seen.insert(id) {
                stack.extend(self.node(id)?.children());
            }
        }
        Ok(())
    }

    /// Add a new component
    ///
    /// # Errors
    ///
    /// `DuplicateComponent` if `key` is taken; use
    /// [`Registry::replace_component`] to swap it.
    pub fn add_component(&mut self, object: ObjId, key: &str, node: NodeRef) -> Result<()> {
        self.check_acyclic(object, node)?;
        if self.object(object)?.get(key).is_some() {
            return Err(CoreError::DuplicateComponent(key.to_string()));
        }
        self.put_component(object, key, node)?;
        self.stack.push(Command::SetComponent {
            object,
            key: key.to_string(),
            old: None,
            new: node,
        });
        Ok(())
    }

    /// Swap an existing component for another node, returning the old one
    pub fn replace_component(&mut self, object: ObjId, key: &str, node: NodeRef) -> Result<NodeRef> {
        self.check_acyclic(object, node)?;
        let old = self
            .object(object)?
            .get(key)
            .ok_or_else(|| CoreError::ComponentNotFound(key.to_string()))?;
        self.put_component(object, key, node)?;
        self.stack.push(Command::SetComponent {
            object,
            key: key.to_string(),
            old: Some(old),
            new: node,
        });
        Ok(old)
    }

    pub(crate) fn put_component(&mut self, object: ObjId, key: &str, node: NodeRef) -> Result<()> {
        self.object_mut(object)?.put(key, node);
        Ok(())
    }

    pub(crate) fn take_component(&mut self, object: ObjId, key: &str) -> Result<NodeRef> {
        self.object_mut(object)?
            .take(key)
            .ok_or_else(|| CoreError::ComponentNotFound(key.to_string()))
    }

    pub fn component(&self, object: ObjId, key: &str) -> Result<NodeRef> {
        self.object(object)?
            .get(key)
            .ok_or_else(|| CoreError::ComponentNotFound(key.to_string()))
    }

    fn component_variable(&self, object: ObjId, key: &str) -> Result<VarId> {
        match self.component(object, key)? {
            NodeRef::Variable(id) => Ok(id),
            NodeRef::Object(id) => Err(CoreError::NotNumeric(format!("{key} ({id}) is an object"))),
        }
    }

    /// Numeric value of a variable component
    pub fn component_value(&self, object: ObjId, key: &str) -> Result<f64> {
        self.value(self.component_variable(object, key)?)
    }

    /// Set the value of a variable component, running its constraints
    pub fn set_component_value(&mut self, object: ObjId, key: &str, value: f64) -> Result<f64> {
        let id = self.component_variable(object, key)?;
        self.set_value(id, value)
    }

    fn collect_variables(&self, node: NodeRef, keep: &dyn Fn(&Variable) -> bool) -> Result<Vec<VarId>> {
        let mut found = Vec::new();
        let mut seen_vars = HashSet::new();
        let mut seen_nodes = HashSet::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            match current {
                NodeRef::Variable(id) => {
                    if keep(self.variable(id)?) && seen_vars.insert(id) {
                        found.push(id);
                    }
                }
                NodeRef::Object(id) => {
                    if seen_nodes.insert(id) {
                        // reversed so children pop in order
                        stack.extend(self.node(id)?.children().into_iter().rev());
                    }
                }
            }
        }
        Ok(found)
    }

    /// Every parameter under `node`, depth first in component order
    pub fn get_parameters(&self, node: NodeRef) -> Result<Vec<VarId>> {
        self.collect_variables(node, &Variable::is_parameter)
    }

    /// Parameters under `node` a minimizer may vary: enabled and not fixed
    pub fn get_fit_parameters(&self, node: NodeRef) -> Result<Vec<VarId>> {
        self.collect_variables(node, &|v| v.as_parameter().is_some_and(|p| p.is_free()))
    }

    /// Every variable under `node`, descriptors included
    pub fn linkable_attributes(&self, node: NodeRef) -> Result<Vec<VarId>> {
        self.collect_variables(node, &|_| true)
    }

    /// User constraints attached to the parameters under `node`
    pub fn object_constraints(&self, node: NodeRef) -> Result<Vec<(VarId, String, ConstraintId)>> {
        let mut constraints = Vec::new();
        for id in self.get_parameters(node)? {
            for (key, cid) in self.user_constraints(id) {
                constraints.push((id, key.clone(), *cid));
            }
        }
        Ok(constraints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::Constraint;
    use crate::objects::RegistryConfig;
    use crate::variables::{Descriptor, Parameter};

    fn sine(registry: &mut Registry) -> (ObjId, VarId, VarId) {
        let amplitude = registry.add_parameter(Parameter::new("amplitude", 1.0));
        let phase = registry.add_parameter(Parameter::new("phase", 0.5));
        let obj = registry
            .create_object("sine", vec![("amplitude", amplitude.into()), ("phase", phase.into())])
            .unwrap();
        (obj, amplitude, phase)
    }

    #[test]
    fn test_create_and_lookup() {
        let mut registry = Registry::new();
        let (obj, amplitude, _) = sine(&mut registry);
        let object = registry.object(obj).unwrap();
        assert_eq!(object.name(), "sine");
        assert_eq!(object.keys().collect::<Vec<_>>(), vec!["amplitude", "phase"]);
        assert_eq!(registry.component(obj, "amplitude").unwrap(), NodeRef::Variable(amplitude));
        assert_eq!(registry.component_value(obj, "phase").unwrap(), 0.5);
        assert_eq!(registry.node_name(obj.into()).unwrap(), "sine");
        assert!(matches!(
            registry.component(obj, "missing"),
            Err(CoreError::ComponentNotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let mut registry = Registry::new();
        let a = registry.add_parameter(Parameter::new("a", 1.0));
        assert!(matches!(
            registry.create_object("obj", vec![("a", a.into()), ("a", a.into())]),
            Err(CoreError::DuplicateComponent(_))
        ));
        let (obj, _, _) = sine(&mut registry);
        assert!(registry.add_component(obj, "phase", a.into()).is_err());
    }

    #[test]
    fn test_nested_parameter_discovery() {
        let mut registry = Registry::new();
        let (inner, amplitude, phase) = sine(&mut registry);
        let scale = registry.add_parameter(Parameter::new("scale", 2.0).with_fixed(true));
        let label = registry.add_descriptor(Descriptor::new("label", "model"));
        let outer = registry
            .create_object(
                "model",
                vec![
                    ("scale", scale.into()),
                    ("label", label.into()),
                    ("sine", inner.into()),
                    // shared parameter is reported once
                    ("alias", amplitude.into()),
                ],
            )
            .unwrap();

        assert_eq!(
            registry.get_parameters(outer.into()).unwrap(),
            vec![scale, amplitude, phase]
        );
        assert_eq!(
            registry.get_fit_parameters(outer.into()).unwrap(),
            vec![amplitude, phase]
        );
        assert_eq!(registry.linkable_attributes(outer.into()).unwrap().len(), 4);
    }

    #[test]
    fn test_cycles_rejected() {
        let mut registry = Registry::new();
        let (inner, _, _) = sine(&mut registry);
        let outer = registry.create_object("outer", vec![("inner", inner.into())]).unwrap();
        assert!(registry.add_component(inner, "outer", outer.into()).is_err());
        assert!(registry.add_component(inner, "me", inner.into()).is_err());
    }

    #[test]
    fn test_component_changes_undo() {
        let mut registry = Registry::with_config(RegistryConfig::default().with_undo(true));
        let (obj, amplitude, _) = sine(&mut registry);
        let offset = registry.add_parameter(Parameter::new("offset", 0.0));
        let other = registry.add_parameter(Parameter::new("other", 3.0));

        registry.add_component(obj, "offset", offset.into()).unwrap();
        let old = registry.replace_component(obj, "amplitude", other.into()).unwrap();
        assert_eq!(old, NodeRef::Variable(amplitude));
        assert_eq!(registry.component_value(obj, "amplitude").unwrap(), 3.0);

        registry.undo().unwrap();
        assert_eq!(registry.component_value(obj, "amplitude").unwrap(), 1.0);
        registry.undo().unwrap();
        assert!(registry.component(obj, "offset").is_err());
        registry.redo().unwrap();
        assert_eq!(registry.component(obj, "offset").unwrap(), NodeRef::Variable(offset));
    }

    #[test]
    fn test_object_constraints() {
        let mut registry = Registry::new();
        let (obj, amplitude, phase) = sine(&mut registry);
        let c = registry
            .add_constraint(Constraint::object(phase, "0.5*", amplitude).unwrap())
            .unwrap();
        registry.attach_constraint(amplitude, "half", c).unwrap();

        registry.set_component_value(obj, "amplitude", 4.0).unwrap();
        assert_eq!(registry.component_value(obj, "phase").unwrap(), 2.0);
        assert_eq!(
            registry.object_constraints(obj.into()).unwrap(),
            vec![(amplitude, "half".to_string(), c)]
        );
        // phase is constrained, so it is no longer a fit parameter
        assert_eq!(registry.get_fit_parameters(obj.into()).unwrap(), vec![amplitude]);
    }
}
