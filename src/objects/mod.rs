//! The object registry
//!
//! Every variable, object, collection and constraint lives in a [`Registry`]
//! and is addressed by a typed id. Objects and collections refer to their
//! components by id, so one parameter can be shared by several objects and
//! constraints can link variables anywhere in the model. All mutation goes
//! through the registry, which is what lets it evaluate constraints on every
//! value change and record changes on its undo stack.
//!
//! The registry's methods are split by concern:
//!
//! * this module: variables, properties, undo replay and JSON snapshots
//! * [`evaluation`]: constraint registration and the value-set pipeline
//! * [`base_obj`]: named component containers
//! * [`collection`]: ordered collections

pub mod base_obj;
pub mod collection;
pub mod evaluation;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

use crate::constraints::{Constraint, ConstraintId};
use crate::error::{CoreError, Result};
use crate::undo::{Command, Property, PropertyValue, UndoStack};
use crate::variables::bounds::Bounds;
use crate::variables::descriptor::{Descriptor, DescriptorValue};
use crate::variables::parameter::Parameter;

pub use base_obj::BaseObj;
pub use collection::BaseCollection;

/// Identifier of a registered variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VarId(pub(crate) u64);

impl VarId {
    /// Key used for this variable in fit results, `p{id}`
    pub fn fit_key(&self) -> String {
        format!("p{}", self.0)
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Identifier of a registered object or collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjId(pub(crate) u64);

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "o{}", self.0)
    }
}

/// Anything that can be a component of an object or an item of a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeRef {
    Variable(VarId),
    Object(ObjId),
}

impl From<VarId> for NodeRef {
    fn from(id: VarId) -> Self {
        NodeRef::Variable(id)
    }
}

impl From<ObjId> for NodeRef {
    fn from(id: ObjId) -> Self {
        NodeRef::Object(id)
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Variable(id) => id.fmt(f),
            NodeRef::Object(id) => id.fmt(f),
        }
    }
}

/// A registered variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Variable {
    Descriptor(Descriptor),
    Parameter(Parameter),
}

impl Variable {
    pub fn name(&self) -> &str {
        match self {
            Variable::Descriptor(d) => &d.name,
            Variable::Parameter(p) => &p.name,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Variable::Descriptor(d) => d.display_name(),
            Variable::Parameter(p) => p.display_name(),
        }
    }

    pub fn units(&self) -> &str {
        match self {
            Variable::Descriptor(d) => d.units(),
            Variable::Parameter(p) => p.units(),
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            Variable::Descriptor(d) => d.enabled(),
            Variable::Parameter(p) => p.enabled(),
        }
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        match self {
            Variable::Descriptor(d) => d.set_enabled(enabled),
            Variable::Parameter(p) => p.set_enabled(enabled),
        }
    }

    /// The value as a number, if the variable holds one
    pub fn numeric_value(&self) -> Option<f64> {
        match self {
            Variable::Descriptor(d) => d.value().as_f64(),
            Variable::Parameter(p) => Some(p.value()),
        }
    }

    /// Bounds of a parameter; descriptors are unbounded
    pub fn bounds(&self) -> Bounds {
        match self {
            Variable::Descriptor(_) => Bounds::unbounded(),
            Variable::Parameter(p) => p.bounds(),
        }
    }

    pub fn as_parameter(&self) -> Option<&Parameter> {
        match self {
            Variable::Parameter(p) => Some(p),
            Variable::Descriptor(_) => None,
        }
    }

    pub fn as_descriptor(&self) -> Option<&Descriptor> {
        match self {
            Variable::Descriptor(d) => Some(d),
            Variable::Parameter(_) => None,
        }
    }

    pub fn is_parameter(&self) -> bool {
        matches!(self, Variable::Parameter(_))
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variable::Descriptor(d) => d.fmt(f),
            Variable::Parameter(p) => p.fmt(f),
        }
    }
}

/// A registered object or collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Object(BaseObj),
    Collection(BaseCollection),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::Object(o) => o.name(),
            Node::Collection(c) => c.name(),
        }
    }

    /// Children in order
    pub fn children(&self) -> Vec<NodeRef> {
        match self {
            Node::Object(o) => o.components().iter().map(|(_, n)| *n).collect(),
            Node::Collection(c) => c.items().to_vec(),
        }
    }
}

/// Registry behaviour settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Record changes on the undo stack. Default: false
    pub undo_enabled: bool,

    /// Maximum number of undo steps kept, `None` for unlimited. Default: None
    pub max_history: Option<usize>,

    /// Deepest allowed chain of constraints triggering constraints. Default: 32
    pub max_constraint_depth: usize,

    /// Fail when setting the value of a disabled variable; when `false` the
    /// set is silently ignored. Default: true
    pub error_on_disabled_set: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            undo_enabled: false,
            max_history: None,
            max_constraint_depth: 32,
            error_on_disabled_set: true,
        }
    }
}

impl RegistryConfig {
    pub fn with_undo(mut self, enabled: bool) -> Self {
        self.undo_enabled = enabled;
        self
    }

    pub fn with_max_history(mut self, max_history: Option<usize>) -> Self {
        self.max_history = max_history;
        self
    }

    pub fn with_max_constraint_depth(mut self, depth: usize) -> Self {
        self.max_constraint_depth = depth;
        self
    }

    pub fn with_error_on_disabled_set(mut self, error: bool) -> Self {
        self.error_on_disabled_set = error;
        self
    }
}

/// Arena owning all variables, objects, collections and constraints
#[derive(Debug, Clone)]
pub struct Registry {
    config: RegistryConfig,
    variables: BTreeMap<VarId, Variable>,
    nodes: BTreeMap<ObjId, Node>,
    constraints: BTreeMap<ConstraintId, Constraint>,
    // Per-parameter user constraints, in insertion order.
    attachments: BTreeMap<VarId, Vec<(String, ConstraintId)>>,
    stack: UndoStack,
    next_id: u64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// An empty registry with the default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        let mut stack = UndoStack::new().with_max_history(config.max_history);
        if config.undo_enabled {
            stack.enable();
        }
        Self {
            config,
            variables: BTreeMap::new(),
            nodes: BTreeMap::new(),
            constraints: BTreeMap::new(),
            attachments: BTreeMap::new(),
            stack,
            next_id: 0,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // ----- variables -----

    pub fn add_descriptor(&mut self, descriptor: Descriptor) -> VarId {
        self.add_variable(Variable::Descriptor(descriptor))
    }

    pub fn add_parameter(&mut self, parameter: Parameter) -> VarId {
        self.add_variable(Variable::Parameter(parameter))
    }

    pub fn add_variable(&mut self, variable: Variable) -> VarId {
        let id = VarId(self.next_id());
        debug!(id = %id, name = variable.name(), "registered variable");
        self.variables.insert(id, variable);
        id
    }

    pub fn variable(&self, id: VarId) -> Result<&Variable> {
        self.variables
            .get(&id)
            .ok_or_else(|| CoreError::VariableNotFound(id.to_string()))
    }

    pub(crate) fn variable_mut(&mut self, id: VarId) -> Result<&mut Variable> {
        self.variables
            .get_mut(&id)
            .ok_or_else(|| CoreError::VariableNotFound(id.to_string()))
    }

    pub fn parameter(&self, id: VarId) -> Result<&Parameter> {
        match self.variable(id)? {
            Variable::Parameter(p) => Ok(p),
            Variable::Descriptor(d) => Err(CoreError::NotAParameter(d.name.clone())),
        }
    }

    pub(crate) fn parameter_mut(&mut self, id: VarId) -> Result<&mut Parameter> {
        match self.variable_mut(id)? {
            Variable::Parameter(p) => Ok(p),
            Variable::Descriptor(d) => Err(CoreError::NotAParameter(d.name.clone())),
        }
    }

    pub fn descriptor(&self, id: VarId) -> Result<&Descriptor> {
        match self.variable(id)? {
            Variable::Descriptor(d) => Ok(d),
            Variable::Parameter(p) => Err(CoreError::InvalidValue(format!(
                "'{}' is a parameter, not a descriptor",
                p.name
            ))),
        }
    }

    /// Numeric value of a parameter or number descriptor
    pub fn value(&self, id: VarId) -> Result<f64> {
        let variable = self.variable(id)?;
        variable
            .numeric_value()
            .ok_or_else(|| CoreError::NotNumeric(variable.name().to_string()))
    }

    /// All variables in registration order
    pub fn variables(&self) -> impl Iterator<Item = (VarId, &Variable)> {
        self.variables.iter().map(|(id, v)| (*id, v))
    }

    /// First variable registered under `name`
    pub fn find_variable(&self, name: &str) -> Option<VarId> {
        self.variables
            .iter()
            .find(|(_, v)| v.name() == name)
            .map(|(id, _)| *id)
    }

    /// Set the value of any descriptor, including bool and text ones
    pub fn set_descriptor_value(&mut self, id: VarId, value: DescriptorValue) -> Result<()> {
        if let Some(number) = value.as_f64() {
            if self.variable(id)?.is_parameter() {
                self.set_value(id, number)?;
                return Ok(());
            }
        }
        let disabled_ignored = !self.config.error_on_disabled_set;
        let Variable::Descriptor(d) = self.variable_mut(id)? else {
            return Err(CoreError::NotNumeric(value.to_string()));
        };
        if !d.enabled() && disabled_ignored {
            return Ok(());
        }
        let old = d.value().clone();
        d.set_value(value.clone())?;
        let name = d.name.clone();
        self.record(
            id,
            name,
            Property::Value,
            PropertyValue::Descriptor(old),
            PropertyValue::Descriptor(value),
        );
        Ok(())
    }

    pub fn set_error(&mut self, id: VarId, error: f64) -> Result<()> {
        let p = self.parameter_mut(id)?;
        let old = p.error();
        p.set_error(error)?;
        let name = p.name.clone();
        self.record(id, name, Property::Error, PropertyValue::Number(old), PropertyValue::Number(error));
        Ok(())
    }

    pub fn set_min(&mut self, id: VarId, min: f64) -> Result<()> {
        let p = self.parameter_mut(id)?;
        let old = p.min();
        p.set_min(min)?;
        let name = p.name.clone();
        self.record(id, name, Property::Min, PropertyValue::Number(old), PropertyValue::Number(min));
        Ok(())
    }

    pub fn set_max(&mut self, id: VarId, max: f64) -> Result<()> {
        let p = self.parameter_mut(id)?;
        let old = p.max();
        p.set_max(max)?;
        let name = p.name.clone();
        self.record(id, name, Property::Max, PropertyValue::Number(old), PropertyValue::Number(max));
        Ok(())
    }

    pub fn set_fixed(&mut self, id: VarId, fixed: bool) -> Result<()> {
        let p = self.parameter_mut(id)?;
        let old = p.fixed();
        p.set_fixed(fixed)?;
        let name = p.name.clone();
        self.record(id, name, Property::Fixed, PropertyValue::Flag(old), PropertyValue::Flag(fixed));
        Ok(())
    }

    /// Enable or disable a variable by hand
    pub fn set_enabled(&mut self, id: VarId, enabled: bool) -> Result<()> {
        let v = self.variable_mut(id)?;
        let old = v.enabled();
        v.set_enabled(enabled);
        let name = v.name().to_string();
        self.record(id, name, Property::Enabled, PropertyValue::Flag(old), PropertyValue::Flag(enabled));
        Ok(())
    }

    pub fn set_display_name(&mut self, id: VarId, display_name: Option<&str>) -> Result<()> {
        let new = display_name.map(str::to_string);
        let v = self.variable_mut(id)?;
        let old = match v {
            Variable::Descriptor(d) => {
                let old = d.raw_display_name();
                d.set_display_name(new.clone());
                old
            }
            Variable::Parameter(p) => {
                let old = p.raw_display_name();
                p.set_display_name(new.clone());
                old
            }
        };
        let name = v.name().to_string();
        self.record(id, name, Property::DisplayName, PropertyValue::Text(old), PropertyValue::Text(new));
        Ok(())
    }

    /// Replace a parameter's bounds; a `None` side keeps its limit.
    ///
    /// Also enables the parameter and clears `fixed`, recorded as the single
    /// undo step "Setting bounds".
    pub fn set_bounds(&mut self, id: VarId, min: Option<f64>, max: Option<f64>) -> Result<()> {
        let old = self.variable(id)?.clone();
        self.parameter_mut(id)?.set_bounds(min, max)?;
        let new = self.variable(id)?.clone();
        let command = Command::Replace {
            target: id,
            text: format!("'{}' bounds changed", old.name()),
            old: Box::new(old),
            new: Box::new(new),
        };
        if self.stack.macro_running() {
            self.stack.push(command);
            return Ok(());
        }
        self.stack.begin_macro("Setting bounds")?;
        self.stack.push(command);
        self.stack.end_macro()
    }

    /// Convert a variable to new units, scaling its value (and, for a
    /// parameter, error and bounds)
    pub fn convert_unit(&mut self, id: VarId, units: &str) -> Result<()> {
        let old = self.variable(id)?.clone();
        match self.variable_mut(id)? {
            Variable::Descriptor(d) => d.convert_unit(units)?,
            Variable::Parameter(p) => p.convert_unit(units)?,
        }
        let new = self.variable(id)?.clone();
        self.stack.push(Command::Replace {
            target: id,
            text: format!("'{}' units changed from {} to {units}", old.name(), old.units()),
            old: Box::new(old),
            new: Box::new(new),
        });
        Ok(())
    }

    fn record(&mut self, target: VarId, name: String, property: Property, old: PropertyValue, new: PropertyValue) {
        if old != new {
            self.stack.push(Command::Property {
                target,
                name,
                property,
                old,
                new,
            });
        }
    }

    // ----- undo/redo -----

    pub fn stack(&self) -> &UndoStack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut UndoStack {
        &mut self.stack
    }

    pub fn begin_macro(&mut self, text: &str) -> Result<()> {
        self.stack.begin_macro(text)
    }

    pub fn end_macro(&mut self) -> Result<()> {
        self.stack.end_macro()
    }

    /// Undo the latest step
    ///
    /// # Returns
    ///
    /// `false` when there was nothing to undo
    pub fn undo(&mut self) -> Result<bool> {
        let Some(group) = self.stack.take_undo() else {
            return Ok(false);
        };
        debug!(text = %group.text, "undo");
        self.stack.suspend();
        let result = group
            .commands
            .iter()
            .rev()
            .try_for_each(|command| self.replay(command, false));
        self.stack.resume();
        result.map(|_| true)
    }

    /// Redo the latest undone step
    pub fn redo(&mut self) -> Result<bool> {
        let Some(group) = self.stack.take_redo() else {
            return Ok(false);
        };
        debug!(text = %group.text, "redo");
        self.stack.suspend();
        let result = group
            .commands
            .iter()
            .try_for_each(|command| self.replay(command, true));
        self.stack.resume();
        result.map(|_| true)
    }

    fn replay(&mut self, command: &Command, forward: bool) -> Result<()> {
        match command {
            Command::Property {
                target,
                property,
                old,
                new,
                ..
            } => self.write_property(*target, *property, pick(forward, old, new)),
            Command::Replace {
                target, old, new, ..
            } => {
                let variable = Variable::clone(pick(forward, old, new));
                *self.variable_mut(*target)? = variable;
                Ok(())
            }
            Command::SetComponent {
                object,
                key,
                old,
                new,
            } => match (forward, old) {
                (true, _) => self.put_component(*object, key, *new),
                (false, Some(previous)) => self.put_component(*object, key, *previous),
                (false, None) => self.take_component(*object, key).map(|_| ()),
            },
            Command::Insert {
                collection,
                index,
                item,
            } => {
                if forward {
                    self.collection_mut(*collection)?.insert_at(*index, *item);
                    Ok(())
                } else {
                    self.collection_mut(*collection)?.remove_at(*index).map(|_| ())
                }
            }
            Command::Remove {
                collection,
                index,
                item,
            } => {
                if forward {
                    self.collection_mut(*collection)?.remove_at(*index).map(|_| ())
                } else {
                    self.collection_mut(*collection)?.insert_at(*index, *item);
                    Ok(())
                }
            }
            Command::SetItem {
                collection,
                index,
                old,
                new,
            } => self
                .collection_mut(*collection)?
                .set_at(*index, *pick(forward, old, new))
                .map(|_| ()),
        }
    }

    // Raw property write used by undo replay.
    fn write_property(&mut self, id: VarId, property: Property, value: &PropertyValue) -> Result<()> {
        match (property, value) {
            (Property::Value, PropertyValue::Number(v)) => self.force_value(id, *v).map(|_| ()),
            (Property::Value, PropertyValue::Descriptor(v)) => match self.variable_mut(id)? {
                Variable::Descriptor(d) => {
                    d.force_value(v.clone());
                    Ok(())
                }
                Variable::Parameter(_) => match v.as_f64() {
                    Some(number) => self.force_value(id, number).map(|_| ()),
                    None => Err(CoreError::NotNumeric(id.to_string())),
                },
            },
            (Property::Error, PropertyValue::Number(v)) => self.parameter_mut(id)?.set_error(*v),
            (Property::Min, PropertyValue::Number(v)) => {
                let p = self.parameter_mut(id)?;
                let bounds = Bounds::new(*v, p.max())?;
                p.store_bounds(bounds);
                Ok(())
            }
            (Property::Max, PropertyValue::Number(v)) => {
                let p = self.parameter_mut(id)?;
                let bounds = Bounds::new(p.min(), *v)?;
                p.store_bounds(bounds);
                Ok(())
            }
            (Property::Fixed, PropertyValue::Flag(v)) => {
                self.parameter_mut(id)?.store_fixed(*v);
                Ok(())
            }
            (Property::Enabled, PropertyValue::Flag(v)) => {
                self.variable_mut(id)?.set_enabled(*v);
                Ok(())
            }
            (Property::DisplayName, PropertyValue::Text(v)) => {
                match self.variable_mut(id)? {
                    Variable::Descriptor(d) => d.set_display_name(v.clone()),
                    Variable::Parameter(p) => p.set_display_name(v.clone()),
                }
                Ok(())
            }
            (property, value) => Err(CoreError::UndoStack(format!(
                "cannot restore {property} from {value}"
            ))),
        }
    }

    // ----- snapshots -----

    /// Serialize variables, objects and constraints to JSON.
    ///
    /// Functional constraints hold closures; they and their attachments are
    /// left out with a warning.
    pub fn to_json(&self) -> Result<String> {
        let constraints: Vec<(ConstraintId, Constraint)> = self
            .constraints
            .iter()
            .filter(|(id, c)| {
                let keep = c.is_serializable();
                if !keep {
                    warn!(constraint = %id, "functional constraint skipped in snapshot");
                }
                keep
            })
            .map(|(id, c)| (*id, c.clone()))
            .collect();
        let attachments = self
            .attachments
            .iter()
            .map(|(id, list)| {
                let kept = list
                    .iter()
                    .filter(|(_, cid)| constraints.iter().any(|(c, _)| c == cid))
                    .cloned()
                    .collect();
                (*id, kept)
            })
            .collect();

        let snapshot = Snapshot {
            config: self.config.clone(),
            variables: self.variables.iter().map(|(k, v)| (*k, v.clone())).collect(),
            nodes: self.nodes.iter().map(|(k, v)| (*k, v.clone())).collect(),
            constraints,
            attachments,
            next_id: self.next_id,
        };
        Ok(serde_json::to_string_pretty(&snapshot)?)
    }

    /// Rebuild a registry from [`Registry::to_json`] output. The undo history
    /// starts empty.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        let mut registry = Self::with_config(snapshot.config);
        registry.variables = snapshot.variables.into_iter().collect();
        registry.nodes = snapshot.nodes.into_iter().collect();
        registry.constraints = snapshot.constraints.into_iter().collect();
        registry.attachments = snapshot.attachments.into_iter().collect();
        registry.next_id = snapshot.next_id;
        Ok(registry)
    }
}

fn pick<T>(forward: bool, old: T, new: T) -> T {
    if forward {
        new
    } else {
        old
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    config: RegistryConfig,
    variables: Vec<(VarId, Variable)>,
    nodes: Vec<(ObjId, Node)>,
    constraints: Vec<(ConstraintId, Constraint)>,
    attachments: Vec<(VarId, Vec<(String, ConstraintId)>)>,
    next_id: u64,
}
