//! Undo/redo history
//!
//! The stack only records commands. Replaying them is the job of
//! [`Registry::undo`](crate::objects::Registry::undo) and
//! [`Registry::redo`](crate::objects::Registry::redo), which own the state the
//! commands refer to. Commands are grouped: every push outside a macro forms a
//! group of its own, and everything pushed between `begin_macro` and
//! `end_macro` undoes as one step.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use crate::error::{CoreError, Result};
use crate::objects::{NodeRef, ObjId, VarId, Variable};
use crate::variables::descriptor::DescriptorValue;

/// A single-field property of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Property {
    Value,
    Error,
    Min,
    Max,
    Fixed,
    Enabled,
    DisplayName,
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Property::Value => "value",
            Property::Error => "error",
            Property::Min => "min",
            Property::Max => "max",
            Property::Fixed => "fixed",
            Property::Enabled => "enabled",
            Property::DisplayName => "display_name",
        };
        f.write_str(name)
    }
}

/// The value of a [`Property`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Number(f64),
    Flag(bool),
    Text(Option<String>),
    Descriptor(DescriptorValue),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Number(v) => write!(f, "{v}"),
            PropertyValue::Flag(v) => write!(f, "{v}"),
            PropertyValue::Text(Some(v)) => write!(f, "{v}"),
            PropertyValue::Text(None) => f.write_str("None"),
            PropertyValue::Descriptor(v) => write!(f, "{v}"),
        }
    }
}

/// One recorded change
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// A property of a variable changed from `old` to `new`
    Property {
        target: VarId,
        name: String,
        property: Property,
        old: PropertyValue,
        new: PropertyValue,
    },

    /// The whole variable was replaced, e.g. by a unit conversion
    Replace {
        target: VarId,
        text: String,
        old: Box<Variable>,
        new: Box<Variable>,
    },

    /// A component of an object was added (`old == None`) or replaced
    SetComponent {
        object: ObjId,
        key: String,
        old: Option<NodeRef>,
        new: NodeRef,
    },

    /// An item was inserted into a collection
    Insert {
        collection: ObjId,
        index: usize,
        item: NodeRef,
    },

    /// An item was removed from a collection
    Remove {
        collection: ObjId,
        index: usize,
        item: NodeRef,
    },

    /// A collection item was overwritten
    SetItem {
        collection: ObjId,
        index: usize,
        old: NodeRef,
        new: NodeRef,
    },
}

impl Command {
    /// Human readable description
    pub fn text(&self) -> String {
        match self {
            Command::Property {
                name,
                property: Property::Value,
                old,
                new,
                ..
            } => format!("'{name}' value changed from {old} to {new}"),
            Command::Property {
                name,
                property,
                old,
                new,
                ..
            } => format!("'{name}' {property} changed from {old} to {new}"),
            Command::Replace { text, .. } => text.clone(),
            Command::SetComponent {
                object, key, old, ..
            } => match old {
                Some(_) => format!("{object} component '{key}' replaced"),
                None => format!("{object} component '{key}' added"),
            },
            Command::Insert {
                collection, index, ..
            } => format!("{collection} item inserted at {index}"),
            Command::Remove {
                collection, index, ..
            } => format!("{collection} item removed from {index}"),
            Command::SetItem {
                collection, index, ..
            } => format!("{collection} item {index} replaced"),
        }
    }
}

/// Commands that undo and redo as one step
#[derive(Debug, Clone, PartialEq)]
pub struct CommandGroup {
    pub text: String,
    pub commands: Vec<Command>,
}

/// Bounded history of command groups
#[derive(Debug, Clone, Default)]
pub struct UndoStack {
    history: VecDeque<CommandGroup>,
    future: VecDeque<CommandGroup>,
    max_history: Option<usize>,
    enabled: bool,
    running_macro: Option<CommandGroup>,
    suspended: usize,
}

impl UndoStack {
    /// A disabled stack with unlimited history
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_history(mut self, max_history: Option<usize>) -> Self {
        self.max_history = max_history;
        self.trim();
        self
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// `true` when a push would be recorded
    pub fn is_recording(&self) -> bool {
        self.enabled && self.suspended == 0
    }

    // Nested suspension: each suspend needs a matching resume.
    pub(crate) fn suspend(&mut self) {
        self.suspended += 1;
    }

    pub(crate) fn resume(&mut self) {
        self.suspended = self.suspended.saturating_sub(1);
    }

    /// Record a command; ignored while disabled or suspended
    pub fn push(&mut self, command: Command) {
        if !self.is_recording() {
            return;
        }
        match &mut self.running_macro {
            Some(group) => group.commands.push(command),
            None => {
                let group = CommandGroup {
                    text: command.text(),
                    commands: vec![command],
                };
                self.push_group(group);
            }
        }
    }

    fn push_group(&mut self, group: CommandGroup) {
        self.history.push_back(group);
        self.future.clear();
        self.trim();
    }

    fn trim(&mut self) {
        if let Some(max) = self.max_history {
            while self.history.len() > max {
                self.history.pop_front();
            }
        }
    }

    /// Start grouping subsequent pushes under `text`
    ///
    /// # Errors
    ///
    /// Fails if a macro is already running.
    pub fn begin_macro(&mut self, text: &str) -> Result<()> {
        if !self.is_recording() {
            return Ok(());
        }
        if let Some(group) = &self.running_macro {
            return Err(CoreError::UndoStack(format!(
                "cannot start macro '{text}' while '{}' is running",
                group.text
            )));
        }
        self.running_macro = Some(CommandGroup {
            text: text.to_string(),
            commands: Vec::new(),
        });
        Ok(())
    }

    /// Close the running macro; an empty macro leaves no history entry.
    ///
    /// # Errors
    ///
    /// Fails if no macro is running while the stack records.
    pub fn end_macro(&mut self) -> Result<()> {
        if !self.is_recording() {
            return Ok(());
        }
        let group = self
            .running_macro
            .take()
            .ok_or_else(|| CoreError::UndoStack("no macro is running".to_string()))?;
        if !group.commands.is_empty() {
            self.push_group(group);
        }
        Ok(())
    }

    pub fn macro_running(&self) -> bool {
        self.running_macro.is_some()
    }

    pub fn can_undo(&self) -> bool {
        !self.macro_running() && !self.history.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.macro_running() && !self.future.is_empty()
    }

    pub fn undo_text(&self) -> Option<&str> {
        self.history.back().map(|g| g.text.as_str())
    }

    pub fn redo_text(&self) -> Option<&str> {
        self.future.back().map(|g| g.text.as_str())
    }

    /// Move the latest group to the redo side and return it for replay
    pub(crate) fn take_undo(&mut self) -> Option<CommandGroup> {
        if !self.can_undo() {
            return None;
        }
        let group = self.history.pop_back()?;
        self.future.push_back(group.clone());
        Some(group)
    }

    /// Move the latest undone group back to the history and return it
    pub(crate) fn take_redo(&mut self) -> Option<CommandGroup> {
        if !self.can_redo() {
            return None;
        }
        let group = self.future.pop_back()?;
        self.history.push_back(group.clone());
        Some(group)
    }

    /// Drop the latest group without undoing it
    pub fn pop(&mut self) -> Option<CommandGroup> {
        self.history.pop_back()
    }

    /// Forget all history and any running macro
    pub fn clear(&mut self) {
        self.history.clear();
        self.future.clear();
        self.running_macro = None;
    }

    /// Number of undoable groups
    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}
