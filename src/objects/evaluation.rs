//! Constraint registration and the value-set pipeline
//!
//! Setting a parameter value runs, in order:
//!
//! 1. the builtin constraints, which clamp the value into `[min, max]`;
//! 2. the user constraints attached to the parameter, in insertion order.
//!    A constraint that derives another variable is applied, which sets that
//!    variable through this same pipeline. A constraint on the parameter itself
//!    recomputes the candidate value.
//!
//! Writes made by constraints skip the enabled check (constrained dependents
//! are disabled) and are not recorded on the undo stack; only the top-level
//! change is, so undoing it reruns the cascade.
//!
//! Every value written during a cascade is journaled. If any step fails, the
//! journal is replayed backwards and the registry is left as it was.

use tracing::debug;

use super::{Registry, VarId, Variable};
use crate::constraints::{Constraint, ConstraintId};
use crate::error::{CoreError, Result};
use crate::undo::{Property, PropertyValue};
use crate::variables::descriptor::DescriptorValue;

impl Registry {
    /// Register a constraint
    ///
    /// An external constraint disables its dependent parameter, which must be
    /// enabled beforehand, and is applied at once.
    ///
    /// # Errors
    ///
    /// * `VariableNotFound` / `NotNumeric` for bad variable references
    /// * `InvalidConstraint` if the dependent is already driven by a constraint
    ///
    /// # Examples
    ///
    /// ```
    /// use easycore::constraints::Constraint;
    /// use easycore::objects::Registry;
    /// use easycore::variables::Parameter;
    ///
    /// let mut registry = Registry::new();
    /// let a = registry.add_parameter(Parameter::new("a", 1.0));
    /// let b = registry.add_parameter(Parameter::new("b", 5.0));
    /// registry.add_constraint(Constraint::object(b, "2*", a).unwrap()).unwrap();
    /// assert_eq!(registry.value(b).unwrap(), 2.0);
    /// assert!(!registry.variable(b).unwrap().enabled());
    /// ```
    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<ConstraintId> {
        let dependent = constraint.dependent();
        self.value(dependent)?;
        for independent in constraint.independents() {
            self.value(independent)?;
        }

        let disables = self.disables_dependent(&constraint)?;
        if disables {
            self.ensure_free_dependent(dependent)?;
        }

        let id = ConstraintId(self.next_id());
        debug!(constraint = %id, rule = %constraint, "registered constraint");
        self.constraints.insert(id, constraint);
        if disables {
            self.variable_mut(dependent)?.set_enabled(false);
            if let Err(err) = self.journaled(|registry, touched| registry.apply_inner(id, 0, touched)) {
                self.constraints.remove(&id);
                self.variable_mut(dependent)?.set_enabled(true);
                return Err(err);
            }
        }
        Ok(id)
    }

    fn disables_dependent(&self, constraint: &Constraint) -> Result<bool> {
        Ok(constraint.is_external() && self.variable(constraint.dependent())?.is_parameter())
    }

    // An external constraint may only take over a parameter nobody drives.
    fn ensure_free_dependent(&self, dependent: VarId) -> Result<()> {
        let variable = self.variable(dependent)?;
        if !variable.enabled() {
            return Err(CoreError::InvalidConstraint(format!(
                "'{}' is not enabled; it may already be constrained",
                variable.name()
            )));
        }
        Ok(())
    }

    /// Whether an enabled external constraint other than `except` drives
    /// `dependent`
    fn driven_by_other(&self, dependent: VarId, except: ConstraintId) -> bool {
        self.constraints.iter().any(|(id, c)| {
            *id != except && c.enabled() && c.is_external() && c.dependent() == dependent
        })
    }

    fn release_dependent(&mut self, constraint: &Constraint, id: ConstraintId) -> Result<()> {
        let dependent = constraint.dependent();
        if constraint.enabled() && self.disables_dependent(constraint)? && !self.driven_by_other(dependent, id) {
            self.variable_mut(dependent)?.set_enabled(true);
        }
        Ok(())
    }

    pub fn constraint(&self, id: ConstraintId) -> Result<&Constraint> {
        self.constraints
            .get(&id)
            .ok_or_else(|| CoreError::ConstraintNotFound(id.to_string()))
    }

    /// All registered constraints
    pub fn constraints(&self) -> impl Iterator<Item = (ConstraintId, &Constraint)> {
        self.constraints.iter().map(|(id, c)| (*id, c))
    }

    /// Unregister a constraint, detach it from every parameter and re-enable
    /// the dependent it disabled
    pub fn remove_constraint(&mut self, id: ConstraintId) -> Result<Constraint> {
        let constraint = self
            .constraints
            .remove(&id)
            .ok_or_else(|| CoreError::ConstraintNotFound(id.to_string()))?;
        for list in self.attachments.values_mut() {
            list.retain(|(_, cid)| *cid != id);
        }
        self.release_dependent(&constraint, id)?;
        debug!(constraint = %id, "removed constraint");
        Ok(constraint)
    }

    /// Make a constraint run whenever `trigger` changes value
    ///
    /// A constraint already attached under `key` is replaced in place.
    pub fn attach_constraint(&mut self, trigger: VarId, key: &str, id: ConstraintId) -> Result<()> {
        self.parameter(trigger)?;
        self.constraint(id)?;
        let list = self.attachments.entry(trigger).or_default();
        match list.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = id,
            None => list.push((key.to_string(), id)),
        }
        Ok(())
    }

    /// Remove the constraint attached under `key`, returning its id
    pub fn detach_constraint(&mut self, trigger: VarId, key: &str) -> Result<Option<ConstraintId>> {
        self.parameter(trigger)?;
        let Some(list) = self.attachments.get_mut(&trigger) else {
            return Ok(None);
        };
        let position = list.iter().position(|(k, _)| k == key);
        Ok(position.map(|i| list.remove(i).1))
    }

    /// User constraints of a parameter, in insertion order
    pub fn user_constraints(&self, id: VarId) -> &[(String, ConstraintId)] {
        self.attachments.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Enable or disable a constraint
    ///
    /// Enabling disables an external constraint's dependent and applies the
    /// constraint; disabling hands the dependent back to the user unless
    /// another enabled constraint still drives it.
    ///
    /// # Errors
    ///
    /// `InvalidConstraint` when enabling an external constraint whose
    /// dependent is disabled, e.g. because another constraint took it over
    pub fn set_constraint_enabled(&mut self, id: ConstraintId, enabled: bool) -> Result<()> {
        let constraint = self.constraint(id)?.clone();
        if constraint.enabled() == enabled {
            return Ok(());
        }
        let dependent = constraint.dependent();
        let disables = self.disables_dependent(&constraint)?;

        if !enabled {
            self.release_dependent(&constraint, id)?;
            self.constraint_mut(id)?.set_enabled(false);
            return Ok(());
        }

        if disables {
            self.ensure_free_dependent(dependent)?;
            self.variable_mut(dependent)?.set_enabled(false);
        }
        self.constraint_mut(id)?.set_enabled(true);
        if let Err(err) = self.journaled(|registry, touched| registry.apply_inner(id, 0, touched)) {
            self.constraint_mut(id)?.set_enabled(false);
            if disables {
                self.variable_mut(dependent)?.set_enabled(true);
            }
            return Err(err);
        }
        Ok(())
    }

    fn constraint_mut(&mut self, id: ConstraintId) -> Result<&mut Constraint> {
        self.constraints
            .get_mut(&id)
            .ok_or_else(|| CoreError::ConstraintNotFound(id.to_string()))
    }

    /// Compute the value a constraint would give its dependent without
    /// setting it; `None` if the constraint is disabled
    pub fn evaluate_constraint(&self, id: ConstraintId) -> Result<Option<f64>> {
        if !self.constraint(id)?.enabled() {
            return Ok(None);
        }
        self.compute_constraint(id).map(Some)
    }

    /// Apply a constraint on demand, setting its dependent
    ///
    /// # Returns
    ///
    /// The value the dependent ended up with, or `None` if the constraint is
    /// disabled
    pub fn apply_constraint(&mut self, id: ConstraintId) -> Result<Option<f64>> {
        let dependent = self.constraint(id)?.dependent();
        let old = self.value(dependent)?;
        let applied = self.journaled(|registry, touched| registry.apply_inner(id, 0, touched))?;
        if let Some(new) = applied {
            self.record_value_change(dependent, old, new)?;
        }
        Ok(applied)
    }

    /// Set the value of a parameter or number descriptor, running its
    /// constraints
    ///
    /// # Returns
    ///
    /// The value actually stored, which differs from `value` when a bound or
    /// constraint changed it
    ///
    /// # Errors
    ///
    /// * `NotEnabled` for a disabled variable (unless
    ///   `RegistryConfig::error_on_disabled_set` is off, in which case the
    ///   current value is returned unchanged)
    /// * `InvalidValue` for NaN, or a number outside a descriptor's options
    /// * any constraint error; values touched by the cascade are restored
    pub fn set_value(&mut self, id: VarId, value: f64) -> Result<f64> {
        let variable = self.variable(id)?;
        let old = self.value(id)?;
        if !variable.enabled() {
            if self.config.error_on_disabled_set {
                return Err(CoreError::NotEnabled(variable.name().to_string()));
            }
            debug!(variable = %id, "ignored value change of disabled variable");
            return Ok(old);
        }
        let new = self.journaled(|registry, touched| registry.run_pipeline(id, value, 0, touched))?;
        self.record_value_change(id, old, new)?;
        Ok(new)
    }

    // Pipeline without the enabled check or undo recording.
    pub(crate) fn force_value(&mut self, id: VarId, value: f64) -> Result<f64> {
        self.journaled(|registry, touched| registry.run_pipeline(id, value, 0, touched))
    }

    fn journaled<T>(
        &mut self,
        op: impl FnOnce(&mut Self, &mut Vec<(VarId, f64)>) -> Result<T>,
    ) -> Result<T> {
        let mut touched = Vec::new();
        let result = op(self, &mut touched);
        if result.is_err() && !touched.is_empty() {
            debug!(values = touched.len(), "rolling back constraint cascade");
            for (id, value) in touched.into_iter().rev() {
                match self.variables.get_mut(&id) {
                    Some(Variable::Parameter(p)) => p.store_value(value),
                    Some(Variable::Descriptor(d)) => d.force_value(DescriptorValue::Number(value)),
                    None => {}
                }
            }
        }
        result
    }

    fn record_value_change(&mut self, id: VarId, old: f64, new: f64) -> Result<()> {
        let variable = self.variable(id)?;
        let name = variable.name().to_string();
        let (old, new) = if variable.is_parameter() {
            (PropertyValue::Number(old), PropertyValue::Number(new))
        } else {
            (
                PropertyValue::Descriptor(DescriptorValue::Number(old)),
                PropertyValue::Descriptor(DescriptorValue::Number(new)),
            )
        };
        self.record(id, name, Property::Value, old, new);
        Ok(())
    }

    fn run_pipeline(
        &mut self,
        id: VarId,
        requested: f64,
        depth: usize,
        touched: &mut Vec<(VarId, f64)>,
    ) -> Result<f64> {
        if depth > self.config.max_constraint_depth {
            return Err(CoreError::ConstraintCycle(self.config.max_constraint_depth));
        }

        let bounds = match self.variable_mut(id)? {
            Variable::Parameter(p) => {
                if requested.is_nan() {
                    return Err(CoreError::InvalidValue(format!("'{}' cannot be set to NaN", p.name)));
                }
                p.bounds()
            }
            Variable::Descriptor(d) => {
                let Some(old) = d.value().as_f64() else {
                    return Err(CoreError::NotNumeric(d.name.clone()));
                };
                if requested.is_nan() {
                    return Err(CoreError::InvalidValue(format!("'{}' cannot be set to NaN", d.name)));
                }
                let value = DescriptorValue::Number(requested);
                d.check_value(&value)?;
                touched.push((id, old));
                d.force_value(value);
                return Ok(requested);
            }
        };

        let mut value = bounds.clamp(requested);
        let parameter = self.parameter_mut(id)?;
        touched.push((id, parameter.value()));
        parameter.store_value(value);

        let attached = self.user_constraints(id).to_vec();
        for (key, cid) in attached {
            let constraint = self.constraint(cid)?;
            if !constraint.enabled() {
                continue;
            }
            if constraint.dependent() == id && !constraint.is_external() {
                let candidate = constraint.compute(value, bounds, &[])?;
                if candidate != value {
                    debug!(variable = %id, key = %key, from = value, to = candidate, "user constraint changed value");
                    value = candidate;
                    self.parameter_mut(id)?.store_value(value);
                }
            } else {
                debug!(trigger = %id, constraint = %cid, key = %key, "applying user constraint");
                self.apply_inner(cid, depth + 1, touched)?;
            }
        }
        Ok(value)
    }

    fn compute_constraint(&self, id: ConstraintId) -> Result<f64> {
        let constraint = self.constraint(id)?;
        let dependent = self.variable(constraint.dependent())?;
        let current = self.value(constraint.dependent())?;
        let independents = constraint
            .independents()
            .into_iter()
            .map(|v| self.value(v))
            .collect::<Result<Vec<_>>>()?;
        constraint.compute(current, dependent.bounds(), &independents)
    }

    fn apply_inner(
        &mut self,
        id: ConstraintId,
        depth: usize,
        touched: &mut Vec<(VarId, f64)>,
    ) -> Result<Option<f64>> {
        let constraint = self.constraint(id)?;
        if !constraint.enabled() {
            return Ok(None);
        }
        let dependent = constraint.dependent();
        let value = self.compute_constraint(id)?;
        let applied = self.run_pipeline(dependent, value, depth, touched)?;
        Ok(Some(applied))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::BoundKind;
    use crate::objects::RegistryConfig;
    use crate::variables::{Descriptor, Parameter};
    use approx::assert_relative_eq;

    fn two_params(a: f64, b: f64) -> (Registry, VarId, VarId) {
        let mut registry = Registry::new();
        let pa = registry.add_parameter(Parameter::new("a", a));
        let pb = registry.add_parameter(Parameter::new("b", b));
        (registry, pa, pb)
    }

    #[test]
    fn test_numeric_constraint_on_demand() {
        let (mut registry, a, b) = two_params(1.0, 2.0);
        let ca = registry.add_constraint(Constraint::numeric(a, "==", 1.0).unwrap()).unwrap();
        let cb = registry.add_constraint(Constraint::numeric(b, "==", 1.0).unwrap()).unwrap();
        // internal constraints are not applied on registration
        assert_eq!(registry.value(b).unwrap(), 2.0);
        assert_eq!(registry.apply_constraint(ca).unwrap(), Some(1.0));
        assert_eq!(registry.apply_constraint(cb).unwrap(), Some(1.0));
        assert_eq!(registry.value(b).unwrap(), 1.0);
    }

    #[test]
    fn test_numeric_constraint_more_and_less() {
        let (mut registry, a, b) = two_params(1.0, 2.0);
        let ga = registry.add_constraint(Constraint::numeric(a, ">", 1.5).unwrap()).unwrap();
        let gb = registry.add_constraint(Constraint::numeric(b, ">", 1.5).unwrap()).unwrap();
        assert_eq!(registry.evaluate_constraint(ga).unwrap(), Some(1.5));
        assert_eq!(registry.evaluate_constraint(gb).unwrap(), Some(2.0));

        let (mut registry, a, b) = two_params(1.0, 2.0);
        let la = registry.add_constraint(Constraint::numeric(a, "<", 1.5).unwrap()).unwrap();
        let lb = registry.add_constraint(Constraint::numeric(b, "<", 1.5).unwrap()).unwrap();
        assert_eq!(registry.apply_constraint(la).unwrap(), Some(1.0));
        assert_eq!(registry.apply_constraint(lb).unwrap(), Some(1.5));
    }

    #[test]
    fn test_builtin_before_user_constraints() {
        let mut registry = Registry::new();
        let a = registry.add_parameter(Parameter::with_bounds("a", 0.2, -1.0, 1.0).unwrap());
        let abs = registry.add_constraint(Constraint::functional(a, |v| v[0].abs())).unwrap();
        registry.attach_constraint(a, "abs", abs).unwrap();

        assert_eq!(registry.set_value(a, 0.85).unwrap(), 0.85);
        assert_eq!(registry.set_value(a, -0.5).unwrap(), 0.5);
        // clamped to -1 by the bounds, then made positive
        assert_eq!(registry.set_value(a, -3.0).unwrap(), 1.0);
    }

    #[test]
    fn test_self_bound_constraint() {
        let mut registry = Registry::new();
        let a = registry.add_parameter(Parameter::with_bounds("a", 1.0, 0.0, 2.0).unwrap());
        let c = registry
            .add_constraint(Constraint::self_bound(a, "<=", BoundKind::Max).unwrap())
            .unwrap();
        assert_eq!(registry.evaluate_constraint(c).unwrap(), Some(1.0));
    }

    #[test]
    fn test_object_constraint_enable_disable() {
        let (mut registry, p0, p1) = two_params(1.0, 2.0);
        let c = registry.add_constraint(Constraint::object(p0, "", p1).unwrap()).unwrap();
        assert!(!registry.variable(p0).unwrap().enabled());
        assert!(registry.variable(p1).unwrap().enabled());
        assert_eq!(registry.value(p0).unwrap(), 2.0);

        registry.set_constraint_enabled(c, false).unwrap();
        assert!(registry.variable(p0).unwrap().enabled());
        assert_eq!(registry.evaluate_constraint(c).unwrap(), None);
        assert_eq!(registry.apply_constraint(c).unwrap(), None);

        registry.set_value(p0, 5.0).unwrap();
        registry.set_constraint_enabled(c, true).unwrap();
        assert!(!registry.variable(p0).unwrap().enabled());
        assert_eq!(registry.value(p0).unwrap(), 2.0);
    }

    #[test]
    fn test_disabled_dependent_rejects_sets() {
        let (mut registry, p0, p1) = two_params(1.0, 2.0);
        registry.add_constraint(Constraint::object(p0, "2*", p1).unwrap()).unwrap();
        assert!(matches!(registry.set_value(p0, 3.0), Err(CoreError::NotEnabled(_))));
        // a second constraint on the same dependent is refused
        assert!(matches!(
            registry.add_constraint(Constraint::object(p0, "3*", p1).unwrap()),
            Err(CoreError::InvalidConstraint(_))
        ));

        let mut lenient = Registry::with_config(RegistryConfig::default().with_error_on_disabled_set(false));
        let q0 = lenient.add_parameter(Parameter::new("q0", 1.0));
        let q1 = lenient.add_parameter(Parameter::new("q1", 2.0));
        lenient.add_constraint(Constraint::object(q0, "2*", q1).unwrap()).unwrap();
        assert_eq!(lenient.set_value(q0, 7.0).unwrap(), 4.0);
    }

    #[test]
    fn test_chained_object_constraints() {
        let mut registry = Registry::new();
        let p0 = registry.add_parameter(Parameter::new("p0", 1.0));
        let p1 = registry.add_parameter(Parameter::new("p1", 2.0));
        let p2 = registry.add_parameter(Parameter::new("p2", 3.0));
        let c1 = registry.add_constraint(Constraint::object(p1, "", p0).unwrap()).unwrap();
        let c2 = registry.add_constraint(Constraint::object(p2, "", p0).unwrap()).unwrap();
        registry.attach_constraint(p0, "num_1", c1).unwrap();
        registry.attach_constraint(p0, "num_2", c2).unwrap();

        registry.set_value(p0, 1.5).unwrap();
        for p in [p0, p1, p2] {
            assert_eq!(registry.value(p).unwrap(), 1.5);
        }
        assert_eq!(registry.user_constraints(p0).len(), 2);
    }

    #[test]
    fn test_multi_object_constraint() {
        let mut registry = Registry::new();
        let a = registry.add_parameter(Parameter::new("a", 0.5));
        let b = registry.add_parameter(Parameter::new("b", 0.3));
        let c = registry.add_parameter(Parameter::new("c", 0.1));
        // a + b - 2c = 0
        let con = registry
            .add_constraint(Constraint::multi_object(vec![b, c], vec!["-2*".into()], a, 0.0).unwrap())
            .unwrap();
        registry.attach_constraint(b, "set_a", con).unwrap();
        registry.attach_constraint(c, "set_a", con).unwrap();

        registry.set_value(b, 0.4).unwrap();
        assert_relative_eq!(registry.value(a).unwrap(), -0.2, epsilon = 1e-12);
        registry.set_value(c, 0.3).unwrap();
        assert_relative_eq!(registry.value(a).unwrap(), 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_remove_constraint_reenables() {
        let (mut registry, p0, p1) = two_params(1.0, 2.0);
        let c = registry.add_constraint(Constraint::object(p0, "", p1).unwrap()).unwrap();
        registry.attach_constraint(p1, "link", c).unwrap();
        registry.remove_constraint(c).unwrap();
        assert!(registry.variable(p0).unwrap().enabled());
        assert!(registry.user_constraints(p1).is_empty());
        assert!(registry.remove_constraint(c).is_err());
    }

    #[test]
    fn test_constraint_cycle_detected() {
        let (mut registry, a, b) = two_params(1.0, 2.0);
        let ab = registry.add_constraint(Constraint::object(a, "2*", b).unwrap()).unwrap();
        let ba = registry
            .add_constraint(Constraint::functional_with(b, |v| v[0], vec![a]).unwrap())
            .unwrap();
        registry.attach_constraint(b, "a_from_b", ab).unwrap();
        registry.attach_constraint(a, "b_from_a", ba).unwrap();
        assert_eq!(registry.value(a).unwrap(), 4.0);
        assert_eq!(registry.value(b).unwrap(), 4.0);

        assert!(matches!(
            registry.apply_constraint(ab),
            Err(CoreError::ConstraintCycle(_))
        ));
        // the partial cascade is rolled back
        assert_eq!(registry.value(a).unwrap(), 4.0);
        assert_eq!(registry.value(b).unwrap(), 4.0);
    }

    #[test]
    fn test_failed_set_value_leaves_values_unchanged() {
        let mut registry = Registry::with_config(
            RegistryConfig::default().with_undo(true).with_max_constraint_depth(4),
        );
        let a = registry.add_parameter(Parameter::new("a", 1.0));
        let b = registry.add_parameter(Parameter::new("b", 1.0));
        let c = registry.add_parameter(Parameter::new("c", 1.0));
        let b_from_a = registry
            .add_constraint(Constraint::functional_with(b, |v| v[0] + 1.0, vec![a]).unwrap())
            .unwrap();
        let c_from_b = registry.add_constraint(Constraint::object(c, "2*", b).unwrap()).unwrap();
        registry.attach_constraint(a, "b", b_from_a).unwrap();
        registry.attach_constraint(b, "c", c_from_b).unwrap();
        // c re-runs a cap on a, closing the loop
        let cap = registry.add_constraint(Constraint::numeric(a, "<", 100.0).unwrap()).unwrap();
        registry.attach_constraint(c, "a", cap).unwrap();
        registry.stack_mut().clear();
        let before: Vec<f64> = [a, b, c].iter().map(|v| registry.value(*v).unwrap()).collect();

        assert!(registry.set_value(a, 10.0).is_err());
        let after: Vec<f64> = [a, b, c].iter().map(|v| registry.value(*v).unwrap()).collect();
        assert_eq!(before, after);
        assert!(registry.stack().is_empty());
    }

    #[test]
    fn test_nan_rejected() {
        let (mut registry, a, _) = two_params(1.0, 2.0);
        assert!(matches!(registry.set_value(a, f64::NAN), Err(CoreError::InvalidValue(_))));
        assert_eq!(registry.value(a).unwrap(), 1.0);

        let t = registry.add_descriptor(Descriptor::new("temperature", 300.0));
        assert!(matches!(registry.set_value(t, f64::NAN), Err(CoreError::InvalidValue(_))));
        assert_eq!(registry.value(t).unwrap(), 300.0);

        // a constraint producing NaN is refused as well, and rolled back
        let b = registry.add_parameter(Parameter::new("b", 0.5));
        let root = registry
            .add_constraint(Constraint::functional_with(b, |v| v[0].sqrt(), vec![a]).unwrap())
            .unwrap();
        registry.attach_constraint(a, "root", root).unwrap();
        assert!(registry.set_value(a, -4.0).is_err());
        assert_eq!(registry.value(a).unwrap(), 1.0);
        assert_eq!(registry.value(b).unwrap(), 1.0);
    }

    #[test]
    fn test_set_value_checks_descriptor_options() {
        let mut registry = Registry::new();
        let order = registry.add_descriptor(
            Descriptor::new("order", 1.0)
                .with_options(vec![1.0.into(), 2.0.into()])
                .unwrap(),
        );
        assert_eq!(registry.set_value(order, 2.0).unwrap(), 2.0);
        assert!(matches!(registry.set_value(order, 5.0), Err(CoreError::InvalidValue(_))));
        assert_eq!(registry.value(order).unwrap(), 2.0);

        // a constraint cannot push it outside the options either
        let source = registry.add_parameter(Parameter::new("source", 1.0));
        let link = registry
            .add_constraint(Constraint::object(order, "", source).unwrap())
            .unwrap();
        registry.attach_constraint(source, "order", link).unwrap();
        assert!(registry.set_value(source, 3.0).is_err());
        assert_eq!(registry.value(source).unwrap(), 1.0);
        assert_eq!(registry.value(order).unwrap(), 2.0);
    }

    #[test]
    fn test_reenable_refused_when_dependent_taken_over() {
        let mut registry = Registry::new();
        let p0 = registry.add_parameter(Parameter::new("p0", 0.0));
        let p1 = registry.add_parameter(Parameter::new("p1", 1.0));
        let p2 = registry.add_parameter(Parameter::new("p2", 2.0));
        let c1 = registry.add_constraint(Constraint::object(p0, "", p1).unwrap()).unwrap();
        registry.set_constraint_enabled(c1, false).unwrap();
        let c2 = registry.add_constraint(Constraint::object(p0, "", p2).unwrap()).unwrap();

        assert!(matches!(
            registry.set_constraint_enabled(c1, true),
            Err(CoreError::InvalidConstraint(_))
        ));
        assert!(!registry.constraint(c1).unwrap().enabled());
        assert!(!registry.variable(p0).unwrap().enabled());
        assert_eq!(registry.value(p0).unwrap(), 2.0);

        registry.set_constraint_enabled(c2, false).unwrap();
        registry.set_constraint_enabled(c1, true).unwrap();
        assert_eq!(registry.value(p0).unwrap(), 1.0);
    }

    #[test]
    fn test_release_keeps_dependent_driven_by_other() {
        let mut registry = Registry::new();
        let p0 = registry.add_parameter(Parameter::new("p0", 0.0));
        let p1 = registry.add_parameter(Parameter::new("p1", 1.0));
        let p2 = registry.add_parameter(Parameter::new("p2", 2.0));
        let c1 = registry.add_constraint(Constraint::object(p0, "", p1).unwrap()).unwrap();
        // forcing the dependent back on lets a second constraint claim it
        registry.set_enabled(p0, true).unwrap();
        let c2 = registry.add_constraint(Constraint::object(p0, "", p2).unwrap()).unwrap();

        registry.set_constraint_enabled(c1, false).unwrap();
        assert!(!registry.variable(p0).unwrap().enabled());
        assert!(matches!(registry.set_value(p0, 99.0), Err(CoreError::NotEnabled(_))));

        registry.set_constraint_enabled(c1, true).unwrap_err();
        registry.remove_constraint(c2).unwrap();
        assert!(registry.variable(p0).unwrap().enabled());
    }

    #[test]
    fn test_descriptor_as_constraint_source() {
        let mut registry = Registry::new();
        let t = registry.add_descriptor(Descriptor::new("temperature", 300.0));
        let p = registry.add_parameter(Parameter::new("kt", 0.0));
        registry
            .add_constraint(Constraint::object(p, "0.5*", t).unwrap())
            .unwrap();
        assert_eq!(registry.value(p).unwrap(), 150.0);

        let label = registry.add_descriptor(Descriptor::new("label", "x"));
        assert!(matches!(
            registry.add_constraint(Constraint::object(p, "", label).unwrap()),
            Err(CoreError::NotNumeric(_))
        ));
    }

    #[test]
    fn test_undo_reruns_cascade() {
        let mut registry = Registry::with_config(RegistryConfig::default().with_undo(true));
        let p0 = registry.add_parameter(Parameter::new("p0", 1.0));
        let p1 = registry.add_parameter(Parameter::new("p1", 0.0));
        let c = registry.add_constraint(Constraint::object(p1, "2*", p0).unwrap()).unwrap();
        registry.attach_constraint(p0, "double", c).unwrap();

        registry.set_value(p0, 3.0).unwrap();
        assert_eq!(registry.value(p1).unwrap(), 6.0);
        assert_eq!(registry.stack().len(), 1);

        registry.undo().unwrap();
        assert_eq!(registry.value(p0).unwrap(), 1.0);
        assert_eq!(registry.value(p1).unwrap(), 2.0);
        registry.redo().unwrap();
        assert_eq!(registry.value(p1).unwrap(), 6.0);
    }
}
