//! Linking parameters with constraints.
//!
//! This example builds two peaks sharing a scale parameter, links their
//! positions, caps a width and walks the undo history.

use easycore::constraints::{BoundKind, Constraint};
use easycore::objects::{Registry, RegistryConfig};
use easycore::variables::Parameter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Constraints example");
    println!("===================\n");

    let mut registry = Registry::with_config(RegistryConfig::default().with_undo(true));
    let scale = registry.add_parameter(Parameter::new("scale", 1.0));
    let pos1 = registry.add_parameter(Parameter::with_bounds("position", 1.0, 0.0, 10.0)?);
    let pos2 = registry.add_parameter(Parameter::with_bounds("position", 2.0, 0.0, 10.0)?);
    let width = registry.add_parameter(Parameter::new("width", 0.1).with_units("deg"));

    let first = registry.create_object("first", vec![("position", pos1.into()), ("scale", scale.into())])?;
    let second = registry.create_object(
        "second",
        vec![("position", pos2.into()), ("width", width.into()), ("scale", scale.into())],
    )?;
    let peaks = registry.create_collection("peaks", vec![first.into(), second.into()])?;

    // 1. Second peak sits 1.5 above the first
    println!("1. Object constraint");
    println!("--------------------");
    let offset = registry.add_constraint(Constraint::object(pos2, "1.5+", pos1)?)?;
    registry.attach_constraint(pos1, "second position", offset)?;
    registry.set_value(pos1, 3.0)?;
    println!("position 1 = {}, position 2 = {}", registry.value(pos1)?, registry.value(pos2)?);
    if let Err(err) = registry.set_value(pos2, 7.0) {
        println!("setting position 2 directly: {err}");
    }

    // 2. Width stays below 0.5 and positive
    println!("\n2. Numeric and self constraints");
    println!("-------------------------------");
    let cap = registry.add_constraint(Constraint::numeric(width, "<", 0.5)?)?;
    registry.attach_constraint(width, "cap", cap)?;
    registry.set_min(width, 0.0)?;
    let positive = registry.add_constraint(Constraint::self_bound(width, ">=", BoundKind::Min)?)?;
    registry.attach_constraint(width, "positive", positive)?;
    println!("set width 0.8 -> {}", registry.set_value(width, 0.8)?);

    // 3. A functional constraint
    println!("\n3. Functional constraint");
    println!("------------------------");
    let total = registry.add_parameter(Parameter::new("total", 0.0));
    let sum = registry.add_constraint(Constraint::functional_with(total, |v| v[0] + v[1], vec![pos1, pos2])?)?;
    registry.attach_constraint(pos1, "total", sum)?;
    registry.set_value(pos1, 2.0)?;
    println!("total = {}", registry.value(total)?);

    println!("\nfit parameters: {}", registry.get_fit_parameters(peaks.into())?.len());
    for (id, key, cid) in registry.object_constraints(peaks.into())? {
        println!("  {id} [{key}]: {}", registry.constraint(cid)?);
    }

    // 4. Walk back
    println!("\n4. Undo");
    println!("-------");
    while registry.stack().can_undo() {
        let text = registry.stack().undo_text().unwrap_or_default().to_string();
        registry.undo()?;
        println!("undid: {text}");
    }
    println!("position 1 = {}, position 2 = {}", registry.value(pos1)?, registry.value(pos2)?);

    Ok(())
}
