//! Integration tests for descriptors, parameters, bounds and units.

use approx::assert_relative_eq;
use easycore::objects::{Registry, RegistryConfig};
use easycore::variables::{Bounds, Descriptor, DescriptorValue, Parameter};
use easycore::CoreError;

#[test]
fn test_parameter_value_is_clamped_to_bounds() {
    let mut registry = Registry::new();
    let scale = registry.add_parameter(Parameter::with_bounds("scale", 1.0, 0.0, 10.0).unwrap());

    assert_eq!(registry.set_value(scale, 12.0).unwrap(), 10.0);
    assert_eq!(registry.value(scale).unwrap(), 10.0);
    assert_eq!(registry.set_value(scale, -3.0).unwrap(), 0.0);
    assert_eq!(registry.set_value(scale, 4.5).unwrap(), 4.5);
}

#[test]
fn test_min_max_setters_respect_current_value() {
    let mut registry = Registry::new();
    let p = registry.add_parameter(Parameter::new("p", 5.0));

    registry.set_min(p, 1.0).unwrap();
    registry.set_max(p, 8.0).unwrap();
    assert_eq!(registry.parameter(p).unwrap().bounds(), Bounds::new(1.0, 8.0).unwrap());

    assert!(matches!(registry.set_min(p, 6.0), Err(CoreError::InvalidValue(_))));
    assert!(matches!(registry.set_max(p, 4.0), Err(CoreError::InvalidValue(_))));
    assert!(registry.set_bounds(p, Some(7.0), None).is_err());
}

#[test]
fn test_set_bounds_frees_parameter() {
    let mut registry = Registry::with_config(RegistryConfig::default().with_undo(true));
    let p = registry.add_parameter(Parameter::new("p", 2.0));
    registry.set_fixed(p, true).unwrap();

    registry.set_bounds(p, Some(0.0), Some(3.0)).unwrap();
    let parameter = registry.parameter(p).unwrap();
    assert!(!parameter.fixed());
    assert!(parameter.is_free());
    assert_eq!(registry.stack().undo_text(), Some("Setting bounds"));

    registry.undo().unwrap();
    let parameter = registry.parameter(p).unwrap();
    assert!(parameter.fixed());
    assert!(parameter.min().is_infinite());
}

#[test]
fn test_negative_error_rejected() {
    let mut registry = Registry::new();
    let p = registry.add_parameter(Parameter::new("p", 1.0));
    registry.set_error(p, 0.25).unwrap();
    assert_eq!(registry.parameter(p).unwrap().error(), 0.25);
    assert!(registry.set_error(p, -1.0).is_err());
    assert!(Parameter::new("q", 0.0).with_error(f64::NAN).is_err());
}

#[test]
fn test_descriptor_kinds_and_options() {
    let mut registry = Registry::new();
    let mode = registry.add_descriptor(
        Descriptor::new("mode", "powder")
            .with_options(vec!["powder".into(), "single".into()])
            .unwrap(),
    );
    let flag = registry.add_descriptor(Descriptor::new("polarized", false));

    registry.set_descriptor_value(mode, "single".into()).unwrap();
    assert_eq!(
        registry.descriptor(mode).unwrap().value(),
        &DescriptorValue::Text("single".to_string())
    );
    assert!(registry.set_descriptor_value(mode, "film".into()).is_err());
    assert!(registry.set_descriptor_value(flag, 1.0.into()).is_err());
    assert!(matches!(registry.value(flag), Err(CoreError::NotNumeric(_))));
    assert!(matches!(registry.parameter(flag), Err(CoreError::NotAParameter(_))));
}

#[test]
fn test_unit_conversion_scales_value_error_and_bounds() {
    let mut registry = Registry::new();
    let length = registry.add_parameter(
        Parameter::with_bounds("length", 2.0, 1.0, 3.0)
            .unwrap()
            .with_units("m")
            .with_error(0.1)
            .unwrap(),
    );

    registry.convert_unit(length, "cm").unwrap();
    let parameter = registry.parameter(length).unwrap();
    assert_relative_eq!(parameter.value(), 200.0, max_relative = 1e-12);
    assert_relative_eq!(parameter.error(), 10.0, max_relative = 1e-12);
    assert_relative_eq!(parameter.min(), 100.0, max_relative = 1e-12);
    assert_relative_eq!(parameter.max(), 300.0, max_relative = 1e-12);
    assert_eq!(parameter.units(), "cm");
    assert!(parameter.compatible_units().unwrap().contains(&"angstrom"));

    assert!(matches!(registry.convert_unit(length, "eV"), Err(CoreError::Unit(_))));
}

#[test]
fn test_display_names() {
    let mut registry = Registry::new();
    let p = registry.add_parameter(Parameter::new("a_0", 1.0));
    assert_eq!(registry.variable(p).unwrap().display_name(), "a_0");
    registry.set_display_name(p, Some("a₀")).unwrap();
    assert_eq!(registry.variable(p).unwrap().display_name(), "a₀");
    registry.set_display_name(p, None).unwrap();
    assert_eq!(registry.variable(p).unwrap().display_name(), "a_0");
}

#[test]
fn test_find_variable() {
    let mut registry = Registry::new();
    let a = registry.add_parameter(Parameter::new("a", 1.0));
    registry.add_descriptor(Descriptor::new("b", 2.0));
    assert_eq!(registry.find_variable("a"), Some(a));
    assert_eq!(registry.find_variable("c"), None);
    assert_eq!(registry.variables().count(), 2);
}

#[test]
fn test_numeric_options_hold_through_objects() {
    let mut registry = Registry::new();
    let order = registry.add_descriptor(
        Descriptor::new("order", 1.0)
            .with_options(vec![1.0.into(), 2.0.into()])
            .unwrap(),
    );
    let scale = registry.add_parameter(Parameter::new("scale", 1.0));
    let obj = registry
        .create_object("reflection", vec![("order", order.into()), ("scale", scale.into())])
        .unwrap();

    registry.set_component_value(obj, "order", 2.0).unwrap();
    assert!(matches!(
        registry.set_component_value(obj, "order", 5.0),
        Err(CoreError::InvalidValue(_))
    ));
    assert_eq!(registry.component_value(obj, "order").unwrap(), 2.0);

    assert!(matches!(
        registry.set_component_value(obj, "scale", f64::NAN),
        Err(CoreError::InvalidValue(_))
    ));
    assert_eq!(registry.value(scale).unwrap(), 1.0);
}
