//! Registry Tests
//!
//! Kept in their own binary because `reset_registry` clears process-wide
//! state that the rendering tests rely on.

use serde_json::json;

use snowdrift_core::component::registry::{is_registered, registered_tags, reset_registry};
use snowdrift_core::component::{create_component, register_factory, register_template};
use snowdrift_core::template::{element, interp};
use snowdrift_core::{flush, Component, Error};

/// Test the full registration lifecycle in one place, since every step
/// shares the global table.
#[test]
fn registration_lifecycle() {
    reset_registry();
    assert!(registered_tags().is_empty());

    register_template("greeting", element("p").child(interp("name"))).unwrap();
    register_factory("fixed", |_| {
        Ok(Component::from_value(element("hr"), json!({})))
    })
    .unwrap();
    assert_eq!(registered_tags(), vec!["fixed".to_string(), "greeting".to_string()]);

    let err = register_template("greeting", element("div")).unwrap_err();
    assert!(matches!(err, Error::DuplicateRegistration(tag) if tag == "greeting"));

    let greeting = create_component("greeting", json!({ "name": "Ada" })).unwrap();
    flush().unwrap();
    assert_eq!(greeting.html(), "<p>Ada</p>");

    // Null props become an empty record
    let empty = create_component("greeting", serde_json::Value::Null).unwrap();
    flush().unwrap();
    assert_eq!(empty.html(), "<p></p>");

    reset_registry();
    assert!(!is_registered("greeting"));
    assert!(matches!(
        create_component("greeting", json!({})),
        Err(Error::UnregisteredTag(_))
    ));

    // Tags can be registered again after a reset
    register_template("greeting", element("div")).unwrap();
    assert!(is_registered("greeting"));
}
