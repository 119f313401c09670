use fibre_host::{BoxError, HostError};
use fibre_ioc::Registry;
use fibre_svcs::{KeySettings, RegistryFactory, SvcsPluginConfig};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn registry_factory() -> Result<Registry, BoxError> {
  Ok(Registry::new())
}

fn assert_improperly_configured(result: Result<SvcsPluginConfig, HostError>, message: &str) {
  match result {
    Err(HostError::ImproperlyConfigured(reason)) => assert!(
      reason.contains(message),
      "unexpected reason: {reason}"
    ),
    other => panic!("expected a configuration error, got {other:?}"),
  }
}

#[test]
fn test_no_registry_given() {
  // Building should fail if neither `registry` nor `registry_factory` is provided.
  assert_improperly_configured(
    SvcsPluginConfig::builder().build(),
    "either `registry` or `registry_factory` must be provided",
  );
}

#[test]
fn test_both_registry_and_factory_given() {
  let result = SvcsPluginConfig::builder()
    .registry(Registry::new())
    .registry_factory(RegistryFactory::new(registry_factory))
    .build();

  assert_improperly_configured(
    result,
    "only one of `registry` and `registry_factory` must be provided",
  );
}

#[test]
fn test_defaults() {
  let registry = Arc::new(Registry::new());
  let config = SvcsPluginConfig::builder()
    .registry(registry.clone())
    .build()
    .unwrap();

  assert!(Arc::ptr_eq(config.registry().unwrap(), &registry));
  assert!(config.registry_factory().is_none());
  assert_eq!(config.container_dependency_key(), "svcs_container");
  assert_eq!(config.registry_state_key(), "svcs_registry");
}

#[test]
fn test_factory_source() {
  let config = SvcsPluginConfig::builder()
    .registry_factory(RegistryFactory::new_async(|| async { registry_factory() }))
    .container_dependency_key("container")
    .build()
    .unwrap();

  assert!(config.registry().is_none());
  assert!(config.registry_factory().unwrap().is_async());
  assert_eq!(config.container_dependency_key(), "container");
  assert_eq!(config.registry_state_key(), "svcs_registry");
}

#[test]
fn test_empty_keys_are_rejected() {
  let result = SvcsPluginConfig::builder()
    .registry(Registry::new())
    .registry_state_key("  ")
    .build();

  assert_improperly_configured(result, "`registry_state_key` must not be empty");
}

#[test]
fn test_keys_from_json_fill_in_defaults() {
  let keys: KeySettings = serde_json::from_str(r#"{ "container_dependency_key": "container" }"#).unwrap();

  assert_eq!(
    keys,
    KeySettings {
      container_dependency_key: "container".to_string(),
      registry_state_key: "svcs_registry".to_string(),
    }
  );

  let config = SvcsPluginConfig::builder()
    .registry(Registry::new())
    .keys(keys)
    .build()
    .unwrap();
  assert_eq!(config.container_dependency_key(), "container");
}
