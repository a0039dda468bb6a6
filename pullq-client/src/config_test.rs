use std::time::Duration;

use crate::config::{ClientConfig, ConfigCell, PullSubjectsConfig, SubjectConfig};

const CONFIG_YAML: &str = r#"
pull_request_timeout_ms: 4000
ack_batch_size: 8
subjects:
  orders:
    pull_request_timeout_ms: 1500
  payments: {}
"#;

#[test]
fn yaml_overrides_defaults() {
    let config = ClientConfig::from_yaml(CONFIG_YAML).expect("parse config");

    assert_eq!(config.ack_batch_size, 8);
    // untouched fields keep their defaults
    assert_eq!(config.ack_flush_interval(), Duration::from_millis(1_000));
    assert_eq!(config.destroy_drain_timeout(), Duration::from_millis(5_000));
    assert_eq!(config.offline_flush_timeout(), Duration::from_millis(3_000));

    assert_eq!(config.pull_request_timeout("orders"), Duration::from_millis(1_500));
    assert_eq!(config.pull_request_timeout("payments"), Duration::from_millis(4_000));
    assert_eq!(config.pull_request_timeout("unknown"), Duration::from_millis(4_000));
}

#[test]
fn malformed_yaml_is_a_config_error() {
    let err = ClientConfig::from_yaml("ack_batch_size: [nope]").unwrap_err();
    assert!(matches!(err, crate::errors::ClientError::Config(_)));
}

#[test]
fn config_cell_clones_share_updates() {
    let cell = ConfigCell::new(10u64);
    let reader = cell.clone();
    assert_eq!(reader.snapshot().version, 0);

    cell.set(20);
    assert_eq!(reader.get(), 20);
    assert_eq!(reader.snapshot().version, 1);
}

#[test]
fn apply_reloads_handed_out_timeout_cells() {
    let subjects = PullSubjectsConfig::default();
    let orders = subjects.pull_request_timeout("orders");
    let payments = subjects.pull_request_timeout("payments");
    assert_eq!(orders.get(), Duration::from_millis(8_000));

    let mut reloaded = ClientConfig::default();
    reloaded.pull_request_timeout_ms = 2_000;
    reloaded.subjects.insert(
        "orders".to_string(),
        SubjectConfig {
            pull_request_timeout_ms: Some(500),
        },
    );
    subjects.apply(reloaded);

    assert_eq!(orders.get(), Duration::from_millis(500));
    assert_eq!(payments.get(), Duration::from_millis(2_000));
    // cells created after the reload start from the new config
    assert_eq!(
        subjects.pull_request_timeout("invoices").get(),
        Duration::from_millis(2_000)
    );
    assert_eq!(subjects.client_config().pull_request_timeout_ms, 2_000);
}
