use tally_engine::{BuildError, PipelineConfig, SortOrder, Strategy};

#[test]
fn test_config_from_json() {
  let config: PipelineConfig = serde_json::from_str(
    r#"{ "workers": 4, "strategy": "sort_merge", "sort_order": "descending", "block_size": 64 }"#,
  )
  .unwrap();

  assert_eq!(config.workers, Some(4));
  assert_eq!(config.strategy, Strategy::SortMerge);
  assert_eq!(config.sort_order, SortOrder::Descending);
  assert_eq!(config.block_size, 64);
  assert_eq!(config.table_capacity, PipelineConfig::default().table_capacity);

  let pipeline = config.build().unwrap();
  assert_eq!(pipeline.workers(), 4);
  assert_eq!(pipeline.block_size(), 64);
}

#[test]
fn test_empty_config_uses_defaults() {
  let config: PipelineConfig = serde_json::from_str("{}").unwrap();
  assert_eq!(config, PipelineConfig::default());
  assert_eq!(config.strategy, Strategy::Sharded);
}

#[test]
fn test_unknown_fields_and_strategies_are_rejected() {
  assert!(serde_json::from_str::<PipelineConfig>(r#"{ "threads": 4 }"#).is_err());
  assert!(serde_json::from_str::<PipelineConfig>(r#"{ "strategy": "magic" }"#).is_err());
}

#[test]
fn test_invalid_config_fails_to_build() {
  let config = PipelineConfig {
    block_size: 0,
    ..PipelineConfig::default()
  };
  assert_eq!(config.build().unwrap_err(), BuildError::ZeroBlockSize);
}
