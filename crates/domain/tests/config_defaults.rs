//! Defaults and validation behavior of the configuration tree.

use zipsa_domain::config::{Config, ConfigSeverity, IntentSpec};

fn intent(name: &str, agents: &[&str]) -> IntentSpec {
    IntentSpec {
        name: name.into(),
        display_name: name.into(),
        keywords: vec![],
        confidence_threshold: 0.5,
        suggested_agents: agents.iter().map(|s| s.to_string()).collect(),
        priority: 0,
        task_labels: Default::default(),
        execution_strategy: None,
    }
}

#[test]
fn empty_config_deserializes_with_defaults() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config.memory.shortterm_limit, 3);
    assert_eq!(config.memory.token_limit, 8_000);
    assert_eq!(config.memory.message_limit, 20);
    assert_eq!(config.memory.summary_max_length, 500);
    assert!(config.supervisor.enable_checkpointing);
    assert_eq!(config.teams.max_revisions, 3);
    assert_eq!(config.teams.reuse_window, 5);
    assert_eq!(config.planner.confidence_floor, 0.5);
    assert_eq!(
        config.planner.short_circuit_intents,
        vec!["irrelevant".to_string(), "unclear".to_string()]
    );
}

#[test]
fn validate_flags_missing_intents_as_error() {
    let config: Config = toml::from_str("").unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error && i.field == "intents"));
}

#[test]
fn validate_rejects_unknown_team() {
    let mut config: Config = toml::from_str("").unwrap();
    config.intents = vec![intent("legal_consult", &["search", "astrology"])];
    let issues = config.validate();
    assert!(issues.iter().any(|i| {
        i.severity == ConfigSeverity::Error && i.message.contains("astrology")
    }));
}

#[test]
fn validate_accepts_well_formed_vocabulary() {
    let mut config: Config = toml::from_str("").unwrap();
    config.intents = vec![
        intent("legal_consult", &["search"]),
        intent("comprehensive", &["search", "analysis"]),
        intent("irrelevant", &[]),
        intent("unclear", &[]),
    ];
    let issues = config.validate();
    assert!(
        !issues.iter().any(|i| i.severity == ConfigSeverity::Error),
        "unexpected errors: {issues:?}"
    );
}

#[test]
fn model_for_falls_back_to_default() {
    let config: Config = toml::from_str(
        r#"
        [llm]
        default_model = "gpt-4o-mini"

        [llm.models]
        intent_analysis = "gpt-4o"
        "#,
    )
    .unwrap();
    assert_eq!(config.llm.model_for("intent_analysis"), "gpt-4o");
    assert_eq!(config.llm.model_for("response_synthesis"), "gpt-4o-mini");
}

#[test]
fn full_toml_round_trip() {
    let config: Config = toml::from_str(
        r#"
        [server]
        bind = "0.0.0.0:9000"

        [memory]
        token_limit = 4000

        [[intents]]
        name = "legal_consult"
        display_name = "법률 상담"
        keywords = ["전세", "임대차"]
        confidence_threshold = 0.6
        suggested_agents = ["search"]
        priority = 1

        [[intents]]
        name = "irrelevant"
        display_name = "무관"
        "#,
    )
    .unwrap();
    assert_eq!(config.server.bind, "0.0.0.0:9000");
    assert_eq!(config.memory.token_limit, 4_000);
    assert_eq!(config.intents.len(), 2);
    let legal = config.intent("legal_consult").unwrap();
    assert_eq!(legal.suggested_agents, vec!["search".to_string()]);
    assert_eq!(legal.confidence_threshold, 0.6);
}
