use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeLocationTracking {
    #[default]
    Full,
    StartOnly,
    OffsetOnly,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParserConfig {
    /// Upper bound of `k`, the number of tokens a decision may inspect.
    pub max_lookahead: usize,
    pub position_tracking: NodeLocationTracking,
    pub recovery: bool,
    /// When disabled rule bodies only produce their own return values.
    pub output_cst: bool,
    /// Ambiguities and empty alternatives fail compilation.
    pub strict: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_lookahead: 3,
            position_tracking: NodeLocationTracking::Full,
            recovery: false,
            output_cst: true,
            strict: true,
        }
    }
}

#[test]
fn test_config_defaults() {
    let config: ParserConfig =
        serde_json::from_str(r#"{ "maxLookahead": 2, "positionTracking": "none" }"#).unwrap();
    assert_eq!(config.max_lookahead, 2);
    assert_eq!(config.position_tracking, NodeLocationTracking::None);
    assert!(config.output_cst);
    assert!(config.strict);
    assert!(!config.recovery);
}
