use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PositionTracking {
    #[default]
    Full,
    StartOnly,
    OffsetOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LexerConfig {
    pub position_tracking: PositionTracking,
    /// `\r\n` is always counted as a single line break.
    pub line_terminators: Vec<char>,
    /// Skip unexpected characters instead of stopping at the first one.
    pub recovery: bool,
    /// Reject patterns whose first characters cannot be computed.
    pub ensure_optimizations: bool,
}

impl Default for LexerConfig {
    fn default() -> Self {
        Self {
            position_tracking: PositionTracking::Full,
            line_terminators: vec!['\n', '\r'],
            recovery: true,
            ensure_optimizations: false,
        }
    }
}

#[test]
fn test_config_defaults() {
    let config: LexerConfig =
        serde_json::from_str(r#"{ "positionTracking": "startOnly", "recovery": false }"#).unwrap();
    assert_eq!(config.position_tracking, PositionTracking::StartOnly);
    assert!(!config.recovery);
    assert_eq!(config.line_terminators, vec!['\n', '\r']);
}
