use super::*;

#[test]
fn tool_tag_round_trips() {
    for tool in Tool::ALL {
        assert_eq!(Tool::parse_tag(tool.tag()), Some(tool));
    }
}

#[test]
fn claude_auth_files_include_credentials_json() {
    let specs = Tool::Claude.auth_file_specs();
    assert!(specs.iter().any(|s| s.basename() == ".credentials.json"));
    assert!(specs.iter().any(|s| s.required));
}

#[test]
fn default_rate_limit_patterns_detect_usage_limit_phrase() {
    let patterns = RateLimitPatterns::for_tool(Tool::Codex);
    assert!(patterns.is_match(b"You have hit your usage limit for this session."));
    assert!(!patterns.is_match(b"everything is fine"));
}

#[test]
fn invalid_override_pattern_disables_detection_instead_of_panicking() {
    let patterns = RateLimitPatterns::from_patterns(&["(unclosed".to_owned()]);
    assert!(!patterns.is_match(b"rate limit exceeded"));
}
