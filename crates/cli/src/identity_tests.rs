use super::*;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tempfile::TempDir;

fn make_jwt(payload: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(b"{\"alg\":\"none\"}");
    let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload).expect("serialize"));
    format!("{header}.{body}.sig")
}

#[test]
fn extracts_email_from_claude_credentials_jwt() {
    let dir = TempDir::new().expect("tempdir");
    let payload = serde_json::json!({
        "email": "dev@example.com",
        "organization": "acme",
        "exp": 2_000_000_000u64,
    });
    let token = make_jwt(&payload);
    std::fs::write(dir.path().join(".credentials.json"), serde_json::json!({"accessToken": token}).to_string())
        .expect("write");

    let identity = extract_identity(dir.path(), Tool::Claude).expect("identity");
    assert_eq!(identity.email.as_deref(), Some("dev@example.com"));
    assert_eq!(identity.organization.as_deref(), Some("acme"));
    assert_eq!(identity.expires_at, Some(2_000_000_000));
}

#[test]
fn millisecond_scale_exp_is_downscaled() {
    let dir = TempDir::new().expect("tempdir");
    let payload = serde_json::json!({"email": "a@b.com", "exp": 2_000_000_000_000u64});
    let token = make_jwt(&payload);
    std::fs::write(dir.path().join("auth.json"), serde_json::json!({"id_token": token}).to_string()).expect("write");

    let identity = extract_identity(dir.path(), Tool::Codex).expect("identity");
    assert_eq!(identity.expires_at, Some(2_000_000_000));
}

#[test]
fn missing_file_reports_missing_file_error() {
    let dir = TempDir::new().expect("tempdir");
    let err = extract_identity(dir.path(), Tool::Gemini).unwrap_err();
    assert!(matches!(err, IdentityError::MissingFile));
}

#[test]
fn non_jwt_token_falls_back_to_schemaless_walk() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::write(dir.path().join("auth.json"), serde_json::json!({"access_token": "opaque-token", "account_id": "acct-1"}).to_string())
        .expect("write");

    let identity = extract_identity(dir.path(), Tool::Codex).expect("identity");
    assert_eq!(identity.account_id.as_deref(), Some("acct-1"));
    assert_eq!(identity.provider, "api_key");
}
