//! Configuration through the crate's public surface, the way the operator
//! CLI assembles it.

use storefront_gate::auth::{Role, RoleTable};
use storefront_gate::config::validation::validate_config;
use storefront_gate::config::{apply_env, GatewayConfig};

fn env(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
    move |name| {
        vars.iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    }
}

#[test]
fn test_environment_overlay_then_mint() {
    let mut config: GatewayConfig = toml::from_str(
        r#"
        [auth.admin]
        expires_secs = 600
        "#,
    )
    .unwrap();
    apply_env(
        &mut config,
        env(&[("JWT_SECRETA", "admin-from-env"), ("JWT_EXPIRESA", "120")]),
    )
    .unwrap();

    assert_eq!(config.auth.admin.secret, "admin-from-env");
    assert_eq!(config.auth.admin.expires_secs, 120);
    assert!(config.auth.user.secret.is_empty());

    let token = RoleTable::from_config(&config.auth)
        .issue(Role::Admin, "subject-1")
        .unwrap();
    assert_eq!(token.split('.').count(), 3);
}

#[test]
fn test_bad_environment_value_is_an_error() {
    let mut config = GatewayConfig::default();
    assert!(apply_env(&mut config, env(&[("RATE_LIMIT_MAX", "plenty")])).is_err());
}

#[test]
fn test_defaults_need_injected_secrets() {
    let errors = validate_config(&GatewayConfig::default()).unwrap_err();
    assert!(errors.iter().any(|e| e.field == "session.secret"));
    assert!(errors.iter().any(|e| e.field == "auth.user.secret"));
}
