//! Output conventions.
//!
//! Machine output (`--json`) goes to stdout; everything meant for a
//! human (status lines, diagnostics) goes to stderr, so piping the
//! JSON never picks up prose. Failures in JSON mode are a structured
//! `{error, code}` object on stderr.

use courier_core::CoreError;
use courier_relay::RelayError;
use courier_vault::VaultError;
use serde::Serialize;
use serde_json::json;

/// Print a machine-readable value on stdout.
pub fn emit_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(rendered) => println!("{rendered}"),
        Err(error) => eprintln!("error: could not render output: {error}"),
    }
}

/// Print one compact JSON object per line (poll mode).
pub fn emit_json_line<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(rendered) => println!("{rendered}"),
        Err(error) => eprintln!("error: could not render output: {error}"),
    }
}

/// Print a failure; structured in JSON mode, prose otherwise.
pub fn emit_error(error: &anyhow::Error, json: bool) {
    if json {
        let payload = json!({
            "error": error.to_string(),
            "code": error_code(error),
        });
        eprintln!("{payload}");
    } else {
        eprintln!("error: {error:#}");
    }
}

/// Stable machine code for an error, for scripting against `--json`.
pub fn error_code(error: &anyhow::Error) -> String {
    if let Some(core) = error.downcast_ref::<CoreError>() {
        return core_error_code(core);
    }
    if let Some(relay) = error.downcast_ref::<RelayError>() {
        return relay_error_code(relay);
    }
    if let Some(vault) = error.downcast_ref::<VaultError>() {
        return vault_error_code(vault);
    }
    "error".into()
}

fn core_error_code(error: &CoreError) -> String {
    match error {
        CoreError::Vault(vault) => vault_error_code(vault),
        CoreError::Relay(relay) => relay_error_code(relay),
        CoreError::Protocol(_) => "invalid_message".into(),
        CoreError::Crypto(_) => "crypto_error".into(),
        CoreError::MissingEncryptionKey { .. } => "missing_encryption_key".into(),
    }
}

fn relay_error_code(error: &RelayError) -> String {
    match error {
        RelayError::Unavailable(_) => "relay_unavailable".into(),
        RelayError::NotFound { .. } => "not_found".into(),
        // Prefer the relay's own code when it sent one.
        RelayError::Rejected {
            code: Some(code), ..
        } => code.clone(),
        RelayError::Rejected { .. } => "relay_rejected".into(),
        RelayError::InvalidResponse(_) => "invalid_response".into(),
        RelayError::Protocol(_) => "invalid_message".into(),
    }
}

fn vault_error_code(error: &VaultError) -> String {
    match error {
        VaultError::NotInitialized { .. } => "vault_not_found".into(),
        VaultError::AlreadyExists { .. } => "vault_exists".into(),
        VaultError::Corrupt { .. } => "vault_corrupt".into(),
        _ => "vault_error".into(),
    }
}
