//! First-use bootstrap.
//!
//! `send` and `receive` must work on a machine that has never run
//! courier: open or create the vault, then run challenge-response
//! registration with the relay if this vault has not registered there
//! yet. Both steps are idempotent.

use std::path::Path;

use courier_relay::RelayClient;
use courier_vault::Vault;
use rand::RngCore;
use tracing::info;

use crate::Result;

/// Generate a default alias of the form `agent-xxxxxxxx`.
pub fn generate_alias() -> String {
    let mut suffix = [0u8; 4];
    rand::rngs::OsRng.fill_bytes(&mut suffix);
    format!("agent-{}", hex::encode(suffix))
}

/// Open (or create) the vault at `vault_dir` and make sure it is
/// registered with the relay behind `client`.
///
/// `alias` overrides the stored alias for a fresh registration; when
/// neither is present one is generated.
pub async fn ensure_ready(
    vault_dir: &Path,
    client: &RelayClient,
    alias: Option<&str>,
) -> Result<Vault> {
    let (mut vault, created) = Vault::open_or_create(vault_dir)?;
    if created {
        info!(vault_id = %vault.vault_id(), "created new vault on first use");
    }

    if !vault.is_registered_with(client.base_url()) {
        let chosen = match alias {
            Some(alias) => alias.to_string(),
            None => match vault.alias() {
                Some(existing) => existing.to_string(),
                None => generate_alias(),
            },
        };
        client.register(&vault, Some(&chosen)).await?;
        if vault.alias() != Some(chosen.as_str()) {
            vault.set_alias(&chosen)?;
        }
        vault.record_registration(client.base_url())?;
        info!(
            vault_id = %vault.vault_id(),
            alias = %chosen,
            relay = %client.base_url(),
            "registered with relay"
        );
    }

    Ok(vault)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_alias_shape() {
        let alias = generate_alias();
        assert!(alias.starts_with("agent-"));
        assert_eq!(alias.len(), "agent-".len() + 8);
        assert!(alias["agent-".len()..]
            .chars()
            .all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generated_aliases_differ() {
        assert_ne!(generate_alias(), generate_alias());
    }
}
