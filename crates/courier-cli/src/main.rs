//! The courier command line.
//!
//! One binary wraps the whole workflow: discover peers on a relay,
//! send them signed (optionally sealed) messages, and drain the inbox
//! once or on a poll loop. Vault creation and relay registration happen
//! transparently on first use.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use courier_core::{
    ensure_ready, poll, receive_once, send_message, shutdown_channel, MessageReport,
    ReceiveOptions, SendOptions, SentMessage,
};
use courier_protocol::{ContentType, MessageType};
use courier_relay::{AgentEntry, RelayClient};
use courier_vault::Vault;

mod output;

use output::{emit_error, emit_json, emit_json_line};

/// Secure agent-to-agent messaging over a store-and-forward relay.
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Relay server URL
    #[arg(
        long,
        global = true,
        env = "COURIER_SERVER",
        default_value = "http://127.0.0.1:8787"
    )]
    server: String,

    /// Vault directory (default: ~/.courier/vault)
    #[arg(long, global = true, env = "COURIER_VAULT_DIR")]
    vault_dir: Option<PathBuf>,

    /// Emit machine-readable JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "COURIER_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Log format
    #[arg(long, global = true, value_parser = ["plain", "json"], default_value = "plain")]
    log_format: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Browse or resolve the relay's agent registry
    Discover {
        /// List registered agents (the default)
        #[arg(long)]
        list: bool,

        /// Resolve one alias to its registry entry
        #[arg(long, value_name = "ALIAS", conflicts_with = "list")]
        resolve: Option<String>,

        /// Maximum entries to list
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Send a message to another agent
    Send {
        /// Recipient alias or vault id
        #[arg(long)]
        to: String,

        /// Intent discriminator, e.g. `translate.text`
        #[arg(long)]
        intent: String,

        /// Message body: JSON, or plain text when it does not parse
        #[arg(long, conflicts_with = "body_file")]
        body: Option<String>,

        /// Read the body from a file instead
        #[arg(long, value_name = "PATH")]
        body_file: Option<PathBuf>,

        /// Message type
        #[arg(long = "type", value_parser = ["request", "notification"], default_value = "request")]
        message_type: String,

        /// Seal the payload for the recipient
        #[arg(long)]
        encrypt: bool,

        /// Time-to-live override in seconds
        #[arg(long)]
        ttl: Option<u64>,

        /// Correlate with an earlier request
        #[arg(long, value_name = "MESSAGE_ID")]
        correlation_id: Option<String>,
    },

    /// Fetch undelivered messages
    Receive {
        /// Maximum messages per fetch
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Open sealed payloads
        #[arg(long)]
        decrypt: bool,

        /// Skip signature verification
        #[arg(long)]
        no_verify: bool,

        /// Acknowledge processed messages back to the relay
        #[arg(long)]
        ack: bool,

        /// Keep polling until interrupted
        #[arg(long)]
        poll: bool,

        /// Poll interval in seconds
        #[arg(long, default_value_t = 5)]
        interval: u64,
    },

    /// Register this vault with the relay (runs automatically on first
    /// send/receive; use this to pick an alias)
    Register {
        /// Alias to register under
        #[arg(long)]
        alias: Option<String>,
    },

    /// Print this vault's public identity
    Identity,

    /// List stored messages
    Log {
        /// Show quarantined messages instead of history
        #[arg(long)]
        quarantine: bool,

        /// Maximum entries
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn setup_logging(log_level: &str, log_format: &str) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(log_level.parse()?);
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if log_format == "json" {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    }
    .context("Failed to set subscriber")?;
    Ok(())
}

fn resolve_vault_dir(vault_dir: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = vault_dir {
        return Ok(dir);
    }
    let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
    Ok(home.join(".courier").join("vault"))
}

/// Machine-readable shape of a successful send.
fn send_output(sent: &SentMessage) -> serde_json::Value {
    serde_json::json!({
        "status": "sent",
        "message_id": sent.message_id,
        "recipient": sent.recipient,
        "conversation_id": sent.conversation_id,
        "encrypted": sent.encrypted,
    })
}

/// Parse a raw body argument: JSON when it parses, plain text otherwise.
fn parse_body(raw: &str) -> (serde_json::Value, ContentType) {
    match serde_json::from_str(raw) {
        Ok(value) => (value, ContentType::Json),
        Err(_) => (serde_json::Value::String(raw.to_string()), ContentType::Text),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;
    if let Err(error) = setup_logging(&cli.log_level, &cli.log_format) {
        eprintln!("error: {error:#}");
        std::process::exit(2);
    }
    if let Err(error) = run(cli).await {
        emit_error(&error, json);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let client = RelayClient::new(&cli.server)?;
    let vault_dir = resolve_vault_dir(cli.vault_dir)?;

    match cli.command {
        Command::Discover {
            resolve, limit, ..
        } => discover(&client, resolve, limit, cli.json).await,
        Command::Send {
            to,
            intent,
            body,
            body_file,
            message_type,
            encrypt,
            ttl,
            correlation_id,
        } => {
            let raw = match (body, body_file) {
                (Some(inline), None) => inline,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("could not read body file {}", path.display()))?,
                (None, None) => "{}".to_string(),
                (Some(_), Some(_)) => unreachable!("clap forbids both"),
            };
            let (body, content_type) = parse_body(&raw);
            let message_type: MessageType = message_type.parse()?;

            let vault = ensure_ready(&vault_dir, &client, None).await?;
            let options = SendOptions {
                recipient: to,
                intent,
                body,
                message_type,
                content_type,
                correlation_id,
                ttl,
                encrypt,
            };
            let sent = send_message(&vault, &client, options).await?;

            if cli.json {
                emit_json(&send_output(&sent));
            } else {
                eprintln!(
                    "sent {} to {}{}",
                    sent.message_id,
                    sent.recipient,
                    if sent.encrypted { " (encrypted)" } else { "" }
                );
            }
            Ok(())
        }
        Command::Receive {
            limit,
            decrypt,
            no_verify,
            ack,
            poll: poll_mode,
            interval,
        } => {
            let vault = ensure_ready(&vault_dir, &client, None).await?;
            let options = ReceiveOptions {
                limit,
                decrypt,
                verify: !no_verify,
                acknowledge: ack,
            };
            if poll_mode {
                run_poll(&vault, &client, &options, interval, cli.json).await
            } else {
                let reports = receive_once(&vault, &client, &options).await?;
                if cli.json {
                    emit_json(&reports);
                } else if reports.is_empty() {
                    eprintln!("no new messages");
                } else {
                    for report in &reports {
                        print_report(report);
                    }
                }
                Ok(())
            }
        }
        Command::Register { alias } => {
            let (mut vault, created) = Vault::open_or_create(&vault_dir)?;
            if created {
                eprintln!("created vault {} at {}", vault.vault_id(), vault_dir.display());
            }
            let chosen = alias
                .or_else(|| vault.alias().map(String::from))
                .unwrap_or_else(courier_core::generate_alias);
            if vault.is_registered_with(client.base_url()) {
                // Already registered here; just claim the alias.
                client.set_alias(&vault, &chosen).await?;
            } else {
                client.register(&vault, Some(&chosen)).await?;
                vault.record_registration(client.base_url())?;
            }
            vault.set_alias(&chosen)?;

            if cli.json {
                emit_json(&serde_json::json!({
                    "vault_id": vault.vault_id(),
                    "alias": chosen,
                    "server": client.base_url(),
                }));
            } else {
                eprintln!("registered {} as '{}'", vault.vault_id(), chosen);
            }
            Ok(())
        }
        Command::Identity => {
            let vault = Vault::open(&vault_dir)?;
            if cli.json {
                emit_json(vault.identity());
            } else {
                let identity = vault.identity();
                eprintln!("vault id:       {}", identity.vault_id);
                eprintln!("alias:          {}", identity.alias.as_deref().unwrap_or("(none)"));
                eprintln!("signing key:    {}", identity.signing_public_key);
                eprintln!("encryption key: {}", identity.encryption_public_key);
                eprintln!("created:        {}", identity.created_at);
                for server in identity.registrations.keys() {
                    eprintln!("registered:     {server}");
                }
            }
            Ok(())
        }
        Command::Log { quarantine, limit } => {
            let vault = Vault::open(&vault_dir)?;
            if quarantine {
                let records = vault.quarantine(limit)?;
                if cli.json {
                    emit_json(&records);
                } else if records.is_empty() {
                    eprintln!("quarantine is empty");
                } else {
                    for record in &records {
                        eprintln!(
                            "{}  {}  reason={}",
                            record.quarantined_at, record.message_id, record.reason
                        );
                    }
                }
            } else {
                let records = vault.history(limit)?;
                if cli.json {
                    emit_json(&records);
                } else if records.is_empty() {
                    eprintln!("history is empty");
                } else {
                    for record in &records {
                        eprintln!(
                            "{}  {}  {}",
                            record.stored_at, record.direction, record.message_id
                        );
                    }
                }
            }
            Ok(())
        }
    }
}

async fn discover(
    client: &RelayClient,
    resolve: Option<String>,
    limit: usize,
    json: bool,
) -> Result<()> {
    match resolve {
        Some(alias) => {
            let entry = client.resolve_alias(&alias).await?;
            if json {
                emit_json(&entry);
            } else {
                print_agent(&entry);
            }
        }
        None => {
            let agents = client.list_agents(limit).await?;
            if json {
                emit_json(&agents);
            } else if agents.is_empty() {
                eprintln!("no agents registered");
            } else {
                for agent in &agents {
                    print_agent(agent);
                }
            }
        }
    }
    Ok(())
}

async fn run_poll(
    vault: &Vault,
    client: &RelayClient,
    options: &ReceiveOptions,
    interval: u64,
    json: bool,
) -> Result<()> {
    let (handle, shutdown) = shutdown_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.trigger();
        }
    });

    eprintln!("polling every {interval}s; ctrl-c to stop");
    poll(
        vault,
        client,
        options,
        Duration::from_secs(interval),
        shutdown,
        |reports| {
            for report in &reports {
                if json {
                    emit_json_line(report);
                } else {
                    print_report(report);
                }
            }
        },
    )
    .await?;
    eprintln!("stopped");
    Ok(())
}

fn print_agent(agent: &AgentEntry) {
    eprintln!(
        "{:<24}  {}  {}",
        agent.alias.as_deref().unwrap_or("-"),
        agent.vault_id,
        if agent.encryption_public_key.is_some() {
            "encryptable"
        } else {
            "plaintext-only"
        }
    );
}

fn print_report(report: &MessageReport) {
    let verified = match report.verified {
        Some(true) => "verified",
        Some(false) => "UNVERIFIED",
        None => "unchecked",
    };
    eprintln!(
        "{}  from {}{}  intent={}  [{}{}{}]",
        report.message_id,
        report.sender.as_deref().unwrap_or("unknown"),
        report
            .sender_alias
            .as_deref()
            .map(|a| format!(" ({a})"))
            .unwrap_or_default(),
        report.intent.as_deref().unwrap_or("?"),
        verified,
        if report.decrypted { ", decrypted" } else { "" },
        if report.quarantined { ", quarantined" } else { "" },
    );
    if let Some(reason) = &report.verification_error {
        eprintln!("    verification: {reason}");
    }
    if let Some(reason) = &report.decryption_error {
        eprintln!("    decryption: {reason}");
    }
    if let Ok(body) = serde_json::to_string(&report.message["payload"]["body"]) {
        eprintln!("    body: {body}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_send() {
        let cli = Cli::try_parse_from([
            "courier", "send", "--to", "agent-b", "--intent", "ping", "--body", "{\"n\":1}",
            "--encrypt",
        ])
        .unwrap();
        match cli.command {
            Command::Send {
                to, intent, encrypt, ..
            } => {
                assert_eq!(to, "agent-b");
                assert_eq!(intent, "ping");
                assert!(encrypt);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_type() {
        let result = Cli::try_parse_from([
            "courier", "send", "--to", "a", "--intent", "i", "--type", "broadcast",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_rejects_body_and_body_file() {
        let result = Cli::try_parse_from([
            "courier",
            "send",
            "--to",
            "a",
            "--intent",
            "i",
            "--body",
            "{}",
            "--body-file",
            "/tmp/x.json",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_send_output_reports_sent_status() {
        let value = send_output(&SentMessage {
            message_id: "msg_1".into(),
            recipient: "vault_b".into(),
            conversation_id: None,
            encrypted: true,
        });
        assert_eq!(value["status"], "sent");
        assert_eq!(value["message_id"], "msg_1");
        assert_eq!(value["recipient"], "vault_b");
        assert_eq!(value["conversation_id"], serde_json::Value::Null);
        assert_eq!(value["encrypted"], true);
    }

    #[test]
    fn test_parse_body_json() {
        let (value, content_type) = parse_body(r#"{"a": 1}"#);
        assert_eq!(value["a"], 1);
        assert_eq!(content_type, ContentType::Json);
    }

    #[test]
    fn test_parse_body_plain_text() {
        let (value, content_type) = parse_body("just words");
        assert_eq!(value, serde_json::Value::String("just words".into()));
        assert_eq!(content_type, ContentType::Text);
    }

    #[test]
    fn test_receive_defaults() {
        let cli = Cli::try_parse_from(["courier", "receive"]).unwrap();
        match cli.command {
            Command::Receive {
                limit,
                decrypt,
                no_verify,
                poll,
                interval,
                ack,
            } => {
                assert_eq!(limit, 10);
                assert!(!decrypt);
                assert!(!no_verify);
                assert!(!poll);
                assert!(!ack);
                assert_eq!(interval, 5);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
