use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use google_pay_decrypt::{ContextError, GooglePaymentMethodTokenContext, MerchantConfig};
use time::OffsetDateTime;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Decrypt a Google Pay ECv2 payment method token.
#[derive(Parser)]
#[command(name = "google-pay-decrypt", version)]
struct Cli {
    /// Path to the token JSON as received from Google Pay.
    #[arg(long)]
    token: PathBuf,

    /// Merchant private key PEM, optionally labelled as ID=PATH. Repeat for
    /// key rotation; keys are tried in the order given.
    #[arg(long = "key", required = true, value_parser = parse_key_arg)]
    keys: Vec<KeyArg>,

    /// Fail when the decrypted message is past its messageExpiration.
    #[arg(long)]
    check_expiry: bool,
}

#[derive(Clone)]
struct KeyArg {
    identifier: Option<String>,
    path: PathBuf,
}

fn parse_key_arg(value: &str) -> Result<KeyArg, String> {
    match value.split_once('=') {
        Some((identifier, path)) if !identifier.is_empty() && !path.is_empty() => Ok(KeyArg {
            identifier: Some(identifier.to_string()),
            path: PathBuf::from(path),
        }),
        Some(_) => Err(format!("expected ID=PATH, got '{value}'")),
        None => Ok(KeyArg {
            identifier: None,
            path: PathBuf::from(value),
        }),
    }
}

impl Cli {
    fn run(self) -> Result<()> {
        // load the merchant keys; the library only ever sees bytes
        let merchants = self
            .keys
            .iter()
            .map(|key| {
                let pem = std::fs::read(&key.path)
                    .with_context(|| format!("failed to read key {}", key.path.display()))?;
                let config = MerchantConfig::new(pem);
                Ok(match &key.identifier {
                    Some(identifier) => config.with_identifier(identifier.clone()),
                    None => config,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let context = GooglePaymentMethodTokenContext::new(merchants)?;

        let token = std::fs::read_to_string(&self.token)
            .with_context(|| format!("failed to read token {}", self.token.display()))?;

        let message = match context.decrypt_json(&token) {
            Ok(message) => message,
            Err(err @ ContextError::Aggregated { .. }) => {
                for cause in err.causes() {
                    error!(
                        merchant = cause.merchant_identifier.as_deref().unwrap_or("<unnamed>"),
                        error = %cause.error,
                        "decryption attempt failed"
                    );
                }
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        };
        info!(message_id = %message.message_id, "token decrypted");

        if self.check_expiry && message.is_expired_at(OffsetDateTime::now_utc()) {
            bail!(
                "message {} expired at {}",
                message.message_id,
                message.message_expiration
            );
        }

        println!("{}", serde_json::to_string_pretty(&message)?);
        Ok(())
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_argument_forms() {
        let plain = parse_key_arg("keys/new.pem").unwrap();
        assert_eq!(plain.identifier, None);
        assert_eq!(plain.path, PathBuf::from("keys/new.pem"));

        let labelled = parse_key_arg("2024=keys/new.pem").unwrap();
        assert_eq!(labelled.identifier.as_deref(), Some("2024"));
        assert_eq!(labelled.path, PathBuf::from("keys/new.pem"));

        assert!(parse_key_arg("=keys/new.pem").is_err());
        assert!(parse_key_arg("2024=").is_err());
    }

    #[test]
    fn cli_requires_a_key() {
        assert!(Cli::try_parse_from(["google-pay-decrypt", "--token", "t.json"]).is_err());

        let cli = Cli::try_parse_from([
            "google-pay-decrypt",
            "--token",
            "t.json",
            "--key",
            "old=old.pem",
            "--key",
            "new.pem",
        ])
        .unwrap();
        assert_eq!(cli.keys.len(), 2);
        assert_eq!(cli.keys[0].identifier.as_deref(), Some("old"));
        assert!(!cli.check_expiry);
    }
}
