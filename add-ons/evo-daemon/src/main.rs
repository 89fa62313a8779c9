//! EVO host daemon (text entry edge).
//!
//! Reads one raw input per stdin line, feeds it through the single-admission engine handle,
//! and prints every `DecisionOutcome` as one JSON line on stdout for the overlay/TTS side.
//! While a confirmation is pending, configured yes/no words answer it; `approve <token>` and
//! `deny <token>` answer a specific request explicitly. Logs go to stderr.

use evo_core::{ConfirmationToken, DecisionEngine, DecisionOutcome, EngineHandle, EvoConfig, MemoryStore};
use evo_skills::default_registry;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often a pending confirmation is checked for expiry while the user is silent.
const EXPIRY_TICK: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[evo-daemon] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = EvoConfig::load()?;
    let memory = Arc::new(MemoryStore::open(&config.storage_path)?);
    let registry = default_registry(&config)?;
    let handle = EngineHandle::new(DecisionEngine::new(registry, memory, &config));

    tracing::info!(
        app = %config.app_name,
        storage_path = %config.storage_path,
        confirm_timeout_secs = config.confirm_timeout_secs,
        "EVO daemon started"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut expiry = tokio::time::interval(EXPIRY_TICK);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::info!("stdin closed; shutting down daemon");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let outcome = reply(&handle, &config, &line).await;
                emit(&outcome);
                if is_exit(&outcome) {
                    tracing::info!("exit requested; shutting down daemon");
                    break;
                }
            }
            _ = expiry.tick() => {
                if let Some(outcome) = handle.expire().await {
                    emit(&outcome);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("CTRL-C received; shutting down daemon");
                break;
            }
        }
    }
    Ok(())
}

/// Routes one line: explicit token answers, yes/no words for the pending request, or a new decision.
async fn reply(handle: &EngineHandle, config: &EvoConfig, line: &str) -> DecisionOutcome {
    if let Some((verb, token)) = explicit_answer(line) {
        return answer(handle, verb, &token).await.unwrap_or(DecisionOutcome::Unhandled);
    }
    if let Some(pending) = handle.pending_confirmation().await {
        let verb = if config.is_confirm_word(line) {
            Some(Verb::Approve)
        } else if config.is_cancel_word(line) {
            Some(Verb::Deny)
        } else {
            None
        };
        if let Some(verb) = verb {
            if let Some(outcome) = answer(handle, verb, &pending.token).await {
                return outcome;
            }
        }
    }
    handle.process(line).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Approve,
    Deny,
}

fn explicit_answer(line: &str) -> Option<(Verb, ConfirmationToken)> {
    let (verb, token) = line.trim().split_once(char::is_whitespace)?;
    let verb = match verb.to_lowercase().as_str() {
        "approve" => Verb::Approve,
        "deny" => Verb::Deny,
        _ => return None,
    };
    token.parse().ok().map(|token| (verb, token))
}

/// `None` when the gate rejected the token (already logged by the core).
async fn answer(handle: &EngineHandle, verb: Verb, token: &ConfirmationToken) -> Option<DecisionOutcome> {
    let result = match verb {
        Verb::Approve => handle.approve(token).await,
        Verb::Deny => handle.deny(token).await,
    };
    match result {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            tracing::warn!(error = %e, "confirmation answer rejected");
            None
        }
    }
}

fn is_exit(outcome: &DecisionOutcome) -> bool {
    matches!(
        outcome,
        DecisionOutcome::Executed { result, .. } if result.action.as_ref().is_some_and(|a| a.name == "app.exit")
    )
}

fn emit(outcome: &DecisionOutcome) {
    match serde_json::to_string(outcome) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::warn!(error = %e, "outcome not serializable"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(dir: &tempfile::TempDir) -> (EngineHandle, EvoConfig) {
        let config = EvoConfig {
            storage_path: dir.path().join("evo_memory").to_string_lossy().into_owned(),
            ..EvoConfig::default()
        };
        let memory = Arc::new(MemoryStore::open(&config.storage_path).unwrap());
        let registry = default_registry(&config).unwrap();
        (EngineHandle::new(DecisionEngine::new(registry, memory, &config)), config)
    }

    #[tokio::test]
    async fn yes_and_no_words_answer_the_pending_request() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, config) = handle(&dir);

        let outcome = reply(&handle, &config, "hibernate").await;
        assert_eq!(outcome.label(), "awaiting_confirmation");
        let outcome = reply(&handle, &config, "No.").await;
        assert_eq!(outcome.label(), "cancelled");

        reply(&handle, &config, "hibernate").await;
        let outcome = reply(&handle, &config, "ok").await;
        assert_eq!(outcome.label(), "executed");
        assert_eq!(outcome.skill(), Some("hibernate"));
    }

    #[tokio::test]
    async fn yes_without_pending_request_is_just_input() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, config) = handle(&dir);
        assert_eq!(reply(&handle, &config, "yes").await, DecisionOutcome::Unhandled);
    }

    #[tokio::test]
    async fn explicit_token_answers() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, config) = handle(&dir);

        let DecisionOutcome::AwaitingConfirmation { token, .. } = reply(&handle, &config, "clear notes").await else {
            panic!("expected confirmation request");
        };
        let outcome = reply(&handle, &config, &format!("deny {}", token)).await;
        assert_eq!(outcome.label(), "cancelled");
        // The consumed token no longer answers anything.
        assert_eq!(
            reply(&handle, &config, &format!("approve {}", token)).await,
            DecisionOutcome::Unhandled
        );
    }

    #[test]
    fn exit_action_stops_the_loop() {
        let outcome = DecisionOutcome::Executed {
            skill: "app_exit".into(),
            result: evo_core::SkillResult::say("bye").with_action(evo_core::HostAction::new("app.exit")),
        };
        assert!(is_exit(&outcome));
        assert!(!is_exit(&DecisionOutcome::Unhandled));
    }
}
