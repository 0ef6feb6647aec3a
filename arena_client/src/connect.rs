//! Joining with retry, falling back to hosting.
//!
//! A client waits for a host to come up, tries a bounded number of times with
//! a pause between attempts, and if nobody answers reports
//! [`JoinOutcome::HostFallback`] so the caller can host the session itself.

use anyhow::Context;
use arena_server::server::SessionHost;
use arena_shared::config::SessionConfig;
use tracing::{info, warn};

use crate::client::SessionClient;

/// Result of [`join_with_retry`].
pub enum JoinOutcome {
    Joined(Box<SessionClient>),
    /// Every attempt failed; nobody is hosting this session.
    HostFallback { attempts: u32 },
}

/// Tries to join the configured session following `cfg.connect`.
pub async fn join_with_retry(cfg: &SessionConfig) -> JoinOutcome {
    let policy = &cfg.connect;

    for attempt in 0..policy.max_attempts {
        let delay = policy.delay_before(attempt);
        if !delay.is_zero() {
            info!(?delay, "Waiting before join attempt");
            tokio::time::sleep(delay).await;
        }

        info!(attempt = attempt + 1, max = policy.max_attempts, "Join attempt");
        match tokio::time::timeout(policy.attempt_timeout(), SessionClient::connect(cfg)).await {
            Ok(Ok(client)) => {
                info!(participant = %client.participant_id, "Join succeeded");
                return JoinOutcome::Joined(Box::new(client));
            }
            Ok(Err(e)) => warn!(attempt = attempt + 1, error = %e, "Join attempt failed"),
            Err(_) => warn!(
                attempt = attempt + 1,
                timeout = ?policy.attempt_timeout(),
                "Join attempt timed out"
            ),
        }
    }

    warn!(attempts = policy.max_attempts, "No host found, falling back to hosting");
    tokio::time::sleep(policy.fallback_delay()).await;
    JoinOutcome::HostFallback {
        attempts: policy.max_attempts,
    }
}

/// Joins the session, hosting it in-process when no host answers.
///
/// The returned host, if any, must be driven with [`SessionHost::step`] or
/// [`SessionHost::run`] by the caller.
pub async fn join_or_host(
    cfg: &SessionConfig,
) -> anyhow::Result<(SessionClient, Option<SessionHost>)> {
    match join_with_retry(cfg).await {
        JoinOutcome::Joined(client) => Ok((*client, None)),
        JoinOutcome::HostFallback { .. } => {
            let mut host = SessionHost::bind(cfg.clone())
                .await
                .context("host fallback")?;
            let local = SessionConfig {
                server_addr: host.local_addr().to_string(),
                ..cfg.clone()
            };

            // The host must process the handshake while we wait for Welcome.
            let connect = SessionClient::connect(&local);
            tokio::pin!(connect);
            let tick = cfg.tick_interval();
            let client = loop {
                tokio::select! {
                    result = &mut connect => break result.context("join own host")?,
                    _ = tokio::time::sleep(tick) => host.step()?,
                }
            };
            info!(addr = %host.local_addr(), "Hosting session");
            Ok((client, Some(host)))
        }
    }
}
