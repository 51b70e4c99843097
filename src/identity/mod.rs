//! Identity rotation and health tracking.
//!
//! An identity is a (user-agent, proxy) pairing used to vary request
//! fingerprints. The pool hands out a fresh identity per attempt, tracks
//! which ones have been flagged by the target, and degrades gracefully by
//! resetting the pool when everything has been burned.

use rand::seq::SliceRandom;
use thiserror::Error;
use url::Url;

/// Desktop user agents used when the caller does not supply its own list.
pub static DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.3 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:124.0) Gecko/20100101 Firefox/124.0",
    "Mozilla/5.0 (X11; Linux x86_64; rv:123.0) Gecko/20100101 Firefox/123.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
];

/// Lifecycle state of an identity. Identities are never deleted, only marked
/// `Dead` and excluded from selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityHealth {
    Untested,
    Healthy,
    Dead,
}

/// A (user-agent, proxy) pairing handed out per attempt.
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: usize,
    pub user_agent: String,
    pub proxy: Option<Url>,
    pub health: IdentityHealth,
}

/// Aggregate health view of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolReport {
    pub total: usize,
    pub untested: usize,
    pub healthy: usize,
    pub dead: usize,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity pool is empty; supply at least one user agent")]
    NoHealthyIdentity,
}

/// Pool of rotating identities.
///
/// Selection is random among non-dead entries with no further ordering
/// guarantee. Health survives across `search_jobs` invocations for the
/// lifetime of the owning scraper instance.
#[derive(Debug)]
pub struct IdentityPool {
    entries: Vec<Identity>,
}

impl IdentityPool {
    /// Build the pool from a user-agent list and an optional proxy list.
    ///
    /// With proxies, every (agent, proxy) combination becomes an identity;
    /// without, one identity per agent with direct egress.
    pub fn new<I, S>(user_agents: I, proxies: &[Url]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let agents: Vec<String> = user_agents.into_iter().map(Into::into).collect();
        let mut entries = Vec::new();

        if proxies.is_empty() {
            for agent in &agents {
                push_entry(&mut entries, agent.clone(), None);
            }
        } else {
            for proxy in proxies {
                for agent in &agents {
                    push_entry(&mut entries, agent.clone(), Some(proxy.clone()));
                }
            }
        }

        Self { entries }
    }

    /// Pool with the built-in user agents and no proxies.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_USER_AGENTS.iter().copied(), &[])
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Randomly select an identity whose health is not `Dead`.
    ///
    /// When every identity has been burned the pool resets all entries to
    /// `Untested` and retries once, so callers only see an error for a pool
    /// that was empty to begin with.
    pub fn next_identity(&mut self) -> Result<Identity, IdentityError> {
        if self.entries.is_empty() {
            return Err(IdentityError::NoHealthyIdentity);
        }

        if let Some(identity) = self.pick_alive() {
            return Ok(identity);
        }

        log::warn!("all {} identities marked dead, resetting pool", self.entries.len());
        for entry in &mut self.entries {
            entry.health = IdentityHealth::Untested;
        }

        self.pick_alive().ok_or(IdentityError::NoHealthyIdentity)
    }

    fn pick_alive(&self) -> Option<Identity> {
        let alive: Vec<&Identity> = self
            .entries
            .iter()
            .filter(|entry| entry.health != IdentityHealth::Dead)
            .collect();
        let mut rng = rand::thread_rng();
        alive.choose(&mut rng).map(|entry| (*entry).clone())
    }

    /// Mark an identity as flagged by the target. Idempotent.
    pub fn mark_dead(&mut self, identity: &Identity) {
        if let Some(entry) = self.entries.get_mut(identity.id) {
            entry.health = IdentityHealth::Dead;
        }
    }

    /// Mark an identity as confirmed working. Idempotent; a dead identity is
    /// revived if the orchestrator reports success with it after a reset.
    pub fn mark_healthy(&mut self, identity: &Identity) {
        if let Some(entry) = self.entries.get_mut(identity.id) {
            entry.health = IdentityHealth::Healthy;
        }
    }

    pub fn report(&self) -> PoolReport {
        let mut report = PoolReport {
            total: self.entries.len(),
            untested: 0,
            healthy: 0,
            dead: 0,
        };
        for entry in &self.entries {
            match entry.health {
                IdentityHealth::Untested => report.untested += 1,
                IdentityHealth::Healthy => report.healthy += 1,
                IdentityHealth::Dead => report.dead += 1,
            }
        }
        report
    }
}

fn push_entry(entries: &mut Vec<Identity>, user_agent: String, proxy: Option<Url>) {
    let id = entries.len();
    entries.push(Identity {
        id,
        user_agent,
        proxy,
        health: IdentityHealth::Untested,
    });
}

/// Browser-like header set for an identity's user agent.
///
/// Header names are lowercase so they can feed `reqwest` header maps
/// directly.
pub fn browser_headers(user_agent: &str) -> Vec<(&'static str, String)> {
    vec![
        ("user-agent", user_agent.to_string()),
        (
            "accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8".to_string(),
        ),
        ("accept-language", "en-US,en;q=0.5".to_string()),
        ("upgrade-insecure-requests", "1".to_string()),
        ("sec-fetch-dest", "document".to_string()),
        ("sec-fetch-mode", "navigate".to_string()),
        ("sec-fetch-site", "none".to_string()),
        ("sec-fetch-user", "?1".to_string()),
        ("dnt", "1".to_string()),
    ]
}
