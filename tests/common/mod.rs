//! Common test utilities for integration tests
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use followtide::atproto::{RelationshipPage, SocialGraph};
use followtide::config;
use followtide::data::{
    AccountRecord, CsvLedgerStore, Direction, Ledger, LedgerEntry, LedgerStore, RelationshipKind,
};
use followtide::error::AppError;
use tempfile::TempDir;
use tokio::time::Instant;

pub const OWNER_HANDLE: &str = "me.bsky.social";
pub const OWNER_DID: &str = "did:plc:me";

/// A remote mutation observed by the fake
#[derive(Debug, Clone)]
pub struct MutationCall {
    pub direction: Direction,
    pub did: String,
    pub started_at: Instant,
}

/// A listing request observed by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingCall {
    pub actor: String,
    pub kind: RelationshipKind,
    pub cursor: Option<String>,
}

type ListingKey = (String, RelationshipKind);

/// In-memory social graph with scripted listings
///
/// Cursors are page indexes rendered as strings. Follow records live in a
/// map keyed by DID, so follow/unfollow round-trip like the real service.
#[derive(Default)]
pub struct FakeGraph {
    pages: HashMap<ListingKey, Vec<Vec<AccountRecord>>>,
    failing_listings: HashSet<ListingKey>,
    stuck_pages: HashSet<(ListingKey, usize)>,
    timeouts: Mutex<HashMap<(ListingKey, usize), usize>>,
    failing_dids: HashSet<String>,
    records: Mutex<HashMap<String, String>>,
    next_rkey: Mutex<u64>,
    listings: Mutex<Vec<ListingCall>>,
    mutations: Mutex<Vec<MutationCall>>,
}

impl FakeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the pages returned for `actor`'s listing
    pub fn with_pages(
        mut self,
        actor: &str,
        kind: RelationshipKind,
        pages: Vec<Vec<AccountRecord>>,
    ) -> Self {
        self.pages.insert((actor.to_string(), kind), pages);
        self
    }

    /// Script the operator's graph as single pages, with follow records
    pub fn with_operator_graph(
        self,
        followers: Vec<AccountRecord>,
        follows: Vec<AccountRecord>,
    ) -> Self {
        let dids: Vec<String> = follows.iter().map(|account| account.did.clone()).collect();
        let graph = self
            .with_pages(OWNER_HANDLE, RelationshipKind::Followers, vec![followers])
            .with_pages(OWNER_HANDLE, RelationshipKind::Follows, vec![follows]);
        for did in dids {
            graph.create_record(&did);
        }
        graph
    }

    /// Make every request for this listing fail with a non-timeout error
    pub fn with_failing_listing(mut self, actor: &str, kind: RelationshipKind) -> Self {
        self.failing_listings.insert((actor.to_string(), kind));
        self
    }

    /// Make page `page` hand back the cursor it was requested with
    pub fn with_stuck_cursor(mut self, actor: &str, kind: RelationshipKind, page: usize) -> Self {
        self.stuck_pages.insert(((actor.to_string(), kind), page));
        self
    }

    /// Time out `times` times on page `page` before serving it
    pub fn with_timeouts(mut self, actor: &str, kind: RelationshipKind, page: usize, times: usize) -> Self {
        self.timeouts
            .get_mut()
            .unwrap()
            .insert(((actor.to_string(), kind), page), times);
        self
    }

    /// Reject follow and unfollow calls for `did`
    pub fn with_failing_did(mut self, did: &str) -> Self {
        self.failing_dids.insert(did.to_string());
        self
    }

    pub fn listings(&self) -> Vec<ListingCall> {
        self.listings.lock().unwrap().clone()
    }

    pub fn mutations(&self) -> Vec<MutationCall> {
        self.mutations.lock().unwrap().clone()
    }

    pub fn mutated_dids(&self, direction: Direction) -> Vec<String> {
        self.mutations()
            .into_iter()
            .filter(|call| call.direction == direction)
            .map(|call| call.did)
            .collect()
    }

    /// Whether the fake currently holds a follow record for `did`
    pub fn has_follow_record(&self, did: &str) -> bool {
        self.records.lock().unwrap().contains_key(did)
    }

    fn create_record(&self, did: &str) -> String {
        let mut next = self.next_rkey.lock().unwrap();
        *next += 1;
        let uri = format!("at://{OWNER_DID}/app.bsky.graph.follow/rkey{next}");
        self.records.lock().unwrap().insert(did.to_string(), uri.clone());
        uri
    }

    fn record_mutation(&self, direction: Direction, did: &str) {
        self.mutations.lock().unwrap().push(MutationCall {
            direction,
            did: did.to_string(),
            started_at: Instant::now(),
        });
    }
}

impl SocialGraph for FakeGraph {
    async fn list_relationships(
        &self,
        actor: &str,
        kind: RelationshipKind,
        cursor: Option<&str>,
        _limit: u32,
    ) -> Result<RelationshipPage, AppError> {
        self.listings.lock().unwrap().push(ListingCall {
            actor: actor.to_string(),
            kind,
            cursor: cursor.map(str::to_string),
        });

        let key = (actor.to_string(), kind);
        if self.failing_listings.contains(&key) {
            return Err(AppError::Remote {
                status: 400,
                message: format!("InvalidRequest: listing of {actor} unavailable"),
            });
        }

        let index: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
        if let Some(remaining) = self.timeouts.lock().unwrap().get_mut(&(key.clone(), index)) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AppError::Timeout(format!("page {index} of {actor}")));
            }
        }

        let pages = self.pages.get(&key).cloned().unwrap_or_default();
        let accounts = pages.get(index).cloned().unwrap_or_default();
        let cursor = if self.stuck_pages.contains(&(key, index)) {
            Some(index.to_string())
        } else {
            (index + 1 < pages.len()).then(|| (index + 1).to_string())
        };
        Ok(RelationshipPage { accounts, cursor })
    }

    async fn follow(&self, did: &str) -> Result<String, AppError> {
        self.record_mutation(Direction::Follow, did);
        if self.failing_dids.contains(did) {
            return Err(AppError::Remote {
                status: 400,
                message: format!("InvalidRequest: cannot follow {did}"),
            });
        }
        Ok(self.create_record(did))
    }

    async fn resolve_follow_record(&self, did: &str) -> Result<Option<String>, AppError> {
        Ok(self.records.lock().unwrap().get(did).cloned())
    }

    async fn unfollow(&self, record_uri: &str) -> Result<(), AppError> {
        let did = self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|(_, uri)| uri.as_str() == record_uri)
            .map(|(did, _)| did.clone())
            .unwrap_or_default();
        self.record_mutation(Direction::Unfollow, &did);

        if self.failing_dids.contains(&did) {
            return Err(AppError::Remote {
                status: 400,
                message: format!("InvalidRequest: cannot unfollow {did}"),
            });
        }
        self.records.lock().unwrap().remove(&did);
        Ok(())
    }
}

/// Account record with a handle derived from a short name
pub fn account(name: &str) -> AccountRecord {
    AccountRecord::new(format!("{name}.bsky.social"), name, format!("did:plc:{name}"))
}

pub fn accounts(names: &[&str]) -> Vec<AccountRecord> {
    names.iter().map(|name| account(name)).collect()
}

/// CSV ledger store in a fresh temp directory
pub fn temp_ledger() -> (TempDir, CsvLedgerStore) {
    let dir = TempDir::new().unwrap();
    let store = CsvLedgerStore::new(dir.path());
    (dir, store)
}

/// Overwrite a ledger with rows
pub async fn seed_ledger<L: LedgerStore>(store: &L, ledger: Ledger, entries: Vec<LedgerEntry>) {
    store.replace_all(ledger, &entries).await.unwrap();
}

/// Handles present in a ledger
pub async fn ledger_handles<L: LedgerStore>(store: &L, ledger: Ledger) -> Vec<String> {
    store
        .read_all(ledger)
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.handle)
        .collect()
}

/// Test configuration rooted at `dir`
pub fn test_config(dir: &TempDir) -> config::AppConfig {
    config::AppConfig {
        remote: config::RemoteConfig {
            service_url: "https://bsky.test".to_string(),
            username: OWNER_HANDLE.to_string(),
            password: "app-password".to_string(),
            timeout_seconds: 30,
            page_limit: 100,
        },
        policy: config::PolicyConfig {
            max_follows_per_run: 2000,
            mutation_interval_seconds: 3,
            retention_days: 1.0,
            purge_day: "sat".to_string(),
            purge_retention_days: 0.0001,
            follow_on_purge_day: false,
            testing_mode: false,
        },
        ledger: config::LedgerConfig {
            backend: config::LedgerBackend::Csv,
            directory: dir.path().to_path_buf(),
            sqlite_path: dir.path().join("followtide.db"),
        },
        logging: config::LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
        metrics: config::MetricsConfig::default(),
    }
}
