//! Shared fixtures for integration tests
//!
//! - `seed.toml`: two organisations, three projects, a mix of source states
//! - `TestServer`: the full HTTP stack bound to an ephemeral localhost port

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dataprep_processing::api::hash_token;
use dataprep_processing::config::{ServerConfig, TokenGrant};
use dataprep_processing::seed::SeedFile;
use dataprep_processing::{App, RunStatus, RunStore, RunSupervisor, SqliteRunStore};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Token for user 7 of organisation 1
pub const ALICE: &str = "alice-secret-token";
/// Token for user 8 of organisation 2
pub const BOB: &str = "bob-secret-token";

/// Organisation 1, two ready sources totalling 120 records plus one errored source
pub const PROJECT_READY: i64 = 1;
/// Organisation 1, sources only pending
pub const PROJECT_NO_READY: i64 = 2;
/// Organisation 2, one ready source
pub const PROJECT_OTHER_ORG: i64 = 3;

pub fn seed_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/seed.toml")
}

/// In-memory store loaded with `seed.toml`.
pub fn seeded_store() -> Arc<SqliteRunStore> {
    let store = SqliteRunStore::open_in_memory().expect("open store");
    SeedFile::load(&seed_path())
        .expect("load seed")
        .apply(&store)
        .expect("apply seed");
    Arc::new(store)
}

pub fn test_config(stage_delay: Duration) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.pipeline.dispatch_delay_ms = 0;
    config.pipeline.stage_delay_ms = stage_delay.as_millis() as u64;
    config.auth.tokens = vec![
        TokenGrant {
            token_sha256: hash_token(ALICE),
            user_id: 7,
            organisation_id: 1,
        },
        TokenGrant {
            token_sha256: hash_token(BOB),
            user_id: 8,
            organisation_id: 2,
        },
    ];
    config
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub store: Arc<SqliteRunStore>,
    pub supervisor: Arc<RunSupervisor>,
    pub shutdown: CancellationToken,
    handle: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    pub async fn start(stage_delay: Duration) -> Self {
        let store = seeded_store();
        let config = test_config(stage_delay);
        let shutdown = CancellationToken::new();

        let app = App::new(&config, store.clone(), shutdown.clone());
        let supervisor = Arc::clone(app.supervisor());

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let handle = tokio::spawn(app.serve(listener, shutdown.clone(), Duration::from_secs(5)));

        Self {
            addr,
            store,
            supervisor,
            shutdown,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}/api{}", self.addr, path)
    }

    /// Poll until the run leaves PROCESSING.
    pub async fn wait_for_terminal(&self, run_id: i64) -> RunStatus {
        for _ in 0..500 {
            let run = self.store.get_run(run_id).expect("get run").expect("run exists");
            if run.status != RunStatus::Processing {
                return run.status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run {} still processing", run_id);
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        self.handle
            .await
            .expect("server task panicked")
            .expect("server error");
    }
}
