//! Integration test common infrastructure.
//!
//! Drives the hub fabric in-process: scripted clients register real
//! connection records and outbound queues, invoke methods through the
//! dispatch registry, and assert on the event frames they receive.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use palaver_proto::names::method;
use palaver_proto::{ClientFrame, ServerFrame};
use palaverd::auth::{AuthUser, InMemoryAuthProvider};
use palaverd::config::Config;
use palaverd::handlers::{Context, Registry};
use palaverd::repo::MemoryRepository;
use palaverd::state::{Fabric, OutboundHandle};
use serde_json::Value;
use uuid::Uuid;

pub use palaver_proto::args;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// An in-process hub with injectable collaborators.
pub struct TestHub {
    pub fabric: Arc<Fabric>,
    pub registry: Arc<Registry>,
    pub auth: Arc<InMemoryAuthProvider>,
    pub repo: Arc<MemoryRepository>,
    pub config: Config,
}

impl TestHub {
    /// Hub with test-friendly limits (no flood throttling in the way).
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Hub with tweaked limits.
    pub fn with_config(tweak: impl FnOnce(&mut Config)) -> Self {
        let mut config = Config::default();
        config.rate_limits.message_rate_per_second = 10_000;
        config.rate_limits.typing_rate_per_second = 10_000;
        config.rate_limits.connection_burst_per_ip = 10_000;
        tweak(&mut config);

        let repo = Arc::new(MemoryRepository::new());
        let auth = Arc::new(InMemoryAuthProvider::new());
        let fabric = Fabric::new(&config, repo.clone(), auth.clone());
        Self {
            fabric,
            registry: Arc::new(Registry::new()),
            auth,
            repo,
            config,
        }
    }

    /// Open an unauthenticated connection (handshake state).
    pub fn connect_raw(&self) -> TestClient {
        let conn_id = Uuid::new_v4().to_string();
        let outbound = OutboundHandle::new(self.config.limits.outbound_queue_frames);
        self.fabric.connections.register(&conn_id, outbound.clone());
        TestClient {
            conn_id,
            user_id: String::new(),
            outbound,
            fabric: self.fabric.clone(),
            registry: self.registry.clone(),
        }
    }

    /// Open and authenticate a connection for `user_id`, draining the
    /// handshake and initial-state events.
    pub async fn connect(&self, user_id: &str, username: &str) -> TestClient {
        self.connect_with_user(AuthUser::new(
            user_id,
            username,
            palaver_proto::Role::User,
        ))
        .await
    }

    /// Like [`Self::connect`] but with full control over the identity.
    pub async fn connect_with_user(&self, user: AuthUser) -> TestClient {
        let token = format!("token-{}-{}", user.user_id, Uuid::new_v4());
        let user_id = user.user_id.clone();
        self.auth.insert(&token, user);

        let mut client = self.connect_raw();
        client.user_id = user_id;
        client
            .invoke(method::AUTHENTICATE, args![token])
            .await;
        client.expect_event("AuthenticationSuccess").await;
        client.drain();
        client
    }
}

/// A scripted client bound to one connection record.
pub struct TestClient {
    pub conn_id: String,
    pub user_id: String,
    outbound: OutboundHandle,
    fabric: Arc<Fabric>,
    registry: Arc<Registry>,
}

impl TestClient {
    /// Invoke a hub method as this connection.
    pub async fn invoke(&self, method_name: &str, arguments: Vec<Value>) {
        let frame = ClientFrame::new(method_name, arguments);
        let ctx = Context {
            conn_id: &self.conn_id,
            fabric: &self.fabric,
        };
        self.registry.dispatch(&ctx, &frame).await;
    }

    /// Next queued event, or panic after a timeout.
    pub async fn recv(&self) -> Arc<ServerFrame> {
        tokio::time::timeout(RECV_TIMEOUT, self.outbound.pop())
            .await
            .expect("timed out waiting for an event")
            .expect("outbound queue closed")
    }

    /// Next queued event if one is already pending.
    pub fn try_recv(&self) -> Option<Arc<ServerFrame>> {
        self.outbound.try_pop()
    }

    /// Drain until an event with the given name arrives, discarding
    /// everything before it.
    pub async fn expect_event(&self, name: &str) -> Arc<ServerFrame> {
        loop {
            let frame = self.recv().await;
            if frame.name == name {
                return frame;
            }
        }
    }

    /// Assert that no event with the given name is currently queued.
    pub fn assert_no_event(&self, name: &str) {
        let mut rest = Vec::new();
        while let Some(frame) = self.try_recv() {
            assert_ne!(frame.name, name, "unexpected {name} event: {frame:?}");
            rest.push(frame);
        }
        // Put everything back for later assertions.
        for frame in rest {
            self.outbound.push(frame);
        }
    }

    /// Collect every currently queued event with the given name.
    pub fn collect_events(&self, name: &str) -> Vec<Arc<ServerFrame>> {
        let mut matching = Vec::new();
        let mut rest = Vec::new();
        while let Some(frame) = self.try_recv() {
            if frame.name == name {
                matching.push(frame);
            } else {
                rest.push(frame);
            }
        }
        for frame in rest {
            self.outbound.push(frame);
        }
        matching
    }

    /// Number of events currently queued.
    pub fn pending(&self) -> usize {
        self.outbound.len()
    }

    /// Discard everything currently queued.
    pub fn drain(&self) {
        while self.try_recv().is_some() {}
    }

    /// Tear the connection down through the canonical cleanup path.
    pub async fn disconnect(&self) {
        self.fabric.disconnect(&self.conn_id).await;
    }
}
