// tests/common/mod.rs

#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use duel_server::{
    config::{Config, DuelSettings},
    models::{
        protocol::{ClientEvent, ServerEvent},
        question::{Difficulty, Question},
    },
    routes,
    services::{
        Services,
        catalog::InMemoryCatalog,
        generator::StaticQuestionGenerator,
        results::MemoryResultSink,
    },
    session::ChallengeHub,
    state::AppState,
};
use serde_json::Value;
use tokio::sync::mpsc;

pub const COURSE_ID: &str = "rust-101";
pub const TIME_LIMIT: u32 = 10;

/// Question `n` (0-based) has its correct answer at `n % 4`.
pub fn question_bank(count: usize) -> Vec<Question> {
    (0..count)
        .map(|n| Question {
            id: format!("q{}", n + 1),
            text: format!("Question {}", n + 1),
            options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            correct_answer: n % 4,
            explanation: Some("Because".into()),
            difficulty: Difficulty::Medium,
            time_limit_secs: TIME_LIMIT,
        })
        .collect()
}

pub fn correct_answer_for(question_number: u64) -> usize {
    ((question_number - 1) % 4) as usize
}

pub struct Fixture {
    pub hub: Arc<ChallengeHub>,
    pub results: Arc<MemoryResultSink>,
}

pub fn fixture(settings: DuelSettings) -> Fixture {
    fixture_with(settings, question_bank(5), MemoryResultSink::default())
}

pub fn fixture_with(
    settings: DuelSettings,
    questions: Vec<Question>,
    results: MemoryResultSink,
) -> Fixture {
    let results = Arc::new(results);
    let services = Services {
        catalog: Arc::new(InMemoryCatalog::default().with_course(COURSE_ID, "Rust 101")),
        generator: Arc::new(StaticQuestionGenerator::new(questions)),
        results: results.clone(),
    };
    Fixture {
        hub: ChallengeHub::new(services, settings),
        results,
    }
}

/// A fake socket driving the hub directly.
pub struct TestClient {
    pub hub: Arc<ChallengeHub>,
    pub connection_id: String,
    pub user_id: Option<String>,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
    /// Every event received so far, as sent on the wire.
    pub seen: Vec<Value>,
}

impl TestClient {
    pub fn connect(hub: &Arc<ChallengeHub>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection_id = hub.connect(tx);
        Self {
            hub: hub.clone(),
            connection_id,
            user_id: None,
            rx,
            seen: Vec::new(),
        }
    }

    pub async fn identified(hub: &Arc<ChallengeHub>, user_id: &str, user_name: &str) -> Self {
        let mut client = Self::connect(hub);
        client
            .send(serde_json::json!({
                "event": "identify",
                "data": { "userId": user_id, "userName": user_name }
            }))
            .await;
        client.expect("identified").await;
        client.user_id = Some(user_id.to_string());
        client
    }

    pub async fn send(&mut self, frame: Value) {
        let event: ClientEvent = serde_json::from_value(frame).expect("valid client frame");
        self.hub.handle_event(&self.connection_id, event).await;
    }

    /// Waits for the next event called `name`, skipping others. Returns its `data`.
    pub async fn expect(&mut self, name: &str) -> Value {
        let wait = async {
            loop {
                let event = self.rx.recv().await.expect("connection closed");
                let value = serde_json::to_value(&event).unwrap();
                self.seen.push(value.clone());
                if value["event"] == name {
                    return value["data"].clone();
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(300), wait)
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {}", name))
    }

    /// Everything already queued, without waiting.
    pub fn drain(&mut self) -> Vec<Value> {
        let mut drained = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            let value = serde_json::to_value(&event).unwrap();
            self.seen.push(value.clone());
            drained.push(value);
        }
        drained
    }

    pub async fn disconnect(self) {
        self.hub.disconnect(&self.connection_id).await;
    }
}

pub fn count_events(events: &[Value], name: &str) -> usize {
    events.iter().filter(|e| e["event"] == name).count()
}

pub fn test_config(settings: DuelSettings) -> Config {
    Config {
        database_url: None,
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        question_service_url: None,
        question_service_key: None,
        question_bank_file: None,
        course_file: None,
        cors_origins: vec!["http://localhost:3000".to_string()],
        duel: settings,
    }
}

/// Spawns the app on a random port. Returns the base address
/// (e.g., "127.0.0.1:12345") and the hub behind it.
pub async fn spawn_app(settings: DuelSettings) -> (String, Arc<ChallengeHub>) {
    let fixture = fixture(settings.clone());
    let state = AppState {
        hub: fixture.hub.clone(),
        pool: None,
        config: test_config(settings),
    };

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let address = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (address, fixture.hub)
}
