use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use shared::protocol::QueryRequest;
use tokio::{
    net::TcpListener,
    sync::{Mutex, Notify},
};

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Json(StatusCode, Value),
    Text(StatusCode, &'static str),
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self {
            Reply::Json(status, body) => (status, Json(body)).into_response(),
            Reply::Text(status, body) => (status, body).into_response(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ReceivedPart {
    pub name: Option<String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// One gate per endpoint: while `hold` is set, handlers park until released.
#[derive(Default)]
pub(crate) struct Gate {
    hold: AtomicBool,
    arrived: Notify,
    release: Notify,
}

impl Gate {
    pub fn hold(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }

    pub async fn wait_arrival(&self) {
        self.arrived.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    /// Stops holding and lets any parked handler through.
    pub fn open(&self) {
        self.hold.store(false, Ordering::SeqCst);
        self.release.notify_one();
    }

    async fn pass(&self) {
        self.arrived.notify_one();
        if self.hold.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
    }
}

pub(crate) struct BackendState {
    pub upload_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
    pub upload_reply: Mutex<Reply>,
    pub query_reply: Mutex<Reply>,
    pub status_reply: Mutex<Reply>,
    pub uploads: Mutex<Vec<Vec<ReceivedPart>>>,
    pub queries: Mutex<Vec<QueryRequest>>,
    pub upload_gate: Gate,
    pub query_gate: Gate,
}

#[derive(Clone)]
pub(crate) struct MockBackend {
    pub state: Arc<BackendState>,
}

impl MockBackend {
    pub async fn spawn() -> anyhow::Result<(String, MockBackend)> {
        std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
        let backend = MockBackend {
            state: Arc::new(BackendState {
                upload_calls: AtomicUsize::new(0),
                query_calls: AtomicUsize::new(0),
                upload_reply: Mutex::new(Reply::Json(
                    StatusCode::OK,
                    json!({ "session_id": "sess-1", "message": "PDF uploaded and processed" }),
                )),
                query_reply: Mutex::new(Reply::Json(
                    StatusCode::OK,
                    json!({ "answer": "It is a contract." }),
                )),
                status_reply: Mutex::new(Reply::Json(
                    StatusCode::OK,
                    json!({ "status": "ok", "message": "RAG PDF API is running!" }),
                )),
                uploads: Mutex::new(Vec::new()),
                queries: Mutex::new(Vec::new()),
                upload_gate: Gate::default(),
                query_gate: Gate::default(),
            }),
        };

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = Router::new()
            .route("/upload", post(handle_upload))
            .route("/query", post(handle_query))
            .route("/status", get(handle_status))
            .with_state(backend.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok((format!("http://{addr}"), backend))
    }

    pub async fn set_upload_reply(&self, reply: Reply) {
        *self.state.upload_reply.lock().await = reply;
    }

    pub async fn set_query_reply(&self, reply: Reply) {
        *self.state.query_reply.lock().await = reply;
    }

    pub async fn set_status_reply(&self, reply: Reply) {
        *self.state.status_reply.lock().await = reply;
    }

    pub fn upload_calls(&self) -> usize {
        self.state.upload_calls.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> usize {
        self.state.query_calls.load(Ordering::SeqCst)
    }
}

async fn handle_upload(State(backend): State<MockBackend>, mut multipart: Multipart) -> Reply {
    backend.state.upload_calls.fetch_add(1, Ordering::SeqCst);

    let mut parts = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
        parts.push(ReceivedPart {
            name,
            file_name,
            content_type,
            bytes,
        });
    }
    backend.state.uploads.lock().await.push(parts);

    backend.state.upload_gate.pass().await;
    backend.state.upload_reply.lock().await.clone()
}

async fn handle_query(
    State(backend): State<MockBackend>,
    Json(request): Json<QueryRequest>,
) -> Reply {
    backend.state.query_calls.fetch_add(1, Ordering::SeqCst);
    backend.state.queries.lock().await.push(request);

    backend.state.query_gate.pass().await;
    backend.state.query_reply.lock().await.clone()
}

async fn handle_status(State(backend): State<MockBackend>) -> Reply {
    backend.state.status_reply.lock().await.clone()
}
