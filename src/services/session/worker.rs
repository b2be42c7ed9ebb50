//! Session worker thread.
//!
//! One dedicated OS thread per session owns the `Session` and runs it on a
//! `smol` executor. Callers talk to it through a cloneable `SessionHandle`.
//!
//! ```text
//!   SessionHandle ──(request, reply sender)──► worker thread
//!         ▲                                        │
//!         └──────────── bounded(1) reply ──────────┘
//! ```
//!
//! Requests are handled strictly in arrival order, one at a time, and each
//! one gets exactly one response. The worker stops once every handle is
//! dropped, releasing the engine on the way out.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use async_channel::{Receiver, Sender};

use super::core::{ExecOutcome, Session, TablePage};
use super::messages::{Request, Response, UpdateKind};
use crate::config::SessionConfig;
use crate::errors::{Result, SessionError};

struct Envelope {
    id: u64,
    request: Request,
    reply: Sender<Response>,
}

/// Owns a session and serves requests for it.
pub struct SessionWorker {
    session: Session,
    receiver: Receiver<Envelope>,
}

impl SessionWorker {
    /// Create a worker and the handle that feeds it, without starting it.
    pub fn channel(config: SessionConfig) -> (Self, SessionHandle) {
        let (sender, receiver) = async_channel::unbounded();
        let worker = Self {
            session: Session::new(config),
            receiver,
        };
        let handle = SessionHandle {
            sender,
            next_id: Arc::new(AtomicU64::new(1)),
        };
        (worker, handle)
    }

    /// Start a worker on its own thread.
    pub fn spawn(config: SessionConfig) -> std::io::Result<(SessionHandle, JoinHandle<()>)> {
        let (worker, handle) = Self::channel(config);
        let thread = std::thread::Builder::new()
            .name("liteview-session".to_string())
            .spawn(move || smol::block_on(worker.run()))?;
        Ok((handle, thread))
    }

    /// Serve requests until every handle is gone.
    pub async fn run(mut self) {
        tracing::info!("Session worker started");

        while let Ok(Envelope { id, request, reply }) = self.receiver.recv().await {
            let action = request.action();
            tracing::debug!(request_id = id, action, "Handling request");

            let response = match self.dispatch(request).await {
                Ok(response) => response,
                Err(e) => {
                    if e.is_fatal() {
                        tracing::error!(request_id = id, action, error = %e, "Request failed");
                    } else {
                        tracing::warn!(request_id = id, action, error = %e, "Request failed");
                    }
                    Response::error(&e)
                }
            };

            tracing::debug!(
                request_id = id,
                action,
                response = response.action(),
                "Request complete"
            );
            if reply.send(response).await.is_err() {
                tracing::debug!(request_id = id, "Caller went away before the reply");
            }
        }

        self.session.release().await;
        tracing::info!("Session worker stopped");
    }

    async fn dispatch(&mut self, request: Request) -> Result<Response> {
        let session = &mut self.session;

        match request {
            Request::Init => session.init().await.map(Response::init_complete),
            Request::OpenFile { file } => session.open_file(file).await.map(Response::init_complete),
            Request::GetTableData(page) | Request::Refresh(page) => {
                session.table_page(&page).await.map(page_response)
            }
            Request::Exec(exec) => {
                let outcome = session.exec(&exec.query, &exec.page).await?;
                Ok(exec_response(session, outcome))
            }
            Request::ExecBatch(batch) => {
                let outcome = session.exec_batch(&batch.queries, &batch.page).await?;
                Ok(exec_response(session, outcome))
            }
            Request::Download => {
                let bytes = session.download().await?;
                Ok(Response::DownloadComplete { bytes })
            }
            Request::Update(update) => {
                session
                    .update(
                        &update.table,
                        &update.columns,
                        &update.values,
                        &update.primary_value,
                    )
                    .await?;
                Ok(Response::UpdateComplete {
                    kind: UpdateKind::Updated,
                })
            }
            Request::Delete(delete) => {
                session.delete(&delete.table, &delete.primary_value).await?;
                Ok(Response::UpdateComplete {
                    kind: UpdateKind::Deleted,
                })
            }
            Request::Insert(insert) => {
                session
                    .insert(&insert.table, &insert.columns, &insert.values)
                    .await?;
                Ok(Response::InsertComplete)
            }
            Request::Export(export) => {
                let spec = export.into_spec(session.config().max_page_size)?;
                let results = session.export(&spec).await?;
                Ok(Response::ExportComplete { results })
            }
        }
    }
}

fn page_response(page: TablePage) -> Response {
    Response::QueryComplete {
        results: page.results,
        max_size: page.max_size,
    }
}

fn exec_response(session: &Session, outcome: ExecOutcome) -> Response {
    match outcome {
        ExecOutcome::SchemaChanged => Response::update_instance(session.catalog()),
        ExecOutcome::Rows(results) => Response::CustomQueryComplete { results },
        ExecOutcome::Page(page) => page_response(page),
    }
}

/// Cloneable handle to a running session worker.
#[derive(Clone)]
pub struct SessionHandle {
    sender: Sender<Envelope>,
    next_id: Arc<AtomicU64>,
}

impl SessionHandle {
    /// Send a request and wait for its response.
    ///
    /// Session failures arrive as `Response::QueryError`; `Err` only means
    /// the worker is gone.
    pub async fn send(&self, request: Request) -> Result<Response> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, response) = async_channel::bounded(1);

        self.sender
            .send(Envelope { id, request, reply })
            .await
            .map_err(|_| SessionError::WorkerClosed)?;

        response.recv().await.map_err(|_| SessionError::WorkerClosed)
    }

    /// Parse a JSON request and send it.
    ///
    /// Requests that fail to parse never reach the worker.
    pub async fn send_json(&self, text: &str) -> Result<Response> {
        let request = Request::from_json(text)?;
        self.send(request).await
    }

    /// Id the next request will carry.
    pub fn next_request_id(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::database::traits::Value;
    use crate::services::session::messages::{InsertRequest, PageRequest};

    fn start() -> (SessionHandle, JoinHandle<()>) {
        SessionWorker::spawn(SessionConfig::default()).unwrap()
    }

    fn page(response: Response) -> (usize, u64) {
        match response {
            Response::QueryComplete { results, max_size } => (results.len(), max_size),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn test_orders_scenario() {
        let (handle, thread) = start();
        smol::block_on(async {
            let response = handle.send(Request::Init).await.unwrap();
            match response {
                Response::InitComplete {
                    table_schema,
                    current_table,
                    ..
                } => {
                    assert_eq!(table_schema.len(), 3);
                    assert_eq!(current_table.as_deref(), Some("Customers"));
                }
                other => panic!("unexpected response: {other:?}"),
            }

            for (offset, expected) in [(0, 5), (5, 5), (10, 0)] {
                let request = Request::GetTableData(PageRequest::new("Orders", 5, offset));
                let (rows, max_size) = page(handle.send(request).await.unwrap());
                assert_eq!(rows, expected);
                assert_eq!(max_size, 10);
            }
        });
        drop(handle);
        thread.join().unwrap();
    }

    #[test]
    fn test_json_round_trip_through_worker() {
        let (handle, _thread) = start();
        smol::block_on(async {
            handle.send_json(r#"{"action": "init"}"#).await.unwrap();

            let response = handle
                .send_json(
                    r#"{"action": "getTableData", "payload": {
                        "currentTable": "Customers", "limit": 50, "offset": 0,
                        "filters": {"first_name": "' OR '1'='1"}
                    }}"#,
                )
                .await
                .unwrap();
            assert_eq!(page(response), (0, 0));

            let err = handle.send_json(r#"{"action": "shrink"}"#).await.unwrap_err();
            assert!(matches!(err, SessionError::UnknownAction(_)));
        });
    }

    #[test]
    fn test_structural_exec_updates_instance() {
        let (handle, _thread) = start();
        smol::block_on(async {
            handle.send(Request::Init).await.unwrap();

            let exec = |query: &str| {
                Request::from_json(
                    &serde_json::json!({
                        "action": "exec",
                        "payload": {"query": query, "currentTable": "Orders", "limit": 5, "offset": 0}
                    })
                    .to_string(),
                )
                .unwrap()
            };

            match handle.send(exec("CREATE TABLE t (x)")).await.unwrap() {
                Response::UpdateInstance { table_schema, .. } => {
                    assert!(table_schema.iter().any(|t| t.name == "t"));
                }
                other => panic!("unexpected response: {other:?}"),
            }

            let response = handle.send(exec("SELECT 1")).await.unwrap();
            assert_eq!(response.action(), "customQueryComplete");

            let response = handle.send(exec("UPDATE Orders SET quantity = 7")).await.unwrap();
            assert_eq!(page(response), (5, 10));

            let response = handle.send(exec("SELEC 1")).await.unwrap();
            match response {
                Response::QueryError { error } => assert!(error.is_custom_query_error),
                other => panic!("unexpected response: {other:?}"),
            }
        });
    }

    #[test]
    fn test_mutations_through_worker() {
        let (handle, _thread) = start();
        smol::block_on(async {
            handle.send(Request::Init).await.unwrap();
            let orders = || Request::GetTableData(PageRequest::new("Orders", 50, 0));
            assert_eq!(page(handle.send(orders()).await.unwrap()).1, 10);

            let response = handle
                .send(Request::Insert(InsertRequest {
                    table: "Orders".into(),
                    columns: vec![
                        "id".into(),
                        "customer_id".into(),
                        "product_id".into(),
                        "order_date".into(),
                        "quantity".into(),
                    ],
                    values: vec![
                        Value::from(""),
                        Value::Integer(1),
                        Value::Integer(1),
                        Value::from("2025-03-01"),
                        Value::Integer(4),
                    ],
                }))
                .await
                .unwrap();
            assert_eq!(response, Response::InsertComplete);
            assert_eq!(page(handle.send(orders()).await.unwrap()).1, 11);

            let response = handle
                .send_json(r#"{"action": "delete", "payload": {"table": "Orders", "primaryValue": 11}}"#)
                .await
                .unwrap();
            assert_eq!(
                response,
                Response::UpdateComplete {
                    kind: UpdateKind::Deleted
                }
            );
            assert_eq!(page(handle.send(orders()).await.unwrap()).1, 10);
        });
    }

    #[test]
    fn test_requests_before_init_and_empty_file() {
        let (handle, _thread) = start();
        smol::block_on(async {
            let response = handle.send(Request::Download).await.unwrap();
            match response {
                Response::QueryError { error } => {
                    assert_eq!(error.message, "Database is not initialized");
                    assert!(!error.is_custom_query_error);
                }
                other => panic!("unexpected response: {other:?}"),
            }

            let response = handle
                .send(Request::OpenFile { file: Vec::new() })
                .await
                .unwrap();
            assert!(response.is_error());

            handle.send(Request::Init).await.unwrap();
            let response = handle.send(Request::Download).await.unwrap();
            let bytes = match response {
                Response::DownloadComplete { bytes } => bytes,
                other => panic!("unexpected response: {other:?}"),
            };
            assert!(bytes.starts_with(b"SQLite format 3\0"));
        });
    }

    #[test]
    fn test_handle_reports_closed_worker() {
        let (worker, handle) = SessionWorker::channel(SessionConfig::default());
        drop(worker);
        let err = smol::block_on(handle.send(Request::Init)).unwrap_err();
        assert!(matches!(err, SessionError::WorkerClosed));
    }
}
