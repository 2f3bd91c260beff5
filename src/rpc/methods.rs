//! RPC method handlers.
//!
//! Dispatches JSON-RPC method calls to the appropriate handler functions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use tokio::sync::mpsc;

use crate::context::AppContext;
use crate::core::{JobState, JobStatus, ProgressEvent};
use crate::workflows::{self, WorkflowRequest};

use super::protocol::{Request, Response};

/// What the transport should send back for a request.
pub enum Reply {
    /// A single response.
    Unary(Response),
    /// Progress events to forward as notifications; the final event becomes
    /// the response to request `id`.
    Stream {
        id: Value,
        events: mpsc::Receiver<ProgressEvent>,
    },
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Reply::Unary(response)
    }
}

#[derive(Deserialize)]
struct JobIdParams {
    id: String,
}

/// Handles RPC method dispatch and execution.
pub struct MethodHandler {
    ctx: AppContext,
    start_time: Instant,
}

impl MethodHandler {
    pub fn new(ctx: AppContext) -> Self {
        Self {
            ctx,
            start_time: Instant::now(),
        }
    }

    /// Handle an RPC request.
    pub async fn handle(&self, request: Request) -> Reply {
        let id = request.id.clone().unwrap_or(Value::Null);
        let params = request.params.unwrap_or(Value::Null);

        match request.method.as_str() {
            "daemon.status" => self.daemon_status(id).into(),
            "jobs.list" => self.jobs_list(id, params).into(),
            "jobs.get" => self.jobs_get(id, params).into(),
            "jobs.abort" => self.jobs_abort(id, params).into(),
            "jobs.submit" => self.jobs_submit(id, params).into(),
            "jobs.watch" => self.jobs_watch(id, params),
            _ => Response::method_not_found(id, &request.method).into(),
        }
    }

    /// Get daemon status/health information.
    fn daemon_status(&self, id: Value) -> Response {
        #[derive(Serialize)]
        struct DaemonStatus {
            version: &'static str,
            uptime_secs: u64,
            total_jobs: usize,
            active_jobs: usize,
            rpc_bind: String,
        }

        Response::success(
            id,
            DaemonStatus {
                version: env!("CARGO_PKG_VERSION"),
                uptime_secs: self.start_time.elapsed().as_secs(),
                total_jobs: self.ctx.registry.len(),
                active_jobs: self.ctx.registry.active_count(),
                rpc_bind: self.ctx.config.rpc_bind.to_string(),
            },
        )
    }

    /// List jobs in submission order, optionally filtered by status.
    fn jobs_list(&self, id: Value, params: Value) -> Response {
        #[derive(Deserialize, Default)]
        struct Params {
            #[serde(default)]
            status: Option<JobStatus>,
            #[serde(default)]
            limit: Option<usize>,
        }

        #[derive(Serialize)]
        struct JobList {
            jobs: Vec<JobState>,
        }

        let params: Params = if params.is_null() {
            Params::default()
        } else {
            match serde_json::from_value(params) {
                Ok(p) => p,
                Err(e) => return Response::invalid_params(id, e.to_string()),
            }
        };

        let jobs = self
            .ctx
            .registry
            .list()
            .into_iter()
            .filter(|job| params.status.is_none_or(|status| job.status == status))
            .take(params.limit.unwrap_or(usize::MAX))
            .collect();

        Response::success(id, JobList { jobs })
    }

    /// Get a single job snapshot.
    fn jobs_get(&self, id: Value, params: Value) -> Response {
        let params: JobIdParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return Response::invalid_params(id, e.to_string()),
        };

        match self.ctx.registry.get(&params.id) {
            Some(job) => Response::success(id, job),
            None => Response::job_not_found(id, &params.id),
        }
    }

    /// Latch the abort flag. The worker notices it before its next item.
    fn jobs_abort(&self, id: Value, params: Value) -> Response {
        let params: JobIdParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return Response::invalid_params(id, e.to_string()),
        };

        if !self.ctx.registry.request_abort(&params.id) {
            return Response::job_not_found(id, &params.id);
        }

        #[derive(Serialize)]
        struct AbortAck {
            status: &'static str,
            job_id: String,
        }

        Response::success(
            id,
            AbortAck {
                status: "abort_requested",
                job_id: params.id,
            },
        )
    }

    /// Start a workflow in the background.
    fn jobs_submit(&self, id: Value, params: Value) -> Response {
        let request: WorkflowRequest = match serde_json::from_value(params) {
            Ok(r) => r,
            Err(e) => return Response::invalid_params(id, e.to_string()),
        };

        #[derive(Serialize)]
        struct Started {
            status: &'static str,
            job_id: String,
            message: &'static str,
        }

        let handle = workflows::submit(&self.ctx, request);
        Response::success(
            id,
            Started {
                status: "started",
                job_id: handle.id,
                message: "Job started in background",
            },
        )
    }

    /// Stream snapshots of a job until it finishes.
    fn jobs_watch(&self, id: Value, params: Value) -> Reply {
        let params: JobIdParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return Response::invalid_params(id, e.to_string()).into(),
        };

        if self.ctx.registry.get(&params.id).is_none() {
            return Response::job_not_found(id, &params.id).into();
        }

        Reply::Stream {
            id,
            events: self.ctx.publisher.subscribe(&params.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::core::JobResult;
    use crate::rpc::protocol::JOB_NOT_FOUND;
    use serde_json::json;

    fn request(method: &str, params: Option<Value>) -> Request {
        Request {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: Some(Value::Number(1.into())),
        }
    }

    async fn unary(handler: &MethodHandler, method: &str, params: Option<Value>) -> Response {
        match handler.handle(request(method, params)).await {
            Reply::Unary(response) => response,
            Reply::Stream { .. } => panic!("expected a unary reply"),
        }
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let ctx = AppContext::new(AppConfig::default());
        let running = ctx.registry.create("a");
        ctx.registry.start(&running, 3);
        ctx.registry.create("b");
        let handler = MethodHandler::new(ctx);

        let all = unary(&handler, "jobs.list", None).await;
        assert_eq!(all.result.unwrap()["jobs"].as_array().unwrap().len(), 2);

        let filtered = unary(&handler, "jobs.list", Some(json!({ "status": "running" }))).await;
        let jobs = filtered.result.unwrap()["jobs"].as_array().unwrap().clone();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0]["id"], json!(running));
    }

    #[tokio::test]
    async fn test_get_and_abort_unknown_job() {
        let handler = MethodHandler::new(AppContext::new(AppConfig::default()));

        for method in ["jobs.get", "jobs.abort", "jobs.watch"] {
            let response = unary(&handler, method, Some(json!({ "id": "nope" }))).await;
            assert_eq!(response.error.unwrap().code, JOB_NOT_FOUND, "{}", method);
        }
    }

    #[tokio::test]
    async fn test_abort_latches_flag() {
        let ctx = AppContext::new(AppConfig::default());
        let job_id = ctx.registry.create("a");
        let registry = ctx.registry.clone();
        let handler = MethodHandler::new(ctx);

        let response = unary(&handler, "jobs.abort", Some(json!({ "id": job_id }))).await;
        assert_eq!(
            response.result.unwrap(),
            json!({ "status": "abort_requested", "job_id": job_id })
        );
        assert!(registry.is_aborted(&job_id));
        assert_eq!(registry.get(&job_id).unwrap().message, "Abort requested...");
    }

    #[tokio::test]
    async fn test_submit_rejects_bad_params() {
        let handler = MethodHandler::new(AppContext::new(AppConfig::default()));
        let response = unary(&handler, "jobs.submit", Some(json!({ "workflow": "by_type" }))).await;
        assert_eq!(response.error.unwrap().code, crate::rpc::protocol::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_watch_streams_until_terminal() {
        let ctx = AppContext::new(AppConfig {
            poll_interval_ms: 5,
            ..AppConfig::default()
        });
        let job_id = ctx.registry.create("a");
        ctx.registry.start(&job_id, 0);
        ctx.registry
            .complete(&job_id, JobResult::Document(json!({ "ok": true })));
        let handler = MethodHandler::new(ctx);

        let Reply::Stream { mut events, .. } = handler
            .handle(request("jobs.watch", Some(json!({ "id": job_id }))))
            .await
        else {
            panic!("expected a stream");
        };

        let event = events.recv().await.unwrap();
        assert!(event.is_final());
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let handler = MethodHandler::new(AppContext::new(AppConfig::default()));
        let response = unary(&handler, "progress.active", None).await;
        assert_eq!(response.error.unwrap().code, crate::rpc::protocol::METHOD_NOT_FOUND);
    }
}
