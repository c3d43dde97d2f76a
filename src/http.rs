//! HTTP API for proposal negotiation
//!
//! ## Projects
//! - `POST /projects` - Create a project administered by the caller
//! - `GET /projects/{id}` - Get a project
//! - `DELETE /projects/{id}` - Delete a project and its proposals
//! - `GET /projects/{id}/accepted-proposals` - Contract snapshot
//! - `PUT /projects/{id}/activate` - Activate if the contract is complete
//! - `PUT /projects/{id}/reject` - Reject the project
//!
//! ## Proposals
//! - `POST /proposals` - Submit `{projectId, type, value}`
//! - `GET /proposals?projectId=..&type=..&status=..` - List a project's proposals
//! - `GET /proposals/{id}` - Get a proposal
//! - `PUT /proposals/{id}` - Edit `{value}`
//! - `PUT /proposals/{id}/status` - Decide `{status}`
//! - `DELETE /proposals/{id}` - Delete a pending proposal
//!
//! The caller is identified by the `X-User-Id` header, with an optional
//! `X-User-Role` (`participant` or `arbiter`).
//!
//! ## Example Usage
//!
//! ```bash
//! # Propose a budget
//! curl -X POST -H "X-User-Id: bob" \
//!      -d '{"projectId":"p1","type":"budget","value":"1000.00"}' \
//!      http://localhost:8095/proposals
//!
//! # Accept it as the administrator
//! curl -X PUT -H "X-User-Id: alice" -d '{"status":"accepted"}' \
//!      http://localhost:8095/proposals/{id}/status
//!
//! # Read the contract
//! curl http://localhost:8095/projects/p1/accepted-proposals
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::HeaderMap;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::caller::{Caller, Role};
use crate::db::ProposalQuery;
use crate::error::AccordError;
use crate::services::{self, Services};
use crate::value::{ProposalStatus, ProposalType};
use crate::views::{
    ContractView, CreateProjectInputView, CreateProposalInputView, DecideProposalInputView,
    DecisionView, EditProposalInputView, HealthView, ProjectView, ProposalListParams,
    ProposalView,
};

/// Header carrying the caller's user id
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the caller's role
pub const USER_ROLE_HEADER: &str = "x-user-role";

const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;

type HttpResponse = Response<Full<Bytes>>;

/// HTTP server state
pub struct HttpServer {
    services: Arc<Services>,
    bind_addr: SocketAddr,
    max_body_bytes: usize,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(services: Arc<Services>, bind_addr: SocketAddr) -> Self {
        Self {
            services,
            bind_addr,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Limit request body size
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<(), AccordError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new()
                    .serve_connection(io, service)
                    .await
                {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    /// Route requests to handlers
    pub async fn handle_request<B>(&self, req: Request<B>) -> Result<HttpResponse, Infallible>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let path = req.uri().path().to_string();
        let method = req.method().clone();

        debug!(method = %method, path = %path, "Incoming request");

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

        let result = match (&method, segments.as_slice()) {
            // Health check
            (&Method::GET, ["health"]) => self.handle_health().await,

            // Projects
            (&Method::POST, ["projects"]) => self.handle_create_project(req).await,
            (&Method::GET, ["projects", id]) => self.handle_get_project(id).await,
            (&Method::DELETE, ["projects", id]) => {
                self.handle_delete_project(req.headers(), id).await
            }
            (&Method::GET, ["projects", id, "accepted-proposals"]) => {
                self.handle_contract(id).await
            }
            (&Method::PUT, ["projects", id, "activate"]) => {
                self.handle_activate(req.headers(), id).await
            }
            (&Method::PUT, ["projects", id, "reject"]) => {
                self.handle_reject(req.headers(), id).await
            }

            // Proposals
            (&Method::POST, ["proposals"]) => self.handle_submit(req).await,
            (&Method::GET, ["proposals"]) => self.handle_list(req.uri().query()).await,
            (&Method::GET, ["proposals", id]) => self.handle_get_proposal(id).await,
            (&Method::PUT, ["proposals", id]) => self.handle_edit(req, id).await,
            (&Method::PUT, ["proposals", id, "status"]) => self.handle_decide(req, id).await,
            (&Method::DELETE, ["proposals", id]) => {
                self.handle_delete_proposal(req.headers(), id).await
            }

            (_, ["health"]) | (_, ["projects", ..]) | (_, ["proposals", ..]) => {
                Ok(services::method_not_allowed())
            }

            // Not found
            _ => Ok(services::not_found("Not Found")),
        };

        match result {
            Ok(response) => Ok(response),
            Err(e) => {
                let status = services::status_for(&e);
                if status.is_server_error() {
                    error!(method = %method, path = %path, error = %e, "Request failed");
                } else {
                    debug!(
                        method = %method,
                        path = %path,
                        status = %status,
                        error = %e,
                        "Request rejected"
                    );
                }
                Ok(services::error_response(e))
            }
        }
    }

    /// Health check endpoint
    async fn handle_health(&self) -> Result<HttpResponse, AccordError> {
        let projects = self.services.projects.clone();
        let stats = blocking(move || projects.stats()).await?;
        Ok(services::ok(&HealthView::from(stats)))
    }

    // =========================================================================
    // Projects
    // =========================================================================

    /// POST /projects
    async fn handle_create_project<B>(&self, req: Request<B>) -> Result<HttpResponse, AccordError>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let caller = caller_from_headers(req.headers())?;
        let input: CreateProjectInputView = match self.read_json(req).await? {
            Ok(input) => input,
            Err(response) => return Ok(response),
        };

        let projects = self.services.projects.clone();
        let project = blocking(move || projects.create(&caller, input.into())).await?;
        Ok(services::created(&ProjectView::from(project)))
    }

    /// GET /projects/{id}
    async fn handle_get_project(&self, id: &str) -> Result<HttpResponse, AccordError> {
        let projects = self.services.projects.clone();
        let id = id.to_string();
        let project = blocking(move || projects.get(&id)).await?;
        Ok(services::ok(&ProjectView::from(project)))
    }

    /// DELETE /projects/{id}
    async fn handle_delete_project(
        &self,
        headers: &HeaderMap,
        id: &str,
    ) -> Result<HttpResponse, AccordError> {
        let caller = caller_from_headers(headers)?;
        let projects = self.services.projects.clone();
        let id = id.to_string();
        Ok(services::from_delete_result(
            blocking(move || projects.delete(&caller, &id)).await,
        ))
    }

    /// GET /projects/{id}/accepted-proposals
    async fn handle_contract(&self, id: &str) -> Result<HttpResponse, AccordError> {
        let projects = self.services.projects.clone();
        let id = id.to_string();
        let snapshot = blocking(move || projects.contract(&id)).await?;
        Ok(services::ok(&ContractView::from(snapshot)))
    }

    /// PUT /projects/{id}/activate
    async fn handle_activate(
        &self,
        headers: &HeaderMap,
        id: &str,
    ) -> Result<HttpResponse, AccordError> {
        let caller = caller_from_headers(headers)?;
        let projects = self.services.projects.clone();
        let id = id.to_string();
        let project = blocking(move || projects.activate(&caller, &id)).await?;
        Ok(services::ok(&ProjectView::from(project)))
    }

    /// PUT /projects/{id}/reject
    async fn handle_reject(
        &self,
        headers: &HeaderMap,
        id: &str,
    ) -> Result<HttpResponse, AccordError> {
        let caller = caller_from_headers(headers)?;
        let projects = self.services.projects.clone();
        let id = id.to_string();
        let project = blocking(move || projects.reject(&caller, &id)).await?;
        Ok(services::ok(&ProjectView::from(project)))
    }

    // =========================================================================
    // Proposals
    // =========================================================================

    /// POST /proposals
    async fn handle_submit<B>(&self, req: Request<B>) -> Result<HttpResponse, AccordError>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let caller = caller_from_headers(req.headers())?;
        let input: CreateProposalInputView = match self.read_json(req).await? {
            Ok(input) => input,
            Err(response) => return Ok(response),
        };

        let proposals = self.services.proposals.clone();
        let proposal = blocking(move || {
            proposals.submit(&caller, &input.project_id, &input.proposal_type, &input.value)
        })
        .await?;
        Ok(services::created(&ProposalView::from(proposal)))
    }

    /// GET /proposals?projectId=..&type=..&status=..
    async fn handle_list(&self, raw_query: Option<&str>) -> Result<HttpResponse, AccordError> {
        let query = list_query(raw_query.unwrap_or(""))?;
        let proposals = self.services.proposals.clone();
        let list = blocking(move || proposals.list(&query)).await?;
        let views: Vec<ProposalView> = list.into_iter().map(ProposalView::from).collect();
        Ok(services::ok(&views))
    }

    /// GET /proposals/{id}
    async fn handle_get_proposal(&self, id: &str) -> Result<HttpResponse, AccordError> {
        let proposals = self.services.proposals.clone();
        let id = id.to_string();
        let proposal = blocking(move || proposals.get(&id)).await?;
        Ok(services::ok(&ProposalView::from(proposal)))
    }

    /// PUT /proposals/{id}
    async fn handle_edit<B>(&self, req: Request<B>, id: &str) -> Result<HttpResponse, AccordError>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let caller = caller_from_headers(req.headers())?;
        let input: EditProposalInputView = match self.read_json(req).await? {
            Ok(input) => input,
            Err(response) => return Ok(response),
        };

        let proposals = self.services.proposals.clone();
        let id = id.to_string();
        let proposal = blocking(move || proposals.edit(&caller, &id, &input.value)).await?;
        Ok(services::ok(&ProposalView::from(proposal)))
    }

    /// PUT /proposals/{id}/status
    async fn handle_decide<B>(&self, req: Request<B>, id: &str) -> Result<HttpResponse, AccordError>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let caller = caller_from_headers(req.headers())?;
        let input: DecideProposalInputView = match self.read_json(req).await? {
            Ok(input) => input,
            Err(response) => return Ok(response),
        };
        let target: ProposalStatus = input.status.parse()?;

        let proposals = self.services.proposals.clone();
        let id = id.to_string();
        let report = blocking(move || proposals.decide(&caller, &id, target)).await?;
        Ok(services::ok(&DecisionView::from(report)))
    }

    /// DELETE /proposals/{id}
    async fn handle_delete_proposal(
        &self,
        headers: &HeaderMap,
        id: &str,
    ) -> Result<HttpResponse, AccordError> {
        let caller = caller_from_headers(headers)?;
        let proposals = self.services.proposals.clone();
        let id = id.to_string();
        Ok(services::from_delete_result(
            blocking(move || proposals.delete(&caller, &id)).await,
        ))
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Read a size-limited JSON body. An oversized body yields a ready 413
    /// response in the inner `Err`.
    async fn read_json<T, B>(&self, req: Request<B>) -> Result<Result<T, HttpResponse>, AccordError>
    where
        T: DeserializeOwned,
        B: Body<Data = Bytes> + Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let body = match Limited::new(req.into_body(), self.max_body_bytes).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                return Ok(Err(services::payload_too_large(self.max_body_bytes)));
            }
            Err(e) => {
                return Ok(Err(services::bad_request(&format!(
                    "Failed to read body: {}",
                    e
                ))))
            }
        };

        Ok(Ok(serde_json::from_slice(&body)?))
    }
}

/// Run a blocking service call off the async runtime
async fn blocking<T, F>(f: F) -> Result<T, AccordError>
where
    F: FnOnce() -> Result<T, AccordError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AccordError::Internal(format!("Blocking task failed: {}", e)))?
}

/// Resolve the caller from `X-User-Id` / `X-User-Role`
pub fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, AccordError> {
    let user_id = headers
        .get(USER_ID_HEADER)
        .map(|v| v.to_str())
        .transpose()
        .map_err(|_| AccordError::InvalidArgument("X-User-Id is not valid text".into()))?
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AccordError::InvalidArgument("X-User-Id header is required".into()))?;

    let role = match headers.get(USER_ROLE_HEADER) {
        Some(value) => value
            .to_str()
            .map_err(|_| AccordError::InvalidArgument("X-User-Role is not valid text".into()))?
            .parse::<Role>()?,
        None => Role::default(),
    };

    Ok(Caller::new(user_id, role))
}

/// Parse the list query string into a store query
fn list_query(raw: &str) -> Result<ProposalQuery, AccordError> {
    let params: ProposalListParams = serde_urlencoded::from_str(raw)
        .map_err(|e| AccordError::InvalidArgument(format!("Invalid query string: {}", e)))?;

    let project_id = params
        .project_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AccordError::InvalidArgument("projectId is required".into()))?;

    let mut query = ProposalQuery::for_project(project_id);
    if let Some(kind) = params.proposal_type {
        query = query.with_type(kind.parse::<ProposalType>()?);
    }
    if let Some(status) = params.status {
        query = query.with_status(status.parse::<ProposalStatus>()?);
    }
    Ok(query)
}
