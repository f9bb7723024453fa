//! Thin REST mapping layer (spec.md §6): eight fixed routes over
//! `toposim_core::business_logic::SimulationActions` and the `Store`
//! read path, built directly on `hyper` (the teacher's own dependency)
//! rather than a generic multi-protocol router — out of proportion for a
//! handful of fixed endpoints.

use std::convert::Infallible;
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};

use toposim_core::error::{BusinessLogicError, DomainError, StoreError};
use toposim_core::model::{Link, SimConfig, Simulation, SimulationStatus, Topology};
use toposim_core::store::{Pagination, SharedStore, SimulationStore};
use toposim_core::business_logic::SimulationActions;

/// Everything a request handler needs: the business-logic facade plus
/// direct store access for the two read-only listing endpoints.
pub struct AppState {
    pub actions: SimulationActions,
    pub store: SharedStore,
}

/// Wire submission shape for `POST /simulate` and `PUT /edit/{id}`: plain
/// node names and links, since `id`/`fingerprint` are server-assigned by
/// `Topology::new`.
#[derive(Debug, Deserialize)]
pub struct TopologySubmission {
    pub nodes: Vec<String>,
    pub links: Vec<LinkSubmission>,
    #[serde(default)]
    pub config: SimConfig,
}

#[derive(Debug, Deserialize)]
pub struct LinkSubmission {
    pub from_node: String,
    pub to_node: String,
    pub latency_sec: f64,
}

impl From<TopologySubmission> for Topology {
    fn from(s: TopologySubmission) -> Self {
        let links = s
            .links
            .into_iter()
            .map(|l| Link::new(l.from_node, l.to_node, l.latency_sec))
            .collect();
        Topology::new(s.nodes, links, s.config)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct CursorQuery {
    cursor: Option<String>,
    page_size: Option<u32>,
}

/// Route one request. Every handler deserializes the body (if any), calls
/// the corresponding business-logic function, and maps
/// `DomainError`/`StoreError` to status codes per spec.md §7 (400
/// validation, 503 store/resource, 500 otherwise).
pub async fn route(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    let result = match (&method, segments.as_slice()) {
        (&Method::POST, ["simulate"]) => handle_create(&state, req).await,
        (&Method::POST, ["restart", sim_id]) => handle_restart(&state, sim_id).await,
        (&Method::POST, ["pause", sim_id]) => handle_pause(&state, sim_id).await,
        (&Method::POST, ["resume", sim_id]) => handle_resume(&state, sim_id).await,
        (&Method::PUT, ["edit", sim_id]) => handle_edit(&state, sim_id, req).await,
        (&Method::GET, ["simulation-data", sim_id]) => handle_get(&state, sim_id).await,
        (&Method::GET, ["status", sim_id]) => handle_status(&state, sim_id).await,
        (&Method::GET, ["get-all-simulations-cursor"]) => handle_list(&state, query.as_deref()).await,
        _ => Err(not_found()),
    };

    Ok(result.unwrap_or_else(|r| r))
}

async fn body_bytes(req: Request<Incoming>) -> Result<Bytes, Response<Full<Bytes>>> {
    req.into_body()
        .collect()
        .await
        .map(|c| c.to_bytes())
        .map_err(|e| json_error(StatusCode::BAD_REQUEST, format!("failed to read body: {e}")))
}

fn parse_topology(bytes: &Bytes) -> Result<Topology, Response<Full<Bytes>>> {
    serde_json::from_slice::<TopologySubmission>(bytes)
        .map(Topology::from)
        .map_err(|e| json_error(StatusCode::BAD_REQUEST, format!("malformed request body: {e}")))
}

async fn handle_create(
    state: &AppState,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Response<Full<Bytes>>> {
    let bytes = body_bytes(req).await?;
    let topology = parse_topology(&bytes)?;
    let sim = state.actions.create(topology).await.map_err(map_bl_error)?;
    Ok(json_response(StatusCode::CREATED, &sim))
}

async fn handle_restart(state: &AppState, sim_id: &str) -> Result<Response<Full<Bytes>>, Response<Full<Bytes>>> {
    let sim = state.actions.restart(sim_id).await.map_err(map_bl_error)?;
    Ok(json_response(StatusCode::OK, &sim))
}

async fn handle_pause(state: &AppState, sim_id: &str) -> Result<Response<Full<Bytes>>, Response<Full<Bytes>>> {
    let sim = state.actions.pause(sim_id).await.map_err(map_bl_error)?;
    Ok(json_response(StatusCode::OK, &sim))
}

async fn handle_resume(state: &AppState, sim_id: &str) -> Result<Response<Full<Bytes>>, Response<Full<Bytes>>> {
    let sim = state.actions.resume(sim_id).await.map_err(map_bl_error)?;
    Ok(json_response(StatusCode::OK, &sim))
}

async fn handle_edit(
    state: &AppState,
    sim_id: &str,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Response<Full<Bytes>>> {
    let bytes = body_bytes(req).await?;
    let topology = parse_topology(&bytes)?;
    let sim = state.actions.edit(sim_id, topology).await.map_err(map_bl_error)?;
    Ok(json_response(StatusCode::OK, &sim))
}

async fn handle_get(state: &AppState, sim_id: &str) -> Result<Response<Full<Bytes>>, Response<Full<Bytes>>> {
    let sim = SimulationStore::get_by_id(state.store.as_ref(), sim_id)
        .await
        .map_err(map_store_error)?
        .ok_or_else(|| map_bl_error(DomainError::NotFound { sim_id: sim_id.to_string() }.into()))?;
    Ok(json_response(StatusCode::OK, &sim))
}

#[derive(Serialize)]
struct StatusView {
    sim_id: String,
    status: SimulationStatus,
    row_version: i64,
}

async fn handle_status(state: &AppState, sim_id: &str) -> Result<Response<Full<Bytes>>, Response<Full<Bytes>>> {
    let sim: Simulation = SimulationStore::get_by_id(state.store.as_ref(), sim_id)
        .await
        .map_err(map_store_error)?
        .ok_or_else(|| map_bl_error(DomainError::NotFound { sim_id: sim_id.to_string() }.into()))?;
    Ok(json_response(
        StatusCode::OK,
        &StatusView {
            sim_id: sim.sim_id,
            status: sim.status,
            row_version: sim.row_version,
        },
    ))
}

#[derive(Serialize)]
struct CursorPage {
    items: Vec<Simulation>,
    next_cursor: Option<String>,
}

async fn handle_list(
    state: &AppState,
    query: Option<&str>,
) -> Result<Response<Full<Bytes>>, Response<Full<Bytes>>> {
    let parsed: CursorQuery = query
        .map(|q| {
            serde_urlencoded_lite(q).map_err(|e| json_error(StatusCode::BAD_REQUEST, format!("bad query: {e}")))
        })
        .transpose()?
        .unwrap_or(CursorQuery { cursor: None, page_size: None });

    let statuses = [
        SimulationStatus::Pending,
        SimulationStatus::Running,
        SimulationStatus::Paused,
        SimulationStatus::Done,
        SimulationStatus::Failed,
        SimulationStatus::Stopped,
    ];
    let page = SimulationStore::list_by_status(
        state.store.as_ref(),
        &statuses,
        Pagination {
            cursor: parsed.cursor,
            page_size: parsed.page_size.unwrap_or(200),
        },
    )
    .await
    .map_err(map_store_error)?;

    Ok(json_response(
        StatusCode::OK,
        &CursorPage {
            items: page.items,
            next_cursor: page.next_cursor,
        },
    ))
}

/// Minimal `cursor=...&page_size=...` query-string parser — the only two
/// params this endpoint accepts, so pulling in a full `serde_urlencoded`
/// dependency isn't warranted.
fn serde_urlencoded_lite(query: &str) -> Result<CursorQuery, String> {
    let mut cursor = None;
    let mut page_size = None;
    for pair in query.split('&') {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next().unwrap_or_default();
        let value = parts.next().unwrap_or_default();
        match key {
            "cursor" => cursor = Some(value.to_string()),
            "page_size" => {
                page_size = Some(value.parse::<u32>().map_err(|e| e.to_string())?);
            }
            _ => {}
        }
    }
    Ok(CursorQuery { cursor, page_size })
}

fn map_bl_error(e: BusinessLogicError) -> Response<Full<Bytes>> {
    match e {
        BusinessLogicError::Domain(DomainError::Validation(msg)) => {
            json_error(StatusCode::BAD_REQUEST, msg)
        }
        BusinessLogicError::Domain(DomainError::NotFound { sim_id }) => {
            json_error(StatusCode::NOT_FOUND, format!("simulation {sim_id} not found"))
        }
        BusinessLogicError::Domain(DomainError::Conflict { sim_id, status }) => json_error(
            StatusCode::CONFLICT,
            format!("simulation {sim_id} is {status}"),
        ),
        BusinessLogicError::Domain(DomainError::MultipleOpenPauses) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        BusinessLogicError::Store(store_err) => map_store_error(store_err),
    }
}

fn map_store_error(e: StoreError) -> Response<Full<Bytes>> {
    match e {
        StoreError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, msg),
        StoreError::Concurrency { .. } => json_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
        StoreError::Backend(_) => json_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

fn not_found() -> Response<Full<Bytes>> {
    json_error(StatusCode::NOT_FOUND, "no such route".to_string())
}

fn json_error(status: StatusCode, message: String) -> Response<Full<Bytes>> {
    json_response(status, &ErrorBody { error: message })
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let bytes = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(bytes)))
        .expect("response is always well-formed")
}
