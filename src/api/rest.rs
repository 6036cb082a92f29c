//! REST control surface over a shared `Manager` handle. Every handler is a
//! thin translation from an HTTP verb+body to one `Manager` call; validation
//! and rollback all live in the manager itself.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::error::GatewayError;
use crate::manager::{DriverGroupInfo, GroupInfo, Manager, TemplateGroupSpec, TemplateSnapshot};
use crate::node::NodeInfo;
use crate::plugin::{ModuleDescriptor, NodeKind};
use crate::subscription::SubGroupInfo;
use crate::tags::cache::CacheValue;
use crate::tags::group::TagDef;

#[derive(Clone)]
pub struct SharedAppState {
    pub manager: Arc<Manager>,
}

/// Every handler error funnels through `GatewayError`; this maps it to the
/// HTTP status a REST client would expect for that error class.
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::LibraryNotFound(_)
            | GatewayError::NodeNotExist(_)
            | GatewayError::TemplateNotFound(_)
            | GatewayError::PluginNotFound(_)
            | GatewayError::GroupNotExist(_)
            | GatewayError::TagNotExist(_) => StatusCode::NOT_FOUND,

            GatewayError::NodeExist(_)
            | GatewayError::TemplateExist(_)
            | GatewayError::GroupExist(_)
            | GatewayError::TagExist(_)
            | GatewayError::LibraryInUse(_, _) => StatusCode::CONFLICT,

            GatewayError::LibraryFailedToOpen(_, _)
            | GatewayError::LibraryNotAllowCreateInstance(_)
            | GatewayError::NodeNotAllowSubscribe(_)
            | GatewayError::NodeNotAllowMap(_)
            | GatewayError::PluginNotSupportTemplate(_)
            | GatewayError::GroupNotAllow(_)
            | GatewayError::GroupParameterInvalid { .. }
            | GatewayError::TagInvalid(_) => StatusCode::BAD_REQUEST,

            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorBody { code: self.code(), message: self.to_string() })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: i32,
    message: String,
}

pub fn create_api_routes() -> Router<SharedAppState> {
    Router::new()
        .route("/api/plugins", get(get_plugins).post(add_plugin))
        .route("/api/plugins/:name", delete(del_plugin))
        .route("/api/nodes", get(get_nodes).post(add_node))
        .route("/api/nodes/:name", get(get_node_info).delete(del_node))
        .route("/api/nodes/:name/name", put(update_node_name))
        .route("/api/nodes/:name/cache", get(get_node_cache))
        .route("/api/driver-groups", get(get_driver_groups))
        .route(
            "/api/templates",
            get(get_templates).post(add_template).delete(clear_templates),
        )
        .route("/api/templates/:name", get(get_template).delete(del_template))
        .route(
            "/api/templates/:name/groups",
            get(get_template_group).post(add_template_group),
        )
        .route(
            "/api/templates/:name/groups/:group",
            put(update_template_group).delete(del_template_group),
        )
        .route(
            "/api/templates/:name/groups/:group/tags",
            get(get_template_tags)
                .post(add_template_tags)
                .put(update_template_tags)
                .delete(del_template_tags),
        )
        .route("/api/templates/:name/instantiate", post(instantiate_template))
        .route(
            "/api/subscriptions",
            get(get_sub_group).post(subscribe).delete(unsubscribe),
        )
        .route(
            "/api/ndriver-maps",
            get(get_ndriver_maps).post(add_ndriver_map).delete(del_ndriver_map),
        )
        .layer(TraceLayer::new_for_http())
}

// ---- Plugins -------------------------------------------------------------

#[derive(Deserialize)]
struct AddPluginRequest {
    library_path: String,
}

async fn add_plugin(
    State(state): State<SharedAppState>,
    Json(req): Json<AddPluginRequest>,
) -> Result<Json<ModuleDescriptor>, GatewayError> {
    Ok(Json(state.manager.add_plugin(&req.library_path)?))
}

async fn del_plugin(
    State(state): State<SharedAppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, GatewayError> {
    state.manager.del_plugin(&name)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_plugins(State(state): State<SharedAppState>) -> Json<Vec<(String, ModuleDescriptor)>> {
    Json(state.manager.get_plugins())
}

// ---- Nodes ----------------------------------------------------------------

#[derive(Deserialize)]
struct AddNodeRequest {
    name: String,
    plugin: String,
    #[serde(default)]
    start: bool,
}

async fn add_node(
    State(state): State<SharedAppState>,
    Json(req): Json<AddNodeRequest>,
) -> Result<StatusCode, GatewayError> {
    state.manager.add_node(&req.name, &req.plugin, req.start)?;
    Ok(StatusCode::CREATED)
}

async fn del_node(
    State(state): State<SharedAppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, GatewayError> {
    state.manager.del_node(&name)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct NodeFilterQuery {
    kind: Option<String>,
    plugin: Option<String>,
    name: Option<String>,
}

fn parse_kind(kind: &str) -> Option<NodeKind> {
    match kind {
        "driver" => Some(NodeKind::Driver),
        "app" => Some(NodeKind::App),
        "ndriver" => Some(NodeKind::NDriver),
        _ => None,
    }
}

async fn get_nodes(
    State(state): State<SharedAppState>,
    Query(q): Query<NodeFilterQuery>,
) -> Json<Vec<NodeInfo>> {
    let kind = q.kind.as_deref().and_then(parse_kind);
    Json(state.manager.get_nodes(kind, q.plugin.as_deref(), q.name.as_deref()))
}

async fn get_node_info(
    State(state): State<SharedAppState>,
    Path(name): Path<String>,
) -> Result<Json<NodeInfo>, GatewayError> {
    Ok(Json(state.manager.get_node_info(&name)?))
}

#[derive(Deserialize)]
struct RenameRequest {
    new_name: String,
}

async fn update_node_name(
    State(state): State<SharedAppState>,
    Path(name): Path<String>,
    Json(req): Json<RenameRequest>,
) -> Result<StatusCode, GatewayError> {
    state.manager.update_node_name(&name, &req.new_name)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
struct CacheEntryView {
    group: String,
    tag: String,
    timestamp: i64,
    value: crate::value::TagValue,
}

/// Diagnostic dump of a driver node's live `TagCache`, used to eyeball what
/// the worker has actually written without waiting on a subscriber.
async fn get_node_cache(
    State(state): State<SharedAppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<CacheEntryView>>, GatewayError> {
    state
        .manager
        .nodes()
        .with_adapter(&name, |a| {
            a.driver()
                .map(|d| {
                    d.cache
                        .keys()
                        .into_iter()
                        .filter_map(|(group, tag)| {
                            d.cache.get(&group, &tag).map(|CacheValue { timestamp, value }| {
                                CacheEntryView { group, tag, timestamp, value }
                            })
                        })
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default()
        })
        .map(Json)
        .ok_or_else(|| GatewayError::NodeNotExist(name.clone()))
}

async fn get_driver_groups(State(state): State<SharedAppState>) -> Json<Vec<DriverGroupInfo>> {
    Json(state.manager.get_driver_group())
}

// ---- Templates -------------------------------------------------------------

#[derive(Deserialize)]
struct AddTemplateRequest {
    name: String,
    plugin: String,
    #[serde(default)]
    groups: Vec<TemplateGroupSpec>,
}

async fn add_template(
    State(state): State<SharedAppState>,
    Json(req): Json<AddTemplateRequest>,
) -> Result<StatusCode, GatewayError> {
    state.manager.add_template(&req.name, &req.plugin, req.groups)?;
    Ok(StatusCode::CREATED)
}

async fn del_template(
    State(state): State<SharedAppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, GatewayError> {
    state.manager.del_template(&name)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_templates(State(state): State<SharedAppState>) -> StatusCode {
    state.manager.clear_templates();
    StatusCode::NO_CONTENT
}

async fn get_templates(State(state): State<SharedAppState>) -> Json<Vec<(String, String)>> {
    Json(state.manager.get_templates())
}

async fn get_template(
    State(state): State<SharedAppState>,
    Path(name): Path<String>,
) -> Result<Json<TemplateSnapshot>, GatewayError> {
    Ok(Json(state.manager.get_template(&name)?))
}

#[derive(Deserialize)]
struct AddGroupRequest {
    name: String,
    interval: u32,
}

async fn add_template_group(
    State(state): State<SharedAppState>,
    Path(tmpl): Path<String>,
    Json(req): Json<AddGroupRequest>,
) -> Result<StatusCode, GatewayError> {
    state.manager.add_template_group(&tmpl, &req.name, req.interval)?;
    Ok(StatusCode::CREATED)
}

#[derive(Deserialize)]
struct UpdateGroupRequest {
    interval: u32,
}

async fn update_template_group(
    State(state): State<SharedAppState>,
    Path((tmpl, group)): Path<(String, String)>,
    Json(req): Json<UpdateGroupRequest>,
) -> Result<StatusCode, GatewayError> {
    state.manager.update_template_group(&tmpl, &group, req.interval)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn del_template_group(
    State(state): State<SharedAppState>,
    Path((tmpl, group)): Path<(String, String)>,
) -> Result<StatusCode, GatewayError> {
    state.manager.del_template_group(&tmpl, &group)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_template_group(
    State(state): State<SharedAppState>,
    Path(tmpl): Path<String>,
) -> Result<Json<Vec<GroupInfo>>, GatewayError> {
    Ok(Json(state.manager.get_template_group(&tmpl)?))
}

#[derive(Deserialize)]
struct TagNameFilter {
    name: Option<String>,
}

async fn get_template_tags(
    State(state): State<SharedAppState>,
    Path((tmpl, group)): Path<(String, String)>,
    Query(q): Query<TagNameFilter>,
) -> Result<Json<Vec<TagDef>>, GatewayError> {
    Ok(Json(
        state.manager.get_template_tags(&tmpl, &group, q.name.as_deref())?,
    ))
}

/// Response body for the two bulk-tag endpoints: `None` on full success,
/// `Some((index, message))` naming the first tag that failed validation.
#[derive(Serialize)]
struct BulkTagResult {
    failed_at: Option<usize>,
    error: Option<String>,
}

async fn add_template_tags(
    State(state): State<SharedAppState>,
    Path((tmpl, group)): Path<(String, String)>,
    Json(tags): Json<Vec<TagDef>>,
) -> Result<Json<BulkTagResult>, GatewayError> {
    match state.manager.add_template_tags(&tmpl, &group, tags)? {
        Ok(()) => Ok(Json(BulkTagResult { failed_at: None, error: None })),
        Err((i, e)) => Ok(Json(BulkTagResult { failed_at: Some(i), error: Some(e.to_string()) })),
    }
}

async fn update_template_tags(
    State(state): State<SharedAppState>,
    Path((tmpl, group)): Path<(String, String)>,
    Json(tags): Json<Vec<TagDef>>,
) -> Result<Json<BulkTagResult>, GatewayError> {
    match state.manager.update_template_tags(&tmpl, &group, tags)? {
        Ok(()) => Ok(Json(BulkTagResult { failed_at: None, error: None })),
        Err((i, e)) => Ok(Json(BulkTagResult { failed_at: Some(i), error: Some(e.to_string()) })),
    }
}

async fn del_template_tags(
    State(state): State<SharedAppState>,
    Path((tmpl, group)): Path<(String, String)>,
    Json(names): Json<Vec<String>>,
) -> Result<StatusCode, GatewayError> {
    state.manager.del_template_tags(&tmpl, &group, names)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct InstantiateRequest {
    node: String,
}

async fn instantiate_template(
    State(state): State<SharedAppState>,
    Path(tmpl): Path<String>,
    Json(req): Json<InstantiateRequest>,
) -> Result<StatusCode, GatewayError> {
    state.manager.instantiate_template(&tmpl, &req.node)?;
    Ok(StatusCode::CREATED)
}

// ---- Subscriptions ----------------------------------------------------------

#[derive(Deserialize)]
struct SubscribeRequest {
    app: String,
    driver: String,
    group: String,
    #[serde(default)]
    params: Option<String>,
}

async fn subscribe(
    State(state): State<SharedAppState>,
    Json(req): Json<SubscribeRequest>,
) -> Result<StatusCode, GatewayError> {
    state
        .manager
        .subscribe(&req.app, &req.driver, &req.group, req.params.clone())?;
    state.manager.send_subscribe(&req.app, &req.driver, &req.group, req.params)?;
    Ok(StatusCode::CREATED)
}

#[derive(Deserialize)]
struct UnsubscribeRequest {
    app: String,
    driver: String,
    group: String,
}

async fn unsubscribe(
    State(state): State<SharedAppState>,
    Json(req): Json<UnsubscribeRequest>,
) -> Result<StatusCode, GatewayError> {
    state.manager.unsubscribe(&req.app, &req.driver, &req.group)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct AppQuery {
    app: String,
}

async fn get_sub_group(
    State(state): State<SharedAppState>,
    Query(q): Query<AppQuery>,
) -> Json<Vec<SubGroupInfo>> {
    Json(state.manager.get_sub_group(&q.app))
}

#[derive(Deserialize)]
struct NDriverMapRequest {
    ndriver: String,
    driver: String,
    group: String,
}

async fn add_ndriver_map(
    State(state): State<SharedAppState>,
    Json(req): Json<NDriverMapRequest>,
) -> Result<StatusCode, GatewayError> {
    state.manager.add_ndriver_map(&req.ndriver, &req.driver, &req.group)?;
    Ok(StatusCode::CREATED)
}

async fn del_ndriver_map(
    State(state): State<SharedAppState>,
    Json(req): Json<NDriverMapRequest>,
) -> Result<StatusCode, GatewayError> {
    state.manager.del_ndriver_map(&req.ndriver, &req.driver, &req.group)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct NDriverQuery {
    ndriver: String,
}

async fn get_ndriver_maps(
    State(state): State<SharedAppState>,
    Query(q): Query<NDriverQuery>,
) -> Result<Json<Vec<SubGroupInfo>>, GatewayError> {
    Ok(Json(state.manager.get_ndriver_maps(&q.ndriver)?))
}
