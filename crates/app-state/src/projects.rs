//! Project and task listing store
//!
//! Caches the project list, the project currently open in detail and that
//! project's tasks. Fetch actions only replace state on HTTP 200; any other
//! successful status is reported back through [`FetchOutcome`] so callers can
//! tell "nothing changed" apart from a failure.

use api_client::ApiRequest;
use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::context::{decode, segment, StoreContext};
use crate::error::Result;

const PROJECTS_PATH: &str = "/v1/projects";

// =============================================================================
// Types
// =============================================================================

/// Identifier of a project or task; the API uses both numbers and strings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    /// Numeric id
    Int(i64),
    /// String id
    Str(String),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(id) => write!(f, "{}", id),
            EntityId::Str(id) => f.write_str(id),
        }
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        EntityId::Int(id)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        EntityId::Str(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        EntityId::Str(id)
    }
}

/// A task belonging to a project
///
/// Decoding never fails on a recognised field of an unexpected shape: the
/// field is left unset and its raw value stays in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawTask")]
pub struct Task {
    /// Task id; unset for tasks not yet saved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,

    /// Owning project
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<EntityId>,

    /// Creation time; RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) and epoch
    /// seconds or milliseconds are understood
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Remaining attributes
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    /// A task for `project_id` with nothing else set
    pub fn for_project(project_id: impl Into<EntityId>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            ..Default::default()
        }
    }
}

/// A project with its tasks
///
/// Decoded as leniently as [`Task`]; a `null` or malformed `tasks` field
/// yields no tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawProject")]
pub struct Project {
    /// Project id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,

    /// Tasks in stored order
    pub tasks: Vec<Task>,

    /// Remaining attributes
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Project {
    /// An empty project
    pub fn new(id: impl Into<EntityId>) -> Self {
        Self {
            id: Some(id.into()),
            tasks: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Tasks ordered by creation time, newest first
    ///
    /// Tasks without a creation time sort last. Stored order is untouched.
    pub fn tasks_newest_first(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.iter().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }
}

// =============================================================================
// Lenient decoding
// =============================================================================

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Magnitude from which an epoch number is read as milliseconds
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTask {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    project_id: Option<Value>,
    #[serde(default)]
    created_at: Option<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawProject {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    tasks: Option<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<RawTask> for Task {
    fn from(raw: RawTask) -> Self {
        let mut extra = raw.extra;
        let id = lenient(raw.id, "id", &mut extra, entity_id);
        let project_id = lenient(raw.project_id, "projectId", &mut extra, entity_id);
        let created_at = lenient(raw.created_at, "createdAt", &mut extra, timestamp);

        Self {
            id,
            project_id,
            created_at,
            extra,
        }
    }
}

impl From<RawProject> for Project {
    fn from(raw: RawProject) -> Self {
        let mut extra = raw.extra;
        let id = lenient(raw.id, "id", &mut extra, entity_id);
        let tasks = lenient(raw.tasks, "tasks", &mut extra, |value| {
            serde_json::from_value(value.clone()).ok()
        })
        .unwrap_or_default();

        Self { id, tasks, extra }
    }
}

/// Parse a present, non-null field; unparseable values go back into `extra`
fn lenient<T>(
    raw: Option<Value>,
    key: &str,
    extra: &mut Map<String, Value>,
    parse: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    let raw = raw?;
    let parsed = parse(&raw);
    if parsed.is_none() {
        tracing::debug!(field = key, "keeping unrecognised value as-is");
        extra.insert(key.to_string(), raw);
    }
    parsed
}

fn entity_id(value: &Value) -> Option<EntityId> {
    match value {
        Value::Number(n) => n.as_i64().map(EntityId::Int),
        Value::String(s) => Some(EntityId::Str(s.clone())),
        _ => None,
    }
}

fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|at| at.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NAIVE_FORMATS
                    .iter()
                    .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
                    .map(|at| at.and_utc())
            }),
        Value::Number(n) => n.as_i64().and_then(|n| {
            if n.abs() >= EPOCH_MILLIS_THRESHOLD {
                DateTime::from_timestamp_millis(n)
            } else {
                DateTime::from_timestamp(n, 0)
            }
        }),
        _ => None,
    }
}

// =============================================================================
// State
// =============================================================================

/// Projects store state
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectsState {
    /// All projects
    pub list: Vec<Project>,
    /// Project open in detail
    pub project: Option<Project>,
    /// Tasks of the project open in detail
    pub project_tasks: Vec<Task>,
}

/// What a fetch action did with the response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// HTTP 200; state was replaced
    Committed,
    /// Some other 2xx; state was left as it was
    NotCommitted {
        /// Response status
        status: u16,
    },
}

impl FetchOutcome {
    /// Whether state was replaced
    pub fn is_committed(&self) -> bool {
        matches!(self, FetchOutcome::Committed)
    }
}

// =============================================================================
// Store
// =============================================================================

/// Projects store
pub struct ProjectsStore {
    state: RwLock<ProjectsState>,
    ctx: StoreContext,
}

impl ProjectsStore {
    /// Create an empty store
    pub fn new(ctx: StoreContext) -> Self {
        Self {
            state: RwLock::new(ProjectsState::default()),
            ctx,
        }
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> ProjectsState {
        self.state.read().clone()
    }

    /// All projects
    pub fn list(&self) -> Vec<Project> {
        self.state.read().list.clone()
    }

    /// Project open in detail
    pub fn project(&self) -> Option<Project> {
        self.state.read().project.clone()
    }

    /// Tasks of the project open in detail
    pub fn project_tasks(&self) -> Vec<Task> {
        self.state.read().project_tasks.clone()
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    /// Replace the project list
    pub fn set_projects(&self, list: Vec<Project>) {
        tracing::debug!(mutation = "set_projects", count = list.len());
        self.state.write().list = list;
    }

    /// Replace the detailed project
    pub fn set_project(&self, project: Option<Project>) {
        tracing::debug!(mutation = "set_project", id = ?project.as_ref().and_then(|p| p.id.as_ref()));
        self.state.write().project = project;
    }

    /// Replace the detailed project's tasks
    pub fn set_tasks(&self, tasks: Vec<Task>) {
        tracing::debug!(mutation = "set_tasks", count = tasks.len());
        self.state.write().project_tasks = tasks;
    }

    /// Append `task` to the project in `list` it belongs to
    ///
    /// Returns `false`, leaving `list` unchanged, when no project matches.
    /// Every project sharing the id receives the task.
    pub fn add_task(&self, task: Task) -> bool {
        let Some(project_id) = task.project_id.clone() else {
            tracing::debug!(mutation = "add_task", "task has no project id");
            return false;
        };

        let mut state = self.state.write();
        let mut added = false;
        for project in state.list.iter_mut().filter(|p| p.id.as_ref() == Some(&project_id)) {
            project.tasks.push(task.clone());
            added = true;
        }

        tracing::debug!(mutation = "add_task", project_id = %project_id, added);
        added
    }

    // -------------------------------------------------------------------------
    // Actions
    // -------------------------------------------------------------------------

    /// Fetch all projects into `list`
    pub async fn get_projects(&self) -> Result<FetchOutcome> {
        self.fetch(PROJECTS_PATH.to_string(), |store, list| store.set_projects(list))
            .await
    }

    /// Fetch one project into `project`
    pub async fn get_project_by_id(&self, id: impl Into<EntityId>) -> Result<FetchOutcome> {
        let path = format!("{}/{}", PROJECTS_PATH, segment(&id.into().to_string()));
        self.fetch(path, |store, project| store.set_project(Some(project)))
            .await
    }

    /// Fetch a project's tasks into `project_tasks`
    pub async fn get_project_tasks(&self, id: impl Into<EntityId>) -> Result<FetchOutcome> {
        let path = format!("{}/{}/tasks", PROJECTS_PATH, segment(&id.into().to_string()));
        self.fetch(path, |store, tasks| store.set_tasks(tasks)).await
    }

    async fn fetch<T, F>(&self, path: String, commit: F) -> Result<FetchOutcome>
    where
        T: DeserializeOwned,
        F: FnOnce(&Self, T),
    {
        let response = self.ctx.http.execute(ApiRequest::get(path.as_str())).await?;

        if response.status != 200 {
            tracing::debug!(path = %path, status = response.status, "response not committed");
            return Ok(FetchOutcome::NotCommitted {
                status: response.status,
            });
        }

        commit(self, decode(response.data)?);
        Ok(FetchOutcome::Committed)
    }
}
