use crate::application::NowProvider;
use crate::domain::models::{PendingAction, Progress, Task};
use crate::domain::pending::{Mutation, Transition, transition};
use crate::domain::time::{DAY_MS, day_anchor};
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::EngineError;
use crate::infrastructure::schedule_store::ScheduleStore;
use crate::infrastructure::task_store::TaskStore;
use std::sync::Arc;
use tokio::sync::watch;

/// Caller-supplied fields for a new task; identity and sync bookkeeping are
/// assigned by the service.
#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
    pub title: String,
    pub detail: String,
    pub due_time: Option<i64>,
    pub tag: String,
    pub quadrant: i64,
}

pub struct TaskService<T, S, C> {
    tasks: Arc<T>,
    schedule: Arc<S>,
    credentials: Arc<C>,
    now: NowProvider,
}

impl<T, S, C> TaskService<T, S, C>
where
    T: TaskStore,
    S: ScheduleStore,
    C: CredentialStore,
{
    pub fn new(tasks: Arc<T>, schedule: Arc<S>, credentials: Arc<C>, now: NowProvider) -> Self {
        Self {
            tasks,
            schedule,
            credentials,
            now,
        }
    }

    fn owner(&self) -> Result<i64, EngineError> {
        self.credentials
            .load_session()?
            .map(|session| session.owner_id)
            .ok_or(EngineError::NotAuthenticated)
    }

    pub fn create(&self, draft: TaskDraft) -> Result<Task, EngineError> {
        let owner_id = self.owner()?;
        let now = (self.now)();
        let task = Task {
            local_id: uuid::Uuid::new_v4().to_string(),
            owner_id,
            server_id: None,
            title: draft.title,
            detail: draft.detail,
            due_time: draft.due_time,
            tag: draft.tag,
            quadrant: draft.quadrant,
            progress: Progress::NotYet,
            created_at: Some(now),
            updated_at: Some(now),
            deleted_at: None,
            pending_action: PendingAction::Create,
            local_mutation_clock: now,
        };
        task.validate().map_err(EngineError::Validation)?;
        self.tasks.upsert(&task)?;
        Ok(task)
    }

    /// Applies an edit and re-flags the record for push. Editing a record
    /// already queued for deletion is rejected.
    pub fn update(&self, mut task: Task) -> Result<Task, EngineError> {
        self.owner()?;
        task.validate().map_err(EngineError::Validation)?;
        let existing = self
            .tasks
            .find_by_local_id(&task.local_id)?
            .ok_or_else(|| EngineError::Validation("task does not exist".to_string()))?;

        match transition(existing.pending_action, Mutation::Update) {
            Transition::Flag(action) => {
                let now = (self.now)();
                task.pending_action = action;
                task.updated_at = Some(now);
                task.local_mutation_clock = now;
                self.tasks.upsert(&task)?;
                Ok(task)
            }
            Transition::Reject => Err(EngineError::Validation(
                "task is queued for deletion".to_string(),
            )),
            Transition::Purge => unreachable!("update never purges"),
        }
    }

    /// Deletes a task. A record the server never saw is purged outright;
    /// anything else is flagged so the next push propagates the delete.
    /// Linked schedule slots are detached either way.
    pub fn delete(&self, local_id: &str) -> Result<(), EngineError> {
        let owner_id = self.owner()?;
        let Some(mut task) = self.tasks.find_by_local_id(local_id)? else {
            return Ok(());
        };
        let now = (self.now)();

        match transition(task.pending_action, Mutation::Delete) {
            Transition::Purge => self.tasks.hard_delete(local_id)?,
            Transition::Flag(action) => {
                task.pending_action = action;
                task.deleted_at = Some(now);
                task.updated_at = Some(now);
                task.local_mutation_clock = now;
                self.tasks.upsert(&task)?;
            }
            Transition::Reject => unreachable!("delete is never rejected"),
        }

        self.schedule.detach_task(owner_id, local_id, &task.title, now)
    }

    /// List view backing query. A blank query lists everything live; anything
    /// else is a substring search over title and detail.
    pub fn observe(&self, query: &str) -> Result<Vec<Task>, EngineError> {
        let owner_id = self.owner()?;
        let keyword = query.trim();
        if keyword.is_empty() {
            self.tasks.active(owner_id)
        } else {
            self.tasks.search(owner_id, keyword)
        }
    }

    pub fn tasks_due_on(&self, at: i64) -> Result<Vec<Task>, EngineError> {
        let owner_id = self.owner()?;
        let day = day_anchor(at);
        self.tasks.due_between(owner_id, day, day + DAY_MS)
    }

    pub fn open_count(&self) -> Result<i64, EngineError> {
        let owner_id = self.owner()?;
        self.tasks.count_open(owner_id)
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tasks.subscribe()
    }
}
