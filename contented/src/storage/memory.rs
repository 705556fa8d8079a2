//! In-memory implementation of the catalog and task store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::debug;

use crate::database::repositories::{
    CatalogRepository, TaskFilter, TaskRepository, prepare_new_task,
};
use crate::domain::{Container, Content, Screen, Task, TaskStatus};
use crate::{Error, Result};

#[derive(Default)]
struct MemoryState {
    containers: HashMap<String, Container>,
    contents: HashMap<String, Content>,
    screens: HashMap<String, Screen>,
    /// Tasks keyed by id, with an insertion sequence for stable ordering.
    tasks: HashMap<String, (u64, Task)>,
    next_seq: u64,
}

/// Catalog and task store held in process memory.
///
/// Constructed explicitly by the composition root; `initialize` and `reset`
/// give tests a deterministic starting point.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the catalog with the given containers and contents.
    ///
    /// Tasks are left untouched.
    pub fn initialize(&self, containers: Vec<Container>, contents: Vec<Content>) {
        let mut state = self.state.write();
        state.containers = containers.into_iter().map(|c| (c.id.clone(), c)).collect();
        state.contents = contents.into_iter().map(|c| (c.id.clone(), c)).collect();
        state.screens.clear();
        debug!(
            containers = state.containers.len(),
            contents = state.contents.len(),
            "Memory store initialized"
        );
    }

    /// Drop every container, content and task.
    pub fn reset(&self) {
        *self.state.write() = MemoryState::default();
    }

    pub fn task_count(&self) -> usize {
        self.state.read().tasks.len()
    }
}

#[async_trait]
impl TaskRepository for MemoryStore {
    async fn create_task(&self, task: &Task) -> Result<Task> {
        let task = prepare_new_task(task);
        let mut state = self.state.write();
        if state.tasks.contains_key(&task.id) {
            return Err(Error::validation(format!("task {} already exists", task.id)));
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.tasks.insert(task.id.clone(), (seq, task.clone()));
        Ok(task)
    }

    async fn get_task(&self, id: &str) -> Result<Task> {
        self.state
            .read()
            .tasks
            .get(id)
            .map(|(_, task)| task.clone())
            .ok_or_else(|| Error::not_found("Task", id))
    }

    async fn update_task(&self, task: &Task, expected: TaskStatus) -> Result<Task> {
        expected.check_update(task.status)?;

        let mut state = self.state.write();
        let (_, stored) = state
            .tasks
            .get_mut(&task.id)
            .ok_or_else(|| Error::not_found("Task", &task.id))?;
        if stored.status != expected {
            return Err(Error::conflict(&task.id, expected, stored.status));
        }

        let mut next = task.clone();
        next.operation = stored.operation;
        next.content_id = stored.content_id.clone();
        next.container_id = stored.container_id.clone();
        next.created_at = stored.created_at;
        next.updated_at = Utc::now();
        *stored = next.clone();
        Ok(next)
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<(Vec<Task>, u64)> {
        let state = self.state.read();
        let mut matched: Vec<&(u64, Task)> = state
            .tasks
            .values()
            .filter(|(_, task)| filter.matches(task))
            .collect();
        matched.sort_by(|(sa, a), (sb, b)| b.created_at.cmp(&a.created_at).then(sb.cmp(sa)));

        let total = matched.len() as u64;
        let tasks = matched
            .into_iter()
            .skip(filter.pagination.offset as usize)
            .take(filter.pagination.limit as usize)
            .map(|(_, task)| task.clone())
            .collect();
        Ok((tasks, total))
    }

    async fn list_queueable_tasks(&self) -> Result<Vec<Task>> {
        let state = self.state.read();
        let mut queueable: Vec<&(u64, Task)> = state
            .tasks
            .values()
            .filter(|(_, task)| task.status.is_queueable())
            .collect();
        queueable.sort_by_key(|(seq, _)| *seq);
        Ok(queueable.into_iter().map(|(_, task)| task.clone()).collect())
    }

    async fn fail_interrupted_tasks(&self, message: &str) -> Result<u64> {
        let mut state = self.state.write();
        let now = Utc::now();
        let mut count = 0;
        for (_, task) in state.tasks.values_mut() {
            if task.status == TaskStatus::InProgress {
                task.status = TaskStatus::Error;
                task.err_msg = message.to_string();
                task.updated_at = now;
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl CatalogRepository for MemoryStore {
    async fn list_containers(&self) -> Result<Vec<Container>> {
        let mut containers: Vec<Container> =
            self.state.read().containers.values().cloned().collect();
        containers.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.name.cmp(&b.name)));
        Ok(containers)
    }

    async fn get_container(&self, id: &str) -> Result<Container> {
        self.state
            .read()
            .containers
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("Container", id))
    }

    async fn find_container(&self, path: &str, name: &str) -> Result<Option<Container>> {
        Ok(self
            .state
            .read()
            .containers
            .values()
            .find(|c| c.path == path && c.name == name)
            .cloned())
    }

    async fn create_container(&self, container: &Container) -> Result<()> {
        let mut state = self.state.write();
        if state.containers.contains_key(&container.id) {
            return Err(Error::validation(format!(
                "container {} already exists",
                container.id
            )));
        }
        state
            .containers
            .insert(container.id.clone(), container.clone());
        Ok(())
    }

    async fn update_container(&self, container: &Container) -> Result<()> {
        let mut state = self.state.write();
        let stored = state
            .containers
            .get_mut(&container.id)
            .ok_or_else(|| Error::not_found("Container", &container.id))?;
        *stored = container.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_container(&self, id: &str) -> Result<()> {
        let mut state = self.state.write();
        if state.containers.remove(id).is_none() {
            return Err(Error::not_found("Container", id));
        }
        state.contents.retain(|_, content| content.container_id != id);
        let MemoryState {
            contents, screens, ..
        } = &mut *state;
        screens.retain(|_, screen| contents.contains_key(&screen.content_id));
        Ok(())
    }

    async fn list_contents(&self, container_id: &str) -> Result<Vec<Content>> {
        let mut contents: Vec<Content> = self
            .state
            .read()
            .contents
            .values()
            .filter(|c| c.container_id == container_id)
            .cloned()
            .collect();
        contents.sort_by(|a, b| a.idx.cmp(&b.idx).then_with(|| a.src.cmp(&b.src)));
        Ok(contents)
    }

    async fn get_content(&self, id: &str) -> Result<Content> {
        self.state
            .read()
            .contents
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("Content", id))
    }

    async fn create_content(&self, content: &Content) -> Result<()> {
        let mut state = self.state.write();
        if !state.containers.contains_key(&content.container_id) {
            return Err(Error::not_found("Container", &content.container_id));
        }
        if state.contents.contains_key(&content.id) {
            return Err(Error::validation(format!("content {} already exists", content.id)));
        }
        state.contents.insert(content.id.clone(), content.clone());
        Ok(())
    }

    async fn update_content(&self, content: &Content) -> Result<()> {
        let mut state = self.state.write();
        let stored = state
            .contents
            .get_mut(&content.id)
            .ok_or_else(|| Error::not_found("Content", &content.id))?;
        *stored = content.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_content(&self, id: &str) -> Result<()> {
        let mut state = self.state.write();
        if state.contents.remove(id).is_none() {
            return Err(Error::not_found("Content", id));
        }
        state.screens.retain(|_, screen| screen.content_id != id);
        Ok(())
    }

    async fn list_screens(&self, content_id: &str) -> Result<Vec<Screen>> {
        let mut screens: Vec<Screen> = self
            .state
            .read()
            .screens
            .values()
            .filter(|s| s.content_id == content_id)
            .cloned()
            .collect();
        screens.sort_by_key(|s| s.idx);
        Ok(screens)
    }

    async fn create_screen(&self, screen: &Screen) -> Result<()> {
        let mut state = self.state.write();
        if !state.contents.contains_key(&screen.content_id) {
            return Err(Error::not_found("Content", &screen.content_id));
        }
        if state.screens.contains_key(&screen.id) {
            return Err(Error::validation(format!("screen {} already exists", screen.id)));
        }
        state.screens.insert(screen.id.clone(), screen.clone());
        Ok(())
    }

    async fn replace_screens(&self, content_id: &str, screens: &[Screen]) -> Result<()> {
        if let Some(other) = screens.iter().find(|s| s.content_id != content_id) {
            return Err(Error::validation(format!(
                "screen {} belongs to content {}, not {}",
                other.id, other.content_id, content_id
            )));
        }

        let mut state = self.state.write();
        if !state.contents.contains_key(content_id) {
            return Err(Error::not_found("Content", content_id));
        }
        state.screens.retain(|_, screen| screen.content_id != content_id);
        for screen in screens {
            state.screens.insert(screen.id.clone(), screen.clone());
        }
        Ok(())
    }
}
