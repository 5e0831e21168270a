//! Workflow automation: persisted CRUD plus execution.
//!
//! Only the first step of a workflow is interpreted. Unknown step kinds are
//! kept in storage but do nothing when run.

use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info};
use uuid::Uuid;

use kwararru_chat::Conversation;
use kwararru_core::events::DomainEvent;
use kwararru_core::types::{MessageId, Mode, StepType, Timestamp, View, Workflow, WorkflowStep};
use kwararru_storage::PersistedState;

use crate::error::ActionError;

pub const WORKFLOW_NOT_FOUND_NOTICE: &str = "Error: Workflow not found.";

pub struct WorkflowEngine {
    conversation: Conversation,
    persisted: PersistedState,
    workflows: Mutex<Vec<Workflow>>,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("workflows", &self.lock().len())
            .finish()
    }
}

impl WorkflowEngine {
    /// Load the saved workflows from `persisted`.
    pub fn new(conversation: Conversation, persisted: PersistedState) -> Self {
        let workflows = persisted.workflows();
        debug!(count = workflows.len(), "Workflows loaded");
        Self {
            conversation,
            persisted,
            workflows: Mutex::new(workflows),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Workflow>> {
        self.workflows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply `f` to the list and persist the result.
    fn modify<R>(&self, f: impl FnOnce(&mut Vec<Workflow>) -> R) -> R {
        let mut workflows = self.lock();
        let result = f(&mut workflows);
        self.persisted.save_workflows(&workflows);
        result
    }

    pub fn list(&self) -> Vec<Workflow> {
        self.lock().clone()
    }

    pub fn get(&self, id: &str) -> Option<Workflow> {
        self.lock().iter().find(|w| w.id == id).cloned()
    }

    /// Insert `workflow`, or replace the one with the same id in place.
    pub fn save(&self, workflow: Workflow) {
        self.modify(|workflows| {
            match workflows.iter_mut().find(|w| w.id == workflow.id) {
                Some(existing) => *existing = workflow,
                None => workflows.push(workflow),
            }
        });
    }

    pub fn create(&self, name: impl Into<String>, steps: Vec<WorkflowStep>) -> Workflow {
        let workflow = Workflow {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            is_enabled: true,
            steps,
        };
        self.save(workflow.clone());
        workflow
    }

    pub fn delete(&self, id: &str) -> bool {
        self.modify(|workflows| {
            let before = workflows.len();
            workflows.retain(|w| w.id != id);
            workflows.len() != before
        })
    }

    pub fn toggle(&self, id: &str, is_enabled: bool) -> bool {
        self.modify(|workflows| match workflows.iter_mut().find(|w| w.id == id) {
            Some(workflow) => {
                workflow.is_enabled = is_enabled;
                true
            }
            None => false,
        })
    }

    /// Run the workflow with `id`.
    ///
    /// Returns the id of the user turn it sent, or `None` when the first step
    /// had nothing to do. An unknown id raises a notice and changes nothing.
    pub async fn run(&self, id: &str) -> Result<Option<MessageId>, ActionError> {
        let Some(workflow) = self.get(id) else {
            self.conversation.notify(WORKFLOW_NOT_FOUND_NOTICE);
            return Err(ActionError::WorkflowNotFound(id.to_string()));
        };
        self.execute(workflow).await
    }

    /// Run the enabled workflow called `name`.
    pub async fn run_by_name(&self, name: &str) -> Result<Option<MessageId>, ActionError> {
        let found = self
            .lock()
            .iter()
            .find(|w| w.is_enabled && w.name == name)
            .cloned();
        let Some(workflow) = found else {
            self.conversation.notify(WORKFLOW_NOT_FOUND_NOTICE);
            return Err(ActionError::WorkflowNotFound(name.to_string()));
        };
        self.execute(workflow).await
    }

    async fn execute(&self, workflow: Workflow) -> Result<Option<MessageId>, ActionError> {
        info!(workflow_id = %workflow.id, name = %workflow.name, "Running workflow");
        self.conversation
            .notify(format!("Running workflow: {}...", workflow.name));
        self.conversation.events().publish(DomainEvent::WorkflowRun {
            workflow_id: workflow.id.clone(),
            name: workflow.name.clone(),
            timestamp: Timestamp::now(),
        });

        let Some(step) = workflow.steps.first() else {
            debug!(workflow_id = %workflow.id, "Workflow has no steps");
            return Ok(None);
        };

        match &step.step_type {
            StepType::GetNews => {
                let Some(topic) = step.param_str("topic").filter(|t| !t.is_empty()) else {
                    debug!(workflow_id = %workflow.id, "get_news step without a topic");
                    return Ok(None);
                };
                self.conversation.set_mode(Mode::News);
                self.conversation.set_view(View::Chat);
                let id = self
                    .conversation
                    .sender_for(Mode::News)
                    .send(topic, true)
                    .await?;
                Ok(Some(id))
            }
            StepType::Other(kind) => {
                debug!(workflow_id = %workflow.id, step = %kind, "Skipping unsupported workflow step");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kwararru_chat::SessionStore;
    use kwararru_core::events::EventBus;
    use kwararru_storage::{keys, KeyValueStore, MemoryStore};
    use std::sync::Arc;
    use std::time::Duration;

    fn news_step(topic: &str) -> WorkflowStep {
        let params = serde_json::json!({ "topic": topic });
        WorkflowStep {
            step_type: StepType::GetNews,
            params: params.as_object().cloned().unwrap_or_default(),
        }
    }

    fn setup() -> (WorkflowEngine, Conversation, Arc<MemoryStore>) {
        let kv = Arc::new(MemoryStore::new());
        let store = SessionStore::new(Duration::from_millis(20), EventBus::default());
        let conversation = Conversation::new(store, None, 8000);
        let engine = WorkflowEngine::new(conversation.clone(), PersistedState::new(kv.clone()));
        (engine, conversation, kv)
    }

    #[test]
    fn test_crud_persists_every_change() {
        let (engine, _, kv) = setup();
        let wf = engine.create("Morning news", vec![news_step("markets")]);
        assert!(kv.get(keys::WORKFLOWS).unwrap().unwrap().contains("Morning news"));

        assert!(engine.toggle(&wf.id, false));
        assert!(!engine.get(&wf.id).unwrap().is_enabled);

        let mut renamed = wf.clone();
        renamed.name = "Evening news".into();
        engine.save(renamed);
        assert_eq!(engine.list().len(), 1);
        assert!(kv.get(keys::WORKFLOWS).unwrap().unwrap().contains("Evening news"));

        assert!(engine.delete(&wf.id));
        assert!(!engine.delete(&wf.id));
        assert!(!engine.toggle(&wf.id, true));
        assert_eq!(kv.get(keys::WORKFLOWS).unwrap().unwrap(), "[]");
    }

    #[test]
    fn test_loads_saved_workflows() {
        let kv = Arc::new(MemoryStore::new());
        kv.set(
            keys::WORKFLOWS,
            r#"[{"id":"w1","name":"Saved","steps":[{"type":"get_news","params":{"topic":"ai"}}]}]"#,
        )
        .unwrap();
        let store = SessionStore::new(Duration::from_millis(20), EventBus::default());
        let engine = WorkflowEngine::new(
            Conversation::new(store, None, 8000),
            PersistedState::new(kv),
        );
        let wf = engine.get("w1").unwrap();
        assert!(wf.is_enabled);
        assert_eq!(wf.steps[0].step_type, StepType::GetNews);
    }

    #[tokio::test]
    async fn test_run_get_news() {
        let (engine, conversation, _) = setup();
        let mut rx = conversation.events().subscribe();
        let wf = engine.create("Election watch", vec![news_step("elections")]);

        let id = engine.run(&wf.id).await.unwrap().unwrap();
        assert_eq!(conversation.mode(), Mode::News);
        assert_eq!(conversation.view(), View::Chat);

        let news = conversation.store().messages(Mode::News).unwrap();
        assert_eq!(news.len(), 1);
        assert_eq!(news[0].id, id);
        assert_eq!(news[0].text, "elections");

        let notices: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|e| match e {
                DomainEvent::Notice { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(notices, vec!["Running workflow: Election watch...".to_string()]);
    }

    #[tokio::test]
    async fn test_run_unknown_workflow_changes_nothing() {
        let (engine, conversation, _) = setup();
        let mut rx = conversation.events().subscribe();

        let result = engine.run("missing").await;
        assert!(matches!(result, Err(ActionError::WorkflowNotFound(_))));
        assert_eq!(conversation.mode(), Mode::Default);
        assert_eq!(conversation.store().snapshot().unwrap().total_messages(), 0);

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            DomainEvent::Notice { text, .. } if text == WORKFLOW_NOT_FOUND_NOTICE
        ));
    }

    #[tokio::test]
    async fn test_only_first_step_runs() {
        let (engine, conversation, _) = setup();
        let wf = engine.create(
            "Two topics",
            vec![news_step("first"), news_step("second")],
        );
        engine.run(&wf.id).await.unwrap();
        let news = conversation.store().messages(Mode::News).unwrap();
        assert_eq!(news.len(), 1);
        assert_eq!(news[0].text, "first");
    }

    #[tokio::test]
    async fn test_unknown_step_and_missing_topic_do_nothing() {
        let (engine, conversation, _) = setup();
        let unknown = engine.create(
            "Mystery",
            vec![WorkflowStep {
                step_type: StepType::Other("send_email".into()),
                params: Default::default(),
            }],
        );
        let no_topic = engine.create("Blank", vec![news_step("")]);
        let empty = engine.create("Empty", Vec::new());

        assert_eq!(engine.run(&unknown.id).await.unwrap(), None);
        assert_eq!(engine.run(&no_topic.id).await.unwrap(), None);
        assert_eq!(engine.run(&empty.id).await.unwrap(), None);
        assert_eq!(conversation.mode(), Mode::Default);
        assert_eq!(conversation.store().snapshot().unwrap().total_messages(), 0);
    }

    #[tokio::test]
    async fn test_run_by_name_requires_enabled() {
        let (engine, conversation, _) = setup();
        let wf = engine.create("Daily", vec![news_step("weather")]);
        engine.toggle(&wf.id, false);
        assert!(engine.run_by_name("Daily").await.is_err());

        engine.toggle(&wf.id, true);
        engine.run_by_name("Daily").await.unwrap();
        assert_eq!(conversation.store().messages(Mode::News).unwrap().len(), 1);

        // run by id ignores the enabled flag.
        engine.toggle(&wf.id, false);
        assert!(engine.run(&wf.id).await.unwrap().is_some());
    }
}
