// Task reminder dispatch loop

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::db::repositories::{NoteRepository, TaskRepository};
use common::db::DbPool;
use common::errors::DatabaseError;
use common::models::{NoteType, TaskView, TimelineEvent};
use common::telemetry;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub poll_interval_seconds: u64,
    /// Most reminders handled per poll
    pub batch_size: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 60,
            batch_size: 100,
        }
    }
}

/// Storage the dispatcher reads due tasks from and records reminders into
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReminderStore: Send + Sync {
    async fn due_reminders(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<TaskView>, DatabaseError>;

    /// Flag the task as reminded; false when another worker got there first
    async fn mark_sent(&self, task_id: i64) -> Result<bool, DatabaseError>;

    async fn log_reminder(&self, event: TimelineEvent);
}

/// `ReminderStore` over the MySQL repositories
pub struct RepositoryStore {
    tasks: TaskRepository,
    notes: NoteRepository,
}

impl RepositoryStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            tasks: TaskRepository::new(pool.clone()),
            notes: NoteRepository::new(pool),
        }
    }
}

#[async_trait]
impl ReminderStore for RepositoryStore {
    async fn due_reminders(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<TaskView>, DatabaseError> {
        self.tasks.due_reminders(now, limit).await
    }

    async fn mark_sent(&self, task_id: i64) -> Result<bool, DatabaseError> {
        self.tasks.mark_reminder_sent(task_id).await
    }

    async fn log_reminder(&self, event: TimelineEvent) {
        self.notes.log_event(event).await
    }
}

pub fn reminder_event(view: &TaskView) -> TimelineEvent {
    let task = &view.task;
    let mut event = TimelineEvent::new(task.user_id, task.customer_id, NoteType::TaskReminder)
        .title(format!("Reminder: {}", task.title))
        .metadata(serde_json::json!({
            "task_id": task.id,
            "due_date": task.due_date,
            "reminder_date": task.reminder_date,
            "priority": task.priority,
        }));
    if let Some(description) = task.description.as_deref().filter(|d| !d.is_empty()) {
        event = event.content(description);
    }
    event
}

pub struct ReminderDispatcher {
    config: DispatcherConfig,
    store: Arc<dyn ReminderStore>,
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

impl ReminderDispatcher {
    pub fn new(config: DispatcherConfig, store: Arc<dyn ReminderStore>) -> Self {
        let (shutdown_tx, _shutdown_rx) = tokio::sync::broadcast::channel(1);
        Self {
            config,
            store,
            shutdown_tx,
        }
    }

    pub fn shutdown_receiver(&self) -> tokio::sync::broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Record every reminder due at `now`; returns how many were recorded
    #[instrument(skip(self))]
    pub async fn dispatch_due(&self, now: DateTime<Utc>) -> Result<usize, DatabaseError> {
        let due = self.store.due_reminders(now, self.config.batch_size).await?;
        debug!(due = due.len(), "Found due reminders");

        let mut dispatched = 0;
        for view in &due {
            match self.store.mark_sent(view.task.id).await {
                Ok(true) => {
                    self.store.log_reminder(reminder_event(view)).await;
                    telemetry::record_reminder_dispatched();
                    info!(
                        task_id = view.task.id,
                        user_id = view.task.user_id,
                        customer_id = view.task.customer_id,
                        "Task reminder recorded"
                    );
                    dispatched += 1;
                }
                Ok(false) => {
                    debug!(task_id = view.task.id, "Reminder already claimed");
                }
                Err(e) => {
                    // Leave the task pending so the next poll retries it
                    warn!(task_id = view.task.id, error = %e, "Failed to mark reminder sent");
                }
            }
        }

        Ok(dispatched)
    }

    /// Poll until `stop` is called
    #[instrument(skip(self))]
    pub async fn start(&self) {
        info!(
            poll_interval_seconds = self.config.poll_interval_seconds,
            batch_size = self.config.batch_size,
            "Starting reminder dispatcher"
        );

        let mut poll_interval = interval(Duration::from_secs(self.config.poll_interval_seconds));
        let mut shutdown_rx = self.shutdown_receiver();

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    match self.dispatch_due(Utc::now()).await {
                        Ok(0) => debug!("No reminders due"),
                        Ok(count) => info!(reminders = count, "Dispatched reminders"),
                        Err(e) => error!(error = %e, "Error loading due reminders"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping dispatcher");
                    break;
                }
            }
        }

        info!("Reminder dispatcher stopped");
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use common::models::{Task, TaskPriority, TaskStatus, TaskType};

    fn due_task(id: i64) -> TaskView {
        let due = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        TaskView {
            task: Task {
                id,
                user_id: 7,
                customer_id: 40 + id,
                title: format!("Call back #{}", id),
                description: Some("Ask about the festive order".to_string()),
                task_type: TaskType::Call,
                status: TaskStatus::Pending,
                due_date: due,
                reminder_date: Some(due - chrono::Duration::hours(1)),
                is_reminder_sent: false,
                priority: TaskPriority::High,
                created_at: due,
                updated_at: due,
            },
            customer_name: Some("Meera".to_string()),
            customer_phone: Some("+919876543210".to_string()),
        }
    }

    #[test]
    fn test_reminder_event_shape() {
        let event = reminder_event(&due_task(3));
        assert_eq!(event.note_type, NoteType::TaskReminder);
        assert_eq!(event.user_id, 7);
        assert_eq!(event.customer_id, 43);
        assert_eq!(event.title.as_deref(), Some("Reminder: Call back #3"));
        assert_eq!(event.content.as_deref(), Some("Ask about the festive order"));
        assert_eq!(event.metadata["task_id"], 3);
        assert_eq!(event.metadata["priority"], "high");
        assert_eq!(event.created_by, None);
    }

    #[tokio::test]
    async fn test_dispatch_marks_and_logs_each_due_task() {
        let mut store = MockReminderStore::new();
        store
            .expect_due_reminders()
            .withf(|_, limit| *limit == 2)
            .returning(|_, _| Ok(vec![due_task(1), due_task(2)]));
        store.expect_mark_sent().times(2).returning(|_| Ok(true));
        store
            .expect_log_reminder()
            .times(2)
            .withf(|event| event.note_type == NoteType::TaskReminder)
            .returning(|_| ());

        let dispatcher = ReminderDispatcher::new(
            DispatcherConfig {
                poll_interval_seconds: 1,
                batch_size: 2,
            },
            Arc::new(store),
        );

        assert_eq!(dispatcher.dispatch_due(Utc::now()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_claimed_or_failed_tasks_are_not_logged() {
        let mut store = MockReminderStore::new();
        store
            .expect_due_reminders()
            .returning(|_, _| Ok(vec![due_task(1), due_task(2), due_task(3)]));
        store.expect_mark_sent().returning(|id| match id {
            1 => Ok(false),
            2 => Err(DatabaseError::QueryFailed("lock wait timeout".to_string())),
            _ => Ok(true),
        });
        store
            .expect_log_reminder()
            .times(1)
            .withf(|event| event.customer_id == 43)
            .returning(|_| ());

        let dispatcher = ReminderDispatcher::new(DispatcherConfig::default(), Arc::new(store));
        assert_eq!(dispatcher.dispatch_due(Utc::now()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_load_failure_is_returned() {
        let mut store = MockReminderStore::new();
        store
            .expect_due_reminders()
            .returning(|_, _| Err(DatabaseError::ConnectionFailed("refused".to_string())));
        store.expect_mark_sent().never();

        let dispatcher = ReminderDispatcher::new(DispatcherConfig::default(), Arc::new(store));
        assert!(dispatcher.dispatch_due(Utc::now()).await.is_err());
    }

    #[tokio::test]
    async fn test_stop_ends_the_loop() {
        let mut store = MockReminderStore::new();
        store.expect_due_reminders().returning(|_, _| Ok(vec![]));

        let dispatcher = Arc::new(ReminderDispatcher::new(
            DispatcherConfig {
                poll_interval_seconds: 3600,
                batch_size: 10,
            },
            Arc::new(store),
        ));

        let runner = dispatcher.clone();
        let handle = tokio::spawn(async move { runner.start().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        dispatcher.stop();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("dispatcher did not stop")
            .unwrap();
    }

    /// *For any* mix of claim results, only freshly claimed reminders are
    /// logged and counted.
    #[test]
    fn property_dispatch_counts_only_claimed() {
        use proptest::prelude::*;

        let rt = tokio::runtime::Runtime::new().unwrap();
        proptest!(|(claims in prop::collection::vec(any::<bool>(), 0..20))| {
            let expected = claims.iter().filter(|c| **c).count();
            let tasks: Vec<TaskView> = (1..=claims.len() as i64).map(due_task).collect();
            let outcomes = claims.clone();

            let mut store = MockReminderStore::new();
            store
                .expect_due_reminders()
                .returning(move |_, _| Ok(tasks.clone()));
            store
                .expect_mark_sent()
                .returning(move |id| Ok(outcomes[(id - 1) as usize]));
            store
                .expect_log_reminder()
                .times(expected)
                .returning(|_| ());

            let dispatcher = ReminderDispatcher::new(DispatcherConfig::default(), Arc::new(store));
            let sent = rt.block_on(dispatcher.dispatch_due(Utc::now())).unwrap();
            prop_assert_eq!(sent, expected);
        });
    }
}
