//! Admission control for experiment runs
//!
//! A counting semaphore bounds how many experiments run at once. In reject
//! mode a full scheduler refuses new runs immediately; in queue mode callers
//! wait, and slots are handed out by priority, then by scheduled time.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};

use chrono::{DateTime, Utc};
use domain::entities::Experiment;
use domain::value_objects::Priority;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, instrument, warn};

use crate::error::ApplicationError;
use crate::services::safety_policy::{AdmissionDecision, SafetyPolicyEngine};

/// What to do when every slot is taken
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionMode {
    /// Refuse immediately
    #[default]
    Reject,
    /// Wait for a slot, highest priority first
    Queue,
}

/// Scheduler settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_experiments: usize,
    #[serde(default)]
    pub admission_mode: AdmissionMode,
}

const fn default_max_concurrent() -> usize {
    5
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_experiments: default_max_concurrent(),
            admission_mode: AdmissionMode::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Ticket {
    priority: Priority,
    scheduled_at: DateTime<Utc>,
    seq: u64,
}

impl Ord for Ticket {
    // Max-heap: higher priority first, then earlier schedule, then arrival
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.scheduled_at.cmp(&self.scheduled_at))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Ticket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Removes a waiter's ticket if it stops waiting early
struct QueuedTicket<'a> {
    queue: &'a Mutex<BinaryHeap<Ticket>>,
    notify: &'a Notify,
    seq: u64,
    armed: bool,
}

impl Drop for QueuedTicket<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.queue.lock().retain(|t| t.seq != self.seq);
            self.notify.notify_waiters();
        }
    }
}

/// A running slot; released on drop
#[derive(Debug)]
pub struct SchedulerPermit {
    permit: Option<OwnedSemaphorePermit>,
    active: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl Drop for SchedulerPermit {
    fn drop(&mut self) {
        drop(self.permit.take());
        self.active.fetch_sub(1, AtomicOrdering::SeqCst);
        self.notify.notify_waiters();
    }
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Bounded experiment scheduler
pub struct ExperimentScheduler {
    config: SchedulerConfig,
    policy: Arc<SafetyPolicyEngine>,
    clock: Clock,
    semaphore: Arc<Semaphore>,
    queue: Mutex<BinaryHeap<Ticket>>,
    notify: Arc<Notify>,
    active: Arc<AtomicUsize>,
    next_seq: AtomicU64,
}

impl std::fmt::Debug for ExperimentScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExperimentScheduler")
            .field("config", &self.config)
            .field("active", &self.active_count())
            .field("queued", &self.queued_count())
            .finish_non_exhaustive()
    }
}

impl ExperimentScheduler {
    #[must_use]
    pub fn new(config: SchedulerConfig, policy: Arc<SafetyPolicyEngine>) -> Self {
        let slots = config.max_concurrent_experiments.max(1);
        Self {
            config,
            policy,
            clock: Arc::new(Utc::now),
            semaphore: Arc::new(Semaphore::new(slots)),
            queue: Mutex::new(BinaryHeap::new()),
            notify: Arc::new(Notify::new()),
            active: Arc::new(AtomicUsize::new(0)),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Evaluate time-dependent policy rules against this clock
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Experiments currently holding a slot
    pub fn active_count(&self) -> usize {
        self.active.load(AtomicOrdering::SeqCst)
    }

    /// Experiments waiting for a slot
    pub fn queued_count(&self) -> usize {
        self.queue.lock().len()
    }

    /// Acquire a slot for an experiment
    ///
    /// The safety policy is checked before waiting and again once a slot is
    /// held, so a policy that changes while queued still applies.
    #[instrument(skip(self, experiment), fields(experiment_id = %experiment.id, priority = %experiment.priority))]
    pub async fn admit(&self, experiment: &Experiment) -> Result<SchedulerPermit, ApplicationError> {
        self.check_policy(experiment)?;

        let permit = match self.config.admission_mode {
            AdmissionMode::Reject => Arc::clone(&self.semaphore)
                .try_acquire_owned()
                .map_err(|_| {
                    warn!(max = self.config.max_concurrent_experiments, "Scheduler full");
                    ApplicationError::SchedulerRejection(format!(
                        "maximum concurrent experiments ({}) reached",
                        self.config.max_concurrent_experiments
                    ))
                })?,
            AdmissionMode::Queue => self.wait_for_slot(experiment).await,
        };

        let active = self.active.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        // dropping the permit on a failed re-check wakes the next waiter
        let permit = SchedulerPermit {
            permit: Some(permit),
            active: Arc::clone(&self.active),
            notify: Arc::clone(&self.notify),
        };
        self.check_policy(experiment)?;

        info!(active, "Experiment admitted");
        Ok(permit)
    }

    fn check_policy(&self, experiment: &Experiment) -> Result<(), ApplicationError> {
        match self.policy.admission_at(experiment, (self.clock)()) {
            AdmissionDecision::Admit { warnings } => {
                for warning in &warnings {
                    warn!(rule = %warning.rule, message = %warning.message, "Policy warning");
                }
                Ok(())
            },
            decision @ AdmissionDecision::Deny { .. } => Err(ApplicationError::SchedulerRejection(
                format!("denied by safety policy: {}", decision.summary()),
            )),
            decision @ AdmissionDecision::RequireApproval { .. } => {
                Err(ApplicationError::SchedulerRejection(format!(
                    "approval required: {}",
                    decision.summary()
                )))
            },
        }
    }

    async fn wait_for_slot(&self, experiment: &Experiment) -> OwnedSemaphorePermit {
        let seq = self.next_seq.fetch_add(1, AtomicOrdering::SeqCst);
        let ticket = Ticket {
            priority: experiment.priority,
            scheduled_at: experiment.created_at,
            seq,
        };
        self.queue.lock().push(ticket);
        let mut guard = QueuedTicket {
            queue: &self.queue,
            notify: &self.notify,
            seq,
            armed: true,
        };
        debug!(seq, queued = self.queued_count(), "Waiting for a slot");

        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut queue = self.queue.lock();
                let at_head = queue.peek().is_some_and(|t| t.seq == seq);
                if at_head {
                    if let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() {
                        queue.pop();
                        drop(queue);
                        guard.armed = false;
                        // the next waiter may also fit
                        self.notify.notify_waiters();
                        return permit;
                    }
                }
            }

            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use domain::entities::{
        FaultConfig, FaultDefinition, PolicyRule, RuleCondition, SafetyPolicy, Target,
    };
    use chrono::TimeZone;
    use futures::future::join_all;

    use super::*;

    fn experiment(name: &str, priority: Priority) -> Experiment {
        Experiment::new(name, Target::new("service", name), Duration::from_secs(60))
            .with_priority(priority)
            .with_fault(
                FaultDefinition::new("f1", FaultConfig::Unavailability, Duration::from_secs(30))
                    .unwrap(),
            )
    }

    fn scheduler(max: usize, mode: AdmissionMode) -> Arc<ExperimentScheduler> {
        Arc::new(ExperimentScheduler::new(
            SchedulerConfig {
                max_concurrent_experiments: max,
                admission_mode: mode,
            },
            Arc::new(SafetyPolicyEngine::default()),
        ))
    }

    #[tokio::test]
    async fn reject_mode_refuses_when_full() {
        let scheduler = scheduler(2, AdmissionMode::Reject);
        let exp = experiment("api", Priority::Medium);

        let first = scheduler.admit(&exp).await.unwrap();
        let _second = scheduler.admit(&exp).await.unwrap();
        assert_eq!(scheduler.active_count(), 2);

        let err = scheduler.admit(&exp).await.unwrap_err();
        assert!(matches!(err, ApplicationError::SchedulerRejection(_)));
        assert!(err.to_string().contains("(2)"));

        drop(first);
        assert_eq!(scheduler.active_count(), 1);
        assert!(scheduler.admit(&exp).await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_submissions_beyond_capacity_get_one_rejection() {
        let scheduler = scheduler(3, AdmissionMode::Reject);
        let experiments: Vec<_> = (0..4)
            .map(|i| experiment(&format!("svc-{i}"), Priority::Medium))
            .collect();

        let outcomes = join_all(experiments.iter().map(|e| scheduler.admit(e))).await;
        let rejected = outcomes.iter().filter(|o| o.is_err()).count();
        assert_eq!(rejected, 1);
        assert_eq!(scheduler.active_count(), 3);
    }

    #[tokio::test]
    async fn policy_denial_rejects_even_with_free_slots() {
        let policy = SafetyPolicy::new("prod").with_rule(PolicyRule::new(
            "no-db",
            RuleCondition::ForbiddenTargets {
                targets: vec!["db".to_string()],
            },
        ));
        let scheduler = ExperimentScheduler::new(
            SchedulerConfig::default(),
            Arc::new(SafetyPolicyEngine::new(policy)),
        );

        let err = scheduler
            .admit(&experiment("db", Priority::High))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("denied by safety policy"));
        assert_eq!(scheduler.active_count(), 0);
    }

    #[tokio::test]
    async fn queue_mode_serves_higher_priority_first() {
        let scheduler = scheduler(1, AdmissionMode::Queue);
        let holder = scheduler
            .admit(&experiment("first", Priority::Medium))
            .await
            .unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut handles = Vec::new();
        for (name, priority) in [("low", Priority::Low), ("high", Priority::High)] {
            let task_scheduler = Arc::clone(&scheduler);
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                let permit = task_scheduler.admit(&experiment(name, priority)).await.unwrap();
                tx.send(name).unwrap();
                drop(permit);
            }));
            while scheduler.queued_count() < handles.len() {
                tokio::task::yield_now().await;
            }
        }

        drop(holder);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(rx.recv().await, Some("high"));
        assert_eq!(rx.recv().await, Some("low"));
        assert_eq!(scheduler.active_count(), 0);
    }

    #[tokio::test]
    async fn failed_recheck_hands_the_slot_to_the_next_waiter() {
        let business_hours = SafetyPolicy::new("prod").with_rule(PolicyRule::new(
            "business-hours",
            RuleCondition::TimeWindow {
                days: Vec::new(),
                start_hour: Some(9),
                end_hour: Some(17),
            },
        ));
        // fifth evaluation (the first waiter's re-check) happens after hours
        let calls = Arc::new(AtomicUsize::new(0));
        let clock = {
            let calls = Arc::clone(&calls);
            move || {
                let hour = if calls.fetch_add(1, AtomicOrdering::SeqCst) == 4 { 22 } else { 12 };
                Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
            }
        };
        let scheduler = Arc::new(
            ExperimentScheduler::new(
                SchedulerConfig {
                    max_concurrent_experiments: 1,
                    admission_mode: AdmissionMode::Queue,
                },
                Arc::new(SafetyPolicyEngine::new(business_hours)),
            )
            .with_clock(clock),
        );

        let holder = scheduler
            .admit(&experiment("first", Priority::Medium))
            .await
            .unwrap();

        let mut waiters = Vec::new();
        for (name, priority) in [("denied", Priority::High), ("next", Priority::Low)] {
            let task_scheduler = Arc::clone(&scheduler);
            waiters.push(tokio::spawn(async move {
                task_scheduler
                    .admit(&experiment(name, priority))
                    .await
                    .map(|_permit| ())
            }));
            while scheduler.queued_count() < waiters.len() {
                tokio::task::yield_now().await;
            }
        }

        drop(holder);
        let mut outcomes = Vec::new();
        for waiter in waiters {
            outcomes.push(
                tokio::time::timeout(Duration::from_secs(1), waiter)
                    .await
                    .expect("waiter stalled with a free slot")
                    .unwrap(),
            );
        }

        assert!(outcomes[0].as_ref().unwrap_err().to_string().contains("time window"));
        assert!(outcomes[1].is_ok());
        assert_eq!(scheduler.active_count(), 0);
        assert_eq!(scheduler.queued_count(), 0);
    }

    #[tokio::test]
    async fn abandoned_waiter_leaves_the_queue() {
        let scheduler = scheduler(1, AdmissionMode::Queue);
        let _holder = scheduler
            .admit(&experiment("first", Priority::Medium))
            .await
            .unwrap();

        let waiter = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move {
                let _permit = scheduler.admit(&experiment("second", Priority::High)).await;
            })
        };
        while scheduler.queued_count() == 0 {
            tokio::task::yield_now().await;
        }

        waiter.abort();
        let _ = waiter.await;
        assert_eq!(scheduler.queued_count(), 0);
    }

    #[test]
    fn tickets_order_by_priority_then_time() {
        let now = Utc::now();
        let early = Ticket {
            priority: Priority::Medium,
            scheduled_at: now,
            seq: 5,
        };
        let late = Ticket {
            priority: Priority::Medium,
            scheduled_at: now + chrono::Duration::seconds(5),
            seq: 1,
        };
        let urgent = Ticket {
            priority: Priority::High,
            scheduled_at: now + chrono::Duration::seconds(10),
            seq: 9,
        };
        let mut heap = BinaryHeap::from(vec![late.clone(), early.clone(), urgent.clone()]);
        assert_eq!(heap.pop(), Some(urgent));
        assert_eq!(heap.pop(), Some(early));
        assert_eq!(heap.pop(), Some(late));
    }
}
