//! In-process queue honoring the full broker contract.
//!
//! Backs tests and single-node deployments. Per-session FIFO, visibility
//! locks with expiry-driven redelivery, scheduled delivery, duplicate
//! suppression, and dead-lettering all behave as the contract demands —
//! the ordering properties of the pipeline are exercised against this
//! implementation.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::QueueError;
use crate::message::QueueMessage;
use crate::topic::Topic;
use crate::traits::{
    DeadLetteredMessage, Delivery, QueueConsumer, QueueProducer, QueueStats, SessionLease,
    TopicDepths,
};

/// Tuning knobs. Production wiring uses the defaults; tests shorten the
/// lock duration to exercise expiry-driven redelivery quickly.
#[derive(Debug, Clone)]
pub struct MemoryQueueOptions {
    /// When set, overrides every topic's visibility-lock duration.
    pub lock_duration_override: Option<Duration>,
    /// FIFO duplicate-suppression window.
    pub dedup_window: Duration,
}

impl Default for MemoryQueueOptions {
    fn default() -> Self {
        Self {
            lock_duration_override: None,
            dedup_window: Duration::from_secs(600),
        }
    }
}

/// In-process broker.
#[derive(Clone)]
pub struct MemoryQueue {
    state: Arc<Mutex<State>>,
    options: MemoryQueueOptions,
}

struct Stored {
    message: QueueMessage,
    delivery_count: u32,
    /// Producer sequence, used to keep requeued messages in order.
    seq: u64,
}

struct LeaseState {
    lease_id: Uuid,
    expires_at: Instant,
}

#[derive(Default)]
struct SessionState {
    ready: VecDeque<Stored>,
    lease: Option<LeaseState>,
}

struct InFlight {
    stored: Stored,
    session: Option<String>,
    lock_expires: Instant,
}

#[derive(Default)]
struct TopicState {
    sessions: HashMap<String, SessionState>,
    ready: VecDeque<Stored>,
    scheduled: Vec<Stored>,
    in_flight: HashMap<Uuid, InFlight>,
    recent_ids: HashMap<Uuid, Instant>,
    /// Sequence numbers of recently settled messages, so a successor
    /// (`replaces`) can inherit its predecessor's session position.
    settled_seqs: HashMap<Uuid, (u64, Instant)>,
}

#[derive(Default)]
struct State {
    topics: HashMap<Topic, TopicState>,
    dead_letters: VecDeque<DeadLetteredMessage>,
    dead_letter_counts: HashMap<Topic, u64>,
    next_seq: u64,
}

impl MemoryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(MemoryQueueOptions::default())
    }

    #[must_use]
    pub fn with_options(options: MemoryQueueOptions) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            options,
        }
    }

    fn lock_duration(&self, topic: Topic) -> Duration {
        self.options
            .lock_duration_override
            .unwrap_or_else(|| topic.lock_duration())
    }

    /// Advance broker time: promote due scheduled messages, expire locks
    /// and leases, prune the dedup window. Called at the top of every
    /// consumer-facing operation.
    fn tick(&self, state: &mut State) {
        let now = Instant::now();
        let wall = Utc::now();

        for (&topic, ts) in &mut state.topics {
            // Promote scheduled messages whose time has come.
            let mut due = Vec::new();
            let mut i = 0;
            while i < ts.scheduled.len() {
                let ready = ts.scheduled[i]
                    .message
                    .scheduled_for
                    .map_or(true, |at| at <= wall);
                if ready {
                    due.push(ts.scheduled.remove(i));
                } else {
                    i += 1;
                }
            }
            for stored in due {
                enqueue_ready(ts, topic, stored);
            }

            // Expire visibility locks: redeliver or dead-letter.
            let expired: Vec<Uuid> = ts
                .in_flight
                .iter()
                .filter(|(_, f)| f.lock_expires <= now)
                .map(|(&receipt, _)| receipt)
                .collect();
            let mut redeliver = Vec::new();
            for receipt in expired {
                if let Some(flight) = ts.in_flight.remove(&receipt) {
                    redeliver.push(flight);
                }
            }
            // Requeue in reverse sequence order so older messages land at
            // the front first.
            redeliver.sort_by_key(|f| std::cmp::Reverse(f.stored.seq));
            for flight in redeliver {
                if flight.stored.delivery_count >= topic.max_delivery_count() {
                    tracing::warn!(
                        topic = %topic,
                        message_id = %flight.stored.message.id,
                        delivery_count = flight.stored.delivery_count,
                        "Lock expired at delivery limit, dead-lettering"
                    );
                    state.dead_letters.push_back(DeadLetteredMessage {
                        message: flight.stored.message,
                        source_topic: topic,
                        reason: "delivery count exceeded".to_string(),
                        dead_lettered_at: Utc::now(),
                    });
                    *state.dead_letter_counts.entry(topic).or_default() += 1;
                } else {
                    enqueue_ready(ts, topic, flight.stored);
                }
            }

            // Expire session leases.
            for session in ts.sessions.values_mut() {
                if session
                    .lease
                    .as_ref()
                    .is_some_and(|l| l.expires_at <= now)
                {
                    session.lease = None;
                }
            }

            // Prune the dedup and successor windows.
            let window = self.options.dedup_window;
            ts.recent_ids.retain(|_, seen| now - *seen < window);
            ts.settled_seqs.retain(|_, (_, seen)| now - *seen < window);
        }
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowest sequence number among a session's scheduled (not yet due)
/// messages. Delivery must not proceed past this position: a scheduled
/// retry holds its place in the session.
fn min_scheduled_seq(ts: &TopicState, session: &str) -> Option<u64> {
    ts.scheduled
        .iter()
        .filter(|s| s.message.session.as_deref() == Some(session))
        .map(|s| s.seq)
        .min()
}

/// Put a stored message onto the right ready queue, preserving producer
/// sequence order.
fn enqueue_ready(ts: &mut TopicState, topic: Topic, stored: Stored) {
    let queue = if topic.is_fifo() {
        let session = stored
            .message
            .session
            .clone()
            .unwrap_or_default();
        &mut ts.sessions.entry(session).or_default().ready
    } else {
        &mut ts.ready
    };

    let pos = queue
        .iter()
        .position(|s| s.seq > stored.seq)
        .unwrap_or(queue.len());
    queue.insert(pos, stored);
}

#[async_trait]
impl QueueProducer for MemoryQueue {
    async fn send(&self, topic: Topic, message: QueueMessage) -> Result<(), QueueError> {
        message.validate_for(topic)?;

        let mut state = self.state.lock().await;
        let fresh_seq = state.next_seq;
        state.next_seq += 1;

        let ts = state.topics.entry(topic).or_default();

        if topic.is_fifo() {
            let now = Instant::now();
            if ts.recent_ids.contains_key(&message.id) {
                tracing::debug!(
                    topic = %topic,
                    message_id = %message.id,
                    "Duplicate message id suppressed"
                );
                return Ok(());
            }
            ts.recent_ids.insert(message.id, now);
        }

        // A successor takes its predecessor's position so that later
        // session messages cannot overtake a scheduled retry.
        let seq = message
            .replaces
            .and_then(|orig| {
                ts.in_flight
                    .values()
                    .find(|f| f.stored.message.id == orig)
                    .map(|f| f.stored.seq)
                    .or_else(|| ts.settled_seqs.get(&orig).map(|(seq, _)| *seq))
            })
            .unwrap_or(fresh_seq);

        let stored = Stored {
            delivery_count: 0,
            seq,
            message,
        };

        let pending = stored
            .message
            .scheduled_for
            .is_some_and(|at| at > Utc::now());
        if pending {
            ts.scheduled.push(stored);
        } else {
            enqueue_ready(ts, topic, stored);
        }

        Ok(())
    }

    async fn send_batch(
        &self,
        topic: Topic,
        messages: Vec<QueueMessage>,
    ) -> Result<(), QueueError> {
        for message in messages {
            self.send(topic, message).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl QueueConsumer for MemoryQueue {
    async fn lease_session(&self, topic: Topic) -> Result<Option<SessionLease>, QueueError> {
        let mut state = self.state.lock().await;
        self.tick(&mut state);

        let lock = self.lock_duration(topic);
        let ts = state.topics.entry(topic).or_default();

        let blocked: Vec<String> = ts
            .sessions
            .iter()
            .filter(|(name, s)| {
                let head = s.ready.front().map_or(u64::MAX, |m| m.seq);
                min_scheduled_seq(ts, name).is_some_and(|scheduled| scheduled < head)
            })
            .map(|(name, _)| String::clone(name))
            .collect();

        let candidate = ts
            .sessions
            .iter_mut()
            .filter(|(name, s)| {
                s.lease.is_none() && !s.ready.is_empty() && !blocked.contains(*name)
            })
            .min_by_key(|(_, s)| s.ready.front().map_or(u64::MAX, |m| m.seq));

        let Some((name, session)) = candidate else {
            return Ok(None);
        };

        let lease_id = Uuid::new_v4();
        session.lease = Some(LeaseState {
            lease_id,
            expires_at: Instant::now() + lock,
        });

        Ok(Some(SessionLease {
            topic,
            session: name.clone(),
            lease_id,
        }))
    }

    async fn receive(
        &self,
        lease: &SessionLease,
        max: usize,
    ) -> Result<Vec<Delivery>, QueueError> {
        let mut state = self.state.lock().await;
        self.tick(&mut state);

        let lock = self.lock_duration(lease.topic);
        let ts = state.topics.entry(lease.topic).or_default();

        let scheduled_floor = min_scheduled_seq(ts, &lease.session);
        let mut popped = Vec::new();
        {
            let session = ts
                .sessions
                .get_mut(&lease.session)
                .ok_or_else(|| QueueError::LeaseLost {
                    session: lease.session.clone(),
                })?;
            let held = session
                .lease
                .as_ref()
                .is_some_and(|l| l.lease_id == lease.lease_id);
            if !held {
                return Err(QueueError::LeaseLost {
                    session: lease.session.clone(),
                });
            }

            for _ in 0..max {
                // Never deliver past a scheduled (waiting) predecessor.
                let past_floor = session.ready.front().is_some_and(|head| {
                    scheduled_floor.is_some_and(|floor| head.seq > floor)
                });
                if past_floor {
                    break;
                }
                let Some(mut stored) = session.ready.pop_front() else {
                    break;
                };
                stored.delivery_count += 1;
                popped.push(stored);
            }
        }

        let mut deliveries = Vec::new();
        for stored in popped {
            let receipt = Uuid::new_v4();
            deliveries.push(Delivery {
                message: stored.message.clone(),
                topic: lease.topic,
                delivery_count: stored.delivery_count,
                receipt,
            });
            ts.in_flight.insert(
                receipt,
                InFlight {
                    stored,
                    session: Some(lease.session.clone()),
                    lock_expires: Instant::now() + lock,
                },
            );
        }

        Ok(deliveries)
    }

    async fn receive_any(&self, topic: Topic, max: usize) -> Result<Vec<Delivery>, QueueError> {
        let mut state = self.state.lock().await;
        self.tick(&mut state);

        let lock = self.lock_duration(topic);
        let ts = state.topics.entry(topic).or_default();

        let mut deliveries = Vec::new();
        for _ in 0..max {
            let Some(mut stored) = ts.ready.pop_front() else {
                break;
            };
            stored.delivery_count += 1;
            let receipt = Uuid::new_v4();
            let delivery = Delivery {
                message: stored.message.clone(),
                topic,
                delivery_count: stored.delivery_count,
                receipt,
            };
            ts.in_flight.insert(
                receipt,
                InFlight {
                    stored,
                    session: None,
                    lock_expires: Instant::now() + lock,
                },
            );
            deliveries.push(delivery);
        }

        Ok(deliveries)
    }

    async fn complete(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let ts = state.topics.entry(delivery.topic).or_default();
        let flight = ts
            .in_flight
            .remove(&delivery.receipt)
            .ok_or(QueueError::UnknownReceipt(delivery.receipt))?;
        ts.settled_seqs
            .insert(flight.stored.message.id, (flight.stored.seq, Instant::now()));
        Ok(())
    }

    async fn abandon(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let topic = delivery.topic;

        let flight = {
            let ts = state.topics.entry(topic).or_default();
            ts.in_flight
                .remove(&delivery.receipt)
                .ok_or(QueueError::UnknownReceipt(delivery.receipt))?
        };

        if flight.stored.delivery_count >= topic.max_delivery_count() {
            tracing::warn!(
                topic = %topic,
                message_id = %flight.stored.message.id,
                delivery_count = flight.stored.delivery_count,
                "Abandoned at delivery limit, dead-lettering"
            );
            state.dead_letters.push_back(DeadLetteredMessage {
                message: flight.stored.message,
                source_topic: topic,
                reason: "delivery count exceeded".to_string(),
                dead_lettered_at: Utc::now(),
            });
            *state.dead_letter_counts.entry(topic).or_default() += 1;
        } else {
            let ts = state.topics.entry(topic).or_default();
            enqueue_ready(ts, topic, flight.stored);
        }

        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let topic = delivery.topic;

        let flight = {
            let ts = state.topics.entry(topic).or_default();
            ts.in_flight
                .remove(&delivery.receipt)
                .ok_or(QueueError::UnknownReceipt(delivery.receipt))?
        };

        tracing::warn!(
            topic = %topic,
            message_id = %flight.stored.message.id,
            reason = %reason,
            "Dead-lettering message"
        );
        state.dead_letters.push_back(DeadLetteredMessage {
            message: flight.stored.message,
            source_topic: topic,
            reason: reason.to_string(),
            dead_lettered_at: Utc::now(),
        });
        *state.dead_letter_counts.entry(topic).or_default() += 1;

        Ok(())
    }

    async fn renew(&self, lease: &SessionLease) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        self.tick(&mut state);

        let lock = self.lock_duration(lease.topic);
        let ts = state.topics.entry(lease.topic).or_default();

        let session = ts
            .sessions
            .get_mut(&lease.session)
            .ok_or_else(|| QueueError::LeaseLost {
                session: lease.session.clone(),
            })?;
        match session.lease.as_mut() {
            Some(l) if l.lease_id == lease.lease_id => {
                l.expires_at = Instant::now() + lock;
            }
            _ => {
                return Err(QueueError::LeaseLost {
                    session: lease.session.clone(),
                });
            }
        }

        for flight in ts.in_flight.values_mut() {
            if flight.session.as_deref() == Some(lease.session.as_str()) {
                flight.lock_expires = Instant::now() + lock;
            }
        }

        Ok(())
    }

    async fn release(&self, lease: SessionLease) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let ts = state.topics.entry(lease.topic).or_default();

        if let Some(session) = ts.sessions.get_mut(&lease.session) {
            let held = session
                .lease
                .as_ref()
                .is_some_and(|l| l.lease_id == lease.lease_id);
            if held {
                session.lease = None;
            }
        }

        Ok(())
    }

    async fn drain_dead_letters(
        &self,
        max: usize,
    ) -> Result<Vec<DeadLetteredMessage>, QueueError> {
        let mut state = self.state.lock().await;
        let mut drained = Vec::new();
        for _ in 0..max {
            match state.dead_letters.pop_front() {
                Some(entry) => drained.push(entry),
                None => break,
            }
        }
        Ok(drained)
    }
}

#[async_trait]
impl QueueStats for MemoryQueue {
    async fn depths(&self, topic: Topic) -> Result<TopicDepths, QueueError> {
        let mut state = self.state.lock().await;
        self.tick(&mut state);

        if topic == Topic::DeadLetter {
            return Ok(TopicDepths {
                active: state.dead_letters.len() as u64,
                scheduled: 0,
                dead_letter: 0,
            });
        }

        let dead_letter = state.dead_letter_counts.get(&topic).copied().unwrap_or(0);
        let ts = state.topics.entry(topic).or_default();
        let ready: u64 = ts.ready.len() as u64
            + ts.sessions
                .values()
                .map(|s| s.ready.len() as u64)
                .sum::<u64>();

        Ok(TopicDepths {
            active: ready + ts.in_flight.len() as u64,
            scheduled: ts.scheduled.len() as u64,
            dead_letter,
        })
    }

    async fn ping(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(session: &str, n: u64) -> QueueMessage {
        QueueMessage::demographics(
            session.to_string(),
            json!({ "n": n }),
            Uuid::new_v4(),
        )
    }

    #[tokio::test]
    async fn delivers_in_producer_order_within_session() {
        let q = MemoryQueue::new();
        for n in 0..5 {
            q.send(Topic::DemographicsFifo, msg("demographics_a", n))
                .await
                .unwrap();
        }

        let lease = q
            .lease_session(Topic::DemographicsFifo)
            .await
            .unwrap()
            .expect("session should be leasable");
        let deliveries = q.receive(&lease, 10).await.unwrap();
        let ns: Vec<u64> = deliveries
            .iter()
            .map(|d| d.message.payload["n"].as_u64().unwrap())
            .collect();
        assert_eq!(ns, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn one_lease_per_session() {
        let q = MemoryQueue::new();
        q.send(Topic::DemographicsFifo, msg("demographics_a", 0))
            .await
            .unwrap();

        let first = q.lease_session(Topic::DemographicsFifo).await.unwrap();
        assert!(first.is_some());
        // The only session is held, so a second consumer gets nothing.
        let second = q.lease_session(Topic::DemographicsFifo).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn sessions_lease_independently() {
        let q = MemoryQueue::new();
        q.send(Topic::DemographicsFifo, msg("demographics_a", 0))
            .await
            .unwrap();
        q.send(Topic::DemographicsFifo, msg("demographics_b", 0))
            .await
            .unwrap();

        let first = q
            .lease_session(Topic::DemographicsFifo)
            .await
            .unwrap()
            .unwrap();
        let second = q
            .lease_session(Topic::DemographicsFifo)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(first.session, second.session);
    }

    #[tokio::test]
    async fn duplicate_message_ids_are_suppressed() {
        let q = MemoryQueue::new();
        let m = msg("demographics_a", 0);
        let dup = m.clone();

        q.send(Topic::DemographicsFifo, m).await.unwrap();
        q.send(Topic::DemographicsFifo, dup).await.unwrap();

        let depths = q.depths(Topic::DemographicsFifo).await.unwrap();
        assert_eq!(depths.active, 1);
    }

    #[tokio::test]
    async fn scheduled_messages_are_withheld() {
        let q = MemoryQueue::new();
        let mut m = msg("demographics_a", 0);
        m.scheduled_for = Some(Utc::now() + chrono::Duration::milliseconds(80));
        q.send(Topic::DemographicsFifo, m).await.unwrap();

        assert!(q
            .lease_session(Topic::DemographicsFifo)
            .await
            .unwrap()
            .is_none());
        let depths = q.depths(Topic::DemographicsFifo).await.unwrap();
        assert_eq!(depths.scheduled, 1);

        tokio::time::sleep(Duration::from_millis(120)).await;
        let lease = q.lease_session(Topic::DemographicsFifo).await.unwrap();
        assert!(lease.is_some());
    }

    #[tokio::test]
    async fn abandon_requeues_at_the_front() {
        let q = MemoryQueue::new();
        q.send(Topic::DemographicsFifo, msg("demographics_a", 0))
            .await
            .unwrap();
        q.send(Topic::DemographicsFifo, msg("demographics_a", 1))
            .await
            .unwrap();

        let lease = q
            .lease_session(Topic::DemographicsFifo)
            .await
            .unwrap()
            .unwrap();
        let first = q.receive(&lease, 1).await.unwrap().remove(0);
        assert_eq!(first.message.payload["n"], 0);
        q.abandon(&first).await.unwrap();

        let redelivered = q.receive(&lease, 2).await.unwrap();
        assert_eq!(redelivered[0].message.payload["n"], 0);
        assert_eq!(redelivered[0].delivery_count, 2);
        assert_eq!(redelivered[1].message.payload["n"], 1);
    }

    #[tokio::test]
    async fn abandon_at_limit_dead_letters() {
        let q = MemoryQueue::new();
        q.send(Topic::DemographicsFifo, msg("demographics_a", 0))
            .await
            .unwrap();

        for attempt in 1..=Topic::DemographicsFifo.max_delivery_count() {
            let lease = q
                .lease_session(Topic::DemographicsFifo)
                .await
                .unwrap()
                .unwrap();
            let delivery = q.receive(&lease, 1).await.unwrap().remove(0);
            assert_eq!(delivery.delivery_count, attempt);
            q.abandon(&delivery).await.unwrap();
            q.release(lease).await.unwrap();
        }

        // Third abandon hit the limit; nothing left to lease.
        assert!(q
            .lease_session(Topic::DemographicsFifo)
            .await
            .unwrap()
            .is_none());
        let dead = q.drain_dead_letters(10).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].source_topic, Topic::DemographicsFifo);
        assert_eq!(dead[0].reason, "delivery count exceeded");
    }

    #[tokio::test]
    async fn lock_expiry_redelivers() {
        let q = MemoryQueue::with_options(MemoryQueueOptions {
            lock_duration_override: Some(Duration::from_millis(40)),
            ..MemoryQueueOptions::default()
        });
        q.send(Topic::DemographicsFifo, msg("demographics_a", 0))
            .await
            .unwrap();

        let lease = q
            .lease_session(Topic::DemographicsFifo)
            .await
            .unwrap()
            .unwrap();
        let delivery = q.receive(&lease, 1).await.unwrap().remove(0);
        assert_eq!(delivery.delivery_count, 1);

        tokio::time::sleep(Duration::from_millis(80)).await;

        // Lease and lock both expired: the session is leasable again and
        // the message comes back with an incremented delivery count.
        let lease2 = q
            .lease_session(Topic::DemographicsFifo)
            .await
            .unwrap()
            .unwrap();
        let redelivered = q.receive(&lease2, 1).await.unwrap().remove(0);
        assert_eq!(redelivered.message.id, delivery.message.id);
        assert_eq!(redelivered.delivery_count, 2);

        // The stale receipt can no longer complete.
        assert!(matches!(
            q.complete(&delivery).await,
            Err(QueueError::UnknownReceipt(_))
        ));
    }

    #[tokio::test]
    async fn renew_extends_an_active_lease() {
        let q = MemoryQueue::with_options(MemoryQueueOptions {
            lock_duration_override: Some(Duration::from_millis(60)),
            ..MemoryQueueOptions::default()
        });
        q.send(Topic::DemographicsFifo, msg("demographics_a", 0))
            .await
            .unwrap();

        let lease = q
            .lease_session(Topic::DemographicsFifo)
            .await
            .unwrap()
            .unwrap();
        let delivery = q.receive(&lease, 1).await.unwrap().remove(0);

        tokio::time::sleep(Duration::from_millis(40)).await;
        q.renew(&lease).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        // Renewal kept the lock alive across the original expiry.
        q.complete(&delivery).await.unwrap();
        q.release(lease).await.unwrap();
    }

    #[tokio::test]
    async fn non_fifo_topic_receives_without_lease() {
        let q = MemoryQueue::new();
        let m = QueueMessage::document_processing(json!({"doc": 1}), Uuid::new_v4());
        q.send(Topic::Documents, m).await.unwrap();

        let deliveries = q.receive_any(Topic::Documents, 5).await.unwrap();
        assert_eq!(deliveries.len(), 1);
        q.complete(&deliveries[0]).await.unwrap();

        let depths = q.depths(Topic::Documents).await.unwrap();
        assert_eq!(depths.active, 0);
    }

    #[tokio::test]
    async fn scheduled_successor_is_not_overtaken() {
        let q = MemoryQueue::new();
        let first = QueueMessage::webhook(
            "webhook_a".to_string(),
            json!({ "n": 0 }),
            Uuid::new_v4(),
        );
        let second = QueueMessage::webhook(
            "webhook_a".to_string(),
            json!({ "n": 1 }),
            Uuid::new_v4(),
        );
        q.send(Topic::WebhooksFifo, first.clone()).await.unwrap();
        q.send(Topic::WebhooksFifo, second).await.unwrap();

        // Deliver the first, fail it, schedule its successor, complete.
        let lease = q.lease_session(Topic::WebhooksFifo).await.unwrap().unwrap();
        let delivery = q.receive(&lease, 1).await.unwrap().remove(0);
        let successor = delivery
            .message
            .retry_successor(Utc::now() + chrono::Duration::milliseconds(80));
        q.send(Topic::WebhooksFifo, successor).await.unwrap();
        q.complete(&delivery).await.unwrap();
        q.release(lease).await.unwrap();

        // The second message may not be delivered while the retry waits.
        assert!(q.lease_session(Topic::WebhooksFifo).await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(120)).await;
        let lease = q.lease_session(Topic::WebhooksFifo).await.unwrap().unwrap();
        let deliveries = q.receive(&lease, 5).await.unwrap();
        assert_eq!(deliveries.len(), 2);
        assert_eq!(deliveries[0].message.payload["n"], 0);
        assert_eq!(deliveries[0].message.retry_count, 1);
        assert_eq!(deliveries[1].message.payload["n"], 1);
    }

    #[tokio::test]
    async fn dead_letter_records_reason() {
        let q = MemoryQueue::new();
        q.send(Topic::DemographicsFifo, msg("demographics_a", 0))
            .await
            .unwrap();

        let lease = q
            .lease_session(Topic::DemographicsFifo)
            .await
            .unwrap()
            .unwrap();
        let delivery = q.receive(&lease, 1).await.unwrap().remove(0);
        q.dead_letter(&delivery, "malformed").await.unwrap();

        let dead = q.drain_dead_letters(10).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].reason, "malformed");
        let depths = q.depths(Topic::DemographicsFifo).await.unwrap();
        assert_eq!(depths.dead_letter, 1);
        assert_eq!(depths.active, 0);
    }
}
