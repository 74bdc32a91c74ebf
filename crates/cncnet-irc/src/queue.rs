//! Prioritised, throttled outbound command queue.
//!
//! Servers disconnect clients that send too fast, so every outbound command
//! except [`QueuedMessageType::Instant`] goes through a [`MessageQueue`]. A
//! single drain loop sends one command, then sleeps a fixed interval.
//!
//! Selection order: among entries whose delay has elapsed, highest priority
//! first, ties broken by insertion sequence. "Replace" categories keep only
//! the latest entry: enqueueing a second game broadcast overwrites the first
//! instead of queueing both.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Notify, watch};

/// Category of an outbound command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueuedMessageType {
    /// Chat text typed by the user.
    Chat,
    /// Protocol housekeeping (JOIN, PART, WHO, NICK, MODE).
    System,
    /// Written straight to the socket, never queued.
    Instant,
    /// Game advertisement to the lobby channel.
    GameBroadcast,
    /// Player list and options of a game room.
    GamePlayers,
    /// Game settings of a game room.
    GameSettings,
    /// Ready status of the players in a game room.
    GamePlayersReadyStatus,
    /// "Get ready" / "not all present" notices.
    GameGetReady,
    /// Other in-room notifications (file hashes, tunnel changes, start).
    GameNotification,
    /// Hosting and channel-setup commands.
    GameHosting,
}

impl QueuedMessageType {
    /// Whether entries of this type replace an already queued entry.
    pub fn replaces_by_default(self) -> bool {
        matches!(
            self,
            Self::GameBroadcast
                | Self::GamePlayers
                | Self::GameSettings
                | Self::GamePlayersReadyStatus
        )
    }
}

/// One outbound protocol command awaiting transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    /// Raw command line without CR/LF.
    pub command: String,
    /// Category used for replacement.
    pub message_type: QueuedMessageType,
    /// Higher values are sent first.
    pub priority: i32,
    /// Earliest send time relative to enqueueing.
    pub delay: Duration,
    /// Absolute earliest send time, set when enqueued with a delay.
    pub send_at: Option<Instant>,
    /// Overwrite a queued entry of the same type instead of appending.
    pub replace: bool,
    /// Insertion order, assigned by the queue.
    pub sequence: u64,
}

impl QueuedMessage {
    /// Create a message with no delay. `replace` follows the type's default.
    pub fn new(command: impl Into<String>, message_type: QueuedMessageType, priority: i32) -> Self {
        Self {
            command: sanitize(command.into()),
            message_type,
            priority,
            delay: Duration::ZERO,
            send_at: None,
            replace: message_type.replaces_by_default(),
            sequence: 0,
        }
    }

    /// Hold the message back for `delay` after enqueueing.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set whether this message replaces a queued entry of the same type.
    #[must_use]
    pub fn with_replace(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }

    /// Whether the message may be sent at `now`.
    pub fn is_ready(&self, now: Instant) -> bool {
        self.send_at.is_none_or(|at| at <= now)
    }
}

/// CR and LF would split one command into two on the wire.
fn sanitize(command: String) -> String {
    if command.contains(['\r', '\n']) {
        command.replace(['\r', '\n'], " ")
    } else {
        command
    }
}

/// Thread-safe outbound queue with a single consumer.
pub struct MessageQueue {
    /// Kept sorted by priority (descending), then sequence (ascending).
    entries: Mutex<Vec<QueuedMessage>>,
    next_sequence: AtomicU64,
    notify: Notify,
    exited: AtomicBool,
}

impl MessageQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_sequence: AtomicU64::new(1),
            notify: Notify::new(),
            exited: AtomicBool::new(false),
        }
    }

    /// Queue `message`, honouring its delay and replace flag.
    pub fn enqueue(&self, mut message: QueuedMessage) {
        message.sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        if !message.delay.is_zero() {
            message.send_at = Some(Instant::now() + message.delay);
        }

        {
            let mut entries = self.lock();
            if message.replace
                && let Some(existing) = entries
                    .iter_mut()
                    .find(|e| e.message_type == message.message_type)
            {
                existing.command = message.command;
                existing.send_at = message.send_at;
                existing.delay = message.delay;
                existing.priority = message.priority;
                Self::resort(&mut entries);
            } else {
                let position = entries
                    .iter()
                    .position(|e| e.priority < message.priority)
                    .unwrap_or(entries.len());
                entries.insert(position, message);
            }
        }

        self.notify.notify_one();
    }

    /// Queue `message` to be sent no earlier than `delay` from now.
    pub fn enqueue_delayed(&self, message: QueuedMessage, delay: Duration) {
        self.enqueue(message.with_delay(delay));
    }

    /// Queue `message`, overwriting any queued entry of the same type.
    pub fn enqueue_replacing(&self, message: QueuedMessage) {
        self.enqueue(message.with_replace(true));
    }

    /// Remove and return the highest-priority entry that is ready at `now`.
    pub fn take_next(&self, now: Instant) -> Option<QueuedMessage> {
        let mut entries = self.lock();
        let index = entries.iter().position(|e| e.is_ready(now))?;
        Some(entries.remove(index))
    }

    /// Earliest `send_at` among entries that are not ready yet.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.lock().iter().filter_map(|e| e.send_at).min()
    }

    /// Drop every queued entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of queued entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether the last drain loop has finished and cleared the queue.
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    /// Send queued commands to `writer` until `shutdown` turns `true`.
    ///
    /// One command per `interval`. On shutdown the queue is cleared before
    /// [`has_exited`](Self::has_exited) reports `true`.
    pub async fn drain_loop<W>(
        &self,
        writer: &tokio::sync::Mutex<W>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) where
        W: AsyncWrite + Unpin + Send,
    {
        self.exited.store(false, Ordering::Release);

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.take_next(Instant::now()) {
                Some(message) => {
                    let line = format!("{}\r\n", message.command);
                    let result = {
                        let mut w = writer.lock().await;
                        match w.write_all(line.as_bytes()).await {
                            Ok(()) => w.flush().await,
                            Err(e) => Err(e),
                        }
                    };
                    match result {
                        Ok(()) => tracing::trace!("Sent {:?}", message.command),
                        Err(e) => tracing::warn!("Failed to send {:?}: {e}", message.command),
                    }

                    tokio::select! {
                        () = tokio::time::sleep(interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                None => {
                    let deadline = self.next_deadline();
                    tokio::select! {
                        () = self.notify.notified() => {}
                        () = sleep_until_deadline(deadline) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }

        self.clear();
        self.exited.store(true, Ordering::Release);
        tracing::debug!("Send queue loop exited");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<QueuedMessage>> {
        self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn resort(entries: &mut [QueuedMessage]) {
        entries.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.sequence.cmp(&b.sequence)));
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, duplex};

    fn msg(command: &str, priority: i32) -> QueuedMessage {
        QueuedMessage::new(command, QueuedMessageType::Chat, priority)
    }

    fn drain_now(queue: &MessageQueue, now: Instant) -> Vec<String> {
        std::iter::from_fn(|| queue.take_next(now))
            .map(|m| m.command)
            .collect()
    }

    #[test]
    fn test_priority_order_with_insertion_ties() {
        let queue = MessageQueue::new();
        queue.enqueue(msg("low-1", 1));
        queue.enqueue(msg("high", 10));
        queue.enqueue(msg("low-2", 1));
        queue.enqueue(msg("mid", 5));

        assert_eq!(
            drain_now(&queue, Instant::now()),
            vec!["high", "mid", "low-1", "low-2"]
        );
    }

    #[test]
    fn test_delayed_message_held_until_send_at() {
        let queue = MessageQueue::new();
        queue.enqueue_delayed(msg("later", 100), Duration::from_secs(5));
        queue.enqueue(msg("now", 0));

        let start = Instant::now();
        assert_eq!(drain_now(&queue, start), vec!["now"]);
        assert_eq!(queue.len(), 1);

        let send_at = queue.next_deadline().unwrap();
        assert!(send_at >= start + Duration::from_secs(4));
        assert!(queue.take_next(send_at - Duration::from_millis(1)).is_none());
        assert_eq!(queue.take_next(send_at).unwrap().command, "later");
    }

    #[test]
    fn test_ready_entries_sent_in_non_increasing_priority() {
        let queue = MessageQueue::new();
        for (i, p) in [3, 9, 1, 9, 4, 0, 7].iter().enumerate() {
            queue.enqueue(msg(&format!("m{i}"), *p));
        }
        let now = Instant::now();
        let priorities: Vec<i32> = std::iter::from_fn(|| queue.take_next(now))
            .map(|m| m.priority)
            .collect();
        assert!(priorities.windows(2).all(|w| w[0] >= w[1]), "{priorities:?}");
        assert_eq!(priorities.len(), 7);
    }

    #[test]
    fn test_replace_keeps_length_and_latest_payload() {
        let queue = MessageQueue::new();
        queue.enqueue(msg("chat", 0));
        queue.enqueue_replacing(QueuedMessage::new(
            "NOTICE #g :\u{1}OP 0;A:0\u{1}",
            QueuedMessageType::GamePlayers,
            10,
        ));
        assert_eq!(queue.len(), 2);

        queue.enqueue_replacing(QueuedMessage::new(
            "NOTICE #g :\u{1}OP 1;A:1\u{1}",
            QueuedMessageType::GamePlayers,
            10,
        ));
        assert_eq!(queue.len(), 2);

        let sent = drain_now(&queue, Instant::now());
        assert_eq!(sent, vec!["NOTICE #g :\u{1}OP 1;A:1\u{1}", "chat"]);
    }

    #[test]
    fn test_replace_category_defaults() {
        let broadcast = QueuedMessage::new("x", QueuedMessageType::GameBroadcast, 0);
        assert!(broadcast.replace);
        let chat = QueuedMessage::new("x", QueuedMessageType::Chat, 0);
        assert!(!chat.replace);

        let queue = MessageQueue::new();
        queue.enqueue(msg("a", 0));
        queue.enqueue(msg("b", 0));
        assert_eq!(queue.len(), 2, "chat messages never replace each other");
    }

    #[test]
    fn test_replace_without_existing_entry_inserts_by_priority() {
        let queue = MessageQueue::new();
        queue.enqueue(msg("low", 1));
        queue.enqueue_replacing(QueuedMessage::new(
            "ready",
            QueuedMessageType::GamePlayersReadyStatus,
            5,
        ));
        assert_eq!(drain_now(&queue, Instant::now()), vec!["ready", "low"]);
    }

    #[test]
    fn test_newlines_are_stripped() {
        let m = QueuedMessage::new("PRIVMSG #g :a\r\nQUIT", QueuedMessageType::Chat, 0);
        assert_eq!(m.command, "PRIVMSG #g :a  QUIT");
    }

    #[test]
    fn test_clear_empties_queue() {
        let queue = MessageQueue::new();
        queue.enqueue(msg("a", 0));
        queue.enqueue_delayed(msg("b", 0), Duration::from_secs(60));
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.next_deadline().is_none());
    }

    #[tokio::test]
    async fn test_drain_loop_writes_in_priority_order_and_clears_on_exit() {
        let (client, mut server) = duplex(4096);
        let writer = Arc::new(tokio::sync::Mutex::new(client));
        let queue = Arc::new(MessageQueue::new());
        queue.enqueue(msg("PRIVMSG #g :low", 0));
        queue.enqueue(msg("PRIVMSG #g :high", 10));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let loop_queue = Arc::clone(&queue);
        let loop_writer = Arc::clone(&writer);
        let handle = tokio::spawn(async move {
            loop_queue
                .drain_loop(&loop_writer, Duration::from_millis(10), shutdown_rx)
                .await;
        });

        let expected = "PRIVMSG #g :high\r\nPRIVMSG #g :low\r\n";
        let mut received = Vec::new();
        let mut buf = [0u8; 256];
        while received.len() < expected.len() {
            let n = server.read(&mut buf).await.unwrap();
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(String::from_utf8(received).unwrap(), expected);

        queue.enqueue_delayed(msg("never sent", 0), Duration::from_secs(60));
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert!(queue.has_exited());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_drain_loop_wakes_for_new_messages() {
        let (client, mut server) = duplex(4096);
        let writer = Arc::new(tokio::sync::Mutex::new(client));
        let queue = Arc::new(MessageQueue::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let loop_queue = Arc::clone(&queue);
        let loop_writer = Arc::clone(&writer);
        let handle = tokio::spawn(async move {
            loop_queue
                .drain_loop(&loop_writer, Duration::from_millis(1), shutdown_rx)
                .await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(msg("JOIN #g", 0));

        let mut buf = [0u8; 64];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"JOIN #g\r\n");

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
