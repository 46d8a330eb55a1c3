//! Broadcast Router
//!
//! Maps participants to their live connection's outbound channel and fans
//! messages out. A stale or closed connection is logged and skipped; it
//! never fails the operation that triggered the broadcast.

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::sync::{ParticipantId, ServerMessage};

use super::error::DeliveryFailure;

/// Outcome of a fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: Vec<DeliveryFailure>,
}

#[derive(Debug, Default)]
pub struct BroadcastRouter {
    peers: RwLock<HashMap<ParticipantId, mpsc::UnboundedSender<ServerMessage>>>,
}

impl BroadcastRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Returns the receiver its transport drains.
    pub fn register(&self, participant_id: &str) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.peers.write().insert(participant_id.to_string(), tx);
        debug!("Registered connection for {}", participant_id);
        rx
    }

    /// Drop a connection's channel; its receiver sees the end of the stream
    pub fn unregister(&self, participant_id: &str) -> bool {
        self.peers.write().remove(participant_id).is_some()
    }

    pub fn is_registered(&self, participant_id: &str) -> bool {
        self.peers.read().contains_key(participant_id)
    }

    pub fn connection_count(&self) -> usize {
        self.peers.read().len()
    }

    /// Queue a message for one participant
    pub fn send_to(&self, participant_id: &str, message: ServerMessage) -> Result<(), DeliveryFailure> {
        let failure = || DeliveryFailure {
            participant_id: participant_id.to_string(),
        };
        let peers = self.peers.read();
        let sender = peers.get(participant_id).ok_or_else(failure)?;
        sender.send(message).map_err(|_| failure())
    }

    /// Queue a message for every recipient except `exclude`
    pub fn broadcast(
        &self,
        recipients: &[ParticipantId],
        message: &ServerMessage,
        exclude: Option<&str>,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for participant_id in recipients {
            if exclude == Some(participant_id.as_str()) {
                continue;
            }
            match self.send_to(participant_id, message.clone()) {
                Ok(()) => report.delivered += 1,
                Err(failure) => {
                    warn!("{}, skipping", failure);
                    report.failed.push(failure);
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(who: &str) -> ServerMessage {
        ServerMessage::UserJoined {
            session_id: "s1".to_string(),
            participant_id: who.to_string(),
            participants: vec![who.to_string()],
        }
    }

    #[test]
    fn test_broadcast_excludes_sender() {
        let router = BroadcastRouter::new();
        let mut a = router.register("a");
        let mut b = router.register("b");
        let recipients = vec!["a".to_string(), "b".to_string()];

        let report = router.broadcast(&recipients, &joined("a"), Some("a"));

        assert_eq!(report.delivered, 1);
        assert!(a.try_recv().is_err());
        assert_eq!(b.try_recv().unwrap(), joined("a"));
    }

    #[test]
    fn test_broadcast_without_exclusion_reaches_everyone() {
        let router = BroadcastRouter::new();
        let mut a = router.register("a");
        let mut b = router.register("b");
        let recipients = vec!["a".to_string(), "b".to_string()];

        let report = router.broadcast(&recipients, &joined("a"), None);

        assert_eq!(report.delivered, 2);
        assert!(a.try_recv().is_ok());
        assert!(b.try_recv().is_ok());
    }

    #[test]
    fn test_stale_connection_is_skipped() {
        let router = BroadcastRouter::new();
        let dropped = router.register("gone");
        drop(dropped);
        let mut live = router.register("live");
        let recipients = vec!["gone".to_string(), "missing".to_string(), "live".to_string()];

        let report = router.broadcast(&recipients, &joined("x"), None);

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed.len(), 2);
        assert!(live.try_recv().is_ok());
    }

    #[test]
    fn test_unregister_closes_stream() {
        let router = BroadcastRouter::new();
        let mut rx = router.register("a");
        assert!(router.unregister("a"));
        assert!(!router.is_registered("a"));
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
