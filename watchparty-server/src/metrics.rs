//! Metrics tracking for the coordinator server

use chrono::{DateTime, Local};
use std::collections::VecDeque;

/// Maximum number of log entries to keep
const MAX_LOG_ENTRIES: usize = 100;

/// A log entry for the dashboard
#[derive(Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Connection,
    Session,
    Control,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Connection => "CONN",
            LogLevel::Session => "SESS",
            LogLevel::Control => "CTRL",
        }
    }
}

#[derive(Clone)]
pub struct ParticipantInfo {
    pub participant_id: String,
    pub connected_at: DateTime<Local>,
    pub sessions: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ServerStatus {
    Starting,
    Running,
    Error,
}

/// Server metrics
pub struct Metrics {
    /// Server start time
    pub start_time: DateTime<Local>,

    /// Address we are listening on
    pub listen_addr: Option<String>,

    /// Join policy in effect, for display
    pub join_policy: String,

    /// Currently open connections
    pub active_connections: usize,

    /// Total connections since start
    pub total_connections: u64,

    /// Peak simultaneous connections
    pub peak_connections: usize,

    /// Sessions in the registry
    pub active_sessions: usize,

    /// Sessions created since start
    pub sessions_created: u64,

    /// Successful joins
    pub joins: u64,

    /// Rejected joins
    pub join_rejections: u64,

    /// Control events received
    pub controls_received: u64,

    /// Broadcast deliveries that failed
    pub delivery_failures: u64,

    /// Connected participants (for display)
    pub participant_list: Vec<ParticipantInfo>,

    /// Log entries
    pub logs: VecDeque<LogEntry>,

    /// Server status
    pub status: ServerStatus,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: Local::now(),
            listen_addr: None,
            join_policy: String::new(),
            active_connections: 0,
            total_connections: 0,
            peak_connections: 0,
            active_sessions: 0,
            sessions_created: 0,
            joins: 0,
            join_rejections: 0,
            controls_received: 0,
            delivery_failures: 0,
            participant_list: Vec::new(),
            logs: VecDeque::with_capacity(MAX_LOG_ENTRIES),
            status: ServerStatus::Starting,
        }
    }

    /// Add a log entry
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        if self.logs.len() >= MAX_LOG_ENTRIES {
            self.logs.pop_front();
        }
        self.logs.push_back(LogEntry {
            timestamp: Local::now(),
            level,
            message: message.into(),
        });
    }

    /// Record a new connection
    pub fn connection_established(&mut self, participant_id: &str) {
        if self
            .participant_list
            .iter()
            .any(|p| p.participant_id == participant_id)
        {
            return;
        }

        self.active_connections += 1;
        self.total_connections += 1;
        if self.active_connections > self.peak_connections {
            self.peak_connections = self.active_connections;
        }

        self.participant_list.push(ParticipantInfo {
            participant_id: participant_id.to_string(),
            connected_at: Local::now(),
            sessions: Vec::new(),
        });

        self.log(LogLevel::Connection, format!("Connected: {}", participant_id));
    }

    /// Record a disconnection and the sessions it was removed from
    pub fn connection_closed(&mut self, participant_id: &str, left: &[String]) {
        let before = self.participant_list.len();
        self.participant_list
            .retain(|p| p.participant_id != participant_id);
        if self.participant_list.len() == before {
            return;
        }

        self.active_connections = self.active_connections.saturating_sub(1);
        if left.is_empty() {
            self.log(LogLevel::Connection, format!("Disconnected: {}", participant_id));
        } else {
            self.log(
                LogLevel::Connection,
                format!("Disconnected: {} (left {})", participant_id, left.join(", ")),
            );
        }
    }

    pub fn session_created(&mut self, session_id: &str) {
        self.sessions_created += 1;
        self.active_sessions += 1;
        self.log(LogLevel::Session, format!("Created: {}", truncate_id(session_id)));
    }

    pub fn session_ended(&mut self, session_id: &str) {
        self.log(LogLevel::Session, format!("Ended: {}", truncate_id(session_id)));
    }

    pub fn join_accepted(&mut self, participant_id: &str, session_id: &str) {
        self.joins += 1;
        if let Some(p) = self
            .participant_list
            .iter_mut()
            .find(|p| p.participant_id == participant_id)
        {
            if !p.sessions.iter().any(|s| s == session_id) {
                p.sessions.push(session_id.to_string());
            }
        }
        self.log(
            LogLevel::Session,
            format!("{} joined {}", participant_id, truncate_id(session_id)),
        );
    }

    pub fn join_rejected(&mut self, participant_id: &str, session_id: &str, code: &str) {
        self.join_rejections += 1;
        self.log(
            LogLevel::Warning,
            format!(
                "{} rejected from {} ({})",
                participant_id,
                truncate_id(session_id),
                code
            ),
        );
    }

    pub fn participant_left(&mut self, participant_id: &str, session_id: &str) {
        if let Some(p) = self
            .participant_list
            .iter_mut()
            .find(|p| p.participant_id == participant_id)
        {
            p.sessions.retain(|s| s != session_id);
        }
        self.log(
            LogLevel::Session,
            format!("{} left {}", participant_id, truncate_id(session_id)),
        );
    }

    pub fn control_received(&mut self, participant_id: &str, session_id: &str, summary: &str) {
        self.controls_received += 1;
        self.log(
            LogLevel::Control,
            format!("{} {} in {}", participant_id, summary, truncate_id(session_id)),
        );
    }

    /// Refresh counters owned by the coordinator
    pub fn sync_from_coordinator(&mut self, sessions: usize, delivery_failures: u64) {
        self.active_sessions = sessions;
        self.delivery_failures = delivery_failures;
    }

    /// Get uptime as formatted string
    pub fn uptime(&self) -> String {
        let duration = Local::now().signed_duration_since(self.start_time);
        let secs = duration.num_seconds();

        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else {
            let hours = secs / 3600;
            let mins = (secs % 3600) / 60;
            format!("{}h {}m", hours, mins)
        }
    }
}

/// Truncate a session ID for display (show first and last few chars)
pub fn truncate_id(id: &str) -> String {
    let chars: Vec<char> = id.chars().collect();
    if chars.len() > 16 {
        let head: String = chars[..8].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        id.to_string()
    }
}
