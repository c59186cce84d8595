use std::collections::VecDeque;

use egui::Color32;

/// Lines kept in the on-screen log.
pub const LOG_CAPACITY: usize = 300;

// ── Phase ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Capturing { source: String },
    Error(String),
}

impl Phase {
    pub fn label(&self) -> &str {
        match self {
            Phase::Idle              => "Idle",
            Phase::Capturing { .. } => "Capturing",
            Phase::Error(_)          => "Error",
        }
    }

    pub fn color(&self) -> Color32 {
        match self {
            Phase::Idle              => Color32::from_rgb(160, 160, 160),
            Phase::Capturing { .. } => Color32::from_rgb(60, 200, 80),
            Phase::Error(_)          => Color32::from_rgb(220, 60, 60),
        }
    }
}

// ── LogBuffer ─────────────────────────────────────────────────────────────────

/// Ring buffer of UI log lines, oldest first.
#[derive(Debug, Default)]
pub struct LogBuffer {
    lines: VecDeque<String>,
}

impl LogBuffer {
    pub fn push(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::debug!("[GUI log] {}", line);
        if self.lines.len() >= LOG_CAPACITY {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn info(&mut self, line: impl std::fmt::Display) {
        self.push(format!("[INFO] {line}"));
    }

    pub fn warn(&mut self, line: impl std::fmt::Display) {
        self.push(format!("[WARN] {line}"));
    }

    pub fn error(&mut self, line: impl std::fmt::Display) {
        self.push(format!("[ERROR] {line}"));
    }

    pub fn lines(&self) -> impl Iterator<Item = &String> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_buffer_keeps_the_newest_lines() {
        let mut logs = LogBuffer::default();
        for i in 0..LOG_CAPACITY + 5 {
            logs.info(i);
        }
        assert_eq!(logs.len(), LOG_CAPACITY);
        assert_eq!(logs.lines().next().map(String::as_str), Some("[INFO] 5"));
        assert_eq!(
            logs.lines().last().map(String::as_str),
            Some(format!("[INFO] {}", LOG_CAPACITY + 4).as_str())
        );
    }

    #[test]
    fn phase_labels() {
        assert_eq!(Phase::default().label(), "Idle");
        let capturing = Phase::Capturing {
            source: "DISPLAY1".into(),
        };
        assert_eq!(capturing.label(), "Capturing");
        assert_ne!(capturing.color(), Phase::Error("x".into()).color());
    }
}
