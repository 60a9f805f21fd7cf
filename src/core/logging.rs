// src/core/logging.rs

/// Korrelations-Kontext für Log-Zeilen: Komponente, Instanz (meist die Kamera)
/// und optional die Sequenznummer des Events, das gerade bearbeitet wird.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub component: String,
    pub instance_id: String,
    pub event_seq: Option<u64>,
}

impl LogContext {
    pub fn new(component: &str, instance_id: &str) -> Self {
        Self {
            component: component.to_string(),
            instance_id: instance_id.to_string(),
            event_seq: None,
        }
    }

    pub fn with_event(mut self, seq: u64) -> Self {
        self.event_seq = Some(seq);
        self
    }

    pub fn format(&self, message: &str) -> String {
        match self.event_seq {
            Some(seq) => format!(
                "[{}:{}][seq={:06}] {}",
                self.component, self.instance_id, seq, message
            ),
            None => format!("[{}:{}] {}", self.component, self.instance_id, message),
        }
    }
}

// Helper Trait für einheitliches Logging
pub trait ComponentLogger {
    fn log_context(&self) -> LogContext;

    fn debug(&self, message: &str) {
        log::debug!("{}", self.log_context().format(message));
    }

    fn info(&self, message: &str) {
        log::info!("{}", self.log_context().format(message));
    }

    fn warn(&self, message: &str) {
        log::warn!("{}", self.log_context().format(message));
    }

    fn error(&self, message: &str) {
        log::error!("{}", self.log_context().format(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_context_creation() {
        let ctx = LogContext::new("recorder", "RGB_Camera");

        assert_eq!(ctx.component, "recorder");
        assert_eq!(ctx.instance_id, "RGB_Camera");
        assert!(ctx.event_seq.is_none());
    }

    #[test]
    fn test_log_formatting() {
        let ctx = LogContext::new("extract", "cam0");
        let formatted = ctx.format("starting");
        assert_eq!(formatted, "[extract:cam0] starting");

        let with_event = ctx.with_event(42).format("done");
        assert!(with_event.contains("[seq=000042]"));
        assert!(with_event.ends_with("done"));
    }

    #[test]
    fn test_component_logger_trait() {
        struct MockComponent {
            id: String,
        }

        impl ComponentLogger for MockComponent {
            fn log_context(&self) -> LogContext {
                LogContext::new("mock", &self.id)
            }
        }

        let component = MockComponent {
            id: "test_001".to_string(),
        };
        let ctx = component.log_context();

        assert_eq!(ctx.component, "mock");
        assert_eq!(ctx.instance_id, "test_001");
        component.info("smoke");
    }
}
