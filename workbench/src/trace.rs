//! Request tracing context handed to the generator.

use uuid::Uuid;

use crate::config::TraceConfig;
use crate::models::TraceMetadata;

/// Process-wide tracing settings.
#[derive(Debug, Clone, Default)]
pub struct TraceContext {
    enabled: bool,
    project: Option<String>,
}

impl TraceContext {
    pub fn new(config: &TraceConfig) -> Self {
        Self {
            enabled: config.is_active(),
            project: config.project.clone(),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// What responses report about tracing.
    pub fn metadata(&self) -> TraceMetadata {
        TraceMetadata {
            project: self.project.clone(),
            enabled: self.enabled,
        }
    }

    /// Fresh handles for one pipeline run, or `None` when tracing is off.
    pub fn handles(&self) -> Option<TraceHandles> {
        self.enabled.then(|| TraceHandles {
            run_id: Uuid::new_v4(),
            project: self.project.clone(),
        })
    }
}

/// Opaque per-run handles. The pipeline forwards them without inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceHandles {
    run_id: Uuid,
    project: Option<String>,
}

impl TraceHandles {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_context_yields_no_handles() {
        let trace = TraceContext::new(&TraceConfig {
            enabled: true,
            api_key: None,
            project: Some("rag".into()),
        });
        assert!(trace.handles().is_none());
        assert_eq!(
            trace.metadata(),
            TraceMetadata {
                project: Some("rag".into()),
                enabled: false
            }
        );
    }

    #[test]
    fn each_run_gets_its_own_id() {
        let trace = TraceContext::new(&TraceConfig {
            enabled: true,
            api_key: Some("key".into()),
            project: Some("rag".into()),
        });
        let a = trace.handles().unwrap();
        let b = trace.handles().unwrap();
        assert_ne!(a.run_id(), b.run_id());
        assert_eq!(a.project(), Some("rag"));
    }
}
