use serde::{Deserialize, Serialize};

/// Structured query evaluation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Upper bound of backend queries in flight for one structured query
    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,
}

impl EvaluationConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_queries == 0 {
            return Err("evaluation.max_concurrent_queries must be positive".to_string());
        }
        Ok(())
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_queries: default_max_concurrent_queries(),
        }
    }
}

fn default_max_concurrent_queries() -> usize {
    32
}
