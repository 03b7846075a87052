//! Health API
//!
//! Liveness report for the server's `/health` route and the CLI.

use serde::{Deserialize, Serialize};

use super::KnowledgeApi;
use crate::config::Config;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub overall_status: HealthStatus,
    pub version: String,
    pub checks: Vec<HealthCheck>,
    pub timestamp: String,
}

impl KnowledgeApi {
    pub async fn health(&self) -> HealthReport {
        let checks = vec![
            self.check_graph().await,
            self.check_database().await,
            self.check_collaborator(),
            check_config(),
        ];
        let overall_status = checks
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Ok);

        HealthReport {
            overall_status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            checks,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    async fn check_graph(&self) -> HealthCheck {
        let snapshot = self.store().snapshot().await;
        HealthCheck {
            name: "Knowledge graph".to_string(),
            status: HealthStatus::Ok,
            message: Some(format!(
                "{} entities, {} relations",
                snapshot.entity_count(),
                snapshot.relation_count()
            )),
        }
    }

    async fn check_database(&self) -> HealthCheck {
        let name = "Database".to_string();
        let Some(db) = self.database() else {
            return HealthCheck {
                name,
                status: HealthStatus::Ok,
                message: Some("in-memory graph, nothing persisted".to_string()),
            };
        };

        match db.status().await {
            Ok(status) if status.schema.needs_migration => HealthCheck {
                name,
                status: HealthStatus::Error,
                message: Some(format!(
                    "{}: schema v{} behind v{}",
                    status.location, status.schema.current_version, status.schema.target_version
                )),
            },
            Ok(status) => HealthCheck {
                name,
                status: HealthStatus::Ok,
                message: Some(format!(
                    "{} (schema v{}, {} entities, {} relations, {} feedback)",
                    status.location,
                    status.schema.current_version,
                    status.entities,
                    status.relations,
                    status.feedback
                )),
            },
            Err(e) => HealthCheck {
                name,
                status: HealthStatus::Error,
                message: Some(e.to_string()),
            },
        }
    }

    fn check_collaborator(&self) -> HealthCheck {
        let name = self.pipeline().collaborator_name();
        let status = if name == "heuristic_extraction" {
            HealthStatus::Warning
        } else {
            HealthStatus::Ok
        };
        HealthCheck {
            name: "Extraction collaborator".to_string(),
            status,
            message: Some(name.to_string()),
        }
    }
}

fn check_config() -> HealthCheck {
    match Config::config_path() {
        Ok(path) if path.exists() => HealthCheck {
            name: "Configuration".to_string(),
            status: HealthStatus::Ok,
            message: Some(format!("Found at {}", path.display())),
        },
        Ok(path) => HealthCheck {
            name: "Configuration".to_string(),
            status: HealthStatus::Warning,
            message: Some(format!("Not found at {} (using defaults)", path.display())),
        },
        Err(e) => HealthCheck {
            name: "Configuration".to_string(),
            status: HealthStatus::Warning,
            message: Some(e.to_string()),
        },
    }
}
