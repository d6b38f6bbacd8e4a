use serde::Serialize;
use souk_core::config::{AppConfig, LoadOptions};
use souk_db::connect_with_settings;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub async fn run(json_output: bool) -> String {
    let report = build_report().await;

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                error.to_string().replace('"', "\\\"")
            )
        });
    }

    render_human(&report)
}

async fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_registry(&config));
            checks.push(check_database_connectivity(&config).await);
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "registry_readiness",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
            checks.push(DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_registry(config: &AppConfig) -> DoctorCheck {
    use souk_core::registry::NetworkRegistry;

    let registry = match &config.network.registry_path {
        Some(path) => NetworkRegistry::load(path),
        None => Ok(NetworkRegistry::builtin(&config.network.bap_id, &config.network.bap_uri)),
    };

    match registry {
        Ok(registry) => DoctorCheck {
            name: "registry_readiness",
            status: CheckStatus::Pass,
            details: format!("{} domain(s) declared", registry.domains.len()),
        },
        Err(error) => DoctorCheck {
            name: "registry_readiness",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

async fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    match connect_with_settings(&config.database.url, 1, config.database.timeout_secs).await {
        Ok(pool) => {
            let query = sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&pool).await;
            pool.close().await;
            match query {
                Ok(_) => DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Pass,
                    details: "database reachable".to_string(),
                },
                Err(error) => DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Fail,
                    details: format!("database query failed: {error}"),
                },
            }
        }
        Err(error) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Fail,
            details: format!("database connection failed: {error}"),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];
    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("  [{marker}] {} — {}", check.name, check.details));
    }
    lines.join("\n")
}
