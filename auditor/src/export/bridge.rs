use crate::export::model::AuditReportModel;
use crate::generator::profile::{ObservationConfig, SyntheticCaptureBank};
use crate::workflow::runner::Runner;
use anyhow::Result;
use auditcore::capture::{RejectReason, TransponderKey};
use auditcore::pipeline::SegmentOutcome;
use serde::Deserialize;
use serde_json::json;
use std::{
    net::SocketAddr,
    sync::{Arc, RwLock},
    thread,
    time::{SystemTime, UNIX_EPOCH},
};
use tokio::runtime::Builder;
use warp::{http::StatusCode, Filter};

fn audit_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9000))
}

fn wall_clock() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0)
}

#[derive(Debug)]
struct WarpError;

impl warp::reject::Reject for WarpError {}

/// Operator-driven disclosure transition delivered over the bridge.
#[derive(Debug, Deserialize)]
struct CaseActionRequest {
    satellite: String,
    center_khz: u64,
    bandwidth_khz: u64,
    /// One of "notified", "acknowledged", "remediated".
    action: String,
}

fn describe(outcome: &SegmentOutcome) -> String {
    match outcome {
        SegmentOutcome::Rejected {
            reason: RejectReason::TooShort { .. },
        } => "rejected: too short".into(),
        SegmentOutcome::Rejected {
            reason: RejectReason::LowQuality { .. },
        } => "rejected: low quality".into(),
        SegmentOutcome::Rejected {
            reason: RejectReason::Unreadable,
        } => "rejected: unreadable".into(),
        SegmentOutcome::Duplicate => "duplicate".into(),
        SegmentOutcome::Classified { record, .. } => record.verdict.as_str().into(),
    }
}

/// Bridge hosting the audit export endpoint and accepting observations and
/// operator case actions.
pub struct ExportBridge {
    state: Arc<RwLock<AuditReportModel>>,
}

impl ExportBridge {
    pub fn new(runner: Arc<Runner>, bank: Arc<SyntheticCaptureBank>) -> Self {
        let state = Arc::new(RwLock::new(AuditReportModel::default()));
        let state_for_filter = state.clone();
        let state_filter = warp::any().map(move || state_for_filter.clone());
        let runner_filter = warp::any().map(move || runner.clone());
        let bank_filter = warp::any().map(move || bank.clone());

        let snapshot_route = warp::path("snapshot")
            .and(warp::get())
            .and(state_filter.clone())
            .map(|state: Arc<RwLock<AuditReportModel>>| {
                warp::reply::json(&*state.read().unwrap())
            });

        let stats_route = warp::path("stats")
            .and(warp::get())
            .and(runner_filter.clone())
            .map(|runner: Arc<Runner>| {
                warp::reply::json(&runner.pipeline().metrics().snapshot())
            });

        let observe_route = warp::path("observe")
            .and(warp::post())
            .and(warp::body::json())
            .and(state_filter)
            .and(runner_filter.clone())
            .and(bank_filter)
            .and_then(
                |config: ObservationConfig,
                 state: Arc<RwLock<AuditReportModel>>,
                 runner: Arc<Runner>,
                 bank: Arc<SyntheticCaptureBank>| async move {
                    let segment = match bank.build_segment(&config) {
                        Ok(segment) => segment,
                        Err(err) => {
                            eprintln!("observe error: {}", err);
                            return Err(warp::reject::custom(WarpError));
                        }
                    };
                    match runner.process(segment).await {
                        Ok(outcome) => {
                            let summary = runner.summarize(wall_clock()).await;
                            let mut guard = state.write().unwrap();
                            *guard = AuditReportModel::from_summary(&summary);
                            Ok::<_, warp::Rejection>(warp::reply::with_status(
                                warp::reply::json(&json!({
                                    "status": "ok",
                                    "segment": config.segment_id,
                                    "outcome": describe(&outcome),
                                })),
                                StatusCode::OK,
                            ))
                        }
                        Err(err) => {
                            eprintln!("observe error: {}", err);
                            Err(warp::reject::custom(WarpError))
                        }
                    }
                },
            );

        let case_route = warp::path("case-event")
            .and(warp::post())
            .and(warp::body::json())
            .and(runner_filter)
            .and_then(|request: CaseActionRequest, runner: Arc<Runner>| async move {
                let key = TransponderKey::new(
                    &request.satellite,
                    request.center_khz,
                    request.bandwidth_khz,
                );
                let now = wall_clock();
                let tracker = runner.pipeline().tracker();
                let case = match request.action.as_str() {
                    "notified" => tracker.mark_notified(&key, now),
                    "acknowledged" => tracker.mark_acknowledged(&key, now),
                    "remediated" => tracker.mark_remediated(&key, now),
                    _ => None,
                };
                match case {
                    Some(case) => Ok::<_, warp::Rejection>(warp::reply::with_status(
                        warp::reply::json(&json!({
                            "status": "ok",
                            "case": case.case_id,
                            "case_status": case.status.name(),
                        })),
                        StatusCode::OK,
                    )),
                    None => Err(warp::reject::custom(WarpError)),
                }
            });

        thread::spawn(move || {
            let routes = snapshot_route
                .or(stats_route)
                .or(observe_route)
                .or(case_route);
            let runtime = Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to build bridge runtime");
            runtime.block_on(async move {
                warp::serve(routes).run(audit_bind_address()).await;
            });
        });

        Self { state }
    }

    pub fn publish(&self, model: &AuditReportModel) -> Result<()> {
        let mut guard = self
            .state
            .write()
            .map_err(|_| anyhow::anyhow!("bridge state poisoned"))?;
        *guard = model.clone();
        println!(
            "[AUDIT] transponders: {}, open cases: {}, processed: {}",
            guard.snapshot.transponders.len(),
            guard.cases.iter().filter(|case| case.is_open()).count(),
            guard.metrics.processed
        );
        Ok(())
    }

    pub fn publish_status(&self, message: &str) {
        println!("[AUDIT] {}", message);
    }

    #[cfg(test)]
    pub fn snapshot_model(&self) -> AuditReportModel {
        self.state.read().unwrap().clone()
    }
}
