use anyhow::Context;
use clap::Parser;
use export::bridge::ExportBridge;
use export::model::AuditReportModel;
use generator::profile::{build_segments, demo_observations, SyntheticCaptureBank};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::WorkflowConfig;
use workflow::runner::{AuditSummary, Runner};

mod export;
mod generator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Satellite transponder encryption audit driver")]
struct Args {
    /// Run the offline demo scenario and emit an audit report
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Minimum signal-quality score admitted at ingest
    #[arg(long, default_value_t = 0.25)]
    quality_floor: f32,
    /// Segments required before an unencrypted verdict may open a case
    #[arg(long, default_value_t = 3)]
    min_evidence: usize,
    /// Days before an unacknowledged disclosure case auto-closes
    #[arg(long, default_value_t = 90.0)]
    timeout_days: f64,
    /// Seed for the synthetic capture generator
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Keep the HTTP bridge alive for incoming observations
    #[arg(long, default_value_t = false)]
    serve: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let workflow_config = if let Some(path) = args.workflow {
        WorkflowConfig::load(path)?
    } else {
        WorkflowConfig::from_args(args.quality_floor, args.min_evidence, args.timeout_days)
    };

    let bank = Arc::new(SyntheticCaptureBank::new());
    let runner = Runner::new(workflow_config, bank.clone());
    let bridge = ExportBridge::new(Arc::new(runner.clone()), bank.clone());

    let runtime = TokioBuilder::new_current_thread()
        .enable_all()
        .build()
        .context("creating driver runtime")?;

    if args.offline {
        let observations = demo_observations(args.seed);
        let segments = build_segments(&bank, &observations)?;
        let latest = segments.iter().map(|s| s.end_ts).fold(0.0f64, f64::max);

        // Feed the batch through the bounded admission queue: senders block
        // when it fills, segments are never dropped.
        let summary = runtime.block_on(async {
            let (sender, receiver) = runner.admission_queue();
            let feeder = tokio::spawn(async move {
                for segment in segments {
                    if sender.send(segment).await.is_err() {
                        break;
                    }
                }
            });
            runner.run_queue(receiver).await?;
            feeder.await.context("joining capture feeder")?;
            Ok::<_, anyhow::Error>(runner.summarize(latest).await)
        })?;

        print_summary(&summary);

        let model = AuditReportModel::from_summary(&summary);
        bridge.publish(&model)?;
        bridge.publish_status("Offline audit results ready.");

        let report = format!(
            "processed={} rejected={} duplicates={} transponders={} open_cases={}\n",
            summary.metrics.processed,
            summary.metrics.rejected,
            summary.metrics.duplicates,
            summary.snapshot.transponders.len(),
            summary.cases.iter().filter(|case| case.is_open()).count()
        );
        let report_path = PathBuf::from("tools/data/audit_summary.log");
        if let Some(parent) = report_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(report_path)?;
        file.write_all(report.as_bytes())?;

        let snapshot_json = summary
            .snapshot
            .to_json()
            .context("serializing audit snapshot")?;
        fs::write("tools/data/audit_snapshot.json", snapshot_json)?;
    }

    if args.serve {
        bridge.publish_status("HTTP bridge running (Ctrl+C to stop)...");
        runtime.block_on(async {
            signal::ctrl_c().await.context("awaiting Ctrl+C to exit")?;
            Ok::<(), anyhow::Error>(())
        })?;
    }

    Ok(())
}

fn print_summary(summary: &AuditSummary) {
    let line = "=".repeat(60);
    println!("\n{}", line);
    println!("  TRANSPONDER ENCRYPTION AUDIT");
    println!("{}", line);
    for stats in &summary.snapshot.satellites {
        println!(
            "  {:<16} total {:>2} | secure {} ({:.1}%) | unencrypted {} ({:.1}%) | obfuscated {} | pending {} | unclassified {}",
            stats.satellite,
            stats.total_transponders,
            stats.secure,
            stats.encryption_rate_pct,
            stats.unencrypted,
            stats.plaintext_rate_pct,
            stats.obfuscated,
            stats.further_analysis,
            stats.unclassified
        );
    }
    println!("{}", line);
    println!(
        "  segments: processed {} | rejected {} | duplicates {}",
        summary.metrics.processed, summary.metrics.rejected, summary.metrics.duplicates
    );
    println!(
        "  disclosure: open cases {} | pii-flagged transponders {}",
        summary.cases.iter().filter(|case| case.is_open()).count(),
        summary
            .snapshot
            .satellites
            .iter()
            .map(|stats| stats.pii_flag_count)
            .sum::<usize>()
    );
    println!("{}\n", line);
}
