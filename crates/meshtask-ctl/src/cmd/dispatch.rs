//! Shared dispatch path — validate config, run one round trip, report.

use std::io::Write;

use anyhow::{bail, Context, Result};

use meshtask_core::config::MeshtaskConfig;
use meshtask_core::wire::{batch_digest, encode_batch};
use meshtask_core::{TaskAction, TaskBatch};
use meshtask_services::{CorrelationOutcome, Correlator, MqttTransport, Topics, Transport};

/// Send `batch` to the configured broker and print the outcome.
pub async fn dispatch_batch(config: &MeshtaskConfig, batch: &TaskBatch) -> Result<()> {
    config.mqtt.validate()?;
    let transport = MqttTransport::from_config(&config.mqtt);
    let correlator = Correlator::new(
        transport,
        Topics::from(&config.mqtt.topics),
        config.mqtt.wait_duration(),
    );
    let broker = format!("{}:{}", config.mqtt.host, config.mqtt.port);
    run(correlator, batch, &broker, &mut std::io::stdout()).await
}

/// One round trip over any transport. Errors are the process failures:
/// transport problems, device errors, and timeouts.
pub async fn run<T: Transport>(
    mut correlator: Correlator<T>,
    batch: &TaskBatch,
    broker: &str,
    out: &mut impl Write,
) -> Result<()> {
    let payload = encode_batch(batch)?;
    writeln!(
        out,
        "Sending batch {} ({} actions) to {}...",
        batch_digest(&payload),
        batch.len(),
        broker
    )?;
    writeln!(out, "Waiting response...")?;

    let outcome = correlator
        .dispatch(batch)
        .await
        .with_context(|| format!("failed to reach broker at {} — is it running?", broker))?;
    report(&outcome, out)
}

fn report(outcome: &CorrelationOutcome, out: &mut impl Write) -> Result<()> {
    match outcome {
        CorrelationOutcome::Completed { last } => {
            writeln!(out, "═══════════════════════════════════════")?;
            writeln!(out, "  Done")?;
            writeln!(out, "═══════════════════════════════════════")?;
            writeln!(out, "{}", serde_json::to_string_pretty(&last.body)?)?;
            Ok(())
        }
        CorrelationOutcome::ErrorSignaled { payload } => {
            writeln!(out, "{}", serde_json::to_string_pretty(&payload.body)?)?;
            bail!("device reported an error")
        }
        CorrelationOutcome::TimedOut { waited, during } => bail!(
            "no response within {}s ({}); raise mqtt.wait_secs or pass --wait",
            waited.as_secs(),
            during
        ),
    }
}

/// Print a batch the way the operator will confirm it.
pub fn print_batch(batch: &TaskBatch, out: &mut impl Write) -> Result<()> {
    writeln!(out, "═══════════════════════════════════════")?;
    writeln!(out, "  Task batch ({} actions)", batch.len())?;
    writeln!(out, "═══════════════════════════════════════")?;
    for (i, action) in batch.actions().iter().enumerate() {
        match action {
            TaskAction::Remove { name } => {
                writeln!(out, "  ┌─ #{} remove", i)?;
                writeln!(out, "  └─ name   : {}", name)?;
            }
            TaskAction::Request(req) => {
                writeln!(out, "  ┌─ #{} {}", i, req.opcode)?;
                if let Some(schedule) = &req.schedule {
                    writeln!(
                        out,
                        "  │  auto   : every {}s as {:?}",
                        schedule.delay, schedule.name
                    )?;
                }
                if let Some(id) = &req.sensor_prop_id {
                    writeln!(out, "  │  prop   : {}", id.as_str())?;
                }
                writeln!(out, "  └─ addr   : {}", req.addr.as_str())?;
            }
        }
    }
    let wire = serde_json::to_string_pretty(batch).context("failed to render batch")?;
    writeln!(out, "\n{}", wire)?;
    Ok(())
}
