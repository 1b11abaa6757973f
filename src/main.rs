//! Screen Guard - Entry Point
//!
//! Reads one face count per line from stdin (stand-in for the vision
//! sensor) and runs it through the decision pipeline.

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use screen_guard_core::constants::{APP_NAME, APP_VERSION};
use screen_guard_core::{LogNotifier, Monitor, MonitorConfig, TransitionEvent};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting {} v{}...", APP_NAME, APP_VERSION);

    let config = match MonitorConfig::resolve() {
        Ok(c) => c,
        Err(e) => {
            log::error!("Config error: {}", e);
            std::process::exit(2);
        }
    };

    let monitor = match Monitor::new(config, Arc::new(LogNotifier)) {
        Ok(m) => Arc::new(m),
        Err(e) => {
            log::error!("Failed to build monitor: {}", e);
            std::process::exit(2);
        }
    };

    let config = monitor.config();
    log::info!(
        "Escalation {}ms, zero tolerance {}, interval {}ms, skip 1/{}, persistent {}s, cooldown {}s",
        config.escalation_delay_ms,
        config.zero_tolerance,
        config.min_decision_interval_ms,
        config.frame_skip,
        config.persistent_threat_secs,
        config.notification_cooldown_secs
    );

    monitor.add_listener(Arc::new(|ev: &TransitionEvent| {
        log::debug!(
            "Transition {} -> {} ({:?}) at {}",
            ev.previous_state,
            ev.new_state,
            ev.cause,
            ev.timestamp.to_rfc3339()
        );
    }));

    if let Err(e) = monitor.start() {
        log::error!("Failed to start monitoring: {}", e);
        std::process::exit(1);
    }

    let sensor = monitor.sensor_callback();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => sensor(line.trim().parse::<i32>().ok()),
                Ok(None) => break,
                Err(e) => {
                    log::warn!("Sensor input error: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted");
                break;
            }
        }
    }

    match serde_json::to_string_pretty(&monitor.status()) {
        Ok(json) => log::info!("Final status:\n{}", json),
        Err(e) => log::warn!("Failed to serialize status: {}", e),
    }
    for record in monitor.notification_history() {
        log::info!(
            "Sent {} \"{}\" at {}",
            record.severity.tag(),
            record.title,
            record.sent_at.format("%H:%M:%S")
        );
    }
    monitor.stop();
}
