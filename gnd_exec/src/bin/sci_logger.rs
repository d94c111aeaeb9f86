//! Headless science logger
//!
//! Logs everything the science module sends and archives each sample in the session directory.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{debug, info, warn};
use std::thread;
use std::time::{Duration, Instant};
use structopt::StructOpt;

// Internal
use comms_if::{
    inbound::{InboundQueue, LatestState},
    net::BrokerClient,
    tm::{Classification, TelemetrySample},
};
use gnd_lib::params::GndExecParams;
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Longest logging duration accepted, one year.
const MAX_DURATION_S: f64 = 365.0 * 24.0 * 3600.0;

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "sci_logger", about = "Log science module telemetry and archive samples")]
struct Opts {
    /// Stop after this many seconds, otherwise run until killed
    #[structopt(long, parse(try_from_str = parse_duration))]
    duration: Option<Duration>,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opts = Opts::from_args();

    // ---- EARLY INITIALISATION ----

    let session =
        Session::new("sci_logger", "sessions").wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    info!("Orion Science Logger\n");
    info!("Session directory: {:?}\n", session.session_root);

    let params = GndExecParams::load().wrap_err("Could not load the exec params")?;

    // ---- INITIALISE NETWORK ----

    let queue = InboundQueue::with_capacity(params.inbound_capacity);
    let mut client = BrokerClient::new(queue.clone());

    client
        .subscribe(&params.topics.science_outbound)
        .wrap_err("Failed to subscribe to science telemetry")?;
    client
        .connect(&params.broker)
        .wrap_err("Failed to start the broker connection")?;

    // ---- MAIN LOOP ----

    let drain_period = Duration::from_millis(params.drain_period_ms);
    let end = opts.duration.map(|d| Instant::now() + d);

    let mut latest = LatestState::default();
    let mut num_samples = 0u64;

    loop {
        thread::sleep(drain_period);

        let drained = queue.drain_and_snapshot();

        for entry in drained.entries.iter() {
            let class = entry.classification();

            match class {
                Classification::Sample => {
                    info!("{}", entry.summary());

                    let number = entry
                        .decoded
                        .as_ref()
                        .map(TelemetrySample::from_envelope)
                        .and_then(|r| match r {
                            Ok(s) => Some(s.number),
                            Err(e) => {
                                warn!("Sample has unexpected values: {}", e);
                                None
                            }
                        });

                    let path = match number {
                        Some(n) => format!("samples/sample_{}.json", n),
                        None => "samples/sample.json".to_string(),
                    };
                    session.save_with_timestamp(path, entry.clone());
                    num_samples += 1;
                }
                Classification::Telemetry => debug!("{}", entry.summary()),
                _ => info!("{} on {}: {}", class, entry.topic, entry.summary()),
            }
        }

        latest.update(&drained);

        if end.map_or(false, |e| Instant::now() >= e) {
            info!("Logging duration elapsed, stopping");
            break;
        }
    }

    // ---- SHUTDOWN ----

    client.disconnect();

    info!(
        "End of execution: {} messages received, {} samples archived",
        latest.num_received(),
        num_samples
    );
    if let Some(entry) = latest.latest(Classification::Telemetry) {
        info!("Last telemetry: {}", entry.summary());
    }

    session.exit();

    Ok(())
}

/// Parse a logging duration in seconds, rejecting negative and non-finite values.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.parse().map_err(|e| format!("{}", e))?;

    // Bounded so that adding to an Instant can't overflow
    if secs.is_finite() && secs >= 0.0 && secs <= MAX_DURATION_S {
        Ok(Duration::from_secs_f64(secs))
    } else {
        Err(format!("duration must be between 0 and {} seconds", MAX_DURATION_S))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("1.5"), Ok(Duration::from_millis(1500)));
        assert_eq!(parse_duration("0"), Ok(Duration::from_secs(0)));

        for bad in ["inf", "NaN", "-1", "1e300", "ten"].iter() {
            assert!(parse_duration(bad).is_err(), "{} accepted", bad);
        }
    }

    #[test]
    fn test_duration_flag() {
        let opts = Opts::from_iter_safe(&["sci_logger", "--duration", "2"]).unwrap();
        assert_eq!(opts.duration, Some(Duration::from_secs(2)));

        assert!(Opts::from_iter_safe(&["sci_logger", "--duration", "inf"]).is_err());
    }
}
