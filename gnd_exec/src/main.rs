//! Chassis controller executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise the session, logging, parameters and ChassisCtrl
//!     - Connect to the broker
//!     - Start the input source, either a script or the operator console
//!     - Main loop, once per chassis tick:
//!         - Apply any scripted input events
//!         - ChassisCtrl processing on the latest input
//!         - Publish the chassis heartbeat
//!         - Drain the inbound queue (the rover's chassis echo)
//!         - Status reporting on the 1 Hz cycle
//!
//! # Operator console
//!
//! Without a script the operator types chassis commands (`left`, `right`, `axes`, `stop`,
//! `speed`, `faster`, `slower`, `lock`) at the prompt. `quit` stops the executable.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{debug, info, warn};
use rustyline::{error::ReadlineError, DefaultEditor};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::Duration;
use structopt::StructOpt;

// Internal
use comms_if::{
    inbound::{InboundQueue, LatestState},
    net::BrokerClient,
    tc::ChassisCommand,
};
use gnd_lib::{
    chassis_ctrl,
    data_store::{Controls, DataStore, SharedControls},
    input::{ControlEvent, OperatorCmd},
    params::GndExecParams,
    throttle::{ChassisPublisher, CycleTimer},
};
use util::{
    logger::{logger_init, LevelFilter},
    module::State,
    script_interpreter::{PendingItems, ScriptInterpreter},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const PROMPT: &str = "chassis $ ";

/// Number of consecutive overruns after which a warning about the tick period is raised.
const OVERRUN_WARN_LIMIT: u64 = 20;

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "gnd_exec", about = "Orion chassis controller")]
struct Opts {
    /// Script of timed control events to run instead of the operator console
    #[structopt(parse(from_os_str))]
    script: Option<PathBuf>,
}

/// Where the control events come from.
enum ControlSource {
    Script(ScriptInterpreter<ControlEvent>),
    Console(thread::JoinHandle<()>),
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opts = Opts::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("gnd_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    info!("Orion Chassis Controller\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let params = GndExecParams::load().wrap_err("Could not load the exec params")?;

    info!("Exec parameters loaded");
    session.save("gnd_exec_params.json", params.clone());

    // ---- INITIALISE DATASTORE ----

    info!("Initialising modules...");

    let mut ds = DataStore::default();

    ds.chassis_ctrl
        .init(params.device_roles.clone(), &session)
        .wrap_err("Failed to initialise ChassisCtrl")?;
    info!("ChassisCtrl init complete");

    info!("Module initialisation complete\n");

    // ---- INITIALISE NETWORK ----

    info!("Initialising network");

    let queue = InboundQueue::with_capacity(params.inbound_capacity);
    let mut client = BrokerClient::new(queue.clone());

    if params.subscribe_chassis_echo {
        client
            .subscribe(&params.topics.chassis_inbound)
            .wrap_err("Failed to subscribe to the chassis echo")?;
    }

    client
        .connect(&params.broker)
        .wrap_err("Failed to start the broker connection")?;

    info!(
        "Connecting to {}:{} as {}",
        params.broker.host,
        params.broker.port,
        params.broker.client_id()
    );

    // ---- INITIALISE INPUT SOURCE ----

    let controls = SharedControls::new(Controls::default());
    let quit = Arc::new(AtomicBool::new(false));

    let mut source = match opts.script {
        Some(ref path) => {
            info!("Loading script from {:?}", path);

            let si = ScriptInterpreter::new(path).wrap_err("Failed to load script")?;

            info!(
                "Loaded script lasts {:.02} s and contains {} events\n",
                si.get_duration(),
                si.get_num_items()
            );

            ControlSource::Script(si)
        }
        None => {
            info!("No script provided, the operator console will be used\n");

            let console_controls = controls.clone();
            let console_quit = quit.clone();
            let jh = thread::Builder::new()
                .name("operator_console".into())
                .spawn(move || operator_console(console_controls, console_quit))
                .wrap_err("Failed to start the operator console")?;

            ControlSource::Console(jh)
        }
    };

    // ---- MAIN LOOP ----

    let mut timer = CycleTimer::new(Duration::from_millis(params.chassis_tick_period_ms));
    let mut publisher = ChassisPublisher::new(params.topics.chassis_inbound.clone());
    let mut echo = LatestState::default();

    info!("Beginning main loop\n");

    while !quit.load(Ordering::Relaxed) {
        timer.start();

        // Clear items that need wiping at the start of the cycle
        ds.cycle_start(timer.frequency_hz());

        // ---- CONTROL INPUT ----

        if let ControlSource::Script(ref mut si) = source {
            match si.get_pending() {
                PendingItems::None => (),
                PendingItems::Some(events) => {
                    for event in events.iter() {
                        debug!("Scripted event: {:?}", event);
                        controls.apply(event);
                    }
                }
                // Exit if end of script reached
                PendingItems::EndOfScript => {
                    info!("End of script reached, stopping");
                    break;
                }
            }
        }

        let c = controls.snapshot();
        ds.chassis_ctrl_input = chassis_ctrl::InputData {
            devices: c.devices,
            manual: c.manual,
            locks: c.locks,
        };

        // ---- CONTROL ALGORITHM PROCESSING ----

        match ds.chassis_ctrl.proc(&ds.chassis_ctrl_input) {
            Ok((o, r)) => {
                ds.chassis_ctrl_output = o;
                ds.chassis_ctrl_status_rpt = r;
            }
            Err(e) => warn!("Error during ChassisCtrl processing: {}", e),
        }

        // ---- PUBLISH ----

        publisher.publish(&client, &ds.chassis_ctrl_output.cmd);

        // ---- INBOUND ----

        let drained = queue.drain_and_snapshot();
        echo.update(&drained);

        // ---- STATUS ----

        if ds.is_1_hz_cycle {
            info!(
                "[{}] {:?} (max {}) from {:?}, locked {:?}, sent {}, dropped {}",
                client.state(),
                ds.chassis_ctrl_output.cmd.wheels(),
                ds.chassis_ctrl_output.dynamic_max,
                ds.chassis_ctrl_status_rpt.source,
                ds.chassis_ctrl_status_rpt.wheel_locked,
                publisher.num_sent,
                publisher.num_dropped
            );

            if let Some(cmd) = echo
                .last()
                .and_then(|e| e.decoded.as_ref())
                .and_then(ChassisCommand::from_envelope)
            {
                debug!("Rover echo: {:?}", cmd.wheels());
            }
        }

        // ---- CYCLE MANAGEMENT ----

        timer.finish();
        ds.num_consec_cycle_overruns = timer.num_consec_overruns;

        if ds.num_consec_cycle_overruns == OVERRUN_WARN_LIMIT {
            warn!(
                "{} consecutive cycle overruns, the tick period ({} ms) may be too short",
                OVERRUN_WARN_LIMIT, params.chassis_tick_period_ms
            );
        }

        ds.cycle_end();
    }

    // ---- SHUTDOWN ----

    info!("Shutting down");

    client.disconnect();

    if let ControlSource::Console(jh) = source {
        if jh.join().is_err() {
            warn!("Operator console panicked");
        }
    }

    info!(
        "End of execution: {} commands sent, {} dropped, {} inbound messages",
        publisher.num_sent,
        publisher.num_dropped,
        echo.num_received()
    );

    session.exit();

    Ok(())
}

/// Read operator commands from the console until `quit`.
fn operator_console(controls: SharedControls, quit: Arc<AtomicBool>) {
    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            warn!("Could not start the operator console: {}", e);
            quit.store(true, Ordering::Relaxed);
            return;
        }
    };

    while !quit.load(Ordering::Relaxed) {
        match rl.readline(PROMPT) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line).ok();

                if line == "quit" || line == "exit" {
                    break;
                }

                match OperatorCmd::from_iter_safe(
                    std::iter::once("chassis").chain(line.split_whitespace()),
                ) {
                    Ok(cmd) => controls.apply(&ControlEvent::from(cmd)),
                    // Help and usage errors are both reported through the error's message
                    Err(e) => println!("{}", e.message),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                warn!("Operator console error: {}", e);
                break;
            }
        }
    }

    quit.store(true, Ordering::Relaxed);
}
