//! Science module control console
//!
//! Operator actions typed at the prompt are sent to the science module as they are entered.
//! Telemetry from the module is collected in the background and shown by `status`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{info, warn};
use rustyline::{error::ReadlineError, DefaultEditor};
use structopt::StructOpt;

// Internal
use comms_if::{
    inbound::{InboundQueue, LatestState},
    net::BrokerClient,
    tm::Classification,
};
use gnd_lib::{
    params::GndExecParams,
    sci_ctrl::{map_science, ScienceAction},
    throttle::publish_science,
};
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const PROMPT: &str = "science $ ";

const HELP: &str = "\
Console commands:
    status      Show the connection state and the latest science telemetry
    help        Show this message and the science actions
    quit        Exit the console
";

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    let session = Session::new("sci_ctrl", "sessions").wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Info, &session).wrap_err("Failed to initialise logging")?;

    info!("Orion Science Control\n");

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

    // ---- CONSOLE ----

    let mut rl = DefaultEditor::new().wrap_err("Failed to start the console")?;
    let mut latest = LatestState::default();
    let mut num_sent: u64 = 0;

    println!("Type `help` for the list of commands");

    loop {
        let line = match rl.readline(PROMPT) {
            Ok(l) => l,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e).wrap_err("Console error"),
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        rl.add_history_entry(line).ok();

        // Fold in everything received since the last command
        latest.update(&queue.drain_and_snapshot());

        match line {
            "quit" | "exit" => break,
            "help" => {
                println!("{}", HELP);
                ScienceAction::clap().print_long_help().ok();
                println!();
                continue;
            }
            "status" => {
                print_status(&client, &latest);
                continue;
            }
            _ => (),
        }

        let action = match ScienceAction::from_iter_safe(
            std::iter::once("science").chain(line.split_whitespace()),
        ) {
            Ok(a) => a,
            Err(e) => {
                println!("{}", e.message);
                continue;
            }
        };

        if let Err(e) = action.validate() {
            println!("{}", e);
            continue;
        }

        if action.requires_confirmation() {
            match rl.readline("Reset the science module? [y/N] ") {
                Ok(answer) if answer.trim().eq_ignore_ascii_case("y") => (),
                _ => {
                    println!("Cancelled");
                    continue;
                }
            }
        }

        let cmd = map_science(&action.to_inputs());

        match publish_science(&client, &params.topics.science_inbound, &cmd) {
            Ok(()) => {
                info!("Sent {:?}", action);
                session.save(format!("commands/science_{:05}.json", num_sent), cmd);
                num_sent += 1;
            }
            Err(e) => warn!("Could not send {:?}: {}", action, e),
        }
    }

    // ---- SHUTDOWN ----

    client.disconnect();
    session.exit();

    Ok(())
}

fn print_status(client: &BrokerClient, latest: &LatestState) {
    println!("Connection: {}", client.state());
    println!("Messages received: {}", latest.num_received());

    for class in [Classification::Telemetry, Classification::Sample].iter() {
        match latest.latest(*class) {
            Some(entry) => println!(
                "Latest {} ({}): {}",
                class,
                entry.received_at.format("%H:%M:%S"),
                entry.summary()
            ),
            None => println!("No {} received", class),
        }
    }

    if let Some(s) = latest.last_summary() {
        println!("Last message: {}", s);
    }
}
