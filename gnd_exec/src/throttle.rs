//! # Publisher throttle
//!
//! Chassis commands are a heartbeat: one is published every cycle whether or not the input
//! changed, and only the command mapped from the latest input is ever sent. Science commands are
//! sent as they are issued.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};

use comms_if::{
    net::{CommandSink, NetError},
    tc::{ChassisCommand, ScienceCommand},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Keeps a loop running at a fixed period.
#[derive(Debug)]
pub struct CycleTimer {
    period: Duration,

    cycle_start: Instant,

    /// Number of consecutive cycles which took longer than the period
    pub num_consec_overruns: u64,
}

/// Publishes the chassis heartbeat.
#[derive(Debug)]
pub struct ChassisPublisher {
    topic: String,

    /// Number of commands handed to the broker client
    pub num_sent: u64,

    /// Number of commands dropped because the link was down
    pub num_dropped: u64,

    in_outage: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CycleTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            cycle_start: Instant::now(),
            num_consec_overruns: 0,
        }
    }

    /// Frequency of the cycle in Hz.
    pub fn frequency_hz(&self) -> f64 {
        1.0 / self.period.as_secs_f64()
    }

    /// Mark the start of a cycle.
    pub fn start(&mut self) {
        self.cycle_start = Instant::now();
    }

    /// Sleep for whatever remains of the cycle.
    ///
    /// Returns the duration of the overrun if the cycle took longer than the period.
    pub fn finish(&mut self) -> Option<Duration> {
        let cycle_dur = self.cycle_start.elapsed();

        match self.period.checked_sub(cycle_dur) {
            Some(d) => {
                self.num_consec_overruns = 0;
                thread::sleep(d);
                None
            }
            None => {
                let overrun = cycle_dur - self.period;
                warn!("Cycle overran by {:.06} s", overrun.as_secs_f64());
                self.num_consec_overruns += 1;
                Some(overrun)
            }
        }
    }
}

impl ChassisPublisher {
    pub fn new<S: Into<String>>(topic: S) -> Self {
        Self {
            topic: topic.into(),
            num_sent: 0,
            num_dropped: 0,
            in_outage: false,
        }
    }

    /// Publish the command.
    ///
    /// Commands which can't be sent are dropped, the first drop of an outage is logged and so is
    /// the recovery.
    pub fn publish<S: CommandSink + ?Sized>(&mut self, sink: &S, cmd: &ChassisCommand) {
        match sink.publish(&self.topic, &cmd.to_envelope()) {
            Ok(()) => {
                if self.in_outage {
                    info!(
                        "Chassis commands resumed ({} dropped so far)",
                        self.num_dropped
                    );
                    self.in_outage = false;
                }
                self.num_sent += 1;
            }
            Err(e) => {
                if !self.in_outage {
                    warn!("Chassis commands are being dropped: {}", e);
                    self.in_outage = true;
                }
                self.num_dropped += 1;
            }
        }
    }

    /// True if the last command could not be sent.
    pub fn in_outage(&self) -> bool {
        self.in_outage
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Publish a science command immediately.
pub fn publish_science<S: CommandSink + ?Sized>(
    sink: &S,
    topic: &str,
    cmd: &ScienceCommand,
) -> Result<(), NetError> {
    sink.publish(topic, &cmd.to_envelope())
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::codec::Envelope;
    use std::cell::{Cell, RefCell};

    /// Records everything published while `connected` is set.
    #[derive(Default)]
    struct TestSink {
        connected: Cell<bool>,
        sent: RefCell<Vec<(String, Envelope)>>,
    }

    impl CommandSink for TestSink {
        fn publish(&self, topic: &str, envelope: &Envelope) -> Result<(), NetError> {
            if !self.connected.get() {
                return Err(NetError::NotConnected);
            }
            self.sent
                .borrow_mut()
                .push((topic.to_string(), envelope.clone()));
            Ok(())
        }
    }

    #[test]
    fn test_heartbeat_through_outage() {
        let sink = TestSink::default();
        let mut publisher = ChassisPublisher::new("chassis");
        let cmd = ChassisCommand::from_wheels([10, 20, 10, 20]);

        // Link down, nothing reaches the network
        for _ in 0..3 {
            publisher.publish(&sink, &cmd);
        }
        assert!(publisher.in_outage());
        assert_eq!(publisher.num_dropped, 3);
        assert!(sink.sent.borrow().is_empty());

        // Link up, every tick is sent even though the command didn't change
        sink.connected.set(true);
        publisher.publish(&sink, &cmd);
        publisher.publish(&sink, &cmd);
        assert!(!publisher.in_outage());
        assert_eq!(publisher.num_sent, 2);

        let sent = sink.sent.borrow();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, "chassis");
        assert_eq!(ChassisCommand::from_envelope(&sent[1].1), Some(cmd));
    }

    #[test]
    fn test_publish_science() {
        let sink = TestSink::default();
        let cmd = ScienceCommand {
            reset: 1,
            ..Default::default()
        };

        assert!(matches!(
            publish_science(&sink, "science", &cmd),
            Err(NetError::NotConnected)
        ));

        sink.connected.set(true);
        publish_science(&sink, "science", &cmd).unwrap();
        assert_eq!(
            ScienceCommand::from_envelope(&sink.sent.borrow()[0].1),
            Some(cmd)
        );
    }

    #[test]
    fn test_cycle_timer() {
        let mut timer = CycleTimer::new(Duration::from_millis(20));
        assert!((timer.frequency_hz() - 50.0).abs() < 1e-9);

        timer.start();
        assert_eq!(timer.finish(), None);
        assert!(timer.cycle_start.elapsed() >= Duration::from_millis(20));

        timer.start();
        thread::sleep(Duration::from_millis(30));
        assert!(timer.finish().is_some());
        assert_eq!(timer.num_consec_overruns, 1);
    }
}
