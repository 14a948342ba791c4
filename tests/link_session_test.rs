//! End-to-end sessions over the mock transport: connect, receive device
//! traffic, send commands, disconnect.

use carousel_daq::data::FixedClock;
use carousel_daq::events::{EventLog, LinkEvent};
use carousel_daq::transport::{MockConnector, MockTransport, Transport};
use carousel_daq::{
    CarouselError, CarouselLink, Command, ConnectionState, LinkTimings, LogTag, ReaderState,
    TrialLog,
};
use chrono::NaiveDate;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct Rig {
    link: CarouselLink,
    mock: Arc<MockTransport>,
    connector: Arc<MockConnector>,
    events: EventLog,
    clock: Arc<FixedClock>,
    _dir: TempDir,
}

fn rig() -> Rig {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(FixedClock::new(
        NaiveDate::from_ymd_opt(2025, 11, 7)
            .unwrap()
            .and_hms_opt(14, 5, 0)
            .unwrap(),
    ));
    let store = Arc::new(TrialLog::open(dir.path()).unwrap().with_clock(clock.clone()));
    let mock = Arc::new(MockTransport::new().strict());
    let connector = Arc::new(MockConnector::new(mock.clone()));
    let events = EventLog::new();
    let link = CarouselLink::new(connector.clone(), store, Arc::new(events.clone()))
        .with_timings(LinkTimings::immediate());

    Rig {
        link,
        mock,
        connector,
        events,
        clock,
        _dir: dir,
    }
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn test_full_session() {
    let mut rig = rig();
    rig.link.connect("/dev/ttyACM0", 115_200).unwrap();
    assert_eq!(rig.connector.opened(), vec![("/dev/ttyACM0".to_string(), 115_200)]);

    rig.link.send_command(Command::Home).unwrap();
    rig.mock.push_line("Homing...");
    rig.mock.push_line("STATUS:POSITION:1");
    rig.link.send("p5").unwrap();
    rig.mock.push_line("STATUS:MOUSE:ENTERED");
    rig.mock.push_line("DATA,1,5,12543,18865,6.32,AUTO");
    rig.mock.push_line("DATA,2,5,20000,21000,1.00,MANUAL");

    assert!(wait_for(|| rig.events.data_results().len() == 2));
    assert_eq!(rig.events.data_results(), vec![true, true]);
    assert_eq!(rig.link.trial_count(), 2);
    assert_eq!(
        rig.events.status_updates(),
        vec![
            ("POSITION".to_string(), "1".to_string()),
            ("MOUSE".to_string(), "ENTERED".to_string()),
        ]
    );
    assert_eq!(rig.mock.written_text(), vec!["home\n", "p5\n"]);

    rig.link.disconnect();
    assert_eq!(rig.link.state(), ConnectionState::Disconnected);
    assert_eq!(rig.link.reader_state(), ReaderState::Stopped);
    assert_eq!(rig.mock.reads_after_close(), 0);

    let records = rig.link.store().records().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].trial, 1);
    assert_eq!(records[1].event, "MANUAL");

    let contents = std::fs::read_to_string(rig.link.current_identity().full_path).unwrap();
    assert_eq!(
        contents,
        "Trial,Position,DwellTime(s),Door Event,Timestamp,EntryTime,ExitTime\n\
         1,5,6.32,AUTO,2025-11-07 14:05:00,12543,18865\n\
         2,5,1.0,MANUAL,2025-11-07 14:05:00,20000,21000\n"
    );
}

#[test]
fn test_data_line_reports_outcome_before_mirror() {
    let mut rig = rig();
    rig.link.connect("/dev/ttyACM0", 115_200).unwrap();
    rig.events.drain();

    rig.mock.push_line("DATA,7,5,12543,18865,6.32,AUTO");
    assert!(wait_for(|| !rig.events.lines_tagged(LogTag::Data).is_empty()));
    rig.link.disconnect();

    let events: Vec<LinkEvent> = rig
        .events
        .events()
        .into_iter()
        .filter(|e| !matches!(e, LinkEvent::Log { tag: LogTag::Info, .. }))
        .collect();
    assert_eq!(
        events,
        vec![
            LinkEvent::DataLogged(true),
            LinkEvent::Log {
                text: "Data logged successfully".into(),
                tag: LogTag::Status
            },
            LinkEvent::Log {
                text: "DATA,7,5,12543,18865,6.32,AUTO".into(),
                tag: LogTag::Data
            },
        ]
    );
}

#[test]
fn test_session_across_midnight_switches_files() {
    let mut rig = rig();
    rig.link.connect("/dev/ttyACM0", 115_200).unwrap();

    rig.mock.push_line("DATA,1,5,100,200,0.10,AUTO");
    assert!(wait_for(|| rig.events.data_results().len() == 1));
    let first = rig.link.current_identity();

    rig.clock.set(
        NaiveDate::from_ymd_opt(2025, 11, 8)
            .unwrap()
            .and_hms_opt(0, 0, 5)
            .unwrap(),
    );
    rig.mock.push_line("DATA,2,6,300,400,0.10,AUTO");
    assert!(wait_for(|| rig.events.data_results().len() == 2));
    let second = rig.link.current_identity();
    rig.link.disconnect();

    assert_eq!(first.display_name, "Carousel_110725.csv");
    assert_eq!(second.display_name, "Carousel_110825.csv");
    assert!(first.full_path.exists());
    assert_eq!(rig.link.trial_count(), 1);
}

#[test]
fn test_reconnect_after_disconnect() {
    let mut rig = rig();

    rig.link.connect("/dev/ttyACM0", 115_200).unwrap();
    rig.link.disconnect();
    assert!(matches!(
        rig.link.send("home"),
        Err(CarouselError::NotConnected)
    ));
    assert_eq!(rig.mock.write_calls(), 0);

    rig.link.connect("/dev/ttyACM1", 9600).unwrap();
    assert!(rig.link.is_connected());
    assert_eq!(rig.link.port(), Some("/dev/ttyACM1"));
    rig.link.send("status").unwrap();
    rig.link.disconnect();

    assert_eq!(rig.connector.opened().len(), 2);
    assert_eq!(rig.mock.written_text(), vec!["status\n"]);
    assert_eq!(rig.mock.reads_after_close(), 0);
}

#[test]
fn test_device_closing_port_stops_reader() {
    let mut rig = rig();
    rig.link.connect("/dev/ttyACM0", 115_200).unwrap();

    rig.mock.push_line("Carousel shutting down");
    rig.mock.close_when_drained();
    assert!(wait_for(|| rig.link.reader_state() == ReaderState::Stopped));
    assert!(!rig.link.is_open());

    // Still nominally connected until the caller disconnects
    assert_eq!(rig.link.state(), ConnectionState::Connected);
    assert!(rig.link.send("home").is_err());

    rig.link.disconnect();
    assert_eq!(rig.link.state(), ConnectionState::Disconnected);
    assert_eq!(rig.mock.reads_after_close(), 0);
}

#[test]
fn test_drop_disconnects() {
    let rig = rig();
    let Rig {
        mut link, mock, ..
    } = rig;
    link.connect("/dev/ttyACM0", 115_200).unwrap();
    assert!(mock.is_open());

    drop(link);
    assert!(!mock.is_open());
    assert_eq!(mock.reads_after_close(), 0);
}
