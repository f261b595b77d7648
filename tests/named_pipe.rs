use std::io::Write;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};

use filesrc::reader::PollStatus;
use filesrc::{
    DriverState, FileSourceDriver, GlobalConfig, LogMessage, PipeDestinationDriver, SourceError,
    TransportTag,
};
use tempfile::TempDir;

fn config() -> GlobalConfig {
    let mut cfg = GlobalConfig::default();
    cfg.file_perm = 0o640;
    cfg
}

#[test]
fn destination_output_is_read_by_pipe_source() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("relay.fifo");
    let cfg = config();

    let mut dest = PipeDestinationDriver::new(&path, &cfg);
    dest.init(&cfg).unwrap();

    let mut source = FileSourceDriver::pipe(&path, &cfg);
    source.init(&cfg).unwrap();

    for line in ["alpha", "beta", "gamma"] {
        dest.queue(&LogMessage::new(line, "relay")).unwrap();
    }
    assert!(dest.flush().unwrap());

    let mut received = Vec::new();
    source.poll(&mut received).unwrap();
    let payloads: Vec<_> = received.iter().map(|m| m.payload.as_str()).collect();
    assert_eq!(payloads, ["alpha", "beta", "gamma"]);
    assert!(received
        .iter()
        .all(|m| m.transport == Some(TransportTag::Pipe)));

    dest.deinit().unwrap();
    source.deinit().unwrap();
}

#[test]
fn pipe_source_creates_fifo_with_configured_permissions() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("created.fifo");
    let cfg = config();

    let mut source = FileSourceDriver::pipe(&path, &cfg);
    source.init(&cfg).unwrap();

    let metadata = std::fs::metadata(&path).unwrap();
    assert!(metadata.file_type().is_fifo());
    assert_eq!(metadata.permissions().mode() & 0o777, 0o640);
    source.deinit().unwrap();
}

#[test]
fn pipe_source_survives_writers_coming_and_going() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("busy.fifo");
    let cfg = config();

    let mut source = FileSourceDriver::pipe(&path, &cfg);
    source.init(&cfg).unwrap();

    let mut received = Vec::new();
    for round in 0..3 {
        let mut writer = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        writeln!(writer, "round {round}").unwrap();
        drop(writer);

        source.poll(&mut received).unwrap();
        assert_eq!(source.poll(&mut received).unwrap(), PollStatus::Idle);
    }
    assert_eq!(received.len(), 3);
    assert_eq!(received[2].payload, "round 2");
    assert_eq!(source.state(), DriverState::Running);
}

#[test]
fn pipe_source_in_missing_directory_needs_create_dirs() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("spool").join("in.fifo");
    let cfg = config();

    let mut plain = FileSourceDriver::pipe(&path, &cfg);
    let err = plain.init(&cfg).unwrap_err();
    assert!(matches!(err, SourceError::Initialization { .. }));
    assert!(matches!(err.root_cause(), SourceError::Filesystem { .. }));

    let mut creating = FileSourceDriver::pipe(&path, &cfg);
    creating.set_create_dirs(true);
    creating.init(&cfg).unwrap();
    assert!(std::fs::metadata(&path).unwrap().file_type().is_fifo());
}
