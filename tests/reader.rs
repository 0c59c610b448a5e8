use rdp_ingest::{
    CharDevice, Exit, Reader, ReaderError, ReaderSettings, ReaderState, Record, RecordSource, ValueFilter,
    ValueStore,
};
use std::io::{self, Write};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Produces a fresh timestamp on every read; never runs dry.
struct Counter(AtomicU64);

impl RecordSource for Counter {
    fn read_record(&self) -> io::Result<Vec<u8>> {
        let time = self.0.fetch_add(1, Ordering::SeqCst);
        Ok(Record { time, type_id: 1, value: time as f32 }.encode().to_vec())
    }

    fn describe(&self) -> String {
        "counter".to_string()
    }
}

/// Replays the same records forever, like a looping device.
struct Replay {
    records: Vec<Record>,
    next: AtomicU64,
}

impl RecordSource for Replay {
    fn read_record(&self) -> io::Result<Vec<u8>> {
        let i = self.next.fetch_add(1, Ordering::SeqCst) as usize % self.records.len();
        Ok(self.records[i].encode().to_vec())
    }

    fn describe(&self) -> String {
        "replay".to_string()
    }
}

fn fast(seed_demo_devices: bool) -> ReaderSettings {
    ReaderSettings {
        interval: Duration::from_millis(1),
        progress_every: NonZeroU32::new(5).unwrap(),
        seed_demo_devices,
    }
}

fn wait_for(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn stop_joins_the_worker_and_writes_cease() {
    let store = Arc::new(ValueStore::open_in_memory().unwrap());
    let mut reader = Reader::new(Arc::clone(&store), Arc::new(Counter(AtomicU64::new(0))), fast(true));

    reader.start().unwrap();
    let summary = reader.stop().expect("worker was started");
    assert_eq!(summary.exit, Exit::Cancelled);
    assert_eq!(reader.state(), ReaderState::Stopped);

    let after_stop = store.count_values().unwrap();
    assert_eq!(after_stop as u64, summary.inserted);
    thread::sleep(Duration::from_millis(30));
    assert_eq!(store.count_values().unwrap(), after_stop);
}

#[test]
fn running_reader_stores_values_until_stopped() {
    let store = Arc::new(ValueStore::open_in_memory().unwrap());
    let mut reader = Reader::new(Arc::clone(&store), Arc::new(Counter(AtomicU64::new(0))), fast(true));

    reader.start().unwrap();
    assert_eq!(reader.state(), ReaderState::Running);
    wait_for(|| store.count_values().unwrap() >= 12);
    let summary = reader.stop().unwrap();

    assert_eq!(summary.exit, Exit::Cancelled);
    assert!(summary.inserted >= 12);
    assert_eq!(summary.iterations, summary.inserted + summary.skipped);
    // every value went to one of the seeded demo devices
    let ids = store.list_device_ids().unwrap();
    assert_eq!(ids.len(), 2);
    let values = store.query_values(&ValueFilter::default()).unwrap();
    assert!(values.iter().all(|v| v.device_id.is_some_and(|d| ids.contains(&d))));
}

#[test]
fn replayed_source_ends_the_run() {
    let store = Arc::new(ValueStore::open_in_memory().unwrap());
    let device = store.create_device("only", None, None).unwrap();
    let source = Replay {
        records: vec![
            Record { time: 1, type_id: 1, value: 0.5 },
            Record { time: 2, type_id: 1, value: 0.6 },
            Record { time: 2, type_id: 2, value: 40.0 },
        ],
        next: AtomicU64::new(0),
    };
    let mut reader = Reader::new(Arc::clone(&store), Arc::new(source), fast(false));

    reader.start().unwrap();
    let summary = reader.wait().unwrap();
    assert_eq!(summary.exit, Exit::Exhausted);
    assert_eq!(summary.inserted, 3);
    assert_eq!(reader.state(), ReaderState::Stopped);
    assert_eq!(store.values_for_device(device.id).unwrap().len(), 3);

    // a restart hits the duplicate straight away
    reader.start().unwrap();
    let again = reader.wait().unwrap();
    assert_eq!((again.exit, again.inserted), (Exit::Exhausted, 0));
}

#[test]
fn second_start_is_rejected_while_running() {
    let store = Arc::new(ValueStore::open_in_memory().unwrap());
    let mut reader = Reader::new(store, Arc::new(Counter(AtomicU64::new(0))), fast(true));

    reader.start().unwrap();
    assert!(matches!(reader.start(), Err(ReaderError::AlreadyRunning)));
    assert!(reader.stop().is_some());
    assert!(reader.stop().is_none());
}

#[test]
fn no_devices_keeps_the_loop_alive() {
    let store = Arc::new(ValueStore::open_in_memory().unwrap());
    let mut reader = Reader::new(Arc::clone(&store), Arc::new(Counter(AtomicU64::new(0))), fast(false));

    reader.start().unwrap();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(reader.state(), ReaderState::Running);
    let summary = reader.stop().unwrap();

    assert_eq!(summary.exit, Exit::Cancelled);
    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.skipped, summary.iterations);
    assert_eq!(store.count_values().unwrap(), 0);
}

#[test]
fn devices_deleted_mid_run_do_not_stop_ingestion() {
    let store = Arc::new(ValueStore::open_in_memory().unwrap());
    let mut reader = Reader::new(Arc::clone(&store), Arc::new(Counter(AtomicU64::new(0))), fast(true));

    reader.start().unwrap();
    wait_for(|| store.count_values().unwrap() >= 3);
    let first = store.list_device_ids().unwrap()[0];
    store.delete_device(first).unwrap();
    let before = store.count_values().unwrap();
    wait_for(|| store.count_values().unwrap() >= before + 3);
    let summary = reader.stop().unwrap();

    assert_eq!(summary.exit, Exit::Cancelled);
    assert!(store.values_for_device(first).is_err());
}

#[test]
fn char_device_with_one_record_is_exhausted() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&Record { time: 10, type_id: 5, value: 1.0 }.encode()).unwrap();
    file.flush().unwrap();

    let store = Arc::new(ValueStore::open_in_memory().unwrap());
    let mut reader = Reader::new(Arc::clone(&store), Arc::new(CharDevice::new(file.path())), fast(true));

    reader.start().unwrap();
    let summary = reader.wait().unwrap();
    assert_eq!(summary.exit, Exit::Exhausted);
    // the same record can land once per demo device at most
    assert!((1..=2).contains(&summary.inserted));
    assert_eq!(store.count_values().unwrap() as u64, summary.inserted);
    assert_eq!(store.get_value_type(5).unwrap().type_unit, "UNIT_5");
}
