use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use dataplugin_core::{Location, Settings};
use dataplugin_sync::{
    run, Action, ArchiveSink, Orchestrator, SyncError, Tone, Transport, Transports,
};
use tempfile::TempDir;

const LEDGER: &str = "[pytest]\ndataplugin-signature = \n";

fn workspace(ledger: Option<&str>) -> TempDir {
    let tmp = TempDir::new().expect("tmp");
    let data = tmp.path().join("data");
    fs::create_dir_all(data.join("nested")).expect("mkdir");
    fs::write(data.join("test-data-file.txt"), "test data content").expect("write");
    fs::write(data.join("nested/inner.txt"), "inner").expect("write");
    if let Some(text) = ledger {
        fs::write(tmp.path().join("pytest.ini"), text).expect("write ledger");
    }
    tmp
}

fn settings(root: &Path) -> Settings {
    Settings::load_at(root, None).expect("settings")
}

fn recorded_signature(root: &Path) -> Option<String> {
    settings(root).signature
}

// ---------------------------------------------------------------------------
// create / extract
// ---------------------------------------------------------------------------

#[test]
fn create_reports_name_and_hash() {
    let tmp = workspace(None);
    let s = settings(tmp.path());
    let outcome = run(Action::Create, &s);

    assert!(outcome.is_success(), "{:?}", outcome.lines);
    let texts = outcome.texts();
    assert_eq!(texts.len(), 2);
    assert_eq!(
        texts[0],
        format!(
            "Creating archive test-data.tar.gz from directory {}",
            tmp.path().join("data").display()
        )
    );
    assert!(
        texts[1].starts_with("Archive created, name is test-data.tar.gz and hash is "),
        "{}",
        texts[1]
    );
    assert_eq!(outcome.lines[0].tone, Tone::Info);
    assert_eq!(outcome.lines[1].tone, Tone::Success);
    assert!(tmp.path().join(".test-data.tar.gz").is_file());
}

#[test]
fn create_without_directory_fails_with_one_line() {
    let tmp = TempDir::new().expect("tmp");
    let s = settings(tmp.path());
    let outcome = run(Action::Create, &s);

    assert_eq!(outcome.code, 1);
    assert_eq!(
        outcome.texts(),
        [format!(
            "Directory does not exist {}",
            tmp.path().join("data").display()
        )]
    );
    assert_eq!(outcome.lines[0].tone, Tone::Failure);
    assert!(!tmp.path().join(".test-data.tar.gz").exists());
}

#[test]
fn extract_restores_data_and_reports_hash() {
    let tmp = workspace(None);
    let s = settings(tmp.path());
    assert!(run(Action::Create, &s).is_success());

    fs::remove_dir_all(tmp.path().join("data")).expect("rm data");
    let outcome = run(Action::Extract, &s);

    assert!(outcome.is_success(), "{:?}", outcome.lines);
    assert!(outcome.texts()[0].starts_with("Extracted archive test-data.tar.gz with hash "));
    assert_eq!(
        fs::read_to_string(tmp.path().join("data/nested/inner.txt")).expect("read"),
        "inner"
    );
}

#[test]
fn extract_without_archive_fails() {
    let tmp = workspace(None);
    let outcome = run(Action::Extract, &settings(tmp.path()));
    assert_eq!(outcome.code, 1);
    assert!(outcome.texts()[0].starts_with("extract failed: "), "{:?}", outcome.texts());
}

// ---------------------------------------------------------------------------
// upload / verify
// ---------------------------------------------------------------------------

#[test]
fn upload_without_ledger_is_refused() {
    let tmp = workspace(None);
    let s = settings(tmp.path());
    assert!(run(Action::Create, &s).is_success());

    let outcome = run(Action::Upload, &s);
    assert_eq!(outcome.code, 1);
    assert_eq!(outcome.texts(), ["No ini file configured."]);
    assert!(!tmp.path().join("test-data.tar.gz").exists());
}

#[test]
fn upload_without_signature_line_is_refused() {
    let tmp = workspace(Some("[pytest]\naddopts = -q\n"));
    let s = settings(tmp.path());
    assert!(run(Action::Create, &s).is_success());

    let outcome = run(Action::Upload, &s);
    assert_eq!(outcome.code, 1);
    assert_eq!(
        outcome.texts(),
        [format!(
            "Signature not found in ini file {}",
            tmp.path().join("pytest.ini").display()
        )]
    );
    assert!(!tmp.path().join("test-data.tar.gz").exists());
}

#[test]
fn upload_publishes_archive_and_records_signature() {
    let tmp = workspace(Some(LEDGER));
    let s = settings(tmp.path());
    assert!(run(Action::Create, &s).is_success());

    let outcome = run(Action::Upload, &s);
    assert!(outcome.is_success(), "{:?}", outcome.lines);
    let texts = outcome.texts();
    assert_eq!(texts[0], "Storing local archive: test-data.tar.gz");
    assert!(texts[1].starts_with("Uploaded archive test-data.tar.gz with hash "));
    assert_eq!(
        texts[2],
        "Signature updated, you may want to commit the changes too: pytest.ini"
    );

    assert_eq!(
        fs::read(tmp.path().join("test-data.tar.gz")).expect("published"),
        fs::read(tmp.path().join(".test-data.tar.gz")).expect("working")
    );
    let hash = texts[1].rsplit(' ').next().expect("hash");
    assert_eq!(recorded_signature(tmp.path()).as_deref(), Some(hash));
}

#[test]
fn verify_passes_after_upload_and_fails_after_change() {
    let tmp = workspace(Some(LEDGER));
    let s = settings(tmp.path());
    assert!(run(Action::Create, &s).is_success());
    assert!(run(Action::Upload, &s).is_success());

    let reloaded = settings(tmp.path());
    let passed = run(Action::Verify, &reloaded);
    assert_eq!(passed.code, 0);
    assert_eq!(passed.texts(), ["Archive passed verification :)"]);

    fs::write(tmp.path().join("data/test-data-file.txt"), "changed").expect("rewrite");
    assert!(run(Action::Create, &reloaded).is_success());
    let failed = run(Action::Verify, &reloaded);
    assert_eq!(failed.code, 1);
    assert_eq!(failed.texts(), ["Archive failed verification!"]);
}

#[test]
fn verify_with_empty_signature_fails() {
    let tmp = workspace(Some(LEDGER));
    let s = settings(tmp.path());
    assert!(run(Action::Create, &s).is_success());
    let outcome = run(Action::Verify, &s);
    assert_eq!(outcome.texts(), ["Archive failed verification!"]);
}

// ---------------------------------------------------------------------------
// download
// ---------------------------------------------------------------------------

#[test]
fn download_replaces_working_archive() {
    let tmp = workspace(Some(LEDGER));
    let s = settings(tmp.path());
    fs::write(tmp.path().join("test-data.tar.gz"), b"published bytes").expect("seed");

    let outcome = run(Action::Download, &s);
    assert!(outcome.is_success(), "{:?}", outcome.lines);
    assert_eq!(
        outcome.texts(),
        ["Storing local archive: test-data.tar.gz", "file downloaded"]
    );
    assert_eq!(
        fs::read(tmp.path().join(".test-data.tar.gz")).expect("working"),
        b"published bytes"
    );
    assert!(!tmp.path().join("..test-data.tar.gz.partial").exists());
}

#[test]
fn download_without_ledger_is_refused() {
    let tmp = workspace(None);
    fs::write(tmp.path().join("test-data.tar.gz"), b"x").expect("seed");
    let outcome = run(Action::Download, &settings(tmp.path()));
    assert_eq!(outcome.texts(), ["No ini file configured."]);
    assert!(!tmp.path().join(".test-data.tar.gz").exists());
}

#[test]
fn file_url_location_is_local() {
    let tmp = workspace(Some(LEDGER));
    let store = tmp.path().join("store");
    let url = format!("file://{}", store.join("bundle.tar.gz").display());
    let s = settings(tmp.path()).with_location(url).expect("location");
    assert!(run(Action::Create, &s).is_success());

    let outcome = run(Action::Upload, &s);
    assert!(outcome.is_success(), "{:?}", outcome.lines);
    assert!(store.join("bundle.tar.gz").is_file());
}

// ---------------------------------------------------------------------------
// pluggable transports
// ---------------------------------------------------------------------------

type Store = Rc<RefCell<BTreeMap<String, Vec<u8>>>>;

struct MemoryTransport {
    store: Store,
}

struct MemorySink {
    store: Store,
    key: String,
    buf: Vec<u8>,
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ArchiveSink for MemorySink {
    fn commit(self: Box<Self>) -> io::Result<()> {
        self.store.borrow_mut().insert(self.key, self.buf);
        Ok(())
    }
}

fn key(location: &Location) -> String {
    location.to_string()
}

impl Transport for MemoryTransport {
    fn open_read(&self, location: &Location) -> Result<Box<dyn Read>, SyncError> {
        let bytes = self.store.borrow().get(&key(location)).cloned().ok_or_else(|| {
            SyncError::Io {
                path: PathBuf::from(key(location)),
                source: io::Error::from(io::ErrorKind::NotFound),
            }
        })?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn open_write(&self, location: &Location) -> Result<Box<dyn ArchiveSink>, SyncError> {
        Ok(Box::new(MemorySink {
            store: Rc::clone(&self.store),
            key: key(location),
            buf: Vec::new(),
        }))
    }
}

#[test]
fn registered_scheme_round_trips_through_transport() {
    let tmp = workspace(Some(LEDGER));
    let s = settings(tmp.path())
        .with_location("mem://bucket/fixtures/test-data.tar.gz")
        .expect("location");
    let store = Store::default();
    let orchestrator = Orchestrator::with_transports(
        &s,
        Transports::local_only().with(
            "mem",
            Box::new(MemoryTransport {
                store: Rc::clone(&store),
            }),
        ),
    );

    assert!(orchestrator.run(Action::Create).is_success());
    let uploaded = orchestrator.run(Action::Upload);
    assert!(uploaded.is_success(), "{:?}", uploaded.lines);
    assert_eq!(
        uploaded.texts()[0],
        "Transferring archive: mem://bucket/fixtures/test-data.tar.gz"
    );
    let published = store
        .borrow()
        .get("mem://bucket/fixtures/test-data.tar.gz")
        .cloned()
        .expect("stored");

    fs::remove_file(s.working_archive()).expect("rm working");
    assert!(orchestrator.run(Action::Download).is_success());
    assert_eq!(fs::read(s.working_archive()).expect("working"), published);
}

#[test]
fn unregistered_scheme_fails_before_any_transfer() {
    let tmp = workspace(Some(LEDGER));
    let s = settings(tmp.path())
        .with_location("s3://bucket/test-data.tar.gz")
        .expect("location");
    assert!(run(Action::Create, &s).is_success());

    let outcome = run(Action::Upload, &s);
    assert_eq!(outcome.code, 1);
    assert_eq!(outcome.lines.len(), 1);
    assert!(
        outcome.texts()[0].starts_with("upload failed: unsupported location"),
        "{:?}",
        outcome.texts()
    );
    assert_eq!(recorded_signature(tmp.path()).as_deref(), Some(""));
}

// ---------------------------------------------------------------------------
// noop / serialization
// ---------------------------------------------------------------------------

#[test]
fn noop_does_nothing() {
    let tmp = workspace(Some(LEDGER));
    let outcome = run(Action::Noop, &settings(tmp.path()));
    assert_eq!(outcome.code, 0);
    assert!(outcome.lines.is_empty());
    assert!(!tmp.path().join(".test-data.tar.gz").exists());
}

#[test]
fn outcome_serializes_with_lowercase_names() {
    let tmp = TempDir::new().expect("tmp");
    let outcome = run(Action::Create, &settings(tmp.path()));
    let json = serde_json::to_value(&outcome).expect("json");
    assert_eq!(json["action"], "create");
    assert_eq!(json["code"], 1);
    assert_eq!(json["lines"][0]["tone"], "failure");
}
