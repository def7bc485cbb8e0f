//! Pipeline integration: drive the stages by hand with a fake parser and
//! watch a file go from request to applied.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use scry_cache::{CacheFormat, IndexCache};
use scry_core::{AbsPath, Position, Range, Role, Usr};
use scry_index::{IndexFile, LocalRef};
use scry_pipeline::{ImportStatus, IndexProvider, Pipeline};
use scry_query::QueryDatabase;

/// Parser stand-in: serves whatever `IndexFile` the test registered for a
/// path.
#[derive(Default)]
struct FakeProvider {
    responses: Mutex<std::collections::HashMap<AbsPath, IndexFile>>,
    parse_count: AtomicUsize,
}

impl FakeProvider {
    fn set_response(&self, index: IndexFile) {
        let mut responses = self.responses.lock().unwrap();
        responses.insert(index.path.clone(), index);
    }

    fn parses(&self) -> usize {
        self.parse_count.load(Ordering::SeqCst)
    }
}

impl IndexProvider for FakeProvider {
    fn index(
        &self,
        path: &AbsPath,
        _args: &[String],
        contents: Option<&str>,
    ) -> scry_pipeline::Result<Vec<IndexFile>> {
        self.parse_count.fetch_add(1, Ordering::SeqCst);
        if contents == Some("") {
            // Deleted file: an empty index removes everything it defined.
            return Ok(vec![IndexFile::new(path.clone())]);
        }
        let responses = self.responses.lock().unwrap();
        responses
            .get(path)
            .cloned()
            .map(|index| vec![index])
            .ok_or_else(|| scry_pipeline::IndexError::Parse(format!("no fixture for {path}")))
    }
}

struct Fixture {
    pipeline: Arc<Pipeline>,
    provider: Arc<FakeProvider>,
    db: Arc<RwLock<QueryDatabase>>,
    applied: Arc<Mutex<Vec<AbsPath>>>,
    _cache_dir: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let cache_dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(IndexCache::new(cache_dir.path(), CacheFormat::Json));
    let provider = Arc::new(FakeProvider::default());
    let db = Arc::new(RwLock::new(QueryDatabase::new()));
    let applied = Arc::new(Mutex::new(Vec::new()));

    let applied_sink = Arc::clone(&applied);
    let pipeline = Arc::new(Pipeline::new(
        Arc::clone(&provider) as Arc<dyn IndexProvider>,
        cache,
        Arc::clone(&db),
        Box::new(move |paths| {
            applied_sink.lock().unwrap().extend(paths.iter().cloned());
        }),
    ));

    Fixture {
        pipeline,
        provider,
        db,
        applied,
        _cache_dir: cache_dir,
    }
}

/// Runs indexer and querydb rounds until every queue is drained.
fn pump(pipeline: &Pipeline) {
    while pipeline.queues().has_work() {
        while pipeline.indexer_round() {}
        while pipeline.querydb_round() {}
    }
}

fn func_index(path: &str, use_line: u32, mtime: i64) -> IndexFile {
    let mut index = IndexFile::new(AbsPath::new(path));
    index.last_modification_time = mtime;
    let f = index.func_id(Usr::from_string("c:@F@foo#"));
    let func = index.resolve_func(f);
    func.def.detailed_name = "void foo()".to_string();
    func.def.short_name_offset = 5;
    func.def.short_name_size = 3;
    func.def.spell = Some(LocalRef::plain(
        Range::new(Position::new(0, 5), Position::new(0, 8)),
        Role::DEFINITION,
    ));
    func.uses.push(LocalRef::plain(
        Range::new(Position::new(use_line, 0), Position::new(use_line, 3)),
        Role::CALL,
    ));
    index
}

#[test]
fn initial_import_reaches_the_database() {
    let fixture = fixture();
    let path = AbsPath::new("/src/foo.cc");
    fixture.provider.set_response(func_index("/src/foo.cc", 3, 1));

    fixture
        .pipeline
        .request_index(path.clone(), Vec::new(), true, Some("void foo();".into()));
    assert_eq!(
        fixture.pipeline.import_manager().status(&path),
        ImportStatus::ProcessingInitialImport
    );

    pump(&fixture.pipeline);

    let db = fixture.db.read().unwrap();
    assert_eq!(db.funcs.len(), 1);
    assert_eq!(db.funcs[0].uses.len(), 1);
    assert_eq!(db.funcs[0].uses[0].range.start.line, 3);
    assert!(db.file_for_path(&path).unwrap().def.is_some());
    drop(db);

    assert_eq!(
        fixture.pipeline.import_manager().status(&path),
        ImportStatus::Imported
    );
    assert_eq!(fixture.applied.lock().unwrap().as_slice(), &[path]);
}

#[test]
fn reindex_diffs_against_the_cached_previous_version() {
    let fixture = fixture();
    let path = AbsPath::new("/src/foo.cc");

    fixture.provider.set_response(func_index("/src/foo.cc", 3, 1));
    fixture
        .pipeline
        .request_index(path.clone(), Vec::new(), true, Some("x".into()));
    pump(&fixture.pipeline);

    // Second version moves the use from line 3 to line 9.
    fixture.provider.set_response(func_index("/src/foo.cc", 9, 2));
    fixture
        .pipeline
        .request_index(path.clone(), Vec::new(), true, Some("y".into()));
    pump(&fixture.pipeline);

    let db = fixture.db.read().unwrap();
    assert_eq!(db.funcs.len(), 1, "ids are stable across reindexes");
    assert_eq!(db.funcs[0].uses.len(), 1, "old use was removed by the delta");
    assert_eq!(db.funcs[0].uses[0].range.start.line, 9);
}

#[test]
fn deleting_a_file_clears_its_contribution() {
    let fixture = fixture();
    let path = AbsPath::new("/src/foo.cc");

    fixture.provider.set_response(func_index("/src/foo.cc", 3, 1));
    fixture
        .pipeline
        .request_index(path.clone(), Vec::new(), false, Some("x".into()));
    pump(&fixture.pipeline);

    // A watched-file delete is a reindex with empty contents.
    fixture
        .pipeline
        .request_index(path.clone(), Vec::new(), false, Some(String::new()));
    pump(&fixture.pipeline);

    let db = fixture.db.read().unwrap();
    assert_eq!(db.funcs.len(), 1, "slot is tombstoned, not freed");
    assert!(db.funcs[0].def.is_empty());
    assert!(db.funcs[0].uses.is_empty());
}

#[test]
fn unchanged_mtime_skips_the_parse() {
    let fixture = fixture();

    // Use a real on-disk file so the mtime probe works.
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("real.cc");
    std::fs::write(&file_path, "void foo();\n").unwrap();
    let path = AbsPath::new(&file_path);
    let mtime = scry_pipeline::file_modification_time(&path).expect("file exists");

    fixture
        .provider
        .set_response(func_index(path.as_str(), 3, mtime));

    fixture
        .pipeline
        .request_index(path.clone(), Vec::new(), false, None);
    pump(&fixture.pipeline);
    assert_eq!(fixture.provider.parses(), 1);

    // Same mtime: the request completes without touching the parser.
    fixture
        .pipeline
        .request_index(path.clone(), Vec::new(), false, None);
    pump(&fixture.pipeline);
    assert_eq!(fixture.provider.parses(), 1);
    assert_eq!(
        fixture.pipeline.import_manager().status(&path),
        ImportStatus::Imported
    );
}

#[test]
fn threaded_pipeline_applies_in_background() {
    let fixture = fixture();
    let path = AbsPath::new("/src/foo.cc");
    fixture.provider.set_response(func_index("/src/foo.cc", 3, 1));

    let threads = Arc::clone(&fixture.pipeline).start(2);
    fixture
        .pipeline
        .request_index(path.clone(), Vec::new(), true, Some("x".into()));

    // Wait (bounded) for the apply callback.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        if fixture.applied.lock().unwrap().contains(&path) {
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "pipeline did not apply within the deadline"
        );
        std::thread::sleep(std::time::Duration::from_millis(5));
    }

    fixture.pipeline.stop();
    threads.join();

    let db = fixture.db.read().unwrap();
    assert_eq!(db.funcs.len(), 1);
}
