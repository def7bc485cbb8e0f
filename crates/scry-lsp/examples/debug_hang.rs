use std::sync::Arc;

use scry_lsp::out::StdoutWriter;
use scry_lsp::provider::EmptyTranslationUnitHost;
use scry_lsp::rpc::RequestId;
use scry_lsp::server::{handle_request, ServerState};
use scry_pipeline::IndexProvider;
use scry_core::AbsPath;

struct P;
impl IndexProvider for P {
    fn index(&self, path: &AbsPath, _a: &[String], _c: Option<&str>) -> scry_pipeline::Result<Vec<scry_index::IndexFile>> {
        Ok(vec![scry_index::IndexFile::new(path.clone())])
    }
}

fn main() {
    eprintln!("step: spawning out writer");
    let (out, _out_thread) = StdoutWriter::spawn();
    eprintln!("step: out writer spawned");
    let state = ServerState::new(
        scry_config::ScryConfig {
            cache_directory: std::env::temp_dir().join("scry-debug").to_string_lossy().into_owned(),
            ..scry_config::ScryConfig::default()
        },
        Arc::new(P) as Arc<dyn IndexProvider>,
        Arc::new(EmptyTranslationUnitHost),
        Arc::new(out),
    );
    eprintln!("step: state created");
    let response = handle_request(
        &state,
        RequestId::Str(9),
        "textDocument/somethingNew",
        &serde_json::json!({}),
    );
    eprintln!("step: handle_request returned: {:?}", response);
}
