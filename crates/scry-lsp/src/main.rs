use std::io::BufReader;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use scry_cache::IndexCache;
use scry_config::ScryConfig;
use scry_lsp::codec;
use scry_lsp::out::StdoutWriter;
use scry_lsp::provider::{CacheReplayProvider, EmptyTranslationUnitHost};
use scry_lsp::rpc::{self, RpcError};
use scry_lsp::server::{handle_notification, handle_request, LoopAction, ServerState};

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        eprintln!(
            "scry-lsp {version}\n\nUsage:\n  scry-lsp [--stdio]\n\nLogging goes to stderr; set SCRY_LOG (e.g. SCRY_LOG=scry.index=debug).",
            version = env!("CARGO_PKG_VERSION")
        );
        return Ok(());
    }

    // stdout carries the protocol; logs must stay on stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SCRY_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ScryConfig::default();
    let cache = Arc::new(IndexCache::new(&config.cache_directory, config.cache_format));
    let provider = Arc::new(CacheReplayProvider::new(Arc::clone(&cache)));
    let host = Arc::new(EmptyTranslationUnitHost);

    let (out, out_handle) = StdoutWriter::spawn();
    let out = Arc::new(out);
    let state = ServerState::new(config, provider, host, Arc::clone(&out));

    let stdin = std::io::stdin();
    let mut reader = BufReader::new(stdin.lock());

    let mut workers = None;

    loop {
        let body = match codec::read_message(&mut reader) {
            Ok(Some(body)) => body,
            Ok(None) => break,
            Err(err) => {
                // A desynchronized input stream cannot be recovered.
                tracing::error!(target: "scry.lsp", error = %err, "fatal framing error");
                out.show_message(
                    scry_lsp::out::MessageKind::Error,
                    &format!("scry is shutting down: {err}"),
                );
                std::process::exit(1);
            }
        };

        let incoming = match rpc::parse_message(&body) {
            Ok(incoming) => incoming,
            Err(RpcError::NoMethod) => continue,
            Err(err) => {
                tracing::error!(target: "scry.lsp", error = %err, "fatal protocol error");
                std::process::exit(1);
            }
        };

        match incoming.id {
            Some(id) => {
                let is_initialize = incoming.method == "initialize";
                if let Some(response) =
                    handle_request(&state, id, &incoming.method, &incoming.params)
                {
                    out.send(&response);
                }
                if is_initialize && workers.is_none() {
                    let indexer_threads = state
                        .config
                        .read()
                        .unwrap_or_else(|e| e.into_inner())
                        .effective_index_threads();
                    workers = Some((
                        Arc::clone(&state.pipeline).start(indexer_threads),
                        Arc::clone(&state.completion).start(),
                    ));
                }
            }
            None => {
                if handle_notification(&state, &incoming.method, &incoming.params)
                    == LoopAction::Exit
                {
                    break;
                }
            }
        }
    }

    // Drain workers before the database goes away.
    state.pipeline.stop();
    state.completion.stop();
    if let Some((pipeline_threads, completion_threads)) = workers {
        pipeline_threads.join();
        completion_threads.join();
    }
    out.shutdown();
    let _ = out_handle.join();

    Ok(())
}
