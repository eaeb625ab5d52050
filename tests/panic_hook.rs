//! The process panic hook must leave the terminal alone when a task worker
//! panics; the worker recovers on its own and the UI keeps running.
//!
//! One test per binary: the hook is process-wide.
#![cfg(feature = "tui")]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use browsepilot::engine::LogSink;
use browsepilot::tui::install_panic_hook_with;
use browsepilot::{Engine, EngineConfig, EngineError, EngineFactory, TaskCoordinator};
use tokio::sync::mpsc;

static RESTORES: AtomicUsize = AtomicUsize::new(0);

struct ExplodingFactory;

#[async_trait]
impl EngineFactory for ExplodingFactory {
    async fn create(
        &self,
        _config: &EngineConfig,
        _sink: LogSink,
    ) -> Result<Box<dyn Engine>, EngineError> {
        panic!("engine blew up");
    }
}

#[test]
fn test_only_ui_side_panics_restore_the_terminal() {
    install_panic_hook_with(|| {
        RESTORES.fetch_add(1, Ordering::SeqCst);
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut coord = TaskCoordinator::new(Arc::new(ExplodingFactory), EngineConfig::default(), tx);
    coord.start("crash").unwrap();

    let completion = rx.blocking_recv().unwrap();
    assert_eq!(completion.result.chat_response, "System error in worker thread.");
    assert_eq!(completion.result.final_output, "Failed: engine blew up");
    assert_eq!(RESTORES.load(Ordering::SeqCst), 0);

    let ui = std::thread::Builder::new()
        .name("ui".into())
        .spawn(|| panic!("ui went down"))
        .unwrap();
    assert!(ui.join().is_err());
    assert_eq!(RESTORES.load(Ordering::SeqCst), 1);

    let _ = std::panic::take_hook();
}
