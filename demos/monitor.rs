//! # Demo: simulated desk reader
//!
//! A fake reader cycles through three cards:
//! - `04A1B2C3` rests on the reader and is on the allow list → `card_success`
//! - `0411AA00` is not on the allow list → `card_unauthorized`
//! - `04FF00AA` is pulled while the (slow) check runs → `card_processing_cancelled`
//!
//! Run with:
//! ```text
//! RUST_LOG=info,cardwatch=debug cargo run --example monitor --features logging
//! ```
//! Set `CARDWATCH_URL` to validate against a real form-post endpoint instead
//! of the built-in allow list. Stop with Ctrl-C; the demo also stops itself
//! after one round.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

use cardwatch::{
    CardMonitor, CardReader, Config, EventKind, LogWriter, ReaderError, ServiceRef, Subscribe,
    Uid, ValidateFn, ValidationError,
};

/// Presents a fixed schedule of cards, measured from construction.
struct DeskReader {
    start: Instant,
    schedule: Vec<(Duration, Duration, Uid)>,
}

impl DeskReader {
    fn new() -> anyhow::Result<Self> {
        let ms = Duration::from_millis;
        Ok(Self {
            start: Instant::now(),
            schedule: vec![
                (ms(500), ms(2_000), Uid::parse("04A1B2C3")?),
                (ms(3_000), ms(3_600), Uid::parse("0411AA00")?),
                (ms(4_000), ms(4_400), Uid::parse("04FF00AA")?),
            ],
        })
    }
}

#[async_trait]
impl CardReader for DeskReader {
    async fn connect(&mut self) -> Result<(), ReaderError> {
        Ok(())
    }

    async fn read_uid(&mut self) -> Result<Option<Uid>, ReaderError> {
        let t = self.start.elapsed();
        Ok(self
            .schedule
            .iter()
            .find(|(from, to, _)| (*from..*to).contains(&t))
            .map(|(_, _, uid)| uid.clone()))
    }

    async fn close(&mut self) {
        println!("[desk] reader closed");
    }

    fn name(&self) -> &str {
        "desk"
    }
}

fn allow_list() -> ServiceRef {
    ValidateFn::arc("allow-list", |uid: Uid| async move {
        // 04FF00AA hits a slow backend so it can be pulled mid-check
        let delay = if uid.as_str() == "04FF00AA" { 2_500 } else { 150 };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok::<_, ValidationError>(uid.as_str() != "0411AA00")
    })
}

#[cfg(feature = "http")]
fn service() -> anyhow::Result<ServiceRef> {
    use cardwatch::{HttpValidator, HttpValidatorConfig};

    match std::env::var("CARDWATCH_URL") {
        Ok(url) => Ok(Arc::new(HttpValidator::new(HttpValidatorConfig::new(url))?)),
        Err(_) => Ok(allow_list()),
    }
}

#[cfg(not(feature = "http"))]
fn service() -> anyhow::Result<ServiceRef> {
    Ok(allow_list())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let monitor = CardMonitor::builder(Config::default())
        .with_subscribers(subs)
        .build();
    let handle = monitor.handle();

    let mut events = handle.subscribe();
    let watcher = handle.clone();
    tokio::spawn(async move {
        let mut terminals = 0;
        while let Ok(ev) = events.recv().await {
            if ev.kind.is_terminal() {
                println!("[push] {} {}", ev.name(), ev.payload());
                terminals += 1;
            }
            if terminals == 3 || ev.kind == EventKind::ShutdownRequested {
                break;
            }
        }
        tokio::time::sleep(Duration::from_secs(3)).await;
        watcher.stop();
    });

    monitor.run(DeskReader::new()?, service()?).await?;
    println!("[demo] stopped cleanly");
    Ok(())
}
