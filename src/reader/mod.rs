//! # Reader adapter boundary.
//!
//! The [`CardReader`] trait is everything the core needs from hardware:
//! connect, read one uid, close. Driver discovery, vendor fallbacks and
//! APDU details live in the adapter.
//!
//! The poller is the **only** owner of a reader (it takes it by value), so
//! implementations never see concurrent calls.
//!
//! # Example
//! ```
//! use async_trait::async_trait;
//! use cardwatch::{CardReader, ReaderError, Uid};
//!
//! struct FixedCard(Uid);
//!
//! #[async_trait]
//! impl CardReader for FixedCard {
//!     async fn connect(&mut self) -> Result<(), ReaderError> { Ok(()) }
//!     async fn read_uid(&mut self) -> Result<Option<Uid>, ReaderError> {
//!         Ok(Some(self.0.clone()))
//!     }
//!     async fn close(&mut self) {}
//! }
//! ```

use async_trait::async_trait;

use crate::card::Uid;
use crate::error::ReaderError;

/// Hardware access used by the poller.
///
/// ### Implementation requirements
/// - `connect` must be safe to call on every tick; reconnect policy inside
///   the adapter is its own business.
/// - `read_uid` returns `Ok(None)` when no card is present. That is the
///   normal idle state, not an error.
/// - Blocking drivers should hop to `tokio::task::spawn_blocking` internally.
#[async_trait]
pub trait CardReader: Send + 'static {
    /// Opens (or re-checks) the connection to the device.
    async fn connect(&mut self) -> Result<(), ReaderError>;

    /// Reads the uid of the presented card, if any.
    async fn read_uid(&mut self) -> Result<Option<Uid>, ReaderError>;

    /// Releases the device. Errors are the adapter's to log.
    async fn close(&mut self);

    /// Name used in logs.
    fn name(&self) -> &str {
        "reader"
    }
}
