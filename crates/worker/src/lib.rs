pub mod danbooru;
pub mod jobs;
pub mod source;
pub mod sync;
pub mod transport;
pub mod wake;

pub use danbooru::DanbooruClient;
pub use source::Source;
pub use sync::{SyncConfig, SyncWorker};
pub use transport::{Transport, TransportError};
pub use wake::{wake_signal, Wake, WakeReceiver, WakeSignal};

#[cfg(test)]
mod testing;
