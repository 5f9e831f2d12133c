mod error;
mod memory_store;
mod poller;
mod price_client;
mod price_store;
mod types;

pub use error::{FetchError, PollerError, StoreError};
pub use memory_store::MemoryPriceStore;
pub use poller::{Poller, PollerConfig, TickReport};
pub use price_client::{PriceClient, PriceSource, parse_observed_at, parse_quote};
pub use price_store::{PriceStore, RedisPriceStore};
pub use types::{Observation, Price, SymbolId};

pub use tokio_util::sync::CancellationToken;
