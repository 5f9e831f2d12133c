use std::sync::Arc;

use coin::{Poller, PriceStore};

pub mod command;
pub mod config;

pub struct Data {
    pub poller: Arc<Poller>,
    pub price_store: Arc<dyn PriceStore>,
}

pub type Error = anyhow::Error;
pub type Context<'a> = poise::Context<'a, Data, Error>;
