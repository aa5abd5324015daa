pub mod server;

use crate::{cli::globals::GlobalArgs, store::StoreConfig};

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        store: StoreConfig,
        globals: GlobalArgs,
    },
}
