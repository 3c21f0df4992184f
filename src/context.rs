use std::sync::Arc;

use crate::config::Config;
use crate::replication::Replication;
use crate::store::Store;

/// Everything a command needs to run. Cloned into every connection task.
#[derive(Clone)]
pub struct Context {
    pub store: Store,
    pub config: Arc<Config>,
    pub replication: Replication,
}

impl Context {
    pub fn new(config: Config) -> Context {
        let replication = match &config.replicaof {
            Some(upstream) => Replication::replica(upstream.clone()),
            None => Replication::primary(),
        };

        Context {
            store: Store::new(),
            config: Arc::new(config),
            replication,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
