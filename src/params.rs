//! Typed access to global key-value parameters.

use std::sync::Arc;

use tracing::info;

use crate::error::{ConfigError, Error};
use crate::store::Database;

/// Global parameter service backed by the `parameters` table.
#[derive(Clone)]
pub struct Parameters {
    store: Arc<dyn Database>,
}

impl Parameters {
    pub fn new(store: Arc<dyn Database>) -> Self {
        Self { store }
    }

    /// Read an integer parameter, initializing it on first read.
    ///
    /// If `key` has never been set it is written as `default` before being
    /// read back, so the first call in a fresh database is also a write.
    /// A stored value that is not an integer is a configuration error.
    pub async fn get_int(&self, key: &str, default: i64) -> Result<i64, Error> {
        let value = match self.store.get_param(key).await? {
            Some(value) => value,
            None => {
                let value = default.to_string();
                self.store.set_param(key, &value).await?;
                info!(key = key, value = %value, "Initialized parameter with default");
                value
            }
        };

        value.trim().parse::<i64>().map_err(|e| {
            Error::Config(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{value}' is not an integer: {e}"),
            })
        })
    }
}
