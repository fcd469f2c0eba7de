//! Cache generations: naming, install-time population and activate-time cleanup.

use color_eyre::Result;
use tracing::info;
use url::Url;

use crate::cache::{CacheStorage, CacheStore, PopulateReport};
use crate::config::Config;
use crate::fetch::Fetcher;

/// Purpose names for the running generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
  pub static_name: String,
  pub dynamic_name: String,
}

impl CacheNames {
  pub fn new(prefix: &str, generation: &str) -> Self {
    Self {
      static_name: format!("{}-static-{}", prefix, generation),
      dynamic_name: format!("{}-dynamic-{}", prefix, generation),
    }
  }

  pub fn from_config(config: &Config) -> Self {
    Self::new(&config.cache_prefix, &config.generation)
  }

  pub fn is_current(&self, name: &str) -> bool {
    name == self.static_name || name == self.dynamic_name
  }
}

/// Resolve the configured static assets to absolute URLs, preserving order.
pub fn manifest_urls(config: &Config) -> Result<Vec<Url>> {
  let origin = config.origin_url()?;
  let base = config.base();
  config
    .static_assets
    .iter()
    .map(|asset| base.resolve(&origin, asset))
    .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
  pub deleted: Vec<String>,
  pub kept: Vec<String>,
}

pub struct Lifecycle<S: CacheStorage> {
  store: CacheStore<S>,
  names: CacheNames,
  manifest: Vec<Url>,
}

impl<S: CacheStorage> Lifecycle<S> {
  pub fn new(store: CacheStore<S>, names: CacheNames, manifest: Vec<Url>) -> Self {
    Self {
      store,
      names,
      manifest,
    }
  }

  pub fn names(&self) -> &CacheNames {
    &self.names
  }

  /// Populate the static store for this generation. Individual asset
  /// failures are skipped; only an unusable store is an error.
  pub async fn install(&self, fetcher: &dyn Fetcher) -> Result<PopulateReport> {
    let cache = self.store.open(&self.names.static_name)?;
    info!("Installing generation into {}", cache.name());

    let report = cache.add_all(fetcher, &self.manifest).await;
    info!(
      "Essentials cached: {} stored, {} skipped",
      report.cached.len(),
      report.skipped.len()
    );

    Ok(report)
  }

  /// Delete every purpose that does not belong to the running generation,
  /// leaving exactly the current static and dynamic stores.
  pub fn activate(&self) -> Result<ActivateReport> {
    let mut report = ActivateReport::default();

    for name in self.store.list_purposes()? {
      if self.names.is_current(&name) {
        report.kept.push(name);
        continue;
      }
      info!("Deleting old cache: {}", name);
      self.store.delete_purpose(&name)?;
      report.deleted.push(name);
    }

    for name in [&self.names.static_name, &self.names.dynamic_name] {
      if !report.kept.contains(name) {
        self.store.open(name)?;
        report.kept.push(name.clone());
      }
    }

    Ok(report)
  }
}
