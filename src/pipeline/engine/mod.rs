//! Read/write engines and the primary → secondary fallback chain

#[cfg(feature = "gdal")]
pub mod ogr;
pub mod native;

use std::collections::BTreeSet;
use std::path::Path;

use log::{info, warn};

use super::dataset::FeatureTable;
use crate::error::EngineError;

/// One implementation of the "read file → feature table → write file" contract
pub trait VectorEngine {
    /// Short engine name used in logs and error messages
    fn name(&self) -> &'static str;

    /// Output drivers this engine can write
    fn drivers(&self) -> BTreeSet<String>;

    /// Read the first layer of `path`. `source_format` is the format the
    /// caller declared for the input (e.g. `geojson`, `kmz`).
    fn read(&self, path: &Path, source_format: &str) -> Result<FeatureTable, EngineError>;

    /// Write `table` to `path` using `driver`
    fn write(&self, table: &FeatureTable, path: &Path, driver: &str) -> Result<(), EngineError>;
}

/// A preferred engine plus an optional engine to retry with on failure
pub struct EngineChain {
    primary: Box<dyn VectorEngine>,
    secondary: Option<Box<dyn VectorEngine>>,
}

impl EngineChain {
    pub fn new(primary: Box<dyn VectorEngine>, secondary: Option<Box<dyn VectorEngine>>) -> Self {
        Self { primary, secondary }
    }

    /// Native engine first, GDAL as the fallback when compiled in
    pub fn with_default_engines() -> Self {
        #[cfg(feature = "gdal")]
        let secondary: Option<Box<dyn VectorEngine>> = Some(Box::new(ogr::GdalEngine::new()));
        #[cfg(not(feature = "gdal"))]
        let secondary: Option<Box<dyn VectorEngine>> = None;

        Self::new(Box::new(native::NativeEngine), secondary)
    }

    /// Union of the drivers every engine in the chain can write
    pub fn available_drivers(&self) -> BTreeSet<String> {
        let mut drivers = self.primary.drivers();
        if let Some(secondary) = &self.secondary {
            drivers.extend(secondary.drivers());
        }
        drivers
    }

    pub fn read(&self, path: &Path, source_format: &str) -> Result<FeatureTable, EngineError> {
        self.run(|engine| engine.read(path, source_format))
    }

    pub fn write(&self, table: &FeatureTable, path: &Path, driver: &str) -> Result<(), EngineError> {
        self.run(|engine| engine.write(table, path, driver))
    }

    fn run<T>(
        &self,
        op: impl Fn(&dyn VectorEngine) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        match op(self.primary.as_ref()) {
            Ok(value) => Ok(value),
            Err(primary_err) => match &self.secondary {
                Some(secondary) => {
                    warn!(
                        "{} engine failed ({}), retrying with {} engine",
                        self.primary.name(),
                        primary_err,
                        secondary.name()
                    );
                    let value = op(secondary.as_ref())?;
                    info!("{} engine succeeded", secondary.name());
                    Ok(value)
                }
                None => Err(primary_err),
            },
        }
    }
}
