use tracing::info;

use crate::{domain::entities::package::PackageCatalog, infra::error::InfraError};

/// Load the package catalog from `path`, or fall back to the built-in one.
pub fn load_catalog(path: Option<&str>) -> Result<PackageCatalog, InfraError> {
    let catalog = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|source| InfraError::CatalogRead {
                path: path.to_string(),
                source,
            })?;
            parse_catalog(&raw).map_err(|source| InfraError::CatalogParse {
                path: path.to_string(),
                source,
            })?
        }
        None => PackageCatalog::builtin(),
    };

    catalog.validate().map_err(InfraError::CatalogInvalid)?;
    info!(
        packages = catalog.packages().len(),
        source = path.unwrap_or("builtin"),
        "Package catalog loaded"
    );
    Ok(catalog)
}

fn parse_catalog(raw: &str) -> Result<PackageCatalog, serde_json::Error> {
    serde_json::from_str(raw)
}
