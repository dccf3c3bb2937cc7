use serde::{Deserialize, Serialize};

/// A purchasable bundle of points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub id: String,
    pub name: String,
    pub points: i64,
    pub price_cents: i64,
    /// Provider price id used at checkout.
    pub price_ref: String,
}

/// Read-only package catalog, loaded once at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageCatalog {
    packages: Vec<Package>,
}

impl PackageCatalog {
    pub fn new(packages: Vec<Package>) -> Self {
        Self { packages }
    }

    /// Built-in catalog used when no catalog file is configured.
    pub fn builtin() -> Self {
        Self::new(vec![
            Package {
                id: "starter".into(),
                name: "Starter Pack".into(),
                points: 500,
                price_cents: 4_900,
                price_ref: "price_starter".into(),
            },
            Package {
                id: "growth".into(),
                name: "Growth Pack".into(),
                points: 1_500,
                price_cents: 12_900,
                price_ref: "price_growth".into(),
            },
            Package {
                id: "scale".into(),
                name: "Scale Pack".into(),
                points: 5_000,
                price_cents: 39_900,
                price_ref: "price_scale".into(),
            },
        ])
    }

    pub fn get(&self, id: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.id == id)
    }

    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    /// Reject catalogs that would let a checkout credit zero or negative points
    /// or make a package id ambiguous.
    pub fn validate(&self) -> Result<(), String> {
        for (i, package) in self.packages.iter().enumerate() {
            if package.points <= 0 {
                return Err(format!("package {} has non-positive points", package.id));
            }
            if package.price_cents < 0 {
                return Err(format!("package {} has negative price", package.id));
            }
            if self.packages[..i].iter().any(|p| p.id == package.id) {
                return Err(format!("duplicate package id {}", package.id));
            }
        }
        Ok(())
    }
}
