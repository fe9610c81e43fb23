use arc_swap::ArcSwap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::validation::{validate_asset_code, ValidationError};

/// Asset/currency codes accepted by the mutation entry points.
///
/// Readers never block; `reload` swaps the whole set atomically.
pub struct AssetAllowList {
    inner: ArcSwap<HashSet<String>>,
}

impl AssetAllowList {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            inner: ArcSwap::from_pointee(normalize(codes)),
        }
    }

    pub fn contains(&self, code: &str) -> bool {
        self.inner.load().contains(code)
    }

    /// Swaps in a new set after checking every code's format. Returns whether
    /// the set changed. An invalid or empty list leaves the current set alone.
    pub fn reload<I, S>(&self, codes: I) -> Result<bool, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let next = normalize(codes);
        if next.is_empty() {
            return Err(ValidationError::new("ALLOWED_ASSETS", "is required"));
        }
        for code in &next {
            validate_asset_code("ALLOWED_ASSETS", code)?;
        }

        if **self.inner.load() == next {
            return Ok(false);
        }
        self.inner.store(Arc::new(next));
        Ok(true)
    }

    /// Re-reads `ALLOWED_ASSETS` on an interval and swaps in changes.
    pub fn start_refresh(self: Arc<Self>, every: Duration) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;

            loop {
                interval.tick().await;
                let reloaded = crate::config::allowed_assets_setting()
                    .map_err(|e| e.to_string())
                    .and_then(|codes| self.reload(&codes).map_err(|e| e.to_string()));
                match reloaded {
                    Ok(true) => tracing::info!(assets = ?self.codes(), "Asset allow-list reloaded"),
                    Ok(false) => {}
                    Err(error) => {
                        tracing::warn!(%error, "Asset allow-list reload failed; keeping current set")
                    }
                }
            }
        });
    }

    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.inner.load().iter().cloned().collect();
        codes.sort();
        codes
    }

    /// Validates format first, then membership.
    pub fn check(&self, field: &'static str, code: &str) -> Result<(), ValidationError> {
        validate_asset_code(field, code)?;
        if !self.contains(code) {
            return Err(ValidationError::new(
                field,
                format!("'{}' is not a supported asset", code),
            ));
        }
        Ok(())
    }
}

fn normalize<I, S>(codes: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    codes
        .into_iter()
        .map(|code| code.as_ref().trim().to_string())
        .filter(|code| !code.is_empty())
        .collect()
}
