//! Schema migrations for stored bundles.
//!
//! A step registered for version `n` upgrades a bundle from `n` to
//! `n + 1`. Loading applies every step from the stored version up to the
//! current one, in order.

use std::collections::BTreeMap;

use super::error::LoadError;
use super::records::BundleBody;

/// First schema version written by this crate.
pub const BASE_SCHEMA_VERSION: u16 = 1;

type MigrationStep = Box<dyn Fn(&mut BundleBody) -> Result<(), String> + Send + Sync>;

/// Ordered chain of `v(n) -> v(n+1)` steps.
pub struct MigrationRegistry {
    steps: BTreeMap<u16, MigrationStep>,
    declared_current: u16,
}

impl Default for MigrationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationRegistry")
            .field("steps", &self.steps.keys().collect::<Vec<_>>())
            .field("current", &self.current_version())
            .finish()
    }
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self {
            steps: BTreeMap::new(),
            declared_current: BASE_SCHEMA_VERSION,
        }
    }

    /// Register the step that upgrades `from` to `from + 1`.
    ///
    /// Registering the same version twice replaces the earlier step.
    pub fn register<F>(&mut self, from: u16, step: F) -> &mut Self
    where
        F: Fn(&mut BundleBody) -> Result<(), String> + Send + Sync + 'static,
    {
        if self.steps.insert(from, Box::new(step)).is_some() {
            log::warn!("Replaced migration step from schema {}", from);
        }
        self
    }

    /// Declare a current version higher than the registered chain reaches.
    pub fn with_current(mut self, version: u16) -> Self {
        self.declared_current = version;
        self
    }

    /// Version new saves are written with.
    pub fn current_version(&self) -> u16 {
        let chained = self
            .steps
            .keys()
            .next_back()
            .map(|v| v.saturating_add(1))
            .unwrap_or(BASE_SCHEMA_VERSION);
        chained.max(self.declared_current)
    }

    /// Bring `body`, stored at `stored`, up to the current version.
    pub fn migrate(&self, stored: u16, body: &mut BundleBody) -> Result<(), LoadError> {
        let current = self.current_version();
        if stored == 0 || stored > current {
            return Err(LoadError::UnsupportedVersion {
                found: stored,
                current,
            });
        }

        for version in stored..current {
            let step = self.steps.get(&version).ok_or(LoadError::UnsupportedVersion {
                found: stored,
                current,
            })?;
            step(body).map_err(|reason| LoadError::Migration {
                from: version,
                reason,
            })?;
        }

        // Record versions belong to the caller unless a step rewrote them.
        if stored < current {
            log::info!("Migrated bundle from schema {} to {}", stored, current);
            body.player.schema_version = current;
            body.world.schema_version = current;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::records::{OpaquePayload, PlayerPersistentRecord, WorldPersistentRecord};
    use serde_json::json;

    fn body(version: u16) -> BundleBody {
        BundleBody {
            player: PlayerPersistentRecord::new(
                version,
                "pilot",
                OpaquePayload::from_value(&json!({"credits": 10})).unwrap(),
            ),
            world: WorldPersistentRecord::new(version, "sol", OpaquePayload::default()),
        }
    }

    fn rewrite_credits(factor: i64) -> impl Fn(&mut BundleBody) -> Result<(), String> {
        move |b: &mut BundleBody| {
            let mut v = b.player.payload.to_value().map_err(|e| e.to_string())?;
            let credits = v["credits"].as_i64().ok_or("missing credits")?;
            v["credits"] = json!(credits * factor);
            b.player.payload = OpaquePayload::from_value(&v).map_err(|e| e.to_string())?;
            Ok(())
        }
    }

    #[test]
    fn empty_registry_is_base_version() {
        let reg = MigrationRegistry::new();
        assert_eq!(reg.current_version(), BASE_SCHEMA_VERSION);
        let mut b = body(1);
        reg.migrate(1, &mut b).unwrap();
        assert_eq!(b, body(1));
    }

    #[test]
    fn chain_applies_in_order() {
        let mut reg = MigrationRegistry::new();
        reg.register(1, rewrite_credits(2)).register(2, |b: &mut BundleBody| {
            b.world.system_id = format!("{}-v3", b.world.system_id);
            Ok(())
        });
        assert_eq!(reg.current_version(), 3);

        let mut b = body(1);
        reg.migrate(1, &mut b).unwrap();
        assert_eq!(b.player.payload.to_value().unwrap()["credits"], 20);
        assert_eq!(b.world.system_id, "sol-v3");
        assert_eq!(b.player.schema_version, 3);

        // Starting mid-chain skips earlier steps.
        let mut b = body(2);
        reg.migrate(2, &mut b).unwrap();
        assert_eq!(b.player.payload.to_value().unwrap()["credits"], 10);
    }

    #[test]
    fn current_bundle_keeps_record_versions() {
        let reg = MigrationRegistry::new();
        let mut b = body(1);
        b.player.schema_version = 7;
        b.world.schema_version = 4;
        reg.migrate(1, &mut b).unwrap();
        assert_eq!(b.player.schema_version, 7);
        assert_eq!(b.world.schema_version, 4);
    }

    #[test]
    fn newer_version_is_unsupported() {
        let reg = MigrationRegistry::new();
        assert!(matches!(
            reg.migrate(2, &mut body(2)),
            Err(LoadError::UnsupportedVersion { found: 2, current: 1 })
        ));
        assert!(matches!(
            reg.migrate(0, &mut body(0)),
            Err(LoadError::UnsupportedVersion { found: 0, .. })
        ));
    }

    #[test]
    fn gap_in_chain_is_unsupported() {
        let mut reg = MigrationRegistry::new();
        reg.register(2, |_: &mut BundleBody| Ok(()));
        assert_eq!(reg.current_version(), 3);
        assert!(matches!(
            reg.migrate(1, &mut body(1)),
            Err(LoadError::UnsupportedVersion { found: 1, current: 3 })
        ));
    }

    #[test]
    fn failing_step_reports_version() {
        let mut reg = MigrationRegistry::new();
        reg.register(1, |_: &mut BundleBody| Err("bad data".to_string()));
        match reg.migrate(1, &mut body(1)) {
            Err(LoadError::Migration { from, reason }) => {
                assert_eq!(from, 1);
                assert_eq!(reason, "bad data");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn declared_current_without_steps() {
        let reg = MigrationRegistry::new().with_current(4);
        assert_eq!(reg.current_version(), 4);
        assert!(reg.migrate(4, &mut body(4)).is_ok());
        assert!(reg.migrate(3, &mut body(3)).is_err());
    }
}
