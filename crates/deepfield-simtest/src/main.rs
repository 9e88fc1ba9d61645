//! Deepfield Headless Simulation Harness
//!
//! Flies the spatial pipeline across interstellar distances and drives the
//! save service through save, load, backup and corruption scenarios.
//! Runs entirely in-process with a scratch save directory.
//!
//! Usage:
//!   cargo run -p deepfield-simtest
//!   cargo run -p deepfield-simtest -- --verbose
//!   RUST_LOG=info cargo run -p deepfield-simtest

use std::fs;

use deepfield_core::persistence::{
    BundleBody, LoadError, MigrationRegistry, OpaquePayload, PersistenceConfig,
    PersistenceEvent, PersistenceService, PlayerPersistentRecord, WorldPersistentRecord,
    BASE_SCHEMA_VERSION,
};
use deepfield_core::origin::PositionSource;
use deepfield_core::prelude::*;
use deepfield_logic::bubble::{self, BodyMetrics};
use deepfield_logic::config::validate_config;
use glam::DVec3;
use serde::{Deserialize, Serialize};

const LIGHT_YEAR_M: f64 = 9.4607e15;

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let verbose = std::env::args().any(|a| a == "--verbose");
    println!("=== Deepfield Simulation Harness ===\n");

    let mut results = Vec::new();

    // 1. Configuration defaults and validation
    results.extend(validate_configuration(verbose));

    // 2. Bubble falloff and scale math
    results.extend(validate_bubble_math(verbose));

    // 3. Interstellar flight through the pipeline
    results.extend(validate_interstellar_flight(verbose));

    // 4. Save service end-to-end
    results.extend(validate_persistence(verbose));

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

// ── 1. Configuration ────────────────────────────────────────────────────

fn validate_configuration(verbose: bool) -> Vec<TestResult> {
    println!("--- Configuration ---");
    let mut results = Vec::new();

    let defaults = CoreConfig::default();
    let problems = validate_config(&defaults);
    results.push(TestResult {
        name: "config_defaults_valid".into(),
        passed: problems.is_empty(),
        detail: format!("{} problems in default config", problems.len()),
    });

    results.push(TestResult {
        name: "config_threshold_derived".into(),
        passed: defaults.rebase_threshold() == defaults.bubble.inner_radius * 0.5,
        detail: format!(
            "threshold {} for inner radius {}",
            defaults.rebase_threshold(),
            defaults.bubble.inner_radius
        ),
    });

    let round_trip = defaults
        .to_json_string()
        .and_then(|text| CoreConfig::from_json_str(&text));
    results.push(TestResult {
        name: "config_json_round_trip".into(),
        passed: round_trip.as_ref().map(|c| *c == defaults).unwrap_or(false),
        detail: match &round_trip {
            Ok(_) => "default config survives JSON".into(),
            Err(e) => format!("round trip failed: {}", e),
        },
    });

    if verbose {
        if let Ok(text) = defaults.to_json_string() {
            println!("  Default config:\n{}", text);
        }
    }

    results
}

// ── 2. Bubble Math ──────────────────────────────────────────────────────

fn validate_bubble_math(verbose: bool) -> Vec<TestResult> {
    println!("--- Bubble Math ---");
    let mut results = Vec::new();
    let config = BubbleConfig::default();

    // Influence never increases with distance
    let distances: Vec<f64> = (0..=2_000).map(|i| i as f64 * 1_000.0).collect();
    let increases = distances
        .windows(2)
        .filter(|w| bubble::influence(w[1], &config) > bubble::influence(w[0], &config))
        .count();
    results.push(TestResult {
        name: "bubble_monotonic".into(),
        passed: increases == 0,
        detail: format!("{} increases over {} samples", increases, distances.len()),
    });

    // Earth scenario
    let earth = BodyMetrics::new(6371.0, 1000.0, 10_000.0);
    let sample = earth.map(|m| bubble::evaluate(&m, 5_000.0, &config));
    results.push(TestResult {
        name: "bubble_earth_inside".into(),
        passed: matches!(sample, Ok(s) if s.influence == 1.0 && s.scale_factor == 1.0),
        detail: format!("earth at 5 km: {:?}", sample),
    });

    // Scale clamps at the minimum far away
    let far = BodyMetrics::new(6371.0, 1000.0, 10_000.0)
        .map(|m| bubble::scale_factor(&m, LIGHT_YEAR_M, &config));
    results.push(TestResult {
        name: "bubble_far_clamps".into(),
        passed: matches!(far, Ok(s) if s == config.min_scale_factor),
        detail: format!("scale at 1 ly: {:?}", far),
    });

    if verbose {
        let stats = bubble::classify_batch(&distances, &config);
        println!(
            "  Bands: {} core, {} falloff, {} outside",
            stats.core_count, stats.falloff_count, stats.outside_count
        );
    }

    results
}

// ── 3. Interstellar Flight ──────────────────────────────────────────────

fn validate_interstellar_flight(verbose: bool) -> Vec<TestResult> {
    println!("--- Interstellar Flight ---");
    let mut results = Vec::new();

    let mut engine = SimulationEngine::new(&CoreConfig::default());
    let threshold = engine.origin.config().threshold;
    // About 4.2 light years; hops divide it exactly.
    let destination = DVec3::new(4.0e16, 0.0, 0.0);

    let spawned = engine
        .spawn_body(1, DVec3::new(0.0, 0.0, 1_000.0), DVec3::ZERO, 6371.0, 1000.0, 10_000.0)
        .and_then(|home| {
            engine
                .spawn_body(2, destination, DVec3::ZERO, 500.0, 50.0, 1_000.0)
                .map(|dest| (home, dest))
        });
    let ((_, home), (dest_tracked, dest)) = match spawned {
        Ok(handles) => handles,
        Err(e) => {
            results.push(TestResult {
                name: "flight_spawn".into(),
                passed: false,
                detail: format!("spawn failed: {}", e),
            });
            return results;
        }
    };

    // Cruise, then settle onto the destination.
    let hop = DVec3::new(4.0e13, 0.0, 0.0);
    let mut observer = DVec3::ZERO;
    let mut rebases = 0;
    let mut max_local = 0.0f64;
    for _ in 0..1_000 {
        observer += hop;
        let report = engine.step(observer);
        if report.rebase.is_some() {
            rebases += 1;
        }
        observer = report.observer_local;
        max_local = max_local.max(observer.length());
    }
    let correction = engine.origin.world_to_local(destination);
    let report = engine.step(correction);
    observer = report.observer_local;

    results.push(TestResult {
        name: "flight_observer_bounded".into(),
        passed: max_local <= threshold,
        detail: format!("max local distance {:.1} m (threshold {})", max_local, threshold),
    });

    results.push(TestResult {
        name: "flight_rebases_sequenced".into(),
        passed: rebases > 0 && engine.origin.observer().rebase_sequence >= rebases,
        detail: format!(
            "{} rebases, sequence {}",
            rebases,
            engine.origin.observer().rebase_sequence
        ),
    });

    let arrival_error = engine
        .origin
        .local_position(dest_tracked)
        .map(|p| (p - observer).length());
    results.push(TestResult {
        name: "flight_arrival_precision".into(),
        passed: matches!(arrival_error, Some(e) if e < 1.0),
        detail: format!("destination {:?} m from observer", arrival_error),
    });

    let dest_sample = engine.scaling.query_scale(dest);
    let home_sample = engine.scaling.query_scale(home);
    results.push(TestResult {
        name: "flight_influence_swapped".into(),
        passed: matches!(dest_sample, Some(s) if s.influence == 1.0)
            && matches!(home_sample, Some(s) if s.influence == 0.0),
        detail: format!("destination {:?}, home {:?}", dest_sample, home_sample),
    });

    let snapshot = engine.spatial_snapshot();
    results.push(TestResult {
        name: "flight_sectors_bounded".into(),
        passed: snapshot.origin.sectors.len() <= 27 + 2,
        detail: format!("{} sectors retained", snapshot.origin.sectors.len()),
    });

    if verbose {
        println!(
            "  Origin offset: {:?}, sector {}",
            engine.origin.observer().origin_offset,
            engine.origin.observer().current_sector
        );
    }

    results
}

// ── 4. Persistence ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PilotLog {
    credits: u64,
    jumps: u32,
}

fn pilot_records(jumps: u32) -> Result<(PlayerPersistentRecord, WorldPersistentRecord), String> {
    let payload = OpaquePayload::encode(&PilotLog {
        credits: 1_000 + jumps as u64 * 10,
        jumps,
    })
    .map_err(|e| e.to_string())?;
    Ok((
        PlayerPersistentRecord::new(BASE_SCHEMA_VERSION, "pilot", payload),
        WorldPersistentRecord::new(BASE_SCHEMA_VERSION, "alpha-centauri", OpaquePayload::default()),
    ))
}

fn jumps(player: &PlayerPersistentRecord) -> Option<u32> {
    player.payload.decode::<PilotLog>().ok().map(|l| l.jumps)
}

fn validate_persistence(verbose: bool) -> Vec<TestResult> {
    println!("--- Persistence ---");
    let mut results = Vec::new();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            results.push(TestResult {
                name: "persistence_runtime".into(),
                passed: false,
                detail: format!("could not start runtime: {}", e),
            });
            return results;
        }
    };
    let dir = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            results.push(TestResult {
                name: "persistence_scratch_dir".into(),
                passed: false,
                detail: format!("could not create scratch dir: {}", e),
            });
            return results;
        }
    };

    let mut config = PersistenceConfig::in_dir(dir.path());
    config.backup_bound = 3;
    config.encryption_key = Some([0x5a; 32]);
    let mut service =
        PersistenceService::new(config, MigrationRegistry::new(), runtime.handle().clone());
    let mut events = service.events();
    log::info!("Harness saves in {}", dir.path().display());

    runtime.block_on(async {
        // Round trip
        let round_trip = match pilot_records(1) {
            Ok((p, w)) => match service.save_all("main", &p, &w).await {
                Ok(_) => service.load_all("main").await.map(|loaded| loaded == (p, w)).ok(),
                Err(_) => None,
            },
            Err(_) => None,
        };
        results.push(TestResult {
            name: "persistence_round_trip".into(),
            passed: round_trip == Some(true),
            detail: format!("encrypted round trip equal: {:?}", round_trip),
        });

        // Backup chain stays bounded
        for j in 2..=6 {
            if let Ok((p, w)) = pilot_records(j) {
                let _ = service.save_all("main", &p, &w).await;
            }
        }
        let backups = service.list_backups("main");
        let newest = service.restore_from_backup("main", 0).ok().and_then(|(p, _)| jumps(&p));
        results.push(TestResult {
            name: "persistence_backup_bound".into(),
            passed: backups.len() == 3 && newest == Some(5),
            detail: format!("{} backups, newest holds jump {:?}", backups.len(), newest),
        });

        // Coalescing
        let coalesced = match (pilot_records(7), pilot_records(8)) {
            (Ok((p7, w7)), Ok((p8, w8))) => {
                let a = service.save_all("burst", &p7, &w7);
                let b = service.save_all("burst", &p8, &w8);
                let (a, b) = tokio::join!(a, b);
                let latest = service.load_all("burst").await.ok().and_then(|(p, _)| jumps(&p));
                a.is_ok()
                    && b.is_ok()
                    && latest == Some(8)
                    && service.list_backups("burst").is_empty()
            }
            _ => false,
        };
        results.push(TestResult {
            name: "persistence_coalescing".into(),
            passed: coalesced,
            detail: "two rapid saves produce one write with the latest data".into(),
        });

        // Corruption is detected and recoverable from backup
        let path = dir.path().join("main.save");
        let corrupted = fs::read(&path).map(|mut bytes| {
            let mid = bytes.len() / 2;
            bytes[mid] ^= 0x40;
            fs::write(&path, bytes)
        });
        let detected = match service.load_all("main").await {
            Err(LoadError::ChecksumMismatch { backups, .. }) => Some(backups.len()),
            _ => None,
        };
        let recovered = service.restore_from_backup("main", 0).ok().and_then(|(p, _)| jumps(&p));
        results.push(TestResult {
            name: "persistence_corruption_detected".into(),
            passed: matches!(corrupted, Ok(Ok(()))) && detected == Some(3) && recovered == Some(5),
            detail: format!(
                "mismatch with {:?} backups, recovered jump {:?}",
                detected, recovered
            ),
        });

        // Migration of older saves
        service.migrations_mut().register(BASE_SCHEMA_VERSION, |body: &mut BundleBody| {
            let mut log: PilotLog = body.player.payload.decode().map_err(|e| e.to_string())?;
            log.credits *= 2;
            body.player.payload = OpaquePayload::encode(&log).map_err(|e| e.to_string())?;
            Ok(())
        });
        let migrated = service
            .load_all("burst")
            .await
            .ok()
            .and_then(|(p, _)| p.payload.decode::<PilotLog>().ok());
        results.push(TestResult {
            name: "persistence_migration".into(),
            passed: matches!(&migrated, Some(log) if log.credits == 2 * (1_000 + 80)),
            detail: format!("migrated record {:?}", migrated),
        });
    });

    let completed = events
        .as_mut()
        .map(|e| e.drain())
        .unwrap_or_default();
    let saved = completed
        .iter()
        .filter(|e| matches!(e, PersistenceEvent::Saved(_)))
        .count();
    results.push(TestResult {
        name: "persistence_events".into(),
        passed: saved == completed.len() && saved >= 7,
        detail: format!("{} completion events, {} saved", completed.len(), saved),
    });

    if verbose {
        if let Ok(slots) = service.list_slots() {
            println!("  Slots: {:?}", slots);
        }
        for b in service.list_backups("main") {
            println!(
                "  main backup {}: schema {:?}, {} bytes, intact={}",
                b.index, b.schema_version, b.size_bytes, b.intact
            );
        }
    }

    service.disable_auto_save();
    results
}
