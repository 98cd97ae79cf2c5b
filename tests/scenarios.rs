//! End-to-end detection scenarios over synthetic epochs.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;
use supersketch::address::{to_integer, to_text};
use supersketch::evaluation::{CardinalityErrors, GroundTruth, KnownAnomalies, TraceEvaluation};
use supersketch::flow::read_epoch;
use supersketch::{
    DestinationAnomaly, FlowRecord, SketchConfig, SourceAnomaly, SuperSketch,
};

// =============================================================================
// Traffic helpers
// =============================================================================

const PORTS: [u16; 6] = [22, 53, 80, 123, 443, 8080];

/// `sources` benign hosts, each talking to 1-3 servers on common ports.
fn background(seed: u64, sources: u32) -> Vec<FlowRecord> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let base_src = to_integer("10.20.0.0").unwrap();
    let base_dst = to_integer("172.16.0.0").unwrap();

    let mut records = Vec::new();
    for i in 0..sources {
        let fanout = rng.gen_range(1..=3);
        for _ in 0..fanout {
            let dst = base_dst + rng.gen_range(0..400);
            let port = PORTS[rng.gen_range(0..PORTS.len())];
            records.push(FlowRecord::new(base_src + i, dst, port));
        }
    }
    records
}

fn horizontal_scan(source: u32, targets: u32, port: u16) -> Vec<FlowRecord> {
    let base = to_integer("192.168.0.0").unwrap();
    (0..targets)
        .map(|i| FlowRecord::new(source, base + i, port))
        .collect()
}

fn engine() -> SuperSketch {
    SuperSketch::new(SketchConfig::default()).unwrap()
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_single_resolution_dominant_source() {
    let mut engine = SuperSketch::with_moduli(&[101], &[11]).unwrap();
    engine.initialize();

    for d in 1..=60 {
        engine
            .update("0.0.0.77", &format!("0.0.0.{}", d), 80)
            .unwrap();
    }
    for s in 10..19 {
        engine
            .update(&format!("0.0.0.{}", s), "0.0.0.99", 80)
            .unwrap();
    }

    let rows = engine.identify_abnormal_rows();
    assert!(rows.spreaders[0].contains(&77));

    let recovered: Vec<String> = engine
        .reconstruct_source_addresses(&rows.spreaders)
        .iter()
        .map(|r| r.to_text())
        .collect();
    assert!(recovered.contains(&"0.0.0.77".to_string()));
}

#[test]
fn test_first_epoch_never_reports_changers() {
    let mut engine = engine();
    let scanner = to_integer("203.0.113.5").unwrap();
    let mut records = background(7, 200);
    records.extend(horizontal_scan(scanner, 500, 22));

    engine.process_epoch(&records);
    let rows = engine.identify_abnormal_rows();
    assert!(rows.changers.iter().all(|set| set.is_empty()));
    assert!(engine.detector().changes().is_none());
}

#[test]
fn test_spreader_detected_and_attributed() {
    let mut engine = engine();
    let scanner = to_integer("203.0.113.5").unwrap();
    let mut records = background(11, 200);
    records.extend(horizontal_scan(scanner, 500, 22));

    engine.process_epoch(&records);
    let report = engine.analyze_epoch();

    assert!(report.spreaders.contains(&scanner));
    assert!(report.changers.is_empty());

    let attribution = report
        .source_attributions
        .iter()
        .find(|a| a.address == to_text(scanner))
        .unwrap();
    assert!(attribution.dc >= 500);
    assert_eq!(attribution.dpc, 1);
    assert_eq!(attribution.kind, SourceAnomaly::HorizontalScan);
}

#[test]
fn test_vertical_scan_attributed() {
    let mut engine = engine();
    let scanner = to_integer("198.51.100.9").unwrap();
    let target = to_integer("172.16.9.9").unwrap();
    let mut records = background(13, 100);
    records.extend((1..=300u16).map(|port| FlowRecord::new(scanner, target, port)));

    engine.process_epoch(&records);
    let report = engine.analyze_epoch();

    assert!(report.spreaders.contains(&scanner));
    let attribution = engine.attribute_source_anomalies(&[scanner]).remove(0);
    assert_eq!(attribution.dc, 1);
    assert!(attribution.dpc >= 100);
    assert_eq!(attribution.kind, SourceAnomaly::VerticalScan);
}

#[test]
fn test_changer_detected_in_second_epoch() {
    let mut engine = engine();
    let host = to_integer("10.20.0.17").unwrap();
    let quiet = background(21, 200);

    engine.process_epoch(&quiet);
    let first = engine.analyze_epoch();
    assert!(first.changers.is_empty());

    let mut busy = quiet.clone();
    busy.extend(horizontal_scan(host, 600, 445));
    engine.process_epoch(&busy);
    let second = engine.analyze_epoch();

    assert!(second.changers.contains(&host), "changers: {:?}", second.changers);
    assert!(second.spreaders.contains(&host));

    let attribution = second
        .source_attributions
        .iter()
        .find(|a| a.address == to_text(host))
        .unwrap();
    let (dc_change, _) = attribution.change.unwrap();
    assert!(dc_change > 500.0);
    assert_eq!(attribution.kind, SourceAnomaly::HorizontalScan);
}

#[test]
fn test_repeated_epoch_reports_every_source_as_changer() {
    let mut engine = engine();
    let records: Vec<FlowRecord> = (0..5)
        .map(|i| FlowRecord::new(0x0A14_0000 + i, 0xAC10_0001, 443))
        .collect();

    engine.process_epoch(&records);
    assert!(engine.analyze_epoch().changers.is_empty());

    // identical traffic: zero total change at every resolution
    engine.process_epoch(&records);
    let report = engine.analyze_epoch();
    let sources: BTreeSet<u32> = records.iter().map(|r| r.source).collect();
    assert_eq!(report.changers, sources);
}

#[test]
fn test_receiver_victim_and_service_provider() {
    let mut engine = engine();
    let victim = to_integer("172.31.0.1").unwrap();
    let server = to_integer("172.31.0.2").unwrap();
    let attacker_base = to_integer("100.64.0.0").unwrap();

    let mut records = background(31, 100);
    for i in 0..400 {
        records.push(FlowRecord::new(attacker_base + i, victim, 80));
    }
    // victim answers a couple of hosts
    records.push(FlowRecord::new(victim, attacker_base, 80));
    records.push(FlowRecord::new(victim, attacker_base + 1, 80));
    // server is popular and talks back to all of its clients
    for i in 0..150 {
        records.push(FlowRecord::new(attacker_base + 1000 + i, server, 443));
        records.push(FlowRecord::new(server, attacker_base + 1000 + i, 443));
    }

    engine.process_epoch(&records);
    let report = engine.analyze_epoch();
    assert!(report.receivers.contains(&victim));
    assert!(report.receivers.contains(&server));

    let labels: Vec<(String, DestinationAnomaly)> = report
        .destination_attributions
        .iter()
        .map(|a| (a.address.clone(), a.kind))
        .collect();
    assert!(labels.contains(&(to_text(victim), DestinationAnomaly::Victim)));
    assert!(labels.contains(&(to_text(server), DestinationAnomaly::ServiceProvider)));
}

#[test]
fn test_missing_resolution_blocks_reconstruction() {
    let mut engine = engine();
    let scanner = to_integer("203.0.113.5").unwrap();
    let mut records = background(41, 200);
    records.extend(horizontal_scan(scanner, 500, 22));
    engine.process_epoch(&records);

    let rows = engine.identify_abnormal_rows();
    let found: BTreeSet<u32> = engine
        .reconstruct_source_addresses(&rows.spreaders)
        .iter()
        .map(|r| r.address)
        .collect();
    assert!(found.contains(&scanner));

    let mut pruned = rows.spreaders.clone();
    let p2 = engine.config().address_moduli[2];
    pruned[2].remove(&(scanner % p2));
    let found: BTreeSet<u32> = engine
        .reconstruct_source_addresses(&pruned)
        .iter()
        .map(|r| r.address)
        .collect();
    assert!(!found.contains(&scanner));
}

#[test]
fn test_csv_trace_with_evaluation() {
    let mut csv = String::from("Src IP,Dst IP,Dst Port\n");
    for i in 0..300 {
        csv.push_str(&format!("203.0.113.5,192.168.{}.{},22\n", i / 250, i % 250));
    }
    for i in 0..100 {
        csv.push_str(&format!("10.20.0.{},172.16.0.{},443\n", i, i % 20));
    }
    // duplicated line collapses
    csv.push_str("10.20.0.0,172.16.0.0,443\n");

    let records = read_epoch(csv.as_bytes()).unwrap();
    assert_eq!(records.len(), 400);

    let mut engine = engine();
    engine.process_epoch(&records);
    let truth = GroundTruth::from_records(&records);
    let errors = CardinalityErrors::measure(&engine.estimator(), &truth);
    assert!(errors.are_dc < 0.05, "ARE dc too high: {}", errors.are_dc);
    assert!(errors.are_sc < 0.05, "ARE sc too high: {}", errors.are_sc);

    let report = engine.analyze_epoch();
    let mut trace = TraceEvaluation::new();
    trace.record_epoch(&truth, &errors, &report);

    let scanner = to_integer("203.0.113.5").unwrap();
    let known = KnownAnomalies {
        spreaders: BTreeSet::from([scanner]),
        ..Default::default()
    };
    let rates = trace.rates(&known);
    assert_eq!(rates.spreader.false_negative_rate, 0.0);
    assert_eq!(trace.epochs(), 1);
}
