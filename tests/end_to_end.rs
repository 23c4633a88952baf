//! Logs → snapshot → every analysis, through the public API

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use balance_entropy::analysis::{
    group_diff, group_within_block, load_snapshot, trial_level, within_block,
};
use balance_entropy::{extract, AnalysisConfig, AnalysisError, ExtractOutcome};

/// One log per group; four subjects each, 2 days x 3 blocks x 3 trials
fn write_logs(dir: &Path) {
    for (i, (group, base)) in [("old", 1.40), ("young", 1.10)].iter().enumerate() {
        let mut text = String::from("Loading...\n--- Individual Entropy Results ---\n");
        let _ = writeln!(text, "Group: {group}");
        for s in 0..4u32 {
            let subject = format!("S{}{:02}", i + 1, s);
            for day in 1..=2u32 {
                for block in 1..=3u32 {
                    for trial in 1..=3u32 {
                        let drift = if *group == "old" { 0.015 * trial as f64 } else { 0.0 };
                        let noise = 0.01 * ((s * 7 + day * 5 + block * 3 + trial) % 4) as f64;
                        let symb = base + 0.03 * s as f64 + drift + noise;
                        let _ = writeln!(
                            text,
                            "File: {subject}_G0{}_D{day:02}_B{block:02}_T{trial:02}.csv, Symb: {symb:.4}, Perm: 0.9{s}",
                            i + 1
                        );
                    }
                }
            }
        }
        text.push_str("--- Group Average Entropy Results ---\nGroup: old\nFile: S999_avg.csv, Symb: 5, Perm: 5\n");
        fs::write(dir.join(format!("analysis_output.{}.log", i + 1)), text).unwrap();
    }
}

fn config(dir: &Path) -> AnalysisConfig {
    AnalysisConfig {
        log_pattern: dir.join("analysis_output.*.log").display().to_string(),
        output_dir: dir.join("figures"),
        bootstrap_iterations: 400,
        ..Default::default()
    }
}

#[test]
fn test_full_flow() {
    let dir = tempfile::tempdir().unwrap();
    write_logs(dir.path());
    let config = config(dir.path());

    let ExtractOutcome::Extracted {
        snapshot, report, ..
    } = extract(&config).unwrap()
    else {
        panic!("expected extracted records");
    };
    assert_eq!(report.n_records, 2 * 4 * 18);
    assert_eq!(report.by_day.len(), 2);
    assert!(snapshot.exists());

    let loaded = load_snapshot(&config).unwrap();
    assert_eq!(loaded.records.len(), 144);
    assert_eq!(loaded.observations.len(), 144);
    assert_eq!(loaded.observations.skipped, 0);

    let diff = group_diff::run(&loaded, &config).unwrap();
    assert!(diff.comparison.mann_whitney.unwrap().p_value < 0.001);
    assert!(diff.comparison.cohens_d.unwrap() > 1.0);

    let trial = trial_level::run(&loaded, &config).unwrap();
    assert!(trial.model.fit.is_some());
    assert_eq!(trial.trial_range, Some((1, 9)));

    let within = within_block::run(&loaded, &config).unwrap();
    let findings = within.findings.unwrap();
    assert!(findings.old_slope > findings.young_slope.unwrap());

    let by_group = group_within_block::run(&loaded, &config).unwrap();
    let old = by_group.group("old").unwrap();
    assert!(old.paired.as_ref().unwrap().mean_diff > 0.0);

    let figures = dir.path().join("figures");
    for name in [
        "individual_entropies_extracted.csv",
        "individual_symb_entropy_overall.svg",
        "individual_symb_entropy_by_day.svg",
        "enhanced_group_comparison.svg",
        "group_differences_summary.txt",
        "trial_level_entropy_trend.svg",
        "trial_level_analysis_results.txt",
        "within_block_trial_entropy_trend.svg",
        "within_block_trial_analysis_results.txt",
        "within_block_by_group_comparison.svg",
        "within_block_by_group_results.txt",
    ] {
        assert!(figures.join(name).exists(), "missing {name}");
    }
}

#[test]
fn test_analysis_without_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    assert!(matches!(
        load_snapshot(&config),
        Err(AnalysisError::MissingInput(_))
    ));
}

#[test]
fn test_extract_without_entries() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("analysis_output.1.log"), "--- Analysis Complete ---\n").unwrap();
    let config = config(dir.path());
    assert!(matches!(
        extract(&config).unwrap(),
        ExtractOutcome::Empty { files_scanned: 1 }
    ));
}
