//! Assembly Integration Tests
//!
//! Tests for writing synthesized templates into an output directory:
//! file layout, manifest, the single-writer lock and synthesis history.

use sitestack::core::assembly::{AssemblyLock, LOCK_FILE, MANIFEST_FILE};
use sitestack::core::{AssemblyError, History, SourceParams, Synthesizer};
use sitestack::domain::{EventType, SecretRef};
use sitestack::stack::{SiteStack, SiteStackProps};
use tempfile::TempDir;

fn stack(name: &str, branch: &str) -> SiteStack {
    SiteStack::new(&SiteStackProps {
        stack_name: name.to_string(),
        source: SourceParams {
            owner: "X".to_string(),
            repo: "Y".to_string(),
            branch: branch.to_string(),
            credential: SecretRef::new("github-token"),
        },
        build: Default::default(),
        website: Default::default(),
        build_image: None,
    })
    .unwrap()
}

#[tokio::test]
async fn test_synth_writes_template_and_manifest() {
    let temp_dir = TempDir::new().unwrap();
    let out_dir = temp_dir.path().join("cdk.out");
    let synthesizer = Synthesizer::new(&out_dir);

    let report = synthesizer.synthesize(&stack("SiteStack", "master")).await.unwrap();

    assert_eq!(report.template_path, out_dir.join("SiteStack.template.json"));
    assert!(report.template_path.exists());
    assert!(out_dir.join(MANIFEST_FILE).exists());
    assert!(report.changed);

    let manifest = synthesizer.assembly().read_manifest().unwrap().unwrap();
    let artifact = &manifest.artifacts["SiteStack"];
    assert_eq!(artifact, &report.artifact);
    assert_eq!(artifact.template_file, "SiteStack.template.json");
    assert_eq!(artifact.outputs, vec!["DistributionDomainName", "WebsiteURL"]);

    // File on disk is exactly the rendered template
    let on_disk = std::fs::read_to_string(&report.template_path).unwrap();
    let rendered = stack("SiteStack", "master").synth().unwrap().to_json().unwrap();
    assert_eq!(on_disk, rendered);

    let template = synthesizer.assembly().read_template("SiteStack").unwrap();
    assert_eq!(template.hash().unwrap(), artifact.template_hash);
}

#[tokio::test]
async fn test_resynth_is_byte_identical() {
    let temp_dir = TempDir::new().unwrap();
    let synthesizer = Synthesizer::new(temp_dir.path());

    let first = synthesizer.synthesize(&stack("SiteStack", "master")).await.unwrap();
    let first_bytes = std::fs::read(&first.template_path).unwrap();
    let first_manifest = std::fs::read(temp_dir.path().join(MANIFEST_FILE)).unwrap();

    let second = synthesizer.synthesize(&stack("SiteStack", "master")).await.unwrap();
    let second_bytes = std::fs::read(&second.template_path).unwrap();
    let second_manifest = std::fs::read(temp_dir.path().join(MANIFEST_FILE)).unwrap();

    assert_ne!(first.synth_id, second.synth_id);
    assert_eq!(first_bytes, second_bytes);
    assert_eq!(first_manifest, second_manifest);
    assert!(!second.changed);
}

#[tokio::test]
async fn test_changed_configuration_detected() {
    let temp_dir = TempDir::new().unwrap();
    let synthesizer = Synthesizer::new(temp_dir.path());

    let first = synthesizer.synthesize(&stack("SiteStack", "master")).await.unwrap();
    let second = synthesizer.synthesize(&stack("SiteStack", "main")).await.unwrap();

    assert!(second.changed);
    assert_ne!(first.artifact.template_hash, second.artifact.template_hash);
}

#[tokio::test]
async fn test_stacks_share_manifest() {
    let temp_dir = TempDir::new().unwrap();
    let synthesizer = Synthesizer::new(temp_dir.path());

    synthesizer.synthesize(&stack("Staging", "develop")).await.unwrap();
    synthesizer.synthesize(&stack("Production", "master")).await.unwrap();

    let manifest = synthesizer.assembly().read_manifest().unwrap().unwrap();
    assert_eq!(
        manifest.artifacts.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["Production", "Staging"]
    );
    assert!(temp_dir.path().join("Staging.template.json").exists());
    assert!(temp_dir.path().join("Production.template.json").exists());
}

#[tokio::test]
async fn test_locked_directory_rejects_synth() {
    let temp_dir = TempDir::new().unwrap();
    let synthesizer = Synthesizer::new(temp_dir.path());

    let lock = AssemblyLock::acquire(temp_dir.path(), "synth Other").unwrap();
    assert_eq!(lock.path(), temp_dir.path().join(LOCK_FILE));

    let err = synthesizer
        .synthesize(&stack("SiteStack", "master"))
        .await
        .unwrap_err();
    match err.downcast_ref::<AssemblyError>() {
        Some(AssemblyError::Locked { holder, .. }) => {
            assert!(holder.contains("synth Other"));
        }
        other => panic!("expected lock contention, got {:?}", other),
    }
    assert!(!temp_dir.path().join("SiteStack.template.json").exists());

    // Released lock lets the next synth through
    drop(lock);
    synthesizer.synthesize(&stack("SiteStack", "master")).await.unwrap();
}

#[tokio::test]
async fn test_history_records_each_synth() {
    let temp_dir = TempDir::new().unwrap();
    let synthesizer = Synthesizer::new(temp_dir.path());

    let report = synthesizer.synthesize(&stack("SiteStack", "master")).await.unwrap();

    let history = History::open(temp_dir.path());
    let events = history.replay().await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type, EventType::SynthStarted);
    assert_eq!(events[1].event_type, EventType::SynthCompleted);
    assert!(events.iter().all(|e| e.synth_id == report.synth_id));
    assert_eq!(
        events[1].template_hash.as_deref(),
        Some(report.artifact.template_hash.as_str())
    );

    let recent = history.recent(1).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].event_type, EventType::SynthCompleted);
}
