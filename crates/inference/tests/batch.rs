mod common;

use common::*;
use data_contracts::{OverlayRef, ReferralTier, Stage2Label};
use inference::{BatchInput, OverlayStore, ScreeningPipeline};

fn inputs() -> Vec<BatchInput> {
    vec![
        BatchInput::new("a.png", ear_png(1)),
        BatchInput::new("b.jpg", b"definitely not an image".to_vec()),
        BatchInput::new("c.png", ear_png(2)),
    ]
}

#[test]
fn failures_are_isolated_and_order_is_kept() {
    for workers in [1, 3] {
        let dir = tempfile::tempdir().unwrap();
        let stage1 = MockClassifier::with_probabilities("stage1", &ABNORMAL);
        let stage2 = MockClassifier::with_probabilities("stage2", &COM);
        let pipeline = pipeline(cascade(&stage1, &stage2), dir.path(), workers);

        let items = pipeline.process_batch(&inputs());
        let ids: Vec<_> = items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, ["a.png", "b.jpg", "c.png"]);
        assert!(items[0].result.is_ok());
        assert_eq!(items[1].result.as_ref().unwrap_err().kind(), "decode");
        assert!(items[2].result.is_ok());

        let response = ScreeningPipeline::batch_response(&items);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["results"][0]["filename"], "a.png");
        assert_eq!(json["results"][0]["referral"], "Urgent");
        assert_eq!(json["results"][0]["stage2_prediction"], "COM");
        assert!(json["results"][0]["original_image"].as_str().unwrap().len() > 0);
        assert!(json["results"][0].get("gradcam").is_none());
        assert_eq!(json["results"][1]["filename"], "b.jpg");
        assert_eq!(json["results"][1]["error"]["kind"], "decode");
        assert_eq!(json["results"][2]["filename"], "c.png");
        assert_eq!(response.summary.total, 3);
        assert_eq!(response.summary.failed, 1);
        assert_eq!(response.summary.urgent, 2);
        assert_eq!(response.summary.com, 2);
    }
}

#[test]
fn stored_overlays_are_retrievable() {
    let dir = tempfile::tempdir().unwrap();
    let stage1 = MockClassifier::with_probabilities("stage1", &ABNORMAL);
    let stage2 = MockClassifier::with_probabilities("stage2", &COM);
    let pipeline = pipeline(cascade(&stage1, &stage2), dir.path(), 2);

    let items = pipeline.process_batch(&inputs());
    let artifact = items[0].result.as_ref().unwrap();
    assert_eq!(artifact.explained_by(), "stage2");
    assert_eq!(
        artifact.cascade().stage2().map(|o| o.label()),
        Some(Stage2Label::Com)
    );
    assert_eq!(artifact.referral(), ReferralTier::Urgent);
    let OverlayRef::Stored { path, url } = artifact.overlay() else {
        panic!("batch overlays are stored");
    };
    assert!(path.is_file());
    let name = path.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("a.png_") && name.ends_with("_gradcam.png"));
    assert_eq!(url, &format!("/outputs/{name}"));
    assert_eq!(&pipeline.store().resolve(name).unwrap(), path);

    let png = std::fs::read(path).unwrap();
    let decoded = image::load_from_memory(&png).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (40, 30));
}

#[test]
fn same_filename_with_different_overlays_never_collides() {
    let dir = tempfile::tempdir().unwrap();
    let store = inference::DirOverlayStore::new(dir.path(), "/outputs").unwrap();
    let first = store.persist("ear.png", b"first overlay").unwrap();
    let second = store.persist("ear.png", b"second overlay").unwrap();
    assert_ne!(first.name, second.name);
    assert_eq!(std::fs::read(&first.path).unwrap(), b"first overlay");
    assert_eq!(std::fs::read(&second.path).unwrap(), b"second overlay");

    // Re-persisting identical bytes is idempotent.
    let again = store.persist("ear.png", b"first overlay").unwrap();
    assert_eq!(again, first);

    // No temp files are left behind.
    let entries = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(entries, 2);
}

#[test]
fn empty_batch_yields_empty_response() {
    let dir = tempfile::tempdir().unwrap();
    let stage1 = MockClassifier::with_probabilities("stage1", &NORMAL);
    let stage2 = MockClassifier::with_probabilities("stage2", &COM);
    let pipeline = pipeline(cascade(&stage1, &stage2), dir.path(), 4);
    let items = pipeline.process_batch(&[]);
    assert!(items.is_empty());
    let response = ScreeningPipeline::batch_response(&items);
    assert_eq!(response.summary.total, 0);
}
