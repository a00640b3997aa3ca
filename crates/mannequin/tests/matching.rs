mod common;

use common::{blank_photos, standing_pose, ScriptedEstimator};
use mannequin::{
    body::PoseLandmarkSet,
    catalog::{Catalog, CatalogEntry, CatalogGenerator},
    extract::PoseLandmarkExtractor,
    pipeline::{AnalysisPipeline, AnalysisRequest},
    pose::PoseKind,
    selector::MannequinSelector,
    timer::TimerMetadata,
    user::Gender,
    Error,
};

fn generated_catalog() -> (tempfile::TempDir, Catalog) {
    let dir = tempfile::tempdir().unwrap();
    let catalog = CatalogGenerator::new(dir.path())
        .generate_all(&Gender::ALL, 15)
        .unwrap();
    (dir, catalog)
}

#[test]
fn every_valid_user_gets_a_match() {
    let (_dir, catalog) = generated_catalog();
    let extractor = PoseLandmarkExtractor::new(ScriptedEstimator::everywhere());
    let basic = AnalysisPipeline::new(MannequinSelector::new(&catalog));
    let enhanced = basic.with_extractor(&extractor);

    let mut rng = fastrand::Rng::with_seed(2024);
    for _ in 0..40 {
        let gender = if rng.bool() { "male" } else { "female" };
        let height = 120.0 + rng.f32() * 100.0;
        let weight = 30.0 + rng.f32() * 170.0;

        for report in [
            basic.analyze(AnalysisRequest::new(height, weight, gender)),
            enhanced.analyze(
                AnalysisRequest::new(height, weight, gender).with_photos(blank_photos()),
            ),
        ] {
            let report = report.unwrap();
            assert_eq!(report.mannequin.gender.as_str(), gender);
            assert!((0.0..=100.0).contains(&report.similarity_score));
        }
    }
}

#[test]
fn exact_match_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let mut catalog = Catalog::new();
    let entry = |id: u32, height_cm: f32, weight_kg: f32, bmi: f32| CatalogEntry {
        id,
        filename: CatalogEntry::asset_file_name(Gender::Male, id),
        gender: Gender::Male,
        betas: vec![0.0; 10],
        height_cm,
        weight_kg,
        bmi,
        primary_beta: 0.0,
    };
    catalog.set_entries(
        Gender::Male,
        vec![
            entry(0, 165.0, 60.0, 22.0),
            entry(1, 170.0, 70.0, 24.2),
            entry(2, 180.0, 90.0, 27.8),
        ],
    );
    catalog.save(dir.path()).unwrap();

    let catalog = Catalog::load(dir.path()).unwrap();
    let selector = MannequinSelector::new(&catalog);
    let user = mannequin::user::UserMeasurements::new(170.0, 70.0, Gender::Male).unwrap();
    let result = selector.select(&user, None).unwrap();
    assert_eq!(result.entry.id, 1);
    assert!(result.distance < 0.05);
    assert!(result.similarity_score > 99.5);
}

#[test]
fn selection_is_deterministic() {
    let (_dir, catalog) = generated_catalog();
    let extractor = PoseLandmarkExtractor::new(ScriptedEstimator::everywhere());
    let pipeline =
        AnalysisPipeline::new(MannequinSelector::new(&catalog)).with_extractor(&extractor);

    let run = || {
        pipeline
            .analyze(AnalysisRequest::new(163.0, 58.0, "female").with_photos(blank_photos()))
            .unwrap()
    };
    let first = run();
    for _ in 0..5 {
        let again = run();
        assert_eq!(again.mannequin.mannequin_id, first.mannequin.mannequin_id);
        assert_eq!(again.similarity_score, first.similarity_score);
    }
}

#[test]
fn missing_side_view_falls_back_to_neutral_symmetry() {
    let (_dir, catalog) = generated_catalog();
    let extractor = PoseLandmarkExtractor::new(ScriptedEstimator::new([
        (PoseKind::Front, Some(standing_pose())),
        (PoseKind::Left, Some(standing_pose())),
        (PoseKind::Right, None),
        (PoseKind::Back, Some(standing_pose())),
    ]));
    let pipeline =
        AnalysisPipeline::new(MannequinSelector::new(&catalog)).with_extractor(&extractor);
    let report = pipeline
        .analyze(AnalysisRequest::new(175.0, 72.0, "male").with_photos(blank_photos()))
        .unwrap();
    let photo = report.photo_analysis.unwrap();
    assert_eq!(photo.symmetry_score, 50.0);
    assert_eq!(photo.pose_quality_scores[&PoseKind::Right], 0.0);
}

#[test]
fn failed_detections_lower_confidence() {
    let (_dir, catalog) = generated_catalog();
    let all = PoseLandmarkExtractor::new(ScriptedEstimator::everywhere());
    let none = PoseLandmarkExtractor::new(ScriptedEstimator::new(
        PoseKind::ALL.map(|pose| (pose, None::<PoseLandmarkSet>)),
    ));
    let selector = MannequinSelector::new(&catalog);

    let confidence = |extractor: &PoseLandmarkExtractor| {
        AnalysisPipeline::new(selector)
            .with_extractor(extractor)
            .analyze(AnalysisRequest::new(175.0, 72.0, "male").with_photos(blank_photos()))
            .unwrap()
            .photo_analysis
            .unwrap()
            .confidence_score
    };
    let full = confidence(&all);
    assert!(full > 90.0, "{full}");
    assert_eq!(confidence(&none), 0.0);
}

#[test]
fn scores_stay_clamped_for_any_timer() {
    let (_dir, catalog) = generated_catalog();
    let extractor = PoseLandmarkExtractor::new(ScriptedEstimator::everywhere());
    let pipeline =
        AnalysisPipeline::new(MannequinSelector::new(&catalog)).with_extractor(&extractor);

    for timers in [
        vec![-100.0, -5.0, 0.0, 1e9],
        vec![30.0; 4],
        vec![0.0; 4],
        vec![f32::MAX, f32::MIN],
        vec![],
    ] {
        let request = AnalysisRequest::new(180.0, 80.0, "male")
            .with_photos(blank_photos())
            .with_timer(TimerMetadata::from_timers(timers.clone()));
        let report = pipeline.analyze(request).unwrap();
        let photo = report.photo_analysis.unwrap();
        assert!((0.0..=100.0).contains(&photo.confidence_score), "{timers:?}");
        for q in photo.pose_quality_scores.values() {
            assert!((0.0..=100.0).contains(q), "{timers:?}");
        }
        let analytics = report.timer_analytics.unwrap();
        assert!((0.0..=100.0).contains(&analytics.effectiveness_score));
        assert!((0.0..=100.0).contains(&report.similarity_score));
    }
}

#[test]
fn unknown_gender_is_rejected() {
    let (_dir, catalog) = generated_catalog();
    let pipeline = AnalysisPipeline::new(MannequinSelector::new(&catalog));
    let err = pipeline
        .analyze(AnalysisRequest::new(170.0, 70.0, "robot"))
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}
